//! # lincrf trainer
//!
//! Embedding + CRF sequence labeller on top of `lincrf-core`: column-format corpus
//! reading, vocabularies, a candle emission model, the tensor CRF loss, span
//! evaluation and the SGD/Adam training loop.
//!
//! ```no_run
//! use lincrf_trainer::{TrainConfig, run_training};
//!
//! let config = TrainConfig::new()
//!     .with_files("train.txt", "dev.txt", "test.txt")
//!     .with_epochs(10);
//! let summary = run_training(&config).unwrap();
//! println!("best dev F1: {:.2}", summary.best_dev);
//! ```

pub mod config;
pub mod data;
pub mod eval;
pub mod loss;
pub mod model;
pub mod trainer;
pub mod vocab;

pub use config::{OptimizerKind, TrainConfig};
pub use data::{CorpusReader, Instance, to_iobes, use_iobes};
pub use eval::{Metrics, Span, evaluate, spans};
pub use model::EmbeddingTagger;
pub use trainer::{Corpus, TrainSummary, Trainer, build_model, clip_gradients, run_training};
pub use vocab::{PretrainedEmbeddings, UNK, Vocab};
