//! # lincrf
//!
//! Linear-chain CRF inference (`lincrf-core`) together with the embedding + CRF
//! tagger that trains on it (`lincrf-trainer`).
//!
//! ```rust
//! use std::sync::Arc;
//! use lincrf::{LinearChainCrf, TagRegistry};
//!
//! let registry = Arc::new(TagRegistry::from_labels(["O", "B-PER"]).unwrap());
//! let crf = LinearChainCrf::new(registry);
//! let decoded = crf.decode(&[vec![1.0, 0.0], vec![0.0, 2.0]]).unwrap();
//! assert_eq!(decoded.labels, vec!["O", "B-PER"]);
//! ```

pub use lincrf_core::*;

pub mod trainer {
    pub use lincrf_trainer::*;
}

pub use lincrf_trainer::{EmbeddingTagger, TrainConfig};
