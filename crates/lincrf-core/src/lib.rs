//! # lincrf core
//!
//! The CRF layer of the lincrf sequence labeller: the forward (log-partition)
//! algorithm, gold-path scoring, the loss built from both, and Viterbi decoding,
//! all driven by a [`TagRegistry`] that maps label names to dense ids with
//! START/STOP sentinels.
//!
//! The core never touches embeddings or gradients. Scores come in through the
//! [`EmissionSource`] trait or as plain `Vec<Vec<f32>>` rows.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use lincrf_core::{LinearChainCrf, TagRegistry};
//!
//! let registry = Arc::new(TagRegistry::from_labels(["O", "B", "I"]).unwrap());
//! let crf = LinearChainCrf::new(registry);
//!
//! let emissions = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
//! let decoded = crf.decode(&emissions).unwrap();
//!
//! assert_eq!(decoded.labels, vec!["O", "B"]);
//! assert_eq!(decoded.score, 2.0);
//! ```
pub mod crf;
pub mod emission;
pub mod error;
pub mod tags;

// Re-export primary API
pub use crf::{
    Decoded, EmissionTable, LinearChainCrf, NEG_SENTINEL, TransitionMatrix, ViterbiDecoder,
    ViterbiPath,
};
pub use emission::{EmissionSource, LookupEmissions};
pub use error::{CrfError, Result};
pub use tags::{START, STOP, TagRegistry};
