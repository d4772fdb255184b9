//! # Linear-chain CRF
//!
//! Exact inference over tag sequences given per-position emission scores.
//!
//! ```text
//! score(y, x) = Σ_i obs_i[y_i]                      (default)
//!             = Σ_i trans[y_{i-1}][y_i] + obs_i[y_i]
//!               + trans[y_L][STOP]                  (with a TransitionMatrix)
//! ```
//!
//! with `y_0 = START`. All entry points are pure: they read the emissions and
//! return a value, holding no state between calls.

pub mod forward;
pub mod gold;
pub mod numeric;
pub mod table;
pub mod transitions;
pub mod viterbi;

use std::sync::Arc;

use tracing::debug;

use crate::emission::EmissionSource;
use crate::error::{CrfError, Result};
use crate::tags::TagRegistry;
pub use numeric::NEG_SENTINEL;
pub use table::EmissionTable;
pub use transitions::TransitionMatrix;
pub use viterbi::{ViterbiDecoder, ViterbiPath};

/// Result of decoding one sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Best tag ids, one per position.
    pub tags: Vec<usize>,
    /// The same tags as label names.
    pub labels: Vec<String>,
    /// Score of the best path.
    pub score: f32,
}

/// CRF layer bound to a tag registry.
#[derive(Debug, Clone)]
pub struct LinearChainCrf {
    registry: Arc<TagRegistry>,
    transitions: Option<TransitionMatrix>,
}

impl LinearChainCrf {
    /// CRF without transition scores.
    pub fn new(registry: Arc<TagRegistry>) -> Self {
        Self {
            registry,
            transitions: None,
        }
    }

    /// Attach transition scores; the matrix must cover every id, sentinels included.
    pub fn with_transitions(mut self, transitions: TransitionMatrix) -> Result<Self> {
        if transitions.num_tags() != self.registry.len() {
            return Err(CrfError::TransitionShape {
                expected: self.registry.len(),
                actual: format!("{0}x{0}", transitions.num_tags()),
            });
        }
        self.transitions = Some(transitions);
        Ok(self)
    }

    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    pub fn transitions(&self) -> Option<&TransitionMatrix> {
        self.transitions.as_ref()
    }

    fn table<'a>(&self, emissions: &'a [Vec<f32>]) -> Result<EmissionTable<'a>> {
        EmissionTable::new(emissions, &self.registry)
    }

    /// Log-partition value over all tag sequences.
    pub fn forward(&self, emissions: &[Vec<f32>]) -> Result<f32> {
        let table = self.table(emissions)?;
        Ok(forward::log_partition(
            &table,
            self.transitions.as_ref(),
            self.registry.start(),
            self.registry.stop(),
        ))
    }

    /// Score of a gold sequence given as label names.
    pub fn gold_score<S: AsRef<str>>(&self, emissions: &[Vec<f32>], gold: &[S]) -> Result<f32> {
        let tags = self.registry.ids(gold)?;
        self.gold_score_ids(emissions, &tags)
    }

    /// Score of a gold sequence given as ids.
    pub fn gold_score_ids(&self, emissions: &[Vec<f32>], tags: &[usize]) -> Result<f32> {
        let table = self.table(emissions)?;
        gold::path_score(
            &table,
            tags,
            self.transitions.as_ref(),
            self.registry.start(),
            self.registry.stop(),
        )
    }

    /// `forward - gold_score`, the training loss of one sequence.
    pub fn negative_log_likelihood<S: AsRef<str>>(
        &self,
        emissions: &[Vec<f32>],
        gold: &[S],
    ) -> Result<f32> {
        let unlabeled = self.forward(emissions)?;
        let labeled = self.gold_score(emissions, gold)?;
        Ok(unlabeled - labeled)
    }

    /// Highest-scoring label sequence and its score.
    pub fn decode(&self, emissions: &[Vec<f32>]) -> Result<Decoded> {
        let table = self.table(emissions)?;
        let decoder = ViterbiDecoder::new(self.registry.start(), self.registry.stop());
        let ViterbiPath { tags, score } = decoder.decode(&table, self.transitions.as_ref())?;
        debug!(len = tags.len(), score, "viterbi path");

        let labels = self.registry.names(&tags)?;
        Ok(Decoded {
            tags,
            labels,
            score,
        })
    }

    /// Pull emissions from a source and decode them.
    pub fn decode_source<E>(&self, source: &E, input: &E::Input) -> Result<Decoded>
    where
        E: EmissionSource + ?Sized,
    {
        let emissions = source.emissions(input)?;
        self.decode(&emissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crf() -> LinearChainCrf {
        LinearChainCrf::new(Arc::new(TagRegistry::from_labels(["O", "B", "I"]).unwrap()))
    }

    #[test]
    fn test_decode_o_then_b() {
        let crf = crf();
        let emissions = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        let decoded = crf.decode(&emissions).unwrap();
        assert_eq!(decoded.labels, vec!["O", "B"]);
        assert_eq!(decoded.tags, vec![0, 1]);
        assert_eq!(decoded.score, 2.0);
    }

    #[test]
    fn test_decode_empty() {
        let decoded = crf().decode(&[]).unwrap();
        assert!(decoded.labels.is_empty());
        assert_eq!(decoded.score, 0.0);
    }

    #[test]
    fn test_decode_is_idempotent() {
        let crf = crf();
        let emissions = vec![vec![0.2, 0.7, 0.1], vec![0.3, 0.3, 0.9], vec![1.0, -1.0, 0.0]];
        assert_eq!(crf.decode(&emissions).unwrap(), crf.decode(&emissions).unwrap());
    }

    #[test]
    fn test_full_width_rows_can_select_sentinels() {
        let crf = crf();
        let emissions = vec![vec![0.0, 0.0, 0.0, 5.0, 0.0]];
        let decoded = crf.decode(&emissions).unwrap();
        assert_eq!(decoded.labels, vec!["<START>"]);
    }

    #[test]
    fn test_nll_is_forward_minus_gold() {
        let crf = crf();
        let emissions = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        let nll = crf.negative_log_likelihood(&emissions, &["O", "B"]).unwrap();
        let forward = crf.forward(&emissions).unwrap();
        let gold = crf.gold_score(&emissions, &["O", "B"]).unwrap();
        assert_eq!(nll, forward - gold);
        assert!(nll > 0.0);
    }

    #[test]
    fn test_unknown_gold_label_fails() {
        let crf = crf();
        let emissions = vec![vec![1.0, 0.0, 0.0]];
        let err = crf.negative_log_likelihood(&emissions, &["B-LOC"]).unwrap_err();
        assert!(matches!(err, CrfError::UnknownLabel { .. }));
    }

    #[test]
    fn test_transition_shape_checked() {
        let err = crf().with_transitions(TransitionMatrix::zeros(3)).unwrap_err();
        assert!(matches!(err, CrfError::TransitionShape { expected: 5, .. }));
    }
}
