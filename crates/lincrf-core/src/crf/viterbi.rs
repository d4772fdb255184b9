//! # Viterbi Decoding
//!
//! Max-sum dynamic programming with backpointers over the same scoring scheme as
//! the forward algorithm.
//!
//! Without transitions the best predecessor only depends on the previous DP
//! vector, so every candidate tag at a position shares it; the argmax is taken
//! once per position in that case.

use super::numeric::{argmax, initial_vector};
use super::table::EmissionTable;
use super::transitions::TransitionMatrix;
use crate::error::{CrfError, Result};

/// Best tag sequence (as ids) and its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ViterbiPath {
    pub tags: Vec<usize>,
    pub score: f32,
}

/// Viterbi decoder anchored on the registry's START/STOP ids.
#[derive(Debug, Clone, Copy)]
pub struct ViterbiDecoder {
    start: usize,
    stop: usize,
}

impl ViterbiDecoder {
    /// Create a decoder.
    ///
    /// # Arguments
    /// * `start` - id seeding the initial DP vector
    /// * `stop` - id whose transition column closes the path (transitions only)
    pub fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    /// Decode the highest-scoring tag sequence.
    ///
    /// An empty table yields an empty path scored at 0, the max of the
    /// START-seeded vector.
    pub fn decode(
        &self,
        table: &EmissionTable<'_>,
        transitions: Option<&TransitionMatrix>,
    ) -> Result<ViterbiPath> {
        let num_tags = table.num_tags();
        let mut vvars = initial_vector(num_tags, self.start);
        let mut backpointers: Vec<Vec<usize>> = Vec::with_capacity(table.len());
        let mut column = vec![0.0f32; num_tags];

        for position in 0..table.len() {
            let mut bptrs_t = Vec::with_capacity(num_tags);
            let mut best_t = Vec::with_capacity(num_tags);

            match transitions {
                Some(t) => {
                    for next_tag in 0..num_tags {
                        for (prev, slot) in column.iter_mut().enumerate() {
                            *slot = vvars[prev] + t.get(prev, next_tag);
                        }
                        let (best_id, best_value) = argmax(&column);
                        bptrs_t.push(best_id);
                        best_t.push(best_value);
                    }
                }
                None => {
                    let (best_id, best_value) = argmax(&vvars);
                    bptrs_t.resize(num_tags, best_id);
                    best_t.resize(num_tags, best_value);
                }
            }

            for (tag, value) in best_t.iter_mut().enumerate() {
                *value += table.score(position, tag);
            }
            vvars = best_t;
            backpointers.push(bptrs_t);
        }

        if let Some(t) = transitions {
            for (prev, value) in vvars.iter_mut().enumerate() {
                *value += t.get(prev, self.stop);
            }
        }
        let (mut best_tag, score) = argmax(&vvars);

        let mut path = Vec::with_capacity(table.len() + 1);
        path.push(best_tag);
        for bptrs_t in backpointers.iter().rev() {
            best_tag = bptrs_t[best_tag];
            path.push(best_tag);
        }

        // The last traced id is the START seed, not part of the output.
        let first = path.pop().unwrap_or(self.start);
        if first != self.start {
            return Err(CrfError::BrokenBackpointer {
                found: first,
                start: self.start,
            });
        }
        path.reverse();

        Ok(ViterbiPath { tags: path, score })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagRegistry;

    fn obi() -> TagRegistry {
        TagRegistry::from_labels(["O", "B", "I"]).unwrap()
    }

    #[test]
    fn test_viterbi_simple() {
        let reg = obi();
        let decoder = ViterbiDecoder::new(reg.start(), reg.stop());
        let rows = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]];
        let table = EmissionTable::new(&rows, &reg).unwrap();

        let path = decoder.decode(&table, None).unwrap();
        assert_eq!(path.tags, vec![0, 1]);
        assert_eq!(path.score, 2.0);
    }

    #[test]
    fn test_viterbi_empty() {
        let reg = obi();
        let decoder = ViterbiDecoder::new(reg.start(), reg.stop());
        let rows: Vec<Vec<f32>> = vec![];
        let table = EmissionTable::new(&rows, &reg).unwrap();

        let path = decoder.decode(&table, None).unwrap();
        assert!(path.tags.is_empty());
        assert_eq!(path.score, 0.0);
    }

    #[test]
    fn test_transitions_override_emissions() {
        let reg = obi();
        let decoder = ViterbiDecoder::new(reg.start(), reg.stop());
        // I is slightly preferred at position 1, but O -> I is forbidden.
        let rows = vec![vec![1.0, 0.0, 0.0], vec![0.0, 0.9, 1.0]];
        let table = EmissionTable::new(&rows, &reg).unwrap();
        let mut trans = TransitionMatrix::zeros(reg.len());
        trans.forbid(0, 2);

        let plain = decoder.decode(&table, None).unwrap();
        assert_eq!(plain.tags, vec![0, 2]);

        let constrained = decoder.decode(&table, Some(&trans)).unwrap();
        assert_eq!(constrained.tags, vec![0, 1]);
        assert!((constrained.score - 1.9).abs() < 1e-6);
    }

    #[test]
    fn test_broken_trace_detected() {
        let reg = obi();
        let decoder = ViterbiDecoder::new(reg.start(), reg.stop());
        let rows = vec![vec![0.0, 0.0, 0.0]];
        let table = EmissionTable::new(&rows, &reg).unwrap();
        // Leaving START costs more than the sentinel, so O's best predecessor is O.
        let mut trans = TransitionMatrix::zeros(reg.len());
        for to in 0..reg.len() {
            trans.set(reg.start(), to, -1e11);
        }

        let err = decoder.decode(&table, Some(&trans)).unwrap_err();
        assert!(matches!(err, CrfError::BrokenBackpointer { .. }));
    }
}
