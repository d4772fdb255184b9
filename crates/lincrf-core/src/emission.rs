//! The seam between the CRF and whatever produces per-position scores.

use crate::error::{CrfError, Result};

/// Producer of emission scores for one input sequence.
///
/// Each returned row is one position; its width is either the registry's full
/// `len()` or its `num_real()` (see [`EmissionTable`](crate::crf::EmissionTable)).
pub trait EmissionSource {
    /// The per-sequence input (token ids, raw words, ...).
    type Input: ?Sized;

    fn emissions(&self, input: &Self::Input) -> Result<Vec<Vec<f32>>>;
}

/// Emission scores looked up from a fixed `[token, label]` table.
///
/// Useful for tests and for models whose scores do not depend on context.
#[derive(Debug, Clone)]
pub struct LookupEmissions {
    table: Vec<Vec<f32>>,
}

impl LookupEmissions {
    pub fn new(table: Vec<Vec<f32>>) -> Self {
        Self { table }
    }
}

impl EmissionSource for LookupEmissions {
    type Input = [usize];

    fn emissions(&self, input: &[usize]) -> Result<Vec<Vec<f32>>> {
        input
            .iter()
            .map(|&token| {
                self.table.get(token).cloned().ok_or_else(|| {
                    CrfError::Emission(format!("token id {token} has no scores"))
                })
            })
            .collect()
    }
}
