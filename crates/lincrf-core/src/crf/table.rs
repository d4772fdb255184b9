use super::numeric::NEG_SENTINEL;
use crate::error::{CrfError, Result};
use crate::tags::TagRegistry;

/// Validated, read-only view over one sequence's emission rows.
///
/// Rows are either `num_labels` wide or `num_real` wide. Narrow rows read the
/// START/STOP columns as [`NEG_SENTINEL`].
#[derive(Debug, Clone, Copy)]
pub struct EmissionTable<'a> {
    rows: &'a [Vec<f32>],
    num_tags: usize,
}

impl<'a> EmissionTable<'a> {
    pub fn new(rows: &'a [Vec<f32>], registry: &TagRegistry) -> Result<Self> {
        let full = registry.len();
        let real = registry.num_real();
        for (position, row) in rows.iter().enumerate() {
            if row.len() != full && row.len() != real {
                return Err(CrfError::WidthMismatch {
                    position,
                    expected: format!("{full} or {real}"),
                    actual: row.len(),
                });
            }
        }
        Ok(Self {
            rows,
            num_tags: full,
        })
    }

    /// Sequence length.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Width of the DP vectors, sentinels included.
    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    #[inline]
    pub fn score(&self, position: usize, tag: usize) -> f32 {
        self.rows[position]
            .get(tag)
            .copied()
            .unwrap_or(NEG_SENTINEL)
    }
}
