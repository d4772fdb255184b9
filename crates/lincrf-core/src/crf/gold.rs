//! Score of one fixed tag sequence.
//!
//! START is prepended as the predecessor of the first position; it contributes no
//! emission lookup of its own.

use super::table::EmissionTable;
use super::transitions::TransitionMatrix;
use crate::error::{CrfError, Result};

/// Sum of the chosen tags' emission scores (plus transitions when attached).
pub fn path_score(
    table: &EmissionTable<'_>,
    tags: &[usize],
    transitions: Option<&TransitionMatrix>,
    start: usize,
    stop: usize,
) -> Result<f32> {
    if tags.len() != table.len() {
        return Err(CrfError::LengthMismatch {
            gold: tags.len(),
            emissions: table.len(),
        });
    }
    if let Some(&bad) = tags.iter().find(|&&t| t >= table.num_tags()) {
        return Err(CrfError::UnknownTagId(bad));
    }

    let mut score = 0.0f32;
    let mut prev = start;
    for (position, &tag) in tags.iter().enumerate() {
        if let Some(t) = transitions {
            score += t.get(prev, tag);
        }
        score += table.score(position, tag);
        prev = tag;
    }
    if let Some(t) = transitions {
        score += t.get(prev, stop);
    }
    Ok(score)
}
