//! Optional label-to-label transition scores.
//!
//! Disabled unless explicitly attached to a [`LinearChainCrf`](super::LinearChainCrf).
//! When present, `get(from, to)` is added whenever the path moves from `from` to
//! `to`, including the step out of START and the final step into STOP.

use serde::{Deserialize, Serialize};

use super::numeric::NEG_SENTINEL;
use crate::error::{CrfError, Result};

/// Dense `num_tags x num_tags` transition scores, row = previous tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMatrix {
    num_tags: usize,
    scores: Vec<f32>,
}

impl TransitionMatrix {
    /// All-zero transitions.
    pub fn zeros(num_tags: usize) -> Self {
        Self {
            num_tags,
            scores: vec![0.0; num_tags * num_tags],
        }
    }

    /// Build from nested rows; every row must have `rows.len()` entries.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let num_tags = rows.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != num_tags) {
            return Err(CrfError::TransitionShape {
                expected: num_tags,
                actual: format!("{num_tags}x{}", bad.len()),
            });
        }
        Ok(Self {
            num_tags,
            scores: rows.into_iter().flatten().collect(),
        })
    }

    pub fn num_tags(&self) -> usize {
        self.num_tags
    }

    /// Score of moving from `from` to `to`.
    #[inline]
    pub fn get(&self, from: usize, to: usize) -> f32 {
        self.scores[from * self.num_tags + to]
    }

    pub fn set(&mut self, from: usize, to: usize, score: f32) {
        self.scores[from * self.num_tags + to] = score;
    }

    /// Make a transition effectively impossible.
    pub fn forbid(&mut self, from: usize, to: usize) {
        self.set(from, to, NEG_SENTINEL);
    }
}
