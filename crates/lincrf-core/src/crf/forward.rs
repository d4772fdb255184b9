//! # Forward Algorithm
//!
//! Computes `log Σ_y exp(score(y))` over every tag sequence in
//! `O(L · T²)`, where `T` counts the sentinels too.
//!
//! ```text
//! α_0[t]  = 0 if t == START else -1e10
//! α_i[t]  = logsumexp_p( α_{i-1}[p] + trans[p][t] + obs_i[t] )
//! log Z   = logsumexp_p( α_L[p] + trans[p][STOP] )
//! ```
//!
//! The `trans` terms only exist when a [`TransitionMatrix`] is attached.

use super::numeric::{initial_vector, log_sum_exp};
use super::table::EmissionTable;
use super::transitions::TransitionMatrix;

/// Log-partition value of one sequence.
pub fn log_partition(
    table: &EmissionTable<'_>,
    transitions: Option<&TransitionMatrix>,
    start: usize,
    stop: usize,
) -> f32 {
    let num_tags = table.num_tags();
    let mut alphas = initial_vector(num_tags, start);
    let mut scratch = vec![0.0f32; num_tags];

    for position in 0..table.len() {
        let mut next = Vec::with_capacity(num_tags);
        for next_tag in 0..num_tags {
            let obs = table.score(position, next_tag);
            for (prev, slot) in scratch.iter_mut().enumerate() {
                let base = match transitions {
                    Some(t) => alphas[prev] + t.get(prev, next_tag),
                    None => alphas[prev],
                };
                *slot = base + obs;
            }
            next.push(log_sum_exp(&scratch));
        }
        alphas = next;
    }

    if let Some(t) = transitions {
        for (prev, alpha) in alphas.iter_mut().enumerate() {
            *alpha += t.get(prev, stop);
        }
    }
    log_sum_exp(&alphas)
}
