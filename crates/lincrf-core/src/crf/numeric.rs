//! Log-space helpers shared by the forward algorithm and the Viterbi decoder.

/// Stand-in for `-inf` in log space.
///
/// A finite constant keeps `sentinel - sentinel` at zero instead of NaN.
pub const NEG_SENTINEL: f32 = -1e10;

/// The DP vector before any position is consumed: everything at the sentinel
/// except `start`, which holds all the mass.
pub fn initial_vector(num_tags: usize, start: usize) -> Vec<f32> {
    let mut init = vec![NEG_SENTINEL; num_tags];
    init[start] = 0.0;
    init
}

/// `log(sum(exp(values)))`, shifted by the running max so large entries cannot
/// overflow.
pub fn log_sum_exp(values: &[f32]) -> f32 {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    debug_assert!(
        max.is_finite(),
        "log-sum-exp over a vector with no finite entry"
    );
    if !max.is_finite() {
        return max;
    }
    let sum: f32 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Index and value of the first maximum (ties go to the lowest index).
pub fn argmax(values: &[f32]) -> (usize, f32) {
    let mut best = (0, values.first().copied().unwrap_or(f32::NEG_INFINITY));
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}
