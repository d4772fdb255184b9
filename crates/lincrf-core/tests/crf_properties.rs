//! Property-based tests for the CRF layer.
//!
//! Small label sets and short sequences are enumerated exhaustively and compared
//! against the dynamic-programming results.

use std::sync::Arc;

use lincrf_core::{LinearChainCrf, START, STOP, TagRegistry, TransitionMatrix};
use proptest::prelude::*;

// ===== Helpers =====

fn registry(num_real: usize) -> Arc<TagRegistry> {
    Arc::new(TagRegistry::from_labels((0..num_real).map(|i| format!("L{i}"))).unwrap())
}

/// Every id sequence of length `len` over `num_tags` ids.
fn all_sequences(num_tags: usize, len: usize) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::new()];
    for _ in 0..len {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                (0..num_tags).map(move |t| {
                    let mut seq = prefix.clone();
                    seq.push(t);
                    seq
                })
            })
            .collect();
    }
    out
}

fn brute_force_max(crf: &LinearChainCrf, emissions: &[Vec<f32>]) -> f32 {
    all_sequences(crf.registry().len(), emissions.len())
        .iter()
        .map(|seq| crf.gold_score_ids(emissions, seq).unwrap())
        .fold(f32::NEG_INFINITY, f32::max)
}

// ===== Strategies =====

/// (num_real, emission rows); rows are randomly full or real-label width.
fn arb_case() -> impl Strategy<Value = (usize, Vec<Vec<f32>>)> {
    (1usize..=3, 0usize..=4, any::<bool>()).prop_flat_map(|(num_real, len, full)| {
        let width = if full { num_real + 2 } else { num_real };
        (
            Just(num_real),
            prop::collection::vec(prop::collection::vec(-5.0f32..5.0, width), len),
        )
    })
}

fn arb_transitions(num_tags: usize) -> impl Strategy<Value = TransitionMatrix> {
    prop::collection::vec(prop::collection::vec(-2.0f32..2.0, num_tags), num_tags)
        .prop_map(|rows| TransitionMatrix::from_rows(rows).unwrap())
}

fn arb_case_with_transitions() -> impl Strategy<Value = (usize, Vec<Vec<f32>>, TransitionMatrix)>
{
    arb_case().prop_flat_map(|(num_real, rows)| {
        (Just(num_real), Just(rows), arb_transitions(num_real + 2))
    })
}

// ===== Property Tests =====

proptest! {
    #[test]
    fn prop_partition_dominates_every_path((num_real, emissions) in arb_case()) {
        let crf = LinearChainCrf::new(registry(num_real));
        let log_z = crf.forward(&emissions).unwrap();
        prop_assert!(log_z.is_finite());

        for seq in all_sequences(crf.registry().len(), emissions.len()) {
            let gold = crf.gold_score_ids(&emissions, &seq).unwrap();
            prop_assert!(log_z + 1e-3 >= gold, "log Z {} < gold {} for {:?}", log_z, gold, seq);
        }
    }

    #[test]
    fn prop_viterbi_matches_brute_force((num_real, emissions) in arb_case()) {
        let crf = LinearChainCrf::new(registry(num_real));
        let decoded = crf.decode(&emissions).unwrap();
        let best = brute_force_max(&crf, &emissions);

        prop_assert_eq!(decoded.tags.len(), emissions.len());
        prop_assert!(
            (decoded.score - best).abs() < 1e-4,
            "viterbi {} vs brute {}",
            decoded.score,
            best
        );

        let rescored = crf.gold_score_ids(&emissions, &decoded.tags).unwrap();
        prop_assert!((decoded.score - rescored).abs() < 1e-4);
    }

    #[test]
    fn prop_viterbi_matches_brute_force_with_transitions(
        (num_real, emissions, transitions) in arb_case_with_transitions()
    ) {
        let crf = LinearChainCrf::new(registry(num_real))
            .with_transitions(transitions)
            .unwrap();
        let decoded = crf.decode(&emissions).unwrap();
        let best = brute_force_max(&crf, &emissions);
        prop_assert!(
            (decoded.score - best).abs() < 1e-3,
            "viterbi {} vs brute {}",
            decoded.score,
            best
        );

        let log_z = crf.forward(&emissions).unwrap();
        prop_assert!(log_z + 1e-3 >= best);
    }

    #[test]
    fn prop_nll_non_negative((num_real, emissions) in arb_case()) {
        let crf = LinearChainCrf::new(registry(num_real));
        let decoded = crf.decode(&emissions).unwrap();
        let nll = crf.negative_log_likelihood(&emissions, &decoded.labels).unwrap();
        prop_assert!(nll >= -1e-3);
    }

    #[test]
    fn prop_decode_idempotent((num_real, emissions) in arb_case()) {
        let crf = LinearChainCrf::new(registry(num_real));
        prop_assert_eq!(crf.decode(&emissions).unwrap(), crf.decode(&emissions).unwrap());
    }
}

// ===== Concrete scenarios =====

#[test]
fn extreme_emissions_do_not_overflow() {
    let crf = LinearChainCrf::new(registry(3));
    let emissions = vec![vec![1e6f32; 5]; 4];
    let log_z = crf.forward(&emissions).unwrap();
    assert!(log_z.is_finite());
    assert!(!log_z.is_nan());

    let decoded = crf.decode(&emissions).unwrap();
    assert!(decoded.score.is_finite());
}

#[test]
fn o_b_i_scenario() {
    let crf = LinearChainCrf::new(Arc::new(TagRegistry::from_labels(["O", "B", "I"]).unwrap()));
    let decoded = crf
        .decode(&[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]])
        .unwrap();
    assert_eq!(decoded.labels, vec!["O", "B"]);
    assert_eq!(decoded.score, 2.0);
}

#[test]
fn empty_sentence() {
    let crf = LinearChainCrf::new(registry(2));
    let decoded = crf.decode(&[]).unwrap();
    assert!(decoded.labels.is_empty());
    assert_eq!(decoded.score, 0.0);
    assert_eq!(crf.forward(&[]).unwrap(), 0.0);
}

#[test]
fn registry_is_shareable_across_threads() {
    let crf = LinearChainCrf::new(registry(3));
    let emissions = vec![vec![0.5, 1.0, -0.5]; 3];

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let crf = crf.clone();
            let emissions = emissions.clone();
            std::thread::spawn(move || crf.decode(&emissions).unwrap())
        })
        .collect();

    let expected = crf.decode(&emissions).unwrap();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn registry_roundtrip_includes_sentinels() {
    let reg = registry(3);
    for id in 0..reg.len() {
        assert_eq!(reg.id(reg.name(id).unwrap()).unwrap(), id);
    }
    assert_eq!(reg.id(START).unwrap(), reg.start());
    assert_eq!(reg.id(STOP).unwrap(), reg.stop());
}
