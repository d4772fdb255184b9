//! CRF loss as candle tensor ops, so gradients reach the emission model.
//!
//! Mirrors `lincrf_core::crf::{forward, gold}` step for step: for every next tag
//! the previous DP vector is shifted by that tag's emission and reduced with
//! log-sum-exp over the previous tag.

use candle_core::{D, Error, Result, Tensor};
use lincrf_core::NEG_SENTINEL;

/// Stable `log(sum(exp(t)))` over `dim`, which is removed.
fn log_sum_exp(t: &Tensor, dim: usize) -> Result<Tensor> {
    let max = t.max_keepdim(dim)?;
    let sum = t.broadcast_sub(&max)?.exp()?.sum_keepdim(dim)?;
    sum.log()?.add(&max)?.squeeze(dim)
}

/// Log-partition value of a `[len, num_tags]` emission tensor.
pub fn log_partition(emissions: &Tensor, start: usize) -> Result<Tensor> {
    let (len, num_tags) = emissions.dims2()?;
    let mut init = vec![NEG_SENTINEL; num_tags];
    init[start] = 0.0;
    let mut alphas = Tensor::from_vec(init, num_tags, emissions.device())?;

    for position in 0..len {
        let obs = emissions.get(position)?;
        // scores[prev][next] = alphas[prev] + obs[next]
        let scores = alphas.unsqueeze(1)?.broadcast_add(&obs.unsqueeze(0)?)?;
        alphas = log_sum_exp(&scores, 0)?;
    }
    log_sum_exp(&alphas, 0)
}

/// Sum of the gold tags' emission scores.
pub fn gold_score(emissions: &Tensor, tags: &[usize]) -> Result<Tensor> {
    let (len, _) = emissions.dims2()?;
    if tags.len() != len {
        return Err(Error::Msg(format!(
            "gold sequence has {} labels but there are {len} emission rows",
            tags.len()
        )));
    }
    if len == 0 {
        return Tensor::new(0f32, emissions.device());
    }
    let ids: Vec<u32> = tags.iter().map(|&t| t as u32).collect();
    let ids = Tensor::new(ids.as_slice(), emissions.device())?.unsqueeze(D::Minus1)?;
    emissions.gather(&ids, 1)?.sum_all()
}

/// `log_partition - gold_score` as a scalar tensor.
pub fn negative_log_likelihood(emissions: &Tensor, tags: &[usize], start: usize) -> Result<Tensor> {
    let unlabeled = log_partition(emissions, start)?;
    let labeled = gold_score(emissions, tags)?;
    unlabeled - labeled
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use candle_core::{Device, Var};
    use lincrf_core::{LinearChainCrf, TagRegistry};

    use super::*;

    fn setup() -> (LinearChainCrf, Vec<Vec<f32>>) {
        let registry = Arc::new(TagRegistry::from_labels(["O", "B-PER", "I-PER"]).unwrap());
        let rows = vec![
            vec![0.5, 1.5, -0.3, 0.1, -0.2],
            vec![1.0, -1.0, 2.0, 0.0, 0.3],
            vec![0.2, 0.2, 0.2, -1.0, 0.0],
        ];
        (LinearChainCrf::new(registry), rows)
    }

    fn tensor(rows: &[Vec<f32>]) -> Tensor {
        Tensor::from_vec(rows.concat(), (rows.len(), rows[0].len()), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_matches_core_loss() {
        let (crf, rows) = setup();
        let gold = ["B-PER", "I-PER", "O"];
        let emissions = tensor(&rows);
        let tags = crf.registry().ids(&gold).unwrap();

        let tensor_z = log_partition(&emissions, crf.registry().start())
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let core_z = crf.forward(&rows).unwrap();
        assert!((tensor_z - core_z).abs() < 1e-4, "{tensor_z} vs {core_z}");

        let tensor_nll = negative_log_likelihood(&emissions, &tags, crf.registry().start())
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let core_nll = crf.negative_log_likelihood(&rows, &gold).unwrap();
        assert!((tensor_nll - core_nll).abs() < 1e-4, "{tensor_nll} vs {core_nll}");
    }

    #[test]
    fn test_gradient_is_marginal_minus_gold() {
        let (crf, rows) = setup();
        let tags = vec![1, 2, 0];
        let emissions = Var::from_tensor(&tensor(&rows)).unwrap();

        let loss = negative_log_likelihood(&emissions, &tags, crf.registry().start()).unwrap();
        let grads = loss.backward().unwrap();
        let grad = grads.get(&emissions).unwrap().to_vec2::<f32>().unwrap();

        for (row, &gold) in grad.iter().zip(tags.iter()) {
            let total: f32 = row.iter().sum();
            assert!(total.abs() < 1e-4, "row gradient sums to {total}");
            assert!(row[gold] < 0.0);
            for (t, g) in row.iter().enumerate() {
                if t != gold {
                    assert!(*g >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_length_mismatch() {
        let emissions = Tensor::zeros((2, 5), candle_core::DType::F32, &Device::Cpu).unwrap();
        assert!(gold_score(&emissions, &[0]).is_err());
    }
}
