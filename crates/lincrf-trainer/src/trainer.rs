//! Training loop for the embedding + CRF tagger.

use std::time::Instant;

use anyhow::Context;
use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW, SGD};
use lincrf_core::TagRegistry;
use oorandom::Rand32;
use tracing::{debug, info};

use crate::config::{OptimizerKind, TrainConfig};
use crate::data::{CorpusReader, Instance, use_iobes};
use crate::eval::{Metrics, evaluate};
use crate::model::EmbeddingTagger;
use crate::vocab::{PretrainedEmbeddings, Vocab};

/// Train, dev and test splits.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub train: Vec<Instance>,
    pub dev: Vec<Instance>,
    pub test: Vec<Instance>,
}

impl Corpus {
    /// Read the three splits named in `config`, converting labels to IOBES if asked.
    pub fn load(config: &TrainConfig) -> anyhow::Result<Self> {
        let reader = CorpusReader::new(config.digit2zero)?;
        let mut corpus = Self {
            train: reader.read_file(&config.train_file, config.train_num)?,
            dev: reader.read_file(&config.dev_file, config.dev_num)?,
            test: reader.read_file(&config.test_file, config.test_num)?,
        };
        if config.iobes {
            use_iobes(&mut corpus.train);
            use_iobes(&mut corpus.dev);
            use_iobes(&mut corpus.test);
        }
        info!(
            "{} train, {} dev, {} test sentences",
            corpus.train.len(),
            corpus.dev.len(),
            corpus.test.len()
        );
        Ok(corpus)
    }

    /// Label set in first-seen order over the training split.
    pub fn labels(&self) -> lincrf_core::Result<TagRegistry> {
        TagRegistry::from_labels(self.train.iter().flat_map(|inst| inst.labels.iter()))
    }
}

/// Build a fresh model for `corpus`: vocabularies, labels and initial embeddings.
pub fn build_model(config: &TrainConfig, corpus: &Corpus) -> anyhow::Result<EmbeddingTagger> {
    let splits = [
        corpus.train.as_slice(),
        corpus.dev.as_slice(),
        corpus.test.as_slice(),
    ];
    let words = Vocab::words(&splits);
    let chars = Vocab::chars(&splits);
    let labels = corpus.labels()?;
    info!("num words: {}", words.len());
    info!("num chars: {}", chars.len());

    let pretrained = config
        .embedding_file
        .as_ref()
        .map(PretrainedEmbeddings::load)
        .transpose()?;

    let mut rng = Rand32::new(config.seed);
    EmbeddingTagger::new(config, words, chars, labels, pretrained.as_ref(), &mut rng)
}

enum Optimizer {
    Sgd(SGD),
    Adam(AdamW),
}

impl Optimizer {
    fn new(config: &TrainConfig, vars: Vec<Var>) -> candle_core::Result<Self> {
        Ok(match config.optimizer {
            OptimizerKind::Sgd => Self::Sgd(SGD::new(vars, config.learning_rate)?),
            OptimizerKind::Adam => Self::Adam(AdamW::new(
                vars,
                ParamsAdamW {
                    lr: config.learning_rate,
                    weight_decay: config.l2,
                    ..Default::default()
                },
            )?),
        })
    }

    fn step(&mut self, grads: &GradStore) -> candle_core::Result<()> {
        match self {
            Self::Sgd(opt) => opt.step(grads),
            Self::Adam(opt) => opt.step(grads),
        }
    }
}

/// Rescale `grads` so their global L2 norm is at most `threshold`.
///
/// Returns the norm before clipping.
pub fn clip_gradients(
    grads: &mut GradStore,
    vars: &[Var],
    threshold: f64,
) -> candle_core::Result<f64> {
    let mut sum = 0f64;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            sum += grad.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = sum.sqrt();
    if threshold > 0.0 && norm > threshold {
        let scale = threshold / norm;
        for var in vars {
            if let Some(grad) = grads.get(var.as_tensor()) {
                let clipped = grad.affine(scale, 0.0)?;
                grads.insert(var.as_tensor(), clipped);
            }
        }
    }
    Ok(norm)
}

/// Best scores seen during [`Trainer::fit`]; `-1` until the first evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub best_dev: f64,
    pub best_dev_epoch: usize,
    pub best_test: f64,
    pub best_test_epoch: usize,
}

impl Default for TrainSummary {
    fn default() -> Self {
        Self {
            best_dev: -1.0,
            best_dev_epoch: 0,
            best_test: -1.0,
            best_test_epoch: 0,
        }
    }
}

pub struct Trainer {
    model: EmbeddingTagger,
    optimizer: Optimizer,
    vars: Vec<Var>,
    config: TrainConfig,
}

impl Trainer {
    pub fn new(model: EmbeddingTagger) -> anyhow::Result<Self> {
        let config = model.config().clone();
        let vars = model.varmap().all_vars();
        let optimizer = Optimizer::new(&config, vars.clone())?;
        Ok(Self {
            model,
            optimizer,
            vars,
            config,
        })
    }

    pub fn model(&self) -> &EmbeddingTagger {
        &self.model
    }

    pub fn into_model(self) -> EmbeddingTagger {
        self.model
    }

    /// One update on the mean loss of `batch`; returns that loss.
    pub fn train_batch(&mut self, batch: &[&Instance]) -> anyhow::Result<f32> {
        let losses = batch
            .iter()
            .filter(|inst| !inst.is_empty())
            .map(|inst| self.model.loss(&inst.words, &inst.labels))
            .collect::<anyhow::Result<Vec<_>>>()?;
        if losses.is_empty() {
            return Ok(0.0);
        }

        let loss = if losses.len() == 1 {
            losses[0].clone()
        } else {
            Tensor::stack(&losses, 0)?.mean_all()?
        };
        let value = loss.to_scalar::<f32>()?;

        let mut grads = loss.backward()?;
        let norm = clip_gradients(&mut grads, &self.vars, self.config.clip_threshold)?;
        debug!(loss = value, grad_norm = norm, "update");
        self.optimizer.step(&grads)?;
        Ok(value)
    }

    /// Decode every instance, store the predictions and score them.
    ///
    /// A predicted START/STOP label is kept as is and counts as outside any span.
    pub fn evaluate(&self, instances: &mut [Instance]) -> anyhow::Result<Metrics> {
        let registry = self.model.registry();
        let mut sentinels = 0usize;
        for inst in instances.iter_mut() {
            let decoded = self.model.decode(&inst.words)?;
            sentinels += decoded
                .tags
                .iter()
                .filter(|&&t| registry.is_sentinel(t))
                .count();
            inst.prediction = Some(decoded.labels);
        }
        if sentinels > 0 {
            debug!(sentinels, "predicted START/STOP labels");
        }
        Ok(evaluate(instances))
    }

    /// Run the full training schedule, saving the model whenever dev F1 improves.
    pub fn fit(&mut self, corpus: &mut Corpus) -> anyhow::Result<TrainSummary> {
        let mut summary = TrainSummary::default();
        let mut rng = Rand32::new(self.config.seed);
        let mut order: Vec<usize> = (0..corpus.train.len()).collect();
        let batch_size = self.config.batch_size.max(1);
        let eval_freq = self.config.eval_freq.max(1);

        info!("number of instances: {}", corpus.train.len());
        info!(
            "The model will be saved to: {}",
            self.config.model_dir.display()
        );

        for epoch in 0..self.config.num_epochs {
            let start = Instant::now();
            let mut epoch_loss = 0f64;
            let mut since_eval = 0usize;

            if self.config.shuffle {
                shuffle(&mut order, &mut rng);
            }

            for (chunk_no, chunk) in order.chunks(batch_size).enumerate() {
                let batch: Vec<&Instance> = chunk.iter().map(|&i| &corpus.train[i]).collect();
                epoch_loss += self.train_batch(&batch)? as f64;
                since_eval += batch.len();

                let last = (chunk_no + 1) * batch_size >= order.len();
                if epoch + 1 >= self.config.eval_epoch && (since_eval >= eval_freq || last) {
                    self.evaluate_and_save(corpus, epoch, &mut summary)?;
                    since_eval = 0;
                }
            }

            info!(
                "Epoch {}: {:.5}, Time is {:.2}s",
                epoch + 1,
                epoch_loss,
                start.elapsed().as_secs_f64()
            );
        }

        info!("The best dev: {:.2}", summary.best_dev);
        info!("The best test: {:.2}", summary.best_test);
        Ok(summary)
    }

    fn evaluate_and_save(
        &self,
        corpus: &mut Corpus,
        epoch: usize,
        summary: &mut TrainSummary,
    ) -> anyhow::Result<()> {
        let dev = self.evaluate(&mut corpus.dev)?;
        info!("[Dev set] {dev}");
        let test = self.evaluate(&mut corpus.test)?;
        info!("[Test set] {test}");

        if dev.f1 > summary.best_dev {
            summary.best_dev = dev.f1;
            summary.best_dev_epoch = epoch;
            self.model
                .save(&self.config.model_dir)
                .context("failed to save the best model")?;
        }
        if test.f1 > summary.best_test {
            summary.best_test = test.f1;
            summary.best_test_epoch = epoch;
        }
        Ok(())
    }
}

fn shuffle(order: &mut [usize], rng: &mut Rand32) {
    for i in (1..order.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        order.swap(i, j);
    }
}

/// Load the corpus named in `config`, build a model and train it.
pub fn run_training(config: &TrainConfig) -> anyhow::Result<TrainSummary> {
    let mut corpus = Corpus::load(config)?;
    let model = build_model(config, &corpus)?;
    let mut trainer = Trainer::new(model)?;
    trainer.fit(&mut corpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst(words: &[&str], labels: &[&str]) -> Instance {
        Instance::new(
            words.iter().map(|s| s.to_string()).collect(),
            labels.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn toy_corpus() -> Corpus {
        let train = vec![
            inst(&["john", "lives", "in", "paris"], &["S-PER", "O", "O", "S-LOC"]),
            inst(&["mary", "visited", "london"], &["S-PER", "O", "S-LOC"]),
            inst(&["paris", "is", "big"], &["S-LOC", "O", "O"]),
        ];
        Corpus {
            dev: train.clone(),
            test: train.clone(),
            train,
        }
    }

    fn toy_config(dir: &str) -> TrainConfig {
        TrainConfig::new()
            .with_embedding_dim(8)
            .with_epochs(3)
            .with_model_dir(std::env::temp_dir().join(dir))
    }

    fn total_loss(model: &EmbeddingTagger, corpus: &Corpus) -> f32 {
        corpus
            .train
            .iter()
            .map(|i| model.loss(&i.words, &i.labels).unwrap().to_scalar::<f32>().unwrap())
            .sum()
    }

    #[test]
    fn test_loss_decreases_with_sgd() {
        let corpus = toy_corpus();
        let config = toy_config("lincrf-sgd");
        let model = build_model(&config, &corpus).unwrap();
        let before = total_loss(&model, &corpus);

        let mut trainer = Trainer::new(model).unwrap();
        for _ in 0..20 {
            for i in &corpus.train {
                trainer.train_batch(&[i]).unwrap();
            }
        }
        let after = total_loss(trainer.model(), &corpus);
        assert!(after < before, "{after} >= {before}");
    }

    #[test]
    fn test_minibatch_with_adam() {
        let corpus = toy_corpus();
        let config = toy_config("lincrf-adam")
            .with_optimizer(OptimizerKind::Adam, 0.01)
            .with_batch_size(2);
        let model = build_model(&config, &corpus).unwrap();
        let mut trainer = Trainer::new(model).unwrap();
        let batch: Vec<&Instance> = corpus.train.iter().collect();
        let loss = trainer.train_batch(&batch).unwrap();
        assert!(loss.is_finite() && loss > -1e-4);
    }

    #[test]
    fn test_empty_batch_is_skipped() {
        let corpus = toy_corpus();
        let model = build_model(&toy_config("lincrf-empty"), &corpus).unwrap();
        let mut trainer = Trainer::new(model).unwrap();
        let empty = inst(&[], &[]);
        assert_eq!(trainer.train_batch(&[&empty]).unwrap(), 0.0);
    }

    #[test]
    fn test_clip_gradients_bounds_norm() {
        let var = Var::new(&[1f32, 1.0], &candle_core::Device::Cpu).unwrap();
        let loss = var.as_tensor().affine(30.0, 0.0).unwrap().sum_all().unwrap();
        let mut grads = loss.backward().unwrap();
        let vars = vec![var];

        let norm = clip_gradients(&mut grads, &vars, 5.0).unwrap();
        assert!((norm - (1800f64).sqrt()).abs() < 1e-3);
        let clipped = grads.get(vars[0].as_tensor()).unwrap().to_vec1::<f32>().unwrap();
        let clipped_norm = clipped.iter().map(|g| g * g).sum::<f32>().sqrt();
        assert!((clipped_norm - 5.0).abs() < 1e-3);
    }

    #[test]
    fn test_evaluate_fills_predictions() {
        let mut corpus = toy_corpus();
        let model = build_model(&toy_config("lincrf-eval"), &corpus).unwrap();
        let trainer = Trainer::new(model).unwrap();

        let metrics = trainer.evaluate(&mut corpus.dev).unwrap();
        assert!((0.0..=100.0).contains(&metrics.f1));
        for inst in &corpus.dev {
            let prediction = inst.prediction.as_ref().unwrap();
            assert_eq!(prediction.len(), inst.len());
        }
    }

    #[test]
    fn test_fit_saves_best_model() {
        let mut corpus = toy_corpus();
        let config = toy_config(&format!("lincrf-fit-{}", std::process::id()));
        let dir = config.model_dir.clone();
        let model = build_model(&config, &corpus).unwrap();
        let mut trainer = Trainer::new(model).unwrap();

        let summary = trainer.fit(&mut corpus).unwrap();
        assert!(summary.best_dev >= 0.0);
        assert!(corpus.dev.iter().all(|i| i.prediction.is_some()));

        let loaded = EmbeddingTagger::load(&dir).unwrap();
        assert_eq!(loaded.registry(), trainer.model().registry());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_shuffle_is_seeded_permutation() {
        let mut a: Vec<usize> = (0..10).collect();
        let mut b = a.clone();
        shuffle(&mut a, &mut Rand32::new(1));
        shuffle(&mut b, &mut Rand32::new(1));
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>());
    }
}
