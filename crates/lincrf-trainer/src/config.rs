//! Training configuration.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Dropout must stay strictly below 1.
pub const MAX_DROPOUT: f32 = 0.95;

/// Optimizer used for parameter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    /// Plain SGD with `learning_rate`.
    Sgd,
    /// Adam with default betas; `l2` becomes decoupled weight decay.
    Adam,
}

/// Everything the trainer needs besides the corpus itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub seed: u64,
    /// Replace every digit in a word with `0`.
    pub digit2zero: bool,
    /// Convert BIO labels to IOBES before building the label set.
    pub iobes: bool,

    pub train_file: PathBuf,
    pub dev_file: PathBuf,
    pub test_file: PathBuf,
    /// Pretrained embeddings in GloVe text format.
    pub embedding_file: Option<PathBuf>,
    /// Sentence limits per split; negative reads everything.
    pub train_num: i64,
    pub dev_num: i64,
    pub test_num: i64,

    pub embedding_dim: usize,
    pub dropout: f32,
    pub use_char_rnn: bool,
    pub char_emb_dim: usize,
    pub charlstm_hidden_dim: usize,

    pub optimizer: OptimizerKind,
    pub learning_rate: f64,
    pub l2: f64,
    pub clip_threshold: f64,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub shuffle: bool,

    /// Evaluate every this many sentences.
    pub eval_freq: usize,
    /// First epoch (1-based) from which evaluation happens.
    pub eval_epoch: usize,
    pub model_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            digit2zero: true,
            iobes: true,
            train_file: PathBuf::from("data/conll2003/train.txt"),
            dev_file: PathBuf::from("data/conll2003/dev.txt"),
            test_file: PathBuf::from("data/conll2003/test.txt"),
            embedding_file: None,
            train_num: -1,
            dev_num: -1,
            test_num: -1,
            embedding_dim: 100,
            dropout: 0.0,
            use_char_rnn: false,
            char_emb_dim: 25,
            charlstm_hidden_dim: 50,
            optimizer: OptimizerKind::Sgd,
            learning_rate: 0.05,
            l2: 0.0,
            clip_threshold: 5.0,
            batch_size: 1,
            num_epochs: 100,
            shuffle: false,
            eval_freq: 4000,
            eval_epoch: 0,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl TrainConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON configuration; missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Parse a JSON configuration, bringing out-of-range values back into range.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Clamp `dropout` below [`MAX_DROPOUT`] and `batch_size` to at least 1.
    pub fn normalized(self) -> Self {
        let dropout = self.dropout;
        let batch_size = self.batch_size;
        self.with_dropout(dropout).with_batch_size(batch_size)
    }

    /// Set the corpus files.
    pub fn with_files(
        mut self,
        train: impl Into<PathBuf>,
        dev: impl Into<PathBuf>,
        test: impl Into<PathBuf>,
    ) -> Self {
        self.train_file = train.into();
        self.dev_file = dev.into();
        self.test_file = test.into();
        self
    }

    /// Set the word embedding size.
    pub fn with_embedding_dim(mut self, dim: usize) -> Self {
        self.embedding_dim = dim;
        self
    }

    /// Enable or disable the character BiLSTM.
    pub fn with_char_rnn(mut self, enabled: bool) -> Self {
        self.use_char_rnn = enabled;
        self
    }

    /// Set the optimizer and its learning rate.
    pub fn with_optimizer(mut self, optimizer: OptimizerKind, learning_rate: f64) -> Self {
        self.optimizer = optimizer;
        self.learning_rate = learning_rate;
        self
    }

    /// Set the number of epochs.
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.num_epochs = epochs;
        self
    }

    /// Set the minibatch size (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the embedding dropout probability, kept below 1.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout.clamp(0.0, MAX_DROPOUT);
        self
    }

    /// Set where checkpoints are written.
    pub fn with_model_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model_dir = dir.into();
        self
    }

    /// Input size of the emission layer.
    pub fn input_size(&self) -> usize {
        if self.use_char_rnn {
            self.embedding_dim + 2 * self.charlstm_hidden_dim
        } else {
            self.embedding_dim
        }
    }
}
