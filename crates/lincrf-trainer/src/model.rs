//! Embedding + CRF tagger.
//!
//! Token representations (word embedding, optionally concatenated with the final
//! states of a forward and a backward character LSTM) go through a bias-free
//! linear layer to produce one emission score per label, START/STOP included.
//! Training uses the tensor loss in [`crate::loss`]; decoding hands the scores to
//! the core Viterbi decoder.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use candle_nn::{Init, LSTM, LSTMConfig, RNN, VarBuilder, VarMap};
use lincrf_core::{CrfError, Decoded, EmissionSource, LinearChainCrf, TagRegistry};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::TrainConfig;
use crate::loss;
use crate::vocab::{PretrainedEmbeddings, Vocab, embedding_table};

const WEIGHTS_FILE: &str = "model.safetensors";
const META_FILE: &str = "model.json";

/// Initial value of every emission-layer weight.
const LINEAR_INIT: f64 = 0.5;

/// Character BiLSTM producing `[1, 2 * hidden]` per word.
struct CharEncoder {
    embedding: Tensor,
    forward: LSTM,
    backward: LSTM,
    hidden: usize,
}

impl CharEncoder {
    fn new(
        vb: VarBuilder,
        num_chars: usize,
        emb_dim: usize,
        hidden: usize,
    ) -> candle_core::Result<Self> {
        let scale = (3.0 / emb_dim as f64).sqrt();
        let embedding = vb.get_with_hints(
            (num_chars, emb_dim),
            "char_embedding",
            Init::Uniform {
                lo: -scale,
                up: scale,
            },
        )?;
        let forward = candle_nn::lstm(emb_dim, hidden, LSTMConfig::default(), vb.pp("char_fw"))?;
        let backward = candle_nn::lstm(emb_dim, hidden, LSTMConfig::default(), vb.pp("char_bw"))?;
        Ok(Self {
            embedding,
            forward,
            backward,
            hidden,
        })
    }

    fn last_hidden(&self, lstm: &LSTM, ids: &[u32]) -> candle_core::Result<Tensor> {
        let ids = Tensor::new(ids, self.embedding.device())?;
        let xs = self.embedding.index_select(&ids, 0)?.unsqueeze(0)?;
        let states = lstm.seq(&xs)?;
        match states.last() {
            Some(state) => Ok(state.h().clone()),
            None => Tensor::zeros((1, self.hidden), DType::F32, self.embedding.device()),
        }
    }

    fn encode(&self, ids: &[u32]) -> candle_core::Result<Tensor> {
        if ids.is_empty() {
            return Tensor::zeros((1, 2 * self.hidden), DType::F32, self.embedding.device());
        }
        let reversed: Vec<u32> = ids.iter().rev().copied().collect();
        let f = self.last_hidden(&self.forward, ids)?;
        let b = self.last_hidden(&self.backward, &reversed)?;
        Tensor::cat(&[&f, &b], 1)
    }
}

/// What is stored next to the weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelMeta {
    config: TrainConfig,
    words: Vocab,
    chars: Vocab,
    labels: TagRegistry,
}

/// Word (and optional character) embeddings feeding a CRF.
pub struct EmbeddingTagger {
    config: TrainConfig,
    words: Vocab,
    chars: Vocab,
    crf: LinearChainCrf,
    word_embedding: Tensor,
    linear_w: Tensor,
    char_encoder: Option<CharEncoder>,
    varmap: VarMap,
    device: Device,
}

impl EmbeddingTagger {
    /// Build a freshly initialised model.
    pub fn new(
        config: &TrainConfig,
        words: Vocab,
        chars: Vocab,
        labels: TagRegistry,
        pretrained: Option<&PretrainedEmbeddings>,
        rng: &mut Rand32,
    ) -> anyhow::Result<Self> {
        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let num_labels = labels.len();
        let input_size = config.input_size();

        let (word_embedding, linear_w, char_encoder) = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            let word_embedding = vb.get_with_hints(
                (words.len(), config.embedding_dim),
                "word_embedding",
                Init::Const(0.0),
            )?;
            let linear_w = vb.get_with_hints(
                (num_labels, input_size),
                "linear_w",
                Init::Const(LINEAR_INIT),
            )?;
            let char_encoder = if config.use_char_rnn {
                Some(CharEncoder::new(
                    vb.clone(),
                    chars.len(),
                    config.char_emb_dim,
                    config.charlstm_hidden_dim,
                )?)
            } else {
                None
            };
            (word_embedding, linear_w, char_encoder)
        };

        let table = embedding_table(&words, config.embedding_dim, pretrained, rng)?;
        varmap.set_one(
            "word_embedding",
            Tensor::from_vec(table, (words.len(), config.embedding_dim), &device)?,
        )?;

        info!("Input to emission layer size: {input_size}");
        info!(
            "Word embedding size: {} x {}",
            words.len(),
            config.embedding_dim
        );
        info!("Labels: {labels}");

        Ok(Self {
            config: config.clone(),
            words,
            chars,
            crf: LinearChainCrf::new(Arc::new(labels)),
            word_embedding,
            linear_w,
            char_encoder,
            varmap,
            device,
        })
    }

    pub fn registry(&self) -> &TagRegistry {
        self.crf.registry()
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Emission scores `[len, num_labels]`; dropout only when `train`.
    pub fn emissions(&self, words: &[String], train: bool) -> candle_core::Result<Tensor> {
        if words.is_empty() {
            return Tensor::zeros((0, self.registry().len()), DType::F32, &self.device);
        }

        let ids: Vec<u32> = words.iter().map(|w| self.words.get(w)).collect();
        let ids = Tensor::new(ids.as_slice(), &self.device)?;
        let mut reps = self.word_embedding.index_select(&ids, 0)?;

        if let Some(encoder) = &self.char_encoder {
            let chars = words
                .iter()
                .map(|w| encoder.encode(&self.chars.encode_chars(w)))
                .collect::<candle_core::Result<Vec<_>>>()?;
            let chars = Tensor::cat(&chars, 0)?;
            reps = Tensor::cat(&[&reps, &chars], 1)?;
        }

        if train && self.config.dropout > 0.0 {
            reps = candle_nn::ops::dropout(&reps, self.config.dropout)?;
        }

        reps.matmul(&self.linear_w.t()?)
    }

    /// Training loss of one sentence (with dropout).
    pub fn loss(&self, words: &[String], labels: &[String]) -> anyhow::Result<Tensor> {
        let tags = self.registry().ids(labels)?;
        let emissions = self.emissions(words, true)?;
        Ok(loss::negative_log_likelihood(
            &emissions,
            &tags,
            self.registry().start(),
        )?)
    }

    /// Best label sequence for a sentence.
    pub fn decode(&self, words: &[String]) -> anyhow::Result<Decoded> {
        Ok(self.crf.decode_source(self, words)?)
    }

    /// Write weights and vocabularies into `dir`.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> anyhow::Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        self.varmap.save(dir.join(WEIGHTS_FILE))?;
        let meta = ModelMeta {
            config: self.config.clone(),
            words: self.words.clone(),
            chars: self.chars.clone(),
            labels: self.registry().clone(),
        };
        std::fs::write(dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;
        info!("Model saved to {}", dir.display());
        Ok(())
    }

    /// Load a model written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let meta_path = dir.join(META_FILE);
        let content = std::fs::read_to_string(&meta_path)
            .with_context(|| format!("failed to read {}", meta_path.display()))?;
        let meta: ModelMeta = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", meta_path.display()))?;

        let mut rng = Rand32::new(meta.config.seed);
        let mut model = Self::new(
            &meta.config,
            meta.words,
            meta.chars,
            meta.labels,
            None,
            &mut rng,
        )?;
        model
            .varmap
            .load(dir.join(WEIGHTS_FILE))
            .with_context(|| format!("failed to load weights from {}", dir.display()))?;
        Ok(model)
    }
}

impl EmissionSource for EmbeddingTagger {
    type Input = [String];

    fn emissions(&self, words: &[String]) -> lincrf_core::Result<Vec<Vec<f32>>> {
        EmbeddingTagger::emissions(self, words, false)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(|e| CrfError::Emission(e.to_string()))
    }
}
