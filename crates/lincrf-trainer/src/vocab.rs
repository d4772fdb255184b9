//! Word/character vocabularies and the initial embedding table.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, bail};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data::Instance;

/// Reserved token for anything unseen; always id 0.
pub const UNK: &str = "<UNK>";

/// String vocabulary with `<UNK>` at id 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct Vocab {
    tokens: Vec<String>,
    index: HashMap<String, u32>,
}

impl Vocab {
    pub fn build<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut vocab = Self {
            tokens: Vec::new(),
            index: HashMap::new(),
        };
        vocab.insert(UNK);
        for token in tokens {
            vocab.insert(token.as_ref());
        }
        vocab
    }

    /// Word vocabulary over every word of every split.
    pub fn words(instances: &[&[Instance]]) -> Self {
        Self::build(
            instances
                .iter()
                .flat_map(|split| split.iter())
                .flat_map(|inst| inst.words.iter()),
        )
    }

    /// Character vocabulary over every character of every split.
    pub fn chars(instances: &[&[Instance]]) -> Self {
        let chars = instances
            .iter()
            .flat_map(|split| split.iter())
            .flat_map(|inst| inst.words.iter())
            .flat_map(|w| w.chars())
            .map(String::from);
        Self::build(chars)
    }

    fn insert(&mut self, token: &str) {
        if !self.index.contains_key(token) {
            self.index.insert(token.to_string(), self.tokens.len() as u32);
            self.tokens.push(token.to_string());
        }
    }

    /// Id of `token`, or the `<UNK>` id.
    pub fn get(&self, token: &str) -> u32 {
        self.index.get(token).copied().unwrap_or(0)
    }

    /// Ids of each character of `word`.
    pub fn encode_chars(&self, word: &str) -> Vec<u32> {
        let mut buf = [0u8; 4];
        word.chars().map(|c| self.get(c.encode_utf8(&mut buf))).collect()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl From<Vec<String>> for Vocab {
    fn from(tokens: Vec<String>) -> Self {
        Self::build(tokens.into_iter().filter(|t| t != UNK))
    }
}

impl From<Vocab> for Vec<String> {
    fn from(vocab: Vocab) -> Self {
        vocab.tokens
    }
}

/// Pretrained word vectors.
#[derive(Debug, Clone)]
pub struct PretrainedEmbeddings {
    pub dim: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl PretrainedEmbeddings {
    /// Load a GloVe-style text file: `word v1 v2 ... vd` per line.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Reading embedding file: {}", path.display());
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        Self::read(BufReader::new(file))
    }

    pub fn read<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        let mut dim = 0;
        let mut vectors = HashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let vector = fields
                .map(str::parse::<f32>)
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("line {}: bad number", line_no + 1))?;
            if dim == 0 {
                dim = vector.len();
            } else if vector.len() != dim {
                bail!(
                    "line {}: expected {dim} values, got {}",
                    line_no + 1,
                    vector.len()
                );
            }
            vectors.insert(word.to_string(), vector);
        }

        if dim == 0 {
            bail!("embedding file holds no vectors");
        }
        Ok(Self { dim, vectors })
    }

    /// Vector for `word`, falling back to its lowercase form.
    pub fn get(&self, word: &str) -> Option<&[f32]> {
        self.vectors
            .get(word)
            .or_else(|| self.vectors.get(&word.to_lowercase()))
            .map(Vec::as_slice)
    }
}

/// Flattened `[vocab.len(), dim]` initial embedding table.
///
/// Words with a pretrained vector copy it; the rest are drawn uniformly from
/// `±sqrt(3 / dim)`.
pub fn embedding_table(
    vocab: &Vocab,
    dim: usize,
    pretrained: Option<&PretrainedEmbeddings>,
    rng: &mut Rand32,
) -> anyhow::Result<Vec<f32>> {
    if let Some(p) = pretrained {
        if p.dim != dim {
            bail!(
                "embedding_dim is {dim} but the embedding file has {}-dimensional vectors",
                p.dim
            );
        }
    }

    let scale = (3.0 / dim as f32).sqrt();
    let mut table = Vec::with_capacity(vocab.len() * dim);
    let mut found = 0usize;
    for word in &vocab.tokens {
        match pretrained.and_then(|p| p.get(word)) {
            Some(vector) => {
                found += 1;
                table.extend_from_slice(vector);
            }
            None => table.extend((0..dim).map(|_| (rng.rand_float() * 2.0 - 1.0) * scale)),
        }
    }
    if pretrained.is_some() {
        info!(
            "{found} of {} words have pretrained embeddings",
            vocab.len()
        );
    }
    Ok(table)
}
