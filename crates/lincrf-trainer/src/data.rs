//! Data loading for column-format (CoNLL style) labelled data.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, bail};
use regex::Regex;
use tracing::info;

/// A single sentence: words with one label each.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub words: Vec<String>,
    pub labels: Vec<String>,
    /// Labels predicted by the model, filled in during evaluation.
    pub prediction: Option<Vec<String>>,
}

impl Instance {
    pub fn new(words: Vec<String>, labels: Vec<String>) -> Self {
        Self {
            words,
            labels,
            prediction: None,
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Reader for whitespace-separated column files.
///
/// The first column is the word and the last is the label; blank lines end a
/// sentence and `-DOCSTART-` lines are skipped.
pub struct CorpusReader {
    digit2zero: bool,
    digit: Regex,
}

impl CorpusReader {
    pub fn new(digit2zero: bool) -> anyhow::Result<Self> {
        Ok(Self {
            digit2zero,
            digit: Regex::new(r"\d")?,
        })
    }

    /// Read at most `limit` sentences from `path` (`limit < 0` reads all).
    pub fn read_file<P: AsRef<Path>>(&self, path: P, limit: i64) -> anyhow::Result<Vec<Instance>> {
        let path = path.as_ref();
        info!("Reading file: {}", path.display());
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        self.read(BufReader::new(file), limit)
            .with_context(|| format!("failed to read {}", path.display()))
    }

    pub fn read<R: BufRead>(&self, reader: R, limit: i64) -> anyhow::Result<Vec<Instance>> {
        let mut instances = Vec::new();
        let mut words = Vec::new();
        let mut labels = Vec::new();
        let full = |n: usize| limit >= 0 && n as i64 >= limit;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();

            if line.is_empty() {
                if !words.is_empty() {
                    if full(instances.len()) {
                        return Ok(instances);
                    }
                    instances.push(Instance::new(
                        std::mem::take(&mut words),
                        std::mem::take(&mut labels),
                    ));
                    if full(instances.len()) {
                        return Ok(instances);
                    }
                }
                continue;
            }

            if line.starts_with("-DOCSTART-") {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 {
                bail!("line {}: expected `word ... label`, got {line:?}", line_no + 1);
            }
            words.push(self.normalize(fields[0]).into_owned());
            labels.push(fields[fields.len() - 1].to_string());
        }

        // Don't forget the last sentence
        if !words.is_empty() && !full(instances.len()) {
            instances.push(Instance::new(words, labels));
        }

        Ok(instances)
    }

    fn normalize<'a>(&self, word: &'a str) -> Cow<'a, str> {
        if self.digit2zero {
            self.digit.replace_all(word, "0")
        } else {
            Cow::Borrowed(word)
        }
    }
}

/// Convert one BIO label sequence to IOBES.
///
/// `B-X` not followed by `I-X` becomes `S-X`; `I-X` not followed by `I-X`
/// becomes `E-X`. Other labels pass through.
pub fn to_iobes(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let continues = |kind: &str| {
                labels
                    .get(i + 1)
                    .is_some_and(|next| next.strip_prefix("I-") == Some(kind))
            };
            if let Some(kind) = label.strip_prefix("B-") {
                if continues(kind) {
                    label.clone()
                } else {
                    format!("S-{kind}")
                }
            } else if let Some(kind) = label.strip_prefix("I-") {
                if continues(kind) {
                    label.clone()
                } else {
                    format!("E-{kind}")
                }
            } else {
                label.clone()
            }
        })
        .collect()
}

/// Rewrite every instance's gold labels to IOBES in place.
pub fn use_iobes(instances: &mut [Instance]) {
    for inst in instances {
        inst.labels = to_iobes(&inst.labels);
    }
}
