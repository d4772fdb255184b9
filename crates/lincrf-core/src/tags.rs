//! # Tag Index Registry
//!
//! Bidirectional mapping between label names and dense integer ids. Real labels
//! occupy `0..n` in first-seen order; the synthetic START and STOP sentinels are
//! always the last two ids so that an emission row covering only the real labels
//! can be read without re-indexing.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CrfError, Result};

/// Reserved name of the START sentinel.
pub const START: &str = "<START>";
/// Reserved name of the STOP sentinel.
pub const STOP: &str = "<STOP>";

/// Immutable label set with START/STOP sentinels.
///
/// Serialized as the list of real labels; the sentinels and the reverse index are
/// rebuilt on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub struct TagRegistry {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl TagRegistry {
    /// Build a registry from the labels observed in training data.
    ///
    /// Duplicates are ignored; ids follow first occurrence. Fails if the corpus
    /// already contains one of the sentinel names.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self {
            labels: Vec::new(),
            index: HashMap::new(),
        };

        for label in labels {
            let label = label.as_ref();
            if label == START || label == STOP {
                return Err(CrfError::ReservedLabel {
                    label: label.to_string(),
                });
            }
            registry.insert(label);
        }

        registry.insert(START);
        registry.insert(STOP);
        Ok(registry)
    }

    fn insert(&mut self, label: &str) {
        if !self.index.contains_key(label) {
            self.index.insert(label.to_string(), self.labels.len());
            self.labels.push(label.to_string());
        }
    }

    /// Id of a label name.
    pub fn id(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CrfError::UnknownLabel {
                label: name.to_string(),
            })
    }

    /// Name of a label id.
    pub fn name(&self, id: usize) -> Result<&str> {
        self.labels
            .get(id)
            .map(String::as_str)
            .ok_or(CrfError::UnknownTagId(id))
    }

    /// Map a sequence of label names to ids.
    pub fn ids<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        names.iter().map(|n| self.id(n.as_ref())).collect()
    }

    /// Map a sequence of ids back to label names.
    pub fn names(&self, ids: &[usize]) -> Result<Vec<String>> {
        ids.iter()
            .map(|&id| self.name(id).map(str::to_string))
            .collect()
    }

    /// Id of the START sentinel.
    pub fn start(&self) -> usize {
        self.labels.len() - 2
    }

    /// Id of the STOP sentinel.
    pub fn stop(&self) -> usize {
        self.labels.len() - 1
    }

    /// Total number of ids, sentinels included.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false: a registry holds at least the two sentinels.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of real (non-sentinel) labels.
    pub fn num_real(&self) -> usize {
        self.labels.len() - 2
    }

    /// Whether `id` is START or STOP.
    pub fn is_sentinel(&self, id: usize) -> bool {
        id == self.start() || id == self.stop()
    }

    /// All label names in id order, sentinels last.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Real label names in id order.
    pub fn real_labels(&self) -> &[String] {
        &self.labels[..self.num_real()]
    }
}

impl From<TagRegistry> for Vec<String> {
    fn from(registry: TagRegistry) -> Self {
        let mut labels = registry.labels;
        labels.truncate(labels.len() - 2);
        labels
    }
}

impl TryFrom<Vec<String>> for TagRegistry {
    type Error = CrfError;

    fn try_from(labels: Vec<String>) -> Result<Self> {
        Self::from_labels(labels)
    }
}

impl fmt::Display for TagRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.labels.join(", "))
    }
}
