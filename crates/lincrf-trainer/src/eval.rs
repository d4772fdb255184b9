//! Span-level precision/recall/F1 over BIO or IOBES labels.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::data::Instance;

/// An entity span, token indices inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub kind: String,
}

impl Span {
    pub fn new(start: usize, end: usize, kind: &str) -> Self {
        Self {
            start,
            end,
            kind: kind.to_string(),
        }
    }
}

/// Extract entity spans from a label sequence.
///
/// `B-`/`S-` always open a span; `I-`/`E-` continue one of the same type and open
/// a new one otherwise; `E-`/`S-` close the span they belong to. Labels without a
/// `P-TYPE` shape (such as `O`) close any open span.
pub fn spans<S: AsRef<str>>(labels: &[S]) -> Vec<Span> {
    let mut out = Vec::new();
    let mut open: Option<(usize, &str)> = None;

    for (i, label) in labels.iter().enumerate() {
        let label = label.as_ref();
        let Some((prefix, kind)) = label.split_once('-') else {
            if let Some((start, kind)) = open.take() {
                out.push(Span::new(start, i - 1, kind));
            }
            continue;
        };

        let continues = matches!(prefix, "I" | "E") && open.is_some_and(|(_, k)| k == kind);
        if !continues {
            if let Some((start, k)) = open.take() {
                out.push(Span::new(start, i - 1, k));
            }
            open = Some((i, kind));
        }

        if matches!(prefix, "E" | "S") {
            if let Some((start, k)) = open.take() {
                out.push(Span::new(start, i, k));
            }
        }
    }

    if let Some((start, kind)) = open {
        out.push(Span::new(start, labels.len() - 1, kind));
    }
    out
}

/// Percentages, as printed in training logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Metrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Precision: {:.2}, Recall: {:.2}, F1: {:.2}",
            self.precision, self.recall, self.f1
        )
    }
}

/// Compare predictions against gold labels over every instance that has one.
pub fn evaluate(instances: &[Instance]) -> Metrics {
    let mut correct = 0usize;
    let mut predicted = 0usize;
    let mut gold = 0usize;

    for inst in instances {
        let Some(prediction) = &inst.prediction else {
            continue;
        };
        let gold_spans: HashSet<Span> = spans(&inst.labels).into_iter().collect();
        let pred_spans: HashSet<Span> = spans(prediction).into_iter().collect();
        correct += gold_spans.intersection(&pred_spans).count();
        predicted += pred_spans.len();
        gold += gold_spans.len();
    }

    let precision = if predicted == 0 {
        0.0
    } else {
        correct as f64 * 100.0 / predicted as f64
    };
    let recall = if gold == 0 {
        0.0
    } else {
        correct as f64 * 100.0 / gold as f64
    };
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    Metrics {
        precision,
        recall,
        f1,
    }
}
