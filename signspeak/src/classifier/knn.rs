//! k-nearest-neighbour gesture classifier.
//!
//! Cosine similarity against every stored example; the `k` most similar
//! examples vote, and each label's confidence is its share of the votes.

use std::collections::BTreeMap;

use tracing::debug;

use super::{ClassificationResult, ExampleDataset, GestureClassifier};
use crate::error::DatasetError;
use crate::gesture::FeatureVector;

/// Neighbours consulted per prediction.
pub const DEFAULT_K: usize = 3;

/// In-memory example store with k-NN prediction.
#[derive(Debug, Clone)]
pub struct KnnClassifier {
    k: usize,
    examples: BTreeMap<String, Vec<FeatureVector>>,
}

impl Default for KnnClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_K)
    }
}

impl KnnClassifier {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            examples: BTreeMap::new(),
        }
    }

    fn total_examples(&self) -> usize {
        self.examples.values().map(Vec::len).sum()
    }
}

impl GestureClassifier for KnnClassifier {
    fn predict(&self, features: &FeatureVector) -> Option<ClassificationResult> {
        let total = self.total_examples();
        if total == 0 {
            return None;
        }

        let mut scored: Vec<(f32, &str)> = Vec::with_capacity(total);
        for (label, rows) in &self.examples {
            for row in rows {
                scored.push((features.cosine_similarity(row), label.as_str()));
            }
        }
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let k = self.k.min(total);
        // label -> (votes, best similarity)
        let mut votes: BTreeMap<&str, (usize, f32)> = BTreeMap::new();
        for (sim, label) in scored.iter().take(k) {
            let entry = votes.entry(*label).or_insert((0, f32::MIN));
            entry.0 += 1;
            entry.1 = entry.1.max(*sim);
        }

        let (winner, _) = votes.iter().fold(None::<(&str, (usize, f32))>, |best, (label, v)| {
            match best {
                Some((_, bv)) if bv.0 > v.0 || (bv.0 == v.0 && bv.1 >= v.1) => best,
                _ => Some((*label, *v)),
            }
        })?;

        let confidences = self
            .examples
            .keys()
            .map(|label| {
                let count = votes.get(label.as_str()).map(|v| v.0).unwrap_or(0);
                (label.clone(), count as f32 / k as f32)
            })
            .collect();

        Some(ClassificationResult {
            label: winner.to_string(),
            confidences,
        })
    }

    fn add_example(&mut self, features: FeatureVector, label: &str) {
        self.examples
            .entry(label.to_string())
            .or_default()
            .push(features);
    }

    fn clear_label(&mut self, label: &str) -> bool {
        let removed = self.examples.remove(label).is_some();
        if removed {
            debug!(label, "cleared gesture examples");
        }
        removed
    }

    fn num_classes(&self) -> usize {
        self.examples.values().filter(|rows| !rows.is_empty()).count()
    }

    fn labels(&self) -> Vec<String> {
        self.examples.keys().cloned().collect()
    }

    fn example_count(&self, label: &str) -> usize {
        self.examples.get(label).map(Vec::len).unwrap_or(0)
    }

    fn export_examples(&self) -> ExampleDataset {
        let mut dataset = ExampleDataset::new();
        for (label, rows) in &self.examples {
            for row in rows {
                dataset.push(label, row);
            }
        }
        dataset
    }

    fn import_examples(&mut self, dataset: &ExampleDataset) -> Result<(), DatasetError> {
        let examples = dataset.to_examples()?;
        self.examples = examples
            .into_iter()
            .filter(|(_, rows)| !rows.is_empty())
            .collect();
        debug!(classes = self.examples.len(), "imported gesture examples");
        Ok(())
    }
}
