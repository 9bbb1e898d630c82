//! Gesture classification seam.
//!
//! The session talks to a [`GestureClassifier`] only; `KnnClassifier` is the
//! built-in implementation and tests may substitute their own.

mod dataset;
mod knn;

use std::collections::BTreeMap;

use crate::error::DatasetError;
use crate::gesture::FeatureVector;

pub use dataset::ExampleDataset;
pub use knn::{KnnClassifier, DEFAULT_K};

/// One prediction: the winning label plus a confidence for every known label.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: String,
    pub confidences: BTreeMap<String, f32>,
}

impl ClassificationResult {
    /// Confidence of the reported label (0.0 if missing from the map).
    pub fn confidence(&self) -> f32 {
        self.confidences.get(&self.label).copied().unwrap_or(0.0)
    }

    /// Rounded percentage for display.
    pub fn confidence_pct(&self) -> u32 {
        (self.confidence() * 100.0).round().clamp(0.0, 100.0) as u32
    }
}

/// Example-based classifier over feature vectors.
pub trait GestureClassifier {
    /// Predict a label.  `None` when no labels are known.
    fn predict(&self, features: &FeatureVector) -> Option<ClassificationResult>;

    /// Store one more example for `label`, creating the label if needed.
    fn add_example(&mut self, features: FeatureVector, label: &str);

    /// Drop every example of `label`.  Returns false if the label was unknown.
    fn clear_label(&mut self, label: &str) -> bool;

    /// Number of labels with at least one example.
    fn num_classes(&self) -> usize;

    /// Known labels in stable order.
    fn labels(&self) -> Vec<String>;

    /// Number of stored examples for `label`.
    fn example_count(&self, label: &str) -> usize;

    /// Snapshot every stored example.
    fn export_examples(&self) -> ExampleDataset;

    /// Replace all stored examples with `dataset`.
    fn import_examples(&mut self, dataset: &ExampleDataset) -> Result<(), DatasetError>;
}
