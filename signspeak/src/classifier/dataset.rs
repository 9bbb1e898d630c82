//! Persisted example blob.
//!
//! Wire form is a JSON object mapping each label to one flat number array;
//! rows are recovered with the fixed `FEATURE_LEN` stride.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::gesture::{FeatureVector, FEATURE_LEN};

/// Label → flattened example rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleDataset {
    rows: BTreeMap<String, Vec<f32>>,
}

impl ExampleDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one example row under `label`.
    pub fn push(&mut self, label: &str, features: &FeatureVector) {
        self.rows
            .entry(label.to_string())
            .or_default()
            .extend_from_slice(features.as_slice());
    }

    pub fn labels(&self) -> Vec<String> {
        self.rows.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Split every label's flat array into feature rows.
    pub fn to_examples(&self) -> Result<BTreeMap<String, Vec<FeatureVector>>, DatasetError> {
        let mut out = BTreeMap::new();
        for (label, flat) in &self.rows {
            if flat.len() % FEATURE_LEN != 0 {
                return Err(DatasetError::RaggedRows {
                    label: label.clone(),
                    len: flat.len(),
                    stride: FEATURE_LEN,
                });
            }
            let rows: Vec<FeatureVector> = flat
                .chunks_exact(FEATURE_LEN)
                .filter_map(FeatureVector::from_slice)
                .collect();
            out.insert(label.clone(), rows);
        }
        Ok(out)
    }

    pub fn to_json(&self) -> Result<String, DatasetError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, DatasetError> {
        let dataset: Self = serde_json::from_str(raw)?;
        // Validate stride eagerly so a corrupt blob fails as a whole.
        dataset.to_examples()?;
        Ok(dataset)
    }
}
