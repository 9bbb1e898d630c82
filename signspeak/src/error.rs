//! Error types for the collaborator seams.
//!
//! Each external capability (landmark detection, speech, persistence) has its
//! own error enum so callers can decide which failures are fatal and which
//! are silently tolerated.

/// Landmark provider failures.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("landmark provider unavailable: {0}")]
    Unavailable(String),

    #[error("malformed frame {frame}: {reason}")]
    MalformedFrame { frame: usize, reason: String },

    #[error("provider I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Speech output failures.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("speech not supported: {0}")]
    Unavailable(String),

    #[error("speech output failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Key-value store failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage file is not a JSON object: {0}")]
    Format(#[from] serde_json::Error),
}

/// Persisted example blob failures.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("label {label:?} holds {len} values, not a multiple of {stride}")]
    RaggedRows {
        label: String,
        len: usize,
        stride: usize,
    },
}

/// Session-level request failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("gesture name is empty")]
    EmptyLabel,

    #[error("training for {0:?} is already in progress")]
    TrainingInProgress(String),

    #[error("session has been torn down")]
    Closed,
}
