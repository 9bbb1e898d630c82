//! Gesture pipeline — landmarks in, sentence events out.
//!
//! Provides:
//! - `landmarks`: hand topology and per-frame landmark containers
//! - `encoder`: landmarks → fixed 126-wide feature vector
//! - `stabilizer`: debounce classifications into words and control actions
//! - `training`: countdown / capture state machine for teaching gestures

pub mod encoder;
pub mod landmarks;
pub mod stabilizer;
pub mod training;

pub use encoder::{encode, FeatureVector, FEATURE_LEN, HAND_STRIDE};
pub use landmarks::{HandJoint, HandLandmarks, Landmark, LANDMARK_COUNT, MAX_HANDS};
pub use stabilizer::{
    CooldownPolicy, GestureStabilizer, NothingPolicy, SentenceEvent, StabilizerConfig,
    DELETE_LABEL, NOTHING_LABEL, SPEAK_LABEL,
};
pub use training::{normalize_label, TrainingConfig, TrainingEvent, TrainingPhase, TrainingSession};
