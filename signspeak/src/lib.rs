//! signspeak - sign-language gestures to a spoken sentence.
//!
//! Hand landmarks come in from a provider, get encoded and classified by
//! example, and a stabilizer turns the classification stream into sentence
//! words plus SPEAK / DELETE control gestures.

pub mod classifier;
pub mod control;
pub mod error;
pub mod gesture;
pub mod provider;
pub mod runtime;
pub mod sentence;
pub mod session;
pub mod speech;
pub mod storage;
