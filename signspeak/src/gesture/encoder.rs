//! Feature encoding: up to two hands of landmarks into one fixed-width vector.
//!
//! Each present hand fills 63 slots with its landmarks expressed relative to
//! its own wrist, so the vector is translation invariant per hand but not
//! scale invariant.  An absent second hand leaves its 63 slots at zero.

use super::landmarks::{HandLandmarks, LANDMARK_COUNT, MAX_HANDS};

/// Slots used by one hand (21 points × 3 coordinates).
pub const HAND_STRIDE: usize = LANDMARK_COUNT * 3;

/// Total vector width, also the row stride of persisted example blobs.
pub const FEATURE_LEN: usize = HAND_STRIDE * MAX_HANDS;

/// Encoded input to the gesture classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector([f32; FEATURE_LEN]);

impl FeatureVector {
    pub fn zeros() -> Self {
        Self([0.0; FEATURE_LEN])
    }

    /// Rebuild from a persisted row.  `None` unless `values` is exactly
    /// `FEATURE_LEN` long.
    pub fn from_slice(values: &[f32]) -> Option<Self> {
        let row: [f32; FEATURE_LEN] = values.try_into().ok()?;
        Some(Self(row))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        FEATURE_LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Cosine similarity in [-1, 1]; zero when either vector has no magnitude.
    pub fn cosine_similarity(&self, other: &FeatureVector) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom <= f32::EPSILON {
            0.0
        } else {
            dot / denom
        }
    }
}

/// Encode the first two hands, in the order the provider reported them.
pub fn encode(hands: &[HandLandmarks]) -> FeatureVector {
    let mut values = [0.0f32; FEATURE_LEN];
    for (hand_index, hand) in hands.iter().take(MAX_HANDS).enumerate() {
        let wrist = *hand.wrist();
        let offset = hand_index * HAND_STRIDE;
        for (i, point) in hand.points().iter().enumerate() {
            let rel = point.relative_to(&wrist);
            let base = offset + i * 3;
            values[base] = rel.x;
            values[base + 1] = rel.y;
            values[base + 2] = rel.z;
        }
    }
    FeatureVector(values)
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::landmarks::{HandJoint, Landmark};

    fn spread_hand(origin: Landmark) -> HandLandmarks {
        let mut hand = HandLandmarks::uniform(origin);
        hand.set_joint(
            HandJoint::IndexTip,
            Landmark::new(origin.x + 0.1, origin.y - 0.2, origin.z + 0.05),
        );
        hand
    }

    #[test]
    fn test_no_hands_is_zero() {
        let v = encode(&[]);
        assert_eq!(v.len(), 126);
        assert!(v.as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_all_wrist_hand_is_zero() {
        let hand = HandLandmarks::uniform(Landmark::new(0.4, 0.6, -0.2));
        let v = encode(&[hand]);
        assert_eq!(v.as_slice().len(), 126);
        assert!(v.as_slice()[..63].iter().all(|x| *x == 0.0));
        assert!(v.as_slice()[63..].iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_wrist_relative_slots() {
        let v = encode(&[spread_hand(Landmark::new(0.5, 0.5, 0.0))]);
        let base = HandJoint::IndexTip.index() * 3;
        assert!((v.as_slice()[base] - 0.1).abs() < 1e-6);
        assert!((v.as_slice()[base + 1] + 0.2).abs() < 1e-6);
        assert!((v.as_slice()[base + 2] - 0.05).abs() < 1e-6);
        // wrist slot always zero
        assert_eq!(&v.as_slice()[..3], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_translation_invariant() {
        let a = encode(&[spread_hand(Landmark::new(0.2, 0.3, 0.0))]);
        let b = encode(&[spread_hand(Landmark::new(0.7, 0.1, 0.0))]);
        for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn test_second_hand_fills_upper_half() {
        let first = HandLandmarks::uniform(Landmark::new(0.1, 0.1, 0.0));
        let second = spread_hand(Landmark::new(0.9, 0.9, 0.0));
        let v = encode(&[first, second]);
        assert!(v.as_slice()[..63].iter().all(|x| *x == 0.0));
        let base = HAND_STRIDE + HandJoint::IndexTip.index() * 3;
        assert!((v.as_slice()[base] - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_third_hand_ignored() {
        let plain = HandLandmarks::uniform(Landmark::default());
        let two = encode(&[plain.clone(), plain.clone()]);
        let three = encode(&[plain.clone(), plain, spread_hand(Landmark::default())]);
        assert_eq!(two, three);
        assert_eq!(three.len(), FEATURE_LEN);
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(FeatureVector::from_slice(&[0.0; 125]).is_none());
        assert!(FeatureVector::from_slice(&[0.0; 126]).is_some());
    }

    #[test]
    fn test_cosine_similarity() {
        let v = encode(&[spread_hand(Landmark::default())]);
        assert!((v.cosine_similarity(&v) - 1.0).abs() < 1e-5);
        assert_eq!(v.cosine_similarity(&FeatureVector::zeros()), 0.0);
    }
}
