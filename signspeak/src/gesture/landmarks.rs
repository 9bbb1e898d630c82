//! Hand landmark data structures.
//!
//! Models the 21-point hand topology reported by MediaPipe-style trackers,
//! in normalized image coordinates.  Landmark providers hand these to the
//! feature encoder; nothing here knows about classification.

use tracing::debug;

// ── Joint definitions ──────────────────────────────────────

/// The 21 hand landmarks, in the order trackers report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandJoint {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

/// Hands beyond this count are ignored by the encoder.
pub const MAX_HANDS: usize = 2;

impl HandJoint {
    /// Convert joint enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrist => "wrist",
            Self::ThumbCmc => "thumb-cmc",
            Self::ThumbMcp => "thumb-mcp",
            Self::ThumbIp => "thumb-ip",
            Self::ThumbTip => "thumb-tip",
            Self::IndexMcp => "index-mcp",
            Self::IndexPip => "index-pip",
            Self::IndexDip => "index-dip",
            Self::IndexTip => "index-tip",
            Self::MiddleMcp => "middle-mcp",
            Self::MiddlePip => "middle-pip",
            Self::MiddleDip => "middle-dip",
            Self::MiddleTip => "middle-tip",
            Self::RingMcp => "ring-mcp",
            Self::RingPip => "ring-pip",
            Self::RingDip => "ring-dip",
            Self::RingTip => "ring-tip",
            Self::PinkyMcp => "pinky-mcp",
            Self::PinkyPip => "pinky-pip",
            Self::PinkyDip => "pinky-dip",
            Self::PinkyTip => "pinky-tip",
        }
    }
}

// ── Landmark ───────────────────────────────────────────────

/// A single tracked point.  `x`/`y` are 0-1 image fractions, `z` is relative depth.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Component-wise offset of `self` from `origin`.
    pub fn relative_to(&self, origin: &Landmark) -> Landmark {
        Landmark {
            x: self.x - origin.x,
            y: self.y - origin.y,
            z: self.z - origin.z,
        }
    }
}

// ── Hand ───────────────────────────────────────────────────

/// All 21 landmarks of one detected hand.
#[derive(Debug, Clone, PartialEq)]
pub struct HandLandmarks {
    points: [Landmark; LANDMARK_COUNT],
}

impl HandLandmarks {
    pub fn new(points: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { points }
    }

    /// Build from raw `[x, y, z]` triples.  Returns `None` unless exactly
    /// 21 triples are given.
    pub fn from_triples(triples: &[[f32; 3]]) -> Option<Self> {
        if triples.len() != LANDMARK_COUNT {
            debug!(
                "hand rejected: expected {} landmarks, got {}",
                LANDMARK_COUNT,
                triples.len(),
            );
            return None;
        }
        let mut points = [Landmark::default(); LANDMARK_COUNT];
        for (slot, t) in points.iter_mut().zip(triples) {
            *slot = Landmark::new(t[0], t[1], t[2]);
        }
        Some(Self { points })
    }

    /// Every landmark placed at the same point.
    pub fn uniform(point: Landmark) -> Self {
        Self {
            points: [point; LANDMARK_COUNT],
        }
    }

    pub fn wrist(&self) -> &Landmark {
        &self.points[HandJoint::Wrist.index()]
    }

    pub fn joint(&self, joint: HandJoint) -> &Landmark {
        &self.points[joint.index()]
    }

    pub fn set_joint(&mut self, joint: HandJoint, point: Landmark) {
        self.points[joint.index()] = point;
    }

    pub fn points(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.points
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn triples(n: usize) -> Vec<[f32; 3]> {
        (0..n).map(|i| [i as f32 * 0.01, 0.5, -0.1]).collect()
    }

    #[test]
    fn test_joint_count() {
        assert_eq!(HandJoint::Wrist.index(), 0);
        assert_eq!(HandJoint::PinkyTip.index(), 20);
        assert_eq!(LANDMARK_COUNT, 21);
    }

    #[test]
    fn test_from_triples_valid() {
        let hand = HandLandmarks::from_triples(&triples(21)).unwrap();
        assert_eq!(hand.wrist(), &Landmark::new(0.0, 0.5, -0.1));
        assert!((hand.joint(HandJoint::PinkyTip).x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_from_triples_wrong_count() {
        assert!(HandLandmarks::from_triples(&triples(20)).is_none());
        assert!(HandLandmarks::from_triples(&triples(22)).is_none());
        assert!(HandLandmarks::from_triples(&[]).is_none());
    }

    #[test]
    fn test_relative_to() {
        let a = Landmark::new(0.5, 0.25, 0.1);
        let origin = Landmark::new(0.25, 0.25, 0.2);
        let r = a.relative_to(&origin);
        assert!((r.x - 0.25).abs() < 1e-6);
        assert_eq!(r.y, 0.0);
        assert!((r.z + 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_set_joint() {
        let mut hand = HandLandmarks::uniform(Landmark::default());
        hand.set_joint(HandJoint::IndexTip, Landmark::new(1.0, 2.0, 3.0));
        assert_eq!(hand.joint(HandJoint::IndexTip).y, 2.0);
        assert_eq!(hand.joint(HandJoint::ThumbTip).y, 0.0);
    }

    #[test]
    fn test_joint_as_str() {
        assert_eq!(HandJoint::Wrist.as_str(), "wrist");
        assert_eq!(HandJoint::ThumbTip.as_str(), "thumb-tip");
        assert_eq!(HandJoint::PinkyTip.as_str(), "pinky-tip");
    }
}
