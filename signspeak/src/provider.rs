//! Landmark providers and frame throttling.
//!
//! A provider yields the hands detected in one processed camera frame.  The
//! runtime drives it from a dedicated thread, throttled by [`FrameThrottle`].

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::ProviderError;
use crate::gesture::HandLandmarks;

/// Minimum gap between two submitted frames.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(30);

/// Source of per-frame hand landmarks.
pub trait LandmarkProvider: Send {
    /// Detect hands in the next frame.  `Ok(None)` when the stream has ended;
    /// `Ok(Some(vec![]))` when the frame holds no hand.
    fn detect(&mut self) -> Result<Option<Vec<HandLandmarks>>, ProviderError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "provider"
    }
}

// ── Replay ─────────────────────────────────────────────────

/// Replays a JSON-lines recording.
///
/// Each non-blank line is one frame: an array of hands, each an array of
/// exactly 21 `[x, y, z]` triples.  `[]` is a frame with no hand.
pub struct ReplayProvider<R> {
    lines: Lines<R>,
    frame: usize,
}

impl ReplayProvider<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, ProviderError> {
        let file = File::open(path).map_err(|e| {
            ProviderError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        info!("replaying landmarks from {}", path.display());
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> ReplayProvider<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            frame: 0,
        }
    }

    /// Frames yielded so far.
    pub fn frames_read(&self) -> usize {
        self.frame
    }

    fn parse_frame(frame: usize, line: &str) -> Result<Vec<HandLandmarks>, ProviderError> {
        let raw: Vec<Vec<[f32; 3]>> =
            serde_json::from_str(line).map_err(|e| ProviderError::MalformedFrame {
                frame,
                reason: e.to_string(),
            })?;
        raw.iter()
            .enumerate()
            .map(|(i, triples)| {
                HandLandmarks::from_triples(triples).ok_or_else(|| ProviderError::MalformedFrame {
                    frame,
                    reason: format!("hand {} has {} landmarks", i, triples.len()),
                })
            })
            .collect()
    }
}

impl<R: BufRead + Send> LandmarkProvider for ReplayProvider<R> {
    fn detect(&mut self) -> Result<Option<Vec<HandLandmarks>>, ProviderError> {
        for line in self.lines.by_ref() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let frame = self.frame;
            self.frame += 1;
            return Self::parse_frame(frame, &line).map(Some);
        }
        debug!(frames = self.frame, "replay finished");
        Ok(None)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

// ── Scripted ───────────────────────────────────────────────

/// In-memory provider yielding a fixed list of frames.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    frames: VecDeque<Vec<HandLandmarks>>,
}

impl ScriptedProvider {
    pub fn new(frames: impl IntoIterator<Item = Vec<HandLandmarks>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl LandmarkProvider for ScriptedProvider {
    fn detect(&mut self) -> Result<Option<Vec<HandLandmarks>>, ProviderError> {
        Ok(self.frames.pop_front())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ── Throttle ───────────────────────────────────────────────

/// Admits at most one frame per `interval`.
#[derive(Debug)]
pub struct FrameThrottle {
    pub interval: Duration,
    last_submit: Option<Instant>,
    /// Frames admitted.
    pub submitted: u64,
    /// Polls rejected because the interval had not elapsed.
    pub skipped: u64,
}

impl Default for FrameThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl FrameThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_submit: None,
            submitted: 0,
            skipped: 0,
        }
    }

    /// Whether a frame may be submitted at `now`.  Admitting records `now`.
    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_submit {
            Some(last) if now.saturating_duration_since(last) < self.interval => {
                self.skipped += 1;
                false
            }
            _ => {
                self.last_submit = Some(now);
                self.submitted += 1;
                true
            }
        }
    }

    /// Time left before the next frame is admitted.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_submit {
            Some(last) => self
                .interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.last_submit = None;
    }

    /// Generate s-expression for status queries.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:interval-ms {} :submitted {} :skipped {})",
            self.interval.as_millis(),
            self.submitted,
            self.skipped
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
