//! Teach-a-gesture session: a short countdown, then a fixed capture window.
//!
//! `Idle → CountingDown(n) → Capturing → Idle`.  The machine is time-driven
//! through [`TrainingSession::tick`]; the session owner reacts to the
//! returned [`TrainingEvent`]s (feeding examples, persisting, status text).

use tracing::{debug, info};

use crate::control::escape_string;
use crate::error::SessionError;

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    /// Countdown steps before capture begins.  0 starts capture at once.
    pub prep_seconds: u32,
    /// Length of one countdown step (ms).
    pub step_ms: f64,
    /// Capture window (ms).
    pub capture_ms: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            prep_seconds: 2,
            step_ms: 1000.0,
            capture_ms: 3000.0,
        }
    }
}

// ── Phase / events ─────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingPhase {
    Idle,
    CountingDown { label: String, remaining: u32 },
    Capturing { label: String },
}

impl TrainingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::CountingDown { .. } => "counting-down",
            Self::Capturing { .. } => "capturing",
        }
    }
}

/// Transitions reported to the session owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingEvent {
    /// Countdown shows `remaining` (emitted on entry and on every step).
    Countdown { label: String, remaining: u32 },
    /// Capture window opened; examples should now be collected.
    CaptureStarted { label: String },
    /// Capture window closed; examples should be persisted.
    CaptureFinished { label: String },
}

// ── Session ────────────────────────────────────────────────

/// Normalize a user-entered label: trimmed and upper-cased.
pub fn normalize_label(raw: &str) -> String {
    raw.trim().to_uppercase()
}

pub struct TrainingSession {
    pub config: TrainingConfig,
    phase: TrainingPhase,
    /// Time spent in the current step or capture window (ms).
    elapsed_ms: f64,
}

impl Default for TrainingSession {
    fn default() -> Self {
        Self::new(TrainingConfig::default())
    }
}

impl TrainingSession {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            phase: TrainingPhase::Idle,
            elapsed_ms: 0.0,
        }
    }

    pub fn phase(&self) -> &TrainingPhase {
        &self.phase
    }

    pub fn is_idle(&self) -> bool {
        self.phase == TrainingPhase::Idle
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.phase, TrainingPhase::Capturing { .. })
    }

    /// Label being taught, in any non-idle phase.
    pub fn active_label(&self) -> Option<&str> {
        match &self.phase {
            TrainingPhase::Idle => None,
            TrainingPhase::CountingDown { label, .. } | TrainingPhase::Capturing { label } => {
                Some(label)
            }
        }
    }

    /// Label receiving examples right now.
    pub fn capture_label(&self) -> Option<&str> {
        match &self.phase {
            TrainingPhase::Capturing { label } => Some(label),
            _ => None,
        }
    }

    /// Begin teaching `raw_label`.
    pub fn start(&mut self, raw_label: &str) -> Result<TrainingEvent, SessionError> {
        let label = normalize_label(raw_label);
        if label.is_empty() {
            return Err(SessionError::EmptyLabel);
        }
        if let Some(current) = self.active_label() {
            return Err(SessionError::TrainingInProgress(current.to_string()));
        }

        info!(%label, prep_seconds = self.config.prep_seconds, "training session started");
        self.elapsed_ms = 0.0;
        if self.config.prep_seconds == 0 {
            return Ok(self.begin_capture(label));
        }
        self.phase = TrainingPhase::CountingDown {
            label: label.clone(),
            remaining: self.config.prep_seconds,
        };
        Ok(TrainingEvent::Countdown {
            label,
            remaining: self.config.prep_seconds,
        })
    }

    fn begin_capture(&mut self, label: String) -> TrainingEvent {
        debug!(%label, capture_ms = self.config.capture_ms, "capture window open");
        self.phase = TrainingPhase::Capturing {
            label: label.clone(),
        };
        TrainingEvent::CaptureStarted { label }
    }

    /// Advance by `dt_ms`, returning every transition that elapsed.
    pub fn tick(&mut self, dt_ms: f64) -> Vec<TrainingEvent> {
        let mut events = Vec::new();
        if self.is_idle() {
            return events;
        }
        self.elapsed_ms += dt_ms;

        loop {
            match std::mem::replace(&mut self.phase, TrainingPhase::Idle) {
                TrainingPhase::Idle => break,
                TrainingPhase::CountingDown { label, remaining } => {
                    if self.elapsed_ms < self.config.step_ms {
                        self.phase = TrainingPhase::CountingDown { label, remaining };
                        break;
                    }
                    self.elapsed_ms -= self.config.step_ms;
                    let remaining = remaining.saturating_sub(1);
                    if remaining == 0 {
                        events.push(self.begin_capture(label));
                    } else {
                        events.push(TrainingEvent::Countdown {
                            label: label.clone(),
                            remaining,
                        });
                        self.phase = TrainingPhase::CountingDown { label, remaining };
                    }
                }
                TrainingPhase::Capturing { label } => {
                    if self.elapsed_ms < self.config.capture_ms {
                        self.phase = TrainingPhase::Capturing { label };
                        break;
                    }
                    info!(%label, "capture window closed");
                    self.elapsed_ms = 0.0;
                    events.push(TrainingEvent::CaptureFinished { label });
                    break;
                }
            }
        }
        events
    }

    /// Abandon any session in progress.  Returns the label that was active.
    pub fn cancel(&mut self) -> Option<String> {
        let label = self.active_label().map(str::to_string);
        if let Some(label) = &label {
            debug!(%label, "training session cancelled");
        }
        self.phase = TrainingPhase::Idle;
        self.elapsed_ms = 0.0;
        label
    }

    /// Generate s-expression for status queries.
    pub fn status_sexp(&self) -> String {
        let label = match self.active_label() {
            Some(l) => format!("\"{}\"", escape_string(l)),
            None => "nil".to_string(),
        };
        let remaining = match &self.phase {
            TrainingPhase::CountingDown { remaining, .. } => remaining.to_string(),
            _ => "nil".to_string(),
        };
        format!(
            "(:phase :{} :label {} :remaining {})",
            self.phase.as_str(),
            label,
            remaining
        )
    }

    /// Generate s-expression for config queries.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:prep-seconds {} :step-ms {:.0} :capture-ms {:.0})",
            self.config.prep_seconds, self.config.step_ms, self.config.capture_ms
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
