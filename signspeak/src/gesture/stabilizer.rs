//! Gesture stabilization: raw per-frame classifications into sentence events.
//!
//! A word is committed only after the same label wins enough consecutive
//! high-confidence frames.  `SPEAK` and `DELETE` are control labels handled
//! on every qualifying frame, guarded by a time-based cooldown.  Nothing
//! here mutates the sentence directly; callers apply the returned
//! [`SentenceEvent`].

use tracing::debug;

use crate::classifier::ClassificationResult;
use crate::control::escape_string;
use crate::sentence::Sentence;

/// Control label that speaks the sentence.
pub const SPEAK_LABEL: &str = "SPEAK";
/// Control label that removes the last word.
pub const DELETE_LABEL: &str = "DELETE";
/// Neutral pose label; never becomes a word.
pub const NOTHING_LABEL: &str = "NOTHING";

// ── Events ─────────────────────────────────────────────────

/// Sentence mutations requested by the stabilizer or the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentenceEvent {
    /// Commit a word (skipped by the sentence if it repeats the last word).
    AppendWord(String),
    /// Remove the last word.
    DeleteLastWord,
    /// Speak the current sentence.
    Speak,
    /// Empty the sentence.  Never produced from gestures.
    Clear,
}

// ── Config ─────────────────────────────────────────────────

/// How the SPEAK and DELETE cooldowns interact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    /// One lockout guards both actions; the last action's duration applies.
    Shared,
    /// Each action has its own lockout.
    Independent,
}

impl CooldownPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Independent => "independent",
        }
    }
}

/// What a `NOTHING` (or empty) label does to the stability counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NothingPolicy {
    /// Reset the consecutive count to zero.
    ResetCount,
    /// Leave counters untouched so a brief flicker does not break a hold.
    Ignore,
}

impl NothingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResetCount => "reset-count",
            Self::Ignore => "ignore",
        }
    }
}

/// Thresholds and timings for stabilization.
#[derive(Debug, Clone)]
pub struct StabilizerConfig {
    /// A classification counts only if its label confidence exceeds this.
    pub acceptance_threshold: f32,
    /// Consecutive-count value at which a word is committed.
    pub stable_frames: u32,
    /// Lockout after a SPEAK action (ms).
    pub speak_cooldown_ms: f64,
    /// Lockout after a DELETE action (ms).
    pub delete_cooldown_ms: f64,
    pub cooldown_policy: CooldownPolicy,
    pub nothing_policy: NothingPolicy,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.95,
            stable_frames: 15,
            speak_cooldown_ms: 2000.0,
            delete_cooldown_ms: 1500.0,
            cooldown_policy: CooldownPolicy::Shared,
            nothing_policy: NothingPolicy::ResetCount,
        }
    }
}

// ── Cooldowns ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlAction {
    Speak,
    Delete,
}

/// Remaining lockout time per slot (ms).  Only `shared_ms` is used under
/// `CooldownPolicy::Shared`.
#[derive(Debug, Clone, Default)]
struct Cooldowns {
    shared_ms: f64,
    speak_ms: f64,
    delete_ms: f64,
}

impl Cooldowns {
    fn slot_mut(&mut self, policy: CooldownPolicy, action: ControlAction) -> &mut f64 {
        match (policy, action) {
            (CooldownPolicy::Shared, _) => &mut self.shared_ms,
            (CooldownPolicy::Independent, ControlAction::Speak) => &mut self.speak_ms,
            (CooldownPolicy::Independent, ControlAction::Delete) => &mut self.delete_ms,
        }
    }

    fn remaining(&self, policy: CooldownPolicy, action: ControlAction) -> f64 {
        match (policy, action) {
            (CooldownPolicy::Shared, _) => self.shared_ms,
            (CooldownPolicy::Independent, ControlAction::Speak) => self.speak_ms,
            (CooldownPolicy::Independent, ControlAction::Delete) => self.delete_ms,
        }
    }

    fn any_active(&self) -> bool {
        self.shared_ms > 0.0 || self.speak_ms > 0.0 || self.delete_ms > 0.0
    }

    fn advance(&mut self, dt_ms: f64) {
        for slot in [&mut self.shared_ms, &mut self.speak_ms, &mut self.delete_ms] {
            *slot = (*slot - dt_ms).max(0.0);
        }
    }
}

// ── State ──────────────────────────────────────────────────

/// Debounce state between the classifier and the sentence.
pub struct GestureStabilizer {
    pub config: StabilizerConfig,
    /// Running label being counted ("" initially).
    last_label: String,
    consecutive_count: u32,
    cooldowns: Cooldowns,
    training_active: bool,
}

impl Default for GestureStabilizer {
    fn default() -> Self {
        Self::new(StabilizerConfig::default())
    }
}

impl GestureStabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            config,
            last_label: String::new(),
            consecutive_count: 0,
            cooldowns: Cooldowns::default(),
            training_active: false,
        }
    }

    /// Whether `result` passes the confidence gate.
    pub fn accepts(&self, result: &ClassificationResult) -> bool {
        result.confidence() > self.config.acceptance_threshold
    }

    /// Feed one frame's classification.  Sub-threshold results and results
    /// seen while training is active change nothing.
    pub fn on_classification(
        &mut self,
        result: &ClassificationResult,
        sentence: &Sentence,
    ) -> Option<SentenceEvent> {
        if !self.accepts(result) || self.training_active {
            return None;
        }

        match result.label.as_str() {
            SPEAK_LABEL => self.control(ControlAction::Speak, sentence),
            DELETE_LABEL => self.control(ControlAction::Delete, sentence),
            "" | NOTHING_LABEL => {
                if self.config.nothing_policy == NothingPolicy::ResetCount {
                    self.consecutive_count = 0;
                    self.last_label.clear();
                }
                None
            }
            label => self.track(label),
        }
    }

    fn control(&mut self, action: ControlAction, sentence: &Sentence) -> Option<SentenceEvent> {
        let policy = self.config.cooldown_policy;
        if self.cooldowns.remaining(policy, action) > 0.0 || sentence.is_empty() {
            return None;
        }

        let (duration, event) = match action {
            ControlAction::Speak => (self.config.speak_cooldown_ms, SentenceEvent::Speak),
            ControlAction::Delete => (self.config.delete_cooldown_ms, SentenceEvent::DeleteLastWord),
        };
        *self.cooldowns.slot_mut(policy, action) = duration;
        debug!(?action, cooldown_ms = duration, "control gesture fired");
        Some(event)
    }

    fn track(&mut self, label: &str) -> Option<SentenceEvent> {
        if label == self.last_label {
            self.consecutive_count += 1;
        } else {
            self.consecutive_count = 0;
            self.last_label = label.to_string();
        }

        if self.consecutive_count == self.config.stable_frames {
            self.consecutive_count = 0;
            debug!(label, "gesture stable, committing word");
            return Some(SentenceEvent::AppendWord(label.to_string()));
        }
        None
    }

    /// Advance cooldown timers by `dt_ms`.
    pub fn tick(&mut self, dt_ms: f64) {
        let was_active = self.cooldowns.any_active();
        self.cooldowns.advance(dt_ms);
        if was_active && !self.cooldowns.any_active() {
            debug!("control cooldown expired");
        }
    }

    pub fn set_training_active(&mut self, active: bool) {
        self.training_active = active;
    }

    pub fn is_training_active(&self) -> bool {
        self.training_active
    }

    pub fn is_cooldown_active(&self) -> bool {
        self.cooldowns.any_active()
    }

    pub fn consecutive_count(&self) -> u32 {
        self.consecutive_count
    }

    pub fn last_label(&self) -> &str {
        &self.last_label
    }

    /// Drop counters and pending cooldowns.
    pub fn reset(&mut self) {
        self.last_label.clear();
        self.consecutive_count = 0;
        self.cooldowns = Cooldowns::default();
    }

    /// Generate s-expression for status queries.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:label \"{}\" :count {} :cooldown {} :training {})",
            escape_string(&self.last_label),
            self.consecutive_count,
            if self.cooldowns.any_active() { "t" } else { "nil" },
            if self.training_active { "t" } else { "nil" },
        )
    }

    /// Generate s-expression for config queries.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:threshold {:.2} :stable-frames {} :speak-cooldown-ms {:.0} :delete-cooldown-ms {:.0} :cooldown-policy :{} :nothing-policy :{})",
            self.config.acceptance_threshold,
            self.config.stable_frames,
            self.config.speak_cooldown_ms,
            self.config.delete_cooldown_ms,
            self.config.cooldown_policy.as_str(),
            self.config.nothing_policy.as_str(),
        )
    }
}

// ── Test helpers ───────────────────────────────────────────

#[cfg(test)]
fn result_for(label: &str, confidence: f32) -> ClassificationResult {
    let mut confidences = std::collections::BTreeMap::new();
    confidences.insert(label.to_string(), confidence);
    confidences.insert("OTHER".to_string(), 1.0 - confidence);
    ClassificationResult {
        label: label.to_string(),
        confidences,
    }
}

// ── Tests ──────────────────────────────────────────────────
