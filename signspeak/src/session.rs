//! Sign session: the single owner of every piece of mutable state.
//!
//! Frames, timer ticks and user commands all land here, one at a time.
//! The session encodes hands, feeds training examples, classifies, runs the
//! stabilizer and applies the resulting sentence events.  It also keeps the
//! UI-facing state (status line, current gesture, countdown display).

use tracing::{debug, info, warn};

use crate::classifier::{ExampleDataset, GestureClassifier};
use crate::control::escape_string;
use crate::error::{SessionError, SpeechError};
use crate::gesture::{
    encode, normalize_label, GestureStabilizer, HandLandmarks, SentenceEvent, StabilizerConfig,
    TrainingConfig, TrainingEvent, TrainingSession,
};
use crate::sentence::Sentence;
use crate::speech::SpeechHandle;
use crate::storage::{KeyValueStore, BRAIN_KEY};

/// Gestures offered to new users as a starting vocabulary.
pub const SUGGESTED_GESTURES: [&str; 8] = [
    "HELLO",
    "YES",
    "NO",
    "THANK YOU",
    "I LOVE YOU",
    "HELP",
    "BATHROOM",
    "EAT",
];

pub const STATUS_READY: &str = "Ready";
pub const STATUS_SYSTEM_READY: &str = "System Ready";
pub const STATUS_LOADING: &str = "Loading Brain...";
pub const STATUS_STARTING: &str = "Starting Vision...";
pub const STATUS_RETRYING: &str = "Retrying...";
pub const STATUS_SWITCHING: &str = "Switching...";
pub const STATUS_SPEAKING: &str = "Speaking...";
pub const STATUS_DELETED: &str = "Deleted word";
pub const STATUS_SAVED: &str = "Saved.";
pub const STATUS_NO_SPEECH: &str = "Speech not supported";

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub stabilizer: StabilizerConfig,
    pub training: TrainingConfig,
    /// How long "Speaking..." stays up before reverting to "Ready" (ms).
    pub speaking_status_ms: f64,
    /// How long "Deleted word" stays up (ms).
    pub deleted_status_ms: f64,
    /// Store key for the example blob.
    pub storage_key: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerConfig::default(),
            training: TrainingConfig::default(),
            speaking_status_ms: 2000.0,
            deleted_status_ms: 1000.0,
            storage_key: BRAIN_KEY.to_string(),
        }
    }
}

// ── Display state ──────────────────────────────────────────

/// What the gesture readout shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GestureDisplay {
    /// Nothing processed yet.
    Idle,
    /// Last frame held no hand.
    NoHand,
    /// Last accepted classification.
    Gesture { label: String, confidence_pct: u32 },
}

/// Big countdown overlay during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDisplay {
    Count(u32),
    Go,
}

#[derive(Debug, Clone)]
struct StatusLine {
    text: String,
    /// Revert to `STATUS_READY` once this reaches zero.
    revert_in_ms: Option<f64>,
}

// ── Session ────────────────────────────────────────────────

pub struct SignSession<C, K> {
    config: SessionConfig,
    classifier: C,
    store: K,
    speech: SpeechHandle,
    stabilizer: GestureStabilizer,
    training: TrainingSession,
    sentence: Sentence,
    /// Known gesture labels in the order they were learned.
    library: Vec<String>,
    display: GestureDisplay,
    status: StatusLine,
    timer: Option<TimerDisplay>,
    /// Set by `switch_source`, consumed by the runtime.
    switch_requested: bool,
    alive: bool,
}

impl<C: GestureClassifier, K: KeyValueStore> SignSession<C, K> {
    pub fn new(config: SessionConfig, classifier: C, store: K, speech: SpeechHandle) -> Self {
        let stabilizer = GestureStabilizer::new(config.stabilizer.clone());
        let training = TrainingSession::new(config.training.clone());
        Self {
            config,
            classifier,
            store,
            speech,
            stabilizer,
            training,
            sentence: Sentence::new(),
            library: Vec::new(),
            display: GestureDisplay::Idle,
            status: StatusLine {
                text: STATUS_SYSTEM_READY.to_string(),
                revert_in_ms: None,
            },
            timer: None,
            switch_requested: false,
            alive: true,
        }
    }

    // ── Accessors ──────────────────────────────────────────

    pub fn sentence(&self) -> &Sentence {
        &self.sentence
    }

    pub fn known_labels(&self) -> &[String] {
        &self.library
    }

    pub fn suggestions(&self) -> &'static [&'static str] {
        &SUGGESTED_GESTURES
    }

    pub fn display(&self) -> &GestureDisplay {
        &self.display
    }

    pub fn status(&self) -> &str {
        &self.status.text
    }

    pub fn timer_display(&self) -> Option<TimerDisplay> {
        self.timer
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn classifier_mut(&mut self) -> &mut C {
        &mut self.classifier
    }

    pub fn store(&self) -> &K {
        &self.store
    }

    pub fn stabilizer(&self) -> &GestureStabilizer {
        &self.stabilizer
    }

    pub fn training(&self) -> &TrainingSession {
        &self.training
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Set a persistent status line, dropping any pending revert.
    pub fn set_status(&mut self, text: &str) {
        self.status = StatusLine {
            text: text.to_string(),
            revert_in_ms: None,
        };
    }

    fn set_transient_status(&mut self, text: &str, duration_ms: f64) {
        self.status = StatusLine {
            text: text.to_string(),
            revert_in_ms: Some(duration_ms),
        };
    }

    // ── Frame processing ───────────────────────────────────

    /// Process the hands detected in one frame.  Returns the sentence event
    /// that was applied, if any.
    pub fn on_hands(&mut self, hands: &[HandLandmarks]) -> Option<SentenceEvent> {
        if !self.alive {
            debug!("frame after teardown ignored");
            return None;
        }
        if hands.is_empty() {
            self.display = GestureDisplay::NoHand;
            return None;
        }

        let features = encode(hands);
        if let Some(label) = self.training.capture_label() {
            let label = label.to_string();
            self.classifier.add_example(features.clone(), &label);
        }

        if self.classifier.num_classes() == 0 {
            return None;
        }
        let result = self.classifier.predict(&features)?;
        if !self.stabilizer.accepts(&result) {
            return None;
        }

        self.display = GestureDisplay::Gesture {
            label: result.label.clone(),
            confidence_pct: result.confidence_pct(),
        };
        let event = self.stabilizer.on_classification(&result, &self.sentence)?;
        self.apply(event.clone());
        Some(event)
    }

    /// Apply a sentence event from the stabilizer or the control surface.
    pub fn apply(&mut self, event: SentenceEvent) {
        match event {
            SentenceEvent::AppendWord(word) => {
                if self.sentence.append(&word) {
                    info!(%word, sentence = %self.sentence.text(), "word added");
                }
            }
            SentenceEvent::DeleteLastWord => self.delete_last_word(),
            SentenceEvent::Speak => {
                if let Err(e) = self.speak() {
                    debug!("gesture speak failed: {}", e);
                }
            }
            SentenceEvent::Clear => self.clear_sentence(),
        }
    }

    // ── Timers ─────────────────────────────────────────────

    /// Advance every time-driven piece of state by `dt_ms`.
    pub fn tick(&mut self, dt_ms: f64) {
        if !self.alive {
            return;
        }
        self.stabilizer.tick(dt_ms);

        for event in self.training.tick(dt_ms) {
            self.on_training_event(event);
        }

        if let Some(remaining) = self.status.revert_in_ms.as_mut() {
            *remaining -= dt_ms;
            if *remaining <= 0.0 {
                self.set_status(STATUS_READY);
            }
        }
    }

    fn on_training_event(&mut self, event: TrainingEvent) {
        match event {
            TrainingEvent::Countdown { remaining, .. } => {
                self.timer = Some(TimerDisplay::Count(remaining));
                self.set_status(&format!("Ready... {}", remaining));
            }
            TrainingEvent::CaptureStarted { label } => {
                self.timer = Some(TimerDisplay::Go);
                self.set_status(&format!("Learning '{}'...", label));
                self.stabilizer.set_training_active(true);
                if !self.library.contains(&label) {
                    self.library.push(label);
                }
            }
            TrainingEvent::CaptureFinished { label } => {
                self.stabilizer.set_training_active(false);
                self.timer = None;
                self.set_status(STATUS_SAVED);
                info!(
                    %label,
                    examples = self.classifier.example_count(&label),
                    "gesture learned"
                );
                self.save_brain();
            }
        }
    }

    // ── Training / library ─────────────────────────────────

    /// Start teaching a gesture.
    pub fn teach(&mut self, label: &str) -> Result<(), SessionError> {
        if !self.alive {
            return Err(SessionError::Closed);
        }
        let event = self.training.start(label)?;
        self.on_training_event(event);
        Ok(())
    }

    /// Abandon training in progress without persisting.
    pub fn cancel_training(&mut self) -> Option<String> {
        let label = self.training.cancel()?;
        self.stabilizer.set_training_active(false);
        self.timer = None;
        self.set_status(STATUS_READY);
        Some(label)
    }

    /// Forget a gesture.  Returns whether the label was in the library.
    pub fn delete_gesture(&mut self, label: &str) -> bool {
        let label = normalize_label(label);
        if self.classifier.num_classes() > 0 {
            self.classifier.clear_label(&label);
        }
        self.save_brain();
        let before = self.library.len();
        self.library.retain(|known| known != &label);
        let removed = self.library.len() != before;
        if removed {
            info!(%label, "gesture deleted");
        }
        removed
    }

    // ── Sentence actions ───────────────────────────────────

    /// Speak the sentence (or the fallback phrase when empty).
    pub fn speak(&mut self) -> Result<(), SpeechError> {
        let text = self.sentence.spoken_text();
        match self.speech.speak_text(&text) {
            Ok(()) => {
                let duration = self.config.speaking_status_ms;
                self.set_transient_status(STATUS_SPEAKING, duration);
                Ok(())
            }
            Err(e) => {
                warn!("speech unavailable: {}", e);
                self.set_status(STATUS_NO_SPEECH);
                Err(e)
            }
        }
    }

    pub fn delete_last_word(&mut self) {
        if let Some(word) = self.sentence.delete_last() {
            debug!(%word, "word deleted");
        }
        let duration = self.config.deleted_status_ms;
        self.set_transient_status(STATUS_DELETED, duration);
    }

    pub fn clear_sentence(&mut self) {
        self.sentence.clear();
    }

    // ── Lifecycle ──────────────────────────────────────────

    /// Drop pending countdown, capture and cooldown state.
    pub fn cancel_pending(&mut self) {
        self.training.cancel();
        self.stabilizer.set_training_active(false);
        self.stabilizer.reset();
        self.timer = None;
        self.status.revert_in_ms = None;
    }

    /// Camera switch: cancel timers and show the switching status.
    pub fn switch_source(&mut self) {
        self.cancel_pending();
        self.display = GestureDisplay::Idle;
        self.set_status(STATUS_SWITCHING);
        self.switch_requested = true;
    }

    /// Whether a source switch is pending; clears the request.
    pub fn take_switch_request(&mut self) -> bool {
        std::mem::take(&mut self.switch_requested)
    }

    /// Stop accepting frames and commands.
    pub fn teardown(&mut self) {
        if !self.alive {
            return;
        }
        self.cancel_pending();
        self.speech.cancel();
        self.alive = false;
        info!("session torn down");
    }

    // ── Persistence ────────────────────────────────────────

    /// Persist the classifier's examples.  Failures are logged and ignored.
    pub fn save_brain(&mut self) {
        let blob = match self.classifier.export_examples().to_json() {
            Ok(blob) => blob,
            Err(e) => {
                warn!("failed to serialize examples: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(&self.config.storage_key, &blob) {
            warn!("failed to persist examples: {}", e);
        }
    }

    /// Load persisted examples.  Missing or corrupt data leaves the
    /// classifier and library untouched.
    pub fn restore_brain(&mut self) {
        self.set_status(STATUS_LOADING);
        let raw = match self.store.get(&self.config.storage_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no stored examples");
                return;
            }
            Err(e) => {
                warn!("failed to read stored examples: {}", e);
                return;
            }
        };
        let dataset = match ExampleDataset::from_json(&raw) {
            Ok(dataset) => dataset,
            Err(e) => {
                warn!("stored examples unreadable: {}", e);
                return;
            }
        };
        if let Err(e) = self.classifier.import_examples(&dataset) {
            warn!("failed to import stored examples: {}", e);
            return;
        }
        self.library = dataset.labels();
        info!(labels = self.library.len(), "restored gesture library");
    }

    // ── Status ─────────────────────────────────────────────

    /// Generate s-expression for status queries.
    pub fn status_sexp(&self) -> String {
        let gesture = match &self.display {
            GestureDisplay::Idle => "nil".to_string(),
            GestureDisplay::NoHand => ":no-hand".to_string(),
            GestureDisplay::Gesture { label, .. } => format!("\"{}\"", escape_string(label)),
        };
        let confidence = match &self.display {
            GestureDisplay::Gesture { confidence_pct, .. } => *confidence_pct,
            _ => 0,
        };
        let timer = match self.timer {
            None => "nil".to_string(),
            Some(TimerDisplay::Count(n)) => n.to_string(),
            Some(TimerDisplay::Go) => "\"GO!\"".to_string(),
        };
        format!(
            "(:status \"{}\" :sentence {} :gesture {} :confidence {} :timer {} :library {} :training {} :stabilizer {})",
            escape_string(&self.status.text),
            string_list(self.sentence.words()),
            gesture,
            confidence,
            timer,
            string_list(&self.library),
            self.training.status_sexp(),
            self.stabilizer.status_sexp(),
        )
    }
}

/// Render strings as an s-expression list.
pub(crate) fn string_list<S: AsRef<str>>(items: &[S]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|s| format!("\"{}\"", escape_string(s.as_ref())))
        .collect();
    format!("({})", quoted.join(" "))
}

// ── Tests ──────────────────────────────────────────────────
