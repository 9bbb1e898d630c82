//! Speech output.
//!
//! The session speaks through a [`SpeechHandle`], which builds its
//! [`SpeechOutput`] lazily from an injected factory.  When construction
//! fails the handle stays empty and the next `speak` tries again.

use std::io::Write;
use std::process::{Child, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::SpeechError;

/// Default external synthesizer.
pub const DEFAULT_SPEECH_PROGRAM: &str = "espeak-ng";

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// 0.0–1.0, 1.0 = full volume.
    pub volume: f32,
    /// 1.0 = normal speed.
    pub rate: f32,
    /// 1.0 = normal pitch.
    pub pitch: f32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

impl SpeechConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:volume {:.1} :rate {:.1} :pitch {:.1})",
            self.volume, self.rate, self.pitch
        )
    }
}

/// One request to speak.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    pub volume: f32,
    pub rate: f32,
    pub pitch: f32,
}

impl Utterance {
    pub fn new(text: impl Into<String>, config: &SpeechConfig) -> Self {
        Self {
            text: text.into(),
            volume: config.volume,
            rate: config.rate,
            pitch: config.pitch,
        }
    }
}

// ── Output trait ───────────────────────────────────────────

/// A text-to-speech sink.
pub trait SpeechOutput {
    /// Start speaking `utterance`.  Does not wait for it to finish.
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError>;

    /// Stop whatever is being spoken.  No-op when silent.
    fn cancel(&mut self);
}

/// Builds a speech output on demand.
pub type SpeechFactory = Box<dyn FnMut() -> Result<Box<dyn SpeechOutput>, SpeechError>>;

// ── Handle ─────────────────────────────────────────────────

/// Lazily constructed speech output owned by the session.
pub struct SpeechHandle {
    config: SpeechConfig,
    factory: SpeechFactory,
    output: Option<Box<dyn SpeechOutput>>,
}

impl SpeechHandle {
    pub fn new(config: SpeechConfig, factory: SpeechFactory) -> Self {
        Self {
            config,
            factory,
            output: None,
        }
    }

    /// A handle whose factory always fails.
    pub fn unsupported() -> Self {
        Self::new(
            SpeechConfig::default(),
            Box::new(|| Err(SpeechError::Unavailable("no speech output configured".into()))),
        )
    }

    pub fn config(&self) -> &SpeechConfig {
        &self.config
    }

    /// Whether an output has been built.
    pub fn is_ready(&self) -> bool {
        self.output.is_some()
    }

    fn ensure(&mut self) -> Result<&mut Box<dyn SpeechOutput>, SpeechError> {
        if self.output.is_none() {
            let output = (self.factory)()?;
            info!("speech output initialized");
            self.output = Some(output);
        }
        self.output
            .as_mut()
            .ok_or_else(|| SpeechError::Unavailable("speech output missing".into()))
    }

    /// Cancel anything in progress, then speak `text`.
    pub fn speak_text(&mut self, text: &str) -> Result<(), SpeechError> {
        let utterance = Utterance::new(text, &self.config);
        let output = self.ensure()?;
        output.cancel();
        debug!(text, "speaking");
        output.speak(&utterance)
    }

    pub fn cancel(&mut self) {
        if let Some(output) = self.output.as_mut() {
            output.cancel();
        }
    }
}

// ── External program output ────────────────────────────────

/// Speaks by spawning an espeak-compatible program per utterance.
pub struct CommandSpeech {
    program: String,
    child: Option<Child>,
}

impl CommandSpeech {
    /// Check that `program` can be launched before handing out an output.
    pub fn probe(program: &str) -> Result<Self, SpeechError> {
        let status = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SpeechError::Unavailable(format!("{program}: {e}")))?;
        debug!(program, %status, "speech program probed");
        Ok(Self {
            program: program.to_string(),
            child: None,
        })
    }

    /// Factory that probes `program` on every construction attempt.
    pub fn factory(program: String) -> SpeechFactory {
        Box::new(move || {
            let output = Self::probe(&program)?;
            Ok(Box::new(output) as Box<dyn SpeechOutput>)
        })
    }

    /// espeak argument list for `utterance`.  The text itself goes on stdin.
    fn args(utterance: &Utterance) -> Vec<String> {
        // amplitude 0-200 (100 normal), words/min (175 normal), pitch 0-99 (50 normal)
        let amplitude = (utterance.volume.clamp(0.0, 2.0) * 100.0).round() as u32;
        let speed = (utterance.rate.max(0.1) * 175.0).round() as u32;
        let pitch = (utterance.pitch.clamp(0.0, 2.0) * 50.0).round().min(99.0) as u32;
        vec![
            "-a".into(),
            amplitude.to_string(),
            "-s".into(),
            speed.to_string(),
            "-p".into(),
            pitch.to_string(),
            "--stdin".into(),
        ]
    }
}

impl SpeechOutput for CommandSpeech {
    fn speak(&mut self, utterance: &Utterance) -> Result<(), SpeechError> {
        let mut child = Command::new(&self.program)
            .args(Self::args(utterance))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        // dropping stdin closes it so the synthesizer sees end of input
        let stdin = child.stdin.take();
        self.child = Some(child);
        if let Some(mut stdin) = stdin {
            if let Err(e) = writeln!(stdin, "{}", utterance.text) {
                self.cancel();
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(None) = child.try_wait() {
                if let Err(e) = child.kill() {
                    warn!("failed to stop speech process: {}", e);
                }
            }
            let _ = child.wait();
        }
    }
}

impl Drop for CommandSpeech {
    fn drop(&mut self) {
        self.cancel();
    }
}

// ── Test double ────────────────────────────────────────────


// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::testing::recording_handle;
    use super::*;

    #[test]
    fn test_utterance_uses_config() {
        let u = Utterance::new("HELLO", &SpeechConfig::default());
        assert_eq!(u.volume, 1.0);
        assert_eq!(u.rate, 1.0);
        assert_eq!(u.pitch, 1.0);
    }

    #[test]
    fn test_handle_builds_lazily_once() {
        let (mut handle, log) = recording_handle(0);
        assert!(!handle.is_ready());
        handle.speak_text("A").unwrap();
        handle.speak_text("B").unwrap();
        assert!(handle.is_ready());
        assert_eq!(log.borrow().builds, 1);
        assert_eq!(log.borrow().spoken, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_speak_cancels_first() {
        let (mut handle, log) = recording_handle(0);
        handle.speak_text("A").unwrap();
        assert_eq!(log.borrow().cancels, 1);
    }

    #[test]
    fn test_failed_build_retried_on_next_speak() {
        let (mut handle, log) = recording_handle(1);
        assert!(matches!(
            handle.speak_text("A"),
            Err(SpeechError::Unavailable(_))
        ));
        assert!(!handle.is_ready());
        handle.speak_text("B").unwrap();
        assert_eq!(log.borrow().spoken, vec!["B".to_string()]);
    }

    #[test]
    fn test_cancel_without_output_is_noop() {
        let (mut handle, log) = recording_handle(0);
        handle.cancel();
        assert_eq!(log.borrow().cancels, 0);
    }

    #[test]
    fn test_unsupported_handle() {
        let mut handle = SpeechHandle::unsupported();
        assert!(handle.speak_text("HI").is_err());
    }

    #[test]
    fn test_probe_missing_program() {
        let result = CommandSpeech::probe("/nonexistent/signspeak-tts");
        assert!(matches!(result, Err(SpeechError::Unavailable(_))));
    }

    #[test]
    fn test_command_args_normal_voice() {
        let u = Utterance::new("I LOVE YOU", &SpeechConfig::default());
        assert_eq!(
            CommandSpeech::args(&u),
            vec!["-a", "100", "-s", "175", "-p", "50", "--stdin"]
        );
    }

    #[test]
    fn test_dash_label_never_reaches_argv() {
        let u = Utterance::new("-w out.wav", &SpeechConfig::default());
        let args = CommandSpeech::args(&u);
        assert!(args.iter().all(|a| !a.contains("out.wav")));
        assert_eq!(args.last().map(String::as_str), Some("--stdin"));
    }

    #[test]
    fn test_config_sexp() {
        assert_eq!(
            SpeechConfig::default().config_sexp(),
            "(:volume 1.0 :rate 1.0 :pitch 1.0)"
        );
    }
}
