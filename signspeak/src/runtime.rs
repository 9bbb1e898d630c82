//! Event loop — serializes provider frames, control commands and timer ticks
//! onto the session.
//!
//! The landmark provider runs on its own thread and pushes [`LoopEvent`]s
//! through a calloop channel.  Every provider run carries a generation
//! number; events from an older run (after a switch or a retry) are dropped.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use calloop::channel::{self, Sender};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle};
use tracing::{debug, error, info, warn};

use crate::classifier::GestureClassifier;
use crate::control;
use crate::error::ProviderError;
use crate::gesture::HandLandmarks;
use crate::provider::{FrameThrottle, LandmarkProvider, DEFAULT_FRAME_INTERVAL};
use crate::session::{SignSession, STATUS_RETRYING, STATUS_STARTING, STATUS_SYSTEM_READY};
use crate::storage::KeyValueStore;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Builds a fresh provider for each run.
pub type ProviderFactory = Box<dyn FnMut() -> Result<Box<dyn LandmarkProvider>, ProviderError>>;

/// Receives one control response line.
pub type Responder = Box<dyn FnMut(&str)>;

// ── Config ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Minimum gap between frames submitted to the provider.
    pub frame_interval: Duration,
    /// Period of the timer driving cooldowns, countdown and status expiry.
    pub tick_interval: Duration,
    /// Delay before rebuilding a provider that failed.
    pub retry_delay: Duration,
    /// Upper bound for one `dispatch` call.
    pub poll_interval: Duration,
    /// Stop after this long (for scripted runs).
    pub exit_after: Option<Duration>,
    /// Stop once the provider stream ends and no training is in progress.
    pub exit_on_finish: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            tick_interval: Duration::from_millis(50),
            retry_delay: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(100),
            exit_after: None,
            exit_on_finish: false,
        }
    }
}

impl RuntimeConfig {
    pub fn config_sexp(&self) -> String {
        format!(
            "(:frame-interval-ms {} :tick-interval-ms {} :retry-delay-ms {} :exit-on-finish {})",
            self.frame_interval.as_millis(),
            self.tick_interval.as_millis(),
            self.retry_delay.as_millis(),
            if self.exit_on_finish { "t" } else { "nil" },
        )
    }
}

// ── Events ─────────────────────────────────────────────────

/// Everything that reaches the loop from other threads.
#[derive(Debug)]
pub enum LoopEvent {
    Frame {
        generation: u64,
        hands: Vec<HandLandmarks>,
    },
    ProviderFailed {
        generation: u64,
        error: String,
    },
    ProviderFinished {
        generation: u64,
    },
    Command(String),
}

// ── Provider worker ────────────────────────────────────────

struct ProviderWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ProviderWorker {
    fn spawn(
        mut provider: Box<dyn LandmarkProvider>,
        generation: u64,
        interval: Duration,
        sender: Sender<LoopEvent>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let thread = thread::Builder::new()
            .name(format!("provider-{}", generation))
            .spawn(move || {
                let mut throttle = FrameThrottle::new(interval);
                debug!(generation, provider = provider.name(), "provider thread started");
                while !stop_flag.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if !throttle.admit(now) {
                        thread::sleep(throttle.remaining(now));
                        continue;
                    }
                    let event = match provider.detect() {
                        Ok(Some(hands)) => LoopEvent::Frame { generation, hands },
                        Ok(None) => LoopEvent::ProviderFinished { generation },
                        Err(ProviderError::MalformedFrame { frame, reason }) => {
                            warn!(generation, frame, "skipping malformed frame: {}", reason);
                            continue;
                        }
                        Err(e) => LoopEvent::ProviderFailed {
                            generation,
                            error: e.to_string(),
                        },
                    };
                    let last = !matches!(event, LoopEvent::Frame { .. });
                    if sender.send(event).is_err() || last {
                        break;
                    }
                }
                debug!(generation, "provider thread exiting: {}", throttle.status_sexp());
            })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("provider thread panicked");
            }
        }
    }
}

impl Drop for ProviderWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── State ──────────────────────────────────────────────────

/// Counters for periodic status logging.
#[derive(Debug, Default, Clone)]
pub struct RuntimeStats {
    pub frames: u64,
    pub stale_events: u64,
    pub provider_failures: u64,
    pub commands: u64,
}

/// Data owned by the event loop.
pub struct RuntimeState<C, K> {
    pub session: SignSession<C, K>,
    pub stats: RuntimeStats,
    pub running: bool,
    config: RuntimeConfig,
    handle: LoopHandle<'static, RuntimeState<C, K>>,
    sender: Sender<LoopEvent>,
    provider_factory: ProviderFactory,
    responder: Responder,
    worker: Option<ProviderWorker>,
    generation: u64,
    provider_finished: bool,
    last_tick: Instant,
}

impl<C, K> RuntimeState<C, K>
where
    C: GestureClassifier + 'static,
    K: KeyValueStore + 'static,
{
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn provider_finished(&self) -> bool {
        self.provider_finished
    }

    /// Stop the current provider run and start a new one.  A factory
    /// failure schedules another attempt after `retry_delay`.
    pub fn start_provider(&mut self) {
        self.stop_provider();
        self.generation += 1;
        self.provider_finished = false;
        if !self.session.is_alive() {
            return;
        }
        if self.session.training().is_idle() {
            self.session.set_status(STATUS_STARTING);
        }

        let provider = match (self.provider_factory)() {
            Ok(provider) => provider,
            Err(e) => {
                warn!("landmark provider unavailable: {}", e);
                self.stats.provider_failures += 1;
                self.session.set_status(STATUS_RETRYING);
                self.schedule_retry();
                return;
            }
        };

        let name = provider.name().to_string();
        match ProviderWorker::spawn(
            provider,
            self.generation,
            self.config.frame_interval,
            self.sender.clone(),
        ) {
            Ok(worker) => {
                info!(provider = %name, generation = self.generation, "landmark provider started");
                self.worker = Some(worker);
                // countdown and capture own the status line
                if self.session.training().is_idle() {
                    self.session.set_status(STATUS_SYSTEM_READY);
                }
            }
            Err(e) => {
                error!("failed to spawn provider thread: {}", e);
                self.stats.provider_failures += 1;
                self.session.set_status(STATUS_RETRYING);
                self.schedule_retry();
            }
        }
    }

    fn stop_provider(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }

    fn schedule_retry(&mut self) {
        let generation = self.generation;
        let timer = Timer::from_duration(self.config.retry_delay);
        let inserted = self.handle.insert_source(timer, move |_, _, state: &mut Self| {
            if state.generation == generation && state.session.is_alive() {
                info!("retrying landmark provider");
                state.start_provider();
            }
            TimeoutAction::Drop
        });
        if let Err(e) = inserted {
            error!("failed to schedule provider retry: {}", e.error);
        }
    }

    fn is_current(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.session.is_alive() {
            self.stats.stale_events += 1;
            debug!(generation, current = self.generation, "stale provider event dropped");
            return false;
        }
        true
    }

    /// Handle one event from the channel.
    pub fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Frame { generation, hands } => {
                if self.is_current(generation) {
                    self.stats.frames += 1;
                    self.session.on_hands(&hands);
                }
            }
            LoopEvent::ProviderFailed { generation, error } => {
                if self.is_current(generation) {
                    warn!("landmark provider failed: {}", error);
                    self.stats.provider_failures += 1;
                    self.stop_provider();
                    self.session.set_status(STATUS_RETRYING);
                    self.schedule_retry();
                }
            }
            LoopEvent::ProviderFinished { generation } => {
                if self.is_current(generation) {
                    info!(frames = self.stats.frames, "landmark stream finished");
                    self.provider_finished = true;
                }
            }
            LoopEvent::Command(line) => {
                self.stats.commands += 1;
                if let Some(response) = control::handle_command(&mut self.session, &line) {
                    (self.responder)(&response);
                }
                if self.session.take_switch_request() {
                    self.start_provider();
                }
            }
        }
    }

    fn on_tick(&mut self) {
        let now = Instant::now();
        let dt_ms = now.duration_since(self.last_tick).as_secs_f64() * 1000.0;
        self.last_tick = now;
        self.session.tick(dt_ms);
    }

    fn should_exit(&self) -> bool {
        self.config.exit_on_finish && self.provider_finished && self.session.training().is_idle()
    }

    /// Stop the provider and tear the session down.
    pub fn shutdown(&mut self) {
        self.stop_provider();
        self.session.teardown();
        self.running = false;
    }

    /// Generate s-expression for status queries.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:generation {} :frames {} :stale {} :provider-failures {} :commands {} :finished {})",
            self.generation,
            self.stats.frames,
            self.stats.stale_events,
            self.stats.provider_failures,
            self.stats.commands,
            if self.provider_finished { "t" } else { "nil" },
        )
    }
}

// ── Runtime ────────────────────────────────────────────────

pub struct Runtime<C, K> {
    event_loop: EventLoop<'static, RuntimeState<C, K>>,
    state: RuntimeState<C, K>,
}

impl<C, K> Runtime<C, K>
where
    C: GestureClassifier + 'static,
    K: KeyValueStore + 'static,
{
    pub fn new(
        config: RuntimeConfig,
        session: SignSession<C, K>,
        provider_factory: ProviderFactory,
        responder: Responder,
    ) -> anyhow::Result<Self> {
        let event_loop = EventLoop::<RuntimeState<C, K>>::try_new()?;
        let handle = event_loop.handle();

        let (sender, events) = channel::channel::<LoopEvent>();
        handle
            .insert_source(events, |event, _, state: &mut RuntimeState<C, K>| {
                if let channel::Event::Msg(event) = event {
                    state.on_event(event);
                }
            })
            .map_err(|e| anyhow::anyhow!("failed to register event channel: {}", e.error))?;

        let tick = config.tick_interval;
        handle
            .insert_source(
                Timer::from_duration(tick),
                move |_, _, state: &mut RuntimeState<C, K>| {
                    state.on_tick();
                    TimeoutAction::ToDuration(tick)
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to register tick timer: {}", e.error))?;

        let state = RuntimeState {
            session,
            stats: RuntimeStats::default(),
            running: true,
            config,
            handle,
            sender,
            provider_factory,
            responder,
            worker: None,
            generation: 0,
            provider_finished: false,
            last_tick: Instant::now(),
        };
        Ok(Self { event_loop, state })
    }

    /// Sender for injecting events (stdin commands, tests).
    pub fn sender(&self) -> Sender<LoopEvent> {
        self.state.sender.clone()
    }

    pub fn state(&self) -> &RuntimeState<C, K> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RuntimeState<C, K> {
        &mut self.state
    }

    /// Restore persisted examples and start the first provider run.
    pub fn start(&mut self) {
        self.state.session.restore_brain();
        self.state.last_tick = Instant::now();
        self.state.start_provider();
    }

    /// Dispatch events until `done` holds or `timeout` elapses.  Returns
    /// whether `done` was reached.
    pub fn run_until(
        &mut self,
        timeout: Duration,
        mut done: impl FnMut(&RuntimeState<C, K>) -> bool,
    ) -> anyhow::Result<bool> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if done(&self.state) {
                return Ok(true);
            }
            self.event_loop
                .dispatch(Some(Duration::from_millis(5)), &mut self.state)?;
        }
        Ok(done(&self.state))
    }

    /// Run until a signal, the exit timer or the end of the stream.
    pub fn run(mut self) -> anyhow::Result<()> {
        install_signal_handlers();
        self.start();

        let start_time = Instant::now();
        let mut last_status_log = Instant::now();
        let status_interval = Duration::from_secs(60);
        let poll_interval = self.state.config.poll_interval;
        info!(
            "runtime initialized {}, entering event loop",
            self.state.config.config_sexp()
        );

        while self.state.running {
            if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
                info!("shutdown signal received, exiting");
                break;
            }
            if let Some(dur) = self.state.config.exit_after {
                if start_time.elapsed() >= dur {
                    info!("exit timer fired after {}s", dur.as_secs_f64());
                    break;
                }
            }
            if self.state.should_exit() {
                info!("landmark stream done, exiting");
                break;
            }
            if last_status_log.elapsed() >= status_interval {
                info!("runtime status: {}", self.state.status_sexp());
                last_status_log = Instant::now();
            }

            self.event_loop.dispatch(Some(poll_interval), &mut self.state)?;
        }

        self.state.shutdown();
        info!(
            sentence = %self.state.session.sentence().text(),
            "runtime shutting down {}",
            self.state.status_sexp()
        );
        Ok(())
    }
}

// ── Process plumbing ───────────────────────────────────────

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Forward stdin lines to the loop as control commands.  The thread ends at
/// EOF or once the loop has gone away.
pub fn spawn_stdin_reader(sender: Sender<LoopEvent>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin read failed: {}", e);
                        break;
                    }
                };
                if sender.send(LoopEvent::Command(line)).is_err() {
                    break;
                }
            }
            debug!("stdin closed");
        })
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::Cursor;
    use std::rc::Rc;

    use super::*;
    use crate::classifier::KnnClassifier;
    use crate::gesture::{encode, Landmark};
    use crate::provider::{ReplayProvider, ScriptedProvider};
    use crate::session::{SessionConfig, STATUS_SWITCHING};
    use crate::speech::testing::recording_handle;
    use crate::storage::MemoryStore;

    fn open_hand() -> HandLandmarks {
        let wrist = Landmark::new(0.4, 0.6, 0.0);
        let mut points = [wrist; 21];
        for (i, p) in points.iter_mut().enumerate().skip(1) {
            *p = Landmark::new(wrist.x + i as f32 * 0.01, wrist.y - i as f32 * 0.02, 0.0);
        }
        HandLandmarks::new(points)
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            frame_interval: Duration::from_millis(1),
            tick_interval: Duration::from_millis(5),
            retry_delay: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            exit_after: None,
            exit_on_finish: true,
        }
    }

    fn trained_session() -> SignSession<KnnClassifier, MemoryStore> {
        let (speech, _) = recording_handle(0);
        let mut session = SignSession::new(
            SessionConfig::default(),
            KnnClassifier::default(),
            MemoryStore::new(),
            speech,
        );
        session
            .classifier_mut()
            .add_example(encode(&[open_hand()]), "HELLO");
        session
    }

    fn scripted_factory(frames: usize) -> ProviderFactory {
        Box::new(move || {
            let hands = vec![vec![open_hand()]; frames];
            Ok(Box::new(ScriptedProvider::new(hands)) as Box<dyn LandmarkProvider>)
        })
    }

    fn capture_responses() -> (Responder, Rc<RefCell<Vec<String>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (
            Box::new(move |line: &str| sink.borrow_mut().push(line.to_string())),
            log,
        )
    }

    #[test]
    fn test_frames_reach_session() {
        let (responder, _) = capture_responses();
        let mut rt = Runtime::new(
            test_config(),
            trained_session(),
            scripted_factory(20),
            responder,
        )
        .unwrap();
        rt.start();
        let done = rt
            .run_until(Duration::from_secs(5), |s| s.provider_finished())
            .unwrap();
        assert!(done);
        assert_eq!(rt.state().stats.frames, 20);
        assert_eq!(rt.state().session.sentence().words(), &["HELLO".to_string()]);
    }

    #[test]
    fn test_factory_failure_retries() {
        let (responder, _) = capture_responses();
        let mut attempts = 0;
        let factory: ProviderFactory = Box::new(move || {
            attempts += 1;
            if attempts == 1 {
                return Err(ProviderError::Unavailable("camera busy".into()));
            }
            Ok(Box::new(ScriptedProvider::new(vec![vec![]; 3])) as Box<dyn LandmarkProvider>)
        });
        let mut rt = Runtime::new(test_config(), trained_session(), factory, responder).unwrap();
        rt.start();
        assert_eq!(rt.state().session.status(), STATUS_RETRYING);
        assert_eq!(rt.state().stats.provider_failures, 1);

        let done = rt
            .run_until(Duration::from_secs(5), |s| s.provider_finished())
            .unwrap();
        assert!(done);
        // the retry is a fresh run
        assert_eq!(rt.state().generation(), 2);
        assert_eq!(rt.state().stats.frames, 3);
        assert_eq!(rt.state().session.status(), STATUS_SYSTEM_READY);
    }

    #[test]
    fn test_stale_generation_dropped() {
        let (responder, _) = capture_responses();
        let mut rt = Runtime::new(
            test_config(),
            trained_session(),
            scripted_factory(0),
            responder,
        )
        .unwrap();
        rt.start();
        let state = rt.state_mut();
        state.on_event(LoopEvent::Frame {
            generation: 99,
            hands: vec![open_hand()],
        });
        state.on_event(LoopEvent::ProviderFailed {
            generation: 99,
            error: "old".into(),
        });
        assert_eq!(state.stats.stale_events, 2);
        assert_eq!(state.stats.frames, 0);
    }

    #[test]
    fn test_frames_after_shutdown_ignored() {
        let (responder, _) = capture_responses();
        let mut rt = Runtime::new(
            test_config(),
            trained_session(),
            scripted_factory(0),
            responder,
        )
        .unwrap();
        rt.start();
        let state = rt.state_mut();
        let generation = state.generation();
        state.shutdown();
        for _ in 0..20 {
            state.on_event(LoopEvent::Frame {
                generation,
                hands: vec![open_hand()],
            });
        }
        assert!(state.session.sentence().is_empty());
        assert_eq!(state.stats.stale_events, 20);
    }

    #[test]
    fn test_commands_through_channel() {
        let (responder, log) = capture_responses();
        let mut rt = Runtime::new(
            test_config(),
            trained_session(),
            scripted_factory(0),
            responder,
        )
        .unwrap();
        rt.start();
        let sender = rt.sender();
        sender
            .send(LoopEvent::Command("(:type :teach :id 1 :label \"yes\")".into()))
            .unwrap();
        sender
            .send(LoopEvent::Command("(:type :library :id 2)".into()))
            .unwrap();
        let done = rt
            .run_until(Duration::from_secs(5), |_| log.borrow().len() == 2)
            .unwrap();
        assert!(done);
        assert!(log.borrow()[0].contains(":status :ok"));
        assert!(log.borrow()[1].contains(":id 2"));
        assert_eq!(rt.state().session.training().active_label(), Some("YES"));
    }

    #[test]
    fn test_switch_source_restarts_provider() {
        let (responder, log) = capture_responses();
        let mut rt = Runtime::new(
            test_config(),
            trained_session(),
            scripted_factory(0),
            responder,
        )
        .unwrap();
        rt.start();
        assert_eq!(rt.state().generation(), 1);
        rt.state_mut()
            .on_event(LoopEvent::Command("(:type :switch-source :id 4)".into()));
        assert_eq!(rt.state().generation(), 2);
        assert!(log.borrow()[0].contains(":status :ok"));
        assert_ne!(rt.state().session.status(), STATUS_SWITCHING);
    }

    #[test]
    fn test_ticks_advance_training() {
        let (responder, _) = capture_responses();
        let (speech, _) = recording_handle(0);
        let mut config = SessionConfig::default();
        config.training.prep_seconds = 0;
        config.training.capture_ms = 20.0;
        let session = SignSession::new(config, KnnClassifier::default(), MemoryStore::new(), speech);
        let mut rt = Runtime::new(test_config(), session, scripted_factory(0), responder).unwrap();
        rt.start();
        rt.state_mut().session.teach("eat").unwrap();
        assert!(rt.state().session.training().is_capturing());
        let done = rt
            .run_until(Duration::from_secs(5), |s| {
                s.session.training().is_idle() && s.provider_finished()
            })
            .unwrap();
        assert!(done);
        assert!(rt.state().should_exit());
    }

    fn recording_line() -> String {
        let points: Vec<String> = (0..21)
            .map(|i| format!("[{}, {}, 0.0]", 0.4 + i as f32 * 0.01, 0.6 - i as f32 * 0.02))
            .collect();
        format!("[[{}]]", points.join(","))
    }

    #[test]
    fn test_malformed_replay_line_skipped() {
        let (responder, _) = capture_responses();
        let mut text = String::new();
        for _ in 0..5 {
            text.push_str(&recording_line());
            text.push('\n');
        }
        text.push_str("[[[1, 2]]]\n");
        text.push_str(&recording_line());
        text.push('\n');

        let factory: ProviderFactory = Box::new(move || {
            let reader = Cursor::new(text.clone().into_bytes());
            Ok(Box::new(ReplayProvider::from_reader(reader)) as Box<dyn LandmarkProvider>)
        });
        let mut rt = Runtime::new(test_config(), trained_session(), factory, responder).unwrap();
        rt.start();
        let done = rt
            .run_until(Duration::from_secs(5), |s| s.should_exit())
            .unwrap();
        assert!(done);
        assert_eq!(rt.state().generation(), 1);
        assert_eq!(rt.state().stats.frames, 6);
        assert_eq!(rt.state().stats.provider_failures, 0);
    }

    #[test]
    fn test_restart_during_capture_keeps_training_status() {
        let (responder, _) = capture_responses();
        let (speech, _) = recording_handle(0);
        let mut config = SessionConfig::default();
        config.training.prep_seconds = 0;
        config.training.capture_ms = 60_000.0;
        let session = SignSession::new(config, KnnClassifier::default(), MemoryStore::new(), speech);
        let mut rt = Runtime::new(test_config(), session, scripted_factory(0), responder).unwrap();
        rt.start();
        assert_eq!(rt.state().session.status(), STATUS_SYSTEM_READY);

        rt.state_mut().session.teach("eat").unwrap();
        rt.state_mut().start_provider();
        assert_eq!(rt.state().generation(), 2);
        assert_eq!(rt.state().session.status(), "Learning 'EAT'...");
    }

    #[test]
    fn test_config_sexp() {
        let sexp = RuntimeConfig::default().config_sexp();
        assert!(sexp.contains(":frame-interval-ms 30"));
        assert!(sexp.contains(":retry-delay-ms 2000"));
    }
}
