//! signspeak - replay hand landmarks through the gesture pipeline.
//!
//! Control commands are read from stdin, one s-expression per line;
//! responses go to stdout.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use signspeak::classifier::KnnClassifier;
use signspeak::gesture::{CooldownPolicy, NothingPolicy};
use signspeak::provider::{LandmarkProvider, ReplayProvider};
use signspeak::runtime::{self, ProviderFactory, Runtime, RuntimeConfig};
use signspeak::session::{SessionConfig, SignSession};
use signspeak::speech::{CommandSpeech, SpeechConfig, SpeechHandle, DEFAULT_SPEECH_PROGRAM};
use signspeak::storage::FileStore;

#[derive(Parser, Debug)]
#[command(name = "signspeak", about = "Sign-language gesture to speech pipeline")]
struct Cli {
    /// JSON-lines landmark recording to replay
    #[arg(long)]
    replay: PathBuf,

    /// Store file for learned gestures
    #[arg(long, default_value = "signspeak-store.json")]
    store: PathBuf,

    /// espeak-compatible program used for speech
    #[arg(long, default_value = DEFAULT_SPEECH_PROGRAM)]
    speech_program: String,

    /// Countdown seconds before a gesture capture starts
    #[arg(long, default_value_t = 2)]
    prep_seconds: u32,

    /// Give SPEAK and DELETE separate cooldowns
    #[arg(long)]
    independent_cooldowns: bool,

    /// Keep the stability count when NOTHING is seen
    #[arg(long)]
    nothing_ignored: bool,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Exit once the recording has been fully replayed
    #[arg(long)]
    exit_on_finish: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signspeak=info".into()),
        )
        .init();

    info!("signspeak v{} starting", env!("CARGO_PKG_VERSION"));
    info!("replay: {}, store: {}", cli.replay.display(), cli.store.display());

    let mut session_config = SessionConfig::default();
    session_config.training.prep_seconds = cli.prep_seconds;
    if cli.independent_cooldowns {
        session_config.stabilizer.cooldown_policy = CooldownPolicy::Independent;
    }
    if cli.nothing_ignored {
        session_config.stabilizer.nothing_policy = NothingPolicy::Ignore;
    }

    let speech = SpeechHandle::new(
        SpeechConfig::default(),
        CommandSpeech::factory(cli.speech_program.clone()),
    );
    let session = SignSession::new(
        session_config,
        KnnClassifier::default(),
        FileStore::new(&cli.store),
        speech,
    );

    let replay = cli.replay.clone();
    let provider_factory: ProviderFactory = Box::new(move || {
        let provider = ReplayProvider::open(&replay)?;
        Ok(Box::new(provider) as Box<dyn LandmarkProvider>)
    });

    let config = RuntimeConfig {
        exit_after: cli.exit_after.map(Duration::from_secs),
        exit_on_finish: cli.exit_on_finish,
        ..RuntimeConfig::default()
    };
    let rt = Runtime::new(
        config,
        session,
        provider_factory,
        Box::new(|line: &str| println!("{}", line)),
    )?;
    runtime::spawn_stdin_reader(rt.sender())?;
    rt.run()
}
