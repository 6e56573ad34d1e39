pub use crate::error::{Result, ThreadlineError};
pub use crate::event_store::{DEFAULT_MAX_EVENTS, EventArena, TimelineLookup};
pub use crate::normalizer::{
    Message, MessageNormalizer, NormalizeMode, NormalizerConfig, Thread, ThreadCache,
    ThreadNormalizer,
};
pub use crate::pipeline::EventPipeline;
pub use crate::streaming::{MessageUpdate, RoomSubscription, UpdateTrigger};
pub use crate::types::{Membership, RawEvent, RoomDump, RoomMember, RoomMetadata};

use once_cell::sync::OnceCell;
use tokio::sync::mpsc::{self, Sender};
use tokio::task::JoinHandle;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

mod error;
pub mod event_store;
pub mod normalizer;
pub mod pipeline;
pub mod streaming;
pub mod types;

use crate::normalizer::HomeserverMediaResolver;

static TRACING_GUARDS: OnceCell<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceCell::new();
static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Stream the console half of the log output is written to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleOutput {
    #[default]
    Stdout,
    /// Keeps stdout free for program output
    Stderr,
}

/// Installs the global tracing subscriber: stdout plus a daily rolling file
/// in `logs_dir`. Only the first call has any effect.
pub fn init_tracing(logs_dir: &Path) -> Result<()> {
    init_tracing_with_console(logs_dir, ConsoleOutput::Stdout)
}

/// Like [`init_tracing`], writing console logs to the chosen stream.
pub fn init_tracing_with_console(logs_dir: &Path, console: ConsoleOutput) -> Result<()> {
    TRACING_INIT
        .get_or_try_init(|| {
            let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix("threadline")
                .filename_suffix("log")
                .build(logs_dir)
                .map_err(|e| ThreadlineError::LoggingSetup(e.to_string()))?;

            let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
            let (non_blocking_console, console_guard) = match console {
                ConsoleOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
                ConsoleOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
            };

            TRACING_GUARDS
                .set(Mutex::new(Some((file_guard, console_guard))))
                .ok();

            let console_layer = Layer::new()
                .with_writer(non_blocking_console)
                .with_ansi(true)
                .with_target(true);

            let file_layer = Layer::new()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true);

            Registry::default()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| ThreadlineError::LoggingSetup(e.to_string()))
        })
        .map(|_| ())
}

const DEFAULT_LOGS_DIR: &str = "./logs";
const DEFAULT_HOMESERVER_URL: &str = "https://matrix.org";
const DEFAULT_CHANNEL_CAPACITY: usize = 500;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadlineConfig {
    /// Directory for application logs
    pub logs_dir: PathBuf,

    /// User the timeline is normalized for
    pub own_user_id: String,

    /// Base URL that content URIs are resolved against
    pub homeserver_url: String,

    /// Capacity of the inbound event channel
    pub channel_capacity: usize,

    /// Upper bound on events kept per room
    pub max_cached_events: usize,

    pub normalizer: NormalizerConfig,
}

impl ThreadlineConfig {
    pub fn new(logs_dir: &Path, own_user_id: &str, homeserver_url: &str) -> Self {
        Self {
            logs_dir: logs_dir.to_path_buf(),
            own_user_id: own_user_id.to_string(),
            homeserver_url: homeserver_url.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_cached_events: DEFAULT_MAX_EVENTS,
            normalizer: NormalizerConfig::default(),
        }
    }

    /// Builds the configuration from `THREADLINE_*` environment variables,
    /// loading a `.env` file first when one exists.
    ///
    /// `THREADLINE_OWN_USER_ID` is required; everything else has a default.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let own_user_id = var("THREADLINE_OWN_USER_ID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ThreadlineError::Configuration("THREADLINE_OWN_USER_ID is not set".to_string())
            })?;

        let defaults = NormalizerConfig::default();
        let normalizer = NormalizerConfig {
            normalize_emoji: parse_var(&var, "THREADLINE_NORMALIZE_EMOJI", defaults.normalize_emoji)?,
            enable_debug_logging: parse_var(
                &var,
                "THREADLINE_DEBUG_LOGGING",
                defaults.enable_debug_logging,
            )?,
            parse_markup: parse_var(&var, "THREADLINE_PARSE_MARKUP", defaults.parse_markup)?,
            max_markup_depth: parse_var(
                &var,
                "THREADLINE_MAX_MARKUP_DEPTH",
                defaults.max_markup_depth,
            )?,
            max_participants: parse_var(
                &var,
                "THREADLINE_MAX_PARTICIPANTS",
                defaults.max_participants,
            )?,
        };

        Ok(Self {
            logs_dir: var("THREADLINE_LOGS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGS_DIR)),
            own_user_id,
            homeserver_url: var("THREADLINE_HOMESERVER_URL")
                .unwrap_or_else(|| DEFAULT_HOMESERVER_URL.to_string()),
            channel_capacity: parse_var(&var, "THREADLINE_CHANNEL_CAPACITY", DEFAULT_CHANNEL_CAPACITY)?,
            max_cached_events: parse_var(&var, "THREADLINE_MAX_CACHED_EVENTS", DEFAULT_MAX_EVENTS)?,
            normalizer,
        })
    }
}

fn parse_var<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ThreadlineError::Configuration(format!("invalid value for {key}: {raw:?}"))
        }),
        None => Ok(default),
    }
}

/// A running normalization service: an event pipeline fed through a channel.
pub struct Threadline {
    pub config: ThreadlineConfig,
    pipeline: Arc<EventPipeline>,
    event_sender: Sender<RawEvent>,
    shutdown_sender: Sender<()>,
    processing_task: JoinHandle<()>,
}

impl Threadline {
    /// Sets up logging and starts the event pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the logs directory cannot be created or logging
    /// cannot be set up.
    pub async fn initialize(config: ThreadlineConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.logs_dir).await?;
        init_tracing(&config.logs_dir)?;

        let resolver = Arc::new(HomeserverMediaResolver::new(config.homeserver_url.as_str()));
        let normalizer = MessageNormalizer::with_config(
            config.own_user_id.as_str(),
            resolver,
            config.normalizer.clone(),
        );
        let pipeline = Arc::new(EventPipeline::new(normalizer, config.max_cached_events));

        let (event_sender, event_receiver) = mpsc::channel(config.channel_capacity.max(1));
        let (shutdown_sender, shutdown_receiver) = mpsc::channel(1);
        let processing_task = Arc::clone(&pipeline).spawn(event_receiver, shutdown_receiver);

        tracing::info!(
            target: "threadline::initialize",
            "Threadline initialized for {}",
            config.own_user_id
        );

        Ok(Self {
            config,
            pipeline,
            event_sender,
            shutdown_sender,
            processing_task,
        })
    }

    /// Queue an event for processing.
    pub async fn send_event(&self, event: RawEvent) -> Result<()> {
        self.event_sender
            .send(event)
            .await
            .map_err(|_| ThreadlineError::ChannelClosed)
    }

    pub fn subscribe(&self, room_id: &str) -> RoomSubscription {
        self.pipeline.subscribe(room_id)
    }

    pub fn apply_room_metadata(&self, room: &RoomMetadata) {
        self.pipeline.apply_room_metadata(room);
    }

    pub fn thread(&self, room: &RoomMetadata) -> Thread {
        self.pipeline.thread(room)
    }

    /// Stop accepting events and wait for the queued ones to be processed.
    pub async fn shutdown(self) -> Result<()> {
        // Expected to fail if the processor already stopped
        let _ = self.shutdown_sender.send(()).await;
        self.processing_task
            .await
            .map_err(|e| ThreadlineError::Other(anyhow::Error::new(e)))
    }
}
