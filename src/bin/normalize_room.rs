use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use threadline::normalizer::HomeserverMediaResolver;
use threadline::{
    ConsoleOutput, EventArena, MessageNormalizer, RoomDump, ThreadNormalizer, ThreadlineConfig,
};

/// Normalize a room dump into a thread and print it as JSON
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Room dump: `{ "room": ..., "events": [...] }`
    #[clap(long, value_name = "PATH", required = true)]
    input: PathBuf,

    /// User the thread is rendered for; defaults to THREADLINE_OWN_USER_ID
    #[clap(long, value_name = "USER_ID")]
    own_user_id: Option<String>,

    /// Homeserver base URL used to resolve media
    #[clap(long, value_name = "URL")]
    homeserver: Option<String>,

    /// Directory for application logs
    #[clap(long, value_name = "PATH")]
    logs_dir: Option<PathBuf>,

    /// Print compact JSON instead of pretty JSON
    #[clap(long)]
    compact: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.own_user_id {
        Some(own_user_id) => {
            let mut config = ThreadlineConfig::from_env().unwrap_or_else(|_| {
                ThreadlineConfig::new(&PathBuf::from("./logs"), own_user_id, "https://matrix.org")
            });
            config.own_user_id = own_user_id.clone();
            config
        }
        None => ThreadlineConfig::from_env().context("Failed to load configuration")?,
    };
    let logs_dir = args.logs_dir.clone().unwrap_or(config.logs_dir.clone());
    let homeserver = args
        .homeserver
        .clone()
        .unwrap_or(config.homeserver_url.clone());

    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create logs dir {}", logs_dir.display()))?;
    // stdout carries the thread JSON
    threadline::init_tracing_with_console(&logs_dir, ConsoleOutput::Stderr)?;

    let dump = RoomDump::from_path(&args.input)
        .with_context(|| format!("Failed to read room dump {}", args.input.display()))?;
    tracing::info!(
        target: "threadline::normalize_room",
        "Loaded {} events for room {}",
        dump.events.len(),
        dump.room.room_id
    );

    let mut arena = EventArena::with_capacity_limit(config.max_cached_events.max(dump.events.len()));
    arena.apply_room_members(&dump.room);
    for event in dump.events {
        arena.insert(event);
    }

    let normalizer = MessageNormalizer::with_config(
        config.own_user_id.as_str(),
        Arc::new(HomeserverMediaResolver::new(homeserver)),
        config.normalizer.clone(),
    );
    let thread = ThreadNormalizer::new(normalizer).normalize(&dump.room, arena.timeline(), &arena);

    let output = if args.compact {
        serde_json::to_string(&thread)?
    } else {
        serde_json::to_string_pretty(&thread)?
    };
    println!("{output}");

    Ok(())
}
