//! # Cadence
//!
//! Queue-driven audio playback from the terminal. Searches with yt-dlp,
//! decodes with ffmpeg and paces PCM into a local sink.

mod commands;
mod prompt;
mod sink;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_core::Requester;
use cadence_extractor::YtDlp;
use cadence_ffmpeg::FfmpegPipeline;
use cadence_player::{
    Destination, DestinationId, Player, PlayerOptions, SessionKey, SourceResolver,
};
use prompt::Prompt;
use sink::LocalTransport;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Locate `config.json`: `CADENCE_CONFIG` first, then the platform config dir.
fn config_path() -> Option<PathBuf> {
    std::env::var_os("CADENCE_CONFIG")
        .map(PathBuf::from)
        .or_else(|| {
            directories::ProjectDirs::from("", "", "cadence")
                .map(|d| d.config_dir().join("config.json"))
        })
        .filter(|path| path.exists())
}

fn load_options() -> Result<PlayerOptions> {
    match config_path() {
        Some(path) => {
            info!("Loading config from {}", path.display());
            PlayerOptions::from_json_file(&path)
                .with_context(|| format!("Failed to load {}", path.display()))
        }
        None => Ok(PlayerOptions::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=debug,cadence_player=debug".into()),
        )
        .init();

    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));

    let options = load_options()?;
    let sample_rate = options.filter_params.sample_rate;

    let extractor = Arc::new(YtDlp::new());
    let resolver: Arc<dyn SourceResolver> = extractor.clone();
    let pipeline = FfmpegPipeline::new()
        .with_params(options.filter_params.clone())
        .with_resolver(resolver);
    let transport = LocalTransport::new(sample_rate)
        .with_output(std::env::var_os("CADENCE_SINK").map(PathBuf::from));

    let player = Player::new(extractor, Arc::new(transport), Arc::new(pipeline), options);

    let (membership, membership_rx) = mpsc::channel(16);
    let watcher = player.membership_watcher().spawn(membership_rx);
    let printer = tokio::spawn(prompt::print_events(player.subscribe()));

    let user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());
    let prompt = Prompt {
        player,
        destination: Destination::new(
            SessionKey::new("local"),
            DestinationId::new("local-output"),
            "Local output",
        ),
        requester: Requester::new(user.clone(), user),
        membership,
    };
    prompt.run().await?;

    drop(prompt);
    watcher.await?;
    printer.abort();

    info!("Cadence stopped");
    Ok(())
}
