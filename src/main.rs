use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use hwvideo_bridge::decoder::SyntheticBackend;
use hwvideo_bridge::player::{PlayerId, PlayerRegistry};
use hwvideo_bridge::utils::{self, Config};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// hwvideo-bridge - drive players on the synthetic decoder through a simulated render loop
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media source: a URL or a local file path
    #[arg(value_name = "SOURCE")]
    source: Option<String>,

    /// Number of players to create
    #[arg(short, long, default_value = "1")]
    players: u32,

    /// Seconds to run the render loop
    #[arg(long, default_value = "3")]
    seconds: u64,

    /// Simulated render rate in frames per second
    #[arg(long, default_value = "60")]
    render_fps: u32,

    /// Playback rate for every player
    #[arg(long, default_value = "1.0")]
    rate: f32,

    /// Configuration file (defaults to the system and user config files)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    write_config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before logging so the configured level applies
    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => utils::load_config().unwrap_or_default(),
    };

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else {
        config.general.log_level.as_str()
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    if let Some(path) = &args.write_config {
        config
            .save_to(path)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        info!("Configuration written to {}", path.display());
        return Ok(());
    }

    info!("Starting hwvideo-bridge v{}", env!("CARGO_PKG_VERSION"));

    let backend = Arc::new(SyntheticBackend::new(config.synthetic.clone()));
    let registry = PlayerRegistry::with_config(backend, &config);

    // A temporary file stands in for local media when no source is given
    let placeholder = tempfile_source()?;
    let source = args
        .source
        .clone()
        .unwrap_or_else(|| placeholder.path().display().to_string());

    let mut ids = Vec::new();
    for _ in 0..args.players.max(1) {
        let id = registry.create()?;
        let player = registry.player(id)?;

        let result = if source.contains("://") {
            player.set_source_remote(&source)
        } else {
            player.set_source_local(&source)
        };
        if let Err(e) = result {
            error!("Player {}: {}", id, e);
            continue;
        }

        player.set_playback_rate(args.rate)?;
        player.set_texture_size(config.synthetic.width, config.synthetic.height)?;
        player.play()?;
        ids.push(id);
    }

    if ids.is_empty() {
        registry.release_all();
        anyhow::bail!("No player could open {}", source);
    }

    run_render_loop(&registry, &ids, &args).await;

    for id in &ids {
        let player = registry.player(*id)?;
        info!("{}", player.info());
        info!("Stats: {}", player.info().to_json());
    }

    registry.release_all();
    info!("Shutdown complete");
    Ok(())
}

/// Poll every player once per simulated render step, like a game engine's frame tick
async fn run_render_loop(registry: &PlayerRegistry, ids: &[PlayerId], args: &Args) {
    let step = Duration::from_secs_f64(1.0 / args.render_fps.max(1) as f64);
    let mut ticker = tokio::time::interval(step);
    let deadline = tokio::time::Instant::now() + Duration::from_secs(args.seconds);

    let mut imported = 0u64;
    while tokio::time::Instant::now() < deadline {
        ticker.tick().await;

        for id in ids {
            let Ok(player) = registry.player(*id) else {
                continue;
            };

            if player.has_size_changed() {
                info!(
                    "Player {}: video size {}x{}",
                    id,
                    player.video_width(),
                    player.video_height()
                );
                player.clear_size_changed_flag();
            }

            if player.has_new_frame() {
                let handle = player.acquire_frame_handle();
                if handle.is_null() {
                    warn!("Player {}: frame not importable", id);
                } else {
                    // A real renderer imports `handle` as a texture here
                    imported += 1;
                    log::trace!("Player {}: import {}", id, handle);
                }
            }
        }
    }

    info!(
        "Imported {} frame(s) across {} player(s) in {}s",
        imported,
        ids.len(),
        args.seconds
    );
}

fn tempfile_source() -> Result<tempfile::NamedTempFile> {
    tempfile::Builder::new()
        .prefix("hwvb-demo")
        .suffix(".mp4")
        .tempfile()
        .context("Failed to create placeholder media file")
}
