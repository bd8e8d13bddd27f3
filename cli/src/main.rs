//! tvbridge CLI - headless driver for the media backend bridge.
//!
//! This is the main binary entry point. See the `tvbridge` library for the
//! core functionality.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tvbridge::supervisor::locate;
use tvbridge::{env, BackendKind, BridgeConfig, BridgeError, ContentKind, Session};

// CLI
#[derive(Parser)]
#[command(name = "tvbridge")]
#[command(version)]
#[command(about = "Drive a media backend headlessly and report what it does")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a URL and print status updates until it ends or time runs out
    Play {
        /// Stream URL
        url: String,
        /// Backend to use (helper or player); defaults to the configured one
        #[arg(long)]
        backend: Option<BackendKind>,
        /// Treat the URL as a live channel for fallback purposes
        #[arg(long, conflicts_with = "vod")]
        live: bool,
        /// Treat the URL as an on-demand item for fallback purposes
        #[arg(long)]
        vod: bool,
        /// Stop after this many seconds (0 runs until end of stream or Ctrl-C)
        #[arg(long, default_value_t = 0)]
        seconds: u64,
        /// Initial volume in percent
        #[arg(long)]
        volume: Option<u8>,
    },
    /// Show where each backend binary would be found
    Probe {
        /// Only probe this backend
        #[arg(long)]
        backend: Option<BackendKind>,
    },
    /// Print the effective configuration
    Config {
        /// Print the config file path instead
        #[arg(long)]
        path: bool,
        /// Write the effective configuration to the config file
        #[arg(long, conflicts_with = "path")]
        save: bool,
    },
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    if let Some(path) = env::non_empty(env::LOG_FILE) {
        let path = PathBuf::from(path);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            url,
            backend,
            live,
            vod,
            seconds,
            volume,
        } => {
            let kind = match (live, vod) {
                (true, _) => ContentKind::Live,
                (_, true) => ContentKind::OnDemand,
                _ => ContentKind::infer(&url),
            };
            let limit = (seconds > 0).then(|| Duration::from_secs(seconds));
            play(&url, backend, kind, limit, volume).await?;
        }
        Commands::Probe { backend } => probe(backend)?,
        Commands::Config { path, save } => {
            if path {
                println!("{}", BridgeConfig::config_path()?.display());
            } else if save {
                let written = BridgeConfig::load()?.save()?;
                println!("wrote {}", written.display());
            } else {
                let config = BridgeConfig::load()?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

async fn play(
    url: &str,
    backend: Option<BackendKind>,
    kind: ContentKind,
    limit: Option<Duration>,
    volume: Option<u8>,
) -> Result<()> {
    let config = BridgeConfig::load()?;
    let backend = backend.unwrap_or(config.backend);
    let mut session = Session::with_backend(config, backend);

    let frames = Arc::new(AtomicU64::new(0));
    {
        let listeners = session.listeners_mut();
        listeners.status.add(|state| {
            println!(
                "status playing={} volume={} muted={} position={:.1}/{:.1}",
                state.playing, state.volume, state.muted, state.position, state.duration
            );
        });
        listeners.warning.add(|message| println!("warning {message}"));
        listeners.error.add(|fault| {
            println!("error {}", fault.message);
            for line in &fault.stderr_tail {
                println!("  | {line}");
            }
        });
        listeners
            .video_info
            .add(|info| println!("video {}x{} stride={}", info.width, info.height, info.stride));
        let counter = Arc::clone(&frames);
        listeners.frame.add(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
    }

    session
        .load_with(url, kind)
        .await
        .with_context(|| format!("Failed to play {url}"))?;
    println!("playing {}", session.current_url().unwrap_or(url));
    if let Some(volume) = volume {
        session.set_volume(volume).await?;
    }

    let deadline = limit.map(|d| tokio::time::Instant::now() + d);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            () = session.dispatch_next() => {}
            _ = &mut ctrl_c => {
                log::info!("Interrupted");
                break;
            }
            () = sleep_until(deadline), if deadline.is_some() => {
                log::info!("Time limit reached");
                break;
            }
        }
        if !session.phase().has_media() && !session.is_backend_alive() {
            break;
        }
        if session.phase() == tvbridge::PlaybackPhase::Stopped {
            break;
        }
    }

    if let Some(stats) = session.frame_stats() {
        println!(
            "frames received={} delivered={} dropped={} resync_bytes={} false_positives={}",
            stats.frames,
            frames.load(Ordering::Relaxed),
            session.frame_slot().dropped(),
            stats.discarded_bytes,
            stats.false_positives
        );
    }
    session.shutdown().await;
    Ok(())
}

async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn probe(only: Option<BackendKind>) -> Result<()> {
    let config = BridgeConfig::load()?;
    let kinds = only.map_or_else(|| vec![BackendKind::Helper, BackendKind::Player], |k| vec![k]);

    for kind in kinds {
        match locate::locate(kind, config.binary_override(kind)) {
            Ok(path) => println!("{kind}: {}", path.display()),
            Err(BridgeError::BackendNotFound { backend, searched }) => {
                println!("{kind}: {backend} not found; searched:");
                for path in searched {
                    println!("  {}", path.display());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
