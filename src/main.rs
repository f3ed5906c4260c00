use anyhow::{Context, Result};
use clap::Parser;
use clipbot::extract::YtDlp;
use clipbot::transport::{ChatTransport, TelegramClient};
use clipbot::upload::GofileUploader;
use clipbot::{Bot, Config, ExtractionWorker, RunSupervisor, SessionLanes, WorkerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Pause before polling again after a failed poll.
const POLL_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "clipbot")]
#[command(version, about = "Chat bot that cuts short clips out of online videos")]
#[command(long_about = "Send the bot a YouTube link, pick a clip length, quality and count, \
and it replies with the clips. Large files are uploaded to GoFile.")]
struct Cli {
    /// Working directory for downloads (overrides TMP_DIR)
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// yt-dlp executable to use
    #[arg(long, default_value = "yt-dlp")]
    yt_dlp: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    // Load and validate configuration
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(dir) = cli.tmp_dir {
        config.tmp_dir = dir;
    }
    config.validate().context("Configuration validation failed")?;
    let token = config.bot_token.clone().unwrap_or_default();

    let extractor = Arc::new(YtDlp::with_program(cli.yt_dlp));
    let version = extractor
        .check()
        .await
        .context("yt-dlp is required")?;
    info!("Using yt-dlp {}", version);

    let telegram = Arc::new(TelegramClient::new(token));
    let username = telegram
        .get_me()
        .await
        .context("Failed to reach the Telegram API, check BOT_TOKEN")?;
    info!("Logged in as @{}", username);

    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let uploader = Arc::new(GofileUploader::new(config.gofile_api_key.clone()));
    let worker = ExtractionWorker::new(
        extractor.clone(),
        uploader,
        transport.clone(),
        WorkerSettings::new(config.tmp_dir.clone()),
    );
    let supervisor = Arc::new(RunSupervisor::new(worker));
    if let Err(e) = supervisor.sweep_stale().await {
        warn!("Startup sweep of {} failed: {}", config.tmp_dir.display(), e);
    }

    let bot = Arc::new(Bot::new(
        transport,
        extractor,
        supervisor.clone(),
        config.limits(),
        config.admin_id,
    ));

    info!(
        "Limits: {}s per clip, {} clips per request",
        config.limits().max_clip_seconds,
        config.limits().max_clips
    );
    info!("Working directory: {}", config.tmp_dir.display());

    let mut lanes = SessionLanes::new(bot);
    let mut offset = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down...");
                break;
            }
            polled = telegram.poll(offset, config.poll_timeout) => match polled {
                Ok((events, next)) => {
                    offset = next;
                    for event in events {
                        lanes.push(event);
                    }
                }
                Err(e) => {
                    warn!("Polling failed: {}", e);
                    tokio::time::sleep(POLL_BACKOFF).await;
                }
            }
        }
    }

    lanes.drain().await;
    let reports = supervisor.shutdown().await;
    info!("Stopped after finishing {} run(s)", reports.len());
    Ok(())
}
