//! repopulse - live repository activity dashboard
//!
//! This tool provides commands for:
//! - Watching a live event feed and printing dashboard snapshots
//! - Replaying a captured feed payload through the same pipeline
//! - Showing the effective configuration
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/repopulse/repopulse.log (~/.local/state/repopulse/repopulse.log)
//! - Config: $XDG_CONFIG_HOME/repopulse/config.toml (~/.config/repopulse/config.toml)

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repopulse_core::config::FeedMode;
use repopulse_core::feed::parse_batch;
use repopulse_core::runtime::run_feed;
use repopulse_core::{spawn_pipeline, Config, Dashboard, DashboardSnapshot, FeedError};
use tokio::sync::watch;

use crate::render::render_snapshot;

#[derive(Parser)]
#[command(name = "repopulse")]
#[command(about = "Live repository activity dashboard")]
#[command(version)]
struct Args {
    /// Verbose output (writes a log file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: $XDG_CONFIG_HOME/repopulse/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Settings shared by the commands that aggregate.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Time budget for draining one burst, in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Number of ranked categories to show
    #[arg(long)]
    limit: Option<usize>,

    /// Message key holding the category name
    #[arg(long)]
    category_key: Option<String>,

    /// Print snapshots as JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the feed and print snapshots as data arrives
    Watch {
        /// Feed endpoint (overrides config)
        #[arg(long)]
        url: Option<String>,

        /// Feed mode: socket, poll, or stream (overrides config)
        #[arg(long)]
        mode: Option<FeedMode>,

        /// How often to print a snapshot, in milliseconds
        #[arg(long, default_value = "2000")]
        refresh_ms: u64,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Feed a JSON payload file through the dashboard
    Replay {
        /// File holding a JSON array of feed messages
        file: PathBuf,

        /// Skip smoothing and route every message immediately
        #[arg(long)]
        instant: bool,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show the effective configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    let config = match &args.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };

    // Keep the guard alive for the whole run so buffered lines are flushed
    let _log_guard = if args.verbose {
        Some(
            repopulse_core::logging::init(&config.logging)
                .context("failed to initialize logging")?,
        )
    } else {
        None
    };

    match args.command {
        Command::Status => cmd_status(&config, args.config.as_deref()),
        Command::Replay {
            file,
            instant,
            overrides,
        } => cmd_replay(config, &file, instant, &overrides).await,
        Command::Watch {
            url,
            mode,
            refresh_ms,
            overrides,
        } => cmd_watch(config, url, mode, refresh_ms, &overrides).await,
    }
}

/// Apply command-line overrides and re-validate.
fn apply_overrides(mut config: Config, overrides: &Overrides) -> Result<Config> {
    if let Some(window_ms) = overrides.window_ms {
        config.smoother.window_ms = window_ms;
    }
    if let Some(limit) = overrides.limit {
        config.ranking.display_limit = limit;
    }
    if let Some(key) = &overrides.category_key {
        config.feed.category_key = key.clone();
    }
    config.validate().context("invalid settings")?;
    Ok(config)
}

fn print_snapshot(snapshot: &DashboardSnapshot, json: bool) -> Result<()> {
    if json {
        let text =
            serde_json::to_string_pretty(snapshot).context("failed to serialize snapshot")?;
        println!("{}", text);
    } else {
        print!("{}", render_snapshot(snapshot));
    }
    Ok(())
}

fn report_feed_error(error: &FeedError) {
    eprintln!("feed error: {}", error);
}

fn cmd_status(config: &Config, config_override: Option<&std::path::Path>) -> Result<()> {
    println!("repopulse Configuration");
    println!("=======================");
    println!();

    let config_path = config_override
        .map(|p| p.to_path_buf())
        .unwrap_or_else(Config::config_path);
    println!(
        "Config File:     {}{}",
        config_path.display(),
        if config_path.exists() {
            ""
        } else {
            " (not found, using defaults)"
        }
    );
    println!("Log File:        {}", Config::log_path().display());
    println!();

    let feed = &config.feed;
    println!("Feed URL:        {}", feed.url.as_deref().unwrap_or("<not set>"));
    println!("Feed Mode:       {}", feed.mode.as_str());
    println!("Category Key:    {}", feed.category_key);
    println!("Poll Interval:   {}ms", feed.poll_interval_ms);
    println!("Timeout:         {}s", feed.timeout_secs);
    println!("Max Retries:     {}", feed.max_retries);
    println!();
    println!("Smoothing:       {}ms window", config.smoother.window_ms);
    println!("Display Limit:   {}", config.ranking.display_limit);
    println!(
        "Activity:        {} points, {}ms retention",
        config.activity.points_to_show, config.activity.retention_ms
    );
    println!("Recent Items:    {}", config.recent.capacity);

    println!();
    if feed.url.is_some() {
        println!("Status: Ready to watch");
    } else {
        println!("Status: No feed URL (set [feed] url or pass --url to watch)");
    }

    Ok(())
}

async fn cmd_replay(
    config: Config,
    file: &std::path::Path,
    instant: bool,
    overrides: &Overrides,
) -> Result<()> {
    let config = apply_overrides(config, overrides)?;

    let payload = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let batch = parse_batch(&payload, &config.feed.category_key)
        .with_context(|| format!("failed to parse {}", file.display()))?;

    tracing::info!(
        file = %file.display(),
        messages = batch.len(),
        instant,
        "Replaying feed payload"
    );

    if instant {
        let mut dashboard = Dashboard::new(&config);
        for message in batch {
            dashboard.route(message);
        }
        return print_snapshot(&dashboard.snapshot(), overrides.json);
    }

    let pipeline = spawn_pipeline(&config);
    pipeline
        .ingest(batch)
        .context("failed to queue replayed messages")?;

    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let interrupted = loop {
        tokio::select! {
            _ = ticker.tick() => {
                if pipeline.pending() == 0 {
                    break false;
                }
            }
            _ = tokio::signal::ctrl_c() => break true,
        }
    };

    let snapshot = pipeline.snapshot();
    let stats = pipeline.shutdown().await.context("failed to stop pipeline")?;
    if interrupted {
        eprintln!("Interrupted, {} messages discarded", stats.discarded);
    }

    print_snapshot(&snapshot, overrides.json)
}

async fn cmd_watch(
    config: Config,
    url: Option<String>,
    mode: Option<FeedMode>,
    refresh_ms: u64,
    overrides: &Overrides,
) -> Result<()> {
    let mut config = config;
    if let Some(url) = url {
        config.feed.url = Some(url);
    }
    if let Some(mode) = mode {
        config.feed.mode = mode;
    }
    let config = apply_overrides(config, overrides)?;
    config
        .feed
        .require_url()
        .context("no feed URL configured")?;

    println!(
        "Watching {} ({}), press Ctrl+C to stop",
        config.feed.url.as_deref().unwrap_or_default(),
        config.feed.mode.as_str()
    );

    let pipeline = spawn_pipeline(&config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut ticker = tokio::time::interval(Duration::from_millis(refresh_ms.max(100)));
    ticker.tick().await;

    let mut interrupted = false;
    let feed_result = {
        let feed = run_feed(&config.feed, &pipeline, report_feed_error, shutdown_rx);
        tokio::pin!(feed);

        loop {
            tokio::select! {
                result = &mut feed => break result,
                _ = ticker.tick() => {
                    print_snapshot(&pipeline.snapshot(), overrides.json)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\nStopping...");
                    interrupted = true;
                    let _ = shutdown_tx.send(true);
                }
            }
        }
    };

    let feed_stats = feed_result.context("feed failed")?;

    // A single fetch hands the whole batch to the smoother; show it drain
    if config.feed.mode == FeedMode::Stream && !interrupted {
        while pipeline.pending() > 0 {
            tokio::select! {
                _ = ticker.tick() => {
                    print_snapshot(&pipeline.snapshot(), overrides.json)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\nStopping...");
                    break;
                }
            }
        }
        print_snapshot(&pipeline.snapshot(), overrides.json)?;
    }
    let smoother_stats = pipeline.shutdown().await.context("failed to stop pipeline")?;

    tracing::info!(
        batches = feed_stats.batches,
        messages = feed_stats.messages,
        errors = feed_stats.errors,
        emitted = smoother_stats.emitted,
        discarded = smoother_stats.discarded,
        "Watch finished"
    );

    println!(
        "Received {} messages in {} batches ({} errors), shown {}, discarded {}",
        feed_stats.messages,
        feed_stats.batches,
        feed_stats.errors,
        smoother_stats.emitted,
        smoother_stats.discarded
    );

    Ok(())
}
