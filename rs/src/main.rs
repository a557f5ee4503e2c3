//! Hotness operator binary
//!
//! Runs full-corpus sweeps, prints ranked listings, and hosts the real-time
//! coordinator fed by newline-delimited JSON engagement events on stdin.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use hotness::constants::{
    DEFAULT_BATCH_UPDATE_SIZE, DEFAULT_HOT_POSTS_LIMIT, DEFAULT_MAINTENANCE_INTERVAL_SECS,
    DEFAULT_TRIGGER_MAX_AGE_SECS, DEFAULT_UPDATE_DELAY_MS, DEFAULT_UPDATE_THRESHOLD,
};
use hotness::{
    validate_config, CoordinatorConfig, FileStorage, HotnessConfigPatch, HotnessService,
    HotnessUpdateService, PostId, Priority, UserId,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "hotness-server")]
#[command(about = "Forum post hotness ranking - sweeps, listings, and real-time updates")]
struct Args {
    /// Post storage directory
    #[arg(long, default_value = "./hotness-data")]
    data_dir: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

/// Overrides merged over the default scoring configuration
#[derive(clap::Args, Debug, Default, Clone)]
struct ScoringArgs {
    #[arg(long)]
    like_weight: Option<f64>,
    #[arg(long)]
    comment_weight: Option<f64>,
    #[arg(long)]
    view_weight: Option<f64>,
    #[arg(long)]
    gravity: Option<f64>,
    #[arg(long)]
    base_hours: Option<f64>,
}

impl ScoringArgs {
    fn patch(&self) -> HotnessConfigPatch {
        HotnessConfigPatch {
            like_weight: self.like_weight,
            comment_weight: self.comment_weight,
            view_weight: self.view_weight,
            gravity: self.gravity,
            base_hours: self.base_hours,
        }
    }

    /// Validated patch, or `None` when no override was given
    fn checked_patch(&self) -> anyhow::Result<Option<HotnessConfigPatch>> {
        let patch = self.patch();
        if patch.is_empty() {
            return Ok(None);
        }
        let validation = validate_config(&patch);
        if !validation.valid {
            return Err(anyhow!(
                "Invalid scoring configuration:\n  {}",
                validation.errors.join("\n  ")
            ));
        }
        Ok(Some(patch))
    }
}

#[derive(Subcommand)]
enum Command {
    /// Recompute hotness for every active post
    Recompute {
        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// List the hottest posts
    Hot {
        #[arg(long, default_value_t = DEFAULT_HOT_POSTS_LIMIT)]
        limit: usize,

        #[arg(long, default_value_t = 0.0)]
        min_score: f64,
    },

    /// List the hottest posts created within a time window
    Trending {
        #[arg(long, default_value_t = 24)]
        hours: u32,

        #[arg(long, default_value_t = DEFAULT_HOT_POSTS_LIMIT)]
        limit: usize,
    },

    /// Recompute one post and show how its score moved
    Trend {
        #[arg(long)]
        post: PostId,

        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Check a scoring configuration and report every violation
    Validate {
        #[command(flatten)]
        scoring: ScoringArgs,
    },

    /// Run the real-time coordinator until Ctrl-C
    Run {
        /// Seconds between full-corpus sweeps
        #[arg(long, default_value_t = 900)]
        sweep_interval_secs: u64,

        #[arg(long, default_value_t = DEFAULT_UPDATE_DELAY_MS)]
        update_delay_ms: u64,

        #[arg(long, default_value_t = DEFAULT_UPDATE_THRESHOLD)]
        update_threshold: usize,

        #[arg(long, default_value_t = DEFAULT_BATCH_UPDATE_SIZE)]
        batch_update_size: usize,

        /// Drop triggers instead of queueing them
        #[arg(long)]
        disable_realtime: bool,

        /// Pending triggers older than this are pruned
        #[arg(long, default_value_t = DEFAULT_TRIGGER_MAX_AGE_SECS)]
        trigger_max_age_secs: i64,

        #[arg(long, default_value_t = DEFAULT_MAINTENANCE_INTERVAL_SECS)]
        maintenance_interval_secs: u64,

        #[command(flatten)]
        scoring: ScoringArgs,
    },
}

/// One line of the stdin event stream
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum EngagementEvent {
    Like {
        post_id: PostId,
        user_id: UserId,
        #[serde(default = "default_liked")]
        liked: bool,
    },
    Comment {
        post_id: PostId,
        user_id: UserId,
        comment_id: Uuid,
    },
    View {
        post_id: PostId,
        #[serde(default)]
        user_id: Option<UserId>,
    },
}

fn default_liked() -> bool {
    true
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("hotness={0},hotness_server={0}", log_level))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Hotness version: {}", hotness::VERSION);
    tracing::info!("Data directory: {}", args.data_dir.display());

    if let Command::Validate { scoring } = &args.command {
        return validate(scoring);
    }

    let storage = FileStorage::new(&args.data_dir)
        .await
        .with_context(|| format!("Failed to open {}", args.data_dir.display()))?;
    let service = HotnessService::new(Arc::new(storage));

    match args.command {
        Command::Recompute { scoring } => {
            let patch = scoring.checked_patch()?;
            let report = service.update_all_active_posts_hotness(patch.as_ref()).await?;
            println!("Updated {} posts", report.results.len());
            for failure in &report.failed {
                println!("  failed {}: {}", failure.post_id, failure.reason);
            }
        }
        Command::Hot { limit, min_score } => {
            let posts = service.get_hot_posts(limit, min_score).await?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
        }
        Command::Trending { hours, limit } => {
            let posts = service.get_hot_posts_by_time_range(hours, limit).await?;
            println!("{}", serde_json::to_string_pretty(&posts)?);
        }
        Command::Trend { post, scoring } => {
            let patch = scoring.checked_patch()?;
            let trend = service.calculate_hotness_trend(post, patch.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&trend)?);
        }
        Command::Run {
            sweep_interval_secs,
            update_delay_ms,
            update_threshold,
            batch_update_size,
            disable_realtime,
            trigger_max_age_secs,
            maintenance_interval_secs,
            scoring,
        } => {
            let config = CoordinatorConfig {
                real_time_enabled: !disable_realtime,
                update_threshold,
                batch_update_size,
                update_delay_ms,
                priority_threshold: Priority::High,
            };
            let options = RunOptions {
                sweep_interval: Duration::from_secs(sweep_interval_secs),
                maintenance_interval: Duration::from_secs(maintenance_interval_secs),
                trigger_max_age: trigger_max_age(trigger_max_age_secs)?,
                patch: scoring.checked_patch()?,
            };
            run(service, config, options).await?;
        }
        Command::Validate { .. } => unreachable!("handled before storage is opened"),
    }

    Ok(())
}

fn validate(scoring: &ScoringArgs) -> anyhow::Result<()> {
    let validation = validate_config(&scoring.patch());
    if validation.valid {
        println!("✓ Configuration is valid");
        return Ok(());
    }

    for error in &validation.errors {
        println!("✗ {}", error);
    }
    Err(anyhow!("{} invalid field(s)", validation.errors.len()))
}

fn trigger_max_age(secs: i64) -> anyhow::Result<chrono::Duration> {
    if secs <= 0 {
        return Err(anyhow!("--trigger-max-age-secs must be positive (got {})", secs));
    }
    chrono::Duration::try_seconds(secs)
        .ok_or_else(|| anyhow!("--trigger-max-age-secs is out of range (got {})", secs))
}

struct RunOptions {
    sweep_interval: Duration,
    maintenance_interval: Duration,
    trigger_max_age: chrono::Duration,
    patch: Option<HotnessConfigPatch>,
}

async fn run(
    service: HotnessService,
    config: CoordinatorConfig,
    options: RunOptions,
) -> anyhow::Result<()> {
    let coordinator = HotnessUpdateService::new(service.clone(), config);
    let maintenance =
        coordinator.spawn_maintenance(options.maintenance_interval, options.trigger_max_age);

    let mut sweep = tokio::time::interval(options.sweep_interval);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    tracing::info!("Coordinator running; reading engagement events from stdin");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown requested");
                break;
            }
            _ = sweep.tick() => {
                if let Err(e) = service.update_all_active_posts_hotness(options.patch.as_ref()).await {
                    tracing::error!("Scheduled sweep failed: {}", e);
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => handle_event_line(&coordinator, &line).await,
                Ok(None) => {
                    tracing::info!("Event stream closed; continuing with scheduled sweeps");
                    stdin_open = false;
                }
                Err(e) => {
                    tracing::warn!("Failed to read event stream: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    maintenance.abort();
    coordinator.shutdown().await;
    Ok(())
}

async fn handle_event_line(coordinator: &HotnessUpdateService, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let event: EngagementEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("Ignoring malformed event {:?}: {}", line, e);
            return;
        }
    };

    let outcome = match event {
        EngagementEvent::Like {
            post_id,
            user_id,
            liked,
        } => coordinator.on_post_like(post_id, user_id, liked).await,
        EngagementEvent::Comment {
            post_id,
            user_id,
            comment_id,
        } => coordinator.on_post_comment(post_id, user_id, comment_id).await,
        EngagementEvent::View { post_id, user_id } => {
            coordinator.on_post_view(post_id, user_id).await
        }
    };
    tracing::debug!(immediate = outcome.immediate, "{}", outcome.message);
}
