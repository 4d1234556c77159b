//! Questline operator CLI.
//!
//! Manages challenges and members, and runs live or batch recomputation of
//! monthly challenge progress against the RocksDB progress store.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use questline_core::traits::{ChallengeCatalog, MemberRoster, ProgressStore};
use questline_core::types::{Challenge, Member, MonthKey, Track, UserId};
use questline_engine::{
    BatchProgress, BatchScope, LiveOutcome, RecomputationDriver, TrackResult, UserScope,
};
use questline_source::HttpAchievementProvider;
use questline_store::RocksStore;

use crate::config::AppConfig;

/// Seconds between batch progress log lines.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// Monthly achievement challenge progress and awards.
#[derive(Parser, Debug)]
#[command(name = "questline", version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the progress database.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format ("text" or "json").
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Recompute one member's progress for a month (default: current month).
    Live(LiveArgs),
    /// Recompute every past month for all members or one member.
    Batch(BatchArgs),
    /// Clear a member's processed marks so the next batch redoes them.
    Reset(UserArgs),
    /// Member management.
    Member {
        #[command(subcommand)]
        action: MemberAction,
    },
    /// Challenge management.
    Challenge {
        #[command(subcommand)]
        action: ChallengeAction,
    },
    /// Show a member's recorded progress and point total.
    Show(UserArgs),
}

#[derive(Args, Debug)]
struct LiveArgs {
    /// Member id.
    #[arg(long)]
    user: String,

    /// Challenge month as YYYY-MM.
    #[arg(long)]
    month: Option<MonthKey>,
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Restrict the run to one member id.
    #[arg(long)]
    user: Option<String>,

    /// Recompute pairs already marked processed.
    #[arg(long)]
    reprocess: bool,
}

#[derive(Args, Debug)]
struct UserArgs {
    /// Member id.
    #[arg(long)]
    user: String,
}

#[derive(Subcommand, Debug)]
enum MemberAction {
    /// Register a member.
    Add {
        /// Member id.
        #[arg(long)]
        id: String,
        /// Account name at the achievement data source.
        #[arg(long)]
        username: String,
    },
    /// List registered members.
    List,
}

#[derive(Subcommand, Debug)]
enum ChallengeAction {
    /// Define a month's challenge from a JSON file.
    Define {
        #[arg(long)]
        file: PathBuf,
    },
    /// Reveal a month's shadow track.
    Reveal {
        #[arg(long)]
        month: MonthKey,
    },
    /// Print a month's challenge as JSON.
    Show {
        #[arg(long)]
        month: MonthKey,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    fn resolve_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log_format = format.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.resolve_config()?;
    init_logging(&config.log_level, &config.log_format);

    info!(version = env!("CARGO_PKG_VERSION"), data_dir = ?config.data_dir, "questline starting");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data dir {}", config.data_dir.display()))?;
    let store = Arc::new(RocksStore::open(config.db_path()).context("failed to open progress store")?);

    match cli.command {
        Commands::Live(args) => run_live(&config, store, args).await,
        Commands::Batch(args) => run_batch(&config, store, args).await,
        Commands::Reset(args) => {
            let cleared = store.reset_processed(&UserId::new(args.user.clone()))?;
            println!("cleared {cleared} processed month(s) for {}", args.user);
            Ok(())
        }
        Commands::Member { action } => run_member(&store, action),
        Commands::Challenge { action } => run_challenge(&store, action),
        Commands::Show(args) => show_progress(&store, &UserId::new(args.user)),
    }
}

fn build_driver(config: &AppConfig, store: Arc<RocksStore>) -> Result<RecomputationDriver> {
    let provider = HttpAchievementProvider::new(config.source.clone())
        .context("failed to build data source client")?;
    if config.source.api_key.is_empty() {
        warn!("no data source API key configured");
    }
    Ok(RecomputationDriver::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(provider),
        config.engine.clone(),
    ))
}

async fn run_live(config: &AppConfig, store: Arc<RocksStore>, args: LiveArgs) -> Result<()> {
    let month = match args.month {
        Some(month) => month,
        None => MonthKey::containing(Utc::now())?,
    };
    let driver = build_driver(config, store)?;
    let outcome = driver.recompute_live(&UserId::new(args.user), month).await?;
    print_live(&outcome);
    Ok(())
}

fn print_live(outcome: &LiveOutcome) {
    if !outcome.challenge_defined {
        println!("no challenge defined for {}", outcome.month);
        return;
    }
    println!("{} {}", outcome.user, outcome.month);
    let line = |label: &str, result: Option<TrackResult>| match result {
        Some(r) if r.hidden => println!("  {label:<7} (hidden)"),
        Some(r) => println!("  {label:<7} {:<13} {} pt", r.merge.stored, r.merge.points),
        None => println!("  {label:<7} -"),
    };
    line("main", outcome.main);
    line("shadow", outcome.shadow);
    println!("  total   {} pt", outcome.visible_points());
}

async fn run_batch(config: &AppConfig, store: Arc<RocksStore>, args: BatchArgs) -> Result<()> {
    let driver = build_driver(config, store)?;
    let scope = BatchScope {
        users: args.user.map_or(UserScope::All, |u| UserScope::One(UserId::new(u))),
        reprocess: args.reprocess,
    };
    let current_month = MonthKey::containing(Utc::now())?;

    // Ctrl+C stops the run between pairs.
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_clone = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("received Ctrl+C, stopping after the current pair...");
            cancel_clone.store(true, Ordering::Relaxed);
        }
    });

    let (tx, rx) = watch::channel(BatchProgress::default());
    let logger = tokio::spawn(progress_logger(rx));

    let summary = driver.run_batch(&scope, current_month, &cancel, &tx).await;
    drop(tx);
    logger.await.ok();
    let summary = summary?;

    let p = summary.progress;
    println!(
        "processed {} | updated {} | errored {} | skipped {} | total {}{}",
        p.processed,
        p.updated,
        p.errored,
        p.skipped,
        p.total,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

/// Log batch progress periodically until the sender is dropped.
async fn progress_logger(mut rx: watch::Receiver<BatchProgress>) {
    let mut ticker = tokio::time::interval(PROGRESS_LOG_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let p = *rx.borrow();
                info!(
                    processed = p.processed,
                    updated = p.updated,
                    errored = p.errored,
                    skipped = p.skipped,
                    total = p.total,
                    "batch progress: {:.1}%",
                    p.percent()
                );
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn run_member(store: &RocksStore, action: MemberAction) -> Result<()> {
    match action {
        MemberAction::Add { id, username } => {
            let member = Member { id: UserId::new(id), source_username: username };
            store.register_member(&member)?;
            println!("registered {} as {}", member.id, member.source_username);
        }
        MemberAction::List => {
            for member in store.members()? {
                println!("{:<24} {}", member.id, member.source_username);
            }
        }
    }
    Ok(())
}

fn run_challenge(store: &RocksStore, action: ChallengeAction) -> Result<()> {
    match action {
        ChallengeAction::Define { file } => {
            let json = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let challenge = Challenge::from_json(&json)?;
            store.define_challenge(&challenge)?;
            println!("defined challenge for {}", challenge.month);
        }
        ChallengeAction::Reveal { month } => {
            store.reveal_shadow(month)?;
            println!("revealed shadow track for {month}");
        }
        ChallengeAction::Show { month } => match store.challenge(month)? {
            Some(challenge) => println!("{}", serde_json::to_string_pretty(&challenge)?),
            None => bail!("no challenge defined for {month}"),
        },
    }
    Ok(())
}

fn show_progress(store: &RocksStore, user: &UserId) -> Result<()> {
    for line in progress_lines(store, user)? {
        println!("{line}");
    }
    Ok(())
}

/// Rows of `questline show`. Shadow tiers of unrevealed months print as
/// hidden and stay out of the total.
fn progress_lines(store: &RocksStore, user: &UserId) -> Result<Vec<String>> {
    let records = store.records_for_user(user)?;
    if records.is_empty() {
        return Ok(vec![format!("no progress recorded for {user}")]);
    }
    let mut lines = Vec::with_capacity(records.len() + 1);
    let mut total = 0;
    for (month, track, record) in &records {
        let when = record
            .updated_at()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let hidden = *track == Track::Shadow
            && !store.challenge(*month)?.is_some_and(|c| c.shadow_revealed);
        if hidden {
            lines.push(format!("{month}  {track:<7} {:<13} -- pt  {when}", "hidden"));
        } else {
            total += record.points;
            lines.push(format!("{month}  {track:<7} {:<13} {} pt  {when}", record.tier, record.points));
        }
    }
    lines.push(format!("total {total} pt"));
    Ok(lines)
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    // Logs go to stderr so command output on stdout stays clean.
    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_live_with_month() {
        let cli = Cli::try_parse_from(["questline", "live", "--user", "42", "--month", "2025-02"]).unwrap();
        match cli.command {
            Commands::Live(args) => {
                assert_eq!(args.user, "42");
                assert_eq!(args.month, Some(MonthKey::new(2025, 2).unwrap()));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_month() {
        assert!(Cli::try_parse_from(["questline", "live", "--user", "42", "--month", "2025-2"]).is_err());
    }

    #[test]
    fn parses_batch_flags() {
        let cli = Cli::try_parse_from(["questline", "--log-format", "json", "batch", "--reprocess"]).unwrap();
        assert_eq!(cli.log_format.as_deref(), Some("json"));
        match cli.command {
            Commands::Batch(args) => {
                assert!(args.reprocess);
                assert!(args.user.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn show_hides_unrevealed_shadow_tier() {
        use chrono::TimeZone;
        use questline_core::types::{GameId, ProgressKey, Tier, TrackDefinition};

        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("progress")).unwrap();
        let month = MonthKey::new(2025, 2).unwrap();
        let track = |game| TrackDefinition {
            game_id: GameId(game),
            progression: Default::default(),
            win: Default::default(),
            total_achievements: 10,
        };
        store
            .define_challenge(&Challenge {
                month,
                main: track(1),
                shadow: Some(track(2)),
                shadow_revealed: false,
            })
            .unwrap();
        let user = UserId::new("42");
        let now = Utc.with_ymd_and_hms(2025, 2, 20, 8, 0, 0).unwrap();
        store.merge_upsert(&ProgressKey::new(user.clone(), month, Track::Main), Tier::Participation, now).unwrap();
        store.merge_upsert(&ProgressKey::new(user.clone(), month, Track::Shadow), Tier::Beaten, now).unwrap();

        let lines = progress_lines(&store, &user).unwrap();
        assert!(lines.iter().any(|l| l.contains("shadow") && l.contains("hidden")));
        assert!(!lines.iter().any(|l| l.contains("beaten") || l.contains("Beaten")));
        assert_eq!(lines.last().unwrap(), "total 1 pt");

        store.reveal_shadow(month).unwrap();
        let lines = progress_lines(&store, &user).unwrap();
        assert_eq!(lines.last().unwrap(), "total 5 pt");
    }

    #[test]
    fn parses_nested_challenge_command() {
        let cli = Cli::try_parse_from(["questline", "challenge", "reveal", "--month", "2025-03"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Challenge { action: ChallengeAction::Reveal { .. } }
        ));
    }
}
