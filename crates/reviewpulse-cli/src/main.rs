use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use reviewpulse_api::{Credentials, GerritClient};
use reviewpulse_cache::{CacheManager, CacheStore, FileCacheStore};
use reviewpulse_core::{
    CacheBackend, Change, Config, GerritProvider, TrendingCache, TrendingScorer, TrendingService,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reviewpulse")]
#[command(version, about = "Trending changes on a Gerrit code review server", long_about = None)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List the changes with the most review activity right now
    Trending {
        /// Ignore the cached list and recompute
        #[arg(short, long)]
        force: bool,

        /// Show at most this many changes
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the list as JSON
        #[arg(long)]
        json: bool,

        /// Show how each score was made up
        #[arg(long)]
        explain: bool,
    },
    /// Manage the local trending cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Inspect or create the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand)]
enum CacheAction {
    /// Drop the cached trending list for the active account
    Clear,
}

#[derive(clap::Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a config file with default values
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reviewpulse=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path)?;

    match cli.command {
        Some(Commands::Trending {
            force,
            limit,
            json,
            explain,
        }) => {
            let service = build_service(&config, limit).await?;
            let changes = run_cycle(service, force).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&changes)?);
            } else {
                print_changes(&changes, explain);
            }
        }
        Some(Commands::Cache {
            action: CacheAction::Clear,
        }) => {
            let provider = build_provider(&config);
            let account = account_key(&config, &provider).await?;
            let cache = build_cache(&config)?;
            cache.invalidate(&account)?;
            println!("Cleared trending cache for {}", account);
        }
        Some(Commands::Config {
            action: ConfigAction::Show,
        }) => {
            let mut shown = config.clone();
            if shown.gerrit.http_password.is_some() {
                shown.gerrit.http_password = Some("********".to_string());
            }
            println!("# {}", config_path.display());
            print!("{}", shown.to_toml_string()?);
        }
        Some(Commands::Config {
            action: ConfigAction::Init,
        }) => {
            if config_path.exists() {
                anyhow::bail!("{} already exists", config_path.display());
            }
            Config::default().save_to(&config_path)?;
            println!("Wrote {}", config_path.display());
        }
        None => {
            println!("No command specified. Try --help");
        }
    }

    Ok(())
}

fn build_provider(config: &Config) -> GerritProvider {
    let credentials = match (&config.gerrit.username, &config.gerrit.http_password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            http_password: password.clone(),
        }),
        _ => None,
    };
    let client = GerritClient::new(&config.gerrit.url, credentials)
        .with_retry_config(config.retry_config());
    GerritProvider::new(client)
}

async fn account_key(config: &Config, provider: &GerritProvider) -> anyhow::Result<String> {
    match &config.account.id {
        Some(id) => Ok(id.clone()),
        None => provider
            .account_key()
            .await
            .context("Could not determine the active account"),
    }
}

fn build_cache(config: &Config) -> anyhow::Result<TrendingCache> {
    let dir = config.cache_dir()?;
    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::File => Arc::new(FileCacheStore::new(dir)),
        CacheBackend::Sqlite => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;
            let db_path = dir.join("cache.db");
            Arc::new(CacheManager::new(&db_path.to_string_lossy())?)
        }
    };
    let max_age = Duration::from_secs(config.cache.max_age_minutes * 60);
    Ok(TrendingCache::with_max_age(store, max_age))
}

async fn build_service(config: &Config, limit: Option<usize>) -> anyhow::Result<Arc<TrendingService>> {
    let provider = build_provider(config);
    let account = account_key(config, &provider).await?;
    let mut prefs = config.preferences(account);
    if let Some(limit) = limit {
        prefs.max_items = limit;
    }

    let cache = build_cache(config)?;
    let service = TrendingService::new(Arc::new(provider), cache, prefs)
        .with_query(config.trending_query());
    Ok(Arc::new(service))
}

/// Run a refresh cycle off the main task and wait for its result
async fn run_cycle(service: Arc<TrendingService>, force: bool) -> anyhow::Result<Vec<Change>> {
    let mut phases = service.subscribe();
    let watcher = tokio::spawn(async move {
        while phases.changed().await.is_ok() {
            tracing::debug!("Refresh phase: {:?}", *phases.borrow());
        }
    });

    let result = service.spawn_cycle(force).await;
    watcher.abort();

    let changes = result
        .context("Refresh task panicked")?
        .context("Could not load trending changes")?;
    Ok(changes)
}

fn print_changes(changes: &[Change], explain: bool) {
    if changes.is_empty() {
        println!("Nothing is trending right now.");
        return;
    }

    let now = Utc::now();
    let scorer = TrendingScorer::new();

    for change in changes {
        println!(
            "{:>3}  {:>7}  {:<24}  {}  ({}, {})",
            change.trending_score,
            change.number,
            truncate(&change.project, 24),
            change.subject,
            change.owner.display_name(),
            relative_time(change.updated, now),
        );

        if explain {
            for line in explain_lines(&scorer, change, now) {
                println!("       {}", line);
            }
        }
    }
}

/// Per-signal breakdown, recomputed as of `now`
///
/// A cached list may have been scored up to an hour ago, so the recomputed
/// total is printed next to the score the list was ranked by.
fn explain_lines(scorer: &TrendingScorer, change: &Change, now: DateTime<Utc>) -> Vec<String> {
    let breakdown = scorer.breakdown(change, now);
    let mut lines: Vec<String> = breakdown
        .signals()
        .iter()
        .map(|(label, signal)| format!("{:<16} {:>9} -> {}", label, signal.raw, signal.points))
        .collect();

    let total = breakdown.total();
    if total == change.trending_score {
        lines.push(format!("{:<16} {:>9} -> {}", "total", "", total));
    } else {
        lines.push(format!(
            "{:<16} {:>9} -> {} now, {} when listed",
            "total", "", total, change.trending_score
        ));
    }
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}

fn relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - ts;
    if elapsed.num_minutes() < 1 {
        "just now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m ago", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}
