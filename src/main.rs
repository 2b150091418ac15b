//! Trendlens command-line entry point.
//!
//! Crawls a subreddit for popular recent posts and prints them as JSON.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use content_cache::{CacheStore, MemoryStore, ResultCache, SqliteStore};
use reddit_client::{CrawlOrchestrator, CrawlService, RedditApiClient};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trendlens_core::{
    AppConfig, CacheBackend, ConfigError, CrawlQuery, ErrorExt, DEFAULT_QUERY_LIMIT,
};

#[derive(Parser, Debug)]
#[command(name = "trendlens")]
#[command(about = "Finds popular recent Reddit posts", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a subreddit and print qualifying posts
    Crawl {
        #[command(flatten)]
        query: QueryArgs,

        /// Always crawl and do not store the result
        #[arg(long)]
        no_cache: bool,
    },
    /// Drop the cached result of one query
    Invalidate {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// Drop every cached result
    Flush,
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Subreddit name, without the r/ prefix
    #[arg(short, long)]
    target: String,

    /// How many days back to look
    #[arg(short, long, default_value_t = 7)]
    days: u32,

    /// Minimum score a post needs
    #[arg(short = 's', long, default_value_t = 0)]
    min_score: i64,

    /// Maximum number of posts to return
    #[arg(short, long, default_value_t = DEFAULT_QUERY_LIMIT)]
    limit: usize,
}

impl QueryArgs {
    fn to_query(&self) -> CrawlQuery {
        CrawlQuery::reddit(self.target.trim_start_matches("r/"), self.days, self.min_score)
            .with_limit(self.limit)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("trendlens=info,reddit_client=info,content_cache=info")
            }),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).map_err(|e| {
        e.log_error();
        anyhow::anyhow!(e.user_friendly_message())
    })?;

    match cli.command {
        Command::Crawl { query, no_cache } => {
            let service = build_service(&config, !no_cache)?;
            let outcome = service.run_crawl_detailed(&query.to_query()).await;

            if let Some(e) = outcome.error {
                bail!(e.user_friendly_message());
            }
            tracing::info!(
                "{} items ({})",
                outcome.items.len(),
                if outcome.from_cache { "cached" } else { "fresh" }
            );
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome.items).context("serializing results")?
            );
        }
        Command::Invalidate { query } => {
            let query = query.to_query();
            build_cache(&config).invalidate(&query.cache_key()).await;
            tracing::info!("Invalidated {}", query.cache_key());
        }
        Command::Flush => {
            build_cache(&config).flush_all().await;
            tracing::info!("Flushed result cache");
        }
    }

    Ok(())
}

fn build_cache(config: &AppConfig) -> ResultCache {
    let store: Arc<dyn CacheStore> = match config.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::Sqlite => Arc::new(SqliteStore::new(config.cache.database_url.clone())),
    };
    ResultCache::new(store, config.cache.ttl())
}

fn build_service(config: &AppConfig, use_cache: bool) -> anyhow::Result<CrawlService> {
    let Some(token) = config.reddit.access_token.clone() else {
        let e = ConfigError::ValidationFailed {
            reason: "REDDIT_ACCESS_TOKEN is not set".to_string(),
        };
        bail!(e.user_friendly_message());
    };

    let client = RedditApiClient::new(&config.reddit, token)?;
    let orchestrator = CrawlOrchestrator::new(Arc::new(client), config.crawl.clone());

    Ok(if use_cache {
        CrawlService::new(orchestrator, build_cache(config))
    } else {
        CrawlService::uncached(orchestrator)
    })
}
