//! Application configuration.
//!
//! Values come from an optional TOML file, then environment variables, then
//! validation. Every section has defaults so an empty file is a valid config.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Maximum page size the Reddit listing endpoints accept.
pub const REDDIT_MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub cache: CacheConfig,
    pub crawl: CrawlSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub user_agent: String,
    pub access_token: Option<String>,
    pub api_base: String,
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: "trendlens/0.1".to_string(),
            access_token: None,
            api_base: "https://oauth.reddit.com".to_string(),
            requests_per_minute: 100,
            burst: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub database_url: String,
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            database_url: "sqlite://trendlens-cache.db".to_string(),
            ttl_seconds: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Tuning for the strategy crawler. A query whose `min_score` is at or
/// below `lenient_score_ceiling` is lenient; anything above is strict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub lenient_score_ceiling: i64,
    pub lenient_delay_ms: u64,
    pub strict_delay_ms: u64,
    pub lenient_max_iterations: u32,
    pub strict_max_iterations: u32,
    pub lenient_max_empty_pages: u32,
    pub strict_max_empty_pages: u32,
    pub max_page_size: usize,
    pub max_parallel_strategies: usize,
    pub comment_limit: usize,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            lenient_score_ceiling: 50,
            lenient_delay_ms: 700,
            strict_delay_ms: 1200,
            lenient_max_iterations: 60,
            strict_max_iterations: 30,
            lenient_max_empty_pages: 6,
            strict_max_empty_pages: 5,
            max_page_size: REDDIT_MAX_PAGE_SIZE,
            max_parallel_strategies: 3,
            comment_limit: 10,
        }
    }
}

/// Limits in effect for one strategy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlLimits {
    pub page_delay: Duration,
    pub max_iterations: u32,
    pub max_empty_pages: u32,
}

impl CrawlSettings {
    pub fn is_lenient(&self, min_score: i64) -> bool {
        min_score <= self.lenient_score_ceiling
    }

    pub fn limits_for(&self, min_score: i64) -> CrawlLimits {
        if self.is_lenient(min_score) {
            CrawlLimits {
                page_delay: Duration::from_millis(self.lenient_delay_ms),
                max_iterations: self.lenient_max_iterations,
                max_empty_pages: self.lenient_max_empty_pages,
            }
        } else {
            CrawlLimits {
                page_delay: Duration::from_millis(self.strict_delay_ms),
                max_iterations: self.strict_max_iterations,
                max_empty_pages: self.strict_max_empty_pages,
            }
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Loads the file at `path` when given, applies process environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let contents =
                    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    })?;
                Self::from_toml_str(&contents)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("REDDIT_ACCESS_TOKEN") {
            self.reddit.access_token = Some(token);
        }
        if let Some(agent) = lookup("REDDIT_USER_AGENT") {
            self.reddit.user_agent = agent;
        }
        if let Some(backend) = lookup("CACHE_BACKEND") {
            self.cache.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => CacheBackend::Memory,
                "sqlite" => CacheBackend::Sqlite,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "CACHE_BACKEND".to_string(),
                        value: backend,
                    })
                }
            };
        }
        if let Some(url) = lookup("CACHE_DATABASE_URL") {
            self.cache.database_url = url;
        }
        if let Some(ttl) = lookup("CACHE_EXPIRE_SECONDS") {
            self.cache.ttl_seconds = ttl.parse().map_err(|_| ConfigError::InvalidValue {
                field: "CACHE_EXPIRE_SECONDS".to_string(),
                value: ttl.clone(),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reddit.user_agent.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "reddit.user_agent must not be empty".to_string(),
            });
        }
        if self.reddit.requests_per_minute == 0 || self.reddit.burst == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "reddit rate limit must allow at least one request".to_string(),
            });
        }
        if self.cache.ttl_seconds == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "cache.ttl_seconds must be positive".to_string(),
            });
        }
        if !(1..=REDDIT_MAX_PAGE_SIZE).contains(&self.crawl.max_page_size) {
            return Err(ConfigError::InvalidValue {
                field: "crawl.max_page_size".to_string(),
                value: self.crawl.max_page_size.to_string(),
            });
        }
        if self.crawl.max_parallel_strategies == 0 {
            return Err(ConfigError::InvalidValue {
                field: "crawl.max_parallel_strategies".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
