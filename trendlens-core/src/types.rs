use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of items a query asks for when the caller does not say.
pub const DEFAULT_QUERY_LIMIT: usize = 500;

const DISPLAY_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Reddit,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Reddit => "reddit",
            Platform::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub score: i64,
    pub body: String,
    pub created_date: String,
    pub is_pinned: bool,
}

/// A normalized post or video record. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub author: String,
    pub score: i64,
    pub created_utc: i64,
    pub created_date: String,
    pub body_text: Option<String>,
    pub image_urls: Vec<String>,
    pub comment_count: u32,
    pub top_comments: Vec<Comment>,
    pub source_platform: Platform,
    pub permalink: String,
}

impl ContentItem {
    /// First 200 characters of the body followed by an ellipsis, or an
    /// empty string for link posts.
    pub fn body_preview(&self) -> String {
        match self.body_text.as_deref() {
            Some(body) if !body.is_empty() => {
                let head: String = body.chars().take(PREVIEW_CHARS).collect();
                format!("{head}...")
            }
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Top,
    Hot,
    New,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Top => "top",
            SortMode::Hot => "hot",
            SortMode::New => "new",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Day,
    Week,
    Month,
}

impl TimeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
        }
    }
}

/// One (sort mode, time filter) pairing used to page through a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlStrategy {
    pub sort_mode: SortMode,
    pub time_filter: Option<TimeFilter>,
}

impl CrawlStrategy {
    pub const fn new(sort_mode: SortMode, time_filter: Option<TimeFilter>) -> Self {
        Self {
            sort_mode,
            time_filter,
        }
    }
}

impl fmt::Display for CrawlStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time_filter {
            Some(filter) => write!(f, "{}/{}", self.sort_mode.as_str(), filter.as_str()),
            None => f.write_str(self.sort_mode.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CrawlQuery {
    pub platform: Platform,
    pub target: String,
    pub time_range_days: u32,
    pub min_score: i64,
    pub limit: usize,
}

impl CrawlQuery {
    pub fn reddit(target: impl Into<String>, time_range_days: u32, min_score: i64) -> Self {
        Self {
            platform: Platform::Reddit,
            target: target.into(),
            time_range_days,
            min_score,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Canonical cache key. Every field takes part, so queries differing
    /// only by `limit` never share an entry.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.platform, self.target, self.time_range_days, self.min_score, self.limit
        )
    }

    /// Earliest creation time still considered in-window, relative to `now`.
    /// Ranges reaching past the representable past clamp to its start.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::days(i64::from(self.time_range_days)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Formats an epoch-seconds timestamp the way items display it.
pub fn format_timestamp(epoch_seconds: i64) -> String {
    Utc.timestamp_opt(epoch_seconds, 0)
        .single()
        .unwrap_or_default()
        .format(DISPLAY_DATE_FORMAT)
        .to_string()
}
