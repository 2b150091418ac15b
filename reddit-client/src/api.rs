use crate::rate_limiter::{RateLimitConfig, RateLimiter};
use crate::source::{ContentSource, RawComment, RawItem};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use trendlens_core::{
    ConfigError, CoreError, CrawlStrategy, Platform, RedditApiError, RedditConfig,
};
use url::Url;

const REDDIT_WEB_BASE: &str = "https://www.reddit.com";
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListing<T> {
    pub kind: String,
    pub data: RedditListingData<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingData<T> {
    pub children: Vec<RedditListingChild<T>>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditListingChild<T> {
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditPostData {
    pub id: String,
    pub name: Option<String>,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub author: Option<String>,
    pub url: Option<String>,
    pub permalink: String,
    pub created_utc: f64,
    pub score: i64,
    #[serde(default)]
    pub num_comments: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditCommentData {
    pub author: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub body: String,
    pub created_utc: f64,
    #[serde(default)]
    pub stickied: bool,
}

impl From<RedditPostData> for RawItem {
    fn from(post: RedditPostData) -> Self {
        Self {
            permalink: absolute_permalink(&post.permalink),
            id: post.id,
            title: post.title,
            author: post.author,
            score: post.score,
            created_utc: post.created_utc as i64,
            body_text: Some(post.selftext).filter(|text| !text.is_empty()),
            url: post.url,
            comment_count: post.num_comments,
        }
    }
}

impl From<RedditCommentData> for RawComment {
    fn from(comment: RedditCommentData) -> Self {
        Self {
            author: comment.author,
            score: comment.score,
            body: comment.body,
            created_utc: comment.created_utc as i64,
            pinned: comment.stickied,
        }
    }
}

fn absolute_permalink(permalink: &str) -> String {
    if permalink.starts_with('/') {
        format!("{}{}", REDDIT_WEB_BASE, permalink)
    } else {
        permalink.to_string()
    }
}

/// Reddit OAuth API client. The access token is obtained elsewhere and
/// injected; every request first takes a permit from the shared limiter.
#[derive(Debug)]
pub struct RedditApiClient {
    http_client: Client,
    rate_limiter: RateLimiter,
    api_base: Url,
    access_token: String,
}

impl RedditApiClient {
    pub fn new(config: &RedditConfig, access_token: impl Into<String>) -> Result<Self, CoreError> {
        if config.requests_per_minute == 0 || config.burst == 0 {
            return Err(CoreError::Config(ConfigError::ValidationFailed {
                reason: "reddit rate limit must allow at least one request".to_string(),
            }));
        }

        let api_base = Url::parse(&config.api_base).map_err(|e| CoreError::InvalidInput {
            message: format!("invalid Reddit API base '{}': {}", config.api_base, e),
        })?;
        if api_base.cannot_be_a_base() {
            return Err(CoreError::InvalidInput {
                message: format!("invalid Reddit API base '{}'", config.api_base),
            });
        }

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http_client,
            rate_limiter: RateLimiter::new(RateLimitConfig::from_reddit_config(config)),
            api_base,
            access_token: access_token.into(),
        })
    }

    /// Appends `segments` to the API base, percent-encoding each one so a
    /// target can never change the endpoint.
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url, CoreError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| CoreError::InvalidInput {
                message: format!("invalid Reddit API base '{}'", self.api_base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(
        &self,
        segments: &[&str],
        query_params: &[(&str, String)],
        target: &str,
    ) -> Result<Response, CoreError> {
        let url = self.endpoint_url(segments)?;
        let path = url.path().to_string();
        let permit = self.rate_limiter.acquire_permit().await?;
        if !permit.queue_wait_time.is_zero() {
            debug!("Waited {:?} for a request slot", permit.queue_wait_time);
        }

        debug!("Making Reddit API request: GET {}", path);
        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query_params)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for GET {}: {}", path, e);
                if e.is_timeout() {
                    CoreError::RedditApi(RedditApiError::RequestTimeout)
                } else {
                    CoreError::Network(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        error!("Request failed with status: {} for {}", status, path);
        Err(CoreError::RedditApi(status_error(status, &response, &path, target)))
    }
}

fn status_error(status: StatusCode, response: &Response, path: &str, target: &str) -> RedditApiError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!("Rate limited, retry after {} seconds", retry_after);
            RedditApiError::RateLimitExceeded { retry_after }
        }
        StatusCode::UNAUTHORIZED => RedditApiError::InvalidToken,
        StatusCode::FORBIDDEN => RedditApiError::Forbidden {
            resource: path.to_string(),
        },
        StatusCode::NOT_FOUND => RedditApiError::SubredditNotFound {
            subreddit: target.to_string(),
        },
        s if s.is_server_error() => RedditApiError::ServerError {
            status_code: s.as_u16(),
        },
        s => RedditApiError::InvalidResponse {
            details: format!("unexpected status {} for {}", s, path),
        },
    }
}

/// Query parameters for a listing page. `t` only applies to `top`.
pub fn listing_params(
    strategy: CrawlStrategy,
    cursor: Option<&str>,
    size: usize,
) -> Vec<(&'static str, String)> {
    let mut params = vec![("limit", size.to_string()), ("raw_json", "1".to_string())];
    if let (trendlens_core::SortMode::Top, Some(filter)) = (strategy.sort_mode, strategy.time_filter)
    {
        params.push(("t", filter.as_str().to_string()));
    }
    if let Some(after) = cursor {
        params.push(("after", after.to_string()));
    }
    params
}

/// Top-level comments of a `/comments/{id}` response. "Load more"
/// placeholders are dropped.
pub fn parse_comment_listing(
    listings: Vec<RedditListing<serde_json::Value>>,
) -> Result<Vec<RawComment>, CoreError> {
    let Some(comment_listing) = listings.into_iter().nth(1) else {
        return Err(CoreError::RedditApi(RedditApiError::InvalidResponse {
            details: "comment response has no comment listing".to_string(),
        }));
    };

    comment_listing
        .data
        .children
        .into_iter()
        .filter(|child| child.kind == "t1")
        .map(|child| {
            serde_json::from_value::<RedditCommentData>(child.data)
                .map(RawComment::from)
                .map_err(CoreError::from)
        })
        .collect()
}

#[async_trait]
impl ContentSource for RedditApiClient {
    fn platform(&self) -> Platform {
        Platform::Reddit
    }

    async fn list_page(
        &self,
        target: &str,
        strategy: CrawlStrategy,
        cursor: Option<&str>,
        size: usize,
    ) -> Result<Vec<RawItem>, CoreError> {
        let params = listing_params(strategy, cursor, size.min(self.max_page_size()));

        let response = self
            .get(&["r", target, strategy.sort_mode.as_str()], &params, target)
            .await?;
        let listing: RedditListing<RedditPostData> = response.json().await.map_err(|e| {
            error!("Failed to parse subreddit posts: {}", e);
            CoreError::RedditApi(RedditApiError::InvalidResponse {
                details: format!("Failed to parse posts for r/{}", target),
            })
        })?;

        info!(
            "Retrieved {} posts from r/{} ({})",
            listing.data.children.len(),
            target,
            strategy
        );
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| RawItem::from(child.data))
            .collect())
    }

    async fn fetch_comments(
        &self,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<RawComment>, CoreError> {
        let params = [
            ("sort", "top".to_string()),
            ("depth", "1".to_string()),
            ("limit", limit.to_string()),
            ("raw_json", "1".to_string()),
        ];

        let response = self.get(&["comments", item_id], &params, item_id).await?;
        let listings: Vec<RedditListing<serde_json::Value>> =
            response.json().await.map_err(|e| {
                error!("Failed to parse comments for {}: {}", item_id, e);
                CoreError::RedditApi(RedditApiError::InvalidResponse {
                    details: format!("Failed to parse comments for {}", item_id),
                })
            })?;

        let comments = parse_comment_listing(listings)?;
        debug!("Retrieved {} comments for {}", comments.len(), item_id);
        Ok(comments)
    }

    fn cursor_for(&self, item: &RawItem) -> String {
        format!("t3_{}", item.id)
    }
}
