//! Reddit crawl core.
//!
//! A [`CrawlService`] answers [`CrawlQuery`](trendlens_core::CrawlQuery)s
//! from the result cache or, on a miss, through the [`CrawlOrchestrator`],
//! which runs one [`StrategyCrawler`] per selected strategy and merges their
//! output. Upstream access goes through the [`ContentSource`] trait;
//! [`RedditApiClient`] is the HTTP implementation.

pub mod api;
pub mod crawler;
pub mod normalize;
pub mod orchestrator;
pub mod pager;
pub mod rate_limiter;
pub mod service;
pub mod source;

#[cfg(test)]
mod testing;

pub use api::RedditApiClient;
pub use crawler::{StopReason, StrategyCrawler, StrategyReport};
pub use orchestrator::{merge_results, select_strategies, CrawlOrchestrator};
pub use pager::{PageOutcome, RateLimitedPager};
pub use service::{CrawlOutcome, CrawlService};
pub use source::{ContentSource, RawComment, RawItem};
