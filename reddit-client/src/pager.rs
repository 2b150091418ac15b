use crate::source::{ContentSource, RawItem};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use trendlens_core::{CoreError, CrawlStrategy, ErrorExt};

/// Result of one page fetch.
#[derive(Debug)]
pub enum PageOutcome {
    Items(Vec<RawItem>),
    /// Timeout, rate limiting, transport trouble. The crawler treats it as
    /// an empty page.
    Transient(CoreError),
    /// The query itself cannot succeed (unknown target, bad credentials).
    Fatal(CoreError),
}

impl PageOutcome {
    fn from_result(result: Result<Vec<RawItem>, CoreError>) -> Self {
        match result {
            Ok(items) => PageOutcome::Items(items),
            Err(e) if e.is_fatal() => PageOutcome::Fatal(e),
            Err(e) => PageOutcome::Transient(e),
        }
    }
}

/// Issues one listing call per `fetch_page` and then sleeps for the
/// configured delay, whatever the call returned.
#[derive(Clone)]
pub struct RateLimitedPager {
    source: Arc<dyn ContentSource>,
    delay: Duration,
    max_page_size: usize,
}

impl RateLimitedPager {
    pub fn new(source: Arc<dyn ContentSource>, delay: Duration, max_page_size: usize) -> Self {
        let max_page_size = max_page_size.min(source.max_page_size()).max(1);
        Self {
            source,
            delay,
            max_page_size,
        }
    }

    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    pub async fn fetch_page(
        &self,
        target: &str,
        strategy: CrawlStrategy,
        cursor: Option<&str>,
        page_size: usize,
    ) -> PageOutcome {
        let size = page_size.clamp(1, self.max_page_size);
        let result = self.source.list_page(target, strategy, cursor, size).await;

        sleep(self.delay).await;

        let outcome = PageOutcome::from_result(result);
        match &outcome {
            PageOutcome::Items(items) => {
                debug!("{} page for r/{}: {} raw items", strategy, target, items.len())
            }
            PageOutcome::Transient(e) => {
                debug!("{} page for r/{} failed transiently: {}", strategy, target, e)
            }
            PageOutcome::Fatal(e) => {
                debug!("{} page for r/{} failed fatally: {}", strategy, target, e)
            }
        }
        outcome
    }
}
