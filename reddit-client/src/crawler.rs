//! Single-strategy crawl.
//!
//! A [`StrategyCrawler`] pages through one (sort mode, time filter) listing
//! until it has enough qualifying items, runs out of in-window pages, or
//! hits its iteration cap. Transient upstream failures read as empty pages;
//! only fatal failures leave [`StrategyCrawler::run`] as an error.

use crate::normalize;
use crate::pager::{PageOutcome, RateLimitedPager};
use crate::source::{ContentSource, RawItem};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use trendlens_core::{Comment, ContentItem, CoreError, CrawlLimits, CrawlStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Collected at least `target_count` items.
    TargetReached,
    /// Too many consecutive pages with nothing in the time window.
    Exhausted,
    /// Hit the hard iteration cap.
    IterationCap,
}

#[derive(Debug, Clone)]
pub struct StrategyReport {
    pub strategy: CrawlStrategy,
    /// Qualifying items in page-arrival order.
    pub items: Vec<ContentItem>,
    pub pages_requested: u32,
    pub stop_reason: StopReason,
}

pub struct StrategyCrawler {
    pager: RateLimitedPager,
    source: Arc<dyn ContentSource>,
    target: String,
    strategy: CrawlStrategy,
    cutoff: DateTime<Utc>,
    min_score: i64,
    target_count: usize,
    limits: CrawlLimits,
    comment_limit: usize,
}

/// Running counters of one crawl.
#[derive(Debug, Default)]
struct CrawlProgress {
    iterations: u32,
    empty_streak: u32,
    cursor: Option<String>,
}

impl StrategyCrawler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn ContentSource>,
        target: impl Into<String>,
        strategy: CrawlStrategy,
        cutoff: DateTime<Utc>,
        min_score: i64,
        target_count: usize,
        limits: CrawlLimits,
        max_page_size: usize,
    ) -> Self {
        Self {
            pager: RateLimitedPager::new(source.clone(), limits.page_delay, max_page_size),
            source,
            target: target.into(),
            strategy,
            cutoff,
            min_score,
            target_count,
            limits,
            comment_limit: 10,
        }
    }

    pub fn with_comment_limit(mut self, comment_limit: usize) -> Self {
        self.comment_limit = comment_limit;
        self
    }

    fn stop_reason(&self, collected: usize, progress: &CrawlProgress) -> Option<StopReason> {
        if collected >= self.target_count {
            Some(StopReason::TargetReached)
        } else if progress.empty_streak >= self.limits.max_empty_pages {
            Some(StopReason::Exhausted)
        } else if progress.iterations >= self.limits.max_iterations {
            Some(StopReason::IterationCap)
        } else {
            None
        }
    }

    pub async fn run(self) -> Result<StrategyReport, CoreError> {
        let mut items = Vec::new();
        let mut progress = CrawlProgress::default();

        debug!(
            "Starting {} crawl of r/{} (cutoff {}, min score {}, target {})",
            self.strategy, self.target, self.cutoff, self.min_score, self.target_count
        );

        let stop_reason = loop {
            if let Some(reason) = self.stop_reason(items.len(), &progress) {
                break reason;
            }
            progress.iterations += 1;

            let remaining = self.target_count - items.len();
            let page = match self
                .pager
                .fetch_page(
                    &self.target,
                    self.strategy,
                    progress.cursor.as_deref(),
                    remaining.min(self.pager.max_page_size()),
                )
                .await
            {
                PageOutcome::Items(page) => page,
                PageOutcome::Transient(_) => Vec::new(),
                PageOutcome::Fatal(e) => {
                    warn!("{} crawl of r/{} aborted: {}", self.strategy, self.target, e);
                    return Err(e);
                }
            };

            // Cursor stays put so the same page is retried after the delay.
            if page.is_empty() {
                progress.empty_streak += 1;
                continue;
            }

            if self.scan_page(&page, &mut items).await {
                progress.empty_streak = 0;
            } else {
                progress.empty_streak += 1;
            }

            progress.cursor = page.last().map(|raw| self.source.cursor_for(raw));
        };

        info!(
            "{} crawl of r/{} finished: {} items after {} pages ({:?})",
            self.strategy,
            self.target,
            items.len(),
            progress.iterations,
            stop_reason
        );

        Ok(StrategyReport {
            strategy: self.strategy,
            items,
            pages_requested: progress.iterations,
            stop_reason,
        })
    }

    /// Appends the page's qualifying items and reports whether any item
    /// fell inside the time window, whatever its score.
    ///
    /// Scanning stops at the first item older than the cutoff, on the
    /// assumption that the rest of the page is older still. Listings other
    /// than `new` are only roughly chronological, so this may skip a few
    /// in-window items.
    async fn scan_page(&self, page: &[RawItem], items: &mut Vec<ContentItem>) -> bool {
        let cutoff = self.cutoff.timestamp();
        let mut oldest_in_page: Option<i64> = None;
        let mut in_window = false;

        for raw in page {
            let oldest = oldest_in_page.map_or(raw.created_utc, |o| o.min(raw.created_utc));
            oldest_in_page = Some(oldest);

            if raw.created_utc >= cutoff {
                in_window = true;
                if raw.score >= self.min_score {
                    let comments = self.top_comments(&raw.id).await;
                    items.push(normalize::content_item(
                        raw,
                        self.source.platform(),
                        comments,
                    ));
                }
            } else if oldest < cutoff {
                debug!(
                    "{} page for r/{} crossed the cutoff at {}",
                    self.strategy, self.target, raw.id
                );
                break;
            }
        }

        in_window
    }

    async fn top_comments(&self, item_id: &str) -> Vec<Comment> {
        if self.comment_limit == 0 {
            return Vec::new();
        }
        match self.source.fetch_comments(item_id, self.comment_limit).await {
            Ok(comments) => normalize::top_comments(comments, self.comment_limit),
            Err(e) => {
                debug!("Comments for {} unavailable: {}", item_id, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{raw_item, ScriptedPage, ScriptedSource};
    use crate::source::RawComment;
    use chrono::TimeZone;
    use trendlens_core::{CrawlSettings, RedditApiError, SortMode, TimeFilter};

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(NOW, 0).unwrap()
    }

    fn crawler(source: Arc<ScriptedSource>, min_score: i64, target_count: usize) -> StrategyCrawler {
        let limits = CrawlSettings::default().limits_for(min_score);
        StrategyCrawler::new(
            source,
            "test",
            CrawlStrategy::new(SortMode::Top, Some(TimeFilter::Week)),
            now() - chrono::Duration::days(7),
            min_score,
            target_count,
            limits,
            100,
        )
    }

    fn recent(id: &str, score: i64) -> RawItem {
        raw_item(id, score, NOW - DAY)
    }

    fn stale(id: &str, score: i64) -> RawItem {
        raw_item(id, score, NOW - 30 * DAY)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_target_reached() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptedPage::Items(vec![recent("a", 10), recent("b", 20)]),
            ScriptedPage::Items(vec![recent("c", 30), recent("d", 40)]),
            ScriptedPage::Items(vec![recent("e", 50)]),
        ]));

        let report = crawler(source.clone(), 0, 3).run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::TargetReached);
        let ids: Vec<_> = report.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(source.requested_sizes(), vec![3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cursor_advances_from_last_item() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptedPage::Items(vec![recent("a", 10), recent("b", 10)]),
            ScriptedPage::Items(vec![recent("c", 10)]),
        ]));

        crawler(source.clone(), 0, 3).run().await.unwrap();

        let cursors: Vec<_> = source.calls().into_iter().map(|c| c.cursor).collect();
        assert_eq!(cursors, vec![None, Some("t3_b".to_string())]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_page_keeps_cursor() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptedPage::Items(vec![recent("a", 10)]),
            ScriptedPage::Error(RedditApiError::RateLimitExceeded { retry_after: 1 }),
            ScriptedPage::Items(vec![recent("b", 10)]),
        ]));

        let report = crawler(source.clone(), 0, 2).run().await.unwrap();

        let cursors: Vec<_> = source.calls().into_iter().map(|c| c.cursor).collect();
        assert_eq!(
            cursors,
            vec![None, Some("t3_a".to_string()), Some("t3_a".to_string())]
        );
        assert_eq!(report.items.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_filter() {
        let source = Arc::new(ScriptedSource::new(vec![ScriptedPage::Items(vec![
            recent("low", 5),
            recent("high", 500),
            recent("edge", 100),
        ])]));

        let report = crawler(source, 100, 10).run().await.unwrap();

        let ids: Vec<_> = report.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "edge"]);
        assert!(report.items.iter().all(|i| i.score >= 100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_stops_at_first_item_past_cutoff() {
        let source = Arc::new(ScriptedSource::new(vec![ScriptedPage::Items(vec![
            recent("a", 10),
            stale("old", 10),
            recent("after-old", 10),
        ])]));

        let report = crawler(source, 0, 10).run().await.unwrap();

        let ids: Vec<_> = report.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_on_out_of_window_pages() {
        let pages = (0..20)
            .map(|i| ScriptedPage::Items(vec![stale(&format!("old{i}"), 100)]))
            .collect();
        let source = Arc::new(ScriptedSource::new(pages));

        let report = crawler(source.clone(), 10, 50).run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(report.pages_requested, 6);
        assert_eq!(source.call_count(), 6);
        assert!(report.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_strict_filter_exhausts_sooner() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));

        let report = crawler(source.clone(), 51, 50).run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::Exhausted);
        assert_eq!(source.call_count(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_window_page_resets_streak_even_when_filtered() {
        // Every page has an in-window item that fails the score filter, so
        // the streak never grows and the crawl runs to the iteration cap.
        let pages = (0..100)
            .map(|i| ScriptedPage::Items(vec![recent(&format!("p{i}"), 1)]))
            .collect();
        let source = Arc::new(ScriptedSource::new(pages));

        let report = crawler(source.clone(), 51, 50).run().await.unwrap();

        assert_eq!(report.stop_reason, StopReason::IterationCap);
        assert_eq!(report.pages_requested, 30);
        assert!(report.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_exactly_at_cutoff_is_in_window() {
        // Boundary items below the score filter still count as in window,
        // so the streak keeps resetting until the iteration cap.
        let edge = NOW - 7 * DAY;
        let mut pages = vec![ScriptedPage::Items(vec![raw_item("edge", 60, edge)])];
        pages.extend(
            (0..40).map(|i| ScriptedPage::Items(vec![raw_item(&format!("p{i}"), 1, edge)])),
        );
        let source = Arc::new(ScriptedSource::new(pages));

        let report = crawler(source, 51, 50).run().await.unwrap();

        let ids: Vec<_> = report.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["edge"]);
        assert_eq!(report.stop_reason, StopReason::IterationCap);
        assert_eq!(report.pages_requested, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_one_second_before_cutoff_is_out_of_window() {
        let source = Arc::new(ScriptedSource::new(vec![ScriptedPage::Items(vec![raw_item(
            "late",
            60,
            NOW - 7 * DAY - 1,
        )])]));

        let report = crawler(source, 0, 10).run().await.unwrap();

        assert!(report.items.is_empty());
        assert_eq!(report.stop_reason, StopReason::Exhausted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_aborts() {
        let source = Arc::new(ScriptedSource::new(vec![
            ScriptedPage::Items(vec![recent("a", 10)]),
            ScriptedPage::Error(RedditApiError::Forbidden {
                resource: "/r/test/top".to_string(),
            }),
        ]));

        let result = crawler(source, 0, 10).run().await;
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::Forbidden { .. }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_comments_attached_and_failures_tolerated() {
        let comment = RawComment {
            author: Some("alice".to_string()),
            score: 9,
            body: "nice".to_string(),
            created_utc: NOW,
            pinned: true,
        };
        let source = Arc::new(
            ScriptedSource::new(vec![ScriptedPage::Items(vec![recent("a", 10)])])
                .with_comments("a", vec![comment]),
        );
        let report = crawler(source.clone(), 0, 1).run().await.unwrap();
        assert_eq!(report.items[0].top_comments.len(), 1);
        assert!(report.items[0].top_comments[0].is_pinned);
        assert_eq!(source.comment_call_count(), 1);

        let failing = Arc::new(
            ScriptedSource::new(vec![ScriptedPage::Items(vec![recent("a", 10)])])
                .with_failing_comments(),
        );
        let report = crawler(failing, 0, 1).run().await.unwrap();
        assert_eq!(report.items.len(), 1);
        assert!(report.items[0].top_comments.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_comment_limit_skips_comment_calls() {
        let source = Arc::new(ScriptedSource::new(vec![ScriptedPage::Items(vec![recent(
            "a", 10,
        )])]));

        crawler(source.clone(), 0, 1)
            .with_comment_limit(0)
            .run()
            .await
            .unwrap();
        assert_eq!(source.comment_call_count(), 0);
    }
}
