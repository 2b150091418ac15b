use crate::crawler::{StrategyCrawler, StrategyReport};
use crate::source::ContentSource;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use trendlens_core::{
    ContentItem, CoreError, CrawlQuery, CrawlSettings, CrawlStrategy, SortMode, TimeFilter,
};

/// Strategies used for a time range. Only the 1, 7 and 30 day ranges map
/// onto Reddit's top-listing filters; anything else pages through `new`.
pub fn select_strategies(time_range_days: u32) -> Vec<CrawlStrategy> {
    match time_range_days {
        1 => vec![CrawlStrategy::new(SortMode::Top, Some(TimeFilter::Day))],
        7 => vec![CrawlStrategy::new(SortMode::Top, Some(TimeFilter::Week))],
        30 => vec![
            CrawlStrategy::new(SortMode::Top, Some(TimeFilter::Month)),
            CrawlStrategy::new(SortMode::Hot, None),
            CrawlStrategy::new(SortMode::New, None),
        ],
        _ => vec![CrawlStrategy::new(SortMode::New, None)],
    }
}

/// Concatenates batches in order, keeps the first occurrence of each id,
/// sorts by score descending and truncates to `limit`. Equal scores keep
/// their merge order.
pub fn merge_results(batches: Vec<Vec<ContentItem>>, limit: usize) -> Vec<ContentItem> {
    let mut seen = HashSet::new();
    let mut merged: Vec<ContentItem> = batches
        .into_iter()
        .flatten()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    merged.sort_by(|a, b| b.score.cmp(&a.score));
    merged.truncate(limit);
    merged
}

/// Runs every strategy selected for a query in parallel and merges what
/// they collected.
#[derive(Clone)]
pub struct CrawlOrchestrator {
    source: Arc<dyn ContentSource>,
    settings: CrawlSettings,
}

impl CrawlOrchestrator {
    pub fn new(source: Arc<dyn ContentSource>, settings: CrawlSettings) -> Self {
        Self { source, settings }
    }

    pub async fn run(&self, query: &CrawlQuery) -> Result<Vec<ContentItem>, CoreError> {
        self.run_at(query, Utc::now()).await
    }

    /// Like [`run`](Self::run) with an explicit reference time for the cutoff.
    ///
    /// The first fatal strategy error fails the whole query; strategies still
    /// running are cancelled and their partial output is dropped.
    pub async fn run_at(
        &self,
        query: &CrawlQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<ContentItem>, CoreError> {
        if query.target.trim().is_empty() {
            return Err(CoreError::InvalidInput {
                message: "target must not be empty".to_string(),
            });
        }
        if query.limit == 0 {
            debug!("Query {} asks for nothing", query.cache_key());
            return Ok(Vec::new());
        }

        let strategies = select_strategies(query.time_range_days);
        let cutoff = query.cutoff(now);
        let limits = self.settings.limits_for(query.min_score);

        info!(
            "Crawling r/{} over {} days with {} (min score {}, limit {})",
            query.target,
            query.time_range_days,
            strategies
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            query.min_score,
            query.limit
        );

        let permits = Arc::new(Semaphore::new(self.settings.max_parallel_strategies.max(1)));
        let mut tasks = JoinSet::new();

        for (index, strategy) in strategies.into_iter().enumerate() {
            let crawler = StrategyCrawler::new(
                self.source.clone(),
                query.target.clone(),
                strategy,
                cutoff,
                query.min_score,
                query.limit,
                limits,
                self.settings.max_page_size,
            )
            .with_comment_limit(self.settings.comment_limit);
            let permits = permits.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.map_err(|e| CoreError::Internal {
                    message: format!("strategy scheduler closed: {}", e),
                })?;
                crawler.run().await.map(|report| (index, report))
            });
        }

        let mut reports: Vec<(usize, StrategyReport)> = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(|e| CoreError::Internal {
                message: format!("strategy task failed: {}", e),
            })?;
            // Returning drops the set, which aborts the remaining strategies.
            reports.push(outcome?);
        }

        // Completion order varies; merge in strategy order.
        reports.sort_by_key(|(index, _)| *index);
        let batches = reports
            .into_iter()
            .map(|(_, report)| {
                debug!(
                    "{} contributed {} items in {} pages ({:?})",
                    report.strategy,
                    report.items.len(),
                    report.pages_requested,
                    report.stop_reason
                );
                report.items
            })
            .collect();

        let merged = merge_results(batches, query.limit);
        log_result_summary(&query.target, &merged);
        Ok(merged)
    }
}

fn log_result_summary(target: &str, items: &[ContentItem]) {
    let (Some(min), Some(max)) = (
        items.iter().map(|i| i.score).min(),
        items.iter().map(|i| i.score).max(),
    ) else {
        info!("No qualifying content found in r/{}", target);
        return;
    };

    let earliest = items.iter().min_by_key(|i| i.created_utc);
    let latest = items.iter().max_by_key(|i| i.created_utc);
    info!(
        "r/{}: {} items, scores {}..={}, posted {} to {}",
        target,
        items.len(),
        min,
        max,
        earliest.map_or("?", |i| i.created_date.as_str()),
        latest.map_or("?", |i| i.created_date.as_str())
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize;
    use crate::testing::{raw_item, ScriptedPage, ScriptedSource};
    use chrono::TimeZone;
    use trendlens_core::{Platform, RedditApiError};

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(NOW, 0).unwrap()
    }

    fn item(id: &str, score: i64) -> ContentItem {
        normalize::content_item(&raw_item(id, score, NOW), Platform::Reddit, Vec::new())
    }

    fn ids(items: &[ContentItem]) -> Vec<&str> {
        items.iter().map(|i| i.id.as_str()).collect()
    }

    #[test]
    fn test_select_strategies() {
        assert_eq!(
            select_strategies(1),
            vec![CrawlStrategy::new(SortMode::Top, Some(TimeFilter::Day))]
        );
        assert_eq!(
            select_strategies(7),
            vec![CrawlStrategy::new(SortMode::Top, Some(TimeFilter::Week))]
        );
        let month: Vec<String> = select_strategies(30).iter().map(|s| s.to_string()).collect();
        assert_eq!(month, vec!["top/month", "hot", "new"]);

        for days in [0, 2, 14, 365] {
            assert_eq!(
                select_strategies(days),
                vec![CrawlStrategy::new(SortMode::New, None)]
            );
        }
    }

    #[test]
    fn test_merge_dedups_sorts_and_truncates() {
        let merged = merge_results(
            vec![
                vec![item("a", 5), item("b", 50)],
                vec![item("b", 50), item("c", 20), item("d", 5)],
            ],
            3,
        );
        assert_eq!(ids(&merged), vec!["b", "c", "a"]);
    }

    #[test]
    fn test_merge_keeps_first_occurrence() {
        let mut later = item("a", 999);
        later.title = "later copy".to_string();
        let merged = merge_results(vec![vec![item("a", 1)], vec![later]], 10);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].score, 1);
        assert_ne!(merged[0].title, "later copy");
    }

    #[test]
    fn test_merge_is_stable_for_equal_scores() {
        let merged = merge_results(
            vec![vec![item("x", 10), item("y", 10)], vec![item("z", 10)]],
            10,
        );
        assert_eq!(ids(&merged), vec!["x", "y", "z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_every_month_strategy() {
        let source = Arc::new(
            ScriptedSource::new(Vec::new())
                .with_sort_pages(
                    SortMode::Top,
                    vec![ScriptedPage::Items(vec![raw_item("t", 30, NOW - DAY)])],
                )
                .with_sort_pages(
                    SortMode::Hot,
                    vec![ScriptedPage::Items(vec![raw_item("h", 20, NOW - DAY)])],
                )
                .with_sort_pages(
                    SortMode::New,
                    vec![ScriptedPage::Items(vec![raw_item("n", 10, NOW - DAY)])],
                ),
        );
        let orchestrator = CrawlOrchestrator::new(source.clone(), CrawlSettings::default());

        let items = orchestrator
            .run_at(&CrawlQuery::reddit("test", 30, 0), now())
            .await
            .unwrap();

        assert_eq!(ids(&items), vec!["t", "h", "n"]);
        let mut sorts: Vec<_> = source
            .calls()
            .iter()
            .map(|c| c.strategy.sort_mode.as_str())
            .collect();
        sorts.sort();
        sorts.dedup();
        assert_eq!(sorts, vec!["hot", "new", "top"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_strategy_fails_query() {
        let source = Arc::new(
            ScriptedSource::new(Vec::new())
                .with_sort_pages(
                    SortMode::Top,
                    vec![ScriptedPage::Items(vec![raw_item("t", 30, NOW - DAY)])],
                )
                .with_sort_pages(
                    SortMode::Hot,
                    vec![ScriptedPage::Error(RedditApiError::SubredditNotFound {
                        subreddit: "test".to_string(),
                    })],
                ),
        );
        let orchestrator = CrawlOrchestrator::new(source, CrawlSettings::default());

        let result = orchestrator
            .run_at(&CrawlQuery::reddit("test", 30, 0), now())
            .await;
        assert!(matches!(
            result,
            Err(CoreError::RedditApi(RedditApiError::SubredditNotFound { .. }))
        ));
    }

    #[tokio::test]
    async fn test_rejects_empty_target() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let orchestrator = CrawlOrchestrator::new(source.clone(), CrawlSettings::default());

        let result = orchestrator.run(&CrawlQuery::reddit("  ", 7, 0)).await;
        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_limit_skips_source() {
        let source = Arc::new(ScriptedSource::new(Vec::new()));
        let orchestrator = CrawlOrchestrator::new(source.clone(), CrawlSettings::default());

        let items = orchestrator
            .run(&CrawlQuery::reddit("test", 7, 0).with_limit(0))
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_permit_still_completes() {
        let source = Arc::new(
            ScriptedSource::new(Vec::new())
                .with_sort_pages(
                    SortMode::Top,
                    vec![ScriptedPage::Items(vec![raw_item("t", 3, NOW - DAY)])],
                )
                .with_sort_pages(
                    SortMode::New,
                    vec![ScriptedPage::Items(vec![raw_item("n", 4, NOW - DAY)])],
                ),
        );
        let settings = CrawlSettings {
            max_parallel_strategies: 1,
            ..CrawlSettings::default()
        };
        let orchestrator = CrawlOrchestrator::new(source, settings);

        let items = orchestrator
            .run_at(&CrawlQuery::reddit("test", 30, 0), now())
            .await
            .unwrap();
        assert_eq!(ids(&items), vec!["n", "t"]);
    }
}
