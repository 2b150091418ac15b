use crate::orchestrator::CrawlOrchestrator;
use content_cache::ResultCache;
use serde::Serialize;
use tracing::info;
use trendlens_core::{ContentItem, CoreError, CrawlQuery, ErrorReporter};

/// Everything a caller may want to know about one crawl request.
#[derive(Debug, Serialize)]
pub struct CrawlOutcome {
    pub items: Vec<ContentItem>,
    pub from_cache: bool,
    /// Set when the crawl failed; `items` is empty in that case.
    #[serde(skip)]
    pub error: Option<CoreError>,
}

/// Cache-first entry point for crawl queries.
#[derive(Clone)]
pub struct CrawlService {
    orchestrator: CrawlOrchestrator,
    cache: Option<ResultCache>,
    reporter: ErrorReporter,
}

impl CrawlService {
    pub fn new(orchestrator: CrawlOrchestrator, cache: ResultCache) -> Self {
        Self {
            orchestrator,
            cache: Some(cache),
            reporter: ErrorReporter::new(),
        }
    }

    /// A service that always crawls and never stores results.
    pub fn uncached(orchestrator: CrawlOrchestrator) -> Self {
        Self {
            orchestrator,
            cache: None,
            reporter: ErrorReporter::new(),
        }
    }

    /// Returns the qualifying items for `query`, best first. Failures are
    /// reported and come back as an empty list.
    pub async fn run_crawl(&self, query: &CrawlQuery) -> Vec<ContentItem> {
        self.run_crawl_detailed(query).await.items
    }

    pub async fn run_crawl_detailed(&self, query: &CrawlQuery) -> CrawlOutcome {
        let key = query.cache_key();

        if let Some(cache) = &self.cache {
            if let Some(items) = cache.get(&key).await {
                info!("Serving {} cached items for {}", items.len(), key);
                return CrawlOutcome {
                    items,
                    from_cache: true,
                    error: None,
                };
            }
        }

        match self.orchestrator.run(query).await {
            Ok(items) => {
                if let Some(cache) = &self.cache {
                    cache.put(&key, &items, None).await;
                }
                CrawlOutcome {
                    items,
                    from_cache: false,
                    error: None,
                }
            }
            Err(e) => {
                self.reporter.report_error(&e);
                CrawlOutcome {
                    items: Vec::new(),
                    from_cache: false,
                    error: Some(e),
                }
            }
        }
    }

    /// Drops the cached result for `query`, if any.
    pub async fn invalidate(&self, query: &CrawlQuery) {
        if let Some(cache) = &self.cache {
            cache.invalidate(&query.cache_key()).await;
        }
    }

    pub async fn flush_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.flush_all().await;
        }
    }
}
