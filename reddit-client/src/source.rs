use async_trait::async_trait;
use trendlens_core::{CoreError, CrawlStrategy, Platform};

/// One listing record as the upstream returns it, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub score: i64,
    pub created_utc: i64,
    pub body_text: Option<String>,
    pub url: Option<String>,
    /// Absolute link to the item on its platform.
    pub permalink: String,
    pub comment_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawComment {
    pub author: Option<String>,
    pub score: i64,
    pub body: String,
    pub created_utc: i64,
    pub pinned: bool,
}

/// A paginated content source with a pre-authenticated session.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn platform(&self) -> Platform;

    /// Largest page a single `list_page` call may ask for.
    fn max_page_size(&self) -> usize {
        100
    }

    async fn list_page(
        &self,
        target: &str,
        strategy: CrawlStrategy,
        cursor: Option<&str>,
        size: usize,
    ) -> Result<Vec<RawItem>, CoreError>;

    async fn fetch_comments(
        &self,
        item_id: &str,
        limit: usize,
    ) -> Result<Vec<RawComment>, CoreError>;

    /// Cursor that continues a listing after `item`.
    fn cursor_for(&self, item: &RawItem) -> String {
        format!("t3_{}", item.id)
    }
}
