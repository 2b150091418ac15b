//! Scripted in-memory source used by the crate's tests.

use crate::source::{ContentSource, RawComment, RawItem};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use trendlens_core::{CoreError, CrawlStrategy, Platform, RedditApiError, SortMode};

pub fn raw_item(id: &str, score: i64, created_utc: i64) -> RawItem {
    RawItem {
        id: id.to_string(),
        title: format!("post {id}"),
        author: Some("poster".to_string()),
        score,
        created_utc,
        body_text: Some(format!("body of {id}")),
        url: None,
        permalink: format!("https://www.reddit.com/r/test/comments/{id}/"),
        comment_count: 0,
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedPage {
    Items(Vec<RawItem>),
    Error(RedditApiError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListCall {
    pub target: String,
    pub strategy: CrawlStrategy,
    pub cursor: Option<String>,
    pub size: usize,
}

/// Replays pages in order, per sort mode when scripted that way. Once a
/// script runs dry every further call returns an empty page.
#[derive(Default)]
pub struct ScriptedSource {
    shared: Mutex<VecDeque<ScriptedPage>>,
    by_sort: Mutex<HashMap<SortMode, VecDeque<ScriptedPage>>>,
    comments: HashMap<String, Vec<RawComment>>,
    failing_comments: bool,
    calls: Mutex<Vec<ListCall>>,
    comment_calls: Mutex<usize>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<ScriptedPage>) -> Self {
        Self {
            shared: Mutex::new(pages.into()),
            ..Self::default()
        }
    }

    pub fn with_sort_pages(self, sort_mode: SortMode, pages: Vec<ScriptedPage>) -> Self {
        self.by_sort
            .lock()
            .unwrap()
            .insert(sort_mode, pages.into());
        self
    }

    pub fn with_comments(mut self, item_id: &str, comments: Vec<RawComment>) -> Self {
        self.comments.insert(item_id.to_string(), comments);
        self
    }

    pub fn with_failing_comments(mut self) -> Self {
        self.failing_comments = true;
        self
    }

    pub fn calls(&self) -> Vec<ListCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn requested_sizes(&self) -> Vec<usize> {
        self.calls().into_iter().map(|call| call.size).collect()
    }

    pub fn comment_call_count(&self) -> usize {
        *self.comment_calls.lock().unwrap()
    }

    fn next_page(&self, sort_mode: SortMode) -> Option<ScriptedPage> {
        let mut by_sort = self.by_sort.lock().unwrap();
        if let Some(pages) = by_sort.get_mut(&sort_mode) {
            return pages.pop_front();
        }
        drop(by_sort);
        self.shared.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
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
        self.calls.lock().unwrap().push(ListCall {
            target: target.to_string(),
            strategy,
            cursor: cursor.map(str::to_string),
            size,
        });

        match self.next_page(strategy.sort_mode) {
            Some(ScriptedPage::Items(items)) => Ok(items),
            Some(ScriptedPage::Error(e)) => Err(CoreError::RedditApi(e)),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_comments(
        &self,
        item_id: &str,
        _limit: usize,
    ) -> Result<Vec<RawComment>, CoreError> {
        *self.comment_calls.lock().unwrap() += 1;
        if self.failing_comments {
            return Err(CoreError::RedditApi(RedditApiError::RequestTimeout));
        }
        // Returns everything so callers' own truncation is exercised.
        Ok(self.comments.get(item_id).cloned().unwrap_or_default())
    }
}
