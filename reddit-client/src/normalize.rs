//! Conversion from upstream records to [`ContentItem`]s.

use crate::source::{RawComment, RawItem};
use trendlens_core::{format_timestamp, Comment, ContentItem, Platform};

const UNKNOWN_AUTHOR: &str = "Unknown Author";
const UNKNOWN_COMMENTER: &str = "Unknown User";
const IMAGE_EXTENSIONS: [&str; 5] = [".png", ".jpg", ".jpeg", ".gif", ".webp"];
const IMGUR_GALLERY_MARKERS: [&str; 2] = ["imgur.com/a/", "imgur.com/gallery/"];

/// Direct image links and Imgur albums referenced by a post URL.
pub fn extract_image_urls(url: Option<&str>) -> Vec<String> {
    let Some(url) = url.filter(|url| !url.is_empty()) else {
        return Vec::new();
    };

    let is_image = IMAGE_EXTENSIONS.iter().any(|ext| url.ends_with(ext));
    let is_gallery = IMGUR_GALLERY_MARKERS
        .iter()
        .any(|marker| url.contains(marker));

    if is_image || is_gallery {
        vec![url.to_string()]
    } else {
        Vec::new()
    }
}

/// Highest-scored comments first, at most `limit` of them.
pub fn top_comments(mut comments: Vec<RawComment>, limit: usize) -> Vec<Comment> {
    comments.sort_by(|a, b| b.score.cmp(&a.score));
    comments
        .into_iter()
        .take(limit)
        .map(|comment| Comment {
            author: comment
                .author
                .unwrap_or_else(|| UNKNOWN_COMMENTER.to_string()),
            score: comment.score,
            body: comment.body,
            created_date: format_timestamp(comment.created_utc),
            is_pinned: comment.pinned,
        })
        .collect()
}

pub fn content_item(raw: &RawItem, platform: Platform, top_comments: Vec<Comment>) -> ContentItem {
    ContentItem {
        id: raw.id.clone(),
        title: raw.title.clone(),
        author: raw
            .author
            .clone()
            .filter(|author| !author.is_empty())
            .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        score: raw.score,
        created_utc: raw.created_utc,
        created_date: format_timestamp(raw.created_utc),
        body_text: raw.body_text.clone(),
        image_urls: extract_image_urls(raw.url.as_deref()),
        comment_count: raw.comment_count,
        top_comments,
        source_platform: platform,
        permalink: raw.permalink.clone(),
    }
}
