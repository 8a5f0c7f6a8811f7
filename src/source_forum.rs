//! Forum comment adapter: offset-paginated comment API.
//!
//! The wire protocol is `GET {base_url}/{target}/comments` with
//! `order/limit/offset/status` query parameters returning
//! `{ data: [...], paging: { is_end } }`. Pages are fixed at 20 items;
//! a courtesy delay separates successive fetches. The server's `is_end`
//! is only honored once a page also comes back empty — an end report
//! alongside items means the caller advances one more time.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::budget::BudgetTracker;
use crate::config::HarvestConfig;
use crate::models::{HarvestedItem, ItemKind, SourceKind};
use crate::normalize::clip_text;
use crate::source::{FetchPage, PageCursor, SourceAdapter};

pub const PAGE_SIZE: u32 = 20;

/// One parsed comment; malformed entries never make it this far.
#[derive(Debug, Clone, PartialEq)]
pub struct RawComment {
    pub content: String,
    pub like_count: i64,
    pub created_time: Option<i64>,
}

/// One page as reported by the server.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<RawComment>,
    pub is_end: bool,
}

/// Seam between the adapter and the comment API, so pagination logic is
/// testable without a server.
#[async_trait]
pub trait ForumApi: Send + Sync {
    async fn fetch_comments(&self, target: &str, limit: u32, offset: u64) -> Result<CommentPage>;
}

pub struct HttpForumApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpForumApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl ForumApi for HttpForumApi {
    async fn fetch_comments(&self, target: &str, limit: u32, offset: u64) -> Result<CommentPage> {
        let url = format!("{}/{}/comments", self.base_url.trim_end_matches('/'), target);

        let response = self
            .client
            .get(&url)
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .header("Referer", format!("{}/{}", self.base_url, target))
            .query(&[
                ("order", "normal".to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("status", "open".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let json: serde_json::Value = response.json().await?;
        Ok(parse_comment_page(&json))
    }
}

/// Pull the parseable comments out of a response; entries missing their
/// content are skipped silently, never fatal to the page.
pub fn parse_comment_page(json: &serde_json::Value) -> CommentPage {
    let is_end = json
        .pointer("/paging/is_end")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    let comments = json
        .get("data")
        .and_then(|d| d.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let content = entry.get("content").and_then(|c| c.as_str())?;
                    if content.trim().is_empty() {
                        return None;
                    }
                    Some(RawComment {
                        content: content.to_string(),
                        like_count: entry.get("like_count").and_then(|v| v.as_i64()).unwrap_or(0),
                        created_time: entry.get("created_time").and_then(|v| v.as_i64()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    CommentPage { comments, is_end }
}

pub struct ForumAdapter {
    api: Arc<dyn ForumApi>,
    per_item_max_chars: usize,
    page_delay: Duration,
    /// Per-target item cap; pagination stops once the offset covers it.
    max_count: usize,
}

impl ForumAdapter {
    pub fn new(api: Arc<dyn ForumApi>, config: &HarvestConfig) -> Self {
        Self {
            api,
            per_item_max_chars: config.per_item_max_chars,
            page_delay: Duration::from_millis(config.page_delay_ms),
            max_count: config.max_count,
        }
    }
}

#[async_trait]
impl SourceAdapter for ForumAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::Forum
    }

    async fn fetch_page(
        &self,
        target: &str,
        cursor: PageCursor,
        budget: &mut BudgetTracker,
    ) -> FetchPage {
        let offset = cursor.0;

        // Rate-limit courtesy between successive page fetches.
        if offset > 0 && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }

        debug!(target, page = offset / PAGE_SIZE as u64 + 1, "fetching forum page");

        let page = match self.api.fetch_comments(target, PAGE_SIZE, offset).await {
            Ok(page) => page,
            Err(e) => {
                warn!(target, offset, error = %e, "forum page fetch failed");
                return FetchPage::failed(format!(
                    "forum {}: page at offset {} failed: {}",
                    target, offset, e
                ));
            }
        };

        let fetched = page.comments.len();
        let mut items = Vec::new();
        let mut refused = false;

        for raw in page.comments {
            if budget.expired() {
                refused = true;
                break;
            }
            let text = clip_text(&raw.content, self.per_item_max_chars);
            if text.is_empty() {
                continue;
            }
            if !budget.consume(text.chars().count()) {
                refused = true;
                break;
            }
            items.push(HarvestedItem {
                source: SourceKind::Forum,
                kind: ItemKind::Comment,
                text,
                credibility: raw.like_count,
                origin: target.to_string(),
                timestamp: raw
                    .created_time
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            });
        }

        if fetched == 0 {
            debug!(target, offset, "forum page empty");
        }

        // An end report with items on the page is not final: advance once
        // more and let the following empty page terminate.
        let next_offset = offset + PAGE_SIZE as u64;
        let server_done = page.is_end && fetched == 0;
        let cap_reached = next_offset as usize >= self.max_count;

        let next = if refused || server_done || cap_reached {
            None
        } else {
            Some(PageCursor(next_offset))
        };

        FetchPage {
            items,
            next,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_malformed_entries() {
        let json = serde_json::json!({
            "data": [
                {"content": "solid advice", "like_count": 4, "created_time": 1700000000},
                {"like_count": 9},
                {"content": "", "like_count": 2},
                {"content": "second opinion"},
            ],
            "paging": {"is_end": false}
        });
        let page = parse_comment_page(&json);
        assert_eq!(page.comments.len(), 2);
        assert_eq!(page.comments[0].content, "solid advice");
        assert_eq!(page.comments[1].like_count, 0);
        assert!(!page.is_end);
    }

    #[test]
    fn test_parse_missing_paging_means_end() {
        let json = serde_json::json!({"data": []});
        let page = parse_comment_page(&json);
        assert!(page.is_end);
        assert!(page.comments.is_empty());
    }
}
