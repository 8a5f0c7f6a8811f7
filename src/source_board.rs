//! Link-aggregator adapter: most-engaged listings with nested comment
//! trees.
//!
//! The caller supplies a pre-authenticated [`BoardClient`]; one
//! `fetch_page` call works through a single submission from the target's
//! listing. Comment trees are walked breadth-first from an explicit
//! queue seeded with the top-level comments, so the budget check can cut
//! the traversal at any node without unwinding a call stack; the
//! unvisited remainder of the queue is discarded and no resumption state
//! is kept.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::budget::BudgetTracker;
use crate::config::HarvestConfig;
use crate::models::{HarvestedItem, ItemKind, SourceKind};
use crate::normalize::clip_text;
use crate::source::{FetchPage, PageCursor, SourceAdapter};

/// One submission from a board's most-engaged listing, with its full
/// comment tree already resolved by the client.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub title: String,
    pub body: Option<String>,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub comments: Vec<CommentNode>,
}

#[derive(Debug, Clone)]
pub struct CommentNode {
    pub body: Option<String>,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub replies: Vec<CommentNode>,
}

/// Pre-authenticated read client supplied by the orchestration layer.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// The target's most-engaged submissions, best first.
    async fn top_submissions(&self, target: &str, limit: usize) -> Result<Vec<Submission>>;
}

pub struct BoardAdapter {
    client: Arc<dyn BoardClient>,
    listing_depth: usize,
    recency: ChronoDuration,
    per_item_max_chars: usize,
    // One listing fetch per target per run; submissions are then served
    // from this cache as the cursor advances.
    listings: Mutex<HashMap<String, Arc<Vec<Submission>>>>,
}

impl BoardAdapter {
    pub fn new(client: Arc<dyn BoardClient>, config: &HarvestConfig) -> Self {
        Self {
            client,
            listing_depth: config.listing_depth,
            recency: ChronoDuration::days(30 * config.recency_months as i64),
            per_item_max_chars: config.per_item_max_chars,
            listings: Mutex::new(HashMap::new()),
        }
    }

    fn is_recent(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(created_at) <= self.recency
    }

    async fn listing(&self, target: &str) -> Result<Arc<Vec<Submission>>> {
        if let Some(cached) = self.listings.lock().unwrap().get(target) {
            return Ok(Arc::clone(cached));
        }
        let fetched = Arc::new(self.client.top_submissions(target, self.listing_depth).await?);
        self.listings
            .lock()
            .unwrap()
            .insert(target.to_string(), Arc::clone(&fetched));
        Ok(fetched)
    }
}

fn usable_body(body: &Option<String>) -> Option<&str> {
    match body.as_deref() {
        None | Some("") | Some("[deleted]") | Some("[removed]") => None,
        Some(text) => Some(text),
    }
}

#[async_trait]
impl SourceAdapter for BoardAdapter {
    fn source(&self) -> SourceKind {
        SourceKind::Aggregator
    }

    async fn fetch_page(
        &self,
        target: &str,
        cursor: PageCursor,
        budget: &mut BudgetTracker,
    ) -> FetchPage {
        let position = cursor.0 as usize;
        if position >= self.listing_depth {
            return FetchPage::finished();
        }

        let listing = match self.listing(target).await {
            Ok(listing) => listing,
            Err(e) => {
                warn!(target, error = %e, "board listing fetch failed");
                return FetchPage::failed(format!("board {}: listing failed: {}", target, e));
            }
        };

        let Some(submission) = listing.get(position) else {
            return FetchPage::finished();
        };

        let end_of_listing = position + 1 >= self.listing_depth.min(listing.len());
        let advance = |aborted: bool| {
            if aborted || end_of_listing {
                None
            } else {
                Some(PageCursor(cursor.0 + 1))
            }
        };

        let now = Utc::now();
        let mut items = Vec::new();

        // Recency gate on the submission itself; its comments go with it.
        if !self.is_recent(submission.created_at, now) {
            debug!(target, submission = %submission.id, "submission outside recency window");
            return FetchPage {
                items,
                next: advance(false),
                warnings: Vec::new(),
            };
        }

        let mut aborted = false;

        if let Some(body) = usable_body(&submission.body) {
            let text = clip_text(body, self.per_item_max_chars);
            if !text.is_empty() {
                if budget.consume(text.chars().count()) {
                    items.push(HarvestedItem {
                        source: SourceKind::Aggregator,
                        kind: ItemKind::Post,
                        text,
                        credibility: submission.score,
                        origin: target.to_string(),
                        timestamp: Some(submission.created_at),
                    });
                } else {
                    aborted = true;
                }
            }
        }

        // Breadth-first over the comment tree: queue seeded with the
        // top-level comments, replies enqueued as discovered.
        let mut queue: VecDeque<(&CommentNode, ItemKind)> = submission
            .comments
            .iter()
            .map(|node| (node, ItemKind::Comment))
            .collect();

        while let Some((node, kind)) = queue.pop_front() {
            if aborted || budget.expired() {
                aborted = true;
                break;
            }

            if let Some(body) = usable_body(&node.body) {
                if self.is_recent(node.created_at, now) {
                    let text = clip_text(body, self.per_item_max_chars);
                    if !text.is_empty() {
                        if !budget.consume(text.chars().count()) {
                            aborted = true;
                            break;
                        }
                        items.push(HarvestedItem {
                            source: SourceKind::Aggregator,
                            kind,
                            text,
                            credibility: node.score,
                            origin: target.to_string(),
                            timestamp: Some(node.created_at),
                        });
                    }
                }
            }

            for reply in &node.replies {
                queue.push_back((reply, ItemKind::Reply));
            }
        }

        FetchPage {
            items,
            next: advance(aborted),
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_body_filters_placeholders() {
        assert!(usable_body(&None).is_none());
        assert!(usable_body(&Some("[deleted]".to_string())).is_none());
        assert!(usable_body(&Some("[removed]".to_string())).is_none());
        assert!(usable_body(&Some("".to_string())).is_none());
        assert_eq!(usable_body(&Some("keep".to_string())), Some("keep"));
    }
}
