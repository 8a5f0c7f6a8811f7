use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use tempfile::TempDir;

use voxpop::budget::BudgetTracker;
use voxpop::config::HarvestConfig;
use voxpop::harvest::Harvester;
use voxpop::models::{ItemKind, SourceKind, Target};
use voxpop::source::{PageCursor, SourceAdapter};
use voxpop::source_board::{BoardAdapter, BoardClient, CommentNode, Submission};
use voxpop::source_forum::{CommentPage, ForumAdapter, ForumApi, RawComment};

fn test_config() -> HarvestConfig {
    HarvestConfig {
        per_target_secs: 30,
        max_count: 50,
        max_items: 1000,
        max_chars: 100_000,
        per_item_max_chars: 200,
        page_delay_ms: 0,
        listing_depth: 5,
        recency_months: 3,
        ..HarvestConfig::default()
    }
}

fn comment(text: &str) -> RawComment {
    RawComment {
        content: text.to_string(),
        like_count: 1,
        created_time: Some(1_700_000_000),
    }
}

fn page(texts: &[&str], is_end: bool) -> CommentPage {
    CommentPage {
        comments: texts.iter().map(|t| comment(t)).collect(),
        is_end,
    }
}

// ============ Forum mocks ============

struct ScriptedForum {
    pages: HashMap<(String, u64), CommentPage>,
    calls: AtomicUsize,
}

impl ScriptedForum {
    fn new(pages: Vec<(&str, u64, CommentPage)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(target, offset, page)| ((target.to_string(), offset), page))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ForumApi for ScriptedForum {
    async fn fetch_comments(&self, target: &str, _limit: u32, offset: u64) -> Result<CommentPage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .get(&(target.to_string(), offset))
            .cloned()
            .unwrap_or(CommentPage {
                comments: Vec::new(),
                is_end: true,
            }))
    }
}

/// Fails for one target, serves a single page for the others.
struct PartiallyBrokenForum {
    bad_target: String,
}

#[async_trait]
impl ForumApi for PartiallyBrokenForum {
    async fn fetch_comments(&self, target: &str, _limit: u32, offset: u64) -> Result<CommentPage> {
        if target == self.bad_target {
            anyhow::bail!("connection reset by peer");
        }
        if offset == 0 {
            Ok(page(&["survivor opinion"], true))
        } else {
            Ok(page(&[], true))
        }
    }
}

// ============ Board mocks ============

struct StaticBoard {
    submissions: Vec<Submission>,
}

#[async_trait]
impl BoardClient for StaticBoard {
    async fn top_submissions(&self, _target: &str, limit: usize) -> Result<Vec<Submission>> {
        Ok(self.submissions.iter().take(limit).cloned().collect())
    }
}

fn node(body: &str, days_old: i64, replies: Vec<CommentNode>) -> CommentNode {
    CommentNode {
        body: Some(body.to_string()),
        score: 2,
        created_at: Utc::now() - ChronoDuration::days(days_old),
        replies,
    }
}

fn submission(body: Option<&str>, days_old: i64, comments: Vec<CommentNode>) -> Submission {
    Submission {
        id: "s1".to_string(),
        title: "a question".to_string(),
        body: body.map(|b| b.to_string()),
        score: 10,
        created_at: Utc::now() - ChronoDuration::days(days_old),
        comments,
    }
}

// ============ Forum tests ============

#[tokio::test]
async fn test_forum_paginates_until_empty_end_page() {
    let api = Arc::new(ScriptedForum::new(vec![
        ("t1", 0, page(&["first", "second"], false)),
        // End reported alongside items: the caller must advance once more.
        ("t1", 20, page(&["third"], true)),
        ("t1", 40, page(&[], true)),
    ]));
    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(ForumAdapter::new(api.clone(), &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Forum, "t1")])
        .await;

    let texts: Vec<&str> = report.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);
    assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    assert!(report.warnings.is_empty());
    assert!(report
        .items
        .iter()
        .all(|i| i.source == SourceKind::Forum && i.kind == ItemKind::Comment));
}

#[tokio::test]
async fn test_forum_page_fetch_is_idempotent() {
    let api = Arc::new(ScriptedForum::new(vec![(
        "t1",
        0,
        page(&["alpha", "beta"], false),
    )]));
    let config = test_config();
    let adapter = ForumAdapter::new(api, &config);

    let mut tracker_a = BudgetTracker::new(Instant::now() + Duration::from_secs(60), 100, 10_000);
    let mut tracker_b = BudgetTracker::new(Instant::now() + Duration::from_secs(60), 100, 10_000);

    let first = adapter.fetch_page("t1", PageCursor::START, &mut tracker_a).await;
    let second = adapter.fetch_page("t1", PageCursor::START, &mut tracker_b).await;

    let texts_a: Vec<&str> = first.items.iter().map(|i| i.text.as_str()).collect();
    let texts_b: Vec<&str> = second.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts_a, texts_b);
    assert_eq!(first.next, second.next);
}

#[tokio::test]
async fn test_forum_failure_degrades_to_warning_and_next_target() {
    let api = Arc::new(PartiallyBrokenForum {
        bad_target: "broken".to_string(),
    });
    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(ForumAdapter::new(api, &config)));

    let report = harvester
        .harvest(&[
            Target::new(SourceKind::Forum, "broken"),
            Target::new(SourceKind::Forum, "healthy"),
        ])
        .await;

    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].text, "survivor opinion");
    assert_eq!(report.items[0].origin, "healthy");
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("broken"));
}

#[tokio::test]
async fn test_per_target_item_cap_truncates() {
    let many: Vec<String> = (0..12).map(|i| format!("opinion number {}", i)).collect();
    let many_refs: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
    let api = Arc::new(ScriptedForum::new(vec![(
        "t1",
        0,
        page(&many_refs, true),
    )]));
    let mut config = test_config();
    config.max_count = 3;
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(ForumAdapter::new(api, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Forum, "t1")])
        .await;

    assert_eq!(report.items.len(), 3);
    // Traversal order preserved under truncation.
    assert_eq!(report.items[0].text, "opinion number 0");
}

#[tokio::test]
async fn test_char_budget_never_exceeded() {
    let many: Vec<String> = (0..40).map(|i| format!("a fairly long opinion body {}", i)).collect();
    let many_refs: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
    let api = Arc::new(ScriptedForum::new(vec![(
        "t1",
        0,
        page(&many_refs, true),
    )]));
    let mut config = test_config();
    config.max_chars = 120;
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(ForumAdapter::new(api, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Forum, "t1")])
        .await;

    let total: usize = report.items.iter().map(|i| i.text.chars().count()).sum();
    assert!(total <= 120, "char budget exceeded: {}", total);
    assert!(!report.items.is_empty());
}

#[tokio::test]
async fn test_global_item_cap_shared_across_targets() {
    let api = Arc::new(ScriptedForum::new(vec![
        ("t1", 0, page(&["one", "two", "three", "four"], true)),
        ("t2", 0, page(&["five", "six"], true)),
    ]));
    let mut config = test_config();
    config.max_items = 3;
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(ForumAdapter::new(api, &config)));

    let report = harvester
        .harvest(&[
            Target::new(SourceKind::Forum, "t1"),
            Target::new(SourceKind::Forum, "t2"),
        ])
        .await;

    assert_eq!(report.items.len(), 3);
    assert!(report.items.iter().all(|i| i.origin == "t1"));
}

#[tokio::test]
async fn test_unregistered_source_becomes_warning() {
    let config = test_config();
    let harvester = Harvester::new(config);

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "lonely")])
        .await;

    assert!(report.items.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("no adapter registered"));
}

#[tokio::test]
async fn test_artifact_mode_writes_one_file_per_target() {
    let tmp = TempDir::new().unwrap();
    let api = Arc::new(ScriptedForum::new(vec![(
        "t1",
        0,
        page(&["persisted opinion"], true),
    )]));
    let mut config = test_config();
    config.return_factor = false;
    config.output_dir = tmp.path().join("factors");
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(ForumAdapter::new(api, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Forum, "t1")])
        .await;

    assert!(report.items.is_empty());
    let artifact = tmp.path().join("factors").join("t1.json");
    assert!(artifact.exists());

    let parsed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&artifact).unwrap()).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["text"], "persisted opinion");
}

// ============ Board tests ============

#[tokio::test]
async fn test_board_breadth_first_order_and_kinds() {
    let client = Arc::new(StaticBoard {
        submissions: vec![submission(
            Some("the post body"),
            1,
            vec![
                node("c1", 1, vec![node("r1a", 1, vec![]), node("r1b", 1, vec![])]),
                node("c2", 1, vec![node("r2a", 1, vec![])]),
            ],
        )],
    });
    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(BoardAdapter::new(client, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "advice")])
        .await;

    let texts: Vec<&str> = report.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["the post body", "c1", "c2", "r1a", "r1b", "r2a"]);

    let kinds: Vec<ItemKind> = report.items.iter().map(|i| i.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ItemKind::Post,
            ItemKind::Comment,
            ItemKind::Comment,
            ItemKind::Reply,
            ItemKind::Reply,
            ItemKind::Reply,
        ]
    );
}

#[tokio::test]
async fn test_board_excludes_items_outside_recency_window() {
    let client = Arc::new(StaticBoard {
        submissions: vec![submission(
            None,
            1,
            vec![
                node("fresh take", 10, vec![]),
                // 3-month window at 30 days per month = 90 days.
                node("stale take", 120, vec![]),
            ],
        )],
    });
    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(BoardAdapter::new(client, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "advice")])
        .await;

    let texts: Vec<&str> = report.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["fresh take"]);
}

#[tokio::test]
async fn test_board_skips_old_submission_entirely() {
    let client = Arc::new(StaticBoard {
        submissions: vec![submission(
            Some("ancient post"),
            365,
            vec![node("comment on ancient post", 1, vec![])],
        )],
    });
    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(BoardAdapter::new(client, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "advice")])
        .await;

    assert!(report.items.is_empty());
}

#[tokio::test]
async fn test_board_deleted_placeholders_skipped_but_replies_visited() {
    let mut deleted = node("ignored", 1, vec![node("reply under deleted", 1, vec![])]);
    deleted.body = Some("[deleted]".to_string());

    let client = Arc::new(StaticBoard {
        submissions: vec![submission(None, 1, vec![deleted])],
    });
    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(BoardAdapter::new(client, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "advice")])
        .await;

    let texts: Vec<&str> = report.items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["reply under deleted"]);
}

#[tokio::test]
async fn test_board_budget_aborts_traversal_mid_tree() {
    let client = Arc::new(StaticBoard {
        submissions: vec![submission(
            Some("the post"),
            1,
            (0..10).map(|i| node(&format!("comment {}", i), 1, vec![])).collect(),
        )],
    });
    let mut config = test_config();
    config.max_items = 2;
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(BoardAdapter::new(client, &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "advice")])
        .await;

    // Post plus one comment; the rest of the queue is discarded.
    assert_eq!(report.items.len(), 2);
    assert_eq!(report.items[0].text, "the post");
    assert_eq!(report.items[1].text, "comment 0");
}

#[tokio::test]
async fn test_board_listing_failure_degrades_to_warning() {
    struct FailingBoard;

    #[async_trait]
    impl BoardClient for FailingBoard {
        async fn top_submissions(&self, _target: &str, _limit: usize) -> Result<Vec<Submission>> {
            anyhow::bail!("session expired")
        }
    }

    let config = test_config();
    let mut harvester = Harvester::new(config.clone());
    harvester.register(Box::new(BoardAdapter::new(Arc::new(FailingBoard), &config)));

    let report = harvester
        .harvest(&[Target::new(SourceKind::Aggregator, "advice")])
        .await;

    assert!(report.items.is_empty());
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("session expired"));
}
