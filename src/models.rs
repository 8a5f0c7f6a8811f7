//! Core data models shared by the harvesting and retrieval pipelines.
//!
//! Harvested opinion items are closed tagged types rather than loose JSON
//! maps, so adapters and the aggregation step agree on one shape. Chunks
//! carry their split strategy and a stable identity key used for both
//! storage dedup and rank fusion.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Which external discussion platform an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Paginated comment forum (offset-based comment API).
    Forum,
    /// Link-aggregator with nested comment trees.
    Aggregator,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Forum => "forum",
            SourceKind::Aggregator => "aggregator",
        }
    }
}

/// Position of an item within its discussion structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Post,
    Comment,
    Reply,
}

/// One normalized opinion item produced by a source adapter.
///
/// Immutable once created: adapters build it from already-clipped text,
/// and downstream code only filters or truncates lists of items.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestedItem {
    pub source: SourceKind,
    pub kind: ItemKind,
    /// Normalized text, clipped to the per-item character cap.
    pub text: String,
    /// Vote/score carried over from the source (likes, upvotes).
    pub credibility: i64,
    /// Identifier of the harvest target that produced the item.
    pub origin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A harvest target: one forum thread or one aggregator community.
#[derive(Debug, Clone)]
pub struct Target {
    pub source: SourceKind,
    pub id: String,
}

impl Target {
    pub fn new(source: SourceKind, id: impl Into<String>) -> Self {
        Self {
            source,
            id: id.into(),
        }
    }
}

/// Outcome of a harvest run: collected items plus non-fatal warnings.
///
/// The warnings list lets callers tell "empty because nothing matched"
/// apart from "empty because every page failed".
#[derive(Debug, Default)]
pub struct HarvestReport {
    pub items: Vec<HarvestedItem>,
    pub warnings: Vec<String>,
}

/// Strategy that produced a chunk's boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitMethod {
    Semantic,
    FixedWindow,
}

impl SplitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SplitMethod::Semantic => "semantic",
            SplitMethod::FixedWindow => "fixed_window",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "semantic" => Some(SplitMethod::Semantic),
            "fixed_window" => Some(SplitMethod::FixedWindow),
            _ => None,
        }
    }
}

/// Number of leading characters that participate in a chunk's identity.
pub const KEY_PREFIX_CHARS: usize = 32;

/// One piece of a corpus document, as stored in the dense index and
/// mirrored into the in-memory lexical index.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunk {
    pub content: String,
    /// Corpus-relative path of the file the chunk was cut from.
    pub source_path: String,
    /// Zero-based position within the source file.
    pub index: usize,
    pub split_method: SplitMethod,
}

impl DocumentChunk {
    /// Leading slice of the content used in the identity key.
    pub fn content_prefix(&self) -> String {
        self.content.chars().take(KEY_PREFIX_CHARS).collect()
    }

    /// Identity for dedup: `(source_path, index, content_prefix)`.
    ///
    /// The same key is enforced as a UNIQUE constraint in storage and
    /// used to merge dense/sparse contributions during rank fusion.
    pub fn key(&self) -> String {
        format!(
            "{}#{}#{}",
            self.source_path,
            self.index,
            self.content_prefix()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(content: &str) -> DocumentChunk {
        DocumentChunk {
            content: content.to_string(),
            source_path: "notes/alpha.md".to_string(),
            index: 2,
            split_method: SplitMethod::FixedWindow,
        }
    }

    #[test]
    fn test_key_includes_path_index_prefix() {
        let c = chunk("short content");
        assert_eq!(c.key(), "notes/alpha.md#2#short content");
    }

    #[test]
    fn test_key_prefix_truncates_long_content() {
        let long = "x".repeat(200);
        let c = chunk(&long);
        assert_eq!(c.content_prefix().chars().count(), KEY_PREFIX_CHARS);
        assert!(c.key().len() < long.len());
    }

    #[test]
    fn test_same_identity_same_key() {
        let a = chunk("identical text here");
        let b = chunk("identical text here");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_split_method_roundtrip() {
        assert_eq!(
            SplitMethod::parse(SplitMethod::Semantic.as_str()),
            Some(SplitMethod::Semantic)
        );
        assert_eq!(
            SplitMethod::parse(SplitMethod::FixedWindow.as_str()),
            Some(SplitMethod::FixedWindow)
        );
        assert_eq!(SplitMethod::parse("recursive"), None);
    }

    #[test]
    fn test_item_serializes_tagged_fields() {
        let item = HarvestedItem {
            source: SourceKind::Forum,
            kind: ItemKind::Comment,
            text: "useful advice".to_string(),
            credibility: 12,
            origin: "81964408445".to_string(),
            timestamp: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["source"], "forum");
        assert_eq!(json["kind"], "comment");
        assert!(json.get("timestamp").is_none());
    }
}
