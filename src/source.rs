//! Uniform source-adapter capability.
//!
//! Every adapter fetches one page of work at a time under budget
//! control: the harvester checks the tracker between pages, the adapter
//! checks it between items. Transient source failures never surface as
//! `Err` — the adapter logs, attaches a warning to the page, and yields
//! nothing for that unit of work.

use async_trait::async_trait;

use crate::budget::BudgetTracker;
use crate::models::{HarvestedItem, SourceKind};

/// Opaque pagination position. For the forum this is a comment offset;
/// for the link-aggregator it is a listing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor(pub u64);

impl PageCursor {
    pub const START: PageCursor = PageCursor(0);
}

/// One unit of adapter work: the items that fit the budget, the cursor
/// to continue from (`None` = this target is finished), and any
/// non-fatal warnings collected along the way.
#[derive(Debug, Default)]
pub struct FetchPage {
    pub items: Vec<HarvestedItem>,
    pub next: Option<PageCursor>,
    pub warnings: Vec<String>,
}

impl FetchPage {
    pub fn finished() -> Self {
        Self::default()
    }

    pub fn failed(warning: String) -> Self {
        Self {
            items: Vec::new(),
            next: None,
            warnings: vec![warning],
        }
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceKind;

    /// Fetch the page at `cursor` for `target`, offering every candidate
    /// item to `budget` before including it.
    async fn fetch_page(
        &self,
        target: &str,
        cursor: PageCursor,
        budget: &mut BudgetTracker,
    ) -> FetchPage;
}
