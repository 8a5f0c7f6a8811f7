//! Harvest orchestration across targets and adapters.
//!
//! Targets are worked strictly in input order, one at a time. Each
//! target gets a fresh [`BudgetTracker`] carrying its own wall-clock
//! slice but drawing items and characters from the run-wide ceilings, so
//! exhausting the global budget cancels the remaining targets
//! symmetrically. Adapter failures degrade to warnings on the report;
//! the run itself always completes with a structurally valid result.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::budget::BudgetTracker;
use crate::config::HarvestConfig;
use crate::models::{HarvestReport, HarvestedItem, SourceKind, Target};
use crate::source::{PageCursor, SourceAdapter};

pub struct Harvester {
    adapters: Vec<Box<dyn SourceAdapter>>,
    config: HarvestConfig,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Self {
        Self {
            adapters: Vec::new(),
            config,
        }
    }

    pub fn register(&mut self, adapter: Box<dyn SourceAdapter>) {
        self.adapters.push(adapter);
    }

    fn adapter_for(&self, kind: SourceKind) -> Option<&dyn SourceAdapter> {
        self.adapters
            .iter()
            .find(|a| a.source() == kind)
            .map(|a| a.as_ref())
    }

    /// Collect items from every target until budgets run out.
    ///
    /// When `return_factor` is off, each target's result list is written
    /// as a JSON artifact instead of being aggregated into the report.
    pub async fn harvest(&self, targets: &[Target]) -> HarvestReport {
        let mut report = HarvestReport::default();
        let mut items_left = self.config.max_items;
        let mut chars_left = self.config.max_chars;

        for target in targets {
            if items_left == 0 || chars_left == 0 {
                debug!(
                    target = %target.id,
                    "run-wide budget exhausted, skipping remaining targets"
                );
                break;
            }

            let Some(adapter) = self.adapter_for(target.source) else {
                warn!(target = %target.id, source = target.source.as_str(), "no adapter registered");
                report.warnings.push(format!(
                    "{} {}: no adapter registered",
                    target.source.as_str(),
                    target.id
                ));
                continue;
            };

            let deadline = Instant::now() + Duration::from_secs(self.config.per_target_secs);
            let mut tracker = BudgetTracker::new(deadline, items_left, chars_left);

            let mut collected: Vec<HarvestedItem> = Vec::new();
            let mut cursor = PageCursor::START;

            loop {
                if tracker.expired() {
                    debug!(target = %target.id, "target budget expired");
                    break;
                }

                let page = adapter.fetch_page(&target.id, cursor, &mut tracker).await;
                report.warnings.extend(page.warnings);
                collected.extend(page.items);

                match page.next {
                    Some(next) => cursor = next,
                    None => break,
                }
            }

            // Global ceilings only ever move down, in adapter-consumed
            // steps, so later targets see what this one left behind.
            items_left = tracker.items_remaining();
            chars_left = tracker.chars_remaining();

            collected.truncate(self.config.max_count);
            info!(
                target = %target.id,
                source = target.source.as_str(),
                items = collected.len(),
                "target harvested"
            );

            if self.config.return_factor {
                report.items.extend(collected);
            } else if let Err(e) = self.dump_target(&collected, &target.id) {
                warn!(target = %target.id, error = %e, "failed to write harvest artifact");
                report
                    .warnings
                    .push(format!("{}: artifact write failed: {}", target.id, e));
            }
        }

        report
    }

    /// Write one JSON artifact per target under the output directory.
    fn dump_target(&self, items: &[HarvestedItem], target_id: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!(
                "Failed to create output dir: {}",
                self.config.output_dir.display()
            )
        })?;
        let path = self.config.output_dir.join(format!("{}.json", target_id));
        let json = serde_json::to_string_pretty(items)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
        info!(path = %path.display(), items = items.len(), "harvest artifact written");
        Ok(path)
    }
}
