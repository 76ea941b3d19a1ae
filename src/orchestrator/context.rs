//! Per-run state passed through the pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::models::CrawlLogStatus;

/// Cooperative stop request for one run. Checked between batches; regions
/// already in flight finish and write their logs.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop after its in-flight batch
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller choices for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Reclassify URLs whose content is unchanged since a prior run
    pub force: Option<bool>,

    /// Follow detail links on listing pages
    pub follow_details: Option<bool>,

    /// Restrict the run to these region codes
    pub regions: Option<Vec<String>>,
}

/// Explicit crawl-run context. Dedup decisions are made against the store,
/// not against in-memory state, so a restarted process behaves the same.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub force: bool,
    pub follow_details: bool,
}

/// Emitted once per finished region
#[derive(Debug, Clone, Serialize)]
pub struct RegionProgress {
    pub region_code: String,
    pub status: CrawlLogStatus,
    pub announcements_found: i64,
    pub relevant_found: i64,
    pub completed: usize,
    pub total: usize,
}
