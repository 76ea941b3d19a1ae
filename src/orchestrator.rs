//! # Crawl Orchestration
//!
//! Drives one crawl run across every active region: regions are processed in
//! fixed-size concurrent batches, each under its own watchdog, and every
//! region attempt ends as exactly one crawl log row. A region failure never
//! aborts the run; the run's terminal status is derived from the per-region
//! tallies once all batches are done.
//!
//! ## Key Components
//!
//! - `Orchestrator`: owns the fetcher, extractor, classifier and store handles
//! - `RegionCatalog`: where crawl targets come from
//! - `RunOptions` / `RunContext`: caller choices and per-run state
//! - `StopSignal`: cooperative cancellation between batches, one per run

mod catalog;
mod config;
mod context;
mod error;
mod region;

pub use catalog::RegionCatalog;
pub use config::{OrchestratorConfig, OrchestratorConfigBuilder};
pub use context::{RegionProgress, RunContext, RunOptions, StopSignal};
pub use error::OrchestratorError;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::classifier::{Classifier, ClassifyRequest};
use crate::extractor::Extractor;
use crate::fetcher::PageFetcher;
use crate::models::{CrawlLogStatus, CrawlRun, RegionSource};
use crate::store::{Database, NewCrawlLog};
use region::{RegionReport, SharedReport};

/// Outcome of a reclassification sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifySummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Coordinates crawl runs. Cheap to clone; all handles are shared.
#[derive(Clone)]
pub struct Orchestrator {
    db: Database,
    catalog: Arc<dyn RegionCatalog>,
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<Extractor>,
    classifier: Arc<dyn Classifier>,
    config: OrchestratorConfig,
    stops: Arc<Mutex<HashMap<String, StopSignal>>>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        catalog: Arc<dyn RegionCatalog>,
        fetcher: Arc<dyn PageFetcher>,
        extractor: Arc<Extractor>,
        classifier: Arc<dyn Classifier>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            fetcher,
            extractor,
            classifier,
            config,
            stops: Arc::default(),
        }
    }

    /// Stop signal of a run active in this process
    pub fn stop_signal(&self, run_id: &str) -> Option<StopSignal> {
        self.stops
            .lock()
            .ok()
            .and_then(|stops| stops.get(run_id).cloned())
    }

    /// Stop one run after its in-flight batch. False when the run is not
    /// active in this process.
    pub fn stop_run(&self, run_id: &str) -> bool {
        match self.stop_signal(run_id) {
            Some(signal) => {
                signal.stop();
                info!("Stop requested for run {}", run_id);
                true
            }
            None => false,
        }
    }

    /// Stop every active run; returns their ids
    pub fn stop_all(&self) -> Vec<String> {
        let Ok(stops) = self.stops.lock() else {
            return Vec::new();
        };
        stops
            .iter()
            .map(|(run_id, signal)| {
                signal.stop();
                run_id.clone()
            })
            .collect()
    }

    fn register_run(&self, run_id: &str) -> StopSignal {
        match self.stops.lock() {
            Ok(mut stops) => stops.entry(run_id.to_string()).or_default().clone(),
            Err(_) => StopSignal::new(),
        }
    }

    fn unregister_run(&self, run_id: &str) {
        if let Ok(mut stops) = self.stops.lock() {
            stops.remove(run_id);
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Create a `pending` run record and return its id
    #[instrument(skip(self))]
    pub async fn start_run(&self) -> Result<String, OrchestratorError> {
        let run_id = Uuid::new_v4().to_string();
        self.db.create_run(&run_id, 0).await?;
        self.register_run(&run_id);
        info!("Created crawl run {}", run_id);
        Ok(run_id)
    }

    /// Create a run and execute it to completion
    pub async fn run(
        &self,
        options: RunOptions,
        progress: Option<mpsc::Sender<RegionProgress>>,
    ) -> Result<CrawlRun, OrchestratorError> {
        let run_id = self.start_run().await?;
        self.execute_run(&run_id, options, progress).await
    }

    /// Execute a run created by `start_run`. Region failures are recorded,
    /// not returned; only run bookkeeping errors surface, and the run is
    /// closed from its tallies before they do.
    #[instrument(skip(self, options, progress))]
    pub async fn execute_run(
        &self,
        run_id: &str,
        options: RunOptions,
        progress: Option<mpsc::Sender<RegionProgress>>,
    ) -> Result<CrawlRun, OrchestratorError> {
        let stop = self.register_run(run_id);
        let result = self.drive_run(run_id, options, progress, &stop).await;
        self.unregister_run(run_id);

        if let Err(e) = &result {
            error!("Run {} aborted: {}", run_id, e);
            if let Err(close) = self.db.abandon_run(run_id).await {
                error!("Failed to close run {}: {}", run_id, close);
            }
        }
        result
    }

    async fn drive_run(
        &self,
        run_id: &str,
        options: RunOptions,
        progress: Option<mpsc::Sender<RegionProgress>>,
        stop: &StopSignal,
    ) -> Result<CrawlRun, OrchestratorError> {
        let started = Instant::now();
        let ctx = RunContext {
            run_id: run_id.to_string(),
            force: options.force.unwrap_or(self.config.force),
            follow_details: options.follow_details.unwrap_or(self.config.follow_details),
        };

        let regions = match self.catalog.active_regions().await {
            Ok(regions) => select_regions(regions, options.regions.as_deref()),
            Err(e) => {
                error!("Run {} cannot load regions: {}", run_id, e);
                let log = NewCrawlLog {
                    region_code: None,
                    status: CrawlLogStatus::Failed,
                    announcements_found: 0,
                    relevant_found: 0,
                    error_message: Some(e.to_string()),
                    duration_ms: started.elapsed().as_millis() as i64,
                };
                self.db.mark_running(run_id, 0).await?;
                self.db.insert_crawl_log(run_id, &log).await?;
                return Ok(self
                    .db
                    .finalize_run(run_id, started.elapsed().as_millis() as i64)
                    .await?);
            }
        };

        let total = regions.len();
        self.db.mark_running(run_id, total as i64).await?;
        info!(
            "Run {} processing {} regions in batches of {}",
            run_id, total, self.config.batch_size
        );

        let mut completed = 0;
        for batch in regions.chunks(self.config.batch_size.max(1)) {
            if stop.is_stopped() {
                warn!(
                    "Run {} stopped with {} of {} regions done",
                    run_id, completed, total
                );
                break;
            }

            let tasks = batch
                .iter()
                .cloned()
                .map(|region| {
                    let this = self.clone();
                    let ctx = ctx.clone();
                    let watchdog = self.config.region_timeout;
                    tokio::spawn(async move {
                        let region_started = Instant::now();
                        let shared = SharedReport::default();
                        let outcome = tokio::time::timeout(
                            watchdog,
                            this.process_region(&ctx, &region, &shared),
                        )
                        .await;
                        let report = match outcome {
                            Ok(report) => report,
                            Err(_) => {
                                warn!("Region {} timed out after {:?}", region.region_code, watchdog);
                                shared.interrupted(format!("region timed out after {:?}", watchdog))
                            }
                        };
                        (report, region_started.elapsed())
                    })
                })
                .collect::<Vec<_>>();

            let results = future::join_all(tasks).await;

            for (result, region) in results.into_iter().zip(batch) {
                let (report, duration) = match result {
                    Ok(finished) => finished,
                    Err(e) => {
                        error!("Region {} task failed: {}", region.region_code, e);
                        (
                            RegionReport::failed(format!("region task failed: {}", e)),
                            Duration::ZERO,
                        )
                    }
                };
                completed += 1;
                self.record_region(&ctx, region, &report, duration, completed, total, &progress)
                    .await;
            }
        }

        let run = self
            .db
            .finalize_run(run_id, started.elapsed().as_millis() as i64)
            .await?;
        Ok(run)
    }

    /// Write the crawl log for a finished region and report progress.
    /// Bookkeeping failures are logged; the run carries on.
    #[allow(clippy::too_many_arguments)]
    async fn record_region(
        &self,
        ctx: &RunContext,
        region: &RegionSource,
        report: &RegionReport,
        duration: Duration,
        completed: usize,
        total: usize,
        progress: &Option<mpsc::Sender<RegionProgress>>,
    ) {
        let log = report.to_log(&region.region_code, duration);
        let succeeded = log.status != CrawlLogStatus::Failed;
        debug!(
            "Region {} finished: {} ({} found, {} relevant, {} new)",
            region.region_code,
            log.status,
            log.announcements_found,
            log.relevant_found,
            report.new_found
        );

        if let Err(e) = self.db.insert_crawl_log(&ctx.run_id, &log).await {
            error!("Failed to write crawl log for {}: {}", region.region_code, e);
        }
        if let Err(e) = self.db.record_region_outcome(&ctx.run_id, succeeded).await {
            error!("Failed to record outcome for {}: {}", region.region_code, e);
        }

        if let Some(sender) = progress {
            // Receiver may be gone
            let _ = sender
                .send(RegionProgress {
                    region_code: region.region_code.clone(),
                    status: log.status,
                    announcements_found: log.announcements_found,
                    relevant_found: log.relevant_found,
                    completed,
                    total,
                })
                .await;
        }
    }

    /// Retry classification for announcements stored while the classifier
    /// was failing
    #[instrument(skip(self))]
    pub async fn reclassify_pending(
        &self,
        limit: i64,
        concurrency: usize,
    ) -> Result<ReclassifySummary, OrchestratorError> {
        let pending = self.db.pending_reclassification(limit).await?;
        info!("Found {} announcements to reclassify", pending.len());

        let threshold = f64::from(self.extractor.threshold());
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let tasks = pending
            .into_iter()
            .map(|announcement| {
                let permit = semaphore.clone().acquire_owned();
                let classifier = self.classifier.clone();
                let db = self.db.clone();
                tokio::spawn(async move {
                    let _permit = permit
                        .await
                        .map_err(|e| format!("Failed to acquire semaphore: {}", e))?;
                    let request = ClassifyRequest::new(
                        &announcement.title,
                        &announcement.content,
                        &announcement.source_url,
                    )
                    .low_trust(announcement.extraction_confidence <= threshold);
                    let result = classifier
                        .classify(request)
                        .await
                        .map_err(|e| e.to_string())?;
                    db.apply_reclassification(announcement.id, &result)
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok::<i64, String>(announcement.id)
                })
            })
            .collect::<Vec<_>>();

        let mut summary = ReclassifySummary {
            attempted: tasks.len(),
            ..Default::default()
        };
        for result in future::join_all(tasks).await {
            match result {
                Ok(Ok(_)) => summary.succeeded += 1,
                Ok(Err(e)) => {
                    debug!("Reclassification failed: {}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    debug!("Reclassification task failed: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            "Reclassified {}/{} announcements",
            summary.succeeded, summary.attempted
        );
        Ok(summary)
    }
}

/// Keep catalog order; an explicit region list narrows the run
fn select_regions(regions: Vec<RegionSource>, only: Option<&[String]>) -> Vec<RegionSource> {
    match only {
        Some(codes) if !codes.is_empty() => regions
            .into_iter()
            .filter(|r| codes.iter().any(|c| c == &r.region_code))
            .collect(),
        _ => regions,
    }
}
