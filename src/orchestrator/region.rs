//! Single-region pipeline: fetch, extract, classify, persist

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use super::{Orchestrator, RunContext};
use crate::classifier::ClassifyRequest;
use crate::extractor::PageAnalysis;
use crate::fetcher::{FetchError, FetchedPage};
use crate::models::{CrawlLogStatus, RegionSource};
use crate::store::{AnnouncementRecord, NewCrawlLog};

const FALLBACK_TITLE_CHARS: usize = 100;

/// Tallies for one region attempt, turned into a crawl log row
#[derive(Debug, Clone, Default)]
pub(crate) struct RegionReport {
    pub announcements_found: i64,
    pub relevant_found: i64,
    pub new_found: i64,
    pub units: usize,
    pub detail_links: usize,
    pub detail_failures: usize,
    pub classification_failures: usize,
    pub fatal: Option<String>,
    /// Cut short by the watchdog; tallies cover what was persisted before
    pub interrupted: Option<String>,
}

impl RegionReport {
    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        Self {
            fatal: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Failed on a fatal error, when every detail page failed, or when every
    /// unit failed classification; partial when only some stages failed.
    /// An interrupted region is partial if anything was persisted.
    pub(crate) fn status(&self) -> CrawlLogStatus {
        if self.fatal.is_some() {
            return CrawlLogStatus::Failed;
        }
        if self.interrupted.is_some() {
            return if self.announcements_found > 0 {
                CrawlLogStatus::Partial
            } else {
                CrawlLogStatus::Failed
            };
        }
        if self.detail_links > 0 && self.detail_failures == self.detail_links {
            return CrawlLogStatus::Failed;
        }
        if self.units > 0 && self.classification_failures == self.units {
            return CrawlLogStatus::Failed;
        }
        if self.detail_failures > 0 || self.classification_failures > 0 {
            return CrawlLogStatus::Partial;
        }
        CrawlLogStatus::Success
    }

    pub(crate) fn error_message(&self) -> Option<String> {
        if let Some(fatal) = &self.fatal {
            return Some(fatal.clone());
        }
        let mut parts: Vec<String> = self.interrupted.iter().cloned().collect();
        if self.detail_failures > 0 {
            parts.push(format!(
                "{}/{} detail pages failed",
                self.detail_failures, self.detail_links
            ));
        }
        if self.classification_failures > 0 {
            parts.push(format!(
                "{}/{} classifications failed",
                self.classification_failures, self.units
            ));
        }
        (!parts.is_empty()).then(|| parts.join("; "))
    }

    pub(crate) fn to_log(&self, region_code: &str, duration: Duration) -> NewCrawlLog {
        NewCrawlLog {
            region_code: Some(region_code.to_string()),
            status: self.status(),
            announcements_found: self.announcements_found,
            relevant_found: self.relevant_found,
            error_message: self.error_message(),
            duration_ms: duration.as_millis() as i64,
        }
    }
}

/// Region tallies readable from outside the region task, so a watchdog
/// timeout still accounts for rows already written
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedReport(Arc<Mutex<RegionReport>>);

impl SharedReport {
    fn publish(&self, report: &RegionReport) {
        if let Ok(mut shared) = self.0.lock() {
            *shared = report.clone();
        }
    }

    /// Last published tallies, marked as interrupted
    pub(crate) fn interrupted(&self, reason: impl Into<String>) -> RegionReport {
        let mut report = self
            .0
            .lock()
            .map(|shared| shared.clone())
            .unwrap_or_default();
        report.interrupted = Some(reason.into());
        report
    }
}

/// SHA-256 hex digest used for change detection
pub(crate) fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn fallback_title(content: &str, source_url: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.chars().take(FALLBACK_TITLE_CHARS).collect())
        .unwrap_or_else(|| source_url.to_string())
}

impl Orchestrator {
    /// Fetch a page, retrying timeouts and navigation errors with
    /// exponential backoff. Blocks are not retried.
    pub(crate) async fn fetch_with_retry(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetcher.fetch(url, self.config.fetch_mode).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_retryable() && attempt < self.config.fetch_retries => {
                    let delay = self.config.fetch_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        "Fetch of {} failed (attempt {}): {}; retrying in {:?}",
                        url,
                        attempt + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one region end to end. Never returns an error; every failure
    /// is folded into the report, which is also published to `shared` after
    /// each persisted unit.
    #[instrument(skip(self, ctx, region, shared), fields(run_id = %ctx.run_id, region = %region.region_code))]
    pub(crate) async fn process_region(
        &self,
        ctx: &RunContext,
        region: &RegionSource,
        shared: &SharedReport,
    ) -> RegionReport {
        let mut report = RegionReport::default();

        let page = match self.fetch_with_retry(&region.url).await {
            Ok(page) => page,
            Err(e) => {
                warn!("Region {} unreachable: {}", region.region_code, e);
                return RegionReport::failed(e.to_string());
            }
        };

        let analysis = self
            .extractor
            .analyze(&page.html, &page.final_url, region.is_listing);
        debug!(
            "Region {} analysed: listing={}, links={}, method={:?}, confidence={:.2}",
            region.region_code,
            analysis.is_listing,
            analysis.detail_links.urls.len(),
            analysis.content.method,
            analysis.content.confidence
        );

        let follow = analysis.is_listing && ctx.follow_details && !analysis.detail_links.urls.is_empty();
        if !follow {
            // Single announcement page, or a listing with nothing to follow
            self.process_unit(ctx, region, &region.url, analysis, &mut report)
                .await;
            shared.publish(&report);
            return report;
        }

        let links = analysis.detail_links.urls;
        report.detail_links = links.len();
        shared.publish(&report);
        for link in &links {
            match self.fetch_with_retry(link).await {
                Ok(detail) => {
                    let detail_analysis = self.extractor.analyze(&detail.html, &detail.final_url, false);
                    self.process_unit(ctx, region, link, detail_analysis, &mut report)
                        .await;
                }
                Err(e) => {
                    warn!("Detail page {} failed: {}", link, e);
                    report.detail_failures += 1;
                }
            }
            shared.publish(&report);
            if report.fatal.is_some() {
                break;
            }
        }

        report
    }

    /// Classify and persist one announcement page
    async fn process_unit(
        &self,
        ctx: &RunContext,
        region: &RegionSource,
        source_url: &str,
        analysis: PageAnalysis,
        report: &mut RegionReport,
    ) {
        let low_trust = analysis.content.is_low_trust();
        let content = analysis.content.text;
        let hash = content_hash(&content);
        let title = analysis
            .title
            .unwrap_or_else(|| fallback_title(&content, source_url));
        if low_trust {
            debug!(
                "Low-confidence extraction ({:.2}) for {}",
                analysis.content.confidence, source_url
            );
        }

        let existing = match self.db.find_by_key(&region.region_code, source_url).await {
            Ok(existing) => existing,
            Err(e) => {
                report.fatal = Some(e.to_string());
                return;
            }
        };

        if let Some(existing) = &existing {
            let unchanged = existing.content_hash.as_deref() == Some(hash.as_str());
            if unchanged && !existing.needs_reclassification && !ctx.force {
                debug!("Unchanged content at {}, skipping classification", source_url);
                if let Err(e) = self.db.touch_announcement(&ctx.run_id, existing.id).await {
                    report.fatal = Some(e.to_string());
                    return;
                }
                report.announcements_found += 1;
                if existing.is_relevant {
                    report.relevant_found += 1;
                }
                return;
            }
        }

        report.units += 1;
        let request = ClassifyRequest::new(&title, &content, source_url).low_trust(low_trust);
        let classification = match self.classifier.classify(request).await {
            Ok(result) => Some(result),
            Err(e) => {
                warn!("Classification of {} failed: {}", source_url, e);
                report.classification_failures += 1;
                None
            }
        };
        let relevant = classification.as_ref().is_some_and(|c| c.is_relevant);

        let record = AnnouncementRecord {
            region_code: region.region_code.clone(),
            region_name: region.region_name.clone(),
            region_type: region.region_type,
            title,
            content,
            source_url: source_url.to_string(),
            content_hash: hash,
            extraction_confidence: f64::from(analysis.content.confidence),
            classification,
        };

        match self.db.upsert_announcement(&ctx.run_id, &record).await {
            Ok(outcome) => {
                report.announcements_found += 1;
                if relevant {
                    report.relevant_found += 1;
                }
                if outcome.is_new() {
                    report.new_found += 1;
                    info!("New announcement {} from {}", outcome.id(), source_url);
                }
            }
            Err(e) => {
                report.fatal = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("지원사업 공고");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("지원사업 공고"));
        assert_ne!(a, content_hash("지원사업 공고 "));
    }

    #[test]
    fn test_fallback_title() {
        assert_eq!(fallback_title("\n  첫 줄\n둘째 줄", "http://x"), "첫 줄");
        assert_eq!(fallback_title("   ", "http://x"), "http://x");
    }

    #[test]
    fn test_report_status() {
        assert_eq!(RegionReport::default().status(), CrawlLogStatus::Success);
        assert_eq!(RegionReport::failed("boom").status(), CrawlLogStatus::Failed);

        let partial = RegionReport {
            detail_links: 3,
            detail_failures: 1,
            units: 2,
            ..Default::default()
        };
        assert_eq!(partial.status(), CrawlLogStatus::Partial);
        assert_eq!(
            partial.error_message().as_deref(),
            Some("1/3 detail pages failed")
        );

        let all_details = RegionReport {
            detail_links: 2,
            detail_failures: 2,
            ..Default::default()
        };
        assert_eq!(all_details.status(), CrawlLogStatus::Failed);

        let all_classifications = RegionReport {
            units: 1,
            classification_failures: 1,
            ..Default::default()
        };
        assert_eq!(all_classifications.status(), CrawlLogStatus::Failed);
    }

    #[test]
    fn test_interrupted_report_keeps_published_tallies() {
        let shared = SharedReport::default();
        shared.publish(&RegionReport {
            announcements_found: 2,
            relevant_found: 1,
            new_found: 2,
            detail_links: 3,
            units: 2,
            ..Default::default()
        });

        let report = shared.interrupted("region timed out after 1s");
        assert_eq!(report.status(), CrawlLogStatus::Partial);
        assert_eq!(report.announcements_found, 2);
        assert_eq!(report.relevant_found, 1);
        assert_eq!(
            report.error_message().as_deref(),
            Some("region timed out after 1s")
        );

        let nothing = SharedReport::default().interrupted("region timed out after 1s");
        assert_eq!(nothing.status(), CrawlLogStatus::Failed);
    }
}
