//! Announcement deduplication and upsert

use chrono::NaiveDate;
use libsql::{Value, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::classifier::GeminiAnalysisResult;
use crate::models::{Announcement, AnnouncementStatus, RegionType};
use crate::store::database::{
    ANNOUNCEMENT_COLUMNS, Database, col_bool, col_i64, col_opt_text, flag, int, now, opt_real,
    opt_text, row_to_announcement, text,
};
use crate::store::error::DbError;

/// One crawled announcement ready to persist
#[derive(Debug, Clone)]
pub struct AnnouncementRecord {
    pub region_code: String,
    pub region_name: String,
    pub region_type: RegionType,
    pub title: String,
    pub content: String,
    pub source_url: String,
    /// SHA-256 hex of `content`
    pub content_hash: String,
    pub extraction_confidence: f64,
    /// `None` when classification failed; the row is then stored as not
    /// relevant and flagged for reclassification
    pub classification: Option<GeminiAnalysisResult>,
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created
    Inserted { id: i64 },
    /// An existing row was refreshed
    Updated { id: i64 },
}

impl UpsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            UpsertOutcome::Inserted { id } | UpsertOutcome::Updated { id } => *id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, UpsertOutcome::Inserted { .. })
    }
}

/// Dedup state of an already stored announcement
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingAnnouncement {
    pub id: i64,
    pub content_hash: Option<String>,
    pub needs_reclassification: bool,
    pub is_relevant: bool,
}

/// Operator-owned fields; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperatorUpdate {
    pub status: Option<AnnouncementStatus>,
    pub is_read: Option<bool>,
    pub notes: Option<String>,
}

/// Classification columns in table order: start, end, budget, target,
/// support amount, is_relevant, relevance_score, keywords_matched,
/// needs_reclassification
fn classification_values(result: Option<&GeminiAnalysisResult>) -> Result<Vec<Value>, DbError> {
    Ok(match result {
        Some(r) => {
            let info = &r.extracted_info;
            let keywords = serde_json::to_string(&r.keywords_matched)
                .map_err(|e| DbError::Data(format!("Failed to encode keywords: {}", e)))?;
            vec![
                opt_text(info.application_period_start.as_deref()),
                opt_text(info.application_period_end.as_deref()),
                opt_text(info.budget.as_deref()),
                opt_text(info.target_description.as_deref()),
                opt_text(info.support_amount.as_deref()),
                flag(r.is_relevant),
                opt_real(Some(r.relevance_score)),
                text(keywords),
                flag(false),
            ]
        }
        None => vec![
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            flag(false),
            Value::Null,
            text("[]"),
            flag(true),
        ],
    })
}

impl Database {
    /// Look up dedup state by `(region_code, source_url)`
    pub async fn find_by_key(
        &self,
        region_code: &str,
        source_url: &str,
    ) -> Result<Option<ExistingAnnouncement>, DbError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, content_hash, needs_reclassification, is_relevant
                 FROM announcements WHERE region_code = ? AND source_url = ?",
                params![region_code, source_url],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to look up announcement: {}", e)))?;

        match rows.next().await? {
            Some(row) => Ok(Some(ExistingAnnouncement {
                id: col_i64(&row, 0, "id")?,
                content_hash: col_opt_text(&row, 1, "content_hash")?,
                needs_reclassification: col_bool(&row, 2, "needs_reclassification")?,
                is_relevant: col_bool(&row, 3, "is_relevant")?,
            })),
            None => Ok(None),
        }
    }

    /// Insert or refresh an announcement for `run_id`.
    ///
    /// A new key inserts and bumps the run's `new_announcement_count`. An
    /// existing key refreshes content, classification, `crawl_run_id` and
    /// `crawled_at` but never `status`, `is_read` or `notes`. Processing the
    /// same URL twice in one run counts it once.
    #[instrument(skip(self, record), fields(region_code = %record.region_code, url = %record.source_url))]
    pub async fn upsert_announcement(
        &self,
        run_id: &str,
        record: &AnnouncementRecord,
    ) -> Result<UpsertOutcome, DbError> {
        let _guard = self.write_lock.lock().await;
        let timestamp = now();

        let existing = self.find_by_key(&record.region_code, &record.source_url).await?;
        let outcome = match existing {
            Some(existing) => {
                self.update_announcement(existing.id, run_id, record, &timestamp).await?;
                UpsertOutcome::Updated { id: existing.id }
            }
            None => match self.insert_announcement(run_id, record, &timestamp).await? {
                Some(id) => UpsertOutcome::Inserted { id },
                None => {
                    // Lost a race on the unique key: treat as an update
                    let existing = self
                        .find_by_key(&record.region_code, &record.source_url)
                        .await?
                        .ok_or_else(|| {
                            DbError::NotFound(format!("announcement {}", record.source_url))
                        })?;
                    self.update_announcement(existing.id, run_id, record, &timestamp).await?;
                    UpsertOutcome::Updated { id: existing.id }
                }
            },
        };

        let first_touch = self.record_touch(run_id, outcome.id(), outcome.is_new()).await?;
        if outcome.is_new() && first_touch {
            self.conn
                .execute(
                    "UPDATE crawl_runs SET new_announcement_count = new_announcement_count + 1
                     WHERE run_id = ?",
                    params![run_id],
                )
                .await
                .map_err(|e| DbError::Query(format!("Failed to count new announcement: {}", e)))?;
        }

        debug!(?outcome, "Upserted announcement");
        Ok(outcome)
    }

    /// Returns the new id, or `None` when the key already exists
    async fn insert_announcement(
        &self,
        run_id: &str,
        record: &AnnouncementRecord,
        timestamp: &str,
    ) -> Result<Option<i64>, DbError> {
        let mut values = vec![
            text(record.region_code.as_str()),
            text(record.region_name.as_str()),
            text(record.region_type.as_str()),
            text(record.title.as_str()),
            text(record.content.as_str()),
            text(record.source_url.as_str()),
        ];
        values.extend(classification_values(record.classification.as_ref())?);
        values.extend([
            text(record.content_hash.as_str()),
            opt_real(Some(record.extraction_confidence)),
            text(run_id),
            text(timestamp),
            text(timestamp),
            text(timestamp),
        ]);

        let mut rows = self
            .conn
            .query(
                "INSERT INTO announcements (
                    region_code, region_name, region_type, title, content, source_url,
                    application_period_start, application_period_end, budget,
                    target_description, support_amount, is_relevant, relevance_score,
                    keywords_matched, needs_reclassification,
                    content_hash, extraction_confidence, crawl_run_id, crawled_at,
                    created_at, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (region_code, source_url) DO NOTHING
                 RETURNING id",
                values,
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to insert announcement: {}", e)))?;

        match rows.next().await? {
            Some(row) => Ok(Some(col_i64(&row, 0, "id")?)),
            None => Ok(None),
        }
    }

    async fn update_announcement(
        &self,
        id: i64,
        run_id: &str,
        record: &AnnouncementRecord,
        timestamp: &str,
    ) -> Result<(), DbError> {
        let mut values = vec![
            text(record.region_name.as_str()),
            text(record.region_type.as_str()),
            text(record.title.as_str()),
            text(record.content.as_str()),
        ];
        values.extend(classification_values(record.classification.as_ref())?);
        values.extend([
            text(record.content_hash.as_str()),
            opt_real(Some(record.extraction_confidence)),
            text(run_id),
            text(timestamp),
            text(timestamp),
            int(id),
        ]);

        self.conn
            .execute(
                "UPDATE announcements SET
                    region_name = ?, region_type = ?, title = ?, content = ?,
                    application_period_start = ?, application_period_end = ?, budget = ?,
                    target_description = ?, support_amount = ?, is_relevant = ?,
                    relevance_score = ?, keywords_matched = ?, needs_reclassification = ?,
                    content_hash = ?, extraction_confidence = ?, crawl_run_id = ?,
                    crawled_at = ?, updated_at = ?
                 WHERE id = ?",
                values,
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update announcement: {}", e)))?;
        Ok(())
    }

    /// Insert the run ledger row; true when this run had not touched the
    /// announcement before
    async fn record_touch(&self, run_id: &str, id: i64, is_new: bool) -> Result<bool, DbError> {
        let inserted = self
            .conn
            .execute(
                "INSERT OR IGNORE INTO run_announcements (run_id, announcement_id, is_new)
                 VALUES (?, ?, ?)",
                vec![text(run_id), int(id), flag(is_new)],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to record run touch: {}", e)))?;
        Ok(inserted > 0)
    }

    /// Mark an unchanged announcement as seen by `run_id` without touching
    /// its content or classification
    pub async fn touch_announcement(&self, run_id: &str, id: i64) -> Result<(), DbError> {
        let _guard = self.write_lock.lock().await;
        let timestamp = now();
        self.conn
            .execute(
                "UPDATE announcements SET crawl_run_id = ?, crawled_at = ?, updated_at = ? WHERE id = ?",
                vec![text(run_id), text(timestamp.as_str()), text(timestamp.as_str()), int(id)],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to touch announcement: {}", e)))?;
        self.record_touch(run_id, id, false).await?;
        Ok(())
    }

    /// Fetch one announcement
    pub async fn get_announcement(&self, id: i64) -> Result<Option<Announcement>, DbError> {
        let sql = format!("SELECT {} FROM announcements a WHERE a.id = ?", ANNOUNCEMENT_COLUMNS);
        let mut rows = self.execute_query(&sql, params![id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_announcement(&row)?)),
            None => Ok(None),
        }
    }

    /// Apply an operator edit. Returns false if the id does not exist.
    #[instrument(skip(self))]
    pub async fn update_operator_fields(
        &self,
        id: i64,
        update: &OperatorUpdate,
    ) -> Result<bool, DbError> {
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "UPDATE announcements SET
                    status = COALESCE(?, status),
                    is_read = COALESCE(?, is_read),
                    notes = COALESCE(?, notes),
                    updated_at = ?
                 WHERE id = ?",
                vec![
                    opt_text(update.status.map(|s| s.as_str())),
                    update.is_read.map(flag).unwrap_or(Value::Null),
                    opt_text(update.notes.as_deref()),
                    text(now()),
                    int(id),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to update announcement: {}", e)))?;
        Ok(changed > 0)
    }

    /// Move system-owned `new` rows whose application period ended before
    /// `today` to `expired`. Operator statuses are left alone.
    #[instrument(skip(self))]
    pub async fn mark_expired(&self, today: NaiveDate) -> Result<u64, DbError> {
        let _guard = self.write_lock.lock().await;
        let changed = self
            .conn
            .execute(
                "UPDATE announcements SET status = 'expired', updated_at = ?
                 WHERE status = 'new'
                   AND application_period_end IS NOT NULL
                   AND application_period_end < ?",
                vec![text(now()), text(today.format("%Y-%m-%d").to_string())],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to expire announcements: {}", e)))?;
        Ok(changed)
    }

    /// Announcements whose classification failed, oldest first
    pub async fn pending_reclassification(&self, limit: i64) -> Result<Vec<Announcement>, DbError> {
        let sql = format!(
            "SELECT {} FROM announcements a WHERE a.needs_reclassification = 1
             ORDER BY a.crawled_at ASC LIMIT ?",
            ANNOUNCEMENT_COLUMNS
        );
        let mut rows = self.execute_query(&sql, params![limit]).await?;
        let mut announcements = Vec::new();
        while let Some(row) = rows.next().await? {
            announcements.push(row_to_announcement(&row)?);
        }
        Ok(announcements)
    }

    /// Store a successful reclassification and clear the flag
    pub async fn apply_reclassification(
        &self,
        id: i64,
        result: &GeminiAnalysisResult,
    ) -> Result<(), DbError> {
        let _guard = self.write_lock.lock().await;
        let mut values = classification_values(Some(result))?;
        values.extend([text(now()), int(id)]);
        self.conn
            .execute(
                "UPDATE announcements SET
                    application_period_start = ?, application_period_end = ?, budget = ?,
                    target_description = ?, support_amount = ?, is_relevant = ?,
                    relevance_score = ?, keywords_matched = ?, needs_reclassification = ?,
                    updated_at = ?
                 WHERE id = ?",
                values,
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to store reclassification: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ExtractedInfo;

    async fn setup() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.create_run("run-1", 1).await.unwrap();
        db.create_run("run-2", 1).await.unwrap();
        db
    }

    fn record(url: &str, classification: Option<GeminiAnalysisResult>) -> AnnouncementRecord {
        AnnouncementRecord {
            region_code: "41".to_string(),
            region_name: "경기도".to_string(),
            region_type: RegionType::Metropolitan,
            title: "방지시설 지원사업".to_string(),
            content: "본문".to_string(),
            source_url: url.to_string(),
            content_hash: "h1".to_string(),
            extraction_confidence: 0.9,
            classification,
        }
    }

    fn relevant() -> GeminiAnalysisResult {
        GeminiAnalysisResult {
            is_relevant: true,
            relevance_score: 0.82,
            keywords_matched: vec!["집진".to_string()],
            extracted_info: ExtractedInfo {
                application_period_end: Some("2025-03-31".to_string()),
                ..Default::default()
            },
            reasoning: String::new(),
        }
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let db = setup().await;
        let rec = record("https://a.go.kr/view.do?nttId=1", Some(relevant()));

        let first = db.upsert_announcement("run-1", &rec).await.unwrap();
        assert!(first.is_new());

        let second = db.upsert_announcement("run-2", &rec).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated { id: first.id() });

        let stored = db.get_announcement(first.id()).await.unwrap().unwrap();
        assert_eq!(stored.crawl_run_id, "run-2");
        assert_eq!(stored.relevance_score, Some(0.82));
        assert_eq!(stored.keywords_matched, vec!["집진"]);

        assert_eq!(db.get_run("run-1").await.unwrap().unwrap().new_announcement_count, 1);
        assert_eq!(db.get_run("run-2").await.unwrap().unwrap().new_announcement_count, 0);
    }

    #[tokio::test]
    async fn test_same_run_reprocessing_counts_once() {
        let db = setup().await;
        let rec = record("https://a.go.kr/view.do?nttId=2", Some(relevant()));

        db.upsert_announcement("run-1", &rec).await.unwrap();
        db.upsert_announcement("run-1", &rec).await.unwrap();

        assert_eq!(db.get_run("run-1").await.unwrap().unwrap().new_announcement_count, 1);
    }

    #[tokio::test]
    async fn test_operator_fields_survive_recrawl() {
        let db = setup().await;
        let mut rec = record("https://a.go.kr/view.do?nttId=3", Some(relevant()));
        let id = db.upsert_announcement("run-1", &rec).await.unwrap().id();

        let update = OperatorUpdate {
            status: Some(AnnouncementStatus::Applied),
            is_read: Some(true),
            notes: Some("담당자 통화 완료".to_string()),
        };
        assert!(db.update_operator_fields(id, &update).await.unwrap());

        rec.content = "수정된 본문".to_string();
        rec.content_hash = "h2".to_string();
        db.upsert_announcement("run-2", &rec).await.unwrap();

        let stored = db.get_announcement(id).await.unwrap().unwrap();
        assert_eq!(stored.status, AnnouncementStatus::Applied);
        assert!(stored.is_read);
        assert_eq!(stored.notes.as_deref(), Some("담당자 통화 완료"));
        assert_eq!(stored.content, "수정된 본문");
    }

    #[tokio::test]
    async fn test_failed_classification_is_flagged() {
        let db = setup().await;
        let rec = record("https://a.go.kr/view.do?nttId=4", None);
        let id = db.upsert_announcement("run-1", &rec).await.unwrap().id();

        let stored = db.get_announcement(id).await.unwrap().unwrap();
        assert!(!stored.is_relevant);
        assert_eq!(stored.relevance_score, None);
        assert!(stored.needs_reclassification);

        let pending = db.pending_reclassification(10).await.unwrap();
        assert_eq!(pending.len(), 1);

        db.apply_reclassification(id, &relevant()).await.unwrap();
        let stored = db.get_announcement(id).await.unwrap().unwrap();
        assert!(stored.is_relevant);
        assert!(!stored.needs_reclassification);
        assert!(db.pending_reclassification(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_expired_only_touches_new_rows() {
        let db = setup().await;
        let a = db
            .upsert_announcement("run-1", &record("https://a.go.kr/view.do?nttId=5", Some(relevant())))
            .await
            .unwrap()
            .id();
        let b = db
            .upsert_announcement("run-1", &record("https://a.go.kr/view.do?nttId=6", Some(relevant())))
            .await
            .unwrap()
            .id();
        db.update_operator_fields(
            b,
            &OperatorUpdate {
                status: Some(AnnouncementStatus::Reviewing),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let today = NaiveDate::from_ymd_opt(2025, 4, 1).unwrap();
        assert_eq!(db.mark_expired(today).await.unwrap(), 1);

        let a = db.get_announcement(a).await.unwrap().unwrap();
        let b = db.get_announcement(b).await.unwrap().unwrap();
        assert_eq!(a.status, AnnouncementStatus::Expired);
        assert_eq!(b.status, AnnouncementStatus::Reviewing);
    }

    #[tokio::test]
    async fn test_touch_keeps_content() {
        let db = setup().await;
        let rec = record("https://a.go.kr/view.do?nttId=7", Some(relevant()));
        let id = db.upsert_announcement("run-1", &rec).await.unwrap().id();

        db.touch_announcement("run-2", id).await.unwrap();

        let stored = db.get_announcement(id).await.unwrap().unwrap();
        assert_eq!(stored.crawl_run_id, "run-2");
        assert_eq!(stored.content, "본문");
        let existing = db.find_by_key("41", &rec.source_url).await.unwrap().unwrap();
        assert_eq!(existing.content_hash.as_deref(), Some("h1"));
    }
}
