//! Paginated announcements discovered by a run

use libsql::Value;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::error::QueryError;
use crate::models::Announcement;
use crate::store::{ANNOUNCEMENT_COLUMNS, Database, row_to_announcement};

/// Scores at or above this count as AI-verified
pub const AI_VERIFIED_THRESHOLD: f64 = 0.7;

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;

/// Query options for one page of run results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunResultsQuery {
    /// 1-based page number
    pub page: u32,

    /// Rows per page, at most 100
    pub page_size: u32,

    /// Only announcements classified as relevant
    pub relevant_only: bool,

    /// Only announcements scored at or above `AI_VERIFIED_THRESHOLD`
    pub ai_verified_only: bool,
}

impl Default for RunResultsQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            relevant_only: false,
            ai_verified_only: false,
        }
    }
}

impl RunResultsQuery {
    fn page(&self) -> u32 {
        self.page.max(1)
    }

    fn page_size(&self) -> u32 {
        match self.page_size {
            0 => DEFAULT_PAGE_SIZE,
            n => n.min(MAX_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: i64,
}

impl Pagination {
    fn new(total: i64, page: u32, page_size: u32) -> Self {
        let size = i64::from(page_size);
        Self {
            total,
            page,
            page_size,
            total_pages: (total + size - 1) / size,
        }
    }
}

/// Filters as applied, echoed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedFilters {
    pub relevant_only: bool,
    pub ai_verified_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunAnnouncementsPage {
    pub announcements: Vec<Announcement>,
    pub pagination: Pagination,
    pub filters: AppliedFilters,
}

/// Announcements touched by `run_id`, highest score first
#[instrument(skip(db))]
pub async fn run_announcements(
    db: &Database,
    run_id: &str,
    query: &RunResultsQuery,
) -> Result<RunAnnouncementsPage, QueryError> {
    if db.get_run(run_id).await?.is_none() {
        return Err(QueryError::RunNotFound(run_id.to_string()));
    }

    let page = query.page();
    let page_size = query.page_size();

    let mut filter = String::from(
        " FROM run_announcements ra
          JOIN announcements a ON a.id = ra.announcement_id
          WHERE ra.run_id = ?",
    );
    let mut params: Vec<Value> = vec![Value::Text(run_id.to_string())];

    if query.relevant_only {
        filter.push_str(" AND a.is_relevant = 1");
    }
    if query.ai_verified_only {
        filter.push_str(" AND a.relevance_score >= ?");
        params.push(Value::Real(AI_VERIFIED_THRESHOLD));
    }

    let total = db
        .query_count(&format!("SELECT COUNT(*){}", filter), params.clone())
        .await?;

    let sql = format!(
        "SELECT {}{} ORDER BY COALESCE(a.relevance_score, -1) DESC, a.id ASC LIMIT ? OFFSET ?",
        ANNOUNCEMENT_COLUMNS, filter
    );
    params.push(Value::Integer(i64::from(page_size)));
    params.push(Value::Integer(i64::from(page - 1) * i64::from(page_size)));

    let mut rows = db.execute_query(&sql, params).await?;
    let mut announcements = Vec::new();
    while let Some(row) = rows.next().await? {
        announcements.push(row_to_announcement(&row)?);
    }

    Ok(RunAnnouncementsPage {
        announcements,
        pagination: Pagination::new(total, page, page_size),
        filters: AppliedFilters {
            relevant_only: query.relevant_only,
            ai_verified_only: query.ai_verified_only,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::GeminiAnalysisResult;
    use crate::models::RegionType;
    use crate::store::AnnouncementRecord;

    fn record(url: &str, classification: Option<GeminiAnalysisResult>) -> AnnouncementRecord {
        AnnouncementRecord {
            region_code: "44".to_string(),
            region_name: "충청남도".to_string(),
            region_type: RegionType::Metropolitan,
            title: format!("공고 {}", url),
            content: "농기계 지원".to_string(),
            source_url: url.to_string(),
            content_hash: url.to_string(),
            extraction_confidence: 0.8,
            classification,
        }
    }

    async fn seeded() -> Database {
        let db = Database::new_in_memory().await.unwrap();
        db.create_run("run-1", 1).await.unwrap();
        db.create_run("run-2", 1).await.unwrap();
        let rows = [
            ("http://a/1", Some(GeminiAnalysisResult::scored(true, 0.82))),
            ("http://a/2", Some(GeminiAnalysisResult::scored(true, 0.5))),
            ("http://a/3", Some(GeminiAnalysisResult::scored(false, 0.1))),
            ("http://a/4", None),
        ];
        for (url, classification) in rows {
            db.upsert_announcement("run-1", &record(url, classification))
                .await
                .unwrap();
        }
        db.upsert_announcement("run-2", &record("http://a/9", None))
            .await
            .unwrap();
        db
    }

    #[tokio::test]
    async fn test_unknown_run() {
        let db = seeded().await;
        let err = run_announcements(&db, "missing", &RunResultsQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::RunNotFound(_)));
    }

    #[tokio::test]
    async fn test_filters() {
        let db = seeded().await;

        let all = run_announcements(&db, "run-1", &RunResultsQuery::default())
            .await
            .unwrap();
        assert_eq!(all.pagination.total, 4);
        assert_eq!(all.announcements[0].source_url, "http://a/1");

        let relevant = RunResultsQuery {
            relevant_only: true,
            ..Default::default()
        };
        let page = run_announcements(&db, "run-1", &relevant).await.unwrap();
        assert_eq!(page.pagination.total, 2);

        let verified = RunResultsQuery {
            ai_verified_only: true,
            ..Default::default()
        };
        let page = run_announcements(&db, "run-1", &verified).await.unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.announcements[0].relevance_score, Some(0.82));
        assert!(page.filters.ai_verified_only);
    }

    #[tokio::test]
    async fn test_pagination() {
        let db = seeded().await;
        let query = RunResultsQuery {
            page: 2,
            page_size: 3,
            ..Default::default()
        };
        let page = run_announcements(&db, "run-1", &query).await.unwrap();
        assert_eq!(page.announcements.len(), 1);
        assert_eq!(
            page.pagination,
            Pagination {
                total: 4,
                page: 2,
                page_size: 3,
                total_pages: 2
            }
        );
    }

    #[test]
    fn test_page_size_is_clamped() {
        let query = RunResultsQuery {
            page: 0,
            page_size: 1000,
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), MAX_PAGE_SIZE);
        assert_eq!(Pagination::new(0, 1, 20).total_pages, 0);
    }
}
