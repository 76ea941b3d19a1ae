//! Aggregate counts for the operator dashboard

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use libsql::params;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::error::QueryError;
use crate::models::{CrawlLog, CrawlRun};
use crate::store::{Database, col_i64, col_text};

/// Days ahead of today that count as expiring soon
pub const EXPIRING_WINDOW_DAYS: u64 = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_relevant: i64,
    pub unread_relevant: i64,
    /// Relevant, still open, and closing within `EXPIRING_WINDOW_DAYS`
    pub expiring_soon: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_region_type: BTreeMap<String, i64>,
    pub latest_run: Option<CrawlRun>,
    pub latest_logs: Vec<CrawlLog>,
}

#[instrument(skip(db))]
pub async fn dashboard_stats(db: &Database, today: NaiveDate) -> Result<DashboardStats, QueryError> {
    let total_relevant = db
        .query_count("SELECT COUNT(*) FROM announcements WHERE is_relevant = 1", ())
        .await?;
    let unread_relevant = db
        .query_count(
            "SELECT COUNT(*) FROM announcements WHERE is_relevant = 1 AND is_read = 0",
            (),
        )
        .await?;

    let horizon = today
        .checked_add_days(Days::new(EXPIRING_WINDOW_DAYS))
        .ok_or_else(|| QueryError::InvalidParameters(format!("date out of range: {}", today)))?;
    let expiring_soon = db
        .query_count(
            "SELECT COUNT(*) FROM announcements
             WHERE is_relevant = 1
               AND status IN ('new', 'reviewing')
               AND application_period_end IS NOT NULL
               AND application_period_end >= ? AND application_period_end <= ?",
            params![today.to_string(), horizon.to_string()],
        )
        .await?;

    let by_status = grouped(db, "status").await?;
    let by_region_type = grouped(db, "region_type").await?;

    let latest_run = db.recent_runs(1).await?.into_iter().next();
    let latest_logs = match &latest_run {
        Some(run) => db.logs_for_run(&run.run_id).await?,
        None => Vec::new(),
    };

    Ok(DashboardStats {
        total_relevant,
        unread_relevant,
        expiring_soon,
        by_status,
        by_region_type,
        latest_run,
        latest_logs,
    })
}

/// Relevant announcement counts grouped by a fixed column
async fn grouped(db: &Database, column: &'static str) -> Result<BTreeMap<String, i64>, QueryError> {
    let sql = format!(
        "SELECT {column}, COUNT(*) FROM announcements WHERE is_relevant = 1 GROUP BY {column}"
    );
    let mut rows = db.execute_query(&sql, ()).await?;
    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next().await? {
        counts.insert(col_text(&row, 0, column)?, col_i64(&row, 1, "count")?);
    }
    Ok(counts)
}
