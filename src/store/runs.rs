//! Crawl run and crawl log bookkeeping

use libsql::{Value, params};
use tracing::{info, instrument, warn};

use crate::models::{CrawlLog, CrawlLogStatus, CrawlRun, RunStatus};
use crate::store::database::{
    Database, LOG_COLUMNS, RUN_COLUMNS, col_text, int, now, opt_text, row_to_log, row_to_run,
    text,
};
use crate::store::error::DbError;

/// A per-region outcome to append
#[derive(Debug, Clone)]
pub struct NewCrawlLog {
    pub region_code: Option<String>,
    pub status: CrawlLogStatus,
    pub announcements_found: i64,
    pub relevant_found: i64,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

impl Database {
    /// Open a run in `pending`
    #[instrument(skip(self))]
    pub async fn create_run(&self, run_id: &str, regions_total: i64) -> Result<CrawlRun, DbError> {
        self.conn
            .execute(
                "INSERT INTO crawl_runs (run_id, started_at, status, regions_total) VALUES (?, ?, ?, ?)",
                vec![
                    text(run_id),
                    text(now()),
                    text(RunStatus::Pending.as_str()),
                    int(regions_total),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to create run: {}", e)))?;

        self.get_run(run_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("run {}", run_id)))
    }

    /// Move a pending run to `running` with its final region count
    pub async fn mark_running(&self, run_id: &str, regions_total: i64) -> Result<(), DbError> {
        self.conn
            .execute(
                "UPDATE crawl_runs SET status = ?, regions_total = ? WHERE run_id = ? AND status = ?",
                vec![
                    text(RunStatus::Running.as_str()),
                    int(regions_total),
                    text(run_id),
                    text(RunStatus::Pending.as_str()),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to start run: {}", e)))?;
        Ok(())
    }

    /// Count one finished region against the run
    pub async fn record_region_outcome(&self, run_id: &str, succeeded: bool) -> Result<(), DbError> {
        let _guard = self.write_lock.lock().await;
        let sql = if succeeded {
            "UPDATE crawl_runs SET regions_succeeded = regions_succeeded + 1 WHERE run_id = ?"
        } else {
            "UPDATE crawl_runs SET regions_failed = regions_failed + 1 WHERE run_id = ?"
        };
        self.conn
            .execute(sql, params![run_id])
            .await
            .map_err(|e| DbError::Query(format!("Failed to update run counters: {}", e)))?;
        Ok(())
    }

    /// Close a run: status from its tallies, `finished_at` and duration set.
    /// A run already in a terminal state is left as it is.
    #[instrument(skip(self))]
    pub async fn finalize_run(&self, run_id: &str, duration_ms: i64) -> Result<CrawlRun, DbError> {
        self.close_run(run_id, Some(duration_ms)).await
    }

    /// Close a run whose execution ended without finalizing it. Status comes
    /// from the regions recorded so far, so it is `failed` when none
    /// completed.
    #[instrument(skip(self))]
    pub async fn abandon_run(&self, run_id: &str) -> Result<CrawlRun, DbError> {
        warn!(run_id, "Closing interrupted run");
        self.close_run(run_id, None).await
    }

    /// Close every run left `pending` or `running` by a process that exited
    /// mid-run. Call before this process starts runs of its own.
    pub async fn settle_interrupted_runs(&self) -> Result<Vec<CrawlRun>, DbError> {
        let mut rows = self
            .execute_query(
                "SELECT run_id FROM crawl_runs WHERE status IN (?, ?)",
                params![RunStatus::Pending.as_str(), RunStatus::Running.as_str()],
            )
            .await?;
        let mut run_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            run_ids.push(col_text(&row, 0, "run_id")?);
        }

        let mut settled = Vec::with_capacity(run_ids.len());
        for run_id in run_ids {
            settled.push(self.abandon_run(&run_id).await?);
        }
        Ok(settled)
    }

    async fn close_run(&self, run_id: &str, duration_ms: Option<i64>) -> Result<CrawlRun, DbError> {
        let _guard = self.write_lock.lock().await;
        let run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("run {}", run_id)))?;
        if run.status.is_terminal() {
            return Ok(run);
        }

        let status = RunStatus::from_tallies(run.regions_succeeded, run.regions_failed);
        let duration = duration_ms.map(int).unwrap_or(Value::Null);
        self.conn
            .execute(
                "UPDATE crawl_runs SET status = ?, finished_at = ?, duration_ms = ? WHERE run_id = ?",
                vec![text(status.as_str()), text(now()), duration, text(run_id)],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to finalize run: {}", e)))?;

        info!(
            run_id,
            %status,
            succeeded = run.regions_succeeded,
            failed = run.regions_failed,
            new = run.new_announcement_count,
            "Run finished"
        );

        self.get_run(run_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("run {}", run_id)))
    }

    /// Fetch a run
    pub async fn get_run(&self, run_id: &str) -> Result<Option<CrawlRun>, DbError> {
        let sql = format!("SELECT {} FROM crawl_runs WHERE run_id = ?", RUN_COLUMNS);
        let mut rows = self.execute_query(&sql, params![run_id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_run(&row)?)),
            None => Ok(None),
        }
    }

    /// Most recent runs first
    pub async fn recent_runs(&self, limit: i64) -> Result<Vec<CrawlRun>, DbError> {
        let sql = format!(
            "SELECT {} FROM crawl_runs ORDER BY started_at DESC, rowid DESC LIMIT ?",
            RUN_COLUMNS
        );
        let mut rows = self.execute_query(&sql, params![limit]).await?;
        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }

    /// Append a crawl log row
    pub async fn insert_crawl_log(&self, run_id: &str, log: &NewCrawlLog) -> Result<i64, DbError> {
        let mut rows = self
            .conn
            .query(
                "INSERT INTO crawl_logs (run_id, region_code, status, announcements_found,
                    relevant_found, error_message, duration_ms, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
                vec![
                    text(run_id),
                    opt_text(log.region_code.as_deref()),
                    text(log.status.as_str()),
                    int(log.announcements_found),
                    int(log.relevant_found),
                    opt_text(log.error_message.as_deref()),
                    int(log.duration_ms),
                    text(now()),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to insert crawl log: {}", e)))?;

        match rows.next().await? {
            Some(row) => row
                .get::<i64>(0)
                .map_err(|e| DbError::Data(format!("Failed to get id: {}", e))),
            None => Err(DbError::Data("No id returned for crawl log".to_string())),
        }
    }

    /// Crawl logs of one run in insertion order
    pub async fn logs_for_run(&self, run_id: &str) -> Result<Vec<CrawlLog>, DbError> {
        let sql = format!("SELECT {} FROM crawl_logs WHERE run_id = ? ORDER BY id", LOG_COLUMNS);
        let mut rows = self.execute_query(&sql, params![run_id]).await?;
        let mut logs = Vec::new();
        while let Some(row) = rows.next().await? {
            logs.push(row_to_log(&row)?);
        }
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_lifecycle() {
        let db = Database::new_in_memory().await.unwrap();
        let run = db.create_run("r1", 0).await.unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert!(run.finished_at.is_none());

        db.mark_running("r1", 3).await.unwrap();
        db.record_region_outcome("r1", true).await.unwrap();
        db.record_region_outcome("r1", true).await.unwrap();
        db.record_region_outcome("r1", false).await.unwrap();

        let run = db.finalize_run("r1", 1234).await.unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.regions_total, 3);
        assert_eq!(run.regions_succeeded, 2);
        assert_eq!(run.regions_failed, 1);
        assert_eq!(run.duration_ms, Some(1234));
        assert!(run.finished_at.is_some());

        // Terminal runs are not reopened
        let again = db.finalize_run("r1", 9999).await.unwrap();
        assert_eq!(again.duration_ms, Some(1234));
    }

    #[tokio::test]
    async fn test_empty_run_fails() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_run("r2", 0).await.unwrap();
        db.mark_running("r2", 0).await.unwrap();
        let run = db.finalize_run("r2", 5).await.unwrap();
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_settle_interrupted_runs() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_run("never-started", 0).await.unwrap();

        db.create_run("died-early", 0).await.unwrap();
        db.mark_running("died-early", 4).await.unwrap();

        db.create_run("died-late", 0).await.unwrap();
        db.mark_running("died-late", 4).await.unwrap();
        db.record_region_outcome("died-late", true).await.unwrap();
        db.record_region_outcome("died-late", false).await.unwrap();

        db.create_run("done", 0).await.unwrap();
        db.mark_running("done", 1).await.unwrap();
        db.record_region_outcome("done", true).await.unwrap();
        db.finalize_run("done", 10).await.unwrap();

        let settled = db.settle_interrupted_runs().await.unwrap();
        assert_eq!(settled.len(), 3);

        let status = |run: Option<CrawlRun>| run.unwrap().status;
        assert_eq!(status(db.get_run("never-started").await.unwrap()), RunStatus::Failed);
        assert_eq!(status(db.get_run("died-early").await.unwrap()), RunStatus::Failed);
        assert_eq!(status(db.get_run("died-late").await.unwrap()), RunStatus::Partial);
        assert_eq!(status(db.get_run("done").await.unwrap()), RunStatus::Success);

        let late = db.get_run("died-late").await.unwrap().unwrap();
        assert!(late.finished_at.is_some());
        assert_eq!(late.duration_ms, None);

        assert!(db.settle_interrupted_runs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_crawl_logs_round_trip() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_run("r3", 2).await.unwrap();
        db.insert_crawl_log(
            "r3",
            &NewCrawlLog {
                region_code: Some("11".to_string()),
                status: CrawlLogStatus::Failed,
                announcements_found: 0,
                relevant_found: 0,
                error_message: Some("timed out".to_string()),
                duration_ms: 15000,
            },
        )
        .await
        .unwrap();

        let logs = db.logs_for_run("r3").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, CrawlLogStatus::Failed);
        assert_eq!(logs[0].error_message.as_deref(), Some("timed out"));
        assert!(db.logs_for_run("other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_runs_newest_first() {
        let db = Database::new_in_memory().await.unwrap();
        db.create_run("old", 0).await.unwrap();
        db.create_run("new", 0).await.unwrap();
        let runs = db.recent_runs(10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, "new");
    }
}
