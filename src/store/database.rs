//! Connection management and row decoding

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use libsql::{Connection, Row, Rows, Value};
use tokio::sync::Mutex;
use tracing::instrument;

use crate::models::{Announcement, CrawlLog, CrawlRun};
use crate::store::error::DbError;
use crate::store::schema;

/// Handle to the relational store.
///
/// Clones share one connection and one write lock. The lock serialises the
/// read-then-write sequences (upsert, counter updates) so concurrent regions
/// cannot interleave inside them.
#[derive(Clone)]
pub struct Database {
    pub(crate) conn: Connection,
    pub(crate) write_lock: Arc<Mutex<()>>,
}

impl Database {
    /// Create a new database manager
    #[instrument(skip(conn))]
    pub async fn new(conn: Connection) -> Result<Self, DbError> {
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| DbError::Connection(format!("Failed to enable foreign keys: {}", e)))?;
        schema::initialize_schema(&conn).await?;

        Ok(Self {
            conn,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Open (or create) a database file
    pub async fn new_from_path(path: &str) -> Result<Self, DbError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to open database: {}", e)))?;

        let conn = db
            .connect()
            .map_err(|e| DbError::Connection(format!("Failed to connect to database: {}", e)))?;

        Self::new(conn).await
    }

    /// Open a throwaway in-memory database
    pub async fn new_in_memory() -> Result<Self, DbError> {
        Self::new_from_path(":memory:").await
    }

    /// Execute a custom query with parameters
    pub async fn execute_query<P>(&self, sql: &str, params: P) -> Result<Rows, DbError>
    where
        P: libsql::params::IntoParams,
    {
        self.conn
            .query(sql, params)
            .await
            .map_err(|e| DbError::Query(format!("Failed to execute query: {}", e)))
    }

    /// Run a query expected to return a single integer
    pub(crate) async fn query_count<P>(&self, sql: &str, params: P) -> Result<i64, DbError>
    where
        P: libsql::params::IntoParams,
    {
        let mut rows = self.execute_query(sql, params).await?;
        match rows.next().await? {
            Some(row) => col_i64(&row, 0, "count"),
            None => Ok(0),
        }
    }
}

/// Current time as an RFC 3339 UTC string
pub(crate) fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn text(value: impl Into<String>) -> Value {
    Value::Text(value.into())
}

pub(crate) fn opt_text(value: Option<&str>) -> Value {
    value.map(|v| Value::Text(v.to_string())).unwrap_or(Value::Null)
}

pub(crate) fn int(value: i64) -> Value {
    Value::Integer(value)
}

pub(crate) fn flag(value: bool) -> Value {
    Value::Integer(value as i64)
}

pub(crate) fn opt_real(value: Option<f64>) -> Value {
    value.map(Value::Real).unwrap_or(Value::Null)
}

fn value(row: &Row, idx: i32, name: &str) -> Result<Value, DbError> {
    row.get_value(idx)
        .map_err(|e| DbError::Data(format!("Failed to get {}: {}", name, e)))
}

pub(crate) fn col_i64(row: &Row, idx: i32, name: &str) -> Result<i64, DbError> {
    match value(row, idx, name)? {
        Value::Integer(i) => Ok(i),
        Value::Real(f) => Ok(f as i64),
        Value::Null => Ok(0),
        other => Err(DbError::Data(format!("{} is not an integer: {:?}", name, other))),
    }
}

pub(crate) fn col_opt_i64(row: &Row, idx: i32, name: &str) -> Result<Option<i64>, DbError> {
    match value(row, idx, name)? {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(i)),
        Value::Real(f) => Ok(Some(f as i64)),
        other => Err(DbError::Data(format!("{} is not an integer: {:?}", name, other))),
    }
}

pub(crate) fn col_bool(row: &Row, idx: i32, name: &str) -> Result<bool, DbError> {
    col_i64(row, idx, name).map(|i| i != 0)
}

pub(crate) fn col_opt_f64(row: &Row, idx: i32, name: &str) -> Result<Option<f64>, DbError> {
    match value(row, idx, name)? {
        Value::Null => Ok(None),
        Value::Real(f) => Ok(Some(f)),
        Value::Integer(i) => Ok(Some(i as f64)),
        other => Err(DbError::Data(format!("{} is not a number: {:?}", name, other))),
    }
}

pub(crate) fn col_opt_text(row: &Row, idx: i32, name: &str) -> Result<Option<String>, DbError> {
    match value(row, idx, name)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        Value::Integer(i) => Ok(Some(i.to_string())),
        Value::Real(f) => Ok(Some(f.to_string())),
        Value::Blob(_) => Err(DbError::Data(format!("{} is a blob", name))),
    }
}

pub(crate) fn col_text(row: &Row, idx: i32, name: &str) -> Result<String, DbError> {
    col_opt_text(row, idx, name)?.ok_or_else(|| DbError::Data(format!("{} is NULL", name)))
}

pub(crate) fn col_parse<T>(row: &Row, idx: i32, name: &str) -> Result<T, DbError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    col_text(row, idx, name)?
        .parse()
        .map_err(|e| DbError::Data(format!("Bad {}: {}", name, e)))
}

/// Column list matching `row_to_announcement`
pub(crate) const ANNOUNCEMENT_COLUMNS: &str = "a.id, a.region_code, a.region_name, a.region_type, \
    a.title, a.content, a.source_url, a.application_period_start, a.application_period_end, \
    a.budget, a.target_description, a.support_amount, a.is_relevant, a.relevance_score, \
    a.keywords_matched, a.status, a.is_read, a.notes, a.needs_reclassification, \
    a.extraction_confidence, a.crawl_run_id, a.crawled_at, a.created_at, a.updated_at";

pub(crate) fn row_to_announcement(row: &Row) -> Result<Announcement, DbError> {
    let keywords_json = col_text(row, 14, "keywords_matched")?;
    let keywords_matched: Vec<String> = serde_json::from_str(&keywords_json)
        .map_err(|e| DbError::Data(format!("Bad keywords_matched: {}", e)))?;

    Ok(Announcement {
        id: col_i64(row, 0, "id")?,
        region_code: col_text(row, 1, "region_code")?,
        region_name: col_text(row, 2, "region_name")?,
        region_type: col_parse(row, 3, "region_type")?,
        title: col_text(row, 4, "title")?,
        content: col_text(row, 5, "content")?,
        source_url: col_text(row, 6, "source_url")?,
        application_period_start: col_opt_text(row, 7, "application_period_start")?,
        application_period_end: col_opt_text(row, 8, "application_period_end")?,
        budget: col_opt_text(row, 9, "budget")?,
        target_description: col_opt_text(row, 10, "target_description")?,
        support_amount: col_opt_text(row, 11, "support_amount")?,
        is_relevant: col_bool(row, 12, "is_relevant")?,
        relevance_score: col_opt_f64(row, 13, "relevance_score")?,
        keywords_matched,
        status: col_parse(row, 15, "status")?,
        is_read: col_bool(row, 16, "is_read")?,
        notes: col_opt_text(row, 17, "notes")?,
        needs_reclassification: col_bool(row, 18, "needs_reclassification")?,
        extraction_confidence: col_opt_f64(row, 19, "extraction_confidence")?.unwrap_or(0.0),
        crawl_run_id: col_text(row, 20, "crawl_run_id")?,
        crawled_at: col_text(row, 21, "crawled_at")?,
        created_at: col_text(row, 22, "created_at")?,
        updated_at: col_text(row, 23, "updated_at")?,
    })
}

/// Column list matching `row_to_run`
pub(crate) const RUN_COLUMNS: &str = "run_id, started_at, finished_at, status, regions_total, \
    regions_succeeded, regions_failed, new_announcement_count, duration_ms";

pub(crate) fn row_to_run(row: &Row) -> Result<CrawlRun, DbError> {
    Ok(CrawlRun {
        run_id: col_text(row, 0, "run_id")?,
        started_at: col_text(row, 1, "started_at")?,
        finished_at: col_opt_text(row, 2, "finished_at")?,
        status: col_parse(row, 3, "status")?,
        regions_total: col_i64(row, 4, "regions_total")?,
        regions_succeeded: col_i64(row, 5, "regions_succeeded")?,
        regions_failed: col_i64(row, 6, "regions_failed")?,
        new_announcement_count: col_i64(row, 7, "new_announcement_count")?,
        duration_ms: col_opt_i64(row, 8, "duration_ms")?,
    })
}

/// Column list matching `row_to_log`
pub(crate) const LOG_COLUMNS: &str = "id, run_id, region_code, status, announcements_found, \
    relevant_found, error_message, duration_ms, created_at";

pub(crate) fn row_to_log(row: &Row) -> Result<CrawlLog, DbError> {
    Ok(CrawlLog {
        id: col_i64(row, 0, "id")?,
        run_id: col_text(row, 1, "run_id")?,
        region_code: col_opt_text(row, 2, "region_code")?,
        status: col_parse(row, 3, "status")?,
        announcements_found: col_i64(row, 4, "announcements_found")?,
        relevant_found: col_i64(row, 5, "relevant_found")?,
        error_message: col_opt_text(row, 6, "error_message")?,
        duration_ms: col_i64(row, 7, "duration_ms")?,
        created_at: col_text(row, 8, "created_at")?,
    })
}
