//! # Database Schema
//!
//! Five tables:
//! 1. `regions` - crawl targets keyed by `region_code`
//! 2. `crawl_runs` - one row per orchestrator run, counters updated as
//!    regions finish
//! 3. `announcements` - deduplicated on `(region_code, source_url)`
//! 4. `crawl_logs` - append-only per-region outcomes
//! 5. `run_announcements` - which announcements each run touched, and
//!    whether the run created them

use crate::store::error::DbError;
use libsql::{Connection, params};

const TABLES: &[(&str, &str)] = &[
    (
        "regions",
        "CREATE TABLE IF NOT EXISTS regions (
            region_code TEXT PRIMARY KEY,
            region_name TEXT NOT NULL,
            region_type TEXT NOT NULL,
            url TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            is_listing INTEGER NOT NULL DEFAULT 0
        )",
    ),
    (
        "crawl_runs",
        "CREATE TABLE IF NOT EXISTS crawl_runs (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            regions_total INTEGER NOT NULL DEFAULT 0,
            regions_succeeded INTEGER NOT NULL DEFAULT 0,
            regions_failed INTEGER NOT NULL DEFAULT 0,
            new_announcement_count INTEGER NOT NULL DEFAULT 0,
            duration_ms INTEGER
        )",
    ),
    (
        "announcements",
        "CREATE TABLE IF NOT EXISTS announcements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            region_code TEXT NOT NULL,
            region_name TEXT NOT NULL,
            region_type TEXT NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            source_url TEXT NOT NULL,
            application_period_start TEXT,
            application_period_end TEXT,
            budget TEXT,
            target_description TEXT,
            support_amount TEXT,
            is_relevant INTEGER NOT NULL DEFAULT 0,
            relevance_score REAL,
            keywords_matched TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL DEFAULT 'new',
            is_read INTEGER NOT NULL DEFAULT 0,
            notes TEXT,
            content_hash TEXT,
            needs_reclassification INTEGER NOT NULL DEFAULT 0,
            extraction_confidence REAL NOT NULL DEFAULT 0,
            crawl_run_id TEXT NOT NULL,
            crawled_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (region_code, source_url)
        )",
    ),
    (
        "crawl_logs",
        "CREATE TABLE IF NOT EXISTS crawl_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            region_code TEXT,
            status TEXT NOT NULL,
            announcements_found INTEGER NOT NULL DEFAULT 0,
            relevant_found INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "run_announcements",
        "CREATE TABLE IF NOT EXISTS run_announcements (
            run_id TEXT NOT NULL,
            announcement_id INTEGER NOT NULL,
            is_new INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (run_id, announcement_id),
            FOREIGN KEY (announcement_id) REFERENCES announcements(id) ON DELETE CASCADE
        )",
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_announcements_run ON announcements(crawl_run_id)",
    "CREATE INDEX IF NOT EXISTS idx_announcements_relevant ON announcements(is_relevant, relevance_score)",
    "CREATE INDEX IF NOT EXISTS idx_announcements_reclassify ON announcements(needs_reclassification)",
    "CREATE INDEX IF NOT EXISTS idx_crawl_logs_run ON crawl_logs(run_id)",
    "CREATE INDEX IF NOT EXISTS idx_run_announcements_run ON run_announcements(run_id)",
];

/// Initialize the database schema
pub async fn initialize_schema(conn: &Connection) -> Result<(), DbError> {
    for (name, ddl) in TABLES {
        conn.execute(ddl, params![])
            .await
            .map_err(|e| DbError::Schema(format!("Failed to create {} table: {}", name, e)))?;
    }

    for ddl in INDEXES {
        conn.execute(ddl, params![])
            .await
            .map_err(|e| DbError::Schema(format!("Failed to create index: {}", e)))?;
    }

    Ok(())
}
