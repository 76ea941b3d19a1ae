//! # Persistence Layer
//!
//! libsql-backed store for the region catalog, crawl runs, crawl logs and
//! deduplicated announcements.
//!
//! The only shared mutable resource in a crawl is this store. Announcement
//! writes are per-row upserts keyed by `(region_code, source_url)`; regions
//! never share a key, so no cross-row locking is needed beyond the
//! connection-level write lock that keeps each upsert's read-then-write
//! sequence atomic.
//!
//! ## Key Components
//!
//! - `Database`: connection handle with all store operations
//! - `AnnouncementRecord` / `UpsertOutcome`: input and result of the upsert
//! - `OperatorUpdate`: human-owned fields that crawls never overwrite
//! - `NewCrawlLog`: per-region outcome row

mod announcements;
mod database;
pub mod error;
mod regions;
mod runs;
mod schema;

pub use announcements::{AnnouncementRecord, ExistingAnnouncement, OperatorUpdate, UpsertOutcome};
pub use database::Database;
pub use error::DbError;
pub use runs::NewCrawlLog;

pub(crate) use database::{ANNOUNCEMENT_COLUMNS, col_i64, col_text, row_to_announcement};
