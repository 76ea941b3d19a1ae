//! # Results Queries
//!
//! Read side of the store: paginated announcements discovered by a run and
//! aggregate counts for the operator dashboard.
//!
//! A run "discovers" every announcement it touched, whether the row was new
//! or refreshed, so re-running a crawl still shows its full result set.

mod dashboard;
mod error;
mod results;

pub use dashboard::{DashboardStats, EXPIRING_WINDOW_DAYS, dashboard_stats};
pub use error::QueryError;
pub use results::{
    AI_VERIFIED_THRESHOLD, AppliedFilters, Pagination, RunAnnouncementsPage, RunResultsQuery,
    run_announcements,
};
