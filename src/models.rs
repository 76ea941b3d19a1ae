//! # Data Model
//!
//! Records shared by the pipeline stages and the persistence layer: the region
//! catalog entry that drives a crawl, the run bookkeeping rows, and the
//! announcement record itself.
//!
//! Every enum here round-trips through the lowercase string stored in the
//! database via `as_str` / `FromStr`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a stored enum value is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Stored string form
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ParseEnumError::new($kind, other)),
                }
            }
        }
    };
}

/// Administrative tier of a local government
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    /// Metropolitan city or province (광역)
    Metropolitan,
    /// City, county or district (기초)
    Basic,
}

string_enum!(RegionType, "region type", {
    Metropolitan => "metropolitan",
    Basic => "basic",
});

/// One crawl target from the region catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSource {
    /// Catalog key
    pub region_code: String,

    /// Human-readable jurisdiction name
    pub region_name: String,

    /// Administrative tier
    pub region_type: RegionType,

    /// Announcement board or page URL
    pub url: String,

    /// Inactive regions are skipped by the orchestrator
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Forces the URL to be treated as a listing page even when the
    /// link heuristics do not recognise it
    #[serde(default)]
    pub is_listing: bool,
}

fn default_true() -> bool {
    true
}

/// Lifecycle of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Partial,
    Failed,
}

string_enum!(RunStatus, "run status", {
    Pending => "pending",
    Running => "running",
    Success => "success",
    Partial => "partial",
    Failed => "failed",
});

impl RunStatus {
    /// Whether the run can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Partial | RunStatus::Failed)
    }

    /// Terminal status from region tallies.
    ///
    /// Zero completed regions is a failed run regardless of why nothing
    /// completed (empty catalog, cancellation, or every region failing).
    pub fn from_tallies(succeeded: i64, failed: i64) -> Self {
        match (succeeded, failed) {
            (0, _) => RunStatus::Failed,
            (_, 0) => RunStatus::Success,
            _ => RunStatus::Partial,
        }
    }
}

/// One end-to-end execution of the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlRun {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub status: RunStatus,
    pub regions_total: i64,
    pub regions_succeeded: i64,
    pub regions_failed: i64,
    pub new_announcement_count: i64,
    pub duration_ms: Option<i64>,
}

/// Review state of an announcement. Everything except `New` and `Expired`
/// is set by an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnouncementStatus {
    New,
    Reviewing,
    Applied,
    Expired,
    NotRelevant,
}

string_enum!(AnnouncementStatus, "announcement status", {
    New => "new",
    Reviewing => "reviewing",
    Applied => "applied",
    Expired => "expired",
    NotRelevant => "not_relevant",
});

/// A persisted subsidy announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub id: i64,
    pub region_code: String,
    pub region_name: String,
    pub region_type: RegionType,
    pub title: String,
    pub content: String,
    pub source_url: String,
    pub application_period_start: Option<String>,
    pub application_period_end: Option<String>,
    pub budget: Option<String>,
    pub target_description: Option<String>,
    pub support_amount: Option<String>,
    pub is_relevant: bool,
    pub relevance_score: Option<f64>,
    pub keywords_matched: Vec<String>,
    pub status: AnnouncementStatus,
    pub is_read: bool,
    pub notes: Option<String>,
    pub needs_reclassification: bool,
    pub extraction_confidence: f64,
    pub crawl_run_id: String,
    pub crawled_at: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of one region attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlLogStatus {
    Success,
    Failed,
    Partial,
}

string_enum!(CrawlLogStatus, "crawl log status", {
    Success => "success",
    Failed => "failed",
    Partial => "partial",
});

/// Append-only per-region record for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlLog {
    pub id: i64,
    pub run_id: String,
    pub region_code: Option<String>,
    pub status: CrawlLogStatus,
    pub announcements_found: i64,
    pub relevant_found: i64,
    pub error_message: Option<String>,
    pub duration_ms: i64,
    pub created_at: String,
}
