//! # Bojo - Subsidy Announcement Watcher
//!
//! Crawls the announcement boards of Korean local governments, extracts the
//! body text of each notice, asks an LLM whether it is an agricultural or
//! equipment subsidy (pulling out application period, budget, target and
//! support amount), and keeps a deduplicated record that operators review.
//!
//! ## Pipeline
//!
//! - `fetcher`: loads pages through headless Chrome or plain HTTP
//! - `extractor`: picks the announcement body out of arbitrary CMS markup
//!   and finds detail links on listing pages
//! - `classifier`: relevance scoring and field extraction behind the
//!   `Classifier` trait, with a Gemini implementation and a keyword fallback
//! - `store`: libsql persistence with upsert on `(region_code, source_url)`
//! - `orchestrator`: runs every active region in bounded batches
//! - `query` / `server`: read side and HTTP surface
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use bojo::classifier::KeywordClassifier;
//! use bojo::extractor::{Extractor, ExtractorConfig};
//! use bojo::fetcher::{Fetcher, FetcherConfig};
//! use bojo::orchestrator::{Orchestrator, OrchestratorConfig, RunOptions};
//! use bojo::store::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new_from_path("bojo.db").await?;
//!     let orchestrator = Orchestrator::new(
//!         db.clone(),
//!         Arc::new(db),
//!         Arc::new(Fetcher::new(FetcherConfig::default())?),
//!         Arc::new(Extractor::new(&ExtractorConfig::default())?),
//!         Arc::new(KeywordClassifier::default()),
//!         OrchestratorConfig::default(),
//!     );
//!
//!     let run = orchestrator.run(RunOptions::default(), None).await?;
//!     println!("run {} finished as {}", run.run_id, run.status);
//!     Ok(())
//! }
//! ```

mod error;
pub mod model;
pub mod models;

pub mod classifier;
pub mod extractor;
pub mod fetcher;
pub mod orchestrator;
pub mod query;
pub mod server;
pub mod store;

pub use error::{Error, Result};

/// Re-export of types module for public use
pub mod prelude {
    pub use crate::classifier::{Classifier, ClassifyRequest, GeminiAnalysisResult};
    pub use crate::error::Error;
    pub use crate::error::Result;
    pub use crate::fetcher::{FetchMode, PageFetcher};
    pub use crate::models::{Announcement, CrawlLog, CrawlRun, RegionSource};
    pub use crate::orchestrator::{Orchestrator, RunOptions};
}
