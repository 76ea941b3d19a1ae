//! Region catalog access

use async_trait::async_trait;

use super::OrchestratorError;
use crate::models::RegionSource;
use crate::store::Database;

/// Source of crawl targets. Only active regions are returned.
#[async_trait]
pub trait RegionCatalog: Send + Sync {
    async fn active_regions(&self) -> Result<Vec<RegionSource>, OrchestratorError>;
}

#[async_trait]
impl RegionCatalog for Database {
    async fn active_regions(&self) -> Result<Vec<RegionSource>, OrchestratorError> {
        self.list_regions(true)
            .await
            .map_err(|e| OrchestratorError::Catalog(e.to_string()))
    }
}

/// Fixed in-memory catalog
#[async_trait]
impl RegionCatalog for Vec<RegionSource> {
    async fn active_regions(&self) -> Result<Vec<RegionSource>, OrchestratorError> {
        Ok(self.iter().filter(|r| r.is_active).cloned().collect())
    }
}
