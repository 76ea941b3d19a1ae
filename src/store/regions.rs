//! Region catalog persistence

use crate::models::RegionSource;
use crate::store::database::{Database, col_bool, col_parse, col_text, flag, text};
use crate::store::error::DbError;

impl Database {
    /// Insert or replace a catalog entry
    pub async fn upsert_region(&self, region: &RegionSource) -> Result<(), DbError> {
        self.conn
            .execute(
                "INSERT INTO regions (region_code, region_name, region_type, url, is_active, is_listing)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT (region_code) DO UPDATE SET
                    region_name = excluded.region_name,
                    region_type = excluded.region_type,
                    url = excluded.url,
                    is_active = excluded.is_active,
                    is_listing = excluded.is_listing",
                vec![
                    text(region.region_code.as_str()),
                    text(region.region_name.as_str()),
                    text(region.region_type.as_str()),
                    text(region.url.as_str()),
                    flag(region.is_active),
                    flag(region.is_listing),
                ],
            )
            .await
            .map_err(|e| DbError::Query(format!("Failed to save region: {}", e)))?;
        Ok(())
    }

    /// Catalog entries ordered by code
    pub async fn list_regions(&self, active_only: bool) -> Result<Vec<RegionSource>, DbError> {
        let sql = if active_only {
            "SELECT region_code, region_name, region_type, url, is_active, is_listing
             FROM regions WHERE is_active = 1 ORDER BY region_code"
        } else {
            "SELECT region_code, region_name, region_type, url, is_active, is_listing
             FROM regions ORDER BY region_code"
        };

        let mut rows = self.execute_query(sql, ()).await?;
        let mut regions = Vec::new();
        while let Some(row) = rows.next().await? {
            regions.push(RegionSource {
                region_code: col_text(&row, 0, "region_code")?,
                region_name: col_text(&row, 1, "region_name")?,
                region_type: col_parse(&row, 2, "region_type")?,
                url: col_text(&row, 3, "url")?,
                is_active: col_bool(&row, 4, "is_active")?,
                is_listing: col_bool(&row, 5, "is_listing")?,
            });
        }
        Ok(regions)
    }
}
