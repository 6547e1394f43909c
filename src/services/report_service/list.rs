use crate::api::error::AppError;
use crate::entities::reports;
use crate::models::{ReportCategory, ReportListing};
use crate::utils::validation::validate_owner_identity;

use super::ReportService;
use super::upload::validation_message;

impl ReportService {
    /// Reports of one owner, most recent first, each with the locator its blob is served at.
    pub async fn list_reports(&self, owner_identity: &str) -> Result<Vec<ReportListing>, AppError> {
        let owner_identity = validate_owner_identity(owner_identity).map_err(|e| {
            AppError::Validation(validation_message(&e).unwrap_or_else(|| e.to_string()))
        })?;

        let records = self.catalog.list_by_owner(&owner_identity).await?;

        Ok(records
            .into_iter()
            .map(|record| self.to_listing(record))
            .collect())
    }

    pub(crate) fn to_listing(&self, record: reports::Model) -> ReportListing {
        let resolved_locator = self
            .blobs
            .url_for(&record.owner_partition, &record.storage_key);

        ReportListing {
            id: record.id,
            display_name: record.display_name,
            category: ReportCategory::from_label(&record.category),
            notes: record.notes,
            created_at: record.created_at,
            resolved_locator,
        }
    }
}
