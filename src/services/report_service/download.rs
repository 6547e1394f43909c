use crate::api::error::AppError;
use crate::entities::reports;
use crate::services::storage::BlobHandle;

use super::ReportService;

pub struct ReportDownload {
    pub record: reports::Model,
    pub blob: BlobHandle,
}

impl ReportService {
    /// Opens a report's content for streaming to the client.
    pub async fn open_report(&self, id: &str) -> Result<ReportDownload, AppError> {
        let record = self.catalog.find_by_id(id).await?;

        let blob = self
            .blobs
            .open(&record.owner_partition, &record.storage_key)
            .await
            .map_err(|e| AppError::StorageRead(format!("{:#}", e)))?
            .ok_or_else(|| {
                tracing::warn!(
                    "Report {} has no blob at {}/{}",
                    record.id,
                    record.owner_partition,
                    record.storage_key
                );
                AppError::NotFound("Report file is missing.".to_string())
            })?;

        Ok(ReportDownload { record, blob })
    }
}
