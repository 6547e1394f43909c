use crate::api::error::AppError;
use tracing::{info, warn};

use super::ReportService;

impl ReportService {
    /// Deletes the blob, then the record.
    ///
    /// A blob that is already gone counts as deleted. If the record removal fails after the blob
    /// is gone, the record stays behind pointing at nothing and the error is returned.
    pub async fn delete_report(&self, id: &str) -> Result<(), AppError> {
        // 1. Lookup
        let record = self.catalog.find_by_id(id).await?;

        // 2. Blob
        self.blobs
            .delete(&record.owner_partition, &record.storage_key)
            .await
            .map_err(|e| AppError::StorageWrite(format!("{:#}", e)))?;

        // 3. Record
        if let Err(e) = self.catalog.delete_by_id(&record.id).await {
            if !matches!(e, AppError::NotFound(_)) {
                warn!(
                    "⚠️ Report {} lost its blob {}/{} but the record could not be removed",
                    record.id, record.owner_partition, record.storage_key
                );
            }
            return Err(e);
        }

        info!(
            "🗑️ Report {} deleted for {} (key {})",
            record.id, record.owner_identity, record.storage_key
        );

        Ok(())
    }
}
