use crate::api::error::AppError;
use crate::entities::reports;
use crate::models::NewReport;
use crate::utils::validation::{
    PARTITION_SCHEME_VERSION, ValidationError, display_filename, owner_partition,
    validate_owner_identity,
};
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ReportService;

#[derive(Debug, Clone)]
pub struct UploadedReport {
    pub id: String,
    pub display_name: String,
    pub storage_key: String,
    pub owner_partition: String,
}

/// Turns a validation failure carried in an `anyhow::Error` into a client error.
pub(crate) fn validation_message(e: &anyhow::Error) -> Option<String> {
    e.downcast_ref::<ValidationError>().map(|v| v.message.clone())
}

impl ReportService {
    /// Stores the blob, then the catalog record referencing it.
    ///
    /// If the record cannot be written the blob is removed again (once, best-effort);
    /// the caller always gets the original persistence error.
    pub async fn upload_report(&self, report: NewReport<'_>) -> Result<UploadedReport, AppError> {
        // 1. Validate
        let owner_identity = validate_owner_identity(&report.owner_identity).map_err(|e| {
            AppError::Validation(validation_message(&e).unwrap_or_else(|| e.to_string()))
        })?;

        if report.size_hint == Some(0) {
            return Err(AppError::Validation("Uploaded file is empty.".to_string()));
        }

        let display_name = display_filename(&report.display_name);

        // 2. Partition
        let partition = owner_partition(&owner_identity);

        // 3. Blob
        let stored = self
            .blobs
            .put(&partition, &display_name, report.content)
            .await
            .map_err(|e| match validation_message(&e) {
                Some(msg) => AppError::Validation(msg),
                None => AppError::StorageWrite(format!("{:#}", e)),
            })?;

        // 4. Record
        let record = reports::Model {
            id: Uuid::now_v7().to_string(),
            owner_identity: owner_identity.clone(),
            owner_partition: partition.clone(),
            partition_scheme: PARTITION_SCHEME_VERSION,
            display_name: display_name.clone(),
            storage_key: stored.storage_key.clone(),
            category: report.category.to_string(),
            notes: report
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: Utc::now(),
        };

        // 5. Persist, compensating on failure
        let id = match self.catalog.insert(record).await {
            Ok(id) => id,
            Err(insert_err) => {
                match self.blobs.delete(&partition, &stored.storage_key).await {
                    Ok(()) => warn!(
                        "🧹 Removed blob {}/{} after failed catalog insert",
                        partition, stored.storage_key
                    ),
                    Err(cleanup_err) => error!(
                        "❌ Orphaned blob {}/{}: cleanup after failed insert also failed: {:#}",
                        partition, stored.storage_key, cleanup_err
                    ),
                }
                return Err(insert_err);
            }
        };

        info!(
            "📄 Report {} stored for {} ({} bytes, key {})",
            id, owner_identity, stored.size, stored.storage_key
        );

        Ok(UploadedReport {
            id,
            display_name,
            storage_key: stored.storage_key,
            owner_partition: partition,
        })
    }
}
