use crate::services::{catalog::ReportCatalog, storage::BlobStore};
use std::sync::Arc;

pub mod delete;
pub mod download;
pub mod list;
pub mod upload;

pub use download::ReportDownload;
pub use upload::UploadedReport;

/// Coordinates the blob store and the catalog for the report lifecycle:
/// `absent -> upload -> present -> delete -> absent`.
///
/// Blob and record writes are not transactional. Ordering is chosen so that a partial failure
/// leaves at worst an orphaned blob (upload) or a record whose file is gone (delete).
pub struct ReportService {
    blobs: Arc<dyn BlobStore>,
    catalog: Arc<dyn ReportCatalog>,
}

impl ReportService {
    pub fn new(blobs: Arc<dyn BlobStore>, catalog: Arc<dyn ReportCatalog>) -> Self {
        Self { blobs, catalog }
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    pub fn catalog(&self) -> &Arc<dyn ReportCatalog> {
        &self.catalog
    }
}
