use crate::config::ReportsConfig;
use crate::services::storage::{BlobStore, LocalBlobStore};
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &ReportsConfig) -> anyhow::Result<Arc<LocalBlobStore>> {
    info!(
        "🗄️  Blob Storage: {} (served at {})",
        config.uploads_dir.display(),
        config.public_uploads_path
    );

    let store = LocalBlobStore::new(&config.uploads_dir, &config.public_uploads_path);

    // Fail at startup rather than on the first upload
    store
        .probe()
        .await
        .with_context(|| format!("uploads directory {} is not writable", config.uploads_dir.display()))?;

    info!("✅ Uploads directory '{}' is ready", config.uploads_dir.display());

    Ok(Arc::new(store))
}
