use crate::utils::validation::{ValidationError, generate_storage_key, is_valid_storage_key};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, warn};
use uuid::Uuid;

/// Characters left as-is in locator path segments
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Attempts at finding a free storage key before giving up
const MAX_KEY_ATTEMPTS: usize = 8;

#[derive(Debug)]
pub struct StoredBlob {
    pub storage_key: String,
    pub size: u64,
}

pub struct BlobHandle {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub size: u64,
}

/// Persistent home of uploaded report content, partitioned by owner.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Writes `content` under a freshly generated key inside `owner_partition` and returns the key.
    /// The blob is only visible under its key once it has been completely written.
    async fn put<'a>(
        &self,
        owner_partition: &str,
        suggested_name: &str,
        content: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredBlob>;

    /// Removes a blob. A blob that is already gone is not an error.
    async fn delete(&self, owner_partition: &str, storage_key: &str) -> Result<()>;

    /// Opens a blob for reading, `None` if it does not exist.
    async fn open(&self, owner_partition: &str, storage_key: &str) -> Result<Option<BlobHandle>>;

    /// Client-resolvable locator of a blob. No I/O.
    fn url_for(&self, owner_partition: &str, storage_key: &str) -> String;

    /// Checks that the medium is writable.
    async fn probe(&self) -> Result<()>;
}

/// Unpublished `.part` file of an in-flight `put`. Removed on drop, so a failed or
/// cancelled upload never leaves partial content in the partition.
struct PartFile {
    path: PathBuf,
}

impl Drop for PartFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(part = %self.path.display(), "blob_store: removed unpublished part"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(part = %self.path.display(), error = %e, "blob_store: failed to remove partial write")
            }
        }
    }
}

/// Blob store on the local filesystem: `{root}/{owner_partition}/{storage_key}`.
pub struct LocalBlobStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn partition_dir(&self, owner_partition: &str) -> Result<PathBuf> {
        if !is_valid_storage_key(owner_partition) {
            return Err(anyhow!("Invalid owner partition: {:?}", owner_partition));
        }
        Ok(self.root.join(owner_partition))
    }

    fn blob_path(&self, owner_partition: &str, storage_key: &str) -> Result<PathBuf> {
        if !is_valid_storage_key(storage_key) {
            return Err(anyhow!("Invalid storage key: {:?}", storage_key));
        }
        Ok(self.partition_dir(owner_partition)?.join(storage_key))
    }

    /// Publishes a fully written temp file under a new key without ever replacing an existing blob.
    async fn publish(&self, dir: &Path, part_path: &Path, suggested_name: &str) -> Result<String> {
        for _ in 0..MAX_KEY_ATTEMPTS {
            let storage_key = generate_storage_key(suggested_name);
            let final_path = dir.join(&storage_key);

            match fs::hard_link(part_path, &final_path).await {
                Ok(()) => {
                    if let Err(e) = fs::remove_file(part_path).await {
                        warn!(part = %part_path.display(), error = %e, "blob_store: failed to remove temp link");
                    }
                    return Ok(storage_key);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(key = %storage_key, "blob_store: key taken, regenerating");
                    continue;
                }
                Err(e) => {
                    // Filesystems without hard links: rename, after checking the key is free
                    debug!(error = %e, "blob_store: hard_link unavailable, falling back to rename");
                    if fs::try_exists(&final_path).await? {
                        continue;
                    }
                    fs::rename(part_path, &final_path)
                        .await
                        .with_context(|| format!("rename to {}", final_path.display()))?;
                    return Ok(storage_key);
                }
            }
        }

        Err(anyhow!(
            "No free storage key for '{}' after {} attempts",
            suggested_name,
            MAX_KEY_ATTEMPTS
        ))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put<'a>(
        &self,
        owner_partition: &str,
        suggested_name: &str,
        mut content: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StoredBlob> {
        let dir = self.partition_dir(owner_partition)?;
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("create_dir_all({})", dir.display()))?;

        let part = PartFile {
            path: dir.join(format!(".{}.part", Uuid::new_v4().simple())),
        };

        let size = async {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&part.path)
                .await
                .with_context(|| format!("create {}", part.path.display()))?;
            let size = tokio::io::copy(&mut content, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, anyhow::Error>(size)
        }
        .await?;

        if size == 0 {
            return Err(anyhow!(ValidationError {
                code: "EMPTY_FILE",
                message: "Uploaded file is empty".to_string(),
            }));
        }

        let storage_key = self.publish(&dir, &part.path, suggested_name).await?;
        drop(part);

        debug!(partition = %owner_partition, key = %storage_key, size, "blob_store: put");

        Ok(StoredBlob { storage_key, size })
    }

    async fn delete(&self, owner_partition: &str, storage_key: &str) -> Result<()> {
        let path = self.blob_path(owner_partition, storage_key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "blob_store: deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "blob_store: already absent");
                Ok(())
            }
            Err(e) => Err(anyhow!(e).context(format!("remove {}", path.display()))),
        }
    }

    async fn open(&self, owner_partition: &str, storage_key: &str) -> Result<Option<BlobHandle>> {
        let path = self.blob_path(owner_partition, storage_key)?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(anyhow!(e).context(format!("open {}", path.display()))),
        };
        let size = file.metadata().await?.len();

        Ok(Some(BlobHandle {
            reader: Box::new(file),
            size,
        }))
    }

    fn url_for(&self, owner_partition: &str, storage_key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_prefix,
            utf8_percent_encode(owner_partition, PATH_SEGMENT),
            utf8_percent_encode(storage_key, PATH_SEGMENT)
        )
    }

    async fn probe(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create_dir_all({})", self.root.display()))?;

        let probe_path = self.root.join(format!(".probe-{}", Uuid::new_v4().simple()));
        fs::write(&probe_path, b"blob-store-probe")
            .await
            .with_context(|| format!("write {}", probe_path.display()))?;
        fs::remove_file(&probe_path).await?;

        Ok(())
    }
}
