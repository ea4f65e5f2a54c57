use anyhow::{Result, bail};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Manages on-disk blob storage for report photos.
///
/// Blobs are addressed by slash-separated keys that mirror the directory
/// layout under the storage root, e.g. `reports/{reportId}/{photoId}.jpg`.
pub struct BlobStore {
    dir: PathBuf,
}

/// Key of a report photo blob.
pub fn report_photo_key(report_id: &str, photo_id: &str) -> String {
    format!("reports/{}/{}", report_id, photo_id)
}

/// Key prefix holding every blob of one report.
pub fn report_folder_key(report_id: &str) -> String {
    format!("reports/{}", report_id)
}

impl BlobStore {
    pub async fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        &self.dir
    }

    /// Resolve a key to its file path, rejecting anything that could
    /// escape the storage root.
    pub fn blob_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            bail!("Blob key cannot be empty");
        }
        let mut path = self.dir.clone();
        for segment in key.split('/') {
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains('\\')
                || segment.contains('\0')
            {
                bail!("Invalid blob key: {}", key);
            }
            path.push(segment);
        }
        Ok(path)
    }

    /// Write a blob, creating parent folders. Returns the SHA-256 of the
    /// content as lowercase hex.
    pub async fn put(&self, key: &str, data: &[u8]) -> Result<String> {
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hex::encode(hasher.finalize());

        debug!("Stored blob {} ({} bytes)", key, data.len());
        Ok(digest)
    }

    /// Delete a single blob. A blob that is already gone is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort recursive delete of everything under `prefix`.
    ///
    /// Failures are logged and skipped. Returns the number of files removed.
    pub async fn delete_prefix(&self, prefix: &str) -> usize {
        let root = match self.blob_path(prefix) {
            Ok(path) => path,
            Err(e) => {
                warn!("delete_prefix {}: {}", prefix, e);
                return 0;
            }
        };

        let mut pending = vec![root];
        let mut visited = Vec::new();
        let mut removed = 0;

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("delete_prefix: {} -> {}", dir.display(), e);
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("delete_prefix: {} -> {}", dir.display(), e);
                        break;
                    }
                };

                let path = entry.path();
                match entry.file_type().await {
                    Ok(ft) if ft.is_dir() => pending.push(path),
                    Ok(_) => match fs::remove_file(&path).await {
                        Ok(()) => removed += 1,
                        Err(e) => warn!("delete_prefix: {} -> {}", path.display(), e),
                    },
                    Err(e) => warn!("delete_prefix: {} -> {}", path.display(), e),
                }
            }

            visited.push(dir);
        }

        // Children were visited after their parents
        for dir in visited.iter().rev() {
            if let Err(e) = fs::remove_dir(dir).await {
                warn!("delete_prefix: could not remove {} -> {}", dir.display(), e);
            }
        }

        removed
    }

    /// List blob keys under a prefix, recursively.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.blob_path(prefix)?;
        let mut keys = Vec::new();
        let mut pending = vec![root];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.dir) {
                    let key: Vec<String> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, BlobStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::new(tmp.path().join("blobs")).await.unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn put_and_read() {
        let (_tmp, store) = store().await;
        let key = report_photo_key("r1", "photo_1.jpg");

        let digest = store.put(&key, b"jpeg bytes").await.unwrap();
        assert_eq!(digest.len(), 64);
        let on_disk = tokio::fs::read(store.blob_path(&key).unwrap()).await.unwrap();
        assert_eq!(on_disk, b"jpeg bytes");
        assert_eq!(store.list("reports/r1").await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let (_tmp, store) = store().await;
        assert!(store.blob_path("reports/../secret").is_err());
        assert!(store.blob_path("/etc/passwd").is_err());
        assert!(store.blob_path("").is_err());
        assert!(store.put("reports/r1/..", b"x").await.is_err());
    }

    #[tokio::test]
    async fn delete_prefix_is_recursive() {
        let (_tmp, store) = store().await;
        store.put("reports/r1/a.jpg", b"a").await.unwrap();
        store.put("reports/r1/b.jpg", b"b").await.unwrap();
        store.put("reports/r1/thumbs/a.jpg", b"t").await.unwrap();
        store.put("reports/r2/c.jpg", b"c").await.unwrap();

        assert_eq!(store.delete_prefix(&report_folder_key("r1")).await, 3);
        assert!(store.list("reports/r1").await.unwrap().is_empty());
        assert_eq!(store.list("reports").await.unwrap(), vec!["reports/r2/c.jpg"]);
    }

    #[tokio::test]
    async fn delete_prefix_on_missing_folder() {
        let (_tmp, store) = store().await;
        assert_eq!(store.delete_prefix("reports/none").await, 0);
        store.delete("reports/none/x.jpg").await.unwrap();
    }
}
