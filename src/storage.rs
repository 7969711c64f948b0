//! Upload storage for job input files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::StorageError;

/// A file held in the upload directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub filename: String,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Flat directory of uploaded inputs. Files stay readable for the life of the
/// process, which covers every job that references them.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
}

impl UploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` under `file_name`, replacing any previous upload.
    pub async fn save(&self, file_name: &str, bytes: &[u8]) -> Result<StoredFile, StorageError> {
        let name = sanitize(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.root.join(name);
        tokio::fs::write(&path, bytes).await?;

        info!(file = %path.display(), size = bytes.len(), "Upload stored");
        stat(name, path).await
    }

    /// Path for a stored file, if it exists.
    pub async fn resolve(&self, file_name: &str) -> Result<Option<PathBuf>, StorageError> {
        let path = self.root.join(sanitize(file_name)?);
        Ok(tokio::fs::try_exists(&path).await?.then_some(path))
    }

    /// Regular files in the store, sorted by name. A missing directory is empty.
    pub async fn list(&self) -> Result<Vec<StoredFile>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push(stat(&name, entry.path()).await?);
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(files)
    }
}

async fn stat(name: &str, path: PathBuf) -> Result<StoredFile, StorageError> {
    let meta = tokio::fs::metadata(&path).await?;
    Ok(StoredFile {
        filename: name.to_string(),
        file_size: meta.len(),
        modified_time: meta.modified().ok().map(DateTime::<Utc>::from),
        file_path: path,
    })
}

/// Accept plain file names only.
fn sanitize(file_name: &str) -> Result<&str, StorageError> {
    let trimmed = file_name.trim();
    let is_plain = !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && !trimmed.contains(['/', '\\', '\0']);

    if is_plain {
        Ok(trimmed)
    } else {
        Err(StorageError::InvalidFileName(file_name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_creates_directory_and_reports_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"));

        let stored = store.save("doc.txt", b"hello world").await.unwrap();
        assert_eq!(stored.filename, "doc.txt");
        assert_eq!(stored.file_size, 11);
        assert_eq!(
            std::fs::read_to_string(&stored.file_path).unwrap(),
            "hello world"
        );
    }

    #[tokio::test]
    async fn path_components_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());

        for bad in ["", "..", "../escape.txt", "nested/doc.txt", "c:\\doc.txt"] {
            assert!(
                matches!(store.save(bad, b"x").await, Err(StorageError::InvalidFileName(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn list_is_sorted_and_skips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        store.save("b.txt", b"b").await.unwrap();
        store.save("a.txt", b"a").await.unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let names: Vec<String> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolve_finds_only_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        store.save("doc.txt", b"x").await.unwrap();

        assert_eq!(
            store.resolve("doc.txt").await.unwrap(),
            Some(dir.path().join("doc.txt"))
        );
        assert_eq!(store.resolve("other.txt").await.unwrap(), None);
    }
}
