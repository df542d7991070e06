//! Object storage for uploaded dataset files
//!
//! Uploaded datasets live under keys shaped `datasets/{uuid}.{csv|json}`.
//! The port keeps the wire protocol out of scope; the bundled adapter
//! stores objects under a local root directory.

use semantic_firewall_core::{Error, Result};
use std::path::PathBuf;

/// Storage port for dataset objects
pub trait DatasetStorage: Send + Sync {
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<()>;
    fn download(&self, key: &str) -> Result<Vec<u8>>;
    fn delete(&self, key: &str) -> Result<()>;
    fn exists(&self, key: &str) -> bool;
}

/// Filesystem-backed dataset storage
pub struct LocalDatasetStorage {
    root: PathBuf,
}

impl LocalDatasetStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Keys are relative paths; anything escaping the root is rejected
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
            return Err(Error::invalid_input(format!("Invalid storage key: {}", key)));
        }
        Ok(self.root.join(key))
    }
}

impl DatasetStorage for LocalDatasetStorage {
    fn upload(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, bytes)?;
        tracing::info!(key, size = bytes.len(), "Dataset object stored");
        Ok(())
    }

    fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.resolve(key)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("Dataset object not found: {}", key))
            } else {
                Error::Io(e)
            }
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(key, "Dataset object deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.resolve(key)
            .map(|path| path.exists())
            .unwrap_or(false)
    }
}

/// Build the storage key for an uploaded dataset
pub fn dataset_key(dataset_id: &str, file_type: &str) -> String {
    let ext = if file_type == "text/csv" { "csv" } else { "json" };
    format!("datasets/{}.{}", dataset_id, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, LocalDatasetStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalDatasetStorage::new(dir.path().to_path_buf());
        (dir, storage)
    }

    #[test]
    fn test_roundtrip() {
        let (_dir, storage) = storage();
        let key = dataset_key("abc-123", "text/csv");
        assert_eq!(key, "datasets/abc-123.csv");

        storage.upload(&key, b"prompt,type\n").unwrap();
        assert!(storage.exists(&key));
        assert_eq!(storage.download(&key).unwrap(), b"prompt,type\n");

        storage.delete(&key).unwrap();
        assert!(!storage.exists(&key));
    }

    #[test]
    fn test_missing_download_is_not_found() {
        let (_dir, storage) = storage();
        let err = storage.download("datasets/missing.csv").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (_dir, storage) = storage();
        storage.delete("datasets/never-existed.json").unwrap();
    }

    #[test]
    fn test_path_escape_rejected() {
        let (_dir, storage) = storage();
        assert!(storage.upload("../evil", b"x").is_err());
        assert!(storage.upload("/abs/path", b"x").is_err());
        assert!(!storage.exists("datasets/../../etc/passwd"));
    }

    #[test]
    fn test_json_key_extension() {
        assert_eq!(dataset_key("id", "application/json"), "datasets/id.json");
    }
}
