//! PDF byte stores

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BlobError;
use crate::sources::strip_path;

/// Source of original PDF bytes, keyed by filename.
pub trait BlobStore: Send + Sync {
    fn fetch(&self, filename: &str) -> Result<Vec<u8>, BlobError>;
}

/// Reduce a requested name to a single path segment.
fn blob_name(filename: &str) -> Result<&str, BlobError> {
    let name = strip_path(filename);
    if name.is_empty() || name == "." || name == ".." {
        return Err(BlobError::InvalidName(filename.to_string()));
    }
    Ok(name)
}

/// Flat directory of PDFs
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl BlobStore for FsBlobStore {
    fn fetch(&self, filename: &str) -> Result<Vec<u8>, BlobError> {
        let name = blob_name(filename)?;
        let path = self.root.join(name);
        debug!(path = %path.display(), "reading blob");
        match std::fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(BlobError::NotFound(name.to_string())),
            Err(e) => Err(BlobError::Io(e)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, bytes: Vec<u8>) {
        self.blobs.insert(filename.into(), bytes);
    }

    pub fn with(mut self, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(filename, bytes);
        self
    }
}

impl BlobStore for MemoryBlobStore {
    fn fetch(&self, filename: &str) -> Result<Vec<u8>, BlobError> {
        let name = blob_name(filename)?;
        self.blobs
            .get(name)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fs_store_reads_last_segment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("lease.pdf"), b"%PDF-1.7").unwrap();
        let store = FsBlobStore::new(dir.path());

        assert_eq!(store.fetch("lease.pdf").unwrap(), b"%PDF-1.7".to_vec());
        assert_eq!(store.fetch("uploads/2024/lease.pdf").unwrap(), b"%PDF-1.7".to_vec());
        assert_eq!(store.fetch("..\\..\\lease.pdf").unwrap(), b"%PDF-1.7".to_vec());
    }

    #[test]
    fn test_fs_store_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());

        assert!(matches!(store.fetch("nope.pdf"), Err(BlobError::NotFound(n)) if n == "nope.pdf"));
        assert!(matches!(store.fetch(""), Err(BlobError::InvalidName(_))));
        assert!(matches!(store.fetch("a/.."), Err(BlobError::InvalidName(_))));
        assert!(matches!(store.fetch("dir/"), Err(BlobError::InvalidName(_))));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryBlobStore::new().with("a.pdf", vec![1, 2, 3]);
        assert_eq!(store.fetch("folder/a.pdf").unwrap(), vec![1, 2, 3]);
        assert!(matches!(store.fetch("b.pdf"), Err(BlobError::NotFound(_))));
    }
}
