//! The object-store port boundary (§1, §4.6): content-addressed blob I/O is
//! out of scope, but C2/C6/C5 all need somewhere to put and remove cleaned
//! text, so this defines the trait they share plus a local-filesystem
//! reference implementation for running the pipeline without a live cluster.

use async_trait::async_trait;

use crate::error::{LoaderError, Result};

/// Puts/gets/deletes bytes under an opaque `key`. Keys are caller-chosen
/// (`kiwi-worker`'s preprocess phase uses `<project_file public_id>.txt`,
/// §4.6); the store itself is content-addressed only in the sense that a
/// `LocalBlobStore` keeps one file per key under its root directory.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Reference implementation: one file per key under `root`, mirroring the
/// teacher's plain-filesystem artifact handling. Not content-addressed by
/// hash — `key` is the file_key a caller already generated.
pub struct LocalBlobStore {
    root: std::path::PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<std::path::PathBuf> {
        if key.is_empty() || key.contains("..") || key.starts_with('/') {
            return Err(LoaderError::Decode(format!("invalid blob key: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LoaderError::Decode(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| LoaderError::Decode(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| LoaderError::Decode(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LoaderError::Decode(e.to_string())),
        }
    }
}

/// In-memory fake for tests that don't want to touch the filesystem (§1 test
/// tooling: "a small ... in-memory fake for each external port").
#[derive(Default)]
pub struct FakeBlobStore {
    entries: std::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.entries.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| LoaderError::Decode(format!("no blob for key {key}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_store_round_trips() {
        let dir = std::env::temp_dir().join(format!("kiwi-blob-test-{}", std::process::id()));
        let store = LocalBlobStore::new(&dir);
        store.put("a/b.txt", b"hello").await.unwrap();
        assert_eq!(store.get("a/b.txt").await.unwrap(), b"hello");
        store.delete("a/b.txt").await.unwrap();
        assert!(store.get("a/b.txt").await.is_err());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let store = LocalBlobStore::new("/tmp/kiwi-blob-test-root");
        assert!(store.put("../escape.txt", b"x").await.is_err());
        assert!(store.put("/abs.txt", b"x").await.is_err());
    }

    #[tokio::test]
    async fn fake_store_round_trips() {
        let store = FakeBlobStore::new();
        store.put("k", b"v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), b"v");
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.is_err());
    }
}
