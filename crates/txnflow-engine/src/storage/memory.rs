//! In-memory object store
//!
//! Used by tests and local dry runs. Failures can be injected per operation so
//! callers' degraded paths (upload retry, unmoved files) can be exercised.

use super::{calculate_sha256, ObjectReader, ObjectStore, UploadResult};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    buckets: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    failing_uploads: AtomicUsize,
    fail_moves: AtomicBool,
    fail_lists: AtomicBool,
    uploads: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing failure injection.
    pub async fn put(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), data.into());
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make the next `count` uploads fail.
    pub fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    pub fn fail_moves(&self, fail: bool) {
        self.fail_moves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Successful uploads so far.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            bail!("Storage client is closed");
        }
        Ok(())
    }

    fn take_upload_failure(&self) -> bool {
        self.failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>) -> Result<UploadResult> {
        self.ensure_open()?;
        if self.take_upload_failure() {
            bail!("Injected upload failure for {}/{}", bucket, key);
        }

        let result = UploadResult {
            key: key.to_string(),
            checksum: calculate_sha256(&data),
            size: data.len() as i64,
        };
        self.put(bucket, key, data).await;
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    async fn download(&self, bucket: &str, key: &str) -> Result<ObjectReader> {
        self.ensure_open()?;
        let data = self
            .get(bucket, key)
            .await
            .ok_or_else(|| anyhow!("No such object: {}/{}", bucket, key))?;
        Ok(Box::pin(Cursor::new(data)))
    }

    async fn list(&self, bucket: &str) -> Result<Vec<String>> {
        self.ensure_open()?;
        if self.fail_lists.load(Ordering::SeqCst) {
            bail!("Injected listing failure for {}", bucket);
        }
        Ok(self.keys(bucket).await)
    }

    async fn move_object(&self, key: &str, from_bucket: &str, to_bucket: &str) -> Result<()> {
        self.ensure_open()?;
        if self.fail_moves.load(Ordering::SeqCst) {
            bail!("Injected move failure for {}/{}", from_bucket, key);
        }

        let mut buckets = self.buckets.write().await;
        let data = buckets
            .get_mut(from_bucket)
            .and_then(|objects| objects.remove(key))
            .ok_or_else(|| anyhow!("No such object: {}/{}", from_bucket, key))?;
        buckets
            .entry(to_bucket.to_string())
            .or_default()
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.ensure_open()?;
        if let Some(objects) = self.buckets.write().await.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            bail!("Storage client already closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_move_relocates_object() {
        let store = MemoryStore::new();
        store.put("inbound", "a.txt", "payload").await;

        store.move_object("a.txt", "inbound", "archive").await.unwrap();

        assert!(store.keys("inbound").await.is_empty());
        assert_eq!(store.get("archive", "a.txt").await.as_deref(), Some(&b"payload"[..]));
    }

    #[tokio::test]
    async fn test_download_streams_content() {
        let store = MemoryStore::new();
        store.put("inbound", "a.txt", "A|B\n1|2\n").await;

        let mut reader = store.download("inbound", "a.txt").await.unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "A|B\n1|2\n");
    }

    #[tokio::test]
    async fn test_injected_upload_failures_are_consumed() {
        let store = MemoryStore::new();
        store.fail_next_uploads(1);

        assert!(store.upload("out", "x.csv", b"1".to_vec()).await.is_err());
        assert!(store.upload("out", "x.csv", b"1".to_vec()).await.is_ok());
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_close_is_final() {
        let store = MemoryStore::new();
        store.close().await.unwrap();
        assert!(store.list("inbound").await.is_err());
        assert!(store.close().await.is_err());
    }
}
