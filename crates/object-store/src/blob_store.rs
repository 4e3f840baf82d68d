//! BlobStore - a block-blob service backed by SQLite + object storage.
//!
//! SQLite holds object rows and block lists; payload bytes live in the
//! configured object store under never-reused keys. Every write allocates
//! fresh payload keys and the row update happens in a single transaction,
//! so a failed or half-finished operation never disturbs the committed
//! version of an object. Payloads no longer referenced by any row are
//! garbage collected after the transaction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::backend::{
    CommitOptions, CommittedBlock, ListPage, ListRequest, Metadata, ObjectProperties,
    PutOptions, StorageBackend,
};
use crate::database::{BlockRow, Database, ObjectRow, ObjectWrite};
use crate::error::{BlobStoreError, Result};
use crate::limits::Limits;
use crate::storage::{ObjectStoreConfig, Storage};

/// Block-blob store combining SQLite metadata with object storage.
///
/// # Example
///
/// ```rust,no_run
/// use blobfs_object_store::{BlobStore, PutOptions, StorageBackend};
/// use std::path::Path;
///
/// # async fn example() -> Result<(), blobfs_object_store::BlobStoreError> {
/// let store = BlobStore::new_local(Path::new("/tmp/blobfs")).await?;
/// store
///     .put_object("docs/readme.txt", "hello".into(), PutOptions::default())
///     .await?;
/// let data = store.get_object("docs/readme.txt", 0, 0).await?;
/// assert_eq!(&data[..], b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BlobStore {
    db: Database,
    storage: Storage,
    limits: Limits,
    read_only: Arc<AtomicBool>,
}

impl BlobStore {
    /// Create a new BlobStore with a file-based SQLite database.
    pub async fn new(db_path: &Path, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new BlobStore with an in-memory SQLite database.
    pub async fn in_memory(config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new BlobStore backed by local filesystem.
    pub async fn new_local(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("objects.db");
        let payloads_path = data_dir.join("payloads");
        let config = ObjectStoreConfig::Local {
            path: payloads_path,
        };
        Self::new(&db_path, config).await
    }

    /// Create a fully ephemeral BlobStore (in-memory DB + in-memory object storage).
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(ObjectStoreConfig::Memory).await
    }

    fn from_parts(db: Database, storage: Storage) -> Self {
        Self {
            db,
            storage,
            limits: Limits::default(),
            read_only: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the service limits enforced by this store.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Service limits enforced by this store.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Reject every mutation with `PermissionDenied` while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Take an exclusive lease on an object on behalf of `owner`.
    ///
    /// While the lease is held every mutation of the object fails with
    /// `LeaseConflict`; the store itself never writes with a lease.
    pub async fn acquire_lease(&self, name: &str, owner: &str) -> Result<()> {
        let row = self.require_object(name).await?;
        match row.lease_owner {
            Some(current) if current != owner => Err(BlobStoreError::LeaseConflict(format!(
                "{} (held by {})",
                name, current
            ))),
            _ => {
                self.db.set_lease(name, Some(owner)).await?;
                debug!(name, owner, "lease acquired");
                Ok(())
            }
        }
    }

    /// Release a lease taken by `owner`.
    pub async fn release_lease(&self, name: &str, owner: &str) -> Result<()> {
        let row = self.require_object(name).await?;
        match row.lease_owner {
            Some(current) if current == owner => {
                self.db.set_lease(name, None).await?;
                debug!(name, owner, "lease released");
                Ok(())
            }
            Some(current) => Err(BlobStoreError::LeaseConflict(format!(
                "{} (held by {})",
                name, current
            ))),
            None => Ok(()),
        }
    }

    async fn require_object(&self, name: &str) -> Result<ObjectRow> {
        self.db
            .get_object(name)
            .await?
            .ok_or_else(|| BlobStoreError::NotFound(name.to_string()))
    }

    /// Fail unless `name` may be modified right now.
    async fn ensure_writable(&self, name: &str) -> Result<Option<ObjectRow>> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(BlobStoreError::PermissionDenied(format!(
                "store is read-only: {}",
                name
            )));
        }
        let row = self.db.get_object(name).await?;
        if let Some(owner) = row.as_ref().and_then(|r| r.lease_owner.as_ref()) {
            return Err(BlobStoreError::LeaseConflict(format!(
                "{} (held by {})",
                name, owner
            )));
        }
        Ok(row)
    }

    /// Delete payloads that no row references any more.
    async fn collect_garbage(&self, mut keys: Vec<String>) {
        keys.sort();
        keys.dedup();
        for key in keys {
            match self.db.is_key_referenced(&key).await {
                Ok(true) => {}
                Ok(false) => {
                    if let Err(e) = self.storage.delete_payload(&key).await {
                        warn!(key = %key, error = %e, "failed to delete unreferenced payload");
                    }
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to check payload references");
                }
            }
        }
    }

    /// Validate a block id for `name`: base64, and the same decoded length
    /// as every other block of the object.
    async fn validate_block_id(&self, name: &str, id: &str) -> Result<()> {
        let invalid = || BlobStoreError::InvalidBlockId {
            name: name.to_string(),
            id: id.to_string(),
        };
        let decoded = STANDARD.decode(id).map_err(|_| invalid())?;
        if decoded.is_empty() || decoded.len() > 64 {
            return Err(invalid());
        }

        let staged = self.db.staged_blocks(name).await?;
        let committed = self.db.committed_blocks(name).await?;
        let other = staged.iter().chain(committed.iter()).next();
        if let Some(other) = other {
            let other_len = STANDARD
                .decode(&other.block_id)
                .map(|d| d.len())
                .unwrap_or_default();
            if other_len != decoded.len() {
                return Err(invalid());
            }
        }
        Ok(())
    }

    /// Upload a payload too large for a single put as committed blocks.
    async fn put_chunked(
        &self,
        name: &str,
        payload: Bytes,
        write: &ObjectWrite<'_>,
    ) -> Result<Vec<String>> {
        let size = payload.len() as u64;
        if size > self.limits.max_object_size() {
            return Err(BlobStoreError::TooLarge(format!(
                "{}: {} bytes exceeds {}",
                name,
                size,
                self.limits.max_object_size()
            )));
        }
        let block_size = self.limits.upload_block_size(size) as usize;

        let mut blocks = Vec::new();
        let mut offset = 0usize;
        while offset < payload.len() {
            let end = (offset + block_size).min(payload.len());
            let key = Storage::new_key();
            self.storage
                .put_payload(&key, payload.slice(offset..end))
                .await?;
            blocks.push(BlockRow {
                block_id: STANDARD.encode(uuid::Uuid::new_v4().as_bytes()),
                size: (end - offset) as i64,
                storage_key: key,
            });
            offset = end;
        }

        debug!(name, size, blocks = blocks.len(), block_size, "put chunked into blocks");
        self.db.commit_blocks(write, &blocks).await
    }

    fn properties(row: ObjectRow) -> Result<ObjectProperties> {
        let metadata: Metadata = serde_json::from_str(&row.metadata)?;
        Ok(ObjectProperties {
            name: row.name,
            size: row.size as u64,
            content_type: row.content_type,
            tier: row.tier.and_then(|t| t.parse().ok()),
            metadata,
            created_at: DateTime::from_timestamp_millis(row.created_at).unwrap_or_default(),
            modified_at: DateTime::from_timestamp_millis(row.modified_at).unwrap_or_default(),
        })
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl StorageBackend for BlobStore {
    async fn get_committed_blocks(&self, name: &str) -> Result<Vec<CommittedBlock>> {
        self.require_object(name).await?;
        let blocks = self.db.committed_blocks(name).await?;
        Ok(blocks
            .into_iter()
            .map(|b| CommittedBlock {
                id: b.block_id,
                size: b.size as u64,
            })
            .collect())
    }

    async fn stage_block(&self, name: &str, id: &str, payload: Bytes) -> Result<()> {
        self.ensure_writable(name).await?;
        self.validate_block_id(name, id).await?;
        let size = payload.len() as u64;
        if size > self.limits.max_stage_block_bytes {
            return Err(BlobStoreError::TooLarge(format!(
                "block {} of {}: {} bytes exceeds {}",
                id, name, size, self.limits.max_stage_block_bytes
            )));
        }

        let key = Storage::new_key();
        self.storage.put_payload(&key, payload).await?;
        let block = BlockRow {
            block_id: id.to_string(),
            size: size as i64,
            storage_key: key,
        };
        let replaced = self.db.stage_block(name, &block, now_millis()).await?;

        debug!(name, id, size, "block staged");
        if let Some(replaced) = replaced {
            self.collect_garbage(vec![replaced]).await;
        }
        Ok(())
    }

    async fn commit_block_list(
        &self,
        name: &str,
        ids: &[String],
        options: CommitOptions,
    ) -> Result<()> {
        let existing = self.ensure_writable(name).await?;
        if ids.len() as u64 > self.limits.max_blocks {
            return Err(BlobStoreError::TooLarge(format!(
                "{}: {} blocks exceeds {}",
                name,
                ids.len(),
                self.limits.max_blocks
            )));
        }

        let staged: HashMap<String, BlockRow> = self
            .db
            .staged_blocks(name)
            .await?
            .into_iter()
            .map(|b| (b.block_id.clone(), b))
            .collect();
        let committed: HashMap<String, BlockRow> = self
            .db
            .committed_blocks(name)
            .await?
            .into_iter()
            .map(|b| (b.block_id.clone(), b))
            .collect();

        let mut blocks = Vec::with_capacity(ids.len());
        for id in ids {
            let block = staged
                .get(id)
                .or_else(|| committed.get(id))
                .ok_or_else(|| BlobStoreError::InvalidBlockList {
                    name: name.to_string(),
                    id: id.clone(),
                })?;
            blocks.push(block.clone());
        }
        let size: i64 = blocks.iter().map(|b| b.size).sum();

        let metadata = options
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let content_type = options
            .content_type
            .or_else(|| existing.as_ref().and_then(|r| r.content_type.clone()));
        let tier = options
            .tier
            .map(|t| t.as_str().to_string())
            .or_else(|| existing.as_ref().and_then(|r| r.tier.clone()));

        let write = ObjectWrite {
            name,
            size,
            data_key: None,
            content_type: content_type.as_deref(),
            tier: tier.as_deref(),
            metadata: metadata.as_deref(),
            now: now_millis(),
        };
        let released = self.db.commit_blocks(&write, &blocks).await?;

        info!(name, blocks = blocks.len(), size, "block list committed");
        self.collect_garbage(released).await;
        Ok(())
    }

    async fn get_object(&self, name: &str, offset: u64, length: u64) -> Result<Bytes> {
        let row = self.require_object(name).await?;
        let size = row.size as u64;
        let end = if length == 0 {
            size
        } else {
            offset.saturating_add(length)
        };
        if offset > size || end > size {
            return Err(BlobStoreError::InvalidRange {
                name: name.to_string(),
                offset,
                length,
                size,
            });
        }
        if offset == end {
            return Ok(Bytes::new());
        }

        if let Some(key) = &row.data_key {
            return self.storage.get_payload_range(key, offset..end).await;
        }

        let blocks = self.db.committed_blocks(name).await?;
        let mut out = BytesMut::with_capacity((end - offset) as usize);
        let mut block_start = 0u64;
        for block in blocks {
            let block_end = block_start + block.size as u64;
            if block_end > offset && block_start < end {
                let from = offset.max(block_start) - block_start;
                let to = end.min(block_end) - block_start;
                let part = self
                    .storage
                    .get_payload_range(&block.storage_key, from..to)
                    .await?;
                if out.is_empty() && part.len() as u64 == end - offset {
                    return Ok(part);
                }
                out.extend_from_slice(&part);
            }
            if block_end >= end {
                break;
            }
            block_start = block_end;
        }
        Ok(out.freeze())
    }

    async fn put_object(&self, name: &str, payload: Bytes, options: PutOptions) -> Result<()> {
        self.ensure_writable(name).await?;
        let size = payload.len() as u64;
        let metadata = serde_json::to_string(&options.metadata)?;
        let tier = options.tier.map(|t| t.as_str());

        let mut write = ObjectWrite {
            name,
            size: size as i64,
            data_key: None,
            content_type: options.content_type.as_deref(),
            tier,
            metadata: Some(&metadata),
            now: now_millis(),
        };

        let released = if size > self.limits.max_upload_bytes {
            self.put_chunked(name, payload, &write).await?
        } else if payload.is_empty() {
            self.db.put_object(&write).await?
        } else {
            let key = Storage::new_key();
            self.storage.put_payload(&key, payload).await?;
            write.data_key = Some(&key);
            self.db.put_object(&write).await?
        };

        info!(name, size, "object stored");
        self.collect_garbage(released).await;
        Ok(())
    }

    async fn list_by_prefix(&self, request: ListRequest) -> Result<ListPage> {
        let max_results = request.max_results.max(1);
        let batch = max_results.max(100) as i64;
        let prefix = request.prefix.as_str();

        let mut page = ListPage::default();
        let mut last_emitted: Option<String> = None;
        let mut cursor = request.marker.clone().unwrap_or_default();

        loop {
            let rows = self.db.list_objects_after(prefix, &cursor, batch).await?;
            if rows.is_empty() {
                return Ok(page);
            }

            for row in rows {
                cursor = row.name.clone();
                let rest = &row.name[prefix.len()..];
                let group = request.delimiter.and_then(|d| {
                    rest.find(d)
                        .map(|pos| format!("{}{}", prefix, &rest[..pos + d.len_utf8()]))
                });

                if let Some(group) = &group {
                    // Members of a group are contiguous in name order
                    if page.prefixes.last() == Some(group) || request.marker.as_ref() == Some(group)
                    {
                        continue;
                    }
                }

                if page.items.len() + page.prefixes.len() >= max_results {
                    page.next_marker = last_emitted;
                    return Ok(page);
                }

                match group {
                    Some(group) => {
                        last_emitted = Some(group.clone());
                        page.prefixes.push(group);
                    }
                    None => {
                        last_emitted = Some(row.name.clone());
                        page.items.push(Self::properties(row)?);
                    }
                }
            }
        }
    }

    async fn get_properties(&self, name: &str) -> Result<ObjectProperties> {
        let row = self.require_object(name).await?;
        Self::properties(row)
    }

    async fn set_metadata(&self, name: &str, metadata: Metadata) -> Result<()> {
        if self.ensure_writable(name).await?.is_none() {
            return Err(BlobStoreError::NotFound(name.to_string()));
        }
        let json = serde_json::to_string(&metadata)?;
        if !self.db.set_metadata(name, &json, now_millis()).await? {
            return Err(BlobStoreError::NotFound(name.to_string()));
        }
        debug!(name, "metadata updated");
        Ok(())
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        self.ensure_writable(name).await?;
        let released = self
            .db
            .delete_object(name)
            .await?
            .ok_or_else(|| BlobStoreError::NotFound(name.to_string()))?;
        info!(name, "object deleted");
        self.collect_garbage(released).await;
        Ok(())
    }

    async fn copy_object(&self, source: &str, target: &str) -> Result<()> {
        self.ensure_writable(target).await?;
        let released = self
            .db
            .copy_object(source, target, now_millis())
            .await?
            .ok_or_else(|| BlobStoreError::NotFound(source.to_string()))?;
        info!(source, target, "object copied");
        self.collect_garbage(released).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::MIB;

    fn id(n: u32) -> String {
        STANDARD.encode(n.to_be_bytes())
    }

    async fn store() -> BlobStore {
        BlobStore::new_ephemeral().await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_range() {
        let store = store().await;
        store
            .put_object("a.txt", Bytes::from("hello world"), PutOptions::default())
            .await
            .unwrap();

        assert_eq!(&store.get_object("a.txt", 0, 0).await.unwrap()[..], b"hello world");
        assert_eq!(&store.get_object("a.txt", 6, 5).await.unwrap()[..], b"world");
        assert!(store.get_committed_blocks("a.txt").await.unwrap().is_empty());

        let err = store.get_object("a.txt", 6, 10).await.unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidRange { .. }));

        let err = store.get_object("missing", 0, 0).await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_large_put_is_chunked() {
        let limits = Limits {
            max_upload_bytes: 8,
            max_stage_block_bytes: 64,
            max_blocks: 4,
            default_block_size: 4,
        };
        let store = store().await.with_limits(limits);

        let data: Vec<u8> = (0u8..20).collect();
        store
            .put_object("big", Bytes::from(data.clone()), PutOptions::default())
            .await
            .unwrap();

        let blocks = store.get_committed_blocks("big").await.unwrap();
        // 20 bytes over at most 4 blocks: 5-byte blocks
        assert_eq!(blocks.len(), 4);
        assert!(blocks.iter().all(|b| b.size == 5));
        assert_eq!(&store.get_object("big", 3, 9).await.unwrap()[..], &data[3..12]);

        let too_big = Bytes::from(vec![0u8; 300]);
        let err = store
            .put_object("huge", too_big, PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_stage_and_commit() {
        let store = store().await;
        store.stage_block("f", &id(1), Bytes::from("abc")).await.unwrap();
        store.stage_block("f", &id(2), Bytes::from("def")).await.unwrap();

        // Staged blocks are invisible until committed
        assert!(store.get_properties("f").await.is_err());

        store
            .commit_block_list("f", &[id(1), id(2)], CommitOptions::default())
            .await
            .unwrap();
        assert_eq!(&store.get_object("f", 0, 0).await.unwrap()[..], b"abcdef");

        // Recommit reusing a committed block and a new staged one
        store.stage_block("f", &id(3), Bytes::from("xyz")).await.unwrap();
        store
            .commit_block_list("f", &[id(2), id(3)], CommitOptions::default())
            .await
            .unwrap();
        assert_eq!(&store.get_object("f", 0, 0).await.unwrap()[..], b"defxyz");

        // The dropped block's payload is collected
        assert_eq!(store.storage.count_payloads().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_commit_unknown_block_keeps_old_version() {
        let store = store().await;
        store
            .put_object("f", Bytes::from("old"), PutOptions::default())
            .await
            .unwrap();
        store.stage_block("f", &id(1), Bytes::from("new")).await.unwrap();

        let err = store
            .commit_block_list("f", &[id(1), id(9)], CommitOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidBlockList { .. }));
        assert_eq!(&store.get_object("f", 0, 0).await.unwrap()[..], b"old");
    }

    #[tokio::test]
    async fn test_block_id_validation() {
        let store = store().await;
        let err = store
            .stage_block("f", "not base64!", Bytes::from("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidBlockId { .. }));

        store.stage_block("f", &id(1), Bytes::from("a")).await.unwrap();
        let short = STANDARD.encode([1u8, 2]);
        let err = store
            .stage_block("f", &short, Bytes::from("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::InvalidBlockId { .. }));
    }

    #[tokio::test]
    async fn test_lease_and_read_only() {
        let store = store().await;
        store
            .put_object("f", Bytes::from("data"), PutOptions::default())
            .await
            .unwrap();

        store.acquire_lease("f", "other").await.unwrap();
        let err = store.stage_block("f", &id(1), Bytes::from("x")).await.unwrap_err();
        assert!(matches!(err, BlobStoreError::LeaseConflict(_)));
        let err = store.delete_object("f").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::LeaseConflict(_)));
        store.release_lease("f", "other").await.unwrap();

        store.set_read_only(true);
        let err = store
            .put_object("g", Bytes::from("x"), PutOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BlobStoreError::PermissionDenied(_)));
        // Reads still work
        assert_eq!(&store.get_object("f", 0, 0).await.unwrap()[..], b"data");
    }

    #[tokio::test]
    async fn test_delimited_listing_pages() {
        let store = store().await;
        for name in ["d/a", "d/b/1", "d/b/2", "d/c", "d/e/1", "other"] {
            store
                .put_object(name, Bytes::new(), PutOptions::default())
                .await
                .unwrap();
        }

        let mut names = Vec::new();
        let mut marker = None;
        loop {
            let page = store
                .list_by_prefix(ListRequest {
                    prefix: "d/".to_string(),
                    marker: marker.clone(),
                    max_results: 2,
                    delimiter: Some('/'),
                })
                .await
                .unwrap();
            names.extend(page.items.into_iter().map(|i| i.name));
            names.extend(page.prefixes);
            marker = page.next_marker;
            if marker.is_none() {
                break;
            }
        }
        names.sort();
        assert_eq!(names, vec!["d/a", "d/b/", "d/c", "d/e/"]);
    }

    #[tokio::test]
    async fn test_copy_metadata_delete() {
        let store = store().await;
        let mut metadata = Metadata::new();
        metadata.insert("hdi_isfolder".to_string(), "true".to_string());
        store
            .put_object(
                "dir",
                Bytes::new(),
                PutOptions {
                    metadata,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .put_object("file", Bytes::from(vec![7u8; MIB as usize]), PutOptions::default())
            .await
            .unwrap();

        store.copy_object("file", "copy").await.unwrap();
        store.delete_object("file").await.unwrap();
        assert_eq!(store.get_properties("copy").await.unwrap().size, MIB);
        assert_eq!(store.storage.count_payloads().await.unwrap(), 1);

        let props = store.get_properties("dir").await.unwrap();
        assert_eq!(props.metadata.get("hdi_isfolder").map(String::as_str), Some("true"));

        let err = store.delete_object("file").await.unwrap_err();
        assert!(matches!(err, BlobStoreError::NotFound(_)));
    }
}
