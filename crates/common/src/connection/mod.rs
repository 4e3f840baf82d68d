//! File-system operations over a storage backend
//!
//! A [`Connection`] is the operation surface a mount talks to. Two account
//! kinds implement it:
//!
//! - [`BlockBlob`]: flat namespace; directories are marker objects or
//!   merely common prefixes, permissions are not stored
//! - [`Datalake`]: hierarchical namespace; directories are real entities
//!   and permissions persist. Byte-level work is delegated to [`BlockBlob`]
//!
//! [`ContainerClients`] caches one connection per container.

mod block_blob;
mod clients;
mod datalake;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::StorageBackend;
use serde::{Deserialize, Serialize};

use crate::blocks::BlockMap;
use crate::config::EngineConfig;
use crate::entry::DirectoryEntry;
use crate::error::EngineError;
use crate::observer::Observer;
use crate::path::DirectoryPage;

pub use block_blob::BlockBlob;
pub use clients::ContainerClients;
pub use datalake::Datalake;

/// Capability variant of a storage account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Flat namespace block blobs
    #[default]
    Block,
    /// Hierarchical namespace (data lake)
    Adls,
}

/// An open object and its lazily loaded block layout.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    path: String,
    name: String,
    size: u64,
    block_map: Option<BlockMap>,
}

impl ObjectHandle {
    pub(crate) fn new(path: String, name: String, size: u64, block_map: Option<BlockMap>) -> Self {
        Self {
            path,
            name,
            size,
            block_map,
        }
    }

    /// Mount path of the object.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Backend object name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size including unflushed edits.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn block_map(&self) -> Option<&BlockMap> {
        self.block_map.as_ref()
    }

    /// Whether a flush has anything to persist.
    pub fn is_dirty(&self) -> bool {
        self.block_map.as_ref().is_some_and(BlockMap::is_dirty)
    }
}

/// File-system operations of a mounted container.
///
/// Paths are mount-relative and slash separated.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> AccountKind;

    async fn exists(&self, path: &str) -> Result<bool, EngineError> {
        match self.get_attr(path).await {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_attr(&self, path: &str) -> Result<DirectoryEntry, EngineError>;

    /// One page of a directory listing.
    async fn list(
        &self,
        path: &str,
        token: Option<String>,
        page_size: Option<usize>,
    ) -> Result<DirectoryPage, EngineError>;

    /// Every entry of a directory.
    async fn read_dir(&self, path: &str) -> Result<Vec<DirectoryEntry>, EngineError> {
        let mut entries = Vec::new();
        let mut token = None;
        loop {
            let page = self.list(path, token, None).await?;
            entries.extend(page.entries);
            match page.next_token {
                Some(next) => token = Some(next),
                None => return Ok(entries),
            }
        }
    }

    /// Whether the directory at `path` has no entries.
    async fn is_dir_empty(&self, path: &str) -> Result<bool, EngineError>;

    async fn create_file(&self, path: &str) -> Result<ObjectHandle, EngineError>;
    async fn create_directory(&self, path: &str) -> Result<(), EngineError>;
    async fn create_link(&self, path: &str, target: &str) -> Result<(), EngineError>;
    async fn read_link(&self, path: &str) -> Result<String, EngineError>;

    async fn delete_file(&self, path: &str) -> Result<(), EngineError>;
    async fn delete_directory(&self, path: &str) -> Result<(), EngineError>;
    async fn rename_file(&self, from: &str, to: &str) -> Result<(), EngineError>;
    async fn rename_directory(&self, from: &str, to: &str) -> Result<(), EngineError>;

    /// Read `len` bytes at `offset`; a zero length reads to the end.
    async fn read_buffer(&self, path: &str, offset: u64, len: u64) -> Result<Bytes, EngineError>;
    /// Replace the object with `data` in one upload.
    async fn write_from_buffer(&self, path: &str, data: Bytes) -> Result<(), EngineError>;

    async fn open(&self, path: &str) -> Result<ObjectHandle, EngineError>;
    async fn write(
        &self,
        handle: &mut ObjectHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, EngineError>;
    async fn flush(&self, handle: &mut ObjectHandle) -> Result<(), EngineError>;
    async fn truncate(&self, handle: &mut ObjectHandle, size: u64) -> Result<(), EngineError>;

    /// Resize the object at `path` and persist the result.
    async fn truncate_file(&self, path: &str, size: u64) -> Result<(), EngineError> {
        let mut handle = self.open(path).await?;
        self.truncate(&mut handle, size).await?;
        self.flush(&mut handle).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), EngineError>;
    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), EngineError>;
}

/// Build the connection for `config.account` over `backend`.
pub fn connect(
    config: &EngineConfig,
    backend: Arc<dyn StorageBackend>,
    observer: Arc<dyn Observer>,
) -> Arc<dyn Connection> {
    let block = BlockBlob::new(config, backend, observer);
    match config.account {
        AccountKind::Block => Arc::new(block),
        AccountKind::Adls => Arc::new(Datalake::new(block)),
    }
}
