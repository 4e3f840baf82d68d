use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{
    AccessTier, BlobStoreError, CommitOptions, ListRequest, Metadata, ObjectProperties,
    PutOptions, StorageBackend,
};

use super::{AccountKind, Connection, ObjectHandle};
use crate::blocks::{load_block_map, BlockMap, BlockSizer, FlushCoordinator, WriteEngine};
use crate::config::EngineConfig;
use crate::entry::{is_folder, is_symlink, DirectoryEntry, FOLDER_KEY, SYMLINK_KEY};
use crate::error::EngineError;
use crate::observer::{EngineEvent, Observer};
use crate::path::{normalize, DirectoryLister, DirectoryPage, PathVirtualizer};

/// Page size used when walking a whole subtree.
const SUBTREE_PAGE_SIZE: usize = 5000;

/// Flat namespace block-blob account.
#[derive(Debug, Clone)]
pub struct BlockBlob {
    backend: Arc<dyn StorageBackend>,
    observer: Arc<dyn Observer>,
    virtualizer: PathVirtualizer,
    lister: DirectoryLister,
    sizer: BlockSizer,
    block_size: Option<u64>,
    default_tier: Option<AccessTier>,
    ignore_access_modifiers: bool,
}

impl BlockBlob {
    pub fn new(
        config: &EngineConfig,
        backend: Arc<dyn StorageBackend>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        let virtualizer = PathVirtualizer::new(&config.prefix_path);
        let lister = DirectoryLister::new(backend.clone(), observer.clone(), virtualizer.clone())
            .with_page_size(config.list_page_size)
            .with_cooldown(Duration::from_secs(config.list_cooldown_secs));

        Self {
            backend,
            observer,
            virtualizer,
            lister,
            sizer: BlockSizer::new(config.limits),
            block_size: config.block_size(),
            default_tier: config.default_tier,
            ignore_access_modifiers: config.ignore_access_modifiers,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    pub fn virtualizer(&self) -> &PathVirtualizer {
        &self.virtualizer
    }

    pub fn lister(&self) -> &DirectoryLister {
        &self.lister
    }

    pub(super) fn ignore_access_modifiers(&self) -> bool {
        self.ignore_access_modifiers
    }

    fn engine(&self) -> WriteEngine<'_> {
        WriteEngine::new(self.backend.as_ref(), self.observer.as_ref(), self.sizer)
            .with_block_size(self.block_size)
    }

    fn flusher(&self) -> FlushCoordinator<'_> {
        FlushCoordinator::new(self.backend.as_ref(), self.observer.as_ref())
    }

    fn content_type(path: &str) -> Option<String> {
        mime_guess::from_path(path).first().map(|m| m.to_string())
    }

    fn commit_options(&self, path: &str) -> CommitOptions {
        CommitOptions {
            content_type: Self::content_type(path),
            tier: self.default_tier,
            metadata: None,
        }
    }

    /// Upload a whole object.
    pub(super) async fn put(
        &self,
        path: &str,
        data: Bytes,
        metadata: Metadata,
    ) -> Result<(), EngineError> {
        let name = self.virtualizer.object_name(path);
        let bytes = data.len() as u64;
        let options = PutOptions {
            metadata,
            content_type: Self::content_type(path),
            tier: self.default_tier,
        };
        self.backend.put_object(&name, data, options).await?;
        self.observer.record(EngineEvent::ObjectPut { bytes });
        Ok(())
    }

    /// Properties of the object behind a mount path.
    pub(super) async fn properties(&self, path: &str) -> Result<ObjectProperties, EngineError> {
        let name = self.virtualizer.object_name(path);
        Ok(self.backend.get_properties(&name).await?)
    }

    pub(super) async fn set_metadata(
        &self,
        path: &str,
        metadata: Metadata,
    ) -> Result<(), EngineError> {
        let name = self.virtualizer.object_name(path);
        Ok(self.backend.set_metadata(&name, metadata).await?)
    }

    /// Every object under a directory, at any depth.
    async fn subtree(&self, path: &str) -> Result<Vec<ObjectProperties>, EngineError> {
        let prefix = self.virtualizer.list_prefix(path);
        let mut objects = Vec::new();
        let mut marker = None;
        loop {
            let page = self
                .backend
                .list_by_prefix(ListRequest {
                    prefix: prefix.clone(),
                    marker,
                    max_results: SUBTREE_PAGE_SIZE,
                    delimiter: None,
                })
                .await?;
            self.observer.record(EngineEvent::ListPage {
                entries: page.items.len(),
            });
            objects.extend(page.items);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => return Ok(objects),
            }
        }
    }

    /// Attributes of a directory that exists only as a name prefix.
    async fn virtual_dir_attr(&self, path: &str) -> Result<DirectoryEntry, EngineError> {
        let page = self
            .backend
            .list_by_prefix(ListRequest {
                prefix: self.virtualizer.list_prefix(path),
                marker: None,
                max_results: 1,
                delimiter: Some('/'),
            })
            .await?;
        if page.items.is_empty() && page.prefixes.is_empty() {
            return Err(EngineError::NotFound(path.to_string()));
        }
        Ok(DirectoryEntry::virtual_dir(normalize(path)))
    }

    async fn copy_then_delete(&self, from: &str, to: &str) -> Result<(), EngineError> {
        self.backend.copy_object(from, to).await?;
        self.backend.delete_object(from).await?;
        Ok(())
    }
}

#[async_trait]
impl Connection for BlockBlob {
    fn kind(&self) -> AccountKind {
        AccountKind::Block
    }

    async fn get_attr(&self, path: &str) -> Result<DirectoryEntry, EngineError> {
        tracing::trace!(path = %path, "get_attr");
        let path = normalize(path);
        if path.is_empty() {
            return Ok(DirectoryEntry::root());
        }
        match self.properties(&path).await {
            Ok(props) => Ok(DirectoryEntry::from_properties(path, &props)),
            Err(EngineError::NotFound(_)) => self.virtual_dir_attr(&path).await,
            Err(e) => Err(e),
        }
    }

    async fn list(
        &self,
        path: &str,
        token: Option<String>,
        page_size: Option<usize>,
    ) -> Result<DirectoryPage, EngineError> {
        tracing::trace!(path = %path, token = ?token, "list");
        // A missing directory lists as empty on a flat namespace
        self.lister.list(path, token, page_size).await
    }

    async fn is_dir_empty(&self, path: &str) -> Result<bool, EngineError> {
        tracing::trace!(path = %path, "is_dir_empty");
        self.lister.is_empty(path).await
    }

    async fn create_file(&self, path: &str) -> Result<ObjectHandle, EngineError> {
        tracing::trace!(path = %path, "create_file");
        let path = normalize(path);
        self.put(&path, Bytes::new(), Metadata::new()).await?;
        let name = self.virtualizer.object_name(&path);
        Ok(ObjectHandle::new(path, name, 0, Some(BlockMap::small())))
    }

    async fn create_directory(&self, path: &str) -> Result<(), EngineError> {
        tracing::trace!(path = %path, "create_directory");
        let mut metadata = Metadata::new();
        metadata.insert(FOLDER_KEY.to_string(), "true".to_string());
        self.put(path, Bytes::new(), metadata).await
    }

    async fn create_link(&self, path: &str, target: &str) -> Result<(), EngineError> {
        tracing::trace!(path = %path, target = %target, "create_link");
        let mut metadata = Metadata::new();
        metadata.insert(SYMLINK_KEY.to_string(), "true".to_string());
        self.put(path, Bytes::copy_from_slice(target.as_bytes()), metadata)
            .await
    }

    async fn read_link(&self, path: &str) -> Result<String, EngineError> {
        tracing::trace!(path = %path, "read_link");
        let props = self.properties(path).await?;
        if !is_symlink(&props.metadata) {
            return Err(EngineError::InvalidArgument(format!(
                "{} is not a symbolic link",
                path
            )));
        }
        let target = self.read_buffer(path, 0, 0).await?;
        String::from_utf8(target.to_vec())
            .map_err(|_| EngineError::InvalidArgument(format!("{}: link target is not UTF-8", path)))
    }

    async fn delete_file(&self, path: &str) -> Result<(), EngineError> {
        tracing::trace!(path = %path, "delete_file");
        let name = self.virtualizer.object_name(path);
        self.backend.delete_object(&name).await?;
        tracing::info!(name = %name, "file deleted");
        Ok(())
    }

    async fn delete_directory(&self, path: &str) -> Result<(), EngineError> {
        tracing::trace!(path = %path, "delete_directory");
        let objects = self.subtree(path).await?;
        for object in &objects {
            self.backend.delete_object(&object.name).await?;
        }

        let marker = self.virtualizer.object_name(path);
        match self.backend.delete_object(&marker).await {
            Ok(()) => {}
            // Virtual directories have no marker
            Err(BlobStoreError::NotFound(_)) if !objects.is_empty() => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(name = %marker, removed = objects.len(), "directory deleted");
        Ok(())
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), EngineError> {
        tracing::trace!(from = %from, to = %to, "rename_file");
        let source = self.virtualizer.object_name(from);
        let target = self.virtualizer.object_name(to);
        self.copy_then_delete(&source, &target).await?;
        tracing::info!(from = %source, to = %target, "file renamed");
        Ok(())
    }

    async fn rename_directory(&self, from: &str, to: &str) -> Result<(), EngineError> {
        tracing::trace!(from = %from, to = %to, "rename_directory");
        let source_prefix = self.virtualizer.list_prefix(from);
        let target_prefix = self.virtualizer.list_prefix(to);
        let objects = self.subtree(from).await?;
        for object in &objects {
            let rest = &object.name[source_prefix.len()..];
            let target = format!("{}{}", target_prefix, rest);
            self.copy_then_delete(&object.name, &target).await?;
        }

        let source = self.virtualizer.object_name(from);
        let target = self.virtualizer.object_name(to);
        match self.copy_then_delete(&source, &target).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) if !objects.is_empty() => {}
            Err(e) => return Err(e),
        }
        tracing::info!(from = %source, to = %target, moved = objects.len(), "directory renamed");
        Ok(())
    }

    async fn read_buffer(&self, path: &str, offset: u64, len: u64) -> Result<Bytes, EngineError> {
        tracing::trace!(path = %path, offset, len, "read_buffer");
        let name = self.virtualizer.object_name(path);
        let bytes = self.backend.get_object(&name, offset, len).await?;
        self.observer.record(EngineEvent::ObjectRead {
            bytes: bytes.len() as u64,
        });
        Ok(bytes)
    }

    async fn write_from_buffer(&self, path: &str, data: Bytes) -> Result<(), EngineError> {
        tracing::trace!(path = %path, len = data.len(), "write_from_buffer");
        let metadata = match self.properties(path).await {
            Ok(props) => props.metadata,
            Err(EngineError::NotFound(_)) => Metadata::new(),
            Err(e) => return Err(e),
        };
        self.put(path, data, metadata).await
    }

    async fn open(&self, path: &str) -> Result<ObjectHandle, EngineError> {
        tracing::trace!(path = %path, "open");
        let path = normalize(path);
        let props = self.properties(&path).await?;
        if is_folder(&props.metadata) {
            return Err(EngineError::InvalidArgument(format!("{} is a directory", path)));
        }
        Ok(ObjectHandle::new(path, props.name, props.size, None))
    }

    async fn write(
        &self,
        handle: &mut ObjectHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, EngineError> {
        tracing::trace!(name = %handle.name, offset, len = data.len(), "write");
        let map = match handle.block_map.take() {
            Some(map) => map,
            None => load_block_map(self.backend.as_ref(), &handle.name).await?,
        };
        let map = handle.block_map.insert(map);
        let written = self.engine().write(&handle.name, map, offset, data).await?;
        handle.size = handle.size.max(offset + written as u64);
        Ok(written)
    }

    async fn flush(&self, handle: &mut ObjectHandle) -> Result<(), EngineError> {
        tracing::trace!(name = %handle.name, "flush");
        let Some(map) = handle.block_map.as_mut() else {
            return Ok(());
        };
        let options = self.commit_options(&handle.path);
        self.flusher().flush(&handle.name, map, options).await?;
        Ok(())
    }

    async fn truncate(&self, handle: &mut ObjectHandle, size: u64) -> Result<(), EngineError> {
        tracing::trace!(name = %handle.name, size, "truncate");
        let map = match handle.block_map.take() {
            Some(map) => map,
            None => load_block_map(self.backend.as_ref(), &handle.name).await?,
        };
        let map = handle.block_map.insert(map);
        self.engine().truncate(&handle.name, map, size).await?;
        handle.size = size;
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), EngineError> {
        tracing::trace!(path = %path, mode = %format!("{:o}", mode), "chmod");
        if self.ignore_access_modifiers {
            return Ok(());
        }
        Err(EngineError::NotSupported(format!(
            "chmod on a flat namespace account: {}",
            path
        )))
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), EngineError> {
        tracing::trace!(path = %path, uid, gid, "chown");
        if self.ignore_access_modifiers {
            return Ok(());
        }
        Err(EngineError::NotSupported(format!("chown: {}", path)))
    }
}
