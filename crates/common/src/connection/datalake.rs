use async_trait::async_trait;
use bytes::Bytes;

use super::{AccountKind, BlockBlob, Connection, ObjectHandle};
use crate::entry::{is_folder, DirectoryEntry, PERMISSIONS_KEY};
use crate::error::EngineError;
use crate::path::{ancestors, normalize, DirectoryPage};

const DEFAULT_DIR_PERMISSIONS: u32 = 0o755;
const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;

/// Hierarchical namespace account.
///
/// Directories are real: creating an object creates its missing parents,
/// and listing a directory that does not exist is an error. Permissions
/// are kept in object metadata.
#[derive(Debug, Clone)]
pub struct Datalake {
    block: BlockBlob,
}

impl Datalake {
    pub fn new(block: BlockBlob) -> Self {
        Self { block }
    }

    /// Create marker objects for every missing ancestor of `path`.
    async fn ensure_parents(&self, path: &str) -> Result<(), EngineError> {
        for dir in ancestors(path) {
            match self.block.properties(&dir).await {
                Ok(props) if is_folder(&props.metadata) => {}
                Ok(_) => {
                    return Err(EngineError::AlreadyExists(format!(
                        "{} exists and is not a directory",
                        dir
                    )))
                }
                Err(EngineError::NotFound(_)) => {
                    tracing::debug!(path = %dir, "creating parent directory");
                    self.block.create_directory(&dir).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Fail unless `dir` is the root or an existing directory.
    async fn require_directory(&self, dir: &str) -> Result<(), EngineError> {
        if dir.is_empty() {
            return Ok(());
        }
        let props = self.block.properties(dir).await?;
        if !is_folder(&props.metadata) {
            return Err(EngineError::NotFound(format!("{} is not a directory", dir)));
        }
        Ok(())
    }

    /// Fill in permissions the account always has.
    fn with_permissions(mut entry: DirectoryEntry) -> DirectoryEntry {
        if entry.mode_default {
            entry.mode |= if entry.is_dir {
                DEFAULT_DIR_PERMISSIONS
            } else {
                DEFAULT_FILE_PERMISSIONS
            };
            entry.mode_default = false;
        }
        entry
    }
}

#[async_trait]
impl Connection for Datalake {
    fn kind(&self) -> AccountKind {
        AccountKind::Adls
    }

    async fn get_attr(&self, path: &str) -> Result<DirectoryEntry, EngineError> {
        tracing::trace!(path = %path, "get_attr");
        let path = normalize(path);
        if path.is_empty() {
            return Ok(Self::with_permissions(DirectoryEntry::root()));
        }
        let props = self.block.properties(&path).await?;
        Ok(Self::with_permissions(DirectoryEntry::from_properties(
            path, &props,
        )))
    }

    async fn list(
        &self,
        path: &str,
        token: Option<String>,
        page_size: Option<usize>,
    ) -> Result<DirectoryPage, EngineError> {
        tracing::trace!(path = %path, token = ?token, "list");
        let dir = normalize(path);
        if token.is_none() {
            self.require_directory(&dir).await?;
        }

        let mut page = self.block.lister().list(&dir, token, page_size).await?;
        page.entries = page
            .entries
            .into_iter()
            .map(Self::with_permissions)
            .collect();
        Ok(page)
    }

    async fn is_dir_empty(&self, path: &str) -> Result<bool, EngineError> {
        tracing::trace!(path = %path, "is_dir_empty");
        let dir = normalize(path);
        self.require_directory(&dir).await?;
        self.block.lister().is_empty(&dir).await
    }

    async fn create_file(&self, path: &str) -> Result<ObjectHandle, EngineError> {
        self.ensure_parents(path).await?;
        self.block.create_file(path).await
    }

    async fn create_directory(&self, path: &str) -> Result<(), EngineError> {
        self.ensure_parents(path).await?;
        self.block.create_directory(path).await
    }

    async fn create_link(&self, path: &str, target: &str) -> Result<(), EngineError> {
        self.ensure_parents(path).await?;
        self.block.create_link(path, target).await
    }

    async fn read_link(&self, path: &str) -> Result<String, EngineError> {
        self.block.read_link(path).await
    }

    async fn delete_file(&self, path: &str) -> Result<(), EngineError> {
        self.block.delete_file(path).await
    }

    async fn delete_directory(&self, path: &str) -> Result<(), EngineError> {
        self.block.delete_directory(path).await
    }

    async fn rename_file(&self, from: &str, to: &str) -> Result<(), EngineError> {
        self.ensure_parents(to).await?;
        self.block.rename_file(from, to).await
    }

    async fn rename_directory(&self, from: &str, to: &str) -> Result<(), EngineError> {
        self.ensure_parents(to).await?;
        self.block.rename_directory(from, to).await
    }

    async fn read_buffer(&self, path: &str, offset: u64, len: u64) -> Result<Bytes, EngineError> {
        self.block.read_buffer(path, offset, len).await
    }

    async fn write_from_buffer(&self, path: &str, data: Bytes) -> Result<(), EngineError> {
        self.ensure_parents(path).await?;
        self.block.write_from_buffer(path, data).await
    }

    async fn open(&self, path: &str) -> Result<ObjectHandle, EngineError> {
        self.block.open(path).await
    }

    async fn write(
        &self,
        handle: &mut ObjectHandle,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, EngineError> {
        self.block.write(handle, offset, data).await
    }

    async fn flush(&self, handle: &mut ObjectHandle) -> Result<(), EngineError> {
        self.block.flush(handle).await
    }

    async fn truncate(&self, handle: &mut ObjectHandle, size: u64) -> Result<(), EngineError> {
        self.block.truncate(handle, size).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), EngineError> {
        tracing::trace!(path = %path, mode = %format!("{:o}", mode), "chmod");
        let mut props = self.block.properties(path).await?;
        props
            .metadata
            .insert(PERMISSIONS_KEY.to_string(), format!("{:04o}", mode & 0o7777));
        self.block.set_metadata(path, props.metadata).await
    }

    async fn chown(&self, path: &str, uid: u32, gid: u32) -> Result<(), EngineError> {
        tracing::trace!(path = %path, uid, gid, "chown");
        if self.block.ignore_access_modifiers() {
            return Ok(());
        }
        Err(EngineError::NotSupported(format!("chown: {}", path)))
    }
}
