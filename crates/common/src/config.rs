use std::path::{Path, PathBuf};

use object_store::limits::{Limits, MIB};
use object_store::{AccessTier, ObjectStoreConfig};
use serde::{Deserialize, Serialize};

use crate::connection::AccountKind;
use crate::error::EngineError;

/// Default number of entries requested per listing page.
pub const DEFAULT_LIST_PAGE_SIZE: usize = 5000;

/// Engine configuration, usually loaded from a TOML file.
///
/// ```toml
/// account = "block"
/// container = "media"
/// prefix_path = "projects/2024"
/// block_size_mb = 16
///
/// [storage]
/// data_dir = "/var/lib/blobfs"
///
/// [storage.objects]
/// type = "local"
/// path = "/var/lib/blobfs/payloads"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Account capability: flat block blobs or hierarchical namespace
    #[serde(default)]
    pub account: AccountKind,
    /// Subdirectory of the container presented as the mount root
    #[serde(default)]
    pub prefix_path: String,
    /// Container used when none is named explicitly
    #[serde(default = "default_container")]
    pub container: String,
    /// Fixed size for appended blocks; computed per object when unset
    #[serde(default)]
    pub block_size_mb: Option<u64>,
    /// Entries requested per listing page
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    /// Seconds after start during which listings return nothing
    #[serde(default)]
    pub list_cooldown_secs: u64,
    /// Tier applied to uploaded objects
    #[serde(default)]
    pub default_tier: Option<AccessTier>,
    /// Let chmod/chown succeed as no-ops where unsupported
    #[serde(default)]
    pub ignore_access_modifiers: bool,
    /// Backend service limits
    #[serde(default)]
    pub limits: Limits,
    /// Where the backend keeps its data
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend storage location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StorageConfig {
    /// Directory for per-container SQLite databases; in-memory when unset
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Payload storage, scoped per container
    #[serde(default)]
    pub objects: ObjectStoreConfig,
}

fn default_container() -> String {
    "blobfs".to_string()
}

fn default_list_page_size() -> usize {
    DEFAULT_LIST_PAGE_SIZE
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            account: AccountKind::default(),
            prefix_path: String::new(),
            container: default_container(),
            block_size_mb: None,
            list_page_size: default_list_page_size(),
            list_cooldown_secs: 0,
            default_tier: None,
            ignore_access_modifiers: false,
            limits: Limits::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(source: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&source)
    }

    /// Fixed block size in bytes, if configured and representable.
    pub fn block_size(&self) -> Option<u64> {
        self.block_size_mb.and_then(|mb| mb.checked_mul(MIB))
    }

    /// Database file for one container, if the backend is persistent.
    pub fn database_path(&self, container: &str) -> Option<PathBuf> {
        self.storage
            .data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.db", container)))
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.list_page_size == 0 {
            return Err(EngineError::Config("list_page_size must be positive".into()));
        }
        if self.container.is_empty() {
            return Err(EngineError::Config("container must not be empty".into()));
        }
        let limits = &self.limits;
        if limits.max_blocks == 0 || limits.max_stage_block_bytes == 0 {
            return Err(EngineError::Config(
                "limits.max_blocks and limits.max_stage_block_bytes must be positive".into(),
            ));
        }
        if limits.default_block_size == 0 {
            return Err(EngineError::Config(
                "limits.default_block_size must be positive".into(),
            ));
        }
        if let Some(mb) = self.block_size_mb {
            let block_size = mb.checked_mul(MIB).unwrap_or(u64::MAX);
            if block_size == 0 || block_size > limits.max_stage_block_bytes {
                return Err(EngineError::Config(format!(
                    "block_size_mb must be between 1 and {} MiB",
                    limits.max_stage_block_bytes / MIB
                )));
            }
        }
        Ok(())
    }
}
