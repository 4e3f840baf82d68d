//! Service limits of a block-blob account.

use serde::{Deserialize, Serialize};

/// 1 MiB.
pub const MIB: u64 = 1024 * 1024;

/// Largest payload accepted by a single whole-object put (256 MiB).
pub const MAX_UPLOAD_BLOB_BYTES: u64 = 256 * MIB;

/// Largest payload accepted for one staged block (4000 MiB).
pub const MAX_STAGE_BLOCK_BYTES: u64 = 4000 * MIB;

/// Maximum number of committed blocks per object.
pub const MAX_BLOCKS: u64 = 50_000;

/// Default block size used when chunking (4 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * MIB;

/// Byte length of freshly generated block identifiers (before base64).
pub const DEFAULT_BLOCK_ID_LENGTH: usize = 16;

/// Size and count limits enforced by the backend and honoured by the
/// write engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Whole-object put ceiling; larger payloads are chunked.
    pub max_upload_bytes: u64,
    /// Maximum bytes per staged block.
    pub max_stage_block_bytes: u64,
    /// Maximum committed blocks per object.
    pub max_blocks: u64,
    /// Smallest block size chosen when an object must be chunked.
    pub default_block_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BLOB_BYTES,
            max_stage_block_bytes: MAX_STAGE_BLOCK_BYTES,
            max_blocks: MAX_BLOCKS,
            default_block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl Limits {
    /// Largest object representable with these limits.
    pub fn max_object_size(&self) -> u64 {
        self.max_blocks.saturating_mul(self.max_stage_block_bytes)
    }

    /// Block size the upload path uses to chunk a `size`-byte payload:
    /// just enough to stay under the block count, never below the default.
    pub fn upload_block_size(&self, size: u64) -> u64 {
        size.div_ceil(self.max_blocks.max(1))
            .max(self.default_block_size)
            .max(1)
    }
}
