//! Block layout of a remote object and the engine that edits it
//!
//! A remote object is either a *small file* (a single payload, no committed
//! blocks) or an ordered list of committed blocks. A [`BlockMap`] mirrors the
//! second form in memory:
//!
//! ```text
//!   [0 ........ 4M)[4M ........ 8M)[8M ... 9.5M)
//!     block "AAA="   block "AAE="    block "AAI="
//! ```
//!
//! - [`BlockSizer`] picks a legal block size for an object size
//! - [`WriteEngine`] turns an arbitrary-offset write into block mutations
//!   (and handles truncation)
//! - [`FlushCoordinator`] stages mutated blocks and commits the full list
//!
//! Edits stay in memory until a flush; a flush that fails leaves the
//! previously committed version of the object untouched.

mod flush;
mod sizer;
mod truncate;
mod write;

use std::ops::Range;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use object_store::limits::DEFAULT_BLOCK_ID_LENGTH;
use object_store::StorageBackend;
use rand::RngCore;

use crate::error::EngineError;

pub use flush::{FlushCoordinator, FlushOutcome};
pub use sizer::BlockSizer;
pub use write::WriteEngine;

/// One block of a remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Base64 block id, fixed decoded length per object
    pub id: String,
    /// First byte covered by the block
    pub start: u64,
    /// One past the last byte covered by the block
    pub end: u64,
    /// Content changed since the last commit
    pub dirty: bool,
    /// Content beyond what the backend holds reads as zeros
    pub truncated: bool,
    /// In-memory content, exactly `end - start` bytes when present
    pub data: Option<Bytes>,
}

impl Block {
    /// A block whose content is already committed.
    pub fn committed(id: String, start: u64, end: u64) -> Self {
        Self {
            id,
            start,
            end,
            dirty: false,
            truncated: false,
            data: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end
    }
}

/// In-memory block layout of a remote object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockMap {
    /// Blocks ordered by `start`, contiguous from zero
    pub blocks: Vec<Block>,
    /// The object has no committed blocks
    pub small_file: bool,
    /// Decoded byte length of this object's block ids
    pub block_id_len: usize,
    /// Layout changed (blocks dropped or shortened) since the last commit
    pub(crate) needs_commit: bool,
}

impl BlockMap {
    /// Layout of an object with no committed blocks.
    pub fn small() -> Self {
        Self {
            small_file: true,
            block_id_len: DEFAULT_BLOCK_ID_LENGTH,
            ..Default::default()
        }
    }

    /// Size of the object described by the layout.
    pub fn size(&self) -> u64 {
        self.blocks.last().map(|b| b.end).unwrap_or(0)
    }

    /// Whether a flush has anything to persist.
    pub fn is_dirty(&self) -> bool {
        self.needs_commit || self.blocks.iter().any(|b| b.dirty || b.truncated)
    }

    /// Locate the block containing `offset`.
    ///
    /// Returns `(true, index)` when found, otherwise `(false, index)` where
    /// `index` is the position such a block would take.
    pub fn binary_search(&self, offset: u64) -> (bool, usize) {
        let index = self.blocks.partition_point(|b| b.end <= offset);
        let found = self
            .blocks
            .get(index)
            .is_some_and(|b| b.start <= offset);
        (found, index)
    }

    /// Indices of the existing blocks overlapping `[offset, end)`.
    pub fn touched(&self, offset: u64, end: u64) -> Range<usize> {
        let (_, first) = self.binary_search(offset);
        let count = self.blocks[first..]
            .iter()
            .take_while(|b| b.start < end)
            .count();
        first..first + count
    }

    /// Ids in commit order.
    pub fn ids(&self) -> Vec<String> {
        self.blocks.iter().map(|b| b.id.clone()).collect()
    }

    /// Generate a block id of this object's id length, unique in the map.
    pub(crate) fn new_block_id(&self) -> String {
        let len = if self.block_id_len == 0 {
            DEFAULT_BLOCK_ID_LENGTH
        } else {
            self.block_id_len
        };
        loop {
            let id = random_block_id(len);
            if !self.blocks.iter().any(|b| b.id == id) {
                return id;
            }
        }
    }
}

fn random_block_id(len: usize) -> String {
    let mut raw = vec![0u8; len];
    rand::rng().fill_bytes(&mut raw);
    STANDARD.encode(raw)
}

/// Build the block layout of `name` from its committed block list.
pub async fn load_block_map(
    backend: &dyn StorageBackend,
    name: &str,
) -> Result<BlockMap, EngineError> {
    let committed = backend.get_committed_blocks(name).await?;
    if committed.is_empty() {
        tracing::debug!(name = %name, "no committed blocks, small file");
        return Ok(BlockMap::small());
    }

    let block_id_len = STANDARD
        .decode(&committed[0].id)
        .map(|raw| raw.len())
        .map_err(|_| {
            EngineError::InvalidArgument(format!(
                "{}: block id {} is not base64",
                name, committed[0].id
            ))
        })?;

    let mut blocks = Vec::with_capacity(committed.len());
    let mut offset = 0u64;
    for block in committed {
        let end = offset + block.size;
        blocks.push(Block::committed(block.id, offset, end));
        offset = end;
    }

    tracing::debug!(name = %name, blocks = blocks.len(), size = offset, "block map loaded");
    Ok(BlockMap {
        blocks,
        small_file: false,
        block_id_len,
        needs_commit: false,
    })
}
