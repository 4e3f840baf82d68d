use bytes::{Bytes, BytesMut};
use object_store::{PutOptions, StorageBackend};

use super::{load_block_map, Block, BlockMap, BlockSizer};
use crate::error::EngineError;
use crate::observer::{EngineEvent, Observer};

/// Applies byte-range writes and truncation to a [`BlockMap`].
///
/// Block-based objects are edited in memory only; small files are written
/// through immediately as whole objects.
#[derive(Debug, Clone, Copy)]
pub struct WriteEngine<'a> {
    pub(super) backend: &'a dyn StorageBackend,
    pub(super) observer: &'a dyn Observer,
    pub(super) sizer: BlockSizer,
    pub(super) fixed_block_size: Option<u64>,
}

impl<'a> WriteEngine<'a> {
    pub fn new(
        backend: &'a dyn StorageBackend,
        observer: &'a dyn Observer,
        sizer: BlockSizer,
    ) -> Self {
        Self {
            backend,
            observer,
            sizer,
            fixed_block_size: None,
        }
    }

    /// Use a fixed size for appended blocks instead of sizing per object.
    pub fn with_block_size(mut self, block_size: Option<u64>) -> Self {
        self.fixed_block_size = block_size;
        self
    }

    /// Write `data` at `offset` of object `name`.
    pub async fn write(
        &self,
        name: &str,
        map: &mut BlockMap,
        offset: u64,
        data: &[u8],
    ) -> Result<usize, EngineError> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or_else(|| EngineError::InvalidArgument(format!("{}: offset overflow", name)))?;
        let max = self.sizer.limits().max_object_size();
        if end > max {
            return Err(EngineError::ObjectTooLarge { size: end, max });
        }

        if map.small_file {
            self.write_small(name, map, offset, data).await?;
        } else {
            self.write_blocks(name, map, offset, data).await?;
        }
        Ok(data.len())
    }

    /// Rewrite a small file as a whole object.
    async fn write_small(
        &self,
        name: &str,
        map: &mut BlockMap,
        offset: u64,
        data: &[u8],
    ) -> Result<(), EngineError> {
        let props = self.backend.get_properties(name).await?;
        let old = self.read_whole(name, props.size).await?;

        let offset = offset as usize;
        let end = offset + data.len();
        let buffer = if end <= old.len() {
            let mut buf = BytesMut::from(&old[..]);
            buf[offset..end].copy_from_slice(data);
            buf.freeze()
        } else if old.is_empty() && offset == 0 {
            Bytes::copy_from_slice(data)
        } else {
            let mut buf = BytesMut::zeroed(end);
            buf[..old.len()].copy_from_slice(&old);
            buf[offset..end].copy_from_slice(data);
            buf.freeze()
        };

        let size = buffer.len() as u64;
        let options = PutOptions {
            metadata: props.metadata,
            content_type: props.content_type,
            tier: props.tier,
        };
        self.backend.put_object(name, buffer, options).await?;
        self.observer.record(EngineEvent::ObjectPut { bytes: size });
        tracing::debug!(name = %name, offset, len = data.len(), size, "small file rewritten");

        // The backend may have chunked the payload into blocks
        *map = load_block_map(self.backend, name).await?;
        Ok(())
    }

    /// Apply a write to the block list, appending new blocks past the end.
    async fn write_blocks(
        &self,
        name: &str,
        map: &mut BlockMap,
        offset: u64,
        data: &[u8],
    ) -> Result<(), EngineError> {
        let end = offset + data.len() as u64;
        let current_size = map.size();

        // Plan everything before touching the map so a rejected write leaves it intact
        let new_blocks = if end > current_size {
            self.plan_blocks(map, current_size, end)?
        } else {
            Vec::new()
        };
        self.check_block_count(map, new_blocks.len())?;

        // Appended blocks wholly before the write stay zero-filled without a buffer
        let (gap, written): (Vec<Block>, Vec<Block>) =
            new_blocks.into_iter().partition(|b| b.end <= offset);

        let touched = map.touched(offset, end);
        let span_start = touched
            .clone()
            .next()
            .map(|first| map.blocks[first].start)
            .or_else(|| written.first().map(|b| b.start))
            .unwrap_or(offset);
        let span_end = touched
            .clone()
            .last()
            .map(|last| map.blocks[last].end)
            .unwrap_or(0)
            .max(end);

        let mut scratch = BytesMut::zeroed((span_end - span_start) as usize);
        if !touched.is_empty() {
            self.fill_existing(name, map, touched.clone(), offset, end, span_start, &mut scratch)
                .await?;
        }
        let at = (offset - span_start) as usize;
        scratch[at..at + data.len()].copy_from_slice(data);
        let scratch = scratch.freeze();

        let slice = |block: &Block| {
            scratch.slice((block.start - span_start) as usize..(block.end - span_start) as usize)
        };
        for block in &mut map.blocks[touched.clone()] {
            let data = slice(&*block);
            block.data = Some(data);
            block.dirty = true;
        }
        let zeroed = gap.len();
        map.blocks.extend(gap.into_iter().map(|b| Block {
            dirty: false,
            truncated: true,
            ..b
        }));
        let appended = written.len();
        for mut block in written {
            block.data = Some(slice(&block));
            map.blocks.push(block);
        }

        tracing::debug!(
            name = %name,
            offset,
            len = data.len(),
            touched = touched.len(),
            zeroed,
            appended,
            "blocks modified"
        );
        Ok(())
    }

    /// Copy the current content of the touched blocks into `scratch`,
    /// reading consecutive clean blocks from the backend in one request.
    /// Blocks fully covered by the write are not read.
    #[allow(clippy::too_many_arguments)]
    async fn fill_existing(
        &self,
        name: &str,
        map: &BlockMap,
        touched: std::ops::Range<usize>,
        offset: u64,
        end: u64,
        span_start: u64,
        scratch: &mut BytesMut,
    ) -> Result<(), EngineError> {
        let needs_read = |b: &Block| {
            b.data.is_none() && !b.truncated && !(b.start >= offset && b.end <= end)
        };

        let mut i = touched.start;
        while i < touched.end {
            let block = &map.blocks[i];
            let dst = (block.start - span_start) as usize;
            if let Some(data) = &block.data {
                scratch[dst..dst + data.len()].copy_from_slice(data);
                i += 1;
                continue;
            }
            if !needs_read(block) {
                i += 1;
                continue;
            }

            let run_start = block.start;
            let mut run_end = block.end;
            i += 1;
            while i < touched.end && needs_read(&map.blocks[i]) {
                run_end = map.blocks[i].end;
                i += 1;
            }

            let bytes = self
                .backend
                .get_object(name, run_start, run_end - run_start)
                .await?;
            self.observer.record(EngineEvent::ObjectRead {
                bytes: bytes.len() as u64,
            });
            scratch[dst..dst + bytes.len()].copy_from_slice(&bytes);
        }
        Ok(())
    }

    /// Block size for blocks appended to an object growing to `new_size`.
    pub(super) fn append_block_size(&self, new_size: u64) -> Result<u64, EngineError> {
        let limits = self.sizer.limits();
        let block_size = match self.fixed_block_size {
            Some(size) => size,
            None => self.sizer.size(new_size)?,
        };
        if block_size == 0 || block_size > limits.max_stage_block_bytes {
            return Err(EngineError::BlockSizeExceeded {
                block_size,
                max: limits.max_stage_block_bytes,
            });
        }
        Ok(block_size)
    }

    /// New dirty blocks covering `[from, to)`.
    pub(super) fn plan_blocks(
        &self,
        map: &BlockMap,
        from: u64,
        to: u64,
    ) -> Result<Vec<Block>, EngineError> {
        let block_size = self.append_block_size(to)?;

        let mut blocks: Vec<Block> = Vec::new();
        let mut start = from;
        while start < to {
            let end = (start + block_size).min(to);
            // Unique across existing and planned blocks
            let id = loop {
                let id = map.new_block_id();
                if !blocks.iter().any(|b| b.id == id) {
                    break id;
                }
            };
            blocks.push(Block {
                id,
                start,
                end,
                dirty: true,
                truncated: false,
                data: None,
            });
            start = end;
        }
        Ok(blocks)
    }

    pub(super) fn check_block_count(&self, map: &BlockMap, added: usize) -> Result<(), EngineError> {
        let max = self.sizer.limits().max_blocks;
        let blocks = (map.blocks.len() + added) as u64;
        if blocks > max {
            return Err(EngineError::TooManyBlocks { blocks, max });
        }
        Ok(())
    }

    pub(super) async fn read_whole(&self, name: &str, size: u64) -> Result<Bytes, EngineError> {
        if size == 0 {
            return Ok(Bytes::new());
        }
        let bytes = self.backend.get_object(name, 0, 0).await?;
        self.observer.record(EngineEvent::ObjectRead {
            bytes: bytes.len() as u64,
        });
        Ok(bytes)
    }
}
