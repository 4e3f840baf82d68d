use bytes::BytesMut;
use object_store::limits::DEFAULT_BLOCK_ID_LENGTH;
use object_store::PutOptions;

use super::{load_block_map, Block, BlockMap, WriteEngine};
use crate::error::EngineError;
use crate::observer::EngineEvent;

impl WriteEngine<'_> {
    /// Resize object `name` to `size` bytes.
    ///
    /// Block-based objects are resized in memory: shrinking drops trailing
    /// blocks and shortens the one containing the new end, growing appends
    /// zero-filled blocks. Small files are rewritten whole, except that an
    /// empty small file grown past the whole-object ceiling is promoted to
    /// a list of zero blocks instead of being buffered.
    pub async fn truncate(
        &self,
        name: &str,
        map: &mut BlockMap,
        size: u64,
    ) -> Result<(), EngineError> {
        let max = self.sizer.limits().max_object_size();
        if size > max {
            return Err(EngineError::ObjectTooLarge { size, max });
        }

        if map.small_file {
            return self.truncate_small(name, map, size).await;
        }

        let current = map.size();
        if size < current {
            self.shrink(name, map, size).await
        } else if size > current {
            self.grow(map, size)
        } else {
            Ok(())
        }
    }

    async fn truncate_small(
        &self,
        name: &str,
        map: &mut BlockMap,
        size: u64,
    ) -> Result<(), EngineError> {
        let props = self.backend.get_properties(name).await?;
        if props.size == size {
            return Ok(());
        }

        if props.size == 0 && size > self.sizer.limits().max_upload_bytes {
            let mut promoted = BlockMap {
                blocks: Vec::new(),
                small_file: false,
                block_id_len: DEFAULT_BLOCK_ID_LENGTH,
                needs_commit: true,
            };
            self.grow(&mut promoted, size)?;
            tracing::debug!(name = %name, size, blocks = promoted.blocks.len(), "empty file promoted to blocks");
            *map = promoted;
            return Ok(());
        }

        let old = self.read_whole(name, props.size).await?;
        let mut buffer = BytesMut::from(&old[..]);
        buffer.resize(size as usize, 0);

        let options = PutOptions {
            metadata: props.metadata,
            content_type: props.content_type,
            tier: props.tier,
        };
        self.backend
            .put_object(name, buffer.freeze(), options)
            .await?;
        self.observer.record(EngineEvent::ObjectPut { bytes: size });
        tracing::debug!(name = %name, from = props.size, to = size, "small file resized");

        *map = load_block_map(self.backend, name).await?;
        Ok(())
    }

    async fn shrink(&self, name: &str, map: &mut BlockMap, size: u64) -> Result<(), EngineError> {
        if size == 0 {
            map.blocks.clear();
            map.needs_commit = true;
            return Ok(());
        }

        let (_, mut index) = map.binary_search(size);
        if map.blocks[index].start == size {
            // The new end falls on a boundary: keep the previous block whole
            index -= 1;
        }

        let block = &map.blocks[index];
        if block.end > size {
            let keep = size - block.start;
            let data = match &block.data {
                Some(data) => Some(data.slice(..keep as usize)),
                None if block.truncated => None,
                None => {
                    let bytes = self.backend.get_object(name, block.start, keep).await?;
                    self.observer.record(EngineEvent::ObjectRead {
                        bytes: bytes.len() as u64,
                    });
                    Some(bytes)
                }
            };

            let block = &mut map.blocks[index];
            block.dirty = data.is_some() || block.dirty;
            block.data = data;
            block.end = size;
        }

        let dropped = map.blocks.len() - (index + 1);
        map.blocks.truncate(index + 1);
        map.needs_commit = true;
        tracing::debug!(name = %name, size, dropped, "blocks truncated");
        Ok(())
    }

    fn grow(&self, map: &mut BlockMap, size: u64) -> Result<(), EngineError> {
        let current = map.size();
        let planned = self.plan_blocks(map, current, size)?;
        self.check_block_count(map, planned.len())?;

        map.blocks.extend(planned.into_iter().map(|b| Block {
            dirty: false,
            truncated: true,
            data: None,
            ..b
        }));
        Ok(())
    }
}
