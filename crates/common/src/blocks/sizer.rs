use object_store::limits::Limits;

use crate::error::EngineError;

/// Chooses a block size the backend accepts for an object of a given size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSizer {
    limits: Limits,
    doubling_threshold: u64,
}

impl BlockSizer {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            doubling_threshold: limits.default_block_size,
        }
    }

    /// Keep doubling the default block size up to `threshold` before
    /// switching to an exact `size / max_blocks` computation.
    pub fn with_doubling_threshold(mut self, threshold: u64) -> Self {
        self.doubling_threshold = threshold.max(self.limits.default_block_size);
        self
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Block size for an object of `object_size` bytes.
    ///
    /// Objects that fit a single put get the whole-object ceiling. Larger
    /// objects start from the default block size, doubled while the object
    /// would need more than `max_blocks` blocks; past the doubling threshold
    /// the size becomes `ceil(object_size / max_blocks)` rounded up to a
    /// multiple of 8.
    pub fn size(&self, object_size: u64) -> Result<u64, EngineError> {
        let limits = &self.limits;
        let max = limits.max_object_size();
        if object_size > max {
            return Err(EngineError::ObjectTooLarge {
                size: object_size,
                max,
            });
        }
        if object_size <= limits.max_upload_bytes {
            return Ok(limits.max_upload_bytes);
        }

        let max_blocks = limits.max_blocks.max(1);
        let mut block_size = limits.default_block_size.max(1);
        while object_size.div_ceil(block_size) > max_blocks {
            block_size = block_size.saturating_mul(2);
            if block_size > self.doubling_threshold {
                block_size = round_up_to_8(object_size.div_ceil(max_blocks));
                break;
            }
        }

        if block_size > limits.max_stage_block_bytes {
            return Err(EngineError::BlockSizeExceeded {
                block_size,
                max: limits.max_stage_block_bytes,
            });
        }
        Ok(block_size)
    }
}

fn round_up_to_8(size: u64) -> u64 {
    size.saturating_add(7) & !7
}
