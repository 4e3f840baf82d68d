use bytes::Bytes;
use object_store::{CommitOptions, StorageBackend};

use super::BlockMap;
use crate::error::EngineError;
use crate::observer::{EngineEvent, Observer};

/// What a flush sent to the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Blocks staged
    pub staged: usize,
    /// Whether a block list was committed
    pub committed: bool,
}

/// Persists the edits of a [`BlockMap`] through stage + commit.
#[derive(Debug, Clone, Copy)]
pub struct FlushCoordinator<'a> {
    backend: &'a dyn StorageBackend,
    observer: &'a dyn Observer,
}

impl<'a> FlushCoordinator<'a> {
    pub fn new(backend: &'a dyn StorageBackend, observer: &'a dyn Observer) -> Self {
        Self { backend, observer }
    }

    /// Stage every modified block, then commit the full ordered id list.
    ///
    /// Dirty blocks are staged with their content, truncated blocks with
    /// zeros (or their shortened content when also dirty); clean blocks are
    /// only referenced by id. A map with nothing to persist issues no
    /// backend calls. On failure nothing is committed and the map keeps its
    /// flags, so the flush can be retried.
    pub async fn flush(
        &self,
        name: &str,
        map: &mut BlockMap,
        options: CommitOptions,
    ) -> Result<FlushOutcome, EngineError> {
        if !map.is_dirty() {
            return Ok(FlushOutcome::default());
        }

        let mut staged = 0;
        for block in &map.blocks {
            let payload = match (&block.data, block.dirty, block.truncated) {
                (Some(data), true, _) => data.clone(),
                (_, _, true) => Bytes::from(vec![0u8; block.len() as usize]),
                (None, true, false) => {
                    return Err(EngineError::InvalidArgument(format!(
                        "{}: dirty block {} has no content",
                        name, block.id
                    )));
                }
                _ => continue,
            };

            let bytes = payload.len() as u64;
            if let Err(e) = self.backend.stage_block(name, &block.id, payload).await {
                tracing::warn!(name = %name, id = %block.id, error = %e, "stage failed, flush aborted");
                return Err(e.into());
            }
            self.observer.record(EngineEvent::BlockStaged { bytes });
            staged += 1;
        }

        let ids = map.ids();
        if let Err(e) = self.backend.commit_block_list(name, &ids, options).await {
            tracing::warn!(name = %name, blocks = ids.len(), error = %e, "commit failed");
            return Err(e.into());
        }
        self.observer
            .record(EngineEvent::BlockListCommitted { blocks: ids.len() });
        tracing::info!(name = %name, staged, blocks = ids.len(), size = map.size(), "block list committed");

        for block in &mut map.blocks {
            block.dirty = false;
            block.truncated = false;
            block.data = None;
        }
        map.small_file = false;
        map.needs_commit = false;

        Ok(FlushOutcome {
            staged,
            committed: true,
        })
    }
}
