/**
 * Block layout of remote objects and the engine
 *  that turns byte-range writes, truncation and
 *  flushes into block stage/commit calls.
 */
pub mod blocks;
/**
 * Engine configuration, loaded from TOML.
 */
pub mod config;
/**
 * File-system operations of a mounted container,
 *  for flat (block blob) and hierarchical (data lake)
 *  accounts, plus the per-container client cache.
 */
pub mod connection;
/**
 * What a file, directory or link looks like
 *  to the caller of the mount.
 */
pub mod entry;
pub mod error;
/**
 * Explicitly passed engine statistics.
 */
pub mod observer;
/**
 * Directory hierarchy over a flat key space:
 *  path mapping and paginated listing.
 */
pub mod path;

pub mod prelude {
    pub use crate::blocks::{BlockMap, BlockSizer, FlushCoordinator, WriteEngine};
    pub use crate::config::EngineConfig;
    pub use crate::connection::{
        connect, AccountKind, BlockBlob, Connection, ContainerClients, Datalake, ObjectHandle,
    };
    pub use crate::entry::DirectoryEntry;
    pub use crate::error::EngineError;
    pub use crate::observer::{EngineEvent, NoopObserver, Observer, StatsObserver};
    pub use crate::path::{DirectoryLister, DirectoryPage, PathVirtualizer};
}
