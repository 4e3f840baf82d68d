//! Block-blob storage service backed by SQLite + object storage.
//!
//! This crate defines the [`StorageBackend`] contract the filesystem engine
//! talks to, and [`BlobStore`], an implementation that keeps object rows and
//! block lists in SQLite and payload bytes in pluggable object storage
//! (S3/MinIO/local filesystem/memory).
//!
//! # Features
//!
//! - Whole-object puts, chunked into committed blocks above the upload ceiling
//! - Staged blocks made visible by an atomic block-list commit
//! - Delimited prefix listings with continuation markers
//! - Object leases and a read-only switch for exercising failure paths
//!
//! # Example
//!
//! ```rust,no_run
//! use blobfs_object_store::{BlobStore, CommitOptions, StorageBackend};
//!
//! # async fn example() -> Result<(), blobfs_object_store::BlobStoreError> {
//! let store = BlobStore::new_ephemeral().await?;
//! store.stage_block("video.bin", "AAAAAA==", "part one".into()).await?;
//! store
//!     .commit_block_list("video.bin", &["AAAAAA==".to_string()], CommitOptions::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod blob_store;
mod database;
mod error;
pub mod limits;
mod storage;

pub use backend::{
    AccessTier, CommitOptions, CommittedBlock, ListPage, ListRequest, Metadata, ObjectProperties,
    PutOptions, StorageBackend,
};
pub use blob_store::BlobStore;
pub use error::{BlobStoreError, Result};
pub use limits::Limits;
pub use storage::ObjectStoreConfig;
