//! The storage contract the filesystem engine is written against.
//!
//! A backend stores flat-named objects. An object is either a single
//! whole payload ("small") or an ordered list of committed blocks. Blocks
//! are staged individually and become visible only when a block list naming
//! them is committed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// User metadata attached to an object.
pub type Metadata = BTreeMap<String, String>;

/// Access tier recorded on an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    Hot,
    Cool,
    Cold,
    Archive,
}

impl AccessTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessTier::Hot => "hot",
            AccessTier::Cool => "cool",
            AccessTier::Cold => "cold",
            AccessTier::Archive => "archive",
        }
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hot" => Ok(AccessTier::Hot),
            "cool" => Ok(AccessTier::Cool),
            "cold" => Ok(AccessTier::Cold),
            "archive" => Ok(AccessTier::Archive),
            other => Err(format!("unknown access tier: {other}")),
        }
    }
}

/// A committed block as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedBlock {
    /// Base64 block identifier
    pub id: String,
    /// Payload size in bytes
    pub size: u64,
}

/// Properties of a stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectProperties {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub tier: Option<AccessTier>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Options for a whole-object put.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub metadata: Metadata,
    pub content_type: Option<String>,
    pub tier: Option<AccessTier>,
}

/// Options for committing a block list.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    pub content_type: Option<String>,
    pub tier: Option<AccessTier>,
    /// Replacement metadata; `None` keeps the object's current metadata.
    pub metadata: Option<Metadata>,
}

/// One page request of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListRequest {
    /// Only names starting with this prefix are returned
    pub prefix: String,
    /// Continuation marker returned by the previous page
    pub marker: Option<String>,
    /// Maximum entries (items + prefixes) in the page
    pub max_results: usize,
    /// Group names sharing a prefix up to this delimiter
    pub delimiter: Option<char>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects directly under the prefix
    pub items: Vec<ObjectProperties>,
    /// Name groups ending with the delimiter (no object required)
    pub prefixes: Vec<String>,
    /// Marker for the next page, `None` when the listing is exhausted
    pub next_marker: Option<String>,
}

/// Block-blob style storage service.
///
/// This is the only network-facing seam of the filesystem engine; retries,
/// authentication and transport belong to implementations.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Committed block list of an object, in order. Empty for small objects.
    async fn get_committed_blocks(&self, name: &str) -> Result<Vec<CommittedBlock>>;

    /// Stage a block payload under `id`; invisible until committed.
    async fn stage_block(&self, name: &str, id: &str, payload: Bytes) -> Result<()>;

    /// Atomically replace the object's content with the named blocks.
    async fn commit_block_list(&self, name: &str, ids: &[String], options: CommitOptions)
        -> Result<()>;

    /// Read `length` bytes from `offset`; a zero length reads to the end.
    async fn get_object(&self, name: &str, offset: u64, length: u64) -> Result<Bytes>;

    /// Replace the object with a single payload.
    async fn put_object(&self, name: &str, payload: Bytes, options: PutOptions) -> Result<()>;

    /// List one page of names under a prefix.
    async fn list_by_prefix(&self, request: ListRequest) -> Result<ListPage>;

    /// Size, timestamps and metadata of an object.
    async fn get_properties(&self, name: &str) -> Result<ObjectProperties>;

    /// Replace the object's metadata.
    async fn set_metadata(&self, name: &str, metadata: Metadata) -> Result<()>;

    /// Delete an object.
    async fn delete_object(&self, name: &str) -> Result<()>;

    /// Copy an object, content and metadata, to a new name.
    async fn copy_object(&self, source: &str, target: &str) -> Result<()>;
}
