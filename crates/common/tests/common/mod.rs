//! Shared test utilities for engine integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ::common::prelude::*;
use object_store::limits::Limits;
use object_store::{
    BlobStore, BlobStoreError, CommitOptions, CommittedBlock, ListPage, ListRequest, Metadata,
    ObjectProperties, PutOptions, StorageBackend,
};

/// Limits small enough to make chunking observable with a few bytes:
/// puts above 16 bytes are chunked, at most 32 blocks of 64 bytes each.
pub fn small_limits() -> Limits {
    Limits {
        max_upload_bytes: 16,
        max_stage_block_bytes: 64,
        max_blocks: 32,
        default_block_size: 4,
    }
}

pub fn small_config() -> EngineConfig {
    EngineConfig {
        limits: small_limits(),
        ..Default::default()
    }
}

/// Everything a test needs to drive a connection and inspect the backend.
pub struct TestEnv {
    pub conn: Arc<dyn Connection>,
    pub store: Arc<BlobStore>,
    pub stats: Arc<StatsObserver>,
}

/// Route engine logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Set up a connection over a fresh ephemeral store.
pub async fn setup(config: EngineConfig) -> TestEnv {
    init_tracing();
    let store = Arc::new(
        BlobStore::new_ephemeral()
            .await
            .unwrap()
            .with_limits(config.limits),
    );
    let stats = Arc::new(StatsObserver::new());
    let conn = connect(&config, store.clone(), stats.clone());
    TestEnv { conn, store, stats }
}

/// Bytes `0, 1, 2, ...` of the given length.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Store an object directly, bypassing the engine.
pub async fn put_raw(store: &BlobStore, name: &str, data: impl Into<Bytes>) {
    store
        .put_object(name, data.into(), PutOptions::default())
        .await
        .unwrap();
}

/// Store a directory marker directly.
pub async fn put_marker(store: &BlobStore, name: &str) {
    let mut metadata = Metadata::new();
    metadata.insert("hdi_isfolder".to_string(), "true".to_string());
    store
        .put_object(
            name,
            Bytes::new(),
            PutOptions {
                metadata,
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

/// Backend wrapper that injects listing and staging faults.
#[derive(Debug)]
pub struct ScriptedBackend {
    pub inner: Arc<BlobStore>,
    /// Empty pages (with a continuation token) served before real ones
    pub empty_pages: AtomicUsize,
    /// Fail every stage call while set
    pub fail_stage: AtomicBool,
}

impl ScriptedBackend {
    pub fn new(inner: Arc<BlobStore>) -> Self {
        Self {
            inner,
            empty_pages: AtomicUsize::new(0),
            fail_stage: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl StorageBackend for ScriptedBackend {
    async fn get_committed_blocks(&self, name: &str) -> object_store::Result<Vec<CommittedBlock>> {
        self.inner.get_committed_blocks(name).await
    }

    async fn stage_block(&self, name: &str, id: &str, payload: Bytes) -> object_store::Result<()> {
        if self.fail_stage.load(Ordering::SeqCst) {
            return Err(BlobStoreError::PermissionDenied(format!("stage {}", name)));
        }
        self.inner.stage_block(name, id, payload).await
    }

    async fn commit_block_list(
        &self,
        name: &str,
        ids: &[String],
        options: CommitOptions,
    ) -> object_store::Result<()> {
        self.inner.commit_block_list(name, ids, options).await
    }

    async fn get_object(&self, name: &str, offset: u64, length: u64) -> object_store::Result<Bytes> {
        self.inner.get_object(name, offset, length).await
    }

    async fn put_object(
        &self,
        name: &str,
        payload: Bytes,
        options: PutOptions,
    ) -> object_store::Result<()> {
        self.inner.put_object(name, payload, options).await
    }

    async fn list_by_prefix(&self, request: ListRequest) -> object_store::Result<ListPage> {
        let remaining = self.empty_pages.load(Ordering::SeqCst);
        if remaining > 0 {
            self.empty_pages.store(remaining - 1, Ordering::SeqCst);
            return Ok(ListPage {
                items: Vec::new(),
                prefixes: Vec::new(),
                next_marker: Some(request.marker.unwrap_or_default()),
            });
        }
        self.inner.list_by_prefix(request).await
    }

    async fn get_properties(&self, name: &str) -> object_store::Result<ObjectProperties> {
        self.inner.get_properties(name).await
    }

    async fn set_metadata(&self, name: &str, metadata: Metadata) -> object_store::Result<()> {
        self.inner.set_metadata(name, metadata).await
    }

    async fn delete_object(&self, name: &str) -> object_store::Result<()> {
        self.inner.delete_object(name).await
    }

    async fn copy_object(&self, source: &str, target: &str) -> object_store::Result<()> {
        self.inner.copy_object(source, target).await
    }
}
