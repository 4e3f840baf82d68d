//! Write, flush and truncate behaviour through a connection

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ::common::prelude::*;
use object_store::limits::Limits;
use object_store::StorageBackend;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::common::{pattern, put_raw, setup, small_config, small_limits, ScriptedBackend};

#[tokio::test]
async fn test_small_file_overwrite_extends() {
    let env = setup(small_config()).await;

    let mut handle = env.conn.create_file("notes.txt").await.unwrap();
    env.conn.write(&mut handle, 0, b"test data").await.unwrap();
    env.conn.write(&mut handle, 5, b"newdata").await.unwrap();
    env.conn.flush(&mut handle).await.unwrap();

    assert_eq!(handle.size(), 12);
    let data = env.conn.read_buffer("notes.txt", 0, 0).await.unwrap();
    assert_eq!(&data[..], b"test newdata");
    // Small files never go through stage + commit
    assert_eq!(env.stats.snapshot().commits, 0);
}

#[tokio::test]
async fn test_small_file_sparse_write_zero_fills() {
    let env = setup(small_config()).await;

    let mut handle = env.conn.create_file("sparse.bin").await.unwrap();
    env.conn.write(&mut handle, 4, b"ab").await.unwrap();

    let data = env.conn.read_buffer("sparse.bin", 0, 0).await.unwrap();
    assert_eq!(&data[..], b"\0\0\0\0ab");
}

#[tokio::test]
async fn test_block_write_stages_only_touched_blocks() {
    let env = setup(small_config()).await;
    let original = pattern(40);
    put_raw(&env.store, "data.bin", original.clone()).await;
    assert_eq!(env.store.get_committed_blocks("data.bin").await.unwrap().len(), 10);

    let mut handle = env.conn.open("data.bin").await.unwrap();
    env.conn.write(&mut handle, 12, b"XYZ").await.unwrap();
    assert!(handle.is_dirty());

    let before = env.stats.snapshot();
    env.conn.flush(&mut handle).await.unwrap();
    let after = env.stats.snapshot();
    assert_eq!(after.blocks_staged - before.blocks_staged, 1);
    assert_eq!(after.bytes_staged - before.bytes_staged, 4);
    assert_eq!(after.commits - before.commits, 1);
    assert!(!handle.is_dirty());

    // Nothing changed since the last flush
    env.conn.flush(&mut handle).await.unwrap();
    let again = env.stats.snapshot();
    assert_eq!(again.blocks_staged, after.blocks_staged);
    assert_eq!(again.commits, after.commits);

    let mut expected = original;
    expected[12..15].copy_from_slice(b"XYZ");
    let data = env.conn.read_buffer("data.bin", 0, 0).await.unwrap();
    assert_eq!(&data[..], &expected[..]);
    assert_eq!(env.store.get_committed_blocks("data.bin").await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_fully_covered_blocks_are_not_read() {
    let env = setup(small_config()).await;
    put_raw(&env.store, "data.bin", pattern(40)).await;

    let mut handle = env.conn.open("data.bin").await.unwrap();
    let before = env.stats.snapshot().reads;
    // Partially covers blocks 0 and 2, fully covers block 1
    env.conn.write(&mut handle, 2, b"abcdefgh").await.unwrap();
    assert_eq!(env.stats.snapshot().reads - before, 2);

    env.conn.flush(&mut handle).await.unwrap();
    let data = env.conn.read_buffer("data.bin", 0, 12).await.unwrap();
    let mut expected = pattern(12);
    expected[2..10].copy_from_slice(b"abcdefgh");
    assert_eq!(&data[..], &expected[..]);
}

#[tokio::test]
async fn test_write_past_end_appends_blocks() {
    let env = setup(small_config()).await;
    let original = pattern(40);
    put_raw(&env.store, "grow.bin", original.clone()).await;

    let mut handle = env.conn.open("grow.bin").await.unwrap();
    env.conn.write(&mut handle, 50, b"abc").await.unwrap();
    assert_eq!(handle.size(), 53);
    assert_eq!(handle.block_map().unwrap().blocks.len(), 14);

    let before = env.stats.snapshot();
    env.conn.flush(&mut handle).await.unwrap();
    assert_eq!(env.stats.snapshot().blocks_staged - before.blocks_staged, 4);

    let data = env.conn.read_buffer("grow.bin", 0, 0).await.unwrap();
    assert_eq!(data.len(), 53);
    assert_eq!(&data[..40], &original[..]);
    assert!(data[40..50].iter().all(|b| *b == 0));
    assert_eq!(&data[50..], b"abc");
}

#[tokio::test]
async fn test_truncate_block_object_shrink_then_grow() {
    let env = setup(small_config()).await;
    let original = pattern(40);
    put_raw(&env.store, "trunc.bin", original.clone()).await;

    env.conn.truncate_file("trunc.bin", 30).await.unwrap();
    let data = env.conn.read_buffer("trunc.bin", 0, 0).await.unwrap();
    assert_eq!(&data[..], &original[..30]);

    env.conn.truncate_file("trunc.bin", 40).await.unwrap();
    let data = env.conn.read_buffer("trunc.bin", 0, 0).await.unwrap();
    assert_eq!(data.len(), 40);
    assert_eq!(&data[..30], &original[..30]);
    assert!(data[30..].iter().all(|b| *b == 0));
}

#[tokio::test]
async fn test_truncate_on_block_boundary_commits_without_staging() {
    let env = setup(small_config()).await;
    put_raw(&env.store, "edge.bin", pattern(40)).await;

    let before = env.stats.snapshot();
    env.conn.truncate_file("edge.bin", 8).await.unwrap();
    let after = env.stats.snapshot();
    assert_eq!(after.blocks_staged, before.blocks_staged);
    assert_eq!(after.commits - before.commits, 1);

    assert_eq!(env.store.get_committed_blocks("edge.bin").await.unwrap().len(), 2);
    let data = env.conn.read_buffer("edge.bin", 0, 0).await.unwrap();
    assert_eq!(&data[..], &pattern(8)[..]);
}

#[tokio::test]
async fn test_truncate_small_file() {
    let env = setup(small_config()).await;
    put_raw(&env.store, "hello.txt", "hello world").await;

    env.conn.truncate_file("hello.txt", 5).await.unwrap();
    let data = env.conn.read_buffer("hello.txt", 0, 0).await.unwrap();
    assert_eq!(&data[..], b"hello");

    env.conn.truncate_file("hello.txt", 8).await.unwrap();
    let data = env.conn.read_buffer("hello.txt", 0, 0).await.unwrap();
    assert_eq!(&data[..], b"hello\0\0\0");

    env.conn.truncate_file("hello.txt", 0).await.unwrap();
    assert_eq!(env.conn.get_attr("hello.txt").await.unwrap().size, 0);
}

#[tokio::test]
async fn test_empty_file_truncated_past_upload_limit_becomes_blocks() {
    let env = setup(small_config()).await;
    env.conn.create_file("big.bin").await.unwrap();

    env.conn.truncate_file("big.bin", 30).await.unwrap();

    let blocks = env.store.get_committed_blocks("big.bin").await.unwrap();
    assert_eq!(blocks.len(), 8);
    for block in &blocks {
        // 16 raw bytes encode to 24 base64 characters
        assert_eq!(block.id.len(), 24);
    }
    let data = env.conn.read_buffer("big.bin", 0, 0).await.unwrap();
    assert_eq!(data.len(), 30);
    assert!(data.iter().all(|b| *b == 0));
}

#[tokio::test]
async fn test_failed_stage_keeps_committed_version() {
    let env = setup(small_config()).await;
    let original = pattern(40);
    put_raw(&env.store, "locked.bin", original.clone()).await;

    let mut handle = env.conn.open("locked.bin").await.unwrap();
    env.conn.write(&mut handle, 12, b"XYZ").await.unwrap();

    env.store.acquire_lease("locked.bin", "other-writer").await.unwrap();
    let err = env.conn.flush(&mut handle).await.unwrap_err();
    assert!(matches!(err, EngineError::LeaseConflict(_)));
    assert_eq!(err.errno(), libc::EIO);
    assert!(handle.is_dirty());

    let data = env.conn.read_buffer("locked.bin", 0, 0).await.unwrap();
    assert_eq!(&data[..], &original[..]);

    // The edits survive the failure and a retry persists them
    env.store.release_lease("locked.bin", "other-writer").await.unwrap();
    env.conn.flush(&mut handle).await.unwrap();
    assert!(!handle.is_dirty());
    let data = env.conn.read_buffer("locked.bin", 12, 3).await.unwrap();
    assert_eq!(&data[..], b"XYZ");
}

#[tokio::test]
async fn test_denied_stage_surfaces_permission_error() {
    let env = setup(small_config()).await;
    put_raw(&env.store, "denied.bin", pattern(40)).await;

    let scripted = Arc::new(ScriptedBackend::new(env.store.clone()));
    scripted.fail_stage.store(true, Ordering::SeqCst);
    let conn = connect(&small_config(), scripted.clone(), env.stats.clone());

    let mut handle = conn.open("denied.bin").await.unwrap();
    conn.write(&mut handle, 0, b"zz").await.unwrap();
    let err = conn.flush(&mut handle).await.unwrap_err();
    assert_eq!(err.errno(), libc::EACCES);
    assert_eq!(env.stats.snapshot().commits, 0);
}

#[tokio::test]
async fn test_write_beyond_maximum_size_is_rejected() {
    let env = setup(small_config()).await;
    let max = small_config().limits.max_object_size();

    let mut handle = env.conn.create_file("huge.bin").await.unwrap();
    let err = env.conn.write(&mut handle, max, b"x").await.unwrap_err();
    assert!(matches!(err, EngineError::ObjectTooLarge { .. }));
    assert_eq!(err.errno(), libc::EFBIG);

    let err = env.conn.truncate_file("huge.bin", max + 1).await.unwrap_err();
    assert!(matches!(err, EngineError::ObjectTooLarge { .. }));
}

#[tokio::test]
async fn test_backend_chunked_upload_then_block_write() {
    let env = setup(small_config()).await;
    let original = pattern(20);
    env.conn
        .write_from_buffer("chunked.bin", original.clone().into())
        .await
        .unwrap();
    assert_eq!(env.store.get_committed_blocks("chunked.bin").await.unwrap().len(), 5);

    let mut handle = env.conn.open("chunked.bin").await.unwrap();
    env.conn.write(&mut handle, 2, b"ZZ").await.unwrap();
    assert!(!handle.block_map().unwrap().small_file);
    env.conn.flush(&mut handle).await.unwrap();

    let mut expected = original;
    expected[2..4].copy_from_slice(b"ZZ");
    let data = env.conn.read_buffer("chunked.bin", 0, 0).await.unwrap();
    assert_eq!(&data[..], &expected[..]);
}

/// Apply a write to the expected content of an object.
fn apply_write(model: &mut Vec<u8>, offset: usize, data: &[u8]) {
    let end = offset + data.len();
    if model.len() < end {
        model.resize(end, 0);
    }
    model[offset..end].copy_from_slice(data);
}

async fn assert_content(conn: &dyn Connection, path: &str, expected: &[u8]) {
    let attr = conn.get_attr(path).await.unwrap();
    assert_eq!(attr.size, expected.len() as u64);
    if !expected.is_empty() {
        let data = conn.read_buffer(path, 0, 0).await.unwrap();
        assert_eq!(&data[..], expected);
    }
}

#[tokio::test]
async fn test_sparse_write_keeps_gap_blocks_unbuffered() {
    let env = setup(small_config()).await;
    let original = pattern(20);
    put_raw(&env.store, "sparse.bin", original.clone()).await;

    let mut handle = env.conn.open("sparse.bin").await.unwrap();
    let before = env.stats.snapshot();
    env.conn.write(&mut handle, 60, b"xy").await.unwrap();
    assert_eq!(env.stats.snapshot().reads, before.reads);

    let map = handle.block_map().unwrap();
    assert_eq!(map.blocks.len(), 16);
    for block in &map.blocks[5..15] {
        assert!(block.truncated);
        assert!(!block.dirty);
        assert!(block.data.is_none());
    }
    let last = &map.blocks[15];
    assert_eq!(last.range(), 60..62);
    assert_eq!(last.data.as_deref(), Some(&b"xy"[..]));

    env.conn.flush(&mut handle).await.unwrap();
    let after = env.stats.snapshot();
    assert_eq!(after.blocks_staged - before.blocks_staged, 11);
    assert_eq!(after.bytes_staged - before.bytes_staged, 42);

    let mut expected = original;
    apply_write(&mut expected, 60, b"xy");
    assert_content(env.conn.as_ref(), "sparse.bin", &expected).await;
}

#[tokio::test]
async fn test_overlapping_writes_before_flush() {
    let env = setup(small_config()).await;
    let mut expected = pattern(40);
    put_raw(&env.store, "overlap.bin", expected.clone()).await;

    let mut handle = env.conn.open("overlap.bin").await.unwrap();
    let before = env.stats.snapshot().reads;
    env.conn.write(&mut handle, 44, b"abcdef").await.unwrap();
    apply_write(&mut expected, 44, b"abcdef");
    // Lands on the zero block before the first write and its pending block
    env.conn.write(&mut handle, 42, b"WXYZ").await.unwrap();
    apply_write(&mut expected, 42, b"WXYZ");
    assert_eq!(env.stats.snapshot().reads, before);

    // Crosses from committed content into pending content
    env.conn.write(&mut handle, 38, b"12345").await.unwrap();
    apply_write(&mut expected, 38, b"12345");
    assert_eq!(env.stats.snapshot().reads - before, 1);
    assert_eq!(handle.size(), 50);

    env.conn.flush(&mut handle).await.unwrap();
    assert!(!handle.is_dirty());
    assert_content(env.conn.as_ref(), "overlap.bin", &expected).await;
}

#[tokio::test]
async fn test_grow_then_partial_write_into_zero_region() {
    let env = setup(small_config()).await;
    let mut expected = pattern(20);
    put_raw(&env.store, "grown.bin", expected.clone()).await;

    let mut handle = env.conn.open("grown.bin").await.unwrap();
    env.conn.truncate(&mut handle, 36).await.unwrap();
    expected.resize(36, 0);

    let before = env.stats.snapshot();
    env.conn.write(&mut handle, 26, b"abc").await.unwrap();
    apply_write(&mut expected, 26, b"abc");
    // Zero blocks are never fetched
    assert_eq!(env.stats.snapshot().reads, before.reads);

    // Shorten a zero block that holds no content
    env.conn.truncate(&mut handle, 34).await.unwrap();
    expected.truncate(34);
    assert_eq!(handle.size(), 34);

    env.conn.flush(&mut handle).await.unwrap();
    let after = env.stats.snapshot();
    assert_eq!(after.blocks_staged - before.blocks_staged, 4);
    assert_eq!(after.commits - before.commits, 1);
    assert_content(env.conn.as_ref(), "grown.bin", &expected).await;
}

#[tokio::test]
async fn test_shrink_into_pending_block_then_write_across_end() {
    let env = setup(small_config()).await;
    let mut expected = pattern(40);
    put_raw(&env.store, "shrunk.bin", expected.clone()).await;

    let mut handle = env.conn.open("shrunk.bin").await.unwrap();
    env.conn.write(&mut handle, 30, b"ABCDEFGH").await.unwrap();
    apply_write(&mut expected, 30, b"ABCDEFGH");

    env.conn.truncate(&mut handle, 34).await.unwrap();
    expected.truncate(34);
    let reads = env.stats.snapshot().reads;
    env.conn.write(&mut handle, 33, b"xyz").await.unwrap();
    apply_write(&mut expected, 33, b"xyz");
    // The shortened block is served from memory
    assert_eq!(env.stats.snapshot().reads, reads);

    env.conn.flush(&mut handle).await.unwrap();
    assert_content(env.conn.as_ref(), "shrunk.bin", &expected).await;

    // The committed layout reopens to the same content
    let mut reopened = env.conn.open("shrunk.bin").await.unwrap();
    env.conn.write(&mut reopened, 0, b"!").await.unwrap();
    env.conn.flush(&mut reopened).await.unwrap();
    apply_write(&mut expected, 0, b"!");
    assert_content(env.conn.as_ref(), "shrunk.bin", &expected).await;
}

#[tokio::test]
async fn test_block_count_limit_is_reported() {
    let env = setup(small_config()).await;
    put_raw(&env.store, "many.bin", pattern(120)).await;

    let mut handle = env.conn.open("many.bin").await.unwrap();
    let err = env.conn.write(&mut handle, 120, &pattern(20)).await.unwrap_err();
    assert!(matches!(err, EngineError::TooManyBlocks { blocks: 33, max: 32 }));
    assert_eq!(err.errno(), libc::EFBIG);
    assert!(!handle.is_dirty());
    assert_eq!(handle.block_map().unwrap().blocks.len(), 30);
}

#[tokio::test]
async fn test_random_edits_match_model() {
    let config = EngineConfig {
        limits: Limits {
            max_blocks: 256,
            ..small_limits()
        },
        ..small_config()
    };
    let env = setup(config).await;

    for seed in 0..40u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let path = format!("random/{}.bin", seed);
        let mut handle = env.conn.create_file(&path).await.unwrap();
        let mut expected: Vec<u8> = Vec::new();

        for step in 0..25 {
            match rng.random_range(0..10) {
                0..=4 => {
                    let offset = rng.random_range(0..120usize);
                    let len = rng.random_range(1..12usize);
                    let data: Vec<u8> = (0..len).map(|_| rng.random()).collect();
                    match env.conn.write(&mut handle, offset as u64, &data).await {
                        Ok(written) => {
                            assert_eq!(written, len);
                            apply_write(&mut expected, offset, &data);
                        }
                        Err(EngineError::TooManyBlocks { .. }) => {}
                        Err(e) => panic!("seed {} step {}: write failed: {}", seed, step, e),
                    }
                }
                5..=6 => {
                    let size = rng.random_range(0..120usize);
                    match env.conn.truncate(&mut handle, size as u64).await {
                        Ok(()) => expected.resize(size, 0),
                        Err(EngineError::TooManyBlocks { .. }) => {}
                        Err(e) => panic!("seed {} step {}: truncate failed: {}", seed, step, e),
                    }
                }
                7..=8 => {
                    env.conn.flush(&mut handle).await.unwrap();
                    assert_content(env.conn.as_ref(), &path, &expected).await;
                }
                _ => {
                    env.conn.flush(&mut handle).await.unwrap();
                    handle = env.conn.open(&path).await.unwrap();
                }
            }
            assert_eq!(handle.size(), expected.len() as u64, "seed {} step {}", seed, step);
        }

        env.conn.flush(&mut handle).await.unwrap();
        assert_content(env.conn.as_ref(), &path, &expected).await;
    }
}
