//! Engine statistics, reported through an explicitly passed observer.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

/// Something the engine did against the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// One block payload staged
    BlockStaged { bytes: u64 },
    /// A block list committed
    BlockListCommitted { blocks: usize },
    /// A whole-object put
    ObjectPut { bytes: u64 },
    /// A ranged or whole-object read
    ObjectRead { bytes: u64 },
    /// One listing page received from the backend
    ListPage { entries: usize },
}

/// Receives engine events.
pub trait Observer: Send + Sync + Debug {
    fn record(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record(&self, _event: EngineEvent) {}
}

/// Counts events with atomic counters.
#[derive(Debug, Default)]
pub struct StatsObserver {
    blocks_staged: AtomicU64,
    bytes_staged: AtomicU64,
    commits: AtomicU64,
    puts: AtomicU64,
    reads: AtomicU64,
    list_pages: AtomicU64,
    empty_pages: AtomicU64,
}

/// Point-in-time copy of a [`StatsObserver`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub blocks_staged: u64,
    pub bytes_staged: u64,
    pub commits: u64,
    pub puts: u64,
    pub reads: u64,
    pub list_pages: u64,
    pub empty_pages: u64,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            blocks_staged: self.blocks_staged.load(Ordering::Relaxed),
            bytes_staged: self.bytes_staged.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            list_pages: self.list_pages.load(Ordering::Relaxed),
            empty_pages: self.empty_pages.load(Ordering::Relaxed),
        }
    }
}

impl Observer for StatsObserver {
    fn record(&self, event: EngineEvent) {
        match event {
            EngineEvent::BlockStaged { bytes } => {
                self.blocks_staged.fetch_add(1, Ordering::Relaxed);
                self.bytes_staged.fetch_add(bytes, Ordering::Relaxed);
            }
            EngineEvent::BlockListCommitted { .. } => {
                self.commits.fetch_add(1, Ordering::Relaxed);
            }
            EngineEvent::ObjectPut { .. } => {
                self.puts.fetch_add(1, Ordering::Relaxed);
            }
            EngineEvent::ObjectRead { .. } => {
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            EngineEvent::ListPage { entries } => {
                self.list_pages.fetch_add(1, Ordering::Relaxed);
                if entries == 0 {
                    self.empty_pages.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_observer_counts() {
        let stats = StatsObserver::new();
        stats.record(EngineEvent::BlockStaged { bytes: 10 });
        stats.record(EngineEvent::BlockStaged { bytes: 5 });
        stats.record(EngineEvent::BlockListCommitted { blocks: 2 });
        stats.record(EngineEvent::ListPage { entries: 0 });
        stats.record(EngineEvent::ListPage { entries: 3 });

        let snap = stats.snapshot();
        assert_eq!(snap.blocks_staged, 2);
        assert_eq!(snap.bytes_staged, 15);
        assert_eq!(snap.commits, 1);
        assert_eq!(snap.list_pages, 2);
        assert_eq!(snap.empty_pages, 1);
        assert_eq!(snap.puts, 0);
    }
}
