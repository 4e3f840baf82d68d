use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use object_store::{ListRequest, StorageBackend};

use super::PathVirtualizer;
use crate::config::DEFAULT_LIST_PAGE_SIZE;
use crate::entry::{is_folder, DirectoryEntry};
use crate::error::EngineError;
use crate::observer::{EngineEvent, Observer};

const SEPARATOR: char = '/';

/// One page of a directory listing.
#[derive(Debug, Clone, Default)]
pub struct DirectoryPage {
    pub entries: Vec<DirectoryEntry>,
    /// Continuation token; `None` once the directory is exhausted
    pub next_token: Option<String>,
}

/// Drives paginated directory listings over a flat key space.
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    backend: Arc<dyn StorageBackend>,
    observer: Arc<dyn Observer>,
    virtualizer: PathVirtualizer,
    page_size: usize,
    cooldown: Duration,
    started: Instant,
}

impl DirectoryLister {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        observer: Arc<dyn Observer>,
        virtualizer: PathVirtualizer,
    ) -> Self {
        Self {
            backend,
            observer,
            virtualizer,
            page_size: DEFAULT_LIST_PAGE_SIZE,
            cooldown: Duration::ZERO,
            started: Instant::now(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Report every directory as empty for `cooldown` after creation.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn cooling_down(&self) -> bool {
        self.started.elapsed() < self.cooldown
    }

    /// List one page of the directory at mount path `path`.
    ///
    /// Marker objects are reported as directories; common prefixes without
    /// a marker become virtual directories. Pages that yield no entries but
    /// still carry a continuation token are skipped.
    pub async fn list(
        &self,
        path: &str,
        token: Option<String>,
        page_size: Option<usize>,
    ) -> Result<DirectoryPage, EngineError> {
        if self.cooling_down() {
            tracing::debug!(path = %path, "listing suppressed during cool-down");
            return Ok(DirectoryPage::default());
        }
        self.fetch_page(path, token, page_size.unwrap_or(self.page_size))
            .await
    }

    /// Whether the directory at `path` has no entries.
    ///
    /// Asks for a single entry and ignores the cool-down, so a directory
    /// about to be removed is checked against the backend.
    pub async fn is_empty(&self, path: &str) -> Result<bool, EngineError> {
        let page = self.fetch_page(path, None, 1).await?;
        Ok(page.entries.is_empty())
    }

    async fn fetch_page(
        &self,
        path: &str,
        token: Option<String>,
        page_size: usize,
    ) -> Result<DirectoryPage, EngineError> {
        let prefix = self.virtualizer.list_prefix(path);
        let max_results = page_size.max(1);
        let mut marker = token;

        loop {
            let page = self
                .backend
                .list_by_prefix(ListRequest {
                    prefix: prefix.clone(),
                    marker: marker.clone(),
                    max_results,
                    delimiter: Some(SEPARATOR),
                })
                .await?;
            let received = page.items.len() + page.prefixes.len();
            self.observer
                .record(EngineEvent::ListPage { entries: received });

            // Directory markers are authoritative; build their set first
            let markers: HashSet<String> = page
                .items
                .iter()
                .filter(|item| is_folder(&item.metadata))
                .map(|item| format!("{}{}", item.name, SEPARATOR))
                .collect();

            let mut entries = Vec::with_capacity(received);
            for item in &page.items {
                if item.name.len() <= prefix.len() {
                    continue;
                }
                let mount_path = self.virtualizer.mount_path(&item.name).to_string();
                entries.push(DirectoryEntry::from_properties(mount_path, item));
            }

            for group in &page.prefixes {
                if markers.contains(group) {
                    continue;
                }
                let bare = group.trim_end_matches(SEPARATOR);
                // A marker sorting before the previous page boundary was already reported
                if marker.as_deref().is_some_and(|m| bare <= m) && self.is_marker(bare).await? {
                    continue;
                }
                let mount_path = self.virtualizer.mount_path(bare).to_string();
                entries.push(DirectoryEntry::virtual_dir(mount_path));
            }

            if entries.is_empty() && page.next_marker.is_some() {
                tracing::debug!(prefix = %prefix, received, "empty page with continuation, re-querying");
                marker = page.next_marker;
                continue;
            }

            tracing::trace!(
                prefix = %prefix,
                entries = entries.len(),
                more = page.next_marker.is_some(),
                "listing page"
            );
            return Ok(DirectoryPage {
                entries,
                next_token: page.next_marker,
            });
        }
    }

    async fn is_marker(&self, name: &str) -> Result<bool, EngineError> {
        match self.backend.get_properties(name).await {
            Ok(props) => Ok(is_folder(&props.metadata)),
            Err(object_store::BlobStoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
