//! File Store
//!
//! Owns the backing file, the allocation cursor and the page cache.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cell::Cell;
use crate::config::{Config, GrowthPolicy};
use crate::error::{CellDbError, Result};
use crate::record::{is_zeroed, Record, TreeNode};

use super::io;
use super::page::{fingerprint, Page};
use super::trash::TrashHead;

/// Point-in-time I/O and cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Reads that went to the file (cache misses)
    pub file_reads: u64,
    /// Writes that went to the file (saves and flushed pages)
    pub file_writes: u64,
    /// Reads served from the page cache
    pub cache_hits: u64,
    /// Pages currently resident
    pub cached_pages: usize,
    /// Allocation cursor (logical end of file)
    pub cursor: u64,
}

#[derive(Default)]
struct Counters {
    file_reads: AtomicU64,
    file_writes: AtomicU64,
    cache_hits: AtomicU64,
}

/// File-backed record store
///
/// ## Concurrency
/// - `pages`: sharded concurrent map, readers never block each other;
///   first reader wins when two race to load the same offset
/// - `cursor`: atomic fetch-and-add, allocations never overlap
/// - `grow_lock`: serializes file pre-sizing (double-checked)
/// - `trash`: serializes free-list bookkeeping
///
/// ## Persistence
/// Two independent paths write bytes back:
/// - `write` / `Cell::save`: immediate, bypasses dirty tracking
/// - `flush`: writes every cached page whose fingerprint changed since load
///
/// Dropping or closing the store discards unflushed pages.
pub struct FileStore {
    /// Store configuration
    config: Config,

    /// Exclusive handle; shared with blocking I/O tasks
    file: Arc<File>,

    /// Next free byte for append allocation
    cursor: AtomicU64,

    /// Physical file length as far as this process has extended it
    file_len: AtomicU64,

    /// Page cache keyed by record offset
    pages: DashMap<u64, Arc<Page>>,

    /// Serializes pre-sizing; shared with blocking tasks
    grow_lock: Arc<Mutex<()>>,

    /// Free-list head resolution; held for every free-list mutation
    pub(super) trash: Mutex<TrashHead>,

    counters: Counters,
}

impl FileStore {
    /// Open or create a store with the given config
    ///
    /// An empty file gets a default root record at offset 0, written
    /// immediately. A zeroed root is rewritten as the default; a file too
    /// short to hold the root is rejected.
    pub fn open(config: Config) -> Result<Self> {
        if config.path.to_string_lossy().trim().is_empty() {
            return Err(CellDbError::InvalidArgument(
                "store path must not be blank".to_string(),
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.path)?;
        let len = file.metadata()?.len();
        if len > 0 {
            Self::check_root(&file, &config, len)?;
        }

        let store = Self {
            config,
            file: Arc::new(file),
            cursor: AtomicU64::new(len),
            file_len: AtomicU64::new(len),
            pages: DashMap::new(),
            grow_lock: Arc::new(Mutex::new(())),
            trash: Mutex::new(TrashHead::Unresolved),
            counters: Counters::default(),
        };

        if len == 0 {
            let root = Cell::<TreeNode>::create_appended(&store)?;
            root.save()?;
            debug!(path = %store.path().display(), "Initialized empty store with root record");
        }

        debug!(path = %store.path().display(), len, "Opened store");
        Ok(store)
    }

    fn check_root(file: &File, config: &Config, len: u64) -> Result<()> {
        if len < TreeNode::SIZE as u64 {
            return Err(CellDbError::Corrupt(format!(
                "{} is {} bytes, too short for the {}-byte root record",
                config.path.display(),
                len,
                TreeNode::SIZE
            )));
        }

        let mut root = vec![0u8; TreeNode::SIZE];
        io::read_full_at(file, &mut root, 0)?;
        if is_zeroed(&root) {
            TreeNode::default().encode(&mut root);
            io::write_all_at(file, &root, 0)?;
            warn!(path = %config.path.display(), "Root record was zeroed, reset to default");
        }
        Ok(())
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).build())
    }

    /// Root record (offset 0)
    pub fn root(&self) -> Result<Cell<'_, TreeNode>> {
        Cell::read(self, 0)
    }

    pub async fn root_async(&self, token: &CancellationToken) -> Result<Cell<'_, TreeNode>> {
        Cell::read_async(self, 0, token).await
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Reserve `length` bytes at the end of the file
    ///
    /// Never consults the free list; see `allocate_record` for that.
    pub fn allocate(&self, length: usize) -> Result<u64> {
        if length == 0 {
            return Err(CellDbError::InvalidArgument(
                "cannot allocate zero bytes".to_string(),
            ));
        }
        Ok(self.cursor.fetch_add(length as u64, Ordering::SeqCst))
    }

    /// Pre-size the file to hold at least `length` bytes
    ///
    /// With `GrowthPolicy::PowerOfTwo` the new length is rounded up to the
    /// next power of two. Never shrinks the file.
    pub fn reserve(&self, length: u64) -> Result<()> {
        if self.file_len() >= length {
            return Ok(());
        }

        let _guard = self.grow_lock.lock();
        let current = self.file.metadata()?.len();
        if current >= length {
            self.file_len.fetch_max(current, Ordering::SeqCst);
            return Ok(());
        }

        let target = self.growth_target(length);
        self.file.set_len(target)?;
        self.file_len.fetch_max(target, Ordering::SeqCst);
        debug!(from = current, to = target, "Grew store file");
        Ok(())
    }

    pub async fn reserve_async(&self, length: u64, token: &CancellationToken) -> Result<()> {
        if self.file_len() >= length {
            return Ok(());
        }
        if token.is_cancelled() {
            return Err(CellDbError::Cancelled);
        }

        let file = Arc::clone(&self.file);
        let grow_lock = Arc::clone(&self.grow_lock);
        let target = self.growth_target(length);
        let grown = tokio::task::spawn_blocking(move || -> std::io::Result<u64> {
            let _guard = grow_lock.lock();
            let current = file.metadata()?.len();
            if current >= target {
                return Ok(current);
            }
            file.set_len(target)?;
            Ok(target)
        })
        .await??;
        self.file_len.fetch_max(grown, Ordering::SeqCst);
        Ok(())
    }

    /// Pre-size for a record ending at `end` if the growth policy asks for it
    pub(crate) fn grow_for(&self, end: u64) -> Result<()> {
        match self.config.growth {
            GrowthPolicy::Exact => Ok(()),
            GrowthPolicy::PowerOfTwo => self.reserve(end),
        }
    }

    pub(crate) async fn grow_for_async(&self, end: u64, token: &CancellationToken) -> Result<()> {
        match self.config.growth {
            GrowthPolicy::Exact => Ok(()),
            GrowthPolicy::PowerOfTwo => self.reserve_async(end, token).await,
        }
    }

    fn growth_target(&self, length: u64) -> u64 {
        match self.config.growth {
            GrowthPolicy::Exact => length,
            GrowthPolicy::PowerOfTwo => length.next_power_of_two(),
        }
    }

    // =========================================================================
    // Read / Write
    // =========================================================================

    /// Load the `length`-byte page at `offset`, through the cache
    ///
    /// A hit performs no I/O. A miss inside the file performs one read; a miss
    /// entirely past the physical end is known to be zero and reads nothing.
    pub fn read(&self, offset: u64, length: usize) -> Result<Arc<Page>> {
        if let Some(page) = self.cached(offset, length)? {
            return Ok(page);
        }

        let mut bytes = vec![0u8; length];
        if offset < self.file_len() {
            io::read_full_at(&self.file, &mut bytes, offset)?;
            self.counters.file_reads.fetch_add(1, Ordering::Relaxed);
        }
        self.install(offset, length, Page::loaded(bytes))
    }

    pub async fn read_async(
        &self,
        offset: u64,
        length: usize,
        token: &CancellationToken,
    ) -> Result<Arc<Page>> {
        if let Some(page) = self.cached(offset, length)? {
            return Ok(page);
        }

        let bytes = if offset < self.file_len() {
            if token.is_cancelled() {
                return Err(CellDbError::Cancelled);
            }
            let file = Arc::clone(&self.file);
            let bytes = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
                let mut bytes = vec![0u8; length];
                io::read_full_at(&file, &mut bytes, offset)?;
                Ok(bytes)
            })
            .await??;
            self.counters.file_reads.fetch_add(1, Ordering::Relaxed);
            bytes
        } else {
            vec![0u8; length]
        };
        self.install(offset, length, Page::loaded(bytes))
    }

    /// Write bytes straight to the file, bypassing the cache
    pub fn write(&self, offset: u64, bytes: &[u8]) -> Result<()> {
        io::write_all_at(&self.file, bytes, offset)?;
        self.note_write(offset, bytes.len());
        Ok(())
    }

    pub async fn write_async(
        &self,
        offset: u64,
        bytes: Vec<u8>,
        token: &CancellationToken,
    ) -> Result<()> {
        if token.is_cancelled() {
            return Err(CellDbError::Cancelled);
        }
        let file = Arc::clone(&self.file);
        let len = bytes.len();
        tokio::task::spawn_blocking(move || io::write_all_at(&file, &bytes, offset)).await??;
        self.note_write(offset, len);
        Ok(())
    }

    // =========================================================================
    // Flush
    // =========================================================================

    /// Write back every dirty cached page
    ///
    /// Pages cover disjoint ranges, so they are written in parallel by up to
    /// `flush_workers` threads; ordering between pages is unspecified.
    /// Returns the number of pages written.
    pub fn flush(&self) -> Result<usize> {
        self.attach_trash()?;
        let dirty = self.dirty_snapshots();
        if dirty.is_empty() {
            return Ok(0);
        }

        let workers = self.config.flush_workers.clamp(1, dirty.len());
        let per_worker = dirty.len().div_ceil(workers);

        let outcome = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = dirty
                .chunks(per_worker)
                .map(|batch| scope.spawn(move |_| self.write_back(batch)))
                .collect();

            handles.into_iter().try_for_each(|handle| {
                handle
                    .join()
                    .map_err(|_| CellDbError::Task("flush worker panicked".to_string()))?
            })
        });
        outcome.map_err(|_| CellDbError::Task("flush scope panicked".to_string()))??;

        debug!(pages = dirty.len(), workers, "Flushed dirty pages");
        Ok(dirty.len())
    }

    pub async fn flush_async(&self, token: &CancellationToken) -> Result<usize> {
        self.attach_trash_async(token).await?;
        let dirty = self.dirty_snapshots();
        let mut tasks = JoinSet::new();

        for (offset, page, bytes, hash) in dirty {
            if token.is_cancelled() {
                return Err(CellDbError::Cancelled);
            }
            let file = Arc::clone(&self.file);
            tasks.spawn_blocking(move || -> std::io::Result<_> {
                io::write_all_at(&file, &bytes, offset)?;
                Ok((offset, bytes.len(), page, hash))
            });
        }

        let mut flushed = 0;
        while let Some(joined) = tasks.join_next().await {
            let (offset, len, page, hash) = joined??;
            self.note_write(offset, len);
            page.mark_clean(hash);
            flushed += 1;
        }

        if flushed > 0 {
            debug!(pages = flushed, "Flushed dirty pages");
        }
        Ok(flushed)
    }

    /// fsync the backing file
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Release the file handle, discarding unflushed pages
    pub fn close(self) {
        let dirty = self.dirty_pages();
        if dirty > 0 {
            warn!(path = %self.path().display(), dirty, "Closing store with unflushed pages");
        }
        debug!(path = %self.path().display(), "Closed store");
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Allocation cursor (logical length)
    pub fn len(&self) -> u64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical file length known to this store
    pub fn file_len(&self) -> u64 {
        self.file_len.load(Ordering::SeqCst)
    }

    /// Number of cached pages that a flush would write
    pub fn dirty_pages(&self) -> usize {
        self.pages.iter().filter(|entry| entry.value().is_dirty()).count()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            file_reads: self.counters.file_reads.load(Ordering::Relaxed),
            file_writes: self.counters.file_writes.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cached_pages: self.pages.len(),
            cursor: self.len(),
        }
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn cached(&self, offset: u64, length: usize) -> Result<Option<Arc<Page>>> {
        let page = match self.pages.get(&offset) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };
        if page.len() != length {
            return Err(CellDbError::PageSize {
                offset,
                cached: page.len(),
                requested: length,
            });
        }
        page.touch();
        self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        Ok(Some(page))
    }

    /// Insert a freshly loaded page unless a racing reader got there first
    fn install(&self, offset: u64, length: usize, page: Page) -> Result<Arc<Page>> {
        let page = self
            .pages
            .entry(offset)
            .or_insert_with(|| Arc::new(page))
            .value()
            .clone();
        if page.len() != length {
            return Err(CellDbError::PageSize {
                offset,
                cached: page.len(),
                requested: length,
            });
        }
        Ok(page)
    }

    fn dirty_snapshots(&self) -> Vec<(u64, Arc<Page>, Vec<u8>, u128)> {
        self.pages
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .dirty_snapshot()
                    .map(|(bytes, hash)| (*entry.key(), Arc::clone(entry.value()), bytes, hash))
            })
            .collect()
    }

    fn write_back(&self, batch: &[(u64, Arc<Page>, Vec<u8>, u128)]) -> Result<()> {
        for (offset, page, bytes, hash) in batch {
            self.write(*offset, bytes)?;
            page.mark_clean(*hash);
        }
        Ok(())
    }

    /// Drop a cached page; outstanding handles keep a detached copy
    pub(crate) fn evict(&self, offset: u64) {
        self.pages.remove(&offset);
    }

    fn note_write(&self, offset: u64, len: usize) {
        self.counters.file_writes.fetch_add(1, Ordering::Relaxed);
        self.file_len.fetch_max(offset + len as u64, Ordering::SeqCst);
    }

    /// Persist a page's current bytes and mark them clean
    pub(crate) fn save_page(&self, offset: u64, page: &Page) -> Result<()> {
        let bytes = page.snapshot();
        self.write(offset, &bytes)?;
        page.mark_clean(fingerprint(&bytes));
        Ok(())
    }

    pub(crate) async fn save_page_async(
        &self,
        offset: u64,
        page: &Page,
        token: &CancellationToken,
    ) -> Result<()> {
        let bytes = page.snapshot();
        let hash = fingerprint(&bytes);
        self.write_async(offset, bytes, token).await?;
        page.mark_clean(hash);
        Ok(())
    }
}
