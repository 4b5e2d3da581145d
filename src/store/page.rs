//! Cached page
//!
//! One record-sized byte window held in memory, plus the content fingerprint
//! recorded when it was loaded (or last written back). A page is dirty when
//! its current fingerprint differs from the recorded one; nothing on the
//! mutation path has to flag it.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};
use xxhash_rust::xxh3::xxh3_128;

/// Content fingerprint used for dirty detection
pub(crate) fn fingerprint(bytes: &[u8]) -> u128 {
    xxh3_128(bytes)
}

/// Bytes of one cached record window
///
/// Every handle bound to an offset shares the same `Page`, so the update
/// lock held here serializes read-modify-write across all of them.
pub struct Page {
    len: usize,
    state: Mutex<PageState>,
    update: Mutex<()>,
    hits: AtomicU64,
}

struct PageState {
    bytes: Vec<u8>,
    /// `None` until the page has been written at least once (created pages)
    fingerprint: Option<u128>,
}

impl Page {
    /// Wrap bytes just read from the file
    pub(crate) fn loaded(bytes: Vec<u8>) -> Self {
        let fingerprint = Some(fingerprint(&bytes));
        Self {
            len: bytes.len(),
            state: Mutex::new(PageState { bytes, fingerprint }),
            update: Mutex::new(()),
            hits: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of cache hits served by this page
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Held for the duration of one `Cell::update`
    pub(crate) fn lock_update(&self) -> MutexGuard<'_, ()> {
        self.update.lock()
    }

    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        f(&self.state.lock().bytes)
    }

    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        f(&mut self.state.lock().bytes)
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.state.lock().bytes.clone()
    }

    pub fn is_dirty(&self) -> bool {
        let state = self.state.lock();
        state.fingerprint != Some(fingerprint(&state.bytes))
    }

    /// Copy of the bytes and their fingerprint, if the page is dirty
    pub(crate) fn dirty_snapshot(&self) -> Option<(Vec<u8>, u128)> {
        let state = self.state.lock();
        let current = fingerprint(&state.bytes);
        if state.fingerprint == Some(current) {
            None
        } else {
            Some((state.bytes.clone(), current))
        }
    }

    /// Record that bytes with this fingerprint are now on disk
    pub(crate) fn mark_clean(&self, written: u128) {
        self.state.lock().fingerprint = Some(written);
    }

    /// Force the next flush to write this page
    pub(crate) fn invalidate(&self) {
        self.state.lock().fingerprint = None;
    }
}
