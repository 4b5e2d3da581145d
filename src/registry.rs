//! Per-path store registry
//!
//! At most one `FileStore` per path within a registry. Stores open lazily on
//! first use and are shared as `Arc`s. Paths are keyed absolute, relative to
//! the current directory, with `.` components dropped; `..` and symlinks are
//! not resolved.
//!
//! ## Lifecycle
//! - `open` creates or reuses the store for a path
//! - `close` forgets a path; the file handle is released once the last
//!   outstanding `Arc` is dropped
//! - dropping the registry closes everything it still holds
//!
//! Closing never flushes. Flush through the store before closing.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::Config;
use crate::error::{CellDbError, Result};
use crate::store::FileStore;

type Slot = Arc<OnceCell<Arc<FileStore>>>;

/// Keyed cache of open stores
pub struct Registry {
    /// Settings applied to every store; `path` is replaced per open
    template: Config,

    /// path -> lazily opened store
    ///
    /// The map lock only guards slot lookup. Opening happens on the slot, so
    /// a slow open of one path never blocks another.
    stores: Mutex<HashMap<PathBuf, Slot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Registry whose stores share `template` (except for the path)
    pub fn with_config(template: Config) -> Self {
        Self {
            template,
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Store for `path`, opening it on first use
    ///
    /// Concurrent first callers for one path all receive the same instance.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Arc<FileStore>> {
        let path = path.as_ref();
        if path.to_string_lossy().trim().is_empty() {
            return Err(CellDbError::InvalidArgument(
                "store path must not be blank".to_string(),
            ));
        }

        let slot = Arc::clone(self.stores.lock().entry(slot_key(path)).or_default());
        let store = slot.get_or_try_init(|| {
            let mut config = self.template.clone();
            config.path = path.to_path_buf();
            FileStore::open(config).map(Arc::new)
        })?;
        Ok(Arc::clone(store))
    }

    /// Forget `path`; returns false if it was not open
    pub fn close(&self, path: impl AsRef<Path>) -> bool {
        let slot = self.stores.lock().remove(&slot_key(path.as_ref()));
        let closed = slot.is_some_and(Self::release);
        if closed {
            debug!(path = %path.as_ref().display(), "Closed registry store");
        }
        closed
    }

    /// Forget every path
    pub fn close_all(&self) {
        let slots: Vec<Slot> = self.stores.lock().drain().map(|(_, slot)| slot).collect();
        let closed = slots.into_iter().map(Self::release).filter(|&closed| closed).count();
        if closed > 0 {
            debug!(closed, "Closed all registry stores");
        }
    }

    /// Number of open stores
    pub fn len(&self) -> usize {
        self.stores
            .lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_open(&self, path: impl AsRef<Path>) -> bool {
        self.stores
            .lock()
            .get(&slot_key(path.as_ref()))
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Close the slot's store now if nobody else holds it
    ///
    /// False if the slot never finished opening.
    fn release(slot: Slot) -> bool {
        let Some(store) = slot.get().map(Arc::clone) else {
            return false;
        };
        drop(slot);
        if let Ok(store) = Arc::try_unwrap(store) {
            store.close();
        }
        true
    }
}

/// Map key for `path`
fn slot_key(path: &Path) -> PathBuf {
    let absolute = match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    };
    absolute
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.close_all();
    }
}
