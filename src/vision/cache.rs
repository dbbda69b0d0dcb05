//! Position cache for template matches
//!
//! Remembers where a template was last confirmed together with a color
//! histogram of that spot. A hit is only meaningful while the element has not
//! moved; the template matcher decides how to re-verify it.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::debug;

use super::color::HsHistogram;
use super::geometry::Rect;

/// Cached location of a confirmed template match
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub rect: Rect,
    pub histogram: HsHistogram,
}

#[derive(Debug, Default)]
struct CacheState {
    enabled: bool,
    entries: HashMap<String, CacheEntry>,
}

/// Label -> last confirmed position, guarded by a single lock
#[derive(Debug, Default)]
pub struct PositionCache {
    state: Mutex<CacheState>,
}

impl PositionCache {
    /// Create a disabled, empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable caching; disabling drops every entry
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock();
        state.enabled = enabled;
        if !enabled {
            debug!("Position cache disabled, dropping {} entries", state.entries.len());
            state.entries.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    /// Drop every entry, keeping the enabled flag
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Entry for `label`, only while the cache is enabled
    pub fn get(&self, label: &str) -> Option<CacheEntry> {
        let state = self.state.lock();
        if !state.enabled {
            return None;
        }
        state.entries.get(label).cloned()
    }

    /// Store an entry; ignored while the cache is disabled
    pub fn put(&self, label: &str, rect: Rect, histogram: HsHistogram) {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        debug!("Caching position of '{}' at {}", label, rect);
        state
            .entries
            .insert(label.to_string(), CacheEntry { rect, histogram });
    }

    /// Store the entry produced by `make` only if caching is enabled.
    ///
    /// The check and the insert happen under one lock so a concurrent disable
    /// cannot leave a stale entry behind.
    pub fn put_with<F>(&self, label: &str, make: F)
    where
        F: FnOnce() -> CacheEntry,
    {
        let mut state = self.state.lock();
        if !state.enabled {
            return;
        }
        let entry = make();
        debug!("Caching position of '{}' at {}", label, entry.rect);
        state.entries.insert(label.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
