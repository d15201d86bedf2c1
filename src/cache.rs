// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Decoded parts, keyed by part path.
//!
//! A `PartCache` owns the decoded form of every part of one kind that has
//! been touched. Loading, marking dirty and eviction are explicit calls so
//! that the save path can ask exactly which parts must be serialized again.
//!
//! Each decoded part sits behind its own `Mutex`; the cache lock itself is
//! only held to look up or insert handles, never while a part is decoded or
//! while a handle is locked.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::Result;

/// Shared handle to one decoded part
pub(crate) type Handle<T> = Arc<Mutex<T>>;

/// A part the crate knows how to decode and serialize
pub(crate) trait XmlPart: Sized {
    /// Decodes the part
    fn read<R: BufRead>(reader: R) -> Result<Self>;
    /// Serializes the part
    fn write<W: Write>(&self, writer: W) -> Result<()>;

    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(&mut out)?;
        Ok(out)
    }
}

#[derive(Debug)]
struct State<T> {
    entries: HashMap<String, Handle<T>>,
    dirty: HashSet<String>,
    checked: HashSet<String>,
}

impl<T> Default for State<T> {
    fn default() -> Self {
        State {
            entries: HashMap::new(),
            dirty: HashSet::new(),
            checked: HashSet::new(),
        }
    }
}

/// Decoded parts of one kind, with dirty tracking
#[derive(Debug)]
pub(crate) struct PartCache<T> {
    state: Mutex<State<T>>,
}

impl<T> Default for PartCache<T> {
    fn default() -> Self {
        PartCache {
            state: Mutex::new(State::default()),
        }
    }
}

impl<T> PartCache<T> {
    pub fn new() -> PartCache<T> {
        PartCache::default()
    }

    /// Handle of an already loaded part
    pub fn get(&self, path: &str) -> Option<Handle<T>> {
        self.state.lock().entries.get(path).cloned()
    }

    /// Handle of the part, decoding it with `load` on first access
    pub fn get_or_load<F>(&self, path: &str, load: F) -> Result<Handle<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        self.get_or_load_checked(path, load, |_| Ok(()))
    }

    /// Like `get_or_load`, running `check` once on a freshly decoded value.
    ///
    /// The check is memoized: it does not run again until the part is evicted.
    pub fn get_or_load_checked<F, C>(&self, path: &str, load: F, check: C) -> Result<Handle<T>>
    where
        F: FnOnce() -> Result<T>,
        C: FnOnce(&mut T) -> Result<()>,
    {
        if let Some(handle) = self.get(path) {
            return Ok(handle);
        }
        let mut value = load()?;
        if !self.is_checked(path) {
            check(&mut value)?;
        }
        let mut state = self.state.lock();
        state.checked.insert(path.to_string());
        // another thread may have loaded the same part meanwhile, keep theirs
        let handle = state
            .entries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(value)));
        Ok(handle.clone())
    }

    /// Inserts a new decoded part, marked dirty
    pub fn insert(&self, path: &str, value: T) -> Handle<T> {
        let handle = Arc::new(Mutex::new(value));
        let mut state = self.state.lock();
        state.entries.insert(path.to_string(), handle.clone());
        state.dirty.insert(path.to_string());
        state.checked.insert(path.to_string());
        handle
    }

    /// Records that the decoded part differs from the stored bytes
    pub fn mark_dirty(&self, path: &str) {
        self.state.lock().dirty.insert(path.to_string());
    }

    pub fn is_dirty(&self, path: &str) -> bool {
        self.state.lock().dirty.contains(path)
    }

    pub fn is_checked(&self, path: &str) -> bool {
        self.state.lock().checked.contains(path)
    }

    /// Clears the dirty flag of one part, returning its handle if it was dirty
    pub fn take_dirty_one(&self, path: &str) -> Option<Handle<T>> {
        let mut state = self.state.lock();
        if !state.dirty.remove(path) {
            return None;
        }
        state.entries.get(path).cloned()
    }

    /// Clears every dirty flag, returning the dirty parts in path order
    pub fn take_dirty(&self) -> Vec<(String, Handle<T>)> {
        let mut state = self.state.lock();
        let dirty = std::mem::take(&mut state.dirty);
        let mut parts: Vec<_> = dirty
            .into_iter()
            .filter_map(|p| state.entries.get(&p).map(|h| (p, h.clone())))
            .collect();
        parts.sort_by(|a, b| a.0.cmp(&b.0));
        parts
    }

    /// Drops the decoded part; the next access decodes the stored bytes again
    pub fn evict(&self, path: &str) -> Option<Handle<T>> {
        let mut state = self.state.lock();
        state.dirty.remove(path);
        state.checked.remove(path);
        state.entries.remove(path)
    }

    /// Drops the decoded part if `handle` is still its entry, it is clean,
    /// and no caller other than the cache and `handle` holds it.
    ///
    /// Handles are only cloned under the cache lock, so a successful check
    /// means no thread can still write through the dropped handle.
    pub fn evict_if_idle(&self, path: &str, handle: Handle<T>) -> bool {
        let mut state = self.state.lock();
        let idle = match state.entries.get(path) {
            Some(current) => {
                Arc::ptr_eq(current, &handle)
                    && Arc::strong_count(&handle) == 2
                    && !state.dirty.contains(path)
            }
            None => false,
        };
        if idle {
            state.entries.remove(path);
            state.checked.remove(path);
        }
        idle
    }

    /// Paths of every loaded part, sorted
    pub fn loaded(&self) -> Vec<String> {
        let mut paths: Vec<_> = self.state.lock().entries.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;

    #[test]
    fn loads_once_and_tracks_dirty() {
        let cache: PartCache<Vec<u32>> = PartCache::new();
        let mut loads = 0;
        let h = cache
            .get_or_load("a", || {
                loads += 1;
                Ok(vec![1])
            })
            .unwrap();
        h.lock().push(2);
        let again = cache.get_or_load("a", || Ok(vec![])).unwrap();
        assert_eq!(*again.lock(), [1, 2]);
        assert_eq!(loads, 1);

        assert!(!cache.is_dirty("a"));
        cache.mark_dirty("a");
        assert!(cache.is_dirty("a"));
        let dirty = cache.take_dirty();
        assert_eq!(dirty.len(), 1);
        assert!(!cache.is_dirty("a"));
    }

    #[test]
    fn check_is_memoized_until_eviction() {
        let cache: PartCache<u32> = PartCache::new();
        let mut checks = 0;
        cache
            .get_or_load_checked("s", || Ok(1), |v| {
                checks += 1;
                *v += 1;
                Ok(())
            })
            .unwrap();
        assert!(cache.is_checked("s"));
        assert_eq!(*cache.get("s").unwrap().lock(), 2);
        cache.evict("s");
        assert!(!cache.is_checked("s"));
        assert!(cache.get("s").is_none());
        assert_eq!(checks, 1);
    }

    #[test]
    fn busy_or_dirty_parts_are_not_evicted() {
        let cache: PartCache<u32> = PartCache::new();
        let h = cache.get_or_load("s", || Ok(1)).unwrap();
        let writer = cache.get("s").unwrap();
        assert!(!cache.evict_if_idle("s", h));
        drop(writer);

        cache.mark_dirty("s");
        assert!(!cache.evict_if_idle("s", cache.get("s").unwrap()));
        cache.take_dirty();

        let stale = Arc::new(Mutex::new(1));
        assert!(!cache.evict_if_idle("s", stale));
        assert!(cache.evict_if_idle("s", cache.get("s").unwrap()));
        assert!(cache.get("s").is_none());
    }

    #[test]
    fn failed_load_caches_nothing() {
        let cache: PartCache<u32> = PartCache::new();
        let res = cache.get_or_load("x", || Err(Error::MissingPart("x".into())));
        assert!(res.is_err());
        assert!(cache.loaded().is_empty());
    }
}
