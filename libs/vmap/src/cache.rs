//! Byte-budgeted LRU cache of decoded tiles with per-key load de-duplication.
//!
//! The entry map, the LRU index, the byte counter and the in-flight map live
//! behind one mutex. A finished load is inserted and removed from the in-flight
//! map in the same critical section, so a key is always either cached,
//! in flight, or absent.

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use tracing::{debug, trace};

use crate::Error;
use crate::dispatch::DecodeDispatcher;
use crate::store::{StoreRead, TileStore};
use crate::tile::{Tile, TileKey};

pub struct TileCache {
    store: Arc<dyn TileStore>,
    dispatcher: DecodeDispatcher,
    max_bytes: u64,
    enabled: bool,
    state: Mutex<CacheState>,
}

struct CacheEntry {
    tile: Arc<Tile>,
    last_access: u64,
    size_bytes: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<TileKey, CacheEntry>,
    /// last_access -> key, oldest first
    lru: BTreeMap<u64, TileKey>,
    in_flight: HashMap<TileKey, Arc<PendingLoad>>,
    total_bytes: u64,
    clock: u64,
    hits: u64,
    misses: u64,
    loads: u64,
    evictions: u64,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub total_bytes: u64,
    pub max_bytes: u64,
    pub in_flight: usize,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub evictions: u64,
}

/// One outstanding load, shared by every caller that asked for its key.
#[derive(Default)]
struct PendingLoad {
    outcome: Mutex<Option<Result<Arc<Tile>, Error>>>,
    ready: Condvar,
}

impl PendingLoad {
    fn wait(&self) -> Result<Arc<Tile>, Error> {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(res) = outcome.as_ref() {
                return res.clone();
            }
            outcome = self
                .ready
                .wait(outcome)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn complete(&self, res: Result<Arc<Tile>, Error>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(res);
        self.ready.notify_all();
    }
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: TileKey) -> Option<Arc<Tile>> {
        let now = self.tick();
        let entry = self.entries.get_mut(&key)?;
        self.lru.remove(&entry.last_access);
        entry.last_access = now;
        self.lru.insert(now, key);
        Some(entry.tile.clone())
    }

    fn remove(&mut self, key: TileKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(&key)?;
        self.lru.remove(&entry.last_access);
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }

    /// Evict least-recently-used entries until `tile` fits, then insert it.
    /// An entry larger than the whole budget is still stored once the cache is empty.
    fn insert(&mut self, key: TileKey, tile: Arc<Tile>, max_bytes: u64) {
        let size_bytes = tile.size_bytes();
        self.remove(key);
        while self.total_bytes + size_bytes > max_bytes {
            let Some((_, &oldest)) = self.lru.first_key_value() else {
                break;
            };
            if let Some(evicted) = self.remove(oldest) {
                self.evictions += 1;
                debug!(key = %oldest, size = evicted.size_bytes, "evicted tile");
            }
        }
        let now = self.tick();
        self.lru.insert(now, key);
        self.entries.insert(
            key,
            CacheEntry {
                tile,
                last_access: now,
                size_bytes,
            },
        );
        self.total_bytes += size_bytes;
    }
}

impl TileCache {
    pub fn new(
        store: Arc<dyn TileStore>,
        dispatcher: DecodeDispatcher,
        max_bytes: u64,
        enabled: bool,
    ) -> Self {
        Self {
            store,
            dispatcher,
            max_bytes,
            enabled,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the tile for `key`, loading it on a miss.
    ///
    /// Concurrent callers for the same key share one load and its outcome,
    /// including failures.
    pub fn get(&self, key: TileKey) -> Result<Arc<Tile>, Error> {
        let pending = {
            let mut state = self.state();
            if let Some(tile) = state.touch(key) {
                state.hits += 1;
                trace!(%key, "cache hit");
                return Ok(tile);
            }
            state.misses += 1;
            if let Some(pending) = state.in_flight.get(&key).cloned() {
                drop(state);
                trace!(%key, "joining in-flight load");
                return pending.wait();
            }
            let pending = Arc::new(PendingLoad::default());
            state.in_flight.insert(key, pending.clone());
            state.loads += 1;
            pending
        };

        let guard = InFlightGuard {
            cache: self,
            key,
            pending,
            finished: false,
        };
        debug!(%key, "loading tile");
        let res = self.load(key);
        guard.finish(res)
    }

    fn load(&self, key: TileKey) -> Result<Tile, Error> {
        match self.store.read(key)? {
            StoreRead::Missing => Ok(Tile::empty(key)),
            StoreRead::Bytes(bytes) => self.dispatcher.submit(bytes).wait(),
        }
    }

    pub fn contains(&self, key: TileKey) -> bool {
        self.state().entries.contains_key(&key)
    }

    /// Drop every cached tile. Loads already in flight still complete.
    pub fn clear(&self) {
        let mut state = self.state();
        let count = state.entries.len();
        state.entries.clear();
        state.lru.clear();
        state.total_bytes = 0;
        debug!(count, "cleared tile cache");
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state();
        CacheStats {
            enabled: self.enabled,
            entries: state.entries.len(),
            total_bytes: state.total_bytes,
            max_bytes: self.max_bytes,
            in_flight: state.in_flight.len(),
            hits: state.hits,
            misses: state.misses,
            loads: state.loads,
            evictions: state.evictions,
        }
    }

    pub fn decode_workers(&self) -> usize {
        self.dispatcher.worker_count()
    }

    /// Stop the decode pool and release every cached tile.
    pub fn shutdown(&mut self) {
        self.dispatcher.shutdown();
        self.clear();
    }
}

/// Publishes a load's outcome exactly once. If the loading caller unwinds
/// before finishing, waiters get [`Error::LoadAbandoned`] instead of hanging.
struct InFlightGuard<'a> {
    cache: &'a TileCache,
    key: TileKey,
    pending: Arc<PendingLoad>,
    finished: bool,
}

impl InFlightGuard<'_> {
    fn finish(mut self, res: Result<Tile, Error>) -> Result<Arc<Tile>, Error> {
        let res = res.map(Arc::new);
        {
            let mut state = self.cache.state();
            if let Ok(tile) = &res {
                if self.cache.enabled {
                    state.insert(self.key, tile.clone(), self.cache.max_bytes);
                }
            }
            state.in_flight.remove(&self.key);
        }
        if let Err(err) = &res {
            debug!(key = %self.key, %err, "tile load failed");
        }
        self.pending.complete(res.clone());
        self.finished = true;
        res
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.cache.state().in_flight.remove(&self.key);
        self.pending.complete(Err(Error::LoadAbandoned));
    }
}
