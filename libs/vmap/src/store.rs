use std::{io, path::PathBuf};

use tracing::trace;

use crate::Error;
use crate::tile::TileKey;

pub const TILE_EXTENSION: &str = "vmtile";

/// Outcome of reading a tile's backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreRead {
    Bytes(Vec<u8>),
    /// No file exists for this tile; callers treat the region as empty.
    Missing,
}

/// Source of raw tile bytes addressed by [`TileKey`].
pub trait TileStore: Send + Sync {
    fn read(&self, key: TileKey) -> Result<StoreRead, Error>;
}

/// Tiles laid out under a root directory as
/// `<root>/<map:03>/<map:03>_<x:02>_<y:02>.vmtile`.
#[derive(Debug, Clone)]
pub struct FsTileStore {
    root: PathBuf,
}

impl FsTileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn tile_path(&self, key: TileKey) -> PathBuf {
        self.root.join(format!("{:03}", key.map_id)).join(format!(
            "{:03}_{:02}_{:02}.{TILE_EXTENSION}",
            key.map_id, key.tile_x, key.tile_y
        ))
    }
}

impl TileStore for FsTileStore {
    fn read(&self, key: TileKey) -> Result<StoreRead, Error> {
        let path = self.tile_path(key);
        match std::fs::read(&path) {
            Ok(bytes) => {
                trace!(%key, len = bytes.len(), "read tile");
                Ok(StoreRead::Bytes(bytes))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                trace!(%key, ?path, "tile file missing");
                Ok(StoreRead::Missing)
            }
            Err(err) => Err(Error::io(path, err)),
        }
    }
}

/// In-memory store that counts reads. Optionally holds every read at a gate
/// until the test opens it, so concurrent callers can be lined up on one key.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Default)]
pub struct MemoryTileStore {
    tiles: std::sync::Mutex<std::collections::HashMap<TileKey, Vec<u8>>>,
    reads: std::sync::atomic::AtomicUsize,
    gate: Option<flume::Receiver<()>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose reads block until the returned sender is dropped.
    pub fn gated() -> (Self, flume::Sender<()>) {
        let (tx, rx) = flume::unbounded();
        let store = Self {
            gate: Some(rx),
            ..Self::default()
        };
        (store, tx)
    }

    pub fn insert(&self, key: TileKey, bytes: Vec<u8>) {
        self.tiles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, bytes);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl TileStore for MemoryTileStore {
    fn read(&self, key: TileKey) -> Result<StoreRead, Error> {
        if let Some(gate) = &self.gate {
            while gate.recv().is_ok() {}
        }
        self.reads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let tiles = self
            .tiles
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(match tiles.get(&key) {
            Some(bytes) => StoreRead::Bytes(bytes.clone()),
            None => StoreRead::Missing,
        })
    }
}
