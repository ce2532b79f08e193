use std::sync::Arc;

use tracing::{debug, info};

pub use cache::{CacheStats, TileCache};
pub use config::Config;
pub use error::{Error, ErrorKind, FormatError};
pub use math::{BoundingBox, Vector3};
pub use query::{HeightResult, LosResult};
pub use store::{FsTileStore, StoreRead, TileStore};
pub use tile::{ModelSpawn, Tile, TileHeader, TileKey, TileSummary};

pub mod cache;
pub mod codec;
pub mod config;
pub mod dispatch;
mod error;
pub mod grid;
pub mod math;
pub mod query;
pub mod store;
pub mod tile;

use dispatch::DecodeDispatcher;

/// Collision map engine: an owned tile cache plus the queries that read it.
///
/// Dropping the engine stops the decode pool; [`VMap::shutdown`] does the same
/// and also releases cached tiles before returning.
pub struct VMap {
    config: Config,
    cache: TileCache,
}

impl VMap {
    /// Build an engine reading tiles from `config.base_path`.
    pub fn initialize(config: Config) -> Self {
        let store = Arc::new(FsTileStore::new(config.base_path.clone()));
        Self::with_store(store, config)
    }

    /// Build an engine over any tile source. `config.base_path` is ignored.
    pub fn with_store(store: Arc<dyn TileStore>, config: Config) -> Self {
        let dispatcher = DecodeDispatcher::new(config.worker_count, config.queue_capacity);
        let cache = TileCache::new(
            store,
            dispatcher,
            config.max_cache_bytes,
            config.cache_enabled,
        );
        info!(
            base_path = ?config.base_path,
            max_cache_bytes = config.max_cache_bytes,
            cache_enabled = config.cache_enabled,
            decode_workers = cache.decode_workers(),
            "vmap initialized"
        );
        Self { config, cache }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn check_los(&self, map_id: u32, start: Vector3, end: Vector3) -> Result<LosResult, Error> {
        query::check_los(&self.cache, map_id, start, end)
    }

    /// Ground height at horizontal position `(x, z)`.
    pub fn get_height(&self, map_id: u32, x: f64, z: f64) -> Result<HeightResult, Error> {
        query::get_height(&self.cache, map_id, x, z)
    }

    /// The tile at `(tile_x, tile_y)`. A tile with no file is empty, not an error.
    pub fn load_tile(&self, map_id: u32, tile_x: i32, tile_y: i32) -> Result<Arc<Tile>, Error> {
        self.cache.get(TileKey::new(map_id, tile_x, tile_y))
    }

    pub fn tiles_along_segment(
        &self,
        map_id: u32,
        start: Vector3,
        end: Vector3,
    ) -> Result<Vec<TileKey>, Error> {
        grid::check_point(start)?;
        grid::check_point(end)?;
        Ok(grid::tiles_along_segment(map_id, start, end))
    }

    /// Load every tile within `radius` tiles of the one holding `center`,
    /// nearest first. Returns how many loaded; stops at the first failure.
    /// `radius` is capped at [`grid::MAX_PREFETCH_RADIUS`].
    pub fn prefetch(&self, map_id: u32, center: Vector3, radius: u32) -> Result<usize, Error> {
        if radius > grid::MAX_PREFETCH_RADIUS {
            return Err(Error::RadiusTooLarge {
                radius,
                max: grid::MAX_PREFETCH_RADIUS,
            });
        }
        grid::check_point(center)?;
        let tiles = grid::tiles_around(grid::tile_for(map_id, center.x, center.z), radius);
        let mut loaded = 0;
        for key in tiles {
            self.cache.get(key)?;
            loaded += 1;
        }
        debug!(map_id, radius, loaded, "prefetch done");
        Ok(loaded)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drain and stop the decode pool, then release every cached tile.
    pub fn shutdown(mut self) {
        self.cache.shutdown();
        info!("vmap shut down");
    }
}
