#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Arc, thread};

    use approx::assert_abs_diff_eq;
    use vmap::{
        BoundingBox, Config, ErrorKind, FsTileStore, ModelSpawn, Tile, TileKey, VMap, Vector3,
        codec, grid,
    };

    fn init_tracing() {
        let subscriber = tracing_subscriber::FmtSubscriber::builder()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn config(base: &Path, workers: usize) -> Config {
        Config {
            base_path: base.to_path_buf(),
            max_cache_bytes: 1 << 20,
            cache_enabled: true,
            worker_count: workers,
            queue_capacity: 8,
        }
    }

    /// One triangle at height `y` covering the middle of the tile.
    fn floor_tile(key: TileKey, y: f32) -> Tile {
        let c = grid::tile_center(key.tile_x, key.tile_y);
        let (x, z) = (c.x as f32, c.z as f32);
        let mut tile = Tile::empty(key);
        tile.vertices = vec![
            x - 10.0,
            y,
            z - 10.0,
            x + 10.0,
            y,
            z - 10.0,
            x,
            y,
            z + 10.0,
        ];
        tile.indices = vec![0, 1, 2];
        tile.triangle_count = 1;
        tile.header.bounds = BoundingBox::new(
            Vector3::new(c.x - 10.0, y as f64, c.z - 10.0),
            Vector3::new(c.x + 10.0, y as f64, c.z + 10.0),
        );
        tile
    }

    fn write_tile(base: &Path, key: TileKey, tile: &Tile) {
        write_bytes(base, key, &codec::encode(tile));
    }

    fn write_bytes(base: &Path, key: TileKey, bytes: &[u8]) {
        let path = FsTileStore::new(base).tile_path(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_queries_over_files() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let key = TileKey::new(1, 0, 0);
        write_tile(dir.path(), key, &floor_tile(key, 0.0));
        let vmap = VMap::initialize(config(dir.path(), 2));

        let c = grid::tile_center(0, 0);
        let los = vmap
            .check_los(
                1,
                Vector3::new(c.x, 10.0, c.z),
                Vector3::new(c.x, -10.0, c.z),
            )
            .unwrap();
        assert!(!los.has_los);
        assert_abs_diff_eq!(los.hit_point.unwrap().y, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(los.distance.unwrap(), 10.0, epsilon = 1e-6);

        let clear = vmap
            .check_los(
                1,
                Vector3::new(c.x + 20.0, 10.0, c.z),
                Vector3::new(c.x + 20.0, -10.0, c.z),
            )
            .unwrap();
        assert!(clear.has_los);

        let height = vmap.get_height(1, c.x, c.z).unwrap();
        assert!(height.found && height.floor);
        assert_abs_diff_eq!(height.height, 0.0, epsilon = 1e-6);
        assert!(!vmap.get_height(1, c.x + 100.0, c.z + 100.0).unwrap().found);

        assert_eq!(vmap.cache_stats().loads, 1);
        vmap.shutdown();
    }

    #[test]
    fn test_missing_file_is_empty_tile() {
        let dir = tempfile::tempdir().unwrap();
        let vmap = VMap::initialize(config(dir.path(), 1));
        let tile = vmap.load_tile(9, 4, -2).unwrap();
        assert_eq!(tile.triangle_count, 0);
        assert!(tile.is_empty());
        assert!(!vmap.get_height(9, 0.0, 0.0).unwrap().found);
    }

    #[test]
    fn test_error_kinds_reach_queries() {
        let dir = tempfile::tempdir().unwrap();
        let corrupt = TileKey::new(2, 0, 0);
        let mut bytes = codec::encode(&floor_tile(corrupt, 0.0));
        bytes.truncate(bytes.len() - 2);
        write_bytes(dir.path(), corrupt, &bytes);

        // a directory where the tile file belongs cannot be read
        let unreadable = TileKey::new(2, 1, 0);
        std::fs::create_dir_all(FsTileStore::new(dir.path()).tile_path(unreadable)).unwrap();

        let vmap = VMap::initialize(config(dir.path(), 2));
        let c = grid::tile_center(0, 0);
        let err = vmap.get_height(2, c.x, c.z).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert!(!err.is_retryable());

        let c = grid::tile_center(1, 0);
        let err = vmap
            .check_los(
                2,
                Vector3::new(c.x, 5.0, c.z),
                Vector3::new(c.x, -5.0, c.z),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.is_retryable());
        assert_eq!(vmap.cache_stats().entries, 0);
    }

    #[test]
    fn test_concurrent_queries_share_one_load() {
        let dir = tempfile::tempdir().unwrap();
        let key = TileKey::new(3, 2, 2);
        write_tile(dir.path(), key, &floor_tile(key, 7.5));
        let vmap = Arc::new(VMap::initialize(config(dir.path(), 4)));
        let c = grid::tile_center(2, 2);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let vmap = vmap.clone();
                thread::spawn(move || vmap.get_height(3, c.x, c.z).unwrap())
            })
            .collect();
        for handle in handles {
            let res = handle.join().unwrap();
            assert!(res.found);
            assert_abs_diff_eq!(res.height, 7.5, epsilon = 1e-6);
        }

        let stats = vmap.cache_stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits + stats.misses, 16);
        assert_eq!(stats.in_flight, 0);
    }

    #[test]
    fn test_budget_holds_over_random_queries() {
        let dir = tempfile::tempdir().unwrap();
        let mut size = 0;
        for x in 0..6 {
            let key = TileKey::new(4, x, 0);
            let tile = floor_tile(key, 1.0);
            size = tile.size_bytes();
            write_tile(dir.path(), key, &tile);
        }
        let vmap = VMap::initialize(Config {
            max_cache_bytes: size * 3,
            ..config(dir.path(), 2)
        });

        let mut rng = fastrand::Rng::with_seed(42);
        for _ in 0..200 {
            let c = grid::tile_center(rng.i32(0..6), 0);
            assert!(vmap.get_height(4, c.x, c.z).unwrap().found);
            let stats = vmap.cache_stats();
            assert!(stats.total_bytes <= stats.max_bytes);
            assert!(stats.entries <= 3);
        }
        assert!(vmap.cache_stats().evictions > 0);
    }

    #[test]
    fn test_los_over_several_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let key = TileKey::new(5, 2, 0);
        // a vertical wall across the z = 10 line inside tile (2, 0)
        let x = (2.5 * grid::TILE_SIZE) as f32;
        let mut wall = Tile::empty(key);
        wall.vertices = vec![x, -50.0, -10.0, x, 50.0, -10.0, x, 0.0, 60.0];
        wall.indices = vec![0, 1, 2];
        wall.triangle_count = 1;
        wall.models = vec![ModelSpawn {
            id: 0,
            model_id: 4242,
            position: Vector3::new(x as f64, 0.0, 10.0),
            rotation: Vector3::ZERO,
            scale: 1.0,
            flags: 0,
            bounds: BoundingBox::new(
                Vector3::new(x as f64 - 1.0, -50.0, -10.0),
                Vector3::new(x as f64 + 1.0, 50.0, 60.0),
            ),
        }];
        wall.header.model_count = 1;
        write_tile(dir.path(), key, &wall);

        let vmap = VMap::initialize(config(dir.path(), 2));
        let start = Vector3::new(10.0, 0.0, 10.0);
        let end = Vector3::new(4.0 * grid::TILE_SIZE - 10.0, 0.0, 10.0);
        assert_eq!(vmap.tiles_along_segment(5, start, end).unwrap().len(), 4);

        let res = vmap.check_los(5, start, end).unwrap();
        assert!(!res.has_los);
        assert_eq!(res.hit_model_id, Some(4242));
        assert_abs_diff_eq!(res.distance.unwrap(), x as f64 - 10.0, epsilon = 1e-3);

        // the reverse walk is blocked by the same wall
        let back = vmap.check_los(5, end, start).unwrap();
        assert!(!back.has_los);
    }

    #[test]
    fn test_prefetch_then_clear() {
        let dir = tempfile::tempdir().unwrap();
        let center = TileKey::new(6, 10, 10);
        write_tile(dir.path(), center, &floor_tile(center, 3.0));
        let vmap = VMap::initialize(config(dir.path(), 3));

        let loaded = vmap
            .prefetch(6, grid::tile_center(10, 10), 2)
            .unwrap();
        assert_eq!(loaded, 25);
        assert_eq!(vmap.cache_stats().entries, 25);

        vmap.clear_cache();
        let stats = vmap.cache_stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_bytes, 0);
        vmap.shutdown();
    }

    #[test]
    fn test_disabled_cache_reloads_files() {
        let dir = tempfile::tempdir().unwrap();
        let key = TileKey::new(7, 0, 0);
        write_tile(dir.path(), key, &floor_tile(key, 0.0));
        let vmap = VMap::initialize(Config {
            cache_enabled: false,
            ..config(dir.path(), 1)
        });
        for _ in 0..3 {
            vmap.load_tile(7, 0, 0).unwrap();
        }
        let stats = vmap.cache_stats();
        assert_eq!(stats.loads, 3);
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_config_file_drives_engine() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = dir.path().join("tiles");
        let key = TileKey::new(8, 0, 0);
        write_tile(&tiles, key, &floor_tile(key, 2.0));
        let path = dir.path().join("vmap.toml");
        std::fs::write(
            &path,
            format!(
                "base_path = {:?}\nworker_count = 0\nmax_cache_bytes = 4096\n",
                tiles.display().to_string()
            ),
        )
        .unwrap();

        // ignore VMAP_* variables from the process environment
        let config = Config::from_file(&path)
            .unwrap()
            .with_env_overrides(|_| None);
        assert_eq!(config.worker_count, 0);
        let vmap = VMap::initialize(config);
        let c = grid::tile_center(0, 0);
        assert_abs_diff_eq!(vmap.get_height(8, c.x, c.z).unwrap().height, 2.0, epsilon = 1e-6);
        assert_eq!(vmap.cache_stats().max_bytes, 4096);
    }
}
