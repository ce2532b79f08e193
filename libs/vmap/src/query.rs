//! Line-of-sight and height queries over cached tiles.

use serde::Serialize;
use tracing::trace;

use crate::Error;
use crate::cache::TileCache;
use crate::grid;
use crate::math::{self, Vector3};

/// Height queries cast from here straight down to [`MIN_HEIGHT`].
pub const MAX_HEIGHT: f64 = 100_000.0;
pub const MIN_HEIGHT: f64 = -100_000.0;

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct LosResult {
    pub has_los: bool,
    pub hit_point: Option<Vector3>,
    /// Distance from the segment start to `hit_point`.
    pub distance: Option<f64>,
    pub hit_model_id: Option<u32>,
}

impl LosResult {
    pub const CLEAR: LosResult = LosResult {
        has_los: true,
        hit_point: None,
        distance: None,
        hit_model_id: None,
    };
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct HeightResult {
    pub height: f64,
    pub found: bool,
    pub floor: bool,
}

impl HeightResult {
    pub const NOT_FOUND: HeightResult = HeightResult {
        height: 0.0,
        found: false,
        floor: false,
    };
}

/// Whether the segment `start..=end` is free of collision geometry.
///
/// Tiles are tested in traversal order and the closest hit inside the first
/// tile that blocks is reported; later tiles are not loaded.
pub fn check_los(
    cache: &TileCache,
    map_id: u32,
    start: Vector3,
    end: Vector3,
) -> Result<LosResult, Error> {
    grid::check_point(start)?;
    grid::check_point(end)?;
    let direction = end - start;
    if direction.length() == 0.0 {
        return Ok(LosResult::CLEAR);
    }

    for key in grid::tiles_along_segment(map_id, start, end) {
        let tile = cache.get(key)?;
        let Some((_, hit)) = math::closest_hit(start, direction, 1.0, tile.triangles()) else {
            continue;
        };
        trace!(%key, t = hit.t, "los blocked");
        return Ok(LosResult {
            has_los: false,
            hit_point: Some(hit.point),
            distance: Some(start.distance(hit.point)),
            hit_model_id: tile.model_at(hit.point).map(|m| m.model_id),
        });
    }
    Ok(LosResult::CLEAR)
}

/// Topmost surface below [`MAX_HEIGHT`] at horizontal position `(x, z)`.
pub fn get_height(cache: &TileCache, map_id: u32, x: f64, z: f64) -> Result<HeightResult, Error> {
    grid::check_point(Vector3::new(x, 0.0, z))?;
    let tile = cache.get(grid::tile_for(map_id, x, z))?;
    let origin = Vector3::new(x, MAX_HEIGHT, z);
    let direction = Vector3::new(0.0, MIN_HEIGHT - MAX_HEIGHT, 0.0);
    Ok(
        match math::closest_hit(origin, direction, 1.0, tile.triangles()) {
            Some((_, hit)) => HeightResult {
                height: hit.point.y,
                found: true,
                floor: true,
            },
            None => HeightResult::NOT_FOUND,
        },
    )
}
