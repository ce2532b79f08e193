//! World to tile-grid mapping.
//!
//! The world is Y-up; tiles partition the horizontal X/Z plane into squares of
//! [`TILE_SIZE`] with `tile_x` along X and `tile_y` along Z.

use crate::Error;
use crate::math::Vector3;
use crate::tile::TileKey;

/// Edge length of a tile in world units.
pub const TILE_SIZE: f64 = 533.333_333_3;

/// Largest accepted |x| or |z|. Keeps tile coordinates and segment walks small.
pub const WORLD_LIMIT: f64 = 1.0e7;

/// Largest radius accepted by [`tiles_around`] callers that load what it returns.
pub const MAX_PREFETCH_RADIUS: u32 = 64;

/// Reject points that are not finite or lie beyond [`WORLD_LIMIT`] horizontally.
pub fn check_point(p: Vector3) -> Result<(), Error> {
    let in_range = |c: f64| c.is_finite() && c.abs() <= WORLD_LIMIT;
    if in_range(p.x) && in_range(p.z) && p.y.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidCoordinate(p))
    }
}

pub fn tile_coord(world: f64) -> i32 {
    (world / TILE_SIZE).floor() as i32
}

pub fn tile_for(map_id: u32, x: f64, z: f64) -> TileKey {
    TileKey::new(map_id, tile_coord(x), tile_coord(z))
}

pub fn tile_center(tile_x: i32, tile_y: i32) -> Vector3 {
    Vector3::new(
        (tile_x as f64 + 0.5) * TILE_SIZE,
        0.0,
        (tile_y as f64 + 0.5) * TILE_SIZE,
    )
}

/// Tiles visited walking from the tile holding `start` to the tile holding `end`.
///
/// Steps `max(|dx|, |dy|)` times between the two tile coordinates, flooring the
/// interpolated position at each step. Start and end are always included;
/// consecutive repeats are kept. Both points should pass [`check_point`]; the
/// walk allocates one key per step.
pub fn tiles_along_segment(map_id: u32, start: Vector3, end: Vector3) -> Vec<TileKey> {
    let (x0, y0) = (tile_coord(start.x), tile_coord(start.z));
    let (x1, y1) = (tile_coord(end.x), tile_coord(end.z));
    let dx = x1 as i64 - x0 as i64;
    let dy = y1 as i64 - y0 as i64;
    let steps = dx.abs().max(dy.abs());
    if steps == 0 {
        return vec![TileKey::new(map_id, x0, y0)];
    }

    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let x = (x0 as f64 + dx as f64 * t).floor() as i32;
            let y = (y0 as f64 + dy as f64 * t).floor() as i32;
            TileKey::new(map_id, x, y)
        })
        .collect()
}

/// Every tile within `radius` tiles (Chebyshev) of `center`, nearest rings first.
///
/// Tiles whose coordinates would leave the `i32` range are skipped. The result
/// holds `(2 * radius + 1)^2` keys, so callers bound `radius`.
pub fn tiles_around(center: TileKey, radius: u32) -> Vec<TileKey> {
    let r = i64::from(radius);
    let side = 2 * r as u64 + 1;
    let capacity = side.checked_mul(side).unwrap_or(u64::MAX).min(1 << 16);
    let mut tiles = Vec::with_capacity(capacity as usize);
    for dy in -r..=r {
        let Ok(tile_y) = i32::try_from(i64::from(center.tile_y) + dy) else {
            continue;
        };
        for dx in -r..=r {
            let Ok(tile_x) = i32::try_from(i64::from(center.tile_x) + dx) else {
                continue;
            };
            tiles.push(TileKey::new(center.map_id, tile_x, tile_y));
        }
    }
    tiles.sort_by_key(|t| {
        let dx = (i64::from(t.tile_x) - i64::from(center.tile_x)).abs();
        let dy = (i64::from(t.tile_y) - i64::from(center.tile_y)).abs();
        (dx.max(dy), dx * dx + dy * dy)
    });
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_coord_floors() {
        assert_eq!(tile_coord(0.0), 0);
        assert_eq!(tile_coord(533.0), 0);
        assert_eq!(tile_coord(534.0), 1);
        assert_eq!(tile_coord(-0.5), -1);
        assert_eq!(tile_coord(-533.0), -1);
        assert_eq!(tile_coord(-534.0), -2);
    }

    #[test]
    fn test_segment_inside_one_tile() {
        let tiles = tiles_along_segment(
            1,
            Vector3::new(10.0, 10.0, 10.0),
            Vector3::new(200.0, -10.0, 300.0),
        );
        assert_eq!(tiles, vec![TileKey::new(1, 0, 0)]);
    }

    #[test]
    fn test_segment_crossing_one_boundary() {
        let tiles = tiles_along_segment(
            1,
            Vector3::new(500.0, 0.0, 10.0),
            Vector3::new(600.0, 0.0, 10.0),
        );
        assert_eq!(tiles, vec![TileKey::new(1, 0, 0), TileKey::new(1, 1, 0)]);
    }

    #[test]
    fn test_vertical_segment_stays_in_its_column() {
        let tiles = tiles_along_segment(
            0,
            Vector3::new(0.0, 10.0, 0.0),
            Vector3::new(0.0, -10.0, 0.0),
        );
        assert_eq!(tiles, vec![TileKey::new(0, 0, 0)]);
    }

    #[test]
    fn test_long_diagonal_walk() {
        let tiles = tiles_along_segment(
            0,
            Vector3::new(10.0, 0.0, 10.0),
            Vector3::new(3.0 * TILE_SIZE + 10.0, 0.0, TILE_SIZE + 10.0),
        );
        assert_eq!(tiles.len(), 4);
        assert_eq!(tiles.first(), Some(&TileKey::new(0, 0, 0)));
        assert_eq!(tiles.last(), Some(&TileKey::new(0, 3, 1)));
        for pair in tiles.windows(2) {
            assert_eq!(pair[1].tile_x - pair[0].tile_x, 1);
            assert!((pair[1].tile_y - pair[0].tile_y).abs() <= 1);
        }
    }

    #[test]
    fn test_negative_direction() {
        let tiles = tiles_along_segment(
            0,
            Vector3::new(10.0, 0.0, 10.0),
            Vector3::new(-10.0, 0.0, 10.0),
        );
        assert_eq!(tiles, vec![TileKey::new(0, 0, 0), TileKey::new(0, -1, 0)]);
    }

    #[test]
    fn test_tiles_around() {
        let center = TileKey::new(3, 10, 10);
        assert_eq!(tiles_around(center, 0), vec![center]);
        let ring = tiles_around(center, 1);
        assert_eq!(ring.len(), 9);
        assert_eq!(ring[0], center);
        assert!(ring.contains(&TileKey::new(3, 9, 11)));
    }

    #[test]
    fn test_tiles_around_prefetch_limit() {
        let r = MAX_PREFETCH_RADIUS;
        let tiles = tiles_around(TileKey::new(0, -5, 5), r);
        let side = 2 * r as usize + 1;
        assert_eq!(tiles.len(), side * side);
        assert_eq!(tiles[0], TileKey::new(0, -5, 5));
        assert_eq!(tiles.last().map(|t| (t.tile_x + 5).abs()), Some(r as i32));
    }

    #[test]
    fn test_tiles_around_clips_at_coordinate_range() {
        let corner = TileKey::new(0, i32::MAX, i32::MIN);
        let tiles = tiles_around(corner, 2);
        assert_eq!(tiles.len(), 9);
        assert_eq!(tiles[0], corner);
        assert!(tiles.iter().all(|t| t.tile_x >= i32::MAX - 2 && t.tile_y <= i32::MIN + 2));
    }

    #[test]
    fn test_check_point() {
        assert!(check_point(Vector3::new(-WORLD_LIMIT, 1e30, WORLD_LIMIT)).is_ok());
        for bad in [
            Vector3::new(f64::NAN, 0.0, 0.0),
            Vector3::new(0.0, f64::INFINITY, 0.0),
            Vector3::new(0.0, 0.0, 1e13),
            Vector3::new(-1.1e7, 0.0, 0.0),
        ] {
            assert!(matches!(check_point(bad), Err(Error::InvalidCoordinate(_))));
        }
    }
}
