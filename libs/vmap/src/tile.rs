use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid;
use crate::math::{BoundingBox, Triangle, Vector3};

/// Version written by current tools. Decoding accepts any version.
pub const FORMAT_VERSION: u32 = 1;

/// Budget charge per model spawn, on top of the raw vertex and index bytes.
pub const MODEL_OVERHEAD_BYTES: u64 = 128;

/// Identity of a tile: equal keys always resolve to the same [`Tile`].
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub map_id: u32,
    pub tile_x: i32,
    pub tile_y: i32,
}

impl TileKey {
    pub const fn new(map_id: u32, tile_x: i32, tile_y: i32) -> Self {
        Self {
            map_id,
            tile_x,
            tile_y,
        }
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{},{}", self.map_id, self.tile_x, self.tile_y)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct TileHeader {
    pub version: u32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub model_count: u32,
    pub bounds: BoundingBox,
}

/// One placed static-mesh instance. `model_id` names a shared mesh asset that
/// this crate never resolves.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct ModelSpawn {
    /// Record index within the tile.
    pub id: u32,
    pub model_id: u32,
    pub position: Vector3,
    pub rotation: Vector3,
    pub scale: f64,
    pub flags: u32,
    pub bounds: BoundingBox,
}

/// Decoded collision mesh for one map cell. Read-only once built.
///
/// Triangle `k` is `indices[3k..3k + 3]`, each indexing a vertex made of three
/// consecutive floats in `vertices`.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub header: TileHeader,
    pub models: Vec<ModelSpawn>,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub triangle_count: usize,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq)]
pub struct TileSummary {
    pub version: u32,
    pub tile_x: i32,
    pub tile_y: i32,
    pub models: usize,
    pub vertices: usize,
    pub triangles: usize,
    pub size_bytes: u64,
    pub bounds: BoundingBox,
}

impl Tile {
    /// The stand-in for a tile whose file does not exist: no geometry and a
    /// zero-size box at the cell's center.
    pub fn empty(key: TileKey) -> Self {
        Tile {
            header: TileHeader {
                version: FORMAT_VERSION,
                tile_x: key.tile_x,
                tile_y: key.tile_y,
                model_count: 0,
                bounds: BoundingBox::point(grid::tile_center(key.tile_x, key.tile_y)),
            },
            models: vec![],
            vertices: vec![],
            indices: vec![],
            triangle_count: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.triangle_count == 0 && self.models.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn vertex(&self, index: u32) -> Vector3 {
        let i = index as usize * 3;
        Vector3::from_f32([self.vertices[i], self.vertices[i + 1], self.vertices[i + 2]])
    }

    pub fn triangle(&self, k: usize) -> Triangle {
        let i = &self.indices[k * 3..k * 3 + 3];
        Triangle {
            v0: self.vertex(i[0]),
            v1: self.vertex(i[1]),
            v2: self.vertex(i[2]),
        }
    }

    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        (0..self.triangle_count).map(|k| self.triangle(k))
    }

    /// Estimated footprint used for cache budgeting, not the allocator's view.
    pub fn size_bytes(&self) -> u64 {
        (self.vertices.len() * size_of::<f32>()) as u64
            + (self.indices.len() * size_of::<u32>()) as u64
            + self.models.len() as u64 * MODEL_OVERHEAD_BYTES
    }

    /// First spawn, in record order, whose bounds contain `point`.
    pub fn model_at(&self, point: Vector3) -> Option<&ModelSpawn> {
        const TOLERANCE: f64 = 1e-3;
        self.models
            .iter()
            .find(|m| m.bounds.contains(point, TOLERANCE))
    }

    pub fn summary(&self) -> TileSummary {
        TileSummary {
            version: self.header.version,
            tile_x: self.header.tile_x,
            tile_y: self.header.tile_y,
            models: self.models.len(),
            vertices: self.vertex_count(),
            triangles: self.triangle_count,
            size_bytes: self.size_bytes(),
            bounds: self.header.bounds,
        }
    }
}
