//! Binary tile format.
//!
//! ```ignore
//! | Header (44) | ModelRecord (60) * model_count | u32 n | f32 * 3n | u32 m | u32 * m |
//! ```
//!
//! Every field is little-endian. Fields are read through zerocopy's byte-order
//! aware types so decoding never depends on the host's endianness or alignment.

use zerocopy::byteorder::little_endian::{F32, I32, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::FormatError;
use crate::math::{BoundingBox, Vector3};
use crate::tile::{ModelSpawn, Tile, TileHeader};

pub const MAGIC: [u8; 4] = *b"VMAP";

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawHeader {
    magic: [u8; 4],
    version: U32,
    tile_x: I32,
    tile_y: I32,
    model_count: U32,
    bounds: [F32; 6],
}

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct RawModel {
    model_id: U32,
    position: [F32; 3],
    rotation: [F32; 3],
    scale: F32,
    flags: U32,
    bounds: [F32; 6],
}

pub const HEADER_LEN: usize = size_of::<RawHeader>();
pub const MODEL_RECORD_LEN: usize = size_of::<RawModel>();

/// Decode a tile. Pure: identical input yields an identical [`Tile`].
pub fn decode(bytes: &[u8]) -> Result<Tile, FormatError> {
    if bytes.len() >= MAGIC.len() && bytes[..MAGIC.len()] != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(&bytes[..4]);
        return Err(FormatError::BadMagic { found });
    }
    let (header, mut rest) = RawHeader::read_from_prefix(bytes).map_err(|_| {
        FormatError::Truncated {
            section: "header",
            needed: HEADER_LEN,
            remaining: bytes.len(),
        }
    })?;

    let model_count = header.model_count.get() as usize;
    let needed = model_count.saturating_mul(MODEL_RECORD_LEN);
    let (records, tail) = <[RawModel]>::ref_from_prefix_with_elems(rest, model_count)
        .map_err(|_| FormatError::Truncated {
            section: "models",
            needed,
            remaining: rest.len(),
        })?;
    rest = tail;
    let models = records
        .iter()
        .enumerate()
        .map(|(id, r)| ModelSpawn {
            id: id as u32,
            model_id: r.model_id.get(),
            position: vec3(&r.position),
            rotation: vec3(&r.rotation),
            scale: r.scale.get() as f64,
            flags: r.flags.get(),
            bounds: bounds(&r.bounds),
        })
        .collect();

    let vertex_count = read_count(&mut rest, "vertex count")?;
    let floats = vertex_count.saturating_mul(3);
    let (raw_vertices, tail) =
        <[F32]>::ref_from_prefix_with_elems(rest, floats).map_err(|_| FormatError::Truncated {
            section: "vertices",
            needed: floats.saturating_mul(size_of::<f32>()),
            remaining: rest.len(),
        })?;
    rest = tail;
    let vertices: Vec<f32> = raw_vertices.iter().map(|v| v.get()).collect();

    let index_count = read_count(&mut rest, "index count")?;
    let (raw_indices, _) =
        <[U32]>::ref_from_prefix_with_elems(rest, index_count).map_err(|_| {
            FormatError::Truncated {
                section: "indices",
                needed: index_count.saturating_mul(size_of::<u32>()),
                remaining: rest.len(),
            }
        })?;
    if index_count % 3 != 0 {
        return Err(FormatError::PartialTriangle { index_count });
    }
    let indices: Vec<u32> = raw_indices.iter().map(|i| i.get()).collect();
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(FormatError::IndexOutOfRange {
            index,
            vertex_count,
        });
    }

    Ok(Tile {
        header: TileHeader {
            version: header.version.get(),
            tile_x: header.tile_x.get(),
            tile_y: header.tile_y.get(),
            model_count: header.model_count.get(),
            bounds: bounds(&header.bounds),
        },
        models,
        vertices,
        triangle_count: index_count / 3,
        indices,
    })
}

fn read_count(rest: &mut &[u8], section: &'static str) -> Result<usize, FormatError> {
    let (count, tail) = U32::read_from_prefix(*rest).map_err(|_| FormatError::Truncated {
        section,
        needed: size_of::<u32>(),
        remaining: rest.len(),
    })?;
    *rest = tail;
    Ok(count.get() as usize)
}

fn vec3(raw: &[F32; 3]) -> Vector3 {
    Vector3::from_f32([raw[0].get(), raw[1].get(), raw[2].get()])
}

fn bounds(raw: &[F32; 6]) -> BoundingBox {
    BoundingBox::from_f32(raw.map(|v| v.get()))
}

/// Serialize a tile into the on-disk layout. Used to build fixtures.
#[cfg(any(test, feature = "test-utils"))]
pub fn encode(tile: &Tile) -> Vec<u8> {
    fn f32s(v: Vector3) -> [F32; 3] {
        [v.x, v.y, v.z].map(|c| F32::new(c as f32))
    }
    fn box_f32s(bb: &BoundingBox) -> [F32; 6] {
        let [a, b, c] = f32s(bb.min);
        let [d, e, f] = f32s(bb.max);
        [a, b, c, d, e, f]
    }

    let mut out = Vec::with_capacity(
        HEADER_LEN + tile.models.len() * MODEL_RECORD_LEN + 8 + tile.size_bytes() as usize,
    );
    let header = RawHeader {
        magic: MAGIC,
        version: U32::new(tile.header.version),
        tile_x: I32::new(tile.header.tile_x),
        tile_y: I32::new(tile.header.tile_y),
        model_count: U32::new(tile.models.len() as u32),
        bounds: box_f32s(&tile.header.bounds),
    };
    out.extend_from_slice(header.as_bytes());
    for m in &tile.models {
        let record = RawModel {
            model_id: U32::new(m.model_id),
            position: f32s(m.position),
            rotation: f32s(m.rotation),
            scale: F32::new(m.scale as f32),
            flags: U32::new(m.flags),
            bounds: box_f32s(&m.bounds),
        };
        out.extend_from_slice(record.as_bytes());
    }
    out.extend_from_slice(&((tile.vertices.len() / 3) as u32).to_le_bytes());
    for v in &tile.vertices {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&(tile.indices.len() as u32).to_le_bytes());
    for i in &tile.indices {
        out.extend_from_slice(&i.to_le_bytes());
    }
    out
}
