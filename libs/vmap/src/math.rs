//! Vector and triangle primitives plus the ray/triangle test used by every query.
//!
//! All arithmetic is done in `f64`; tile vertices are stored as `f32` and widened on use.

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Tolerance shared by the parallel test and the forward-distance test.
pub const EPSILON: f64 = 1e-7;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn from_f32(v: [f32; 3]) -> Self {
        Self::new(v[0] as f64, v[1] as f64, v[2] as f64)
    }

    pub fn dot(self, rhs: Vector3) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn cross(self, rhs: Vector3) -> Vector3 {
        Vector3 {
            x: self.y * rhs.z - self.z * rhs.y,
            y: self.z * rhs.x - self.x * rhs.z,
            z: self.x * rhs.y - self.y * rhs.x,
        }
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, rhs: Vector3) -> f64 {
        (rhs - self).length()
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned box. Descriptive only; queries never cull against it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3,
    pub max: Vector3,
}

impl BoundingBox {
    pub const fn new(min: Vector3, max: Vector3) -> Self {
        Self { min, max }
    }

    /// A zero-size box sitting on `center`.
    pub const fn point(center: Vector3) -> Self {
        Self {
            min: center,
            max: center,
        }
    }

    pub fn from_f32(raw: [f32; 6]) -> Self {
        Self {
            min: Vector3::from_f32([raw[0], raw[1], raw[2]]),
            max: Vector3::from_f32([raw[3], raw[4], raw[5]]),
        }
    }

    pub fn center(&self) -> Vector3 {
        (self.min + self.max) * 0.5
    }

    pub fn contains(&self, p: Vector3, tolerance: f64) -> bool {
        p.x >= self.min.x - tolerance
            && p.x <= self.max.x + tolerance
            && p.y >= self.min.y - tolerance
            && p.y <= self.max.y + tolerance
            && p.z >= self.min.z - tolerance
            && p.z <= self.max.z + tolerance
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Triangle {
    pub v0: Vector3,
    pub v1: Vector3,
    pub v2: Vector3,
}

/// Where a ray met a triangle. `t` is measured in units of the ray direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    pub t: f64,
    pub point: Vector3,
}

/// Möller–Trumbore ray/triangle intersection.
///
/// Barycentric bounds are inclusive (`u`, `v` in `[0, 1]`, `u + v <= 1`) so rays
/// through an edge or vertex hit. The hit must lie strictly in front of the
/// origin (`t > EPSILON`).
pub fn intersect(
    origin: Vector3,
    direction: Vector3,
    v0: Vector3,
    v1: Vector3,
    v2: Vector3,
) -> Option<RayHit> {
    let e1 = v1 - v0;
    let e2 = v2 - v0;
    let h = direction.cross(e2);
    let a = e1.dot(h);
    if a.abs() < EPSILON {
        return None;
    }

    let f = 1.0 / a;
    let s = origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(e1);
    let v = f * direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * e2.dot(q);
    if t > EPSILON {
        Some(RayHit {
            t,
            point: origin + direction * t,
        })
    } else {
        None
    }
}

/// Closest hit along `origin + direction * t` for `t <= max_t` over every triangle.
///
/// Returns the hit and the index of the triangle that produced it. Ties keep the
/// earlier triangle.
pub fn closest_hit(
    origin: Vector3,
    direction: Vector3,
    max_t: f64,
    triangles: impl IntoIterator<Item = Triangle>,
) -> Option<(usize, RayHit)> {
    let mut best: Option<(usize, RayHit)> = None;
    for (i, tri) in triangles.into_iter().enumerate() {
        let Some(hit) = intersect(origin, direction, tri.v0, tri.v1, tri.v2) else {
            continue;
        };
        if hit.t > max_t {
            continue;
        }
        if best.is_none_or(|(_, b)| hit.t < b.t) {
            best = Some((i, hit));
        }
    }
    best
}
