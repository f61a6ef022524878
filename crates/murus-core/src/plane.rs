//! Plane equation a·x + b·y + c·z + d = 0 and the two primitives measured against it.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Normals shorter than this are treated as zero.
pub const MIN_NORMAL_NORM: f64 = 1e-12;

/// Idealized wall plane. The normal (a,b,c) need not be unit length.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneModel {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
}

impl PlaneModel {
    /// Build a plane, rejecting a (near) zero normal.
    pub fn new(a: f32, b: f32, c: f32, d: f32) -> Result<Self> {
        let p = Self { a, b, c, d };
        norm(p.normal())?;
        Ok(p)
    }

    pub fn from_coefficients(coeffs: [f32; 4]) -> Result<Self> {
        Self::new(coeffs[0], coeffs[1], coeffs[2], coeffs[3])
    }

    pub fn coefficients(&self) -> [f32; 4] { [self.a, self.b, self.c, self.d] }
    pub fn normal(&self) -> [f32; 3] { [self.a, self.b, self.c] }

    pub fn unit_normal(&self) -> Result<[f32; 3]> {
        let n = self.normal();
        let l = norm(n)?;
        Ok([(n[0] as f64 / l) as f32, (n[1] as f64 / l) as f32, (n[2] as f64 / l) as f32])
    }

    /// Plane through `point` with normal `normal`.
    pub fn from_point_normal(point: [f32; 3], normal: [f32; 3]) -> Result<Self> {
        norm(normal)?;
        let d = -(normal[0] as f64 * point[0] as f64
            + normal[1] as f64 * point[1] as f64
            + normal[2] as f64 * point[2] as f64);
        Ok(Self { a: normal[0], b: normal[1], c: normal[2], d: d as f32 })
    }
}

fn norm(v: [f32; 3]) -> Result<f64> {
    let l = (v[0] as f64 * v[0] as f64 + v[1] as f64 * v[1] as f64 + v[2] as f64 * v[2] as f64).sqrt();
    if !l.is_finite() || l <= MIN_NORMAL_NORM {
        return Err(Error::DegeneratePlane);
    }
    Ok(l)
}

/// (a·x + b·y + c·z + d) / ‖(a,b,c)‖; positive on the side the normal points to.
pub fn signed_distance(point: [f32; 3], plane: &PlaneModel) -> Result<f32> {
    let l = norm(plane.normal())?;
    let num = plane.a as f64 * point[0] as f64
        + plane.b as f64 * point[1] as f64
        + plane.c as f64 * point[2] as f64
        + plane.d as f64;
    Ok((num / l) as f32)
}

/// Unsigned angle between two normals, in [0, π/2].
///
/// Normal direction is ambiguous, so the cosine is taken in absolute value.
/// The clamp keeps rounding from pushing the cosine outside acos's domain.
pub fn angle_between_normals(n1: [f32; 3], n2: [f32; 3]) -> Result<f32> {
    let l1 = norm(n1)?;
    let l2 = norm(n2)?;
    let dot = n1[0] as f64 * n2[0] as f64 + n1[1] as f64 * n2[1] as f64 + n1[2] as f64 * n2[2] as f64;
    let cos = (dot.abs() / (l1 * l2)).clamp(-1.0, 1.0);
    Ok(cos.acos() as f32)
}
