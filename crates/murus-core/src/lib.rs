//! murus-core — core data model, plane primitives and the shared error type.

use std::collections::HashMap;
use serde::{Deserialize, Serialize};

mod error;
pub mod plane;

pub use error::{Error, Result};
pub use plane::{angle_between_normals, signed_distance, PlaneModel};

/// Structure-of-Arrays point cloud.
/// Keep hot columns (x,y,z) tight; put optional columns in a name→column map.
#[derive(Default, Clone, Debug, Serialize, Deserialize)]
pub struct Cloud {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,

    /// Optional attributes (same length as x/y/z).
    /// Common keys: "red","green","blue","intensity".
    pub attrs_f32: HashMap<String, Vec<f32>>,
}

impl Cloud {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
    pub fn push(&mut self, px: f32, py: f32, pz: f32) {
        self.x.push(px); self.y.push(py); self.z.push(pz);
    }
    pub fn reserve(&mut self, n: usize) {
        self.x.reserve(n); self.y.reserve(n); self.z.reserve(n);
        for v in self.attrs_f32.values_mut() { v.reserve(n); }
    }
    pub fn point(&self, i: usize) -> [f32; 3] { [self.x[i], self.y[i], self.z[i]] }

    /// Attribute keys whose column is aligned with x/y/z, sorted.
    pub fn aligned_attrs(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .attrs_f32
            .iter()
            .filter_map(|(k, v)| if v.len() == self.len() { Some(k.as_str()) } else { None })
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Copy out the points at `indices` (in that order), keeping aligned attributes.
    pub fn select(&self, indices: &[usize]) -> Cloud {
        let mut out = Cloud::default();
        out.reserve(indices.len());
        for &i in indices {
            out.push(self.x[i], self.y[i], self.z[i]);
        }
        for k in self.aligned_attrs() {
            let col = &self.attrs_f32[k];
            out.attrs_f32.insert(k.to_string(), indices.iter().map(|&i| col[i]).collect());
        }
        out
    }
}

/// Zero-copy view into a Cloud (slice-of-SoA).
#[derive(Copy, Clone)]
pub struct CloudView<'a> {
    pub x: &'a [f32],
    pub y: &'a [f32],
    pub z: &'a [f32],
}

impl<'a> CloudView<'a> {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
    pub fn point(&self, i: usize) -> [f32; 3] { [self.x[i], self.y[i], self.z[i]] }
}

impl<'a> From<&'a Cloud> for CloudView<'a> {
    fn from(c: &'a Cloud) -> Self { Self { x: &c.x, y: &c.y, z: &c.z } }
}

/// Positions plus one typed payload per point.
///
/// Each pipeline stage attaches its own record (damage offsets, histograms)
/// to a position instead of extending a point type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayloadCloud<T> {
    pub x: Vec<f32>,
    pub y: Vec<f32>,
    pub z: Vec<f32>,
    pub data: Vec<T>,
}

impl<T> Default for PayloadCloud<T> {
    fn default() -> Self { Self { x: Vec::new(), y: Vec::new(), z: Vec::new(), data: Vec::new() } }
}

impl<T> PayloadCloud<T> {
    pub fn len(&self) -> usize { self.x.len() }
    pub fn is_empty(&self) -> bool { self.x.is_empty() }
    pub fn push(&mut self, p: [f32; 3], value: T) {
        self.x.push(p[0]); self.y.push(p[1]); self.z.push(p[2]);
        self.data.push(value);
    }
    pub fn point(&self, i: usize) -> [f32; 3] { [self.x[i], self.y[i], self.z[i]] }
    pub fn iter(&self) -> impl Iterator<Item = ([f32; 3], &T)> + '_ {
        (0..self.len()).map(move |i| (self.point(i), &self.data[i]))
    }
}

impl<'a, T> From<&'a PayloadCloud<T>> for CloudView<'a> {
    fn from(c: &'a PayloadCloud<T>) -> Self { Self { x: &c.x, y: &c.y, z: &c.z } }
}

/// Deviation of one wall point from the wall plane.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WallDamage {
    /// Signed perpendicular distance to the plane.
    pub dist_offset: f32,
    /// Angle between the local surface normal and the plane normal, radians in [0, π/2].
    pub angle_offset: f32,
}

/// Flattened angle × distance counts (angle-major).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageHistogram {
    pub counts: Vec<u32>,
}

impl DamageHistogram {
    pub fn zeros(len: usize) -> Self { Self { counts: vec![0; len] } }
    pub fn len(&self) -> usize { self.counts.len() }
    pub fn is_empty(&self) -> bool { self.counts.is_empty() }
    pub fn total(&self) -> u32 { self.counts.iter().sum() }
}

pub type DamageCloud = PayloadCloud<WallDamage>;
pub type HistogramCloud = PayloadCloud<DamageHistogram>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_keeps_aligned_attrs_only() {
        let mut c = Cloud::default();
        for i in 0..4 { c.push(i as f32, 0.0, 0.0); }
        c.attrs_f32.insert("red".into(), vec![10.0, 20.0, 30.0, 40.0]);
        c.attrs_f32.insert("stale".into(), vec![1.0]);

        let s = c.select(&[3, 1]);
        assert_eq!(s.x, vec![3.0, 1.0]);
        assert_eq!(s.attrs_f32["red"], vec![40.0, 20.0]);
        assert!(!s.attrs_f32.contains_key("stale"));
    }

    #[test]
    fn payload_cloud_views_share_positions() {
        let mut d = DamageCloud::default();
        d.push([1.0, 2.0, 3.0], WallDamage { dist_offset: 0.5, angle_offset: 0.1 });
        let v = CloudView::from(&d);
        assert_eq!(v.len(), 1);
        assert_eq!(v.point(0), [1.0, 2.0, 3.0]);
        assert_eq!(d.iter().next().map(|(_, w)| w.dist_offset), Some(0.5));
    }

    #[test]
    fn histogram_total() {
        let h = DamageHistogram { counts: vec![1, 0, 4] };
        assert_eq!(h.total(), 5);
        assert_eq!(DamageHistogram::zeros(80).len(), 80);
    }
}
