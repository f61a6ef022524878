//! murus-filters — voxel grid downsampling.

use hashbrown::hash_map::Entry;
use hashbrown::HashMap;
use log::debug;
use murus_core::{Cloud, Error, Result};

/// Running sums for one occupied voxel.
#[derive(Clone)]
struct VoxelAcc {
    sum: [f64; 3],
    attrs: Vec<f64>,
    count: u32,
}

/// Voxel grid downsample (centroid). Grid size in same units as input.
///
/// Cells are `floor(coord / leaf_size)` on each axis; every occupied cell
/// yields the centroid of its points, attribute columns averaged alongside.
/// Cells are emitted in the order their first point appears, so the output
/// does not depend on hashing.
pub fn voxel_downsample(input: &Cloud, leaf_size: f32) -> Result<Cloud> {
    if !(leaf_size > 0.0) || !leaf_size.is_finite() {
        return Err(Error::invalid(format!("leaf_size must be positive, got {leaf_size}")));
    }
    let inv = 1.0 / leaf_size as f64;
    let attr_keys: Vec<String> = input.aligned_attrs().into_iter().map(str::to_string).collect();
    let attr_cols: Vec<&Vec<f32>> = attr_keys.iter().map(|k| &input.attrs_f32[k]).collect();

    let mut slots: HashMap<[i64; 3], usize> = HashMap::new();
    let mut bins: Vec<VoxelAcc> = Vec::new();
    for i in 0..input.len() {
        let p = input.point(i);
        let key = [
            (p[0] as f64 * inv).floor() as i64,
            (p[1] as f64 * inv).floor() as i64,
            (p[2] as f64 * inv).floor() as i64,
        ];
        let slot = match slots.entry(key) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                bins.push(VoxelAcc { sum: [0.0; 3], attrs: vec![0.0; attr_cols.len()], count: 0 });
                *v.insert(bins.len() - 1)
            }
        };
        let e = &mut bins[slot];
        e.sum[0] += p[0] as f64;
        e.sum[1] += p[1] as f64;
        e.sum[2] += p[2] as f64;
        for (acc, col) in e.attrs.iter_mut().zip(&attr_cols) {
            *acc += col[i] as f64;
        }
        e.count += 1;
    }

    let mut out = Cloud::default();
    for k in &attr_keys {
        out.attrs_f32.insert(k.clone(), Vec::with_capacity(bins.len()));
    }
    out.reserve(bins.len());
    for b in &bins {
        let invc = 1.0 / (b.count as f64);
        out.push((b.sum[0] * invc) as f32, (b.sum[1] * invc) as f32, (b.sum[2] * invc) as f32);
        for (k, s) in attr_keys.iter().zip(&b.attrs) {
            if let Some(col) = out.attrs_f32.get_mut(k) {
                col.push((s * invc) as f32);
            }
        }
    }
    debug!("voxel_downsample: {} -> {} (leaf={})", input.len(), out.len(), leaf_size);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn cube_corners_stay_separate() {
        let mut c = Cloud::default();
        for &x in &[0.0, 2.0] {
            for &y in &[0.0, 2.0] {
                for &z in &[0.0, 2.0] {
                    c.push(x, y, z);
                }
            }
        }
        let out = voxel_downsample(&c, 1.0).unwrap();
        assert_eq!(out.len(), 8);
        for i in 0..8 {
            assert_eq!(out.point(i), c.point(i));
        }
    }

    #[test]
    fn emits_centroid_per_cell() {
        let mut c = Cloud::default();
        c.push(0.1, 0.1, 0.1);
        c.push(0.3, 0.5, 0.9);
        c.push(1.5, 0.0, 0.0);
        c.attrs_f32.insert("red".into(), vec![100.0, 200.0, 50.0]);

        let out = voxel_downsample(&c, 1.0).unwrap();
        assert_eq!(out.len(), 2);
        let p = out.point(0);
        assert_abs_diff_eq!(p[0], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(p[1], 0.3, epsilon = 1e-6);
        assert_abs_diff_eq!(p[2], 0.5, epsilon = 1e-6);
        assert_eq!(out.attrs_f32["red"], vec![150.0, 50.0]);
    }

    #[test]
    fn centroid_is_order_independent() {
        let pts = [[0.1, 0.2, 0.3], [0.4, 0.1, 0.2], [0.9, 0.9, 0.1], [0.05, 0.7, 0.6]];
        let mut a = Cloud::default();
        let mut b = Cloud::default();
        for p in pts.iter() { a.push(p[0], p[1], p[2]); }
        for p in pts.iter().rev() { b.push(p[0], p[1], p[2]); }
        let oa = voxel_downsample(&a, 1.0).unwrap();
        let ob = voxel_downsample(&b, 1.0).unwrap();
        assert_eq!(oa.len(), 1);
        for ax in 0..3 {
            assert_abs_diff_eq!(oa.point(0)[ax], ob.point(0)[ax], epsilon = 1e-6);
        }
    }

    #[test]
    fn negative_coordinates_floor_correctly() {
        let mut c = Cloud::default();
        c.push(-0.1, 0.0, 0.0);
        c.push(0.1, 0.0, 0.0);
        assert_eq!(voxel_downsample(&c, 1.0).unwrap().len(), 2);
    }

    #[test]
    fn rejects_non_positive_leaf() {
        let c = Cloud::default();
        for leaf in [0.0, -1.0, f32::NAN] {
            assert!(matches!(voxel_downsample(&c, leaf), Err(Error::InvalidInput(_))));
        }
    }
}
