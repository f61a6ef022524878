use log::debug;
use murus_core::{
    angle_between_normals, signed_distance, CloudView, DamageCloud, Error, PlaneModel, Result,
    WallDamage,
};
use murus_nn::{KdTree, Neighbor, NeighborIndex3};
use nalgebra::{Matrix3, Vector3};
use rayon::prelude::*;

/// Default neighborhood size for local normal fits.
pub const DEFAULT_K_SEARCH: usize = 30;

/// A covariance whose middle eigenvalue is below this fraction of its trace
/// is rank < 2 (collinear or coincident neighbors) and yields no normal.
const RANK_EPS: f64 = 1e-12;

/// Compute one [`WallDamage`] record per point of `cloud`, in input order.
///
/// The local normal comes from PCA over the `k` nearest neighbors (the point
/// included). Where the neighborhood cannot define a surface the plane's own
/// normal stands in, so such points report a zero angle offset.
pub fn estimate_wall_damage<'a>(
    cloud: impl Into<CloudView<'a>>,
    plane: &PlaneModel,
    k: usize,
) -> Result<DamageCloud> {
    let view: CloudView<'a> = cloud.into();
    if view.is_empty() {
        return Err(Error::invalid("wall cloud is empty"));
    }
    if k < 1 {
        return Err(Error::invalid("k_search must be at least 1"));
    }
    let plane_normal = plane.unit_normal()?;
    let index = KdTree::build(view)?;

    let per_point: Vec<(WallDamage, bool)> = (0..view.len())
        .into_par_iter()
        .map(|i| -> Result<(WallDamage, bool)> {
            let p = view.point(i);
            let neigh = index.knn(i, k);
            let local = local_normal(view, &neigh);
            let normal = local.unwrap_or(plane_normal);
            let damage = WallDamage {
                dist_offset: signed_distance(p, plane)?,
                angle_offset: angle_between_normals(normal, plane_normal)?,
            };
            Ok((damage, local.is_none()))
        })
        .collect::<Result<_>>()?;

    let fallbacks = per_point.iter().filter(|(_, f)| *f).count();
    debug!(
        "wall damage: {} points, k={}, {} used the plane normal",
        per_point.len(),
        k,
        fallbacks
    );

    Ok(DamageCloud {
        x: view.x.to_vec(),
        y: view.y.to_vec(),
        z: view.z.to_vec(),
        data: per_point.into_iter().map(|(d, _)| d).collect(),
    })
}

/// Smallest-eigenvalue eigenvector of the neighborhood covariance, or `None`
/// when fewer than 3 distinct positions or a rank < 2 covariance make the
/// surface undefined.
pub fn local_normal(pts: CloudView<'_>, neigh: &[Neighbor]) -> Option<[f32; 3]> {
    if distinct_positions(pts, neigh, 3) < 3 {
        return None;
    }

    // mean
    let mut mean = Vector3::<f64>::zeros();
    for n in neigh {
        let p = pts.point(n.idx);
        mean += Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
    }
    mean /= neigh.len() as f64;

    // covariance
    let mut c = Matrix3::<f64>::zeros();
    for n in neigh {
        let p = pts.point(n.idx);
        let v = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - mean;
        c += v * v.transpose();
    }
    c /= neigh.len() as f64;

    let eig = c.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_unstable_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]));
    let trace = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum::<f64>();
    if !(eig.eigenvalues[order[1]] > RANK_EPS * (trace + 1e-30)) {
        return None;
    }

    // smallest eigenvector ~ normal
    let n = eig.eigenvectors.column(order[0]);
    let len = n.norm();
    if !(len > 0.0) || !len.is_finite() {
        return None;
    }
    Some([(n[0] / len) as f32, (n[1] / len) as f32, (n[2] / len) as f32])
}

/// Count distinct neighbor positions, stopping once `cap` are seen.
fn distinct_positions(pts: CloudView<'_>, neigh: &[Neighbor], cap: usize) -> usize {
    let mut seen: Vec<[f32; 3]> = Vec::with_capacity(cap);
    for n in neigh {
        let p = pts.point(n.idx);
        if !seen.contains(&p) {
            seen.push(p);
            if seen.len() >= cap { break; }
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use murus_core::Cloud;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn grid_on_z0(n: usize) -> Cloud {
        let mut c = Cloud::default();
        for i in 0..n {
            for j in 0..n {
                c.push(i as f32 * 0.1, j as f32 * 0.1, 0.0);
            }
        }
        c
    }

    #[test]
    fn perfect_plane_has_no_damage() {
        let cloud = grid_on_z0(10);
        let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
        let out = estimate_wall_damage(&cloud, &plane, 10).unwrap();
        assert_eq!(out.len(), 100);
        for (_, d) in out.iter() {
            assert_abs_diff_eq!(d.dist_offset, 0.0);
            assert_abs_diff_eq!(d.angle_offset, 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn output_follows_input_order_and_size() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut cloud = Cloud::default();
        for _ in 0..333 {
            cloud.push(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0), rng.gen_range(-0.01..0.01));
        }
        let plane = PlaneModel::new(0.0, 0.0, 2.0, 0.0).unwrap();
        let out = estimate_wall_damage(&cloud, &plane, 12).unwrap();
        assert_eq!(out.len(), cloud.len());
        assert_eq!(out.x, cloud.x);
        assert_eq!(out.z, cloud.z);
        for (p, d) in out.iter() {
            assert_abs_diff_eq!(d.dist_offset, p[2], epsilon = 1e-6);
            assert!((0.0..=std::f32::consts::FRAC_PI_2).contains(&d.angle_offset));
        }
    }

    #[test]
    fn rerun_is_identical() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut cloud = Cloud::default();
        for _ in 0..400 {
            let x: f32 = rng.gen_range(0.0..1.0);
            cloud.push(x, rng.gen_range(0.0..1.0), 0.05 * (x * 6.0).sin());
        }
        let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
        let a = estimate_wall_damage(&cloud, &plane, 30).unwrap();
        let b = estimate_wall_damage(&cloud, &plane, 30).unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn tilted_patch_reports_its_tilt() {
        // surface z = x (45°) measured against the z = 0 plane
        let mut cloud = Cloud::default();
        for i in 0..15 {
            for j in 0..15 {
                let x = i as f32 * 0.05;
                cloud.push(x, j as f32 * 0.05, x);
            }
        }
        let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
        let out = estimate_wall_damage(&cloud, &plane, 9).unwrap();
        for (p, d) in out.iter() {
            assert_abs_diff_eq!(d.angle_offset, std::f32::consts::FRAC_PI_4, epsilon = 1e-3);
            assert_abs_diff_eq!(d.dist_offset, p[2], epsilon = 1e-6);
        }
    }

    #[test]
    fn collinear_neighborhood_falls_back_to_plane_normal() {
        let mut cloud = Cloud::default();
        for i in 0..20 { cloud.push(i as f32, 0.0, 1.0); }
        let plane = PlaneModel::new(0.0, 1.0, 1.0, 0.0).unwrap();
        let out = estimate_wall_damage(&cloud, &plane, 5).unwrap();
        for d in &out.data {
            assert_abs_diff_eq!(d.angle_offset, 0.0, epsilon = 1e-6);
            assert_abs_diff_eq!(d.dist_offset, std::f32::consts::FRAC_1_SQRT_2, epsilon = 1e-6);
        }
    }

    #[test]
    fn single_point_and_duplicates_fall_back() {
        let mut cloud = Cloud::default();
        cloud.push(0.0, 0.0, 3.0);
        let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
        let out = estimate_wall_damage(&cloud, &plane, 30).unwrap();
        assert_eq!(out.data, vec![WallDamage { dist_offset: 3.0, angle_offset: 0.0 }]);

        let mut dup = Cloud::default();
        for _ in 0..10 { dup.push(1.0, 1.0, 1.0); }
        dup.push(2.0, 1.0, 1.0);
        let out = estimate_wall_damage(&dup, &plane, 30).unwrap();
        assert!(out.data.iter().all(|d| d.angle_offset == 0.0));
    }

    #[test]
    fn rejects_bad_inputs() {
        let plane = PlaneModel::new(0.0, 0.0, 1.0, 0.0).unwrap();
        let empty = Cloud::default();
        assert!(matches!(estimate_wall_damage(&empty, &plane, 10), Err(Error::InvalidInput(_))));
        let cloud = grid_on_z0(3);
        assert!(matches!(estimate_wall_damage(&cloud, &plane, 0), Err(Error::InvalidInput(_))));
        let flat = PlaneModel { a: 0.0, b: 0.0, c: 0.0, d: 0.0 };
        assert_eq!(estimate_wall_damage(&cloud, &flat, 5).unwrap_err(), Error::DegeneratePlane);
    }
}
