//! Plane detection as a pluggable service, plus the wall selection policy
//! used when that service fails.

use log::{debug, warn};
use murus_core::{signed_distance, Cloud, Error, PlaneModel, Result};
use nalgebra::{Matrix3, Vector3};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// One detected planar patch: its model and the member points.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneRegion {
    pub plane: PlaneModel,
    pub indices: Vec<usize>,
}

/// Primitive detection over a cloud. Regions come back ranked best first.
pub trait PlaneProvider {
    fn detect(&self, cloud: &Cloud) -> Result<Vec<PlaneRegion>>;
}

/// Always answers with the same plane.
#[derive(Clone, Debug)]
pub struct FixedPlaneProvider {
    pub plane: PlaneModel,
    /// keep only points within this distance; `None` keeps every point
    pub max_distance: Option<f32>,
}

impl FixedPlaneProvider {
    pub fn new(plane: PlaneModel) -> Self { Self { plane, max_distance: None } }

    pub fn with_max_distance(mut self, d: f32) -> Self {
        self.max_distance = Some(d);
        self
    }
}

impl PlaneProvider for FixedPlaneProvider {
    fn detect(&self, cloud: &Cloud) -> Result<Vec<PlaneRegion>> {
        let indices = match self.max_distance {
            None => (0..cloud.len()).collect(),
            Some(t) => inliers(cloud, &self.plane, t, |_| true)?,
        };
        Ok(vec![PlaneRegion { plane: self.plane, indices }])
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub iterations: usize,
    /// inlier band half-width, same units as the cloud
    pub distance_threshold: f32,
    pub min_inliers: usize,
    /// planes extracted one after another, each from the remaining points
    pub max_planes: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self { iterations: 200, distance_threshold: 0.02, min_inliers: 100, max_planes: 1, seed: 42 }
    }
}

impl RansacConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.distance_threshold > 0.0) || !self.distance_threshold.is_finite() {
            return Err(Error::invalid(format!(
                "ransac distance_threshold must be positive, got {}",
                self.distance_threshold
            )));
        }
        if self.iterations == 0 {
            return Err(Error::invalid("ransac iterations must be at least 1"));
        }
        Ok(())
    }
}

/// Local RANSAC plane detection. Deterministic for a given seed.
#[derive(Clone, Debug, Default)]
pub struct RansacPlaneProvider {
    pub cfg: RansacConfig,
}

impl RansacPlaneProvider {
    pub fn new(cfg: RansacConfig) -> Self { Self { cfg } }

    /// Best plane over the points not yet `taken`, refit by least squares on its inliers.
    fn best_plane(&self, cloud: &Cloud, taken: &[bool], rng: &mut ChaCha8Rng) -> Result<Option<PlaneRegion>> {
        let free: Vec<usize> = (0..cloud.len()).filter(|&i| !taken[i]).collect();
        if free.len() < 3 {
            return Ok(None);
        }
        let t = self.cfg.distance_threshold;
        let mut best: Option<(PlaneModel, usize)> = None;
        for _ in 0..self.cfg.iterations {
            let s = rand::seq::index::sample(&mut *rng, free.len(), 3);
            let (p0, p1, p2) = (cloud.point(free[s.index(0)]), cloud.point(free[s.index(1)]), cloud.point(free[s.index(2)]));
            let Some(plane) = plane_through(p0, p1, p2) else { continue };
            let count = inliers(cloud, &plane, t, |i| !taken[i])?.len();
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((plane, count));
            }
        }
        let Some((plane, count)) = best else { return Ok(None) };
        if count < self.cfg.min_inliers.max(3) {
            return Ok(None);
        }

        let mut indices = inliers(cloud, &plane, t, |i| !taken[i])?;
        let plane = match fit_plane(cloud, &indices) {
            Some(refit) => {
                let refit_indices = inliers(cloud, &refit, t, |i| !taken[i])?;
                if refit_indices.len() >= indices.len() {
                    indices = refit_indices;
                    refit
                } else {
                    plane
                }
            }
            None => plane,
        };
        Ok(Some(PlaneRegion { plane, indices }))
    }
}

impl PlaneProvider for RansacPlaneProvider {
    fn detect(&self, cloud: &Cloud) -> Result<Vec<PlaneRegion>> {
        self.cfg.validate()?;
        if cloud.len() < 3 {
            return Err(Error::ExternalServiceFailure(format!(
                "plane detection needs at least 3 points, got {}",
                cloud.len()
            )));
        }
        let mut rng = ChaCha8Rng::seed_from_u64(self.cfg.seed);
        let mut taken = vec![false; cloud.len()];
        let mut regions = Vec::new();
        while regions.len() < self.cfg.max_planes.max(1) {
            let Some(region) = self.best_plane(cloud, &taken, &mut rng)? else { break };
            for &i in &region.indices {
                taken[i] = true;
            }
            debug!("ransac: plane {:?} with {} inliers", region.plane.coefficients(), region.indices.len());
            regions.push(region);
        }
        if regions.is_empty() {
            return Err(Error::ExternalServiceFailure(format!(
                "no plane with at least {} inliers among {} points",
                self.cfg.min_inliers,
                cloud.len()
            )));
        }
        // extraction is greedy, so this only reorders ties
        regions.sort_by(|a, b| b.indices.len().cmp(&a.indices.len()));
        Ok(regions)
    }
}

fn inliers(cloud: &Cloud, plane: &PlaneModel, t: f32, keep: impl Fn(usize) -> bool) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for i in 0..cloud.len() {
        if keep(i) && signed_distance(cloud.point(i), plane)?.abs() <= t {
            out.push(i);
        }
    }
    Ok(out)
}

fn plane_through(p0: [f32; 3], p1: [f32; 3], p2: [f32; 3]) -> Option<PlaneModel> {
    let v = |p: [f32; 3]| Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
    let n = (v(p1) - v(p0)).cross(&(v(p2) - v(p0)));
    let len = n.norm();
    if !(len > 1e-12) || !len.is_finite() {
        return None;
    }
    let n = n / len;
    PlaneModel::from_point_normal(p0, [n.x as f32, n.y as f32, n.z as f32]).ok()
}

/// Total least squares plane: centroid + smallest covariance eigenvector.
fn fit_plane(cloud: &Cloud, indices: &[usize]) -> Option<PlaneModel> {
    if indices.len() < 3 {
        return None;
    }
    let mut mean = Vector3::<f64>::zeros();
    for &i in indices {
        let p = cloud.point(i);
        mean += Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64);
    }
    mean /= indices.len() as f64;
    let mut c = Matrix3::<f64>::zeros();
    for &i in indices {
        let p = cloud.point(i);
        let d = Vector3::new(p[0] as f64, p[1] as f64, p[2] as f64) - mean;
        c += d * d.transpose();
    }
    let eig = c.symmetric_eigen();
    let min = (0..3).min_by(|&a, &b| eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]))?;
    let n = eig.eigenvectors.column(min);
    let len = n.norm();
    if !(len > 0.0) || !len.is_finite() {
        return None;
    }
    let n = [(n[0] / len) as f32, (n[1] / len) as f32, (n[2] / len) as f32];
    PlaneModel::from_point_normal([mean.x as f32, mean.y as f32, mean.z as f32], n).ok()
}

/// The wall the rest of the pipeline works on.
#[derive(Clone, Debug)]
pub struct WallSelection {
    pub plane: PlaneModel,
    pub wall: Cloud,
    /// true when the provider gave nothing usable and the whole cloud was kept
    pub degraded: bool,
}

/// Ask `provider` for planes and keep the top-ranked one. If detection
/// fails, finds nothing, or names points outside `cloud`, continue with the
/// whole cloud and `fallback`. Any other provider error is returned.
pub fn locate_wall(provider: &dyn PlaneProvider, cloud: &Cloud, fallback: PlaneModel) -> Result<WallSelection> {
    let reason = match provider.detect(cloud) {
        Ok(regions) => match regions.into_iter().next() {
            Some(top) if top.indices.iter().any(|&i| i >= cloud.len()) => {
                format!("top region references points outside the {}-point cloud", cloud.len())
            }
            Some(top) if !top.indices.is_empty() => {
                debug!("wall: {} of {} points", top.indices.len(), cloud.len());
                return Ok(WallSelection { plane: top.plane, wall: cloud.select(&top.indices), degraded: false });
            }
            _ => "provider returned no planar region".to_string(),
        },
        Err(e @ Error::ExternalServiceFailure(_)) => e.to_string(),
        Err(e) => return Err(e),
    };
    warn!(
        "plane detection failed ({reason}); continuing with the whole cloud and plane {:?}",
        fallback.coefficients()
    );
    Ok(WallSelection { plane: fallback, wall: cloud.clone(), degraded: true })
}
