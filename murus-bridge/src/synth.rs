//! Synthetic wall: a flat sheet plus a curved one, jittered.

use murus_core::Cloud;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
    /// full width of the uniform jitter on each axis
    pub x_range: f32,
    pub y_range: f32,
    pub z_range: f32,
    /// grid resolution of each sheet
    pub points_per_dim: usize,
    /// seed used by the CLI when no rng is supplied
    pub seed: u64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 1.0,
            min_y: 0.0,
            max_y: 1.0,
            min_z: 0.0,
            max_z: 1.0,
            x_range: 0.01,
            y_range: 0.01,
            z_range: 0.01,
            points_per_dim: 30,
            seed: 0,
        }
    }
}

/// Jitter in `[-range/2, range/2)` with 1% steps.
fn jitter<R: Rng + ?Sized>(rng: &mut R, range: f32) -> f32 {
    rng.gen_range(-50i32..50) as f32 * range / 100.0
}

/// Two `points_per_dim²` sheets. The first lies on the slanted plane through
/// the box (y and z rise together); the second bends away, y falling
/// quadratically while z falls linearly.
pub fn synthetic_wall<R: Rng + ?Sized>(cfg: &SynthConfig, rng: &mut R) -> Cloud {
    let n = cfg.points_per_dim;
    let nf = n as f32;
    let (sx, sy, sz) = (
        (cfg.max_x - cfg.min_x) / nf,
        (cfg.max_y - cfg.min_y) / nf,
        (cfg.max_z - cfg.min_z) / nf,
    );

    let mut c = Cloud::default();
    c.reserve(2 * n * n);
    for i in 0..n {
        for j in 0..n {
            let (fi, fj) = (i as f32, j as f32);
            let x = fi * sx + cfg.min_x + jitter(rng, cfg.x_range);
            let y = fj * sy + cfg.min_y + jitter(rng, cfg.y_range);
            let z = fj * sz + cfg.min_z + jitter(rng, cfg.z_range);
            c.push(x, y, z);
        }
    }
    for i in 0..n {
        for j in 0..n {
            let (fi, fj) = (i as f32, j as f32);
            let x = fi * sx + cfg.min_x + jitter(rng, cfg.x_range);
            let y = -(fj * fj) / nf * sy + cfg.min_y + jitter(rng, cfg.y_range);
            let z = -fj * sz + cfg.min_z + jitter(rng, cfg.z_range);
            c.push(x, y, z);
        }
    }
    c
}
