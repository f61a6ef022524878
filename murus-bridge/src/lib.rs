//! Wall selection, configuration and the one-shot damage pipeline.

use log::info;
use murus_core::{Cloud, DamageCloud, HistogramCloud, PlaneModel, Result};
use murus_descriptors::BinLimits;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod provider;
pub mod synth;

pub use config::{ConfigError, PipelineConfig};
pub use provider::{
    locate_wall, FixedPlaneProvider, PlaneProvider, PlaneRegion, RansacConfig, RansacPlaneProvider,
    WallSelection,
};
pub use synth::{synthetic_wall, SynthConfig};

/// Everything one run produces, in pipeline order.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    pub plane: PlaneModel,
    pub degraded: bool,
    pub wall: Cloud,
    pub voxelized: Cloud,
    pub damage: DamageCloud,
    pub limits: BinLimits,
    pub histograms: HistogramCloud,
}

/// Counts and limits of a run, for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub input_points: usize,
    pub wall_points: usize,
    pub voxel_anchors: usize,
    pub damage_points: usize,
    pub histogram_bins: usize,
    pub plane: [f32; 4],
    pub limits: BinLimits,
    pub degraded: bool,
}

impl PipelineOutput {
    pub fn summary(&self, input_points: usize) -> RunSummary {
        RunSummary {
            input_points,
            wall_points: self.wall.len(),
            voxel_anchors: self.voxelized.len(),
            damage_points: self.damage.len(),
            histogram_bins: self.histograms.data.first().map_or(0, |h| h.len()),
            plane: self.plane.coefficients(),
            limits: self.limits,
            degraded: self.degraded,
        }
    }
}

/// One-shot run: wall selection, per-point damage, voxel anchors, bin
/// limits, per-anchor histograms. Fails on the first invalid stage input;
/// the only tolerated failure is a plane detection service failure (see
/// [`locate_wall`]).
pub fn run_pipeline(input: &Cloud, provider: &dyn PlaneProvider, cfg: &PipelineConfig) -> Result<PipelineOutput> {
    cfg.validate()?;
    let policy = cfg.bin_policy()?;

    let WallSelection { plane, wall, degraded } = locate_wall(provider, input, cfg.fallback_plane()?)?;
    info!(
        "wall: {} of {} points, plane {:?}{}",
        wall.len(),
        input.len(),
        plane.coefficients(),
        if degraded { " (degraded)" } else { "" }
    );

    let damage = murus_features::estimate_wall_damage(&wall, &plane, cfg.k_search)?;
    info!("damage estimated for {} points", damage.len());

    let voxelized = murus_filters::voxel_downsample(&wall, cfg.leaf_size)?;
    info!("voxelized to {} anchors (leaf {})", voxelized.len(), cfg.leaf_size);

    let limits = policy.resolve(&damage)?;
    info!(
        "bin limits: angle [{}, {}], distance [{}, {}]",
        limits.angle.lo, limits.angle.hi, limits.dist.lo, limits.dist.hi
    );

    let histograms = murus_descriptors::damage_histograms(&damage, &voxelized, &limits, cfg.histogram_cfg())?;
    info!("built {} histograms of {} bins", histograms.len(), cfg.histogram_cfg().len());

    Ok(PipelineOutput { plane, degraded, wall, voxelized, damage, limits, histograms })
}
