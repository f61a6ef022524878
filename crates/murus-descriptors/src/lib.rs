//! Per-voxel angle x distance damage histograms and the bin-limit policy.

use log::debug;
use murus_core::{
    CloudView, DamageCloud, DamageHistogram, Error, HistogramCloud, Result,
};
use murus_nn::{KdTree, NeighborIndex3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Closed interval covered by one histogram axis.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub lo: f32,
    pub hi: f32,
}

impl Range {
    pub fn new(lo: f32, hi: f32) -> Self { Self { lo, hi } }

    fn check(&self, axis: &'static str) -> Result<()> {
        // NaN bounds fail the comparison as well
        if self.lo <= self.hi {
            Ok(())
        } else {
            Err(Error::DegenerateRange { axis, lo: self.lo, hi: self.hi })
        }
    }
}

/// Histogram domain shared by every anchor of a run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinLimits {
    pub angle: Range,
    pub dist: Range,
}

impl BinLimits {
    pub fn new(angle_lo: f32, angle_hi: f32, dist_lo: f32, dist_hi: f32) -> Result<Self> {
        let limits = Self { angle: Range::new(angle_lo, angle_hi), dist: Range::new(dist_lo, dist_hi) };
        limits.validate()?;
        Ok(limits)
    }

    pub fn validate(&self) -> Result<()> {
        self.angle.check("angle")?;
        self.dist.check("distance")
    }

    /// Min/max of both offsets over the damage cloud.
    pub fn scan(damage: &DamageCloud) -> Result<Self> {
        let first = damage
            .data
            .first()
            .ok_or_else(|| Error::invalid("cannot derive bin limits from an empty damage cloud"))?;
        let mut angle = Range::new(first.angle_offset, first.angle_offset);
        let mut dist = Range::new(first.dist_offset, first.dist_offset);
        for d in &damage.data[1..] {
            angle.lo = angle.lo.min(d.angle_offset);
            angle.hi = angle.hi.max(d.angle_offset);
            dist.lo = dist.lo.min(d.dist_offset);
            dist.hi = dist.hi.max(d.dist_offset);
        }
        Ok(Self { angle, dist })
    }
}

/// How the histogram domain is chosen. Decided once per run.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BinPolicy {
    /// Scan all damage records for min/max.
    Automatic,
    /// Caller-supplied bounds.
    Manual(BinLimits),
}

impl BinPolicy {
    pub fn resolve(&self, damage: &DamageCloud) -> Result<BinLimits> {
        match self {
            BinPolicy::Automatic => BinLimits::scan(damage),
            BinPolicy::Manual(limits) => {
                limits.validate()?;
                Ok(*limits)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistogramCfg {
    /// bins along the angle offset axis
    pub angle_bins: usize,
    /// bins along the distance offset axis
    pub dist_bins: usize,
    /// damage records gathered per anchor
    pub k: usize,
}

impl Default for HistogramCfg {
    fn default() -> Self { Self { angle_bins: 8, dist_bins: 10, k: 30 } }
}

impl HistogramCfg {
    pub fn len(&self) -> usize { self.angle_bins * self.dist_bins }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// `floor((v - lo) / (hi - lo) * bins)` clamped to `[0, bins-1]`.
///
/// Values at or beyond either edge land in the edge bin. A zero-width range
/// and NaN values map to bin 0.
pub fn bin_index(value: f32, range: Range, bins: usize) -> usize {
    let last = bins.saturating_sub(1);
    let width = range.hi as f64 - range.lo as f64;
    if !(width > 0.0) {
        return 0;
    }
    let t = (value as f64 - range.lo as f64) / width * bins as f64;
    if t.is_nan() || t <= 0.0 {
        0
    } else if t >= last as f64 {
        last
    } else {
        (t.floor() as usize).min(last)
    }
}

/// One histogram per anchor, from the `k` damage records nearest to it.
pub fn damage_histograms<'a>(
    damage: &DamageCloud,
    anchors: impl Into<CloudView<'a>>,
    limits: &BinLimits,
    cfg: HistogramCfg,
) -> Result<HistogramCloud> {
    let anchors: CloudView<'a> = anchors.into();
    if damage.is_empty() {
        return Err(Error::invalid("damage cloud is empty"));
    }
    if anchors.is_empty() {
        return Err(Error::invalid("anchor cloud is empty"));
    }
    if cfg.angle_bins == 0 || cfg.dist_bins == 0 {
        return Err(Error::invalid(format!(
            "bin counts must be positive, got {}x{}",
            cfg.angle_bins, cfg.dist_bins
        )));
    }
    if cfg.k == 0 {
        return Err(Error::invalid("k_search must be at least 1"));
    }

    let index = KdTree::build(damage.into())?;
    let hists: Vec<DamageHistogram> = (0..anchors.len())
        .into_par_iter()
        .map(|a| {
            let mut h = DamageHistogram::zeros(cfg.len());
            for nb in index.knn_point(anchors.point(a), cfg.k) {
                let d = &damage.data[nb.idx];
                let ai = bin_index(d.angle_offset, limits.angle, cfg.angle_bins);
                let di = bin_index(d.dist_offset, limits.dist, cfg.dist_bins);
                h.counts[ai * cfg.dist_bins + di] += 1;
            }
            h
        })
        .collect();

    debug!(
        "damage_histograms: {} anchors x {} bins (k={})",
        hists.len(),
        cfg.len(),
        cfg.k
    );
    Ok(HistogramCloud {
        x: anchors.x.to_vec(),
        y: anchors.y.to_vec(),
        z: anchors.z.to_vec(),
        data: hists,
    })
}
