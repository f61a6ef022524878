//! Run parameters, loadable from YAML. Every field has a default.

use std::path::Path;

use murus_core::{Error, PlaneModel, Result};
use murus_descriptors::{BinLimits, BinPolicy, HistogramCfg};
use serde::{Deserialize, Serialize};

use crate::provider::RansacConfig;
use crate::synth::SynthConfig;

/// Failure to obtain a usable [`PipelineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// neighbors per local normal fit and per histogram
    pub k_search: usize,
    /// voxel edge length for anchor extraction
    pub leaf_size: f32,
    /// derive bin limits from the data instead of the four values below
    pub automatically_set_bins: bool,
    pub lower_angle_bin_limit: f32,
    pub upper_angle_bin_limit: f32,
    pub lower_dist_bin_limit: f32,
    pub upper_dist_bin_limit: f32,
    pub angle_bins: usize,
    pub dist_bins: usize,
    /// plane used when detection fails
    pub expected_coefficients: [f32; 4],
    pub ransac: RansacConfig,
    pub synthetic: SynthConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k_search: murus_features::DEFAULT_K_SEARCH,
            leaf_size: 0.01,
            automatically_set_bins: true,
            lower_angle_bin_limit: 0.0,
            upper_angle_bin_limit: std::f32::consts::PI,
            lower_dist_bin_limit: -0.02,
            upper_dist_bin_limit: 0.02,
            angle_bins: 8,
            dist_bins: 10,
            expected_coefficients: [0.0, 1.0, -1.0, 0.0],
            ransac: RansacConfig::default(),
            synthetic: SynthConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn from_yaml(text: &str) -> std::result::Result<Self, ConfigError> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.k_search == 0 {
            return Err(Error::invalid("k_search must be at least 1"));
        }
        if !(self.leaf_size > 0.0) || !self.leaf_size.is_finite() {
            return Err(Error::invalid(format!("leaf_size must be positive, got {}", self.leaf_size)));
        }
        if self.angle_bins == 0 || self.dist_bins == 0 {
            return Err(Error::invalid(format!(
                "bin counts must be positive, got {}x{}",
                self.angle_bins, self.dist_bins
            )));
        }
        if !self.automatically_set_bins {
            self.manual_limits()?;
        }
        self.ransac.validate()?;
        self.fallback_plane()?;
        Ok(())
    }

    fn manual_limits(&self) -> Result<BinLimits> {
        BinLimits::new(
            self.lower_angle_bin_limit,
            self.upper_angle_bin_limit,
            self.lower_dist_bin_limit,
            self.upper_dist_bin_limit,
        )
    }

    pub fn bin_policy(&self) -> Result<BinPolicy> {
        if self.automatically_set_bins {
            Ok(BinPolicy::Automatic)
        } else {
            Ok(BinPolicy::Manual(self.manual_limits()?))
        }
    }

    pub fn histogram_cfg(&self) -> HistogramCfg {
        HistogramCfg { angle_bins: self.angle_bins, dist_bins: self.dist_bins, k: self.k_search }
    }

    pub fn fallback_plane(&self) -> Result<PlaneModel> {
        PlaneModel::from_coefficients(self.expected_coefficients)
    }
}
