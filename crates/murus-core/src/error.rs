//! Error taxonomy shared by every pipeline stage.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Empty or undersized collections, non-positive parameters.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Plane (or normal) with a zero-length normal vector.
    #[error("degenerate plane: normal has (near) zero length")]
    DegeneratePlane,

    /// Bin range whose lower bound exceeds its upper bound.
    #[error("degenerate {axis} range: lower bound {lo} exceeds upper bound {hi}")]
    DegenerateRange { axis: &'static str, lo: f32, hi: f32 },

    /// Plane detection did not produce a usable result.
    #[error("plane detection failed: {0}")]
    ExternalServiceFailure(String),
}

impl Error {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
