//! Errors raised while realigning a single road segment.
//!
//! A missing path between the anchors is not an error: the solver reports it
//! as a fallback result. Everything here abandons the segment.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RealignError {
    #[error("Neither a ground model nor a precomputed conductivity grid was supplied")]
    MissingSurface,
    #[error("Ground model and conductivity grid disagree: {0}")]
    IncompatibleInputs(String),
    #[error("Raster resolution {found} is coarser than the required {required}")]
    ResolutionTooCoarse { found: f64, required: f64 },
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Grid has no valid cells")]
    EmptyGrid,
    #[error("Anchor ({x}, {y}) lies outside the conductivity grid")]
    AnchorOutsideGrid { x: f64, y: f64 },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type RealignResult<T> = Result<T, RealignError>;
