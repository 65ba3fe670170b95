//! Turns returns plus a ground model into aligned per-cell feature layers.

pub mod passes;
pub mod terrain;

use crate::config::RasterConfig;
use crate::diagnostics::{Diagnostics, emit};
use crate::errors::{RealignError, RealignResult};
use crate::grid::{Aggregation, Grid, Raster, block_factor};
use crate::point_cloud::PointCloud;
use log::debug;

/// Feature layers at working resolution, all sharing one georeference.
#[derive(Debug, Clone)]
pub struct FeatureStack {
    pub slope: Grid,
    pub roughness: Grid,
    pub edge_strength: Grid,
    /// Absent when the cloud carries no intensity values
    pub intensity_range: Option<Grid>,
    pub canopy_height: Grid,
    pub ground_density: Grid,
    pub low_point_density: Grid,
}

impl FeatureStack {
    pub fn has_intensity(&self) -> bool {
        self.intensity_range.is_some()
    }

    pub fn reference(&self) -> &Grid {
        &self.slope
    }
}

/// Number of ground cells averaged into one native cell.
///
/// Coarser models are rejected, as are finer ones whose cells do not tile a
/// native cell exactly.
pub fn ground_factor(ground: &Grid, cfg: &RasterConfig) -> RealignResult<usize> {
    let res = ground.resolution();
    let native = cfg.native_resolution;
    if res > native * (1.0 + 1e-6) {
        return Err(RealignError::ResolutionTooCoarse {
            found: res,
            required: native,
        });
    }
    block_factor(res, native).ok_or_else(|| {
        RealignError::InvalidConfig(format!(
            "native_resolution {} is not a whole multiple of the ground resolution {}",
            native, res
        ))
    })
}

/// Brings the ground model to the native resolution by block averaging.
pub fn prepare_ground(ground: &Grid, cfg: &RasterConfig) -> RealignResult<Grid> {
    let factor = ground_factor(ground, cfg)?;
    if ground.valid_count() == 0 {
        return Err(RealignError::EmptyGrid);
    }
    if factor > 1 {
        debug!(
            "Downsampling ground model from {} to {} by averaging",
            ground.resolution(),
            cfg.native_resolution
        );
    }
    Ok(ground.aggregate(factor, Aggregation::Mean))
}

/// Highest return above the ground model per cell.
pub fn canopy_height(cloud: &PointCloud, ground: &Grid) -> Grid {
    let mut tallest = vec![0.0f64; ground.cells().len()];
    for p in cloud.points() {
        if let Some((idx, h)) = passes::normalised_height(ground, p) {
            tallest[idx] = tallest[idx].max(h);
        }
    }
    ground.map_cells_indexed(|idx, cell| cell.map(|_| tallest[idx]))
}

/// Computes every feature layer and aggregates it to working resolution.
pub fn rasterize(
    cloud: &PointCloud,
    ground: &Grid,
    cfg: &RasterConfig,
    mut diagnostics: Option<&mut dyn Diagnostics>,
) -> RealignResult<FeatureStack> {
    let ground = prepare_ground(ground, cfg)?;
    debug!(
        "Rasterizing {} returns onto {}x{} ground model",
        cloud.len(),
        ground.rows(),
        ground.cols()
    );

    let slope = terrain::slope_degrees(&ground);
    let roughness = terrain::roughness(&ground);
    let edge_strength = terrain::edge_strength(&slope, cfg.edge_kernel);
    let canopy = canopy_height(cloud, &ground);

    let per_pass: Vec<passes::PassLayers> = cloud
        .by_pass()
        .iter()
        .map(|(pass_id, points)| passes::pass_layers(*pass_id, points, &ground, cfg))
        .collect();
    let merged = passes::merge_passes(&per_pass, &ground)?;

    let factor = cfg.aggregation_factor;
    let stack = FeatureStack {
        slope: slope.aggregate(factor, Aggregation::Mean),
        roughness: roughness.aggregate(factor, Aggregation::Mean),
        edge_strength: edge_strength.aggregate(factor, Aggregation::Mean),
        intensity_range: merged
            .intensity_range
            .map(|g| g.aggregate(factor, Aggregation::Mean)),
        canopy_height: canopy.aggregate(factor, Aggregation::Mean),
        ground_density: merged.ground_density.aggregate(factor, Aggregation::Min),
        low_point_density: merged.low_point_density.aggregate(factor, Aggregation::Min),
    };

    emit(&mut diagnostics, "ground", &ground);
    emit(&mut diagnostics, "slope", &stack.slope);
    emit(&mut diagnostics, "roughness", &stack.roughness);
    emit(&mut diagnostics, "edge_strength", &stack.edge_strength);
    if let Some(intensity) = &stack.intensity_range {
        emit(&mut diagnostics, "intensity_range", intensity);
    }
    emit(&mut diagnostics, "canopy_height", &stack.canopy_height);
    emit(&mut diagnostics, "ground_density", &stack.ground_density);
    emit(&mut diagnostics, "low_point_density", &stack.low_point_density);

    Ok(stack)
}
