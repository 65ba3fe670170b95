//! Runs one road segment from raw inputs to a realigned centerline.

use crate::bridges::apply_bridges;
use crate::conductivity::{clamp_to_floor, combine, smooth};
use crate::config::RealignConfig;
use crate::diagnostics::{Diagnostics, emit, reborrow};
use crate::errors::{RealignError, RealignResult};
use crate::features::{ground_factor, rasterize};
use crate::grid::{Aggregation, Grid, Raster, block_factor};
use crate::masks::{Masks, build_masks, clip_to, paint, validate_centerline};
use crate::path_solver::{PathResult, solve};
use crate::point_cloud::PointCloud;
use crate::transition::TransitionGraph;
use geo::{BoundingRect, Intersects};
use geo_types::{LineString, MultiPolygon};
use log::{debug, info};

/// Everything one segment needs. At least one of `ground` and
/// `conductivity` must be present.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInputs<'a> {
    pub cloud: &'a PointCloud,
    pub ground: Option<&'a Grid>,
    /// Precomputed conductivity; skips rasterisation and smoothing
    pub conductivity: Option<&'a Grid>,
    pub water: Option<&'a MultiPolygon<f64>>,
    pub centerline: &'a LineString<f64>,
}

fn working_resolution(cfg: &RealignConfig) -> f64 {
    cfg.raster.native_resolution * cfg.raster.aggregation_factor as f64
}

/// Number of precomputed conductivity cells averaged into one working cell.
fn conductivity_factor(conductivity: &Grid, cfg: &RealignConfig) -> RealignResult<usize> {
    let working = working_resolution(cfg);
    let res = conductivity.resolution();
    if res > working * (1.0 + 1e-6) {
        return Err(RealignError::ResolutionTooCoarse {
            found: res,
            required: working,
        });
    }
    block_factor(res, working).ok_or_else(|| {
        RealignError::InvalidConfig(format!(
            "working resolution {} is not a whole multiple of the conductivity resolution {}",
            working, res
        ))
    })
}

/// Fails fast on surface inputs that cannot produce a field.
pub fn check_surfaces(inputs: &PipelineInputs, cfg: &RealignConfig) -> RealignResult<()> {
    match (inputs.ground, inputs.conductivity) {
        (None, None) => Err(RealignError::MissingSurface),
        (Some(ground), None) => ground_factor(ground, &cfg.raster).map(|_| ()),
        (ground, Some(conductivity)) => {
            conductivity_factor(conductivity, cfg)?;
            let Some(ground) = ground else { return Ok(()) };
            let (a, b) = (ground.transform.srid, conductivity.transform.srid);
            if let (Some(a), Some(b)) = (a, b) {
                if a != b {
                    return Err(RealignError::IncompatibleInputs(format!(
                        "ground model is in SRID {} but conductivity is in SRID {}",
                        a, b
                    )));
                }
            }
            if !ground.bounds().intersects(&conductivity.bounds()) {
                return Err(RealignError::IncompatibleInputs(
                    "ground model and conductivity grid do not overlap".to_string(),
                ));
            }
            Ok(())
        }
    }
}

/// Combined, smoothed conductivity at working resolution.
///
/// A precomputed grid finer than the working resolution is block averaged
/// onto it, so the graph always runs on the same lattice.
pub fn conductivity_surface(
    inputs: &PipelineInputs,
    cfg: &RealignConfig,
    mut diagnostics: Option<&mut dyn Diagnostics>,
) -> RealignResult<Grid> {
    if let Some(conductivity) = inputs.conductivity {
        if conductivity.valid_count() == 0 {
            return Err(RealignError::EmptyGrid);
        }
        if inputs.ground.is_some() {
            info!("Both ground model and conductivity supplied, using the precomputed conductivity");
        }
        let factor = conductivity_factor(conductivity, cfg)?;
        if factor > 1 {
            debug!("Averaging precomputed conductivity down by a factor of {}", factor);
        }
        return Ok(conductivity.aggregate(factor, Aggregation::Mean));
    }
    let ground = inputs.ground.ok_or(RealignError::MissingSurface)?;
    let stack = rasterize(inputs.cloud, ground, &cfg.raster, reborrow(&mut diagnostics))?;
    let combined = combine(&stack, &cfg.channels, reborrow(&mut diagnostics))?;
    let smoothed = smooth(&combined, &cfg.smoothing);
    emit(&mut diagnostics, "smoothed", &smoothed);
    Ok(smoothed)
}

/// Applies hull, bridge, shield and cap overrides in that order.
///
/// Valid values end up in `[floor, 1]`, shield cells at exactly 0 and cap
/// cells at exactly 1.
pub fn finalise_field(
    surface: &Grid,
    masks: &Masks,
    inputs: &PipelineInputs,
    cfg: &RealignConfig,
    mut diagnostics: Option<&mut dyn Diagnostics>,
) -> RealignResult<Grid> {
    let bbox = masks
        .hull
        .bounding_rect()
        .ok_or_else(|| RealignError::InvalidGeometry("hull is empty".to_string()))?;
    let windowed = surface.window(bbox, 1);
    debug!("Working window {}x{}", windowed.rows(), windowed.cols());

    let floor = cfg.graph.floor;
    let clipped = clip_to(&clamp_to_floor(&windowed, floor), &masks.hull);
    let bridged = apply_bridges(
        &clipped,
        inputs.centerline,
        inputs.water,
        inputs.cloud,
        inputs.ground,
        &cfg.bridge,
        floor,
    );
    emit(&mut diagnostics, "bridged", &bridged);

    let mut field = bridged;
    let shielded = paint(&mut field, &MultiPolygon(masks.shields.to_vec()), 0.0);
    let capped = masks.paint_caps(&mut field);
    debug!("{} shield cells blocked, {} cap cells opened", shielded, capped);
    emit(&mut diagnostics, "field", &field);
    Ok(field)
}

/// Realigns one segment.
///
/// A missing path is not an error: the result then carries the input
/// centerline with zero quality.
pub fn realign(
    inputs: &PipelineInputs,
    cfg: &RealignConfig,
    mut diagnostics: Option<&mut dyn Diagnostics>,
) -> RealignResult<PathResult> {
    cfg.validate()?;
    let centerline = validate_centerline(inputs.centerline)?;
    check_surfaces(inputs, cfg)?;
    let masks = build_masks(&centerline, &cfg.masks)?;

    let surface = conductivity_surface(inputs, cfg, reborrow(&mut diagnostics))?;
    let field = finalise_field(&surface, &masks, inputs, cfg, reborrow(&mut diagnostics))?;
    let graph = TransitionGraph::build(&field, cfg.graph.connectivity);

    let anchors = masks.snapped_anchors(&field);
    let result = solve(
        &field,
        &graph,
        &anchors,
        Some(&masks.caps_multi()),
        inputs.centerline,
        &cfg.path,
    )?;
    if !result.fallback {
        info!(
            "Realigned segment with quality {:.3} over {} vertices",
            result.quality,
            result.geometry.0.len()
        );
    }
    Ok(result)
}
