//! Combines activated feature layers into one conductivity field and smooths it.

use crate::config::{ChannelConfig, ChannelConfigs, SmoothingConfig};
use crate::diagnostics::{Diagnostics, emit};
use crate::errors::{RealignError, RealignResult};
use crate::features::FeatureStack;
use crate::grid::{Connectivity, Grid, Raster};
use log::{debug, info};

/// Weighted mean of the activated feature layers.
///
/// A channel that is no-data at a cell drops out of that cell's mean and the
/// remaining weights are renormalised. The intensity channel counts with
/// weight zero when the cloud had no intensity.
pub fn combine(
    stack: &FeatureStack,
    channels: &ChannelConfigs,
    mut diagnostics: Option<&mut dyn Diagnostics>,
) -> RealignResult<Grid> {
    if !stack.has_intensity() && channels.intensity_range.weight > 0.0 {
        info!("No intensity in point cloud, ignoring intensity_range channel");
    }
    let layers: [(&str, Option<&Grid>, &ChannelConfig); 7] = [
        ("slope", Some(&stack.slope), &channels.slope),
        ("roughness", Some(&stack.roughness), &channels.roughness),
        ("edge_strength", Some(&stack.edge_strength), &channels.edge_strength),
        ("intensity_range", stack.intensity_range.as_ref(), &channels.intensity_range),
        ("canopy_height", Some(&stack.canopy_height), &channels.canopy_height),
        ("ground_density", Some(&stack.ground_density), &channels.ground_density),
        ("low_point_density", Some(&stack.low_point_density), &channels.low_point_density),
    ];

    let reference = stack.reference();
    let mut numerator = vec![0.0; reference.cells().len()];
    let mut denominator = vec![0.0; reference.cells().len()];

    for (name, grid, channel) in layers {
        let Some(grid) = grid else { continue };
        if channel.weight <= 0.0 {
            continue;
        }
        if !grid.same_georeference(reference) {
            return Err(RealignError::IncompatibleInputs(format!(
                "{} layer is not aligned with the feature stack",
                name
            )));
        }
        let contribution = channel.activation.apply(grid)?;
        emit(&mut diagnostics, &format!("activated_{}", name), &contribution);
        for (idx, cell) in contribution.cells().iter().enumerate() {
            if let Some(v) = cell {
                numerator[idx] += channel.weight * v;
                denominator[idx] += channel.weight;
            }
        }
    }

    if denominator.iter().all(|w| *w == 0.0) {
        return Err(RealignError::InvalidConfig(
            "no weighted channel has data to combine".to_string(),
        ));
    }

    let sigma = reference.map_cells_indexed(|idx, _| {
        (denominator[idx] > 0.0).then(|| numerator[idx] / denominator[idx])
    });
    emit(&mut diagnostics, "combined", &sigma);
    Ok(sigma)
}

/// Perona–Malik diffusion over the 4-neighbourhood.
///
/// The conduction coefficient `exp(-(|∇|/k)²)` collapses where neighbouring
/// values differ by more than `k`, so strong conductivity edges survive.
/// No-data neighbours exchange no flux.
pub fn anisotropic_diffusion(grid: &Grid, iterations: usize, lambda: f64, k: f64) -> Grid {
    let mut current = grid.clone();
    for _ in 0..iterations {
        let previous = current.clone();
        current = previous.map_cells_indexed(|idx, cell| {
            let value = cell?;
            let (r, c) = previous.position(idx);
            let flux: f64 = previous
                .neighbors(r, c, Connectivity::Four)
                .filter_map(|(nr, nc)| previous.get(nr, nc))
                .map(|n| {
                    let gradient = n - value;
                    (-(gradient / k).powi(2)).exp() * gradient
                })
                .sum();
            Some(value + lambda * flux)
        });
    }
    current
}

/// Repeated diffusion passes followed by a contrast stretch into [0, 1].
///
/// Each pass runs `iterations` diffusion steps and re-stretches the result.
/// With zero passes or zero iterations this is exactly `grid.stretch(q)`.
pub fn smooth(grid: &Grid, cfg: &SmoothingConfig) -> Grid {
    let q = cfg.stretch_quantile;
    if cfg.passes == 0 || cfg.iterations == 0 {
        return grid.stretch(q);
    }
    let mut current = grid.clone();
    for pass in 0..cfg.passes {
        current = anisotropic_diffusion(&current, cfg.iterations, cfg.lambda, cfg.k).stretch(q);
        debug!("Diffusion pass {} of {} done", pass + 1, cfg.passes);
    }
    current
}

/// Clamps every valid cell into `[floor, 1]`.
pub fn clamp_to_floor(grid: &Grid, floor: f64) -> Grid {
    grid.map(|v| if v.is_nan() { floor } else { v.clamp(floor, 1.0) })
}
