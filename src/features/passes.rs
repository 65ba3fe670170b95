//! Point-derived layers computed once per acquisition pass and then reduced.
//!
//! Sensor gain and coverage differ between flight lines, so each pass is
//! capped and stretched on its own before the passes are merged by maximum.

use crate::config::RasterConfig;
use crate::errors::RealignResult;
use crate::grid::{Aggregation, Grid, Raster, quantile, reduce};
use crate::point_cloud::LidarPoint;
use log::debug;

/// Height of a return above the ground model, with the cell it falls in.
pub(crate) fn normalised_height(ground: &Grid, p: &LidarPoint) -> Option<(usize, f64)> {
    let (r, c) = ground.cell_of(p.x, p.y)?;
    let z0 = ground.get(r, c)?;
    Some((ground.index(r, c), p.z - z0))
}

/// Zero wherever the ground is defined, no-data elsewhere.
fn zeroed_like(ground: &Grid) -> Grid {
    ground.map(|_| 0.0)
}

#[derive(Debug, Clone)]
pub struct PassLayers {
    pub pass_id: u16,
    pub intensity_range: Option<Grid>,
    pub ground_density: Grid,
    pub low_point_density: Grid,
}

fn in_band(h: f64, band: (f64, f64)) -> bool {
    h >= band.0 && h <= band.1
}

/// Max minus min intensity of ground-band returns per cell.
///
/// Intensities above the pass's `percentile` are capped first.
fn intensity_range(points: &[&LidarPoint], ground: &Grid, cfg: &RasterConfig) -> Option<Grid> {
    let samples: Vec<(usize, f64)> = points
        .iter()
        .filter_map(|p| {
            let intensity = p.intensity?;
            let (idx, h) = normalised_height(ground, p)?;
            in_band(h, cfg.ground_band).then_some((idx, intensity as f64))
        })
        .collect();
    if samples.is_empty() {
        return None;
    }
    let mut raw: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
    let cap = quantile(&mut raw, cfg.intensity_percentile)?;

    let mut lo = vec![f64::INFINITY; ground.cells().len()];
    let mut hi = vec![f64::NEG_INFINITY; ground.cells().len()];
    for (idx, v) in samples {
        let v = v.min(cap);
        lo[idx] = lo[idx].min(v);
        hi[idx] = hi[idx].max(v);
    }
    let range = zeroed_like(ground).map_cells_indexed(|idx, cell| {
        cell.map(|_| if hi[idx] >= lo[idx] { hi[idx] - lo[idx] } else { 0.0 })
    });
    Some(range.stretch(1.0))
}

/// Return counts per cell for returns inside `band`, dropping fringe scan angles.
fn band_density(points: &[&LidarPoint], ground: &Grid, cfg: &RasterConfig, band: (f64, f64)) -> Grid {
    let mut counts = vec![0.0; ground.cells().len()];
    for p in points {
        if p.scan_angle.abs() > cfg.max_scan_angle {
            continue;
        }
        if let Some((idx, h)) = normalised_height(ground, p) {
            if in_band(h, band) {
                counts[idx] += 1.0;
            }
        }
    }
    zeroed_like(ground)
        .map_cells_indexed(|idx, cell| cell.map(|_| counts[idx]))
        .cap_at_quantile(cfg.density_percentile)
        .stretch(1.0)
}

/// Layers for a single pass; a pure function of the pass's returns.
pub fn pass_layers(
    pass_id: u16,
    points: &[&LidarPoint],
    ground: &Grid,
    cfg: &RasterConfig,
) -> PassLayers {
    debug!("Rasterizing pass {} with {} returns", pass_id, points.len());
    PassLayers {
        pass_id,
        intensity_range: intensity_range(points, ground, cfg),
        ground_density: band_density(points, ground, cfg, cfg.ground_band),
        low_point_density: band_density(points, ground, cfg, cfg.low_band),
    }
}

#[derive(Debug, Clone)]
pub struct MergedPassLayers {
    pub intensity_range: Option<Grid>,
    pub ground_density: Grid,
    pub low_point_density: Grid,
}

/// Element-wise maximum across passes.
pub fn merge_passes(layers: &[PassLayers], ground: &Grid) -> RealignResult<MergedPassLayers> {
    if layers.is_empty() {
        return Ok(MergedPassLayers {
            intensity_range: None,
            ground_density: zeroed_like(ground),
            low_point_density: zeroed_like(ground),
        });
    }
    let intensity: Vec<Grid> = layers.iter().filter_map(|l| l.intensity_range.clone()).collect();
    let ground_density: Vec<Grid> = layers.iter().map(|l| l.ground_density.clone()).collect();
    let low: Vec<Grid> = layers.iter().map(|l| l.low_point_density.clone()).collect();

    Ok(MergedPassLayers {
        intensity_range: if intensity.is_empty() {
            None
        } else {
            Some(reduce(&intensity, Aggregation::Max)?)
        },
        ground_density: reduce(&ground_density, Aggregation::Max)?,
        low_point_density: reduce(&low, Aggregation::Max)?,
    })
}
