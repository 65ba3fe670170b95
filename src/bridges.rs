//! Forces bridge crossings to stay driveable.
//!
//! Water surfaces look nothing like road in the feature layers, so a segment
//! that crosses a river would otherwise route around it or fall back.

use crate::config::BridgeConfig;
use crate::features::passes::normalised_height;
use crate::geometry::{buffer_line, union_all};
use crate::grid::{Grid, Raster};
use crate::masks::burn;
use crate::point_cloud::{PointCloud, classification};
use geo::BooleanOps;
use geo_types::{LineString, MultiLineString, MultiPolygon};
use log::{debug, info};

/// Buffered parts of the centerline that run over water.
pub fn bridge_zone(
    centerline: &LineString<f64>,
    water: &MultiPolygon<f64>,
    buffer: f64,
) -> Option<MultiPolygon<f64>> {
    if buffer <= 0.0 || water.0.is_empty() {
        return None;
    }
    let wet = water.clip(&MultiLineString(vec![centerline.clone()]), false);
    if wet.0.is_empty() {
        return None;
    }
    let pieces = wet
        .0
        .iter()
        .flat_map(|part| buffer_line(part, buffer).0)
        .collect();
    Some(union_all(pieces))
}

/// Working-grid cells holding an elevated water return.
///
/// Water-classified returns well above the ground model are a deck spanning
/// the water, not the water surface.
pub fn deck_cells(cloud: &PointCloud, ground: &Grid, field: &Grid, height_threshold: f64) -> Vec<usize> {
    let mut cells: Vec<usize> = cloud
        .points()
        .iter()
        .filter(|p| p.classification == classification::WATER)
        .filter_map(|p| {
            let (_, h) = normalised_height(ground, p)?;
            if h <= height_threshold {
                return None;
            }
            let (r, c) = field.cell_of(p.x, p.y)?;
            Some(field.index(r, c))
        })
        .collect();
    cells.sort_unstable();
    cells.dedup();
    cells
}

/// Returns `field` with every bridge cell set to the bridge conductivity.
///
/// Only valid cells change, so the override never leaks outside the hull the
/// field was already clipped to. The value is kept within `[floor, 1]`.
pub fn apply_bridges(
    field: &Grid,
    centerline: &LineString<f64>,
    water: Option<&MultiPolygon<f64>>,
    cloud: &PointCloud,
    ground: Option<&Grid>,
    cfg: &BridgeConfig,
    floor: f64,
) -> Grid {
    let value = cfg.conductivity.clamp(floor, 1.0);
    let mut out = field.clone();

    if let Some(zone) = water.and_then(|w| bridge_zone(centerline, w, cfg.buffer)) {
        let burned = burn(&mut out, &zone, value);
        info!("Centerline crosses water, {} cells forced to bridge conductivity", burned);
    }

    if cloud.is_classified() {
        match ground {
            Some(ground) => {
                let mut burned = 0;
                for idx in deck_cells(cloud, ground, &out, cfg.water_height_threshold) {
                    if out.cells()[idx].is_some() {
                        out.set_index(idx, Some(value));
                        burned += 1;
                    }
                }
                if burned > 0 {
                    info!("{} cells carry elevated water returns, treating as bridge deck", burned);
                }
            }
            None => debug!("No ground model, skipping bridge deck detection"),
        }
    }
    out
}
