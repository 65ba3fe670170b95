//! Region of interest, terminal caps and shields derived from the reference line.

use crate::config::MaskConfig;
use crate::errors::{RealignError, RealignResult};
use crate::geometry::{
    buffer_line, dedup_vertices, interpolate_at_distance, largest_part, polyline_length,
    segment_rectangle,
};
use crate::grid::{Grid, Raster};
use geo::{BooleanOps, Centroid};
use geo_buffer::buffer_polygon;
use geo_types::{Coord, LineString, MultiPolygon, Point, Polygon};
use log::debug;
use ordered_float::OrderedFloat;

/// Geometry masks for one segment. Index 0 is the start of the reference
/// line, index 1 its end.
#[derive(Debug, Clone)]
pub struct Masks {
    pub hull: MultiPolygon<f64>,
    pub caps: [Polygon<f64>; 2],
    pub shields: [Polygon<f64>; 2],
    pub anchors: [Point<f64>; 2],
}

impl Masks {
    pub fn caps_multi(&self) -> MultiPolygon<f64> {
        MultiPolygon(self.caps.to_vec())
    }

    /// Opens both caps on `field`. A cap too narrow to hold any cell centre
    /// opens the cell under its anchor instead.
    pub fn paint_caps(&self, field: &mut Grid) -> usize {
        let mut opened = 0;
        for (cap, anchor) in self.caps.iter().zip(&self.anchors) {
            let painted = paint(field, &single(cap.clone()), 1.0);
            if painted == 0 {
                if let Some((r, c)) = field.cell_of(anchor.x(), anchor.y()) {
                    debug!("Cap holds no cell centre, opening the anchor cell ({}, {})", r, c);
                    field.set(r, c, Some(1.0));
                    opened += 1;
                }
            }
            opened += painted;
        }
        opened
    }

    /// Each anchor moved to the nearest valid cell centre inside its cap, so
    /// it never lands on a cell the shield has blocked. Anchors whose cap
    /// holds no valid centre are returned unchanged.
    pub fn snapped_anchors(&self, field: &Grid) -> [Point<f64>; 2] {
        let snap = |cap: &Polygon<f64>, anchor: Point<f64>| {
            field
                .cells_within(&single(cap.clone()))
                .into_iter()
                .filter(|&idx| field.cells()[idx].is_some())
                .map(|idx| {
                    let (r, c) = field.position(idx);
                    Point::from(field.cell_center(r, c))
                })
                .min_by_key(|p| OrderedFloat((p.x() - anchor.x()).hypot(p.y() - anchor.y())))
                .unwrap_or(anchor)
        };
        [
            snap(&self.caps[0], self.anchors[0]),
            snap(&self.caps[1], self.anchors[1]),
        ]
    }
}

fn single(p: Polygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon(vec![p])
}

/// Rejects lines the mask builder cannot orient.
pub fn validate_centerline(line: &LineString<f64>) -> RealignResult<LineString<f64>> {
    if line.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err(RealignError::InvalidGeometry(
            "centerline has non-finite coordinates".to_string(),
        ));
    }
    let line = dedup_vertices(line);
    if line.0.len() < 2 || polyline_length(&line) <= 0.0 {
        return Err(RealignError::InvalidGeometry(
            "centerline needs at least two distinct vertices".to_string(),
        ));
    }
    Ok(line)
}

/// Terminal geometry at one end: the end vertex and the point `cap_length`
/// further inward along the line.
struct Terminal {
    end: Coord<f64>,
    inner: Coord<f64>,
}

impl Terminal {
    fn outward(&self) -> Coord<f64> {
        let dx = self.end.x - self.inner.x;
        let dy = self.end.y - self.inner.y;
        let len = dx.hypot(dy);
        Coord {
            x: dx / len,
            y: dy / len,
        }
    }
}

fn terminals(line: &LineString<f64>, cap_length: f64) -> RealignResult<[Terminal; 2]> {
    let length = polyline_length(line);
    let reversed: LineString<f64> = line.0.iter().rev().copied().collect();
    let missing = || RealignError::InvalidGeometry("centerline has no vertices".to_string());
    // on short lines each cap takes at most half, so the two stay apart
    let reach = cap_length.min(length / 2.0);
    let start = Terminal {
        end: line.0[0],
        inner: interpolate_at_distance(line, reach).ok_or_else(missing)?,
    };
    let end = Terminal {
        end: reversed.0[0],
        inner: interpolate_at_distance(&reversed, reach).ok_or_else(missing)?,
    };
    Ok([start, end])
}

/// Outer boundary of a shield: the cap rectangle grown by `width`, minus the
/// cap itself and minus the inward-facing window the path leaves through.
fn shield_outline(terminal: &Terminal, cap_rect: &Polygon<f64>, radius: f64, width: f64) -> MultiPolygon<f64> {
    let grown = buffer_polygon(cap_rect, width);
    let d = terminal.outward();
    let reach = width * 2.0;
    let exit_far = Coord {
        x: terminal.inner.x - d.x * reach,
        y: terminal.inner.y - d.y * reach,
    };
    let exit = segment_rectangle(terminal.inner, exit_far, radius + reach);
    let ring = grown.difference(&single(cap_rect.clone()));
    match exit {
        Some(exit) => ring.difference(&single(exit)),
        None => ring,
    }
}

/// Builds the hull, caps, shields and anchors for a reference line.
pub fn build_masks(centerline: &LineString<f64>, cfg: &MaskConfig) -> RealignResult<Masks> {
    let line = validate_centerline(centerline)?;
    let hull = buffer_line(&line, cfg.buffer_radius);
    let ends = terminals(&line, cfg.cap_length)?;

    let mut cap_rects = Vec::with_capacity(2);
    for t in &ends {
        let rect = segment_rectangle(t.inner, t.end, cfg.buffer_radius).ok_or_else(|| {
            RealignError::InvalidGeometry("terminal sub-segment has zero length".to_string())
        })?;
        cap_rects.push(rect);
    }

    let pick = |parts: MultiPolygon<f64>, what: &str| -> RealignResult<Polygon<f64>> {
        if parts.0.len() > 1 {
            debug!("{} split into {} parts, keeping the largest", what, parts.0.len());
        }
        largest_part(parts).ok_or_else(|| RealignError::InvalidGeometry(format!("{} is empty", what)))
    };

    let cap_start = pick(single(cap_rects[0].clone()).intersection(&hull), "start cap")?;
    let cap_end = pick(
        single(cap_rects[1].clone())
            .intersection(&hull)
            .difference(&single(cap_start.clone())),
        "end cap",
    )?;
    let caps_multi = MultiPolygon(vec![cap_start.clone(), cap_end.clone()]);

    let shield_start = pick(
        shield_outline(&ends[0], &cap_rects[0], cfg.buffer_radius, cfg.shield_width)
            .intersection(&hull)
            .difference(&caps_multi),
        "start shield",
    )?;
    let shield_end = pick(
        shield_outline(&ends[1], &cap_rects[1], cfg.buffer_radius, cfg.shield_width)
            .intersection(&hull)
            .difference(&caps_multi)
            .difference(&single(shield_start.clone())),
        "end shield",
    )?;

    let anchor = |cap: &Polygon<f64>| {
        cap.centroid()
            .ok_or_else(|| RealignError::InvalidGeometry("cap has no centroid".to_string()))
    };
    let anchors = [anchor(&cap_start)?, anchor(&cap_end)?];

    Ok(Masks {
        hull,
        caps: [cap_start, cap_end],
        shields: [shield_start, shield_end],
        anchors,
    })
}

/// Cells whose centre is outside `area` become no-data.
pub fn clip_to(grid: &Grid, area: &MultiPolygon<f64>) -> Grid {
    let inside = grid.cells_within(area);
    let mut keep = vec![false; grid.cells().len()];
    for idx in inside {
        keep[idx] = true;
    }
    grid.map_cells_indexed(|idx, cell| if keep[idx] { cell } else { None })
}

/// Overwrites every valid cell whose centre is inside `area` with `value`.
pub fn burn(grid: &mut Grid, area: &MultiPolygon<f64>, value: f64) -> usize {
    let mut burned = 0;
    for idx in grid.cells_within(area) {
        if grid.cells()[idx].is_some() {
            grid.set_index(idx, Some(value));
            burned += 1;
        }
    }
    burned
}

/// Sets every cell whose centre is inside `area` to `value`, no-data or not.
pub fn paint(grid: &mut Grid, area: &MultiPolygon<f64>, value: f64) -> usize {
    let cells = grid.cells_within(area);
    for &idx in &cells {
        grid.set_index(idx, Some(value));
    }
    cells.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains};

    fn straight(len: f64) -> LineString<f64> {
        LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: len, y: 0.0 }])
    }

    #[test]
    fn test_straight_line_caps_are_equal() {
        let cfg = MaskConfig {
            buffer_radius: 10.0,
            cap_length: 5.0,
            shield_width: 2.0,
        };
        let masks = build_masks(&straight(100.0), &cfg).unwrap();
        let a0 = masks.caps[0].unsigned_area();
        let a1 = masks.caps[1].unsigned_area();
        assert!((a0 - 100.0).abs() < 1e-3, "start cap area {}", a0);
        assert!((a0 - a1).abs() < 1e-3);

        for shield in &masks.shields {
            assert!(shield.unsigned_area() > 0.0);
            for cap in &masks.caps {
                let overlap = single(shield.clone()).intersection(&single(cap.clone()));
                assert!(overlap.unsigned_area() < 1e-3);
            }
        }
        let shields = single(masks.shields[0].clone()).intersection(&single(masks.shields[1].clone()));
        assert!(shields.unsigned_area() < 1e-3);
    }

    #[test]
    fn test_anchors_are_cap_centroids() {
        let masks = build_masks(&straight(100.0), &MaskConfig::default()).unwrap();
        assert!((masks.anchors[0].x() - 2.5).abs() < 1e-3);
        assert!(masks.anchors[0].y().abs() < 1e-3);
        assert!((masks.anchors[1].x() - 97.5).abs() < 1e-3);
    }

    #[test]
    fn test_shield_sits_behind_the_anchor() {
        let masks = build_masks(&straight(100.0), &MaskConfig::default()).unwrap();
        // just past the start vertex, inside the hull's rounded end
        assert!(masks.shields[0].contains(&Point::new(-1.0, 0.0)));
        // the path must still be able to leave the cap toward the line
        assert!(!masks.shields[0].contains(&Point::new(6.0, 0.0)));
        assert!(masks.hull.contains(&Point::new(50.0, 9.0)));
    }

    #[test]
    fn test_short_line_caps_stay_disjoint() {
        let cfg = MaskConfig {
            buffer_radius: 5.0,
            cap_length: 5.0,
            shield_width: 1.0,
        };
        let masks = build_masks(&straight(6.0), &cfg).unwrap();
        let overlap = single(masks.caps[0].clone()).intersection(&single(masks.caps[1].clone()));
        assert!(overlap.unsigned_area() < 1e-3);
        assert!(masks.caps[1].unsigned_area() > 0.0);
    }

    #[test]
    fn test_split_cap_keeps_largest_part() {
        // the start leg runs straight through the end cap, cutting it in two
        let line = LineString::from(vec![(10.0, -5.0), (10.0, 20.0), (30.0, 20.0), (30.0, -3.0), (4.0, -3.0)]);
        let cfg = MaskConfig {
            buffer_radius: 2.0,
            cap_length: 10.0,
            shield_width: 2.0,
        };
        let masks = build_masks(&line, &cfg).unwrap();

        let end_cap = &masks.caps[1];
        assert!((end_cap.unsigned_area() - 16.0).abs() < 1e-3, "end cap area {}", end_cap.unsigned_area());
        assert!(end_cap.contains(&Point::new(6.0, -3.0)));
        assert!(!end_cap.contains(&Point::new(13.0, -3.0)));
        assert!((masks.anchors[1].x() - 6.0).abs() < 1e-3);
        assert!((masks.anchors[1].y() + 3.0).abs() < 1e-3);
        assert!(masks.shields.iter().all(|s| s.unsigned_area() > 0.0));
    }

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            vec![],
        )
    }

    fn hand_masks(caps: [Polygon<f64>; 2], anchors: [Point<f64>; 2]) -> Masks {
        Masks {
            hull: MultiPolygon(vec![square(0.0, 0.0, 4.0, 4.0)]),
            shields: caps.clone(),
            caps,
            anchors,
        }
    }

    #[test]
    fn test_anchor_snaps_to_centre_inside_cap() {
        use crate::grid::GeoTransform;

        let field = Grid::filled(GeoTransform::new(0.0, 4.0, 1.0), 4, 4, 1.0);
        // the anchor's own cell is centred at (1.5, 0.5), below the cap
        let masks = hand_masks(
            [square(0.9, 0.9, 1.6, 1.6), square(2.9, 2.9, 3.6, 3.6)],
            [Point::new(1.05, 0.95), Point::new(3.5, 3.5)],
        );
        let [start, end] = masks.snapped_anchors(&field);
        assert_eq!(start, Point::new(1.5, 1.5));
        assert_eq!(end, Point::new(3.5, 3.5));
    }

    #[test]
    fn test_narrow_cap_opens_anchor_cell() {
        use crate::grid::GeoTransform;

        let mut field = Grid::filled(GeoTransform::new(0.0, 4.0, 1.0), 4, 4, 0.0);
        let masks = hand_masks(
            [square(1.6, 1.1, 1.9, 1.4), square(2.1, 2.1, 2.9, 2.9)],
            [Point::new(1.75, 1.25), Point::new(2.5, 2.5)],
        );
        assert_eq!(masks.paint_caps(&mut field), 2);
        // row 2 spans y 1..2, col 1 spans x 1..2
        assert_eq!(field.get(2, 1), Some(1.0));
        assert_eq!(field.get(1, 2), Some(1.0));
        assert_eq!(field.valid_values().filter(|v| *v == 1.0).count(), 2);
        assert_eq!(masks.snapped_anchors(&field)[0], Point::new(1.75, 1.25));
    }

    #[test]
    fn test_rejects_degenerate_line() {
        let point_line = LineString::new(vec![Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 1.0 }]);
        assert!(matches!(
            build_masks(&point_line, &MaskConfig::default()),
            Err(RealignError::InvalidGeometry(_))
        ));
    }
}
