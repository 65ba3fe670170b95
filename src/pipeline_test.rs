use crate::activation::{ActivationMode, activate};
use crate::conductivity::smooth;
use crate::config::{MaskConfig, PathConfig, RealignConfig, SmoothingConfig};
use crate::diagnostics::LayerStack;
use crate::errors::RealignError;
use crate::grid::{Connectivity, GeoTransform, Grid, Raster};
use crate::masks::build_masks;
use crate::path_solver::solve;
use crate::pipeline::{PipelineInputs, conductivity_surface, finalise_field, realign};
use crate::point_cloud::{LidarPoint, PointCloud, classification};
use crate::transition::TransitionGraph;
use geo::{Area, BooleanOps, Contains};
use geo_types::{Coord, LineString, MultiPolygon, Point};

fn road() -> LineString<f64> {
    LineString::new(vec![Coord { x: 10.0, y: 15.0 }, Coord { x: 50.0, y: 15.0 }])
}

/// 60 x 30 unit flat ground at 1 unit cells, origin at (0, 30).
fn flat_ground() -> Grid {
    Grid::filled(GeoTransform::new(0.0, 30.0, 1.0), 30, 60, 100.0)
}

/// One ground return per native cell.
fn ground_returns() -> PointCloud {
    let points = (0..30 * 60)
        .map(|i| LidarPoint {
            x: (i % 60) as f64 + 0.5,
            y: (i / 60) as f64 + 0.5,
            z: 100.0,
            intensity: Some(120),
            classification: classification::GROUND,
            scan_angle: 2.0,
            pass_id: (i % 3) as u16,
        })
        .collect();
    PointCloud::new(points)
}

fn precomputed(value: f64) -> Grid {
    Grid::filled(GeoTransform::new(0.0, 30.0, 2.0), 15, 30, value)
}

#[test]
fn test_flat_road_realigns_between_caps() {
    let cloud = ground_returns();
    let ground = flat_ground();
    let line = road();
    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: Some(&ground),
        conductivity: None,
        water: None,
        centerline: &line,
    };
    let mut layers = LayerStack::new();
    let result = realign(&inputs, &RealignConfig::default(), Some(&mut layers)).unwrap();

    assert!(!result.fallback);
    assert!(result.cost.is_finite() && result.cost > 0.0);
    assert!(result.quality > 0.9 && result.quality <= 1.0 + 1e-9);

    let first = result.geometry.0[0];
    let last = result.geometry.0[result.geometry.0.len() - 1];
    assert!((first.x - 15.0).abs() < 1.5, "path starts at {:?}", first);
    assert!((last.x - 45.0).abs() < 1.5, "path ends at {:?}", last);
    assert!(result.geometry.0.iter().all(|c| (c.y - 15.0).abs() < 1e-3));

    for name in ["ground", "combined", "smoothed", "bridged", "field"] {
        assert!(layers.get(name).is_some(), "missing layer {}", name);
    }
}

#[test]
fn test_finalised_field_respects_floor_caps_and_shields() {
    let cloud = ground_returns();
    let ground = flat_ground();
    let line = road();
    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: Some(&ground),
        conductivity: None,
        water: None,
        centerline: &line,
    };
    let cfg = RealignConfig::default();
    let masks = build_masks(&line, &cfg.masks).unwrap();
    let surface = conductivity_surface(&inputs, &cfg, None).unwrap();
    let field = finalise_field(&surface, &masks, &inputs, &cfg, None).unwrap();
    let caps = masks.caps_multi();
    let shields = MultiPolygon(masks.shields.to_vec());

    let mut saw_shield = false;
    for (idx, cell) in field.cells().iter().enumerate() {
        let (r, c) = field.position(idx);
        let centre = Point::from(field.cell_center(r, c));
        if caps.contains(&centre) {
            assert_eq!(*cell, Some(1.0));
        } else if shields.contains(&centre) {
            assert_eq!(*cell, Some(0.0));
            saw_shield = true;
        } else if let Some(v) = cell {
            assert!(*v >= cfg.graph.floor && *v <= 1.0, "cell {} holds {}", idx, v);
        }
    }
    assert!(saw_shield);

    let graph = TransitionGraph::build(&field, cfg.graph.connectivity);
    for u in 0..field.cells().len() {
        for e in graph.edges(u) {
            assert_eq!(graph.edge(e.to, u).map(|b| b.weight), Some(e.weight));
        }
    }
}

#[test]
fn test_precomputed_conductivity_is_used_directly() {
    let cloud = PointCloud::default();
    let cond = precomputed(0.6);
    let line = road();
    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: None,
        conductivity: Some(&cond),
        water: None,
        centerline: &line,
    };
    let result = realign(&inputs, &RealignConfig::default(), None).unwrap();
    assert!(!result.fallback);
    assert!(result.quality >= 0.6 - 1e-9 && result.quality <= 1.0);
}

#[test]
fn test_gap_across_corridor_falls_back_to_reference() {
    let cloud = PointCloud::default();
    let mut cond = precomputed(0.6);
    for r in 0..cond.rows() {
        cond.set(r, 15, None);
    }
    let line = road();
    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: None,
        conductivity: Some(&cond),
        water: None,
        centerline: &line,
    };
    let result = realign(&inputs, &RealignConfig::default(), None).unwrap();
    assert!(result.fallback);
    assert_eq!(result.quality, 0.0);
    assert_eq!(result.geometry, line);
}

#[test]
fn test_water_crossing_stays_driveable() {
    let cloud = PointCloud::default();
    let mut cond = precomputed(0.6);
    // river between x = 28 and x = 32
    for r in 0..cond.rows() {
        cond.set(r, 14, Some(0.0));
        cond.set(r, 15, Some(0.0));
    }
    let river = MultiPolygon(vec![geo_types::Polygon::new(
        LineString::from(vec![(28.0, 0.0), (32.0, 0.0), (32.0, 30.0), (28.0, 30.0), (28.0, 0.0)]),
        vec![],
    )]);
    let line = road();
    let without = PipelineInputs {
        cloud: &cloud,
        ground: None,
        conductivity: Some(&cond),
        water: None,
        centerline: &line,
    };
    let with = PipelineInputs {
        water: Some(&river),
        ..without
    };
    let mut cfg = RealignConfig::default();
    cfg.bridge.conductivity = 0.9;

    // the floor clamp keeps the river passable but slow
    let slow = realign(&without, &cfg, None).unwrap();
    let fast = realign(&with, &cfg, None).unwrap();
    assert!(!slow.fallback && !fast.fallback);
    assert!(fast.cost < slow.cost);
}

#[test]
fn test_surface_inputs_are_checked_first() {
    let cloud = PointCloud::default();
    let line = road();
    let none = PipelineInputs {
        cloud: &cloud,
        ground: None,
        conductivity: None,
        water: None,
        centerline: &line,
    };
    assert_eq!(
        realign(&none, &RealignConfig::default(), None).unwrap_err(),
        RealignError::MissingSurface
    );

    let mut ground = flat_ground();
    ground.transform.srid = Some(2193);
    let mut cond = precomputed(0.5);
    cond.transform.srid = Some(4326);
    let both = PipelineInputs {
        ground: Some(&ground),
        conductivity: Some(&cond),
        ..none
    };
    assert!(matches!(
        realign(&both, &RealignConfig::default(), None),
        Err(RealignError::IncompatibleInputs(_))
    ));

    let coarse = Grid::filled(GeoTransform::new(0.0, 30.0, 5.0), 6, 12, 100.0);
    let coarse_only = PipelineInputs {
        ground: Some(&coarse),
        ..none
    };
    assert_eq!(
        realign(&coarse_only, &RealignConfig::default(), None).unwrap_err(),
        RealignError::ResolutionTooCoarse {
            found: 5.0,
            required: 1.0
        }
    );
}

#[test]
fn test_blocked_row_forces_fallback() {
    let mut field = Grid::filled(GeoTransform::new(0.0, 5.0, 1.0), 5, 5, 1.0);
    for c in 0..5 {
        field.set(2, c, Some(0.0));
    }
    let graph = TransitionGraph::build(&field, Connectivity::Eight);
    let anchors = [Point::from(field.cell_center(0, 2)), Point::from(field.cell_center(4, 2))];
    let reference = LineString::from(vec![(2.5, 4.5), (2.5, 0.5)]);
    let result = solve(&field, &graph, &anchors, None, &reference, &PathConfig::default()).unwrap();
    assert!(result.fallback);
    assert_eq!(result.quality, 0.0);
    assert!(result.cost.is_infinite());
    assert_eq!(result.geometry, reference);
}

#[test]
fn test_uniform_grid_diagonal_cost() {
    let (c, res) = (0.8, 2.0);
    let field = Grid::filled(GeoTransform::new(0.0, 6.0, res), 3, 3, c);
    let anchors = [Point::from(field.cell_center(0, 0)), Point::from(field.cell_center(2, 2))];
    let reference = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
    let cfg = PathConfig {
        simplify_tolerance: 0.0,
    };

    let eight = TransitionGraph::build(&field, Connectivity::Eight);
    let result = solve(&field, &eight, &anchors, None, &reference, &cfg).unwrap();
    let expected = 2.0 * std::f64::consts::SQRT_2 * res / c;
    assert!((result.cost - expected).abs() < 1e-9);
    assert_eq!(result.geometry.0.len(), 3);

    let four = TransitionGraph::build(&field, Connectivity::Four);
    let result = solve(&field, &four, &anchors, None, &reference, &cfg).unwrap();
    assert!((result.cost - 4.0 * res / c).abs() < 1e-9);
}

#[test]
fn test_activation_is_repeatable() {
    let cells = (0..16).map(|i| Some(i as f64 * 0.7 - 2.0)).collect();
    let g = Grid::from_cells(GeoTransform::new(0.0, 4.0, 1.0), 4, 4, cells).unwrap();
    let a = activate(&g, &[0.5, 6.0], ActivationMode::PiecewiseLinear, false).unwrap();
    let b = activate(&g, &[0.5, 6.0], ActivationMode::PiecewiseLinear, false).unwrap();
    let bits = |g: &Grid| -> Vec<Option<u64>> { g.cells().iter().map(|c| c.map(f64::to_bits)).collect() };
    assert_eq!(bits(&a), bits(&b));
}

#[test]
fn test_smoothing_without_iterations_is_stretch() {
    let cells = vec![Some(0.3), Some(0.7), None, Some(0.1), Some(0.9), Some(0.5)];
    let g = Grid::from_cells(GeoTransform::new(0.0, 2.0, 1.0), 2, 3, cells).unwrap();
    let cfg = SmoothingConfig {
        iterations: 0,
        passes: 0,
        ..SmoothingConfig::default()
    };
    assert_eq!(smooth(&g, &cfg), g.stretch(cfg.stretch_quantile));
}

#[test]
fn test_straight_line_masks() {
    let line = LineString::new(vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 100.0, y: 0.0 }]);
    let cfg = MaskConfig {
        buffer_radius: 10.0,
        ..MaskConfig::default()
    };
    let masks = build_masks(&line, &cfg).unwrap();
    let (a0, a1) = (masks.caps[0].unsigned_area(), masks.caps[1].unsigned_area());
    assert!(a0 > 0.0 && (a0 - a1).abs() < 1e-3);
    let overlap = MultiPolygon(masks.shields.to_vec()).intersection(&masks.caps_multi());
    assert!(overlap.unsigned_area() < 1e-3);
}

#[test]
fn test_cap_shorter_than_a_cell_still_routes() {
    let cloud = PointCloud::default();
    let cond = precomputed(1.0);
    let line = LineString::new(vec![Coord { x: 1.5, y: 15.0 }, Coord { x: 50.0, y: 15.0 }]);
    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: None,
        conductivity: Some(&cond),
        water: None,
        centerline: &line,
    };
    let mut cfg = RealignConfig::default();
    cfg.masks.cap_length = 0.4;
    cfg.validate().unwrap();

    let result = realign(&inputs, &cfg, None).unwrap();
    assert!(!result.fallback);
    assert!(result.quality > 0.9);
}

#[test]
fn test_fine_conductivity_is_averaged_to_working_resolution() {
    let cloud = PointCloud::default();
    let fine = Grid::filled(GeoTransform::new(0.0, 30.0, 0.5), 60, 120, 0.6);
    let line = road();
    let inputs = PipelineInputs {
        cloud: &cloud,
        ground: None,
        conductivity: Some(&fine),
        water: None,
        centerline: &line,
    };
    let cfg = RealignConfig::default();
    let surface = conductivity_surface(&inputs, &cfg, None).unwrap();
    assert!((surface.resolution() - 2.0).abs() < 1e-12);
    assert_eq!((surface.rows(), surface.cols()), (15, 30));

    let odd = Grid::filled(GeoTransform::new(0.0, 30.0, 0.75), 40, 80, 0.6);
    let odd_inputs = PipelineInputs {
        conductivity: Some(&odd),
        ..inputs
    };
    assert!(matches!(
        realign(&odd_inputs, &cfg, None),
        Err(RealignError::InvalidConfig(_))
    ));
}
