use anyhow::{Context, Result, anyhow};
use centerline::config::RealignConfig;
use centerline::grid::Grid;
use centerline::path_solver::PathResult;
use centerline::point_cloud::{LidarPoint, PointCloud};
use geo_types::{Geometry, LineString, MultiPolygon};
use geojson::{Feature, GeoJson, JsonObject};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// Reads `x,y,z,intensity,classification,scan_angle,pass_id` rows.
pub fn read_points(path: &Path) -> Result<PointCloud> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening point file {}", path.display()))?;
    let mut points = Vec::new();
    for (line, record) in rdr.deserialize::<LidarPoint>().enumerate() {
        let point = record.with_context(|| format!("parsing point record {}", line + 1))?;
        points.push(point);
    }
    Ok(PointCloud::new(points))
}

pub fn read_grid(path: &Path) -> Result<Grid> {
    let file = File::open(path).with_context(|| format!("opening grid {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing grid {}", path.display()))
}

pub fn read_config(path: Option<&Path>) -> Result<RealignConfig> {
    let Some(path) = path else {
        return Ok(RealignConfig::default());
    };
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing config {}", path.display()))
}

fn read_geometries(path: &Path) -> Result<Vec<Geometry<f64>>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let geojson: GeoJson = raw
        .parse()
        .with_context(|| format!("parsing GeoJSON {}", path.display()))?;
    let collection = geojson::quick_collection::<f64>(&geojson)
        .with_context(|| format!("converting geometries in {}", path.display()))?;
    Ok(collection.0)
}

/// First line geometry in the file.
pub fn read_centerline(path: &Path) -> Result<LineString<f64>> {
    read_geometries(path)?
        .into_iter()
        .find_map(|g| match g {
            Geometry::LineString(line) => Some(line),
            Geometry::MultiLineString(lines) => lines.0.into_iter().next(),
            _ => None,
        })
        .ok_or_else(|| anyhow!("no LineString in {}", path.display()))
}

/// Every polygon in the file, merged into one multipolygon.
pub fn read_water(path: &Path) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    for geometry in read_geometries(path)? {
        match geometry {
            Geometry::Polygon(p) => polygons.push(p),
            Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            _ => {}
        }
    }
    Ok(MultiPolygon(polygons))
}

pub fn result_feature(result: &PathResult) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("quality".to_string(), result.quality.into());
    // JSON has no infinity
    let cost = if result.cost.is_finite() {
        result.cost.into()
    } else {
        serde_json::Value::Null
    };
    properties.insert("cost".to_string(), cost);
    properties.insert("fallback".to_string(), result.fallback.into());

    Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::from(&result.geometry)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

pub fn write_feature(feature: Feature, output: Option<&Path>) -> Result<()> {
    let geojson = GeoJson::Feature(feature);
    match output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            serde_json::to_writer(file, &geojson)?;
        }
        None => println!("{}", geojson),
    }
    Ok(())
}

pub fn dump_layers(dir: &Path, layers: Vec<(String, Grid)>) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for (name, grid) in layers {
        let path = dir.join(format!("{}.json", name));
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer(file, &grid)?;
    }
    Ok(())
}
