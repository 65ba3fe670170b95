use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};

/// ASPRS classification codes the pipeline cares about.
pub mod classification {
    pub const GROUND: u8 = 2;
    pub const WATER: u8 = 9;
}

/// A single airborne laser return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LidarPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Raw return intensity; `None` when the sensor did not record it
    pub intensity: Option<u16>,
    pub classification: u8,
    /// Scan angle in degrees from nadir
    pub scan_angle: f32,
    /// Acquisition pass (flight line) identifier
    pub pass_id: u16,
}

/// Immutable collection of returns covering one road segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointCloud {
    points: Vec<LidarPoint>,
}

impl PointCloud {
    pub fn new(points: Vec<LidarPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[LidarPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_intensity(&self) -> bool {
        self.points.iter().any(|p| p.intensity.is_some())
    }

    /// Whether any return carries a ground or water class.
    pub fn is_classified(&self) -> bool {
        self.points.iter().any(|p| {
            p.classification == classification::GROUND || p.classification == classification::WATER
        })
    }

    /// Distinct pass ids, sorted ascending.
    pub fn pass_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.points.iter().map(|p| p.pass_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// Returns grouped by acquisition pass, ordered by pass id.
    pub fn by_pass(&self) -> Vec<(u16, Vec<&LidarPoint>)> {
        let mut groups: HashMap<u16, Vec<&LidarPoint>> = HashMap::new();
        for p in &self.points {
            groups.entry(p.pass_id).or_default().push(p);
        }
        let mut groups: Vec<_> = groups.into_iter().collect();
        groups.sort_by_key(|(id, _)| *id);
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(pass_id: u16, intensity: Option<u16>) -> LidarPoint {
        LidarPoint {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            intensity,
            classification: 1,
            scan_angle: 0.0,
            pass_id,
        }
    }

    #[test]
    fn test_pass_grouping_is_ordered() {
        let cloud = PointCloud::new(vec![pt(7, None), pt(3, None), pt(7, None)]);
        assert_eq!(cloud.pass_ids(), vec![3, 7]);
        let groups = cloud.by_pass();
        assert_eq!(groups[0].0, 3);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn test_intensity_presence() {
        assert!(!PointCloud::new(vec![pt(1, None)]).has_intensity());
        assert!(PointCloud::new(vec![pt(1, None), pt(1, Some(40))]).has_intensity());
    }
}
