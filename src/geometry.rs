use geo::{Area, BooleanOps};
use geo_types::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};

/// Vertices per full circle when approximating round buffer joins.
const DISC_SEGMENTS: usize = 64;

fn dist(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Euclidean length of a polyline in map units.
pub fn polyline_length(line: &LineString<f64>) -> f64 {
    line.0.windows(2).map(|w| dist(w[0], w[1])).sum()
}

/// Drops consecutive repeated vertices.
pub fn dedup_vertices(line: &LineString<f64>) -> LineString<f64> {
    let mut coords = line.0.clone();
    coords.dedup_by(|a, b| dist(*a, *b) < 1e-9);
    LineString::new(coords)
}

/// Point `distance` units along the polyline, clamped to its ends.
pub fn interpolate_at_distance(line: &LineString<f64>, distance: f64) -> Option<Coord<f64>> {
    let first = *line.0.first()?;
    if distance <= 0.0 {
        return Some(first);
    }
    let mut travelled = 0.0;
    for w in line.0.windows(2) {
        let seg = dist(w[0], w[1]);
        if seg > 0.0 && travelled + seg >= distance {
            let t = (distance - travelled) / seg;
            return Some(Coord {
                x: w[0].x + (w[1].x - w[0].x) * t,
                y: w[0].y + (w[1].y - w[0].y) * t,
            });
        }
        travelled += seg;
    }
    line.0.last().copied()
}

/// Flat-ended rectangle of half-width `half_width` around segment `a`→`b`.
pub fn segment_rectangle(a: Coord<f64>, b: Coord<f64>, half_width: f64) -> Option<Polygon<f64>> {
    let len = dist(a, b);
    if len <= 0.0 {
        return None;
    }
    let nx = -(b.y - a.y) / len * half_width;
    let ny = (b.x - a.x) / len * half_width;
    Some(Polygon::new(
        LineString::new(vec![
            Coord { x: a.x + nx, y: a.y + ny },
            Coord { x: a.x - nx, y: a.y - ny },
            Coord { x: b.x - nx, y: b.y - ny },
            Coord { x: b.x + nx, y: b.y + ny },
            Coord { x: a.x + nx, y: a.y + ny },
        ]),
        vec![],
    ))
}

pub fn disc(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let mut ring: Vec<Coord<f64>> = (0..DISC_SEGMENTS)
        .map(|i| {
            let a = i as f64 / DISC_SEGMENTS as f64 * std::f64::consts::TAU;
            Coord {
                x: center.x + radius * a.cos(),
                y: center.y + radius * a.sin(),
            }
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::new(ring), vec![])
}

/// Round-capped, round-joined buffer of a polyline.
pub fn buffer_line(line: &LineString<f64>, radius: f64) -> MultiPolygon<f64> {
    let line = dedup_vertices(line);
    let mut pieces: Vec<Polygon<f64>> = line.0.iter().map(|c| disc(*c, radius)).collect();
    pieces.extend(
        line.0
            .windows(2)
            .filter_map(|w| segment_rectangle(w[0], w[1], radius)),
    );
    union_all(pieces)
}

pub fn union_all(pieces: Vec<Polygon<f64>>) -> MultiPolygon<f64> {
    let mut iter = pieces.into_iter();
    let Some(first) = iter.next() else {
        return MultiPolygon(vec![]);
    };
    iter.fold(MultiPolygon(vec![first]), |acc, piece| {
        acc.union(&MultiPolygon(vec![piece]))
    })
}

/// Largest-area polygon of a possibly multi-part result.
pub fn largest_part(parts: MultiPolygon<f64>) -> Option<Polygon<f64>> {
    parts
        .0
        .into_iter()
        .filter(|p| p.unsigned_area() > 0.0)
        .max_by(|a, b| a.unsigned_area().total_cmp(&b.unsigned_area()))
}

/// Longest component of a multi-part line.
pub fn longest_part(parts: MultiLineString<f64>) -> Option<LineString<f64>> {
    parts
        .0
        .into_iter()
        .filter(|l| l.0.len() >= 2)
        .max_by(|a, b| polyline_length(a).total_cmp(&polyline_length(b)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        coords.iter().map(|&(x, y)| Coord { x, y }).collect()
    }

    #[test]
    fn test_length_and_interpolation() {
        let l = line(&[(0.0, 0.0), (3.0, 4.0), (3.0, 10.0)]);
        assert!((polyline_length(&l) - 11.0).abs() < 1e-12);
        let p = interpolate_at_distance(&l, 8.0).unwrap();
        assert!((p.x - 3.0).abs() < 1e-12 && (p.y - 7.0).abs() < 1e-12);
        assert_eq!(interpolate_at_distance(&l, 50.0), Some(Coord { x: 3.0, y: 10.0 }));
    }

    #[test]
    fn test_segment_rectangle_area() {
        let r = segment_rectangle(Coord { x: 0.0, y: 0.0 }, Coord { x: 10.0, y: 0.0 }, 2.0).unwrap();
        assert!((r.unsigned_area() - 40.0).abs() < 1e-9);
        assert!(segment_rectangle(Coord { x: 1.0, y: 1.0 }, Coord { x: 1.0, y: 1.0 }, 2.0).is_none());
    }

    #[test]
    fn test_buffer_line_area_close_to_stadium() {
        let l = line(&[(0.0, 0.0), (100.0, 0.0)]);
        let area = buffer_line(&l, 10.0).unsigned_area();
        let stadium = 100.0 * 20.0 + std::f64::consts::PI * 100.0;
        assert!((area - stadium).abs() / stadium < 0.01);
    }

    #[test]
    fn test_largest_part_wins() {
        let small = segment_rectangle(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 0.0 }, 1.0).unwrap();
        let big = segment_rectangle(Coord { x: 5.0, y: 0.0 }, Coord { x: 9.0, y: 0.0 }, 1.0).unwrap();
        let picked = largest_part(MultiPolygon(vec![small, big.clone()])).unwrap();
        assert!((picked.unsigned_area() - big.unsigned_area()).abs() < 1e-12);
    }
}
