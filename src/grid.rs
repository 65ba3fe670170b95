use crate::errors::{RealignError, RealignResult};
use geo::{BoundingRect, Contains};
use geo_types::{Coord, MultiPolygon, Point, Rect};
use serde::{Deserialize, Serialize};

/// Affine georeference of a north-up grid.
///
/// `origin_x`/`origin_y` is the top-left corner of cell (0, 0); rows grow
/// southward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_size: f64,
    #[serde(default)]
    pub srid: Option<u32>,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, cell_size: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            cell_size,
            srid: None,
        }
    }

    fn approx_eq(&self, other: &GeoTransform) -> bool {
        let tol = self.cell_size.min(other.cell_size) * 1e-6;
        (self.origin_x - other.origin_x).abs() <= tol
            && (self.origin_y - other.origin_y).abs() <= tol
            && (self.cell_size - other.cell_size).abs() <= tol
            && (self.srid.is_none() || other.srid.is_none() || self.srid == other.srid)
    }
}

/// Neighbourhood used when walking between cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Connectivity {
    Four,
    Eight,
}

const ROOK: [(isize, isize); 4] = [(-1, 0), (0, -1), (0, 1), (1, 0)];
const QUEEN: [(isize, isize); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

impl Connectivity {
    pub fn offsets(self) -> &'static [(isize, isize)] {
        match self {
            Connectivity::Four => &ROOK,
            Connectivity::Eight => &QUEEN,
        }
    }
}

impl TryFrom<u8> for Connectivity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(Connectivity::Four),
            8 => Ok(Connectivity::Eight),
            other => Err(format!("connectivity must be 4 or 8, got {}", other)),
        }
    }
}

impl From<Connectivity> for u8 {
    fn from(value: Connectivity) -> Self {
        match value {
            Connectivity::Four => 4,
            Connectivity::Eight => 8,
        }
    }
}

/// How child cells collapse into a coarser parent cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Mean,
    Min,
    Max,
}

impl Aggregation {
    fn fold(self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        Some(match self {
            Aggregation::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Aggregation::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
            Aggregation::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Read access shared by every raster layer in the pipeline.
pub trait Raster {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn get(&self, row: usize, col: usize) -> Option<f64>;
    fn transform(&self) -> &GeoTransform;

    fn resolution(&self) -> f64 {
        self.transform().cell_size
    }

    fn bounds(&self) -> Rect<f64> {
        let t = self.transform();
        Rect::new(
            Coord {
                x: t.origin_x,
                y: t.origin_y - self.rows() as f64 * t.cell_size,
            },
            Coord {
                x: t.origin_x + self.cols() as f64 * t.cell_size,
                y: t.origin_y,
            },
        )
    }

    fn cell_center(&self, row: usize, col: usize) -> Coord<f64> {
        let t = self.transform();
        Coord {
            x: t.origin_x + (col as f64 + 0.5) * t.cell_size,
            y: t.origin_y - (row as f64 + 0.5) * t.cell_size,
        }
    }

    /// Cell containing a map coordinate, if it falls on the grid.
    fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let t = self.transform();
        let col = ((x - t.origin_x) / t.cell_size).floor();
        let row = ((t.origin_y - y) / t.cell_size).floor();
        if col < 0.0 || row < 0.0 || !col.is_finite() || !row.is_finite() {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.rows() && col < self.cols()).then_some((row, col))
    }

    fn neighbors(
        &self,
        row: usize,
        col: usize,
        connectivity: Connectivity,
    ) -> impl Iterator<Item = (usize, usize)> {
        let (rows, cols) = (self.rows(), self.cols());
        connectivity.offsets().iter().filter_map(move |&(dr, dc)| {
            let r = row.checked_add_signed(dr)?;
            let c = col.checked_add_signed(dc)?;
            (r < rows && c < cols).then_some((r, c))
        })
    }
}

/// Regular 2D grid of optional scalar cells, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGrid")]
pub struct Grid {
    pub transform: GeoTransform,
    rows: usize,
    cols: usize,
    cells: Vec<Option<f64>>,
}

/// Grid as read from disk, before its shape is checked.
#[derive(Deserialize)]
struct RawGrid {
    transform: GeoTransform,
    rows: usize,
    cols: usize,
    cells: Vec<Option<f64>>,
}

impl TryFrom<RawGrid> for Grid {
    type Error = RealignError;

    fn try_from(raw: RawGrid) -> Result<Self, Self::Error> {
        Grid::from_cells(raw.transform, raw.rows, raw.cols, raw.cells)
    }
}

impl Raster for Grid {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.cells[row * self.cols + col]
    }

    fn transform(&self) -> &GeoTransform {
        &self.transform
    }
}

impl Grid {
    /// A grid with every cell set to no-data.
    pub fn empty(transform: GeoTransform, rows: usize, cols: usize) -> Self {
        Self {
            transform,
            rows,
            cols,
            cells: vec![None; rows * cols],
        }
    }

    pub fn filled(transform: GeoTransform, rows: usize, cols: usize, value: f64) -> Self {
        Self {
            transform,
            rows,
            cols,
            cells: vec![Some(value); rows * cols],
        }
    }

    pub fn from_cells(
        transform: GeoTransform,
        rows: usize,
        cols: usize,
        cells: Vec<Option<f64>>,
    ) -> RealignResult<Self> {
        if cells.len() != rows * cols {
            return Err(RealignError::InvalidGeometry(format!(
                "grid of {}x{} needs {} cells, got {}",
                rows,
                cols,
                rows * cols,
                cells.len()
            )));
        }
        if !(transform.cell_size > 0.0 && transform.cell_size.is_finite()) {
            return Err(RealignError::InvalidGeometry(format!(
                "cell size must be positive, got {}",
                transform.cell_size
            )));
        }
        Ok(Self {
            transform,
            rows,
            cols,
            cells,
        })
    }

    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<f64>) {
        let idx = self.index(row, col);
        self.cells[idx] = value;
    }

    pub fn set_index(&mut self, index: usize, value: Option<f64>) {
        self.cells[index] = value;
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().filter_map(|c| *c)
    }

    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Same lattice and extent, so cells line up one to one.
    pub fn same_georeference(&self, other: &Grid) -> bool {
        self.rows == other.rows && self.cols == other.cols && self.transform.approx_eq(&other.transform)
    }

    /// Applies `f` to every valid cell; no-data stays no-data.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Grid {
        Grid {
            transform: self.transform,
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().map(|c| c.map(&f)).collect(),
        }
    }

    pub fn map_cells_indexed(&self, f: impl Fn(usize, Option<f64>) -> Option<f64>) -> Grid {
        Grid {
            transform: self.transform,
            rows: self.rows,
            cols: self.cols,
            cells: self.cells.iter().enumerate().map(|(i, c)| f(i, *c)).collect(),
        }
    }

    /// Cell-wise combination; no-data on either side yields no-data.
    pub fn zip_with(&self, other: &Grid, f: impl Fn(f64, f64) -> f64) -> RealignResult<Grid> {
        if !self.same_georeference(other) {
            return Err(RealignError::IncompatibleInputs(
                "grids are not aligned".to_string(),
            ));
        }
        Ok(Grid {
            transform: self.transform,
            rows: self.rows,
            cols: self.cols,
            cells: self
                .cells
                .iter()
                .zip(other.cells.iter())
                .map(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) => Some(f(*a, *b)),
                    _ => None,
                })
                .collect(),
        })
    }

    /// Collapses `factor`×`factor` blocks into one coarser cell.
    ///
    /// Missing children are ignored; a parent is no-data only when all of its
    /// children are. Partial blocks on the far edges are kept.
    pub fn aggregate(&self, factor: usize, how: Aggregation) -> Grid {
        if factor <= 1 {
            return self.clone();
        }
        let rows = self.rows.div_ceil(factor);
        let cols = self.cols.div_ceil(factor);
        let transform = GeoTransform {
            cell_size: self.transform.cell_size * factor as f64,
            ..self.transform
        };
        let mut out = Grid::empty(transform, rows, cols);
        let mut block = Vec::with_capacity(factor * factor);
        for r in 0..rows {
            for c in 0..cols {
                block.clear();
                for rr in r * factor..((r + 1) * factor).min(self.rows) {
                    for cc in c * factor..((c + 1) * factor).min(self.cols) {
                        if let Some(v) = self.get(rr, cc) {
                            block.push(v);
                        }
                    }
                }
                out.set(r, c, how.fold(&block));
            }
        }
        out
    }

    /// Quantile of the valid cells, linearly interpolated.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        let mut values: Vec<f64> = self.valid_values().filter(|v| v.is_finite()).collect();
        quantile(&mut values, q)
    }

    /// Caps every valid cell at the `q` quantile of the grid.
    pub fn cap_at_quantile(&self, q: f64) -> Grid {
        match self.quantile(q) {
            Some(cap) => self.map(|v| v.min(cap)),
            None => self.clone(),
        }
    }

    /// Linear rescale to [0, 1] between the minimum and the `hi_q` quantile.
    ///
    /// Values above the quantile saturate at 1. A flat grid has nothing to
    /// stretch and is only clamped into [0, 1].
    pub fn stretch(&self, hi_q: f64) -> Grid {
        let min = self
            .valid_values()
            .filter(|v| v.is_finite())
            .fold(f64::INFINITY, f64::min);
        let hi = match self.quantile(hi_q) {
            Some(hi) => hi,
            None => return self.clone(),
        };
        let span = hi - min;
        if !(span > f64::EPSILON) {
            return self.map(|v| v.clamp(0.0, 1.0));
        }
        self.map(|v| ((v - min) / span).clamp(0.0, 1.0))
    }

    /// Copies this grid onto a new extent covering `area` on the same lattice.
    ///
    /// Cells beyond the source extent are no-data, so the window both crops
    /// and extends.
    pub fn window(&self, area: Rect<f64>, pad_cells: usize) -> Grid {
        let t = self.transform;
        let size = t.cell_size;
        let col_min = ((area.min().x - t.origin_x) / size).floor() as i64 - pad_cells as i64;
        let col_max = ((area.max().x - t.origin_x) / size).ceil() as i64 + pad_cells as i64;
        let row_min = ((t.origin_y - area.max().y) / size).floor() as i64 - pad_cells as i64;
        let row_max = ((t.origin_y - area.min().y) / size).ceil() as i64 + pad_cells as i64;

        let rows = (row_max - row_min).max(0) as usize;
        let cols = (col_max - col_min).max(0) as usize;
        let transform = GeoTransform {
            origin_x: t.origin_x + col_min as f64 * size,
            origin_y: t.origin_y - row_min as f64 * size,
            ..t
        };
        let mut out = Grid::empty(transform, rows, cols);
        for r in 0..rows {
            let src_r = r as i64 + row_min;
            if src_r < 0 || src_r >= self.rows as i64 {
                continue;
            }
            for c in 0..cols {
                let src_c = c as i64 + col_min;
                if src_c < 0 || src_c >= self.cols as i64 {
                    continue;
                }
                out.set(r, c, self.get(src_r as usize, src_c as usize));
            }
        }
        out
    }

    /// Indices of cells whose centre lies strictly inside `area`.
    pub fn cells_within(&self, area: &MultiPolygon<f64>) -> Vec<usize> {
        let Some(bbox) = area.bounding_rect() else {
            return Vec::new();
        };
        let clipped = self.window_indices(bbox);
        clipped
            .into_iter()
            .filter(|&idx| {
                let (r, c) = self.position(idx);
                area.contains(&Point::from(self.cell_center(r, c)))
            })
            .collect()
    }

    fn window_indices(&self, bbox: Rect<f64>) -> Vec<usize> {
        let t = self.transform;
        let clamp_col = |x: f64| ((x - t.origin_x) / t.cell_size).floor().clamp(0.0, self.cols as f64) as usize;
        let clamp_row = |y: f64| ((t.origin_y - y) / t.cell_size).floor().clamp(0.0, self.rows as f64) as usize;
        let (c0, c1) = (clamp_col(bbox.min().x), (clamp_col(bbox.max().x) + 1).min(self.cols));
        let (r0, r1) = (clamp_row(bbox.max().y), (clamp_row(bbox.min().y) + 1).min(self.rows));
        let mut out = Vec::new();
        for r in r0..r1 {
            for c in c0..c1 {
                out.push(self.index(r, c));
            }
        }
        out
    }
}

/// Whole number of `fine` cells spanning one `coarse` cell, if there is one.
pub fn block_factor(fine: f64, coarse: f64) -> Option<usize> {
    let ratio = coarse / fine;
    let whole = ratio.round();
    (whole >= 1.0 && (ratio - whole).abs() <= 1e-6 * whole).then_some(whole as usize)
}

/// Element-wise reduction over aligned grids, skipping no-data.
pub fn reduce(grids: &[Grid], how: Aggregation) -> RealignResult<Grid> {
    let first = grids.first().ok_or(RealignError::EmptyGrid)?;
    if let Some(bad) = grids.iter().find(|g| !g.same_georeference(first)) {
        return Err(RealignError::IncompatibleInputs(format!(
            "cannot reduce {}x{} grid with {}x{} grid",
            first.rows, first.cols, bad.rows, bad.cols
        )));
    }
    let mut out = Grid::empty(first.transform, first.rows, first.cols);
    let mut values = Vec::with_capacity(grids.len());
    for idx in 0..first.cells.len() {
        values.clear();
        values.extend(grids.iter().filter_map(|g| g.cells[idx]));
        out.cells[idx] = how.fold(&values);
    }
    Ok(out)
}

/// Linearly interpolated quantile; sorts `values` in place.
pub fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let q = q.clamp(0.0, 1.0);
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(values[lo] + (values[hi] - values[lo]) * frac)
}
