//! First- and second-order terrain derivatives over the ground model.

use crate::config::EdgeKernel;
use crate::grid::{Grid, Raster};

/// 3×3 window around `(row, col)`, missing or off-grid cells replaced by the centre.
fn window(ground: &Grid, row: usize, col: usize, centre: f64) -> [[f64; 3]; 3] {
    let mut w = [[centre; 3]; 3];
    for (i, dr) in (-1isize..=1).enumerate() {
        for (j, dc) in (-1isize..=1).enumerate() {
            let value = row
                .checked_add_signed(dr)
                .zip(col.checked_add_signed(dc))
                .and_then(|(r, c)| ground.get(r, c));
            if let Some(v) = value {
                w[i][j] = v;
            }
        }
    }
    w
}

/// Slope in degrees using Horn's weighted gradient.
pub fn slope_degrees(ground: &Grid) -> Grid {
    let res = ground.resolution();
    let mut out = Grid::empty(ground.transform, ground.rows(), ground.cols());
    for r in 0..ground.rows() {
        for c in 0..ground.cols() {
            let Some(z) = ground.get(r, c) else {
                continue;
            };
            let w = window(ground, r, c, z);
            let dzdx = ((w[0][2] + 2.0 * w[1][2] + w[2][2]) - (w[0][0] + 2.0 * w[1][0] + w[2][0]))
                / (8.0 * res);
            let dzdy = ((w[2][0] + 2.0 * w[2][1] + w[2][2]) - (w[0][0] + 2.0 * w[0][1] + w[0][2]))
                / (8.0 * res);
            out.set(r, c, Some(dzdx.hypot(dzdy).atan().to_degrees()));
        }
    }
    out
}

/// Absolute residual between the elevation and its 3×3 valid-cell mean.
pub fn roughness(ground: &Grid) -> Grid {
    let mut out = Grid::empty(ground.transform, ground.rows(), ground.cols());
    for r in 0..ground.rows() {
        for c in 0..ground.cols() {
            let Some(z) = ground.get(r, c) else {
                continue;
            };
            let (sum, n) = ground
                .neighbors(r, c, crate::grid::Connectivity::Eight)
                .filter_map(|(rr, cc)| ground.get(rr, cc))
                .fold((z, 1usize), |(s, n), v| (s + v, n + 1));
            out.set(r, c, Some((z - sum / n as f64).abs()));
        }
    }
    out
}

fn kernels(kind: EdgeKernel) -> (&'static [f64], &'static [f64]) {
    match kind {
        EdgeKernel::Sobel3 => (&[1.0, 2.0, 1.0], &[-1.0, 0.0, 1.0]),
        EdgeKernel::Sobel5 => (&[1.0, 4.0, 6.0, 4.0, 1.0], &[-1.0, -2.0, 0.0, 2.0, 1.0]),
    }
}

/// Correlates `values` with `kernel` along rows (`horizontal`) or columns.
/// Off-grid samples are zero.
fn correlate_1d(values: &[f64], rows: usize, cols: usize, kernel: &[f64], horizontal: bool) -> Vec<f64> {
    let half = (kernel.len() / 2) as isize;
    let mut out = vec![0.0; values.len()];
    for r in 0..rows {
        for c in 0..cols {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let offset = k as isize - half;
                let (rr, cc) = if horizontal {
                    (Some(r), c.checked_add_signed(offset))
                } else {
                    (r.checked_add_signed(offset), Some(c))
                };
                if let (Some(rr), Some(cc)) = (rr, cc) {
                    if rr < rows && cc < cols {
                        acc += weight * values[rr * cols + cc];
                    }
                }
            }
            out[r * cols + c] = acc;
        }
    }
    out
}

/// Gradient magnitude of `layer` from separable Sobel kernels.
///
/// Missing cells are read as zero and restored to no-data afterwards. The
/// response is divided by the smoothing kernel's weight.
pub fn edge_strength(layer: &Grid, kind: EdgeKernel) -> Grid {
    let (rows, cols) = (layer.rows(), layer.cols());
    let filled: Vec<f64> = layer.cells().iter().map(|c| c.unwrap_or(0.0)).collect();
    let (smooth, derive) = kernels(kind);
    let norm: f64 = smooth.iter().sum();

    let horizontal = correlate_1d(&correlate_1d(&filled, rows, cols, derive, true), rows, cols, smooth, false);
    let vertical = correlate_1d(&correlate_1d(&filled, rows, cols, smooth, true), rows, cols, derive, false);

    layer.map_cells_indexed(|idx, cell| cell.map(|_| horizontal[idx].hypot(vertical[idx]) / norm))
}
