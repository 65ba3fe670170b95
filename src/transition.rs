//! Weighted cell adjacency built from a finalised conductivity field.

use crate::grid::{Connectivity, GeoTransform, Raster};
use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub to: usize,
    /// Mean conductance of the two endpoint cells
    pub weight: f64,
    /// `weight` divided by the distance between the cell centres
    pub conductance: f64,
}

impl Edge {
    /// Cost of traversing this edge: distance over mean conductance.
    pub fn cost(&self) -> f64 {
        1.0 / self.conductance
    }
}

/// Undirected graph over the non-missing cells of a raster.
///
/// Node ids are row-major cell indices. Cells with conductivity 0 are nodes
/// without edges, so nothing can route through them.
#[derive(Debug, Clone)]
pub struct TransitionGraph {
    pub transform: GeoTransform,
    rows: usize,
    cols: usize,
    present: Vec<bool>,
    adjacency: Vec<Vec<Edge>>,
}

impl TransitionGraph {
    pub fn build<R: Raster>(raster: &R, connectivity: Connectivity) -> Self {
        let (rows, cols) = (raster.rows(), raster.cols());
        let size = raster.resolution();
        let mut present = vec![false; rows * cols];
        let mut adjacency: Vec<Vec<Edge>> = vec![Vec::new(); rows * cols];
        let mut anomalies = 0usize;

        for r in 0..rows {
            for c in 0..cols {
                let Some(a) = raster.get(r, c) else { continue };
                let u = r * cols + c;
                present[u] = true;
                if a == 0.0 {
                    continue;
                }
                for (nr, nc) in raster.neighbors(r, c, connectivity) {
                    let v = nr * cols + nc;
                    // each pair once, from its lower id
                    if v < u {
                        continue;
                    }
                    let Some(b) = raster.get(nr, nc) else { continue };
                    if b == 0.0 {
                        continue;
                    }
                    let mut weight = (a + b) / 2.0;
                    if weight < 0.0 {
                        anomalies += 1;
                        weight = 0.0;
                    }
                    if weight <= 0.0 || !weight.is_finite() {
                        continue;
                    }
                    let distance = if nr != r && nc != c {
                        size * std::f64::consts::SQRT_2
                    } else {
                        size
                    };
                    let conductance = weight / distance;
                    adjacency[u].push(Edge { to: v, weight, conductance });
                    adjacency[v].push(Edge { to: u, weight, conductance });
                }
            }
        }

        if anomalies > 0 {
            warn!("{} edges had a negative mean conductance, clipped to zero", anomalies);
        }
        let graph = Self {
            transform: *raster.transform(),
            rows,
            cols,
            present,
            adjacency,
        };
        debug!(
            "Transition graph: {} nodes, {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        graph
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn node_count(&self) -> usize {
        self.present.iter().filter(|p| **p).count()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum::<usize>() / 2
    }

    pub fn is_node(&self, node: usize) -> bool {
        self.present.get(node).copied().unwrap_or(false)
    }

    pub fn node_at(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn position(&self, node: usize) -> (usize, usize) {
        (node / self.cols, node % self.cols)
    }

    pub fn edges(&self, node: usize) -> &[Edge] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge(&self, from: usize, to: usize) -> Option<&Edge> {
        self.edges(from).iter().find(|e| e.to == to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn grid(rows: usize, cols: usize, cells: Vec<Option<f64>>) -> Grid {
        Grid::from_cells(GeoTransform::new(0.0, rows as f64 * 2.0, 2.0), rows, cols, cells).unwrap()
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        let cells = vec![
            Some(0.1), Some(0.9), None,
            Some(0.4), Some(0.0), Some(0.7),
            Some(1.0), Some(0.3), Some(0.5),
        ];
        let g = TransitionGraph::build(&grid(3, 3, cells), Connectivity::Eight);
        for u in 0..9 {
            for e in g.edges(u) {
                let back = g.edge(e.to, u).expect("missing reverse edge");
                assert_eq!(back.weight, e.weight);
                assert_eq!(back.conductance, e.conductance);
            }
        }
        assert_eq!(g.node_count(), 8);
    }

    #[test]
    fn test_diagonal_cost_is_geometric() {
        let g = TransitionGraph::build(&grid(2, 2, vec![Some(0.5); 4]), Connectivity::Eight);
        let straight = g.edge(0, 1).unwrap();
        let diagonal = g.edge(0, 3).unwrap();
        assert!((straight.cost() - 2.0 / 0.5).abs() < 1e-12);
        assert!((diagonal.cost() - 2.0 * std::f64::consts::SQRT_2 / 0.5).abs() < 1e-12);

        let four = TransitionGraph::build(&grid(2, 2, vec![Some(0.5); 4]), Connectivity::Four);
        assert!(four.edge(0, 3).is_none());
    }

    #[test]
    fn test_zero_cells_are_isolated() {
        let cells = vec![Some(1.0), Some(0.0), Some(1.0)];
        let g = TransitionGraph::build(&grid(1, 3, cells), Connectivity::Eight);
        assert!(g.is_node(1));
        assert!(g.edges(1).is_empty());
        assert!(g.edges(0).is_empty());
    }

    #[test]
    fn test_negative_mean_is_clipped() {
        let cells = vec![Some(-0.8), Some(0.2)];
        let g = TransitionGraph::build(&grid(1, 2, cells), Connectivity::Four);
        assert_eq!(g.edge_count(), 0);
    }
}
