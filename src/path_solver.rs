//! Least-cost path between the two anchors, with the reference line as fallback.

use crate::config::PathConfig;
use crate::errors::{RealignError, RealignResult};
use crate::geometry::{longest_part, polyline_length};
use crate::grid::Raster;
use crate::transition::TransitionGraph;
use geo::{BooleanOps, Simplify};
use geo_types::{LineString, MultiLineString, MultiPolygon, Point};
use log::{debug, info, warn};
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq)]
pub struct PathResult {
    pub geometry: LineString<f64>,
    /// Extracted path length over accumulated cost; 0 on fallback
    pub quality: f64,
    /// Accumulated cost between the anchors; infinite on fallback
    pub cost: f64,
    pub fallback: bool,
}

impl PathResult {
    /// The reference line handed back unchanged.
    pub fn fallback(reference: &LineString<f64>) -> Self {
        Self {
            geometry: reference.clone(),
            quality: 0.0,
            cost: f64::INFINITY,
            fallback: true,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq)]
struct State {
    cost: OrderedFloat<f64>,
    node: usize,
}

// Flipped so BinaryHeap pops the cheapest state first.
impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| self.node.cmp(&other.node))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Dijkstra over the transition graph. Returns the accumulated cost and the
/// node sequence from `from` to `to`, or `None` when `to` is unreachable.
pub fn shortest_path(graph: &TransitionGraph, from: usize, to: usize) -> Option<(f64, Vec<usize>)> {
    if !graph.is_node(from) || !graph.is_node(to) {
        return None;
    }
    let n = graph.rows() * graph.cols();
    let mut dist = vec![f64::INFINITY; n];
    let mut prev: Vec<Option<usize>> = vec![None; n];
    let mut heap = BinaryHeap::new();

    dist[from] = 0.0;
    heap.push(State {
        cost: OrderedFloat(0.0),
        node: from,
    });

    while let Some(State { cost, node: u }) = heap.pop() {
        if u == to {
            break;
        }
        if cost.0 > dist[u] {
            continue;
        }
        for edge in graph.edges(u) {
            let next = cost.0 + edge.cost();
            if next < dist[edge.to] {
                dist[edge.to] = next;
                prev[edge.to] = Some(u);
                heap.push(State {
                    cost: OrderedFloat(next),
                    node: edge.to,
                });
            }
        }
    }

    if !dist[to].is_finite() {
        return None;
    }
    let mut nodes = vec![to];
    let mut current = to;
    while let Some(p) = prev[current] {
        nodes.push(p);
        current = p;
    }
    nodes.reverse();
    Some((dist[to], nodes))
}

fn anchor_node<R: Raster>(field: &R, graph: &TransitionGraph, anchor: &Point<f64>) -> RealignResult<usize> {
    let (r, c) = field
        .cell_of(anchor.x(), anchor.y())
        .ok_or(RealignError::AnchorOutsideGrid {
            x: anchor.x(),
            y: anchor.y(),
        })?;
    Ok(graph.node_at(r, c))
}

/// Solves the anchor-to-anchor path over `graph`, which must have been built
/// from `field`.
///
/// When the anchors are disconnected, or either sits on a no-data cell, the
/// result is the reference line with zero quality. Otherwise the cell-centre
/// path is simplified and the caps are cut away, leaving the longest part.
pub fn solve<R: Raster>(
    field: &R,
    graph: &TransitionGraph,
    anchors: &[Point<f64>; 2],
    caps: Option<&MultiPolygon<f64>>,
    reference: &LineString<f64>,
    cfg: &PathConfig,
) -> RealignResult<PathResult> {
    let from = anchor_node(field, graph, &anchors[0])?;
    let to = anchor_node(field, graph, &anchors[1])?;

    if !graph.is_node(from) || !graph.is_node(to) {
        warn!("Anchor falls on a no-data cell, falling back to the reference line");
        return Ok(PathResult::fallback(reference));
    }
    if from == to {
        warn!("Both anchors share one cell, falling back to the reference line");
        return Ok(PathResult::fallback(reference));
    }

    let Some((cost, nodes)) = shortest_path(graph, from, to) else {
        info!("Anchors are disconnected, falling back to the reference line");
        return Ok(PathResult::fallback(reference));
    };

    let raw: LineString<f64> = nodes
        .iter()
        .map(|&n| {
            let (r, c) = graph.position(n);
            field.cell_center(r, c)
        })
        .collect();
    let length = polyline_length(&raw);
    let quality = length / cost;

    let simplified = if cfg.simplify_tolerance > 0.0 {
        raw.simplify(&cfg.simplify_tolerance)
    } else {
        raw
    };
    let geometry = match caps {
        Some(caps) => {
            let outside = caps.clip(&MultiLineString(vec![simplified.clone()]), true);
            if outside.0.len() > 1 {
                debug!("Cap clipping left {} parts, keeping the longest", outside.0.len());
            }
            longest_part(outside).unwrap_or(simplified)
        }
        None => simplified,
    };

    debug!(
        "Path over {} cells, length {:.2}, cost {:.2}, quality {:.3}",
        nodes.len(),
        length,
        cost,
        quality
    );
    Ok(PathResult {
        geometry,
        quality,
        cost,
        fallback: false,
    })
}
