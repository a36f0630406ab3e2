//! Connected-component extraction.
//!
//! Two entry points share one output model:
//!
//! - [`extract_from_grid`] labels pixels at or above `pixel_threshold`
//!   joined by plain grid adjacency, with no precomputed graph.
//! - [`extract_from_watershed`] follows a session's graph edges at or above
//!   `edge_threshold`, never across a merge the cap refused; only pixels
//!   at or above `pixel_threshold` are admitted, while lower pixels may
//!   still act as bridges.
//!
//! Both list pixels ascending and clusters by their smallest pixel index,
//! so the two are directly comparable. With `edge_threshold ==
//! pixel_threshold` and no merge cap they produce the same pixel sets.

use std::cmp::Ordering;
use std::collections::VecDeque;

use log::debug;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::ellipse::Ellipse;
use crate::graph_view::GraphView;
use crate::grid::PixelGrid;
use crate::types::{Dimensions, SegmentError};
use crate::watershed::{Edge, Watershed};

/// Slot marker for "no cluster".
const NONE: usize = usize::MAX;

/// One connected component: ascending pixel indices plus the edges that
/// join them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pixels: Vec<usize>,
    edges: Vec<Edge>,
    dims: Dimensions,
}

impl Cluster {
    pub(crate) const fn new(pixels: Vec<usize>, edges: Vec<Edge>, dims: Dimensions) -> Self {
        Self {
            pixels,
            edges,
            dims,
        }
    }

    /// Number of pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Returns `true` if the cluster has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Pixel indices, ascending.
    #[must_use]
    pub fn pixels(&self) -> &[usize] {
        &self.pixels
    }

    /// Returns `true` if `index` belongs to this cluster.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.pixels.binary_search(&index).is_ok()
    }

    /// Edges between member pixels.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Endpoint pairs `[low, high]`, one per edge.
    #[must_use]
    pub fn edge_indices(&self) -> Vec<[usize; 2]> {
        self.edges.iter().map(Edge::indices).collect()
    }

    /// Edge values, aligned with [`edge_indices`](Self::edge_indices).
    #[must_use]
    pub fn edge_values(&self) -> Vec<f64> {
        self.edges.iter().map(|e| e.value).collect()
    }

    /// Dimensions of the grid this cluster came from.
    #[must_use]
    pub const fn dims(&self) -> Dimensions {
        self.dims
    }

    /// The cluster graph in grid coordinates.
    #[must_use]
    pub fn graph_view(&self) -> GraphView {
        GraphView::from_edges(&self.edges, self.dims)
    }

    /// Ellipse fitted to the member pixels.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::EmptyResult`] for an empty cluster.
    pub fn ellipse(&self) -> Result<Ellipse, SegmentError> {
        Ellipse::fit(&self.pixels, self.dims)
    }
}

/// Larger clusters first. Pass to `sort_by` for a size ranking.
#[must_use]
pub fn by_size_descending(a: &Cluster, b: &Cluster) -> Ordering {
    b.len().cmp(&a.len())
}

/// Clusters in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clusters {
    clusters: Vec<Cluster>,
    dims: Dimensions,
}

impl Clusters {
    pub(crate) const fn new(clusters: Vec<Cluster>, dims: Dimensions) -> Self {
        Self { clusters, dims }
    }

    /// Number of clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    /// Returns `true` if there are no clusters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Cluster at `index`; negative values count from the end.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::IndexOutOfRange`] if `index` is outside
    /// `[-len, len)`.
    pub fn get(&self, index: isize) -> Result<&Cluster, SegmentError> {
        let len = self.clusters.len();
        let resolved = if index < 0 {
            len.checked_sub(index.unsigned_abs())
        } else {
            Some(index.unsigned_abs())
        };
        resolved
            .and_then(|i| self.clusters.get(i))
            .ok_or(SegmentError::IndexOutOfRange { index, len })
    }

    /// Iterate in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cluster> {
        self.clusters.iter()
    }

    /// Clusters as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Take ownership of the clusters, e.g. to sort them with
    /// [`by_size_descending`].
    #[must_use]
    pub fn into_vec(self) -> Vec<Cluster> {
        self.clusters
    }

    /// Pixel count of every cluster.
    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        self.clusters.iter().map(Cluster::len).collect()
    }

    /// Grid dimensions.
    #[must_use]
    pub const fn dims(&self) -> Dimensions {
        self.dims
    }

    /// Ellipse of every cluster, in cluster order.
    ///
    /// # Errors
    ///
    /// Propagates [`Cluster::ellipse`] failures.
    pub fn ellipses(&self) -> Result<Vec<Ellipse>, SegmentError> {
        self.clusters.iter().map(Cluster::ellipse).collect()
    }
}

impl<'a> IntoIterator for &'a Clusters {
    type Item = &'a Cluster;
    type IntoIter = std::slice::Iter<'a, Cluster>;

    fn into_iter(self) -> Self::IntoIter {
        self.clusters.iter()
    }
}

impl IntoIterator for Clusters {
    type Item = Cluster;
    type IntoIter = std::vec::IntoIter<Cluster>;

    fn into_iter(self) -> Self::IntoIter {
        self.clusters.into_iter()
    }
}

fn check_threshold(name: &str, value: f64) -> Result<(), SegmentError> {
    if value.is_nan() {
        return Err(SegmentError::InvalidConfig(format!("{name} must not be NaN")));
    }
    Ok(())
}

/// Group pixels by slot and attach edges, dropping groups below
/// `size_threshold`.
fn package(
    slot_count: usize,
    slot_of: &[usize],
    edges: Vec<Edge>,
    size_threshold: usize,
    dims: Dimensions,
) -> Clusters {
    let mut pixels: Vec<Vec<usize>> = vec![Vec::new(); slot_count];
    let mut grouped: Vec<Vec<Edge>> = vec![Vec::new(); slot_count];
    for (index, &slot) in slot_of.iter().enumerate() {
        if slot != NONE {
            pixels[slot].push(index);
        }
    }
    for edge in edges {
        let slot = slot_of[edge.low];
        if slot != NONE && slot == slot_of[edge.high] {
            grouped[slot].push(edge);
        }
    }

    let clusters = pixels
        .into_iter()
        .zip(grouped)
        .filter(|(pixels, _)| !pixels.is_empty() && pixels.len() >= size_threshold)
        .map(|(pixels, edges)| Cluster::new(pixels, edges, dims))
        .collect();
    Clusters::new(clusters, dims)
}

/// Clusters of pixels `>= pixel_threshold` joined by grid adjacency.
///
/// Every adjacent pair of qualifying pixels becomes an edge whose `low`
/// endpoint is the lower-valued pixel and whose value is the smaller of
/// the two values.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidConfig`] if `pixel_threshold` is NaN.
pub fn extract_from_grid(
    grid: &PixelGrid,
    pixel_threshold: f64,
    size_threshold: usize,
) -> Result<Clusters, SegmentError> {
    check_threshold("pixel_threshold", pixel_threshold)?;

    let n = grid.len();
    let admitted = |i: usize| grid.value(i) >= pixel_threshold;
    let mut uf = UnionFind::<usize>::new(n);
    let mut edges = Vec::new();

    for index in (0..n).filter(|&i| admitted(i)) {
        for neighbor in grid.forward_neighbors(index).filter(|&j| admitted(j)) {
            uf.union(index, neighbor);
            let (low, high) = if grid.value(neighbor) < grid.value(index) {
                (neighbor, index)
            } else {
                (index, neighbor)
            };
            edges.push(Edge {
                low,
                high,
                value: grid.value(low),
            });
        }
    }

    let labels = uf.into_labeling();
    let mut slot_of_label = vec![NONE; n];
    let mut slot_of = vec![NONE; n];
    let mut slot_count = 0;
    for index in (0..n).filter(|&i| admitted(i)) {
        let label = labels[index];
        if slot_of_label[label] == NONE {
            slot_of_label[label] = slot_count;
            slot_count += 1;
        }
        slot_of[index] = slot_of_label[label];
    }

    let clusters = package(slot_count, &slot_of, edges, size_threshold, grid.dims());
    debug!(
        "grid clusters at {pixel_threshold}: {} of {slot_count} components kept (size >= {size_threshold})",
        clusters.len(),
    );
    Ok(clusters)
}

/// Clusters of a watershed session's graph under a threshold triple.
///
/// Edges recorded where the merge cap refused a union are not followed,
/// so every cluster lies inside one basin of the session's forest.
///
/// # Errors
///
/// Returns [`SegmentError::InvalidConfig`] if a threshold is NaN.
pub fn extract_from_watershed(
    watershed: &Watershed<'_>,
    pixel_threshold: f64,
    edge_threshold: f64,
    size_threshold: usize,
) -> Result<Clusters, SegmentError> {
    check_threshold("pixel_threshold", pixel_threshold)?;
    check_threshold("edge_threshold", edge_threshold)?;

    let grid = watershed.grid();
    let n = grid.len();
    let admitted = |i: usize| watershed.is_flooded(i) && grid.value(i) >= pixel_threshold;

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut edges = Vec::new();
    for edge in watershed.graph() {
        if edge.value >= edge_threshold && watershed.is_within_basin(edge) {
            adjacency[edge.low].push(edge.high);
            adjacency[edge.high].push(edge.low);
            edges.push(*edge);
        }
    }

    let mut visited = vec![false; n];
    let mut slot_of = vec![NONE; n];
    let mut slot_count = 0;
    let mut queue = VecDeque::new();
    for seed in 0..n {
        if visited[seed] || !admitted(seed) {
            continue;
        }
        visited[seed] = true;
        queue.push_back(seed);
        while let Some(pixel) = queue.pop_front() {
            if admitted(pixel) {
                slot_of[pixel] = slot_count;
            }
            for &next in &adjacency[pixel] {
                if !visited[next] {
                    visited[next] = true;
                    queue.push_back(next);
                }
            }
        }
        slot_count += 1;
    }

    let clusters = package(slot_count, &slot_of, edges, size_threshold, grid.dims());
    debug!(
        "graph clusters at pixel {pixel_threshold} / edge {edge_threshold}: {} of {slot_count} components kept (size >= {size_threshold})",
        clusters.len(),
    );
    Ok(clusters)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::watershed::WatershedParams;

    fn session(grid: &PixelGrid, pixel_threshold: f64) -> Watershed<'_> {
        Watershed::construct(
            grid,
            WatershedParams {
                pixel_threshold,
                merge_threshold: None,
                tie_break_seed: 0,
            },
        )
        .unwrap()
    }

    fn two_blobs() -> PixelGrid {
        PixelGrid::from_rows(&[
            vec![0.9, 0.8, 0.0, 0.0, 0.0],
            vec![0.7, 0.0, 0.0, 0.6, 0.6],
            vec![0.0, 0.0, 0.0, 0.6, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn grid_path_finds_separate_blobs() {
        let clusters = extract_from_grid(&two_blobs(), 0.5, 0).unwrap();
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters.get(0).unwrap().pixels(), &[0, 1, 5]);
        assert_eq!(clusters.get(1).unwrap().pixels(), &[8, 9, 13]);
        assert_eq!(clusters.get(0).unwrap().edges().len(), 2);
    }

    #[test]
    fn grid_path_edge_value_is_minimum() {
        let clusters = extract_from_grid(&two_blobs(), 0.5, 0).unwrap();
        let grid = two_blobs();
        for cluster in &clusters {
            for edge in cluster.edges() {
                let lo = grid.value(edge.low).min(grid.value(edge.high));
                assert!((edge.value - lo).abs() < f64::EPSILON);
                assert!((grid.value(edge.low) - lo).abs() < f64::EPSILON);
            }
        }
    }

    #[test]
    fn size_threshold_discards_small_clusters() {
        let grid = PixelGrid::from_rows(&[vec![0.9, 0.0, 0.9, 0.9]]).unwrap();
        let clusters = extract_from_grid(&grid, 0.5, 2).unwrap();
        assert_eq!(clusters.sizes(), vec![2]);
    }

    #[test]
    fn nothing_above_threshold_gives_no_clusters() {
        let grid = PixelGrid::from_rows(&[vec![0.1, 0.2], vec![0.3, 0.4]]).unwrap();
        assert!(extract_from_grid(&grid, 0.5, 0).unwrap().is_empty());
    }

    #[test]
    fn negative_index_resolves_from_end() {
        let clusters = extract_from_grid(&two_blobs(), 0.5, 0).unwrap();
        assert_eq!(clusters.get(-1).unwrap().pixels(), &[8, 9, 13]);
        assert_eq!(clusters.get(-2).unwrap().pixels(), &[0, 1, 5]);
        assert!(matches!(
            clusters.get(2),
            Err(SegmentError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(matches!(
            clusters.get(-3),
            Err(SegmentError::IndexOutOfRange { index: -3, len: 2 })
        ));
    }

    #[test]
    fn graph_path_matches_grid_path() {
        let grid = two_blobs();
        let ws = session(&grid, 0.0);
        let from_graph = ws.clusters(0.5, 0.5, 0).unwrap();
        let from_grid = extract_from_grid(&grid, 0.5, 0).unwrap();
        assert_eq!(from_graph.sizes(), from_grid.sizes());
        for (a, b) in from_graph.iter().zip(&from_grid) {
            assert_eq!(a.pixels(), b.pixels());
            assert_eq!(a.edges().len(), b.edges().len());
        }
    }

    #[test]
    fn low_edge_threshold_bridges_without_admitting() {
        // Two bright pixels joined through a dim one.
        let grid = PixelGrid::from_rows(&[vec![0.9, 0.3, 0.8]]).unwrap();
        let ws = session(&grid, 0.0);

        let bridged = ws.clusters(0.5, 0.2, 0).unwrap();
        assert_eq!(bridged.len(), 1);
        assert_eq!(bridged.get(0).unwrap().pixels(), &[0, 2]);
        // Neither edge has both endpoints admitted.
        assert!(bridged.get(0).unwrap().edges().is_empty());

        let split = ws.clusters(0.5, 0.5, 0).unwrap();
        assert_eq!(split.sizes(), vec![1, 1]);
    }

    #[test]
    fn refused_merge_is_not_crossed() {
        let grid = PixelGrid::from_rows(&[vec![0.9, 0.8, 0.7, 0.6, 0.85, 0.95]]).unwrap();
        let ws = Watershed::construct(
            &grid,
            WatershedParams {
                pixel_threshold: 0.0,
                merge_threshold: Some(2),
                tie_break_seed: 0,
            },
        )
        .unwrap();
        let clusters = extract_from_watershed(&ws, 0.5, 0.5, 0).unwrap();
        assert_eq!(clusters.get(0).unwrap().pixels(), &[0, 1, 2]);
        assert_eq!(clusters.get(1).unwrap().pixels(), &[3, 4, 5]);
        let edges: usize = clusters.iter().map(|c| c.edges().len()).sum();
        assert_eq!(edges, ws.graph().len() - 1);
    }

    #[test]
    fn sort_by_size_descending() {
        let grid = PixelGrid::from_rows(&[vec![0.9, 0.0, 0.9, 0.9, 0.9, 0.0, 0.9, 0.9]]).unwrap();
        let mut clusters = extract_from_grid(&grid, 0.5, 0).unwrap().into_vec();
        assert_eq!(
            clusters.iter().map(Cluster::len).collect::<Vec<_>>(),
            vec![1, 3, 2]
        );
        clusters.sort_by(by_size_descending);
        assert_eq!(
            clusters.iter().map(Cluster::len).collect::<Vec<_>>(),
            vec![3, 2, 1]
        );
    }

    #[test]
    fn cluster_contains_its_pixels() {
        let clusters = extract_from_grid(&two_blobs(), 0.5, 0).unwrap();
        let first = clusters.get(0).unwrap();
        assert!(first.contains(5));
        assert!(!first.contains(8));
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let grid = two_blobs();
        assert!(matches!(
            extract_from_grid(&grid, f64::NAN, 0),
            Err(SegmentError::InvalidConfig(_))
        ));
        let ws = session(&grid, 0.0);
        assert!(matches!(
            ws.clusters(0.5, f64::NAN, 0),
            Err(SegmentError::InvalidConfig(_))
        ));
    }
}
