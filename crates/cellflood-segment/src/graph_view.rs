//! Coordinate-space view of an edge list.
//!
//! Decodes pixel indices into `(x, y)` grid coordinates so presentation
//! layers (plots, triangulation, tabular export) never need the index
//! convention.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, SegmentError};
use crate::watershed::Edge;

/// One edge in grid coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeSegment {
    /// Row of the first endpoint.
    pub x1: usize,
    /// Column of the first endpoint.
    pub y1: usize,
    /// Row of the second endpoint.
    pub x2: usize,
    /// Column of the second endpoint.
    pub y2: usize,
    /// Edge value.
    pub value: f64,
}

/// Vertices and edges of a graph in grid coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphView {
    /// Sorted, deduplicated endpoint indices.
    pub vertex_indices: Vec<usize>,
    /// `(x, y)` of each entry in `vertex_indices`.
    pub vertices: Vec<(usize, usize)>,
    /// Edges in input order.
    pub edges: Vec<EdgeSegment>,
}

impl GraphView {
    /// Build a view from endpoint pairs and their values.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::Shape`] if `edge_indices` and `edge_values`
    /// differ in length, and [`SegmentError::IndexOutOfRange`] if an index
    /// lies outside `[0, nx * ny)`.
    pub fn new(
        edge_indices: &[[usize; 2]],
        edge_values: &[f64],
        dims: Dimensions,
    ) -> Result<Self, SegmentError> {
        if edge_indices.len() != edge_values.len() {
            return Err(SegmentError::Shape(format!(
                "{} edge index pairs but {} edge values",
                edge_indices.len(),
                edge_values.len()
            )));
        }
        if let Some(&index) = edge_indices
            .iter()
            .flatten()
            .find(|&&i| !dims.contains(i))
        {
            return Err(SegmentError::IndexOutOfRange {
                index: isize::try_from(index).unwrap_or(isize::MAX),
                len: dims.pixel_count(),
            });
        }

        Ok(Self::build(
            edge_indices.iter().zip(edge_values).map(|(&pair, &v)| (pair, v)),
            dims,
        ))
    }

    /// Build a view from core-produced edges.
    #[must_use]
    pub fn from_edges(edges: &[Edge], dims: Dimensions) -> Self {
        Self::build(edges.iter().map(|e| (e.indices(), e.value)), dims)
    }

    fn build(edges: impl Iterator<Item = ([usize; 2], f64)> + Clone, dims: Dimensions) -> Self {
        let mut vertex_indices: Vec<usize> = edges.clone().flat_map(|(pair, _)| pair).collect();
        vertex_indices.sort_unstable();
        vertex_indices.dedup();

        let vertices = vertex_indices.iter().map(|&i| dims.coords(i)).collect();
        let edges = edges
            .map(|([a, b], value)| {
                let (x1, y1) = dims.coords(a);
                let (x2, y2) = dims.coords(b);
                EdgeSegment {
                    x1,
                    y1,
                    x2,
                    y2,
                    value,
                }
            })
            .collect();

        Self {
            vertex_indices,
            vertices,
            edges,
        }
    }

    /// Number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Vertex coordinates as floating-point points, e.g. for triangulation.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn points(&self) -> Vec<[f64; 2]> {
        self.vertices
            .iter()
            .map(|&(x, y)| [x as f64, y as f64])
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_coordinates() {
        let dims = Dimensions::new(3, 4);
        let view = GraphView::new(&[[5, 6], [6, 10]], &[0.5, 0.25], dims).unwrap();
        assert_eq!(view.vertex_indices, vec![5, 6, 10]);
        assert_eq!(view.vertices, vec![(1, 1), (1, 2), (2, 2)]);
        assert_eq!(view.edge_count(), 2);
        assert_eq!(
            view.edges[1],
            EdgeSegment {
                x1: 1,
                y1: 2,
                x2: 2,
                y2: 2,
                value: 0.25
            }
        );
    }

    #[test]
    fn empty_edge_list_has_no_vertices() {
        let view = GraphView::new(&[], &[], Dimensions::new(2, 2)).unwrap();
        assert!(view.vertices.is_empty());
        assert!(view.edges.is_empty());
    }

    #[test]
    fn mismatched_lengths_are_a_shape_error() {
        let result = GraphView::new(&[[0, 1]], &[], Dimensions::new(2, 2));
        assert!(matches!(result, Err(SegmentError::Shape(_))));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let result = GraphView::new(&[[0, 7]], &[1.0], Dimensions::new(2, 2));
        assert!(matches!(
            result,
            Err(SegmentError::IndexOutOfRange { index: 7, len: 4 })
        ));
    }

    #[test]
    fn from_edges_matches_new() {
        let dims = Dimensions::new(2, 3);
        let edges = [
            Edge {
                low: 4,
                high: 1,
                value: 0.3,
            },
            Edge {
                low: 2,
                high: 1,
                value: 0.6,
            },
        ];
        let direct = GraphView::from_edges(&edges, dims);
        let checked = GraphView::new(&[[4, 1], [2, 1]], &[0.3, 0.6], dims).unwrap();
        assert_eq!(direct, checked);
        assert_eq!(direct.points(), vec![[0.0, 1.0], [0.0, 2.0], [1.0, 1.0]]);
    }
}
