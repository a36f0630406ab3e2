//! Watershed graph construction.
//!
//! The water level starts at the brightest pixel and goes down. Each pixel
//! at or above `pixel_threshold` is flooded in turn; for every neighbor
//! that is already flooded, one [`Edge`] is recorded and the two
//! components are merged unless the merge cap refuses it. The resulting
//! graph keeps every adjacency that was compared, so saddles between
//! basins that were kept apart remain visible.
//!
//! Because pixels are flooded from high to low, the pixel being flooded is
//! always the lower-valued endpoint of the edges it creates, and the edge
//! value is that pixel's value.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::clusters::{self, Cluster, Clusters};
use crate::forest::DisjointSetForest;
use crate::grid::PixelGrid;
use crate::tie_break::TieBreaker;
use crate::types::{SegmentConfig, SegmentError};

/// One adjacency between two pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Lower-valued endpoint (the pixel flooded later).
    pub low: usize,
    /// Higher-valued endpoint (already flooded when the edge was made).
    pub high: usize,
    /// Value of `low`, i.e. the saddle level at which the two meet.
    pub value: f64,
}

impl Edge {
    /// The endpoint pair `[low, high]`.
    #[must_use]
    pub const fn indices(&self) -> [usize; 2] {
        [self.low, self.high]
    }
}

/// Ordered edge list produced by one flooding pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatershedGraph {
    edges: Vec<Edge>,
}

impl WatershedGraph {
    /// Edges in the order they were recorded.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if no edge was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Iterate over the edges.
    pub fn iter(&self) -> std::slice::Iter<'_, Edge> {
        self.edges.iter()
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
}

impl<'a> IntoIterator for &'a WatershedGraph {
    type Item = &'a Edge;
    type IntoIter = std::slice::Iter<'a, Edge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

/// Parameters fixed for the lifetime of one [`Watershed`] session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatershedParams {
    /// Pixels below this level are never flooded.
    pub pixel_threshold: f64,
    /// Merge cap; `None` means unlimited.
    pub merge_threshold: Option<usize>,
    /// Tie-break seed (0 = deterministic).
    pub tie_break_seed: u64,
}

impl Default for WatershedParams {
    fn default() -> Self {
        Self::from(&SegmentConfig::default())
    }
}

impl From<&SegmentConfig> for WatershedParams {
    fn from(config: &SegmentConfig) -> Self {
        Self {
            pixel_threshold: config.pixel_threshold,
            merge_threshold: config.merge_threshold,
            tie_break_seed: config.tie_break_seed,
        }
    }
}

impl WatershedParams {
    fn validate(&self) -> Result<(), SegmentError> {
        SegmentConfig {
            pixel_threshold: self.pixel_threshold,
            merge_threshold: self.merge_threshold,
            tie_break_seed: self.tie_break_seed,
            ..SegmentConfig::default()
        }
        .validate()
    }
}

/// One flooding session: the grid, its forest and its graph.
///
/// The session is owned by the caller and never shared. Reconfiguring
/// means constructing a new session.
#[derive(Debug, Clone)]
pub struct Watershed<'g> {
    grid: &'g PixelGrid,
    params: WatershedParams,
    forest: DisjointSetForest,
    graph: WatershedGraph,
}

impl<'g> Watershed<'g> {
    /// Flood `grid` and build its watershed graph.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidConfig`] if `pixel_threshold` is NaN
    /// or `merge_threshold` is zero.
    pub fn construct(grid: &'g PixelGrid, params: WatershedParams) -> Result<Self, SegmentError> {
        params.validate()?;

        let mut tie = TieBreaker::new(params.tie_break_seed);
        let order = grid.ascending_order(&mut tie);
        let mut forest = DisjointSetForest::new(grid.len(), params.merge_threshold);
        let mut edges = Vec::new();

        for &index in order.iter().rev() {
            let value = grid.value(index);
            if value < params.pixel_threshold {
                break;
            }
            forest.insert(index);

            for neighbor in grid.neighbors(index, tie.start_direction()) {
                if !forest.contains(neighbor) {
                    continue;
                }
                edges.push(Edge {
                    low: index,
                    high: neighbor,
                    value,
                });
                forest.union(index, neighbor);
            }
        }

        debug!(
            "watershed {}x{}: {} edges, {} components, {} refused merges",
            grid.nx(),
            grid.ny(),
            edges.len(),
            forest.component_count(),
            forest.refused_merges(),
        );

        Ok(Self {
            grid,
            params,
            forest,
            graph: WatershedGraph { edges },
        })
    }

    /// The grid this session floods.
    #[must_use]
    pub const fn grid(&self) -> &'g PixelGrid {
        self.grid
    }

    /// Parameters the session was built with.
    #[must_use]
    pub const fn params(&self) -> &WatershedParams {
        &self.params
    }

    /// The watershed graph.
    #[must_use]
    pub const fn graph(&self) -> &WatershedGraph {
        &self.graph
    }

    /// The forest after flooding.
    #[must_use]
    pub const fn forest(&self) -> &DisjointSetForest {
        &self.forest
    }

    /// Returns `true` if `index` was flooded.
    #[must_use]
    pub fn is_flooded(&self, index: usize) -> bool {
        self.forest.contains(index)
    }

    /// Number of flooded pixels.
    #[must_use]
    pub fn flooded_count(&self) -> usize {
        self.forest.roots().map(|root| self.forest.size(root)).sum()
    }

    /// Sizes of the flooded components (after merge suppression) whose
    /// peak value is at least `pixel_threshold` and which hold at least
    /// `size_threshold` pixels, ordered by smallest member.
    #[must_use]
    pub fn component_sizes(&self, pixel_threshold: f64, size_threshold: usize) -> Vec<usize> {
        self.forest
            .components()
            .iter()
            .filter(|pixels| {
                pixels
                    .iter()
                    .any(|&i| self.grid.value(i) >= pixel_threshold)
            })
            .map(Vec::len)
            .filter(|&len| len >= size_threshold)
            .collect()
    }

    /// Returns `true` if both endpoints of `edge` lie in one basin.
    ///
    /// An edge recorded at a refused merge joins two basins and returns
    /// `false`.
    #[must_use]
    pub fn is_within_basin(&self, edge: &Edge) -> bool {
        matches!(
            (self.forest.find_root(edge.low), self.forest.find_root(edge.high)),
            (Some(a), Some(b)) if a == b
        )
    }

    /// Flooded components packaged as clusters.
    ///
    /// Each basin keeps the graph edges whose endpoints both lie in it; the
    /// edges joining basins kept apart by the merge cap are left out.
    #[must_use]
    pub fn basins(&self, size_threshold: usize) -> Clusters {
        let dims = self.grid.dims();
        let mut edges_by_root: Vec<Vec<Edge>> = vec![Vec::new(); self.grid.len()];
        for edge in &self.graph {
            match (
                self.forest.find_root(edge.low),
                self.forest.find_root(edge.high),
            ) {
                (Some(a), Some(b)) if a == b => edges_by_root[a].push(*edge),
                _ => {}
            }
        }

        let basins = self
            .forest
            .components()
            .into_iter()
            .filter(|pixels| pixels.len() >= size_threshold)
            .filter_map(|pixels| {
                let root = self.forest.find_root(*pixels.first()?)?;
                let edges = std::mem::take(&mut edges_by_root[root]);
                Some(Cluster::new(pixels, edges, dims))
            })
            .collect();
        Clusters::new(basins, dims)
    }

    /// Connected components of the graph under a threshold triple.
    ///
    /// Connectivity follows edges with `value >= edge_threshold` inside one
    /// basin, so basins kept apart by the merge cap stay apart. Only
    /// flooded pixels with `value >= pixel_threshold` are admitted, others
    /// may still bridge admitted pixels.
    ///
    /// # Errors
    ///
    /// Returns [`SegmentError::InvalidConfig`] if a threshold is NaN.
    pub fn clusters(
        &self,
        pixel_threshold: f64,
        edge_threshold: f64,
        size_threshold: usize,
    ) -> Result<Clusters, SegmentError> {
        clusters::extract_from_watershed(self, pixel_threshold, edge_threshold, size_threshold)
    }
}
