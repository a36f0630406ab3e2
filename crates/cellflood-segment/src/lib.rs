//! cellflood-segment: watershed segmentation of 2D intensity grids (sans-IO).
//!
//! Floods a grid from its brightest pixel down, records every adjacency
//! compared along the way as a watershed graph, and extracts connected
//! clusters from that graph (or directly from the grid) under pixel, edge
//! and size thresholds. Clusters are summarized by fitted ellipses and can
//! be projected into grid coordinates. Threshold sweeps count or mark
//! clusters across many thresholds in a single pass.
//!
//! This crate has **no I/O dependencies**: it operates on in-memory grids
//! and byte slices and returns structured data. Dataset layout and
//! reporting live in `cellflood-bench`.

pub mod clusters;
pub mod diagnostics;
pub mod ellipse;
pub mod forest;
pub mod graph_view;
pub mod grid;
pub mod nucleus;
pub mod sweep;
pub mod threshold;
pub mod tie_break;
pub mod types;
pub mod watershed;

use serde::{Deserialize, Serialize};

pub use clusters::{Cluster, Clusters, by_size_descending};
pub use ellipse::Ellipse;
pub use forest::DisjointSetForest;
pub use graph_view::{EdgeSegment, GraphView};
pub use grid::PixelGrid;
pub use sweep::{ClusterCounts, Thresholds};
pub use types::{Dimensions, SegmentConfig, SegmentError};
pub use watershed::{Edge, Watershed, WatershedGraph, WatershedParams};

/// Result of one [`segment`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    /// Grid dimensions.
    pub dimensions: Dimensions,
    /// Edges in the watershed graph the clusters were extracted from.
    pub graph_edge_count: usize,
    /// Clusters in discovery order.
    pub clusters: Clusters,
    /// One ellipse per cluster, aligned with `clusters`.
    pub ellipses: Vec<Ellipse>,
}

/// Segment a grid in one call.
///
/// # Steps
///
/// 1. Flood the grid into a watershed graph (`pixel_threshold`,
///    `merge_threshold`, `tie_break_seed`)
/// 2. Extract clusters from the graph (`pixel_threshold`,
///    `edge_threshold`, `size_threshold`)
/// 3. Fit an ellipse to every cluster
///
/// # Errors
///
/// Returns [`SegmentError::InvalidConfig`] if `config` fails validation.
pub fn segment(grid: &PixelGrid, config: &SegmentConfig) -> Result<Segmentation, SegmentError> {
    config.validate()?;

    let watershed = Watershed::construct(grid, WatershedParams::from(config))?;
    let clusters = watershed.clusters(
        config.pixel_threshold,
        config.effective_edge_threshold(),
        config.size_threshold,
    )?;
    let ellipses = clusters.ellipses()?;

    Ok(Segmentation {
        dimensions: grid.dims(),
        graph_edge_count: watershed.graph().len(),
        clusters,
        ellipses,
    })
}
