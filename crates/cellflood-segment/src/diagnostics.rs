//! Segmentation diagnostics: timing and counts for each stage.
//!
//! These diagnostics are permanent instrumentation for threshold tuning.
//! [`segment_with_diagnostics`] runs the same stages as
//! [`segment`](crate::segment) and records a [`StageDiagnostics`] for each.
//!
//! The core never reads wall-clock time itself; callers supply a
//! [`Clock`]. Durations are serialized as fractional seconds (`f64`) since
//! `std::time::Duration` does not implement serde traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Segmentation;
use crate::grid::PixelGrid;
use crate::types::{SegmentConfig, SegmentError};
use crate::watershed::{Watershed, WatershedParams};

/// Time source for stage measurements.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from one segmentation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDiagnostics {
    /// Watershed graph construction.
    pub construct: StageDiagnostics,
    /// Cluster extraction from the graph.
    pub extract: StageDiagnostics,
    /// Ellipse fitting.
    pub fit: StageDiagnostics,
    /// Wall-clock duration of the whole run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: SegmentSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Watershed graph construction.
    Construct {
        /// Flooding cut-off.
        pixel_threshold: f64,
        /// Merge cap in effect (`nx * ny + 1` when unlimited).
        merge_threshold: usize,
        /// Pixels at or above the threshold.
        flooded_pixels: usize,
        /// Edges in the watershed graph.
        edge_count: usize,
        /// Components left in the forest.
        component_count: usize,
        /// Unions refused by the merge cap.
        refused_merges: usize,
    },
    /// Cluster extraction.
    Extract {
        /// Membership threshold.
        pixel_threshold: f64,
        /// Connectivity threshold.
        edge_threshold: f64,
        /// Minimum cluster size.
        size_threshold: usize,
        /// Clusters kept.
        cluster_count: usize,
        /// Pixels across all kept clusters.
        clustered_pixels: usize,
        /// Size of the largest cluster.
        largest_cluster: usize,
    },
    /// Ellipse fitting.
    Fit {
        /// Ellipses fitted.
        ellipse_count: usize,
        /// Mean semi-major axis in pixels.
        mean_major_axis: f64,
        /// Mean semi-minor axis in pixels.
        mean_minor_axis: f64,
    },
}

/// High-level summary of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentSummary {
    /// Grid rows.
    pub nx: usize,
    /// Grid columns.
    pub ny: usize,
    /// Total pixel count.
    pub pixel_count: usize,
    /// Edges in the watershed graph.
    pub edge_count: usize,
    /// Clusters kept.
    pub cluster_count: usize,
}

impl SegmentDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Segmentation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Grid: {}x{} ({} pixels)",
            self.summary.nx, self.summary.ny, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in [
            ("Construct", &self.construct),
            ("Extract", &self.extract),
            ("Fit", &self.fit),
        ] {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Edges: {}  |  Clusters: {}",
            self.summary.edge_count, self.summary.cluster_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
pub fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Construct {
            pixel_threshold,
            merge_threshold,
            flooded_pixels,
            edge_count,
            component_count,
            refused_merges,
        } => format!(
            "thr={pixel_threshold:.4} cap={merge_threshold} flooded={flooded_pixels} edges={edge_count} components={component_count} refused={refused_merges}",
        ),
        StageMetrics::Extract {
            pixel_threshold,
            edge_threshold,
            size_threshold,
            cluster_count,
            clustered_pixels,
            largest_cluster,
        } => format!(
            "px={pixel_threshold:.4} edge={edge_threshold:.4} size>={size_threshold} clusters={cluster_count} pixels={clustered_pixels} largest={largest_cluster}",
        ),
        StageMetrics::Fit {
            ellipse_count,
            mean_major_axis,
            mean_minor_axis,
        } => format!("{ellipse_count} ellipses (mean a={mean_major_axis:.2} b={mean_minor_axis:.2})"),
    }
}

/// Run [`segment`](crate::segment) and record per-stage diagnostics.
///
/// # Errors
///
/// Same as [`segment`](crate::segment).
pub fn segment_with_diagnostics<C: Clock>(
    grid: &PixelGrid,
    config: &SegmentConfig,
    clock: &C,
) -> Result<(Segmentation, SegmentDiagnostics), SegmentError> {
    config.validate()?;
    let start = clock.now();

    let t = clock.now();
    let watershed = Watershed::construct(grid, WatershedParams::from(config))?;
    let construct = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Construct {
            pixel_threshold: config.pixel_threshold,
            merge_threshold: watershed.forest().merge_threshold(),
            flooded_pixels: watershed.flooded_count(),
            edge_count: watershed.graph().len(),
            component_count: watershed.forest().component_count(),
            refused_merges: watershed.forest().refused_merges(),
        },
    };

    let t = clock.now();
    let edge_threshold = config.effective_edge_threshold();
    let clusters = watershed.clusters(config.pixel_threshold, edge_threshold, config.size_threshold)?;
    let sizes = clusters.sizes();
    let extract = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Extract {
            pixel_threshold: config.pixel_threshold,
            edge_threshold,
            size_threshold: config.size_threshold,
            cluster_count: clusters.len(),
            clustered_pixels: sizes.iter().sum(),
            largest_cluster: sizes.iter().copied().max().unwrap_or(0),
        },
    };

    let t = clock.now();
    let ellipses = clusters.ellipses()?;
    #[allow(clippy::cast_precision_loss)]
    let mean = |axis: fn(&crate::Ellipse) -> f64| {
        if ellipses.is_empty() {
            0.0
        } else {
            ellipses.iter().map(axis).sum::<f64>() / ellipses.len() as f64
        }
    };
    let fit = StageDiagnostics {
        duration: clock.elapsed(&t),
        metrics: StageMetrics::Fit {
            ellipse_count: ellipses.len(),
            mean_major_axis: mean(|e| e.a),
            mean_minor_axis: mean(|e| e.b),
        },
    };

    let summary = SegmentSummary {
        nx: grid.nx(),
        ny: grid.ny(),
        pixel_count: grid.len(),
        edge_count: watershed.graph().len(),
        cluster_count: clusters.len(),
    };
    let segmentation = Segmentation {
        dimensions: grid.dims(),
        graph_edge_count: watershed.graph().len(),
        clusters,
        ellipses,
    };

    Ok((
        segmentation,
        SegmentDiagnostics {
            construct,
            extract,
            fit,
            total_duration: clock.elapsed(&start),
            summary,
        },
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock {
        ticks: Cell<u64>,
    }

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.ticks.get();
            self.ticks.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.ticks.get() - since)
        }
    }

    fn blob_grid() -> PixelGrid {
        PixelGrid::from_rows(&[
            vec![0.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 1.0, 0.0],
            vec![0.0, 1.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_match_segmentation() {
        let config = SegmentConfig {
            pixel_threshold: 0.5,
            ..SegmentConfig::default()
        };
        let clock = TickClock {
            ticks: Cell::new(0),
        };
        let (seg, diag) = segment_with_diagnostics(&blob_grid(), &config, &clock).unwrap();

        assert_eq!(seg.clusters.len(), 1);
        assert_eq!(diag.summary.cluster_count, 1);
        assert_eq!(diag.summary.edge_count, 4);
        assert!(matches!(
            diag.construct.metrics,
            StageMetrics::Construct {
                flooded_pixels: 4,
                edge_count: 4,
                component_count: 1,
                merge_threshold: 17,
                ..
            }
        ));
        assert!(matches!(
            diag.extract.metrics,
            StageMetrics::Extract {
                cluster_count: 1,
                largest_cluster: 4,
                ..
            }
        ));
        assert!(diag.total_duration >= diag.construct.duration);
    }

    #[test]
    fn same_result_as_segment() {
        let config = SegmentConfig {
            pixel_threshold: 0.5,
            ..SegmentConfig::default()
        };
        let clock = TickClock {
            ticks: Cell::new(0),
        };
        let (seg, _) = segment_with_diagnostics(&blob_grid(), &config, &clock).unwrap();
        assert_eq!(seg, crate::segment(&blob_grid(), &config).unwrap());
    }

    #[test]
    fn report_lists_stages_and_serializes() {
        let clock = TickClock {
            ticks: Cell::new(0),
        };
        let (_, diag) =
            segment_with_diagnostics(&blob_grid(), &SegmentConfig::default(), &clock).unwrap();

        let report = diag.report();
        assert!(report.contains("Segmentation Diagnostics Report"));
        assert!(report.contains("Construct"));
        assert!(report.contains("Fit"));

        let json = serde_json::to_string(&diag).unwrap();
        let back: SegmentDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.pixel_count, 16);
        assert!(matches!(back.fit.metrics, StageMetrics::Fit { ellipse_count: 1, .. }));
    }
}
