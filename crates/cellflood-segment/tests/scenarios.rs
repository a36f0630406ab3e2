//! Integration tests: concrete segmentation scenarios and cross-module
//! properties on seeded random grids.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;

use cellflood_segment::clusters::extract_from_grid;
use cellflood_segment::sweep::count_clusters;
use cellflood_segment::{
    Clusters, Dimensions, Ellipse, GraphView, PixelGrid, SegmentConfig, Thresholds, Watershed,
    WatershedParams,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn params(pixel_threshold: f64, merge_threshold: Option<usize>, seed: u64) -> WatershedParams {
    WatershedParams {
        pixel_threshold,
        merge_threshold,
        tie_break_seed: seed,
    }
}

/// Grid with values quantized to eighths, so ties are common.
fn random_grid(rng: &mut StdRng, nx: usize, ny: usize) -> PixelGrid {
    let values = (0..nx * ny)
        .map(|_| f64::from(rng.random_range(0..8_u8)) / 8.0)
        .collect();
    PixelGrid::new(nx, ny, values).unwrap()
}

fn unordered_pairs(cluster: &cellflood_segment::Cluster) -> Vec<[usize; 2]> {
    let mut pairs: Vec<[usize; 2]> = cluster
        .edges()
        .iter()
        .map(|e| [e.low.min(e.high), e.low.max(e.high)])
        .collect();
    pairs.sort_unstable();
    pairs
}

fn assert_consistent(clusters: &Clusters, dims: Dimensions) {
    for cluster in clusters {
        assert!(!cluster.is_empty());
        for &pixel in cluster.pixels() {
            assert!(dims.contains(pixel));
        }
        for edge in cluster.edges() {
            assert!(cluster.contains(edge.low), "edge {edge:?} leaves its cluster");
            assert!(cluster.contains(edge.high), "edge {edge:?} leaves its cluster");
        }
    }
}

#[test]
fn square_block_is_one_round_cluster() {
    let mut rows = vec![vec![0.0; 4]; 4];
    for row in &mut rows[1..3] {
        row[1] = 1.0;
        row[2] = 1.0;
    }
    let grid = PixelGrid::from_rows(&rows).unwrap();
    let config = SegmentConfig {
        pixel_threshold: 0.5,
        size_threshold: 0,
        ..SegmentConfig::default()
    };

    let seg = cellflood_segment::segment(&grid, &config).unwrap();
    assert_eq!(seg.clusters.sizes(), vec![4]);
    let e = seg.ellipses[0];
    assert_eq!(e.size, 4);
    assert!((e.x - 1.5).abs() < 1e-9 && (e.y - 1.5).abs() < 1e-9);
    assert!((e.a - 0.5).abs() < 1e-9 && (e.b - 0.5).abs() < 1e-9);

    let direct = extract_from_grid(&grid, 0.5, 0).unwrap();
    assert_eq!(direct.sizes(), vec![4]);
}

#[test]
fn two_hot_pixels_are_two_points() {
    let mut values = vec![0.0; 100];
    values[Dimensions::new(10, 10).index(1, 2)] = 1.0;
    values[Dimensions::new(10, 10).index(8, 7)] = 1.0;
    let grid = PixelGrid::new(10, 10, values).unwrap();

    let clusters = extract_from_grid(&grid, 0.5, 0).unwrap();
    assert_eq!(clusters.sizes(), vec![1, 1]);
    for e in clusters.ellipses().unwrap() {
        assert_eq!(e.size, 1);
        assert!(e.a.abs() < f64::EPSILON && e.b.abs() < f64::EPSILON);
    }

    let ws = Watershed::construct(&grid, params(0.5, None, 0)).unwrap();
    assert_eq!(ws.clusters(0.5, 0.5, 0).unwrap().sizes(), vec![1, 1]);
}

#[test]
fn merge_cap_keeps_two_basins_of_three() {
    let grid = PixelGrid::from_rows(&[vec![0.9, 0.8, 0.7, 0.6, 0.85, 0.95]]).unwrap();

    let capped = Watershed::construct(&grid, params(0.0, Some(2), 0)).unwrap();
    assert_eq!(capped.component_sizes(0.0, 0), vec![3, 3]);
    let saddle = capped
        .graph()
        .iter()
        .find(|e| e.low == 3 && e.high == 2)
        .expect("connecting edge is kept");
    assert!((saddle.value - grid.value(3)).abs() < f64::EPSILON);

    let uncapped = Watershed::construct(&grid, params(0.0, None, 0)).unwrap();
    assert_eq!(uncapped.component_sizes(0.0, 0), vec![6]);
    assert_eq!(capped.graph(), uncapped.graph());

    let config = SegmentConfig {
        merge_threshold: Some(2),
        ..SegmentConfig::default()
    };
    let seg = cellflood_segment::segment(&grid, &config).unwrap();
    assert_eq!(seg.clusters.sizes(), vec![3, 3]);
    let seg = cellflood_segment::segment(&grid, &SegmentConfig::default()).unwrap();
    assert_eq!(seg.clusters.sizes(), vec![6]);
}

#[test]
fn seed_zero_is_byte_identical() {
    let mut rng = StdRng::seed_from_u64(1);
    let grid = random_grid(&mut rng, 12, 9);
    let a = Watershed::construct(&grid, params(0.25, Some(4), 0)).unwrap();
    let b = Watershed::construct(&grid, params(0.25, Some(4), 0)).unwrap();
    assert_eq!(
        serde_json::to_string(a.graph()).unwrap(),
        serde_json::to_string(b.graph()).unwrap()
    );
    assert_eq!(
        a.clusters(0.25, 0.25, 2).unwrap(),
        b.clusters(0.25, 0.25, 2).unwrap()
    );
}

#[test]
fn suppressed_edges_join_only_large_components() {
    let mut rng = StdRng::seed_from_u64(2);
    for seed in [0, 17] {
        let grid = random_grid(&mut rng, 15, 15);
        let cap = 4;
        let ws = Watershed::construct(&grid, params(0.0, Some(cap), seed)).unwrap();
        let forest = ws.forest();
        for edge in ws.graph() {
            if forest.find_root(edge.low) != forest.find_root(edge.high) {
                assert!(forest.size(edge.low) >= cap);
                assert!(forest.size(edge.high) >= cap);
            }
        }
        assert_consistent(&ws.basins(0), grid.dims());
    }
}

#[test]
fn graph_and_grid_paths_agree() {
    let mut rng = StdRng::seed_from_u64(3);
    for trial in 0..20 {
        let grid = random_grid(&mut rng, 9, 13);
        let threshold = f64::from(rng.random_range(1..8_u8)) / 8.0;
        let size_threshold = rng.random_range(0..4);
        let seed = if trial % 2 == 0 { 0 } else { 100 + trial };
        let ws = Watershed::construct(&grid, params(0.0, None, seed)).unwrap();

        let from_graph = ws.clusters(threshold, threshold, size_threshold).unwrap();
        let from_grid = extract_from_grid(&grid, threshold, size_threshold).unwrap();

        assert_eq!(from_graph.sizes(), from_grid.sizes(), "trial {trial}");
        for (a, b) in from_graph.iter().zip(&from_grid) {
            assert_eq!(a.pixels(), b.pixels(), "trial {trial}");
            assert_eq!(unordered_pairs(a), unordered_pairs(b), "trial {trial}");
        }
        assert_consistent(&from_graph, grid.dims());
        assert_consistent(&from_grid, grid.dims());
    }
}

#[test]
fn capped_clusters_stay_inside_one_basin() {
    let mut rng = StdRng::seed_from_u64(8);
    for trial in 0..12 {
        let grid = random_grid(&mut rng, 11, 14);
        let cap = rng.random_range(2..8);
        let seed = if trial % 3 == 0 { 0 } else { 40 + trial };
        let ws = Watershed::construct(&grid, params(0.0, Some(cap), seed)).unwrap();
        let forest = ws.forest();

        for threshold in [0.0, 0.25, 0.5] {
            let clusters = ws.clusters(threshold, threshold, 0).unwrap();
            for cluster in &clusters {
                let roots: BTreeSet<Option<usize>> = cluster
                    .pixels()
                    .iter()
                    .map(|&p| forest.find_root(p))
                    .collect();
                assert_eq!(roots.len(), 1, "trial {trial}, threshold {threshold}");
            }
            assert_consistent(&clusters, grid.dims());
        }

        // At the flooding threshold every basin is exactly one cluster.
        let sizes: Vec<usize> = ws.clusters(0.0, 0.0, 0).unwrap().sizes();
        assert_eq!(sizes, ws.component_sizes(0.0, 0), "trial {trial}");
    }
}

#[test]
fn components_only_grow_as_threshold_falls() {
    let mut rng = StdRng::seed_from_u64(4);
    let grid = random_grid(&mut rng, 16, 16);
    let levels = Thresholds::ladder(7);

    let mut previous: Option<Clusters> = None;
    for &t in levels.as_slice() {
        let current = extract_from_grid(&grid, t, 0).unwrap();
        if let Some(prev) = &previous {
            for cluster in prev {
                let first = cluster.pixels()[0];
                let host = current
                    .iter()
                    .find(|c| c.contains(first))
                    .expect("pixel stays clustered");
                assert!(cluster.pixels().iter().all(|&p| host.contains(p)));
                assert!(host.len() >= cluster.len());
            }
        }
        previous = Some(current);
    }

    let counts = count_clusters(&grid, levels, 0, 0);
    assert!(counts.largest.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn sweep_matches_direct_extraction() {
    let mut rng = StdRng::seed_from_u64(5);
    let grid = random_grid(&mut rng, 20, 11);
    let thresholds = Thresholds::from(vec![0.9, 0.7, 0.55, 0.3, 0.3, 0.05, -1.0]);
    for size_threshold in [0, 1, 3, 8] {
        let counts = count_clusters(&grid, thresholds.clone(), size_threshold, 9);
        for (t, count) in counts.iter() {
            let direct = extract_from_grid(&grid, t, size_threshold).unwrap();
            assert_eq!(direct.len(), count, "threshold {t}, size {size_threshold}");
        }
    }
}

#[test]
fn fitted_ellipses_are_well_formed() {
    let mut rng = StdRng::seed_from_u64(6);
    let grid = random_grid(&mut rng, 14, 18);
    let clusters = extract_from_grid(&grid, 0.5, 0).unwrap();
    assert!(!clusters.is_empty());
    for cluster in &clusters {
        let e: Ellipse = cluster.ellipse().unwrap();
        assert_eq!(e.size, cluster.len());
        assert!(e.a >= e.b && e.b >= 0.0);
        assert!(e.theta >= -std::f64::consts::PI && e.theta <= std::f64::consts::PI);
    }
}

#[test]
fn graph_view_round_trips_coordinates() {
    let mut rng = StdRng::seed_from_u64(7);
    let grid = random_grid(&mut rng, 10, 7);
    let dims = grid.dims();
    let ws = Watershed::construct(&grid, params(0.0, None, 0)).unwrap();

    for cluster in &ws.clusters(0.375, 0.375, 2).unwrap() {
        let view = GraphView::new(&cluster.edge_indices(), &cluster.edge_values(), dims).unwrap();
        assert_eq!(view.edge_count(), cluster.edges().len());

        let by_hand: BTreeSet<(usize, usize, usize, usize)> = cluster
            .edges()
            .iter()
            .map(|e| (e.low / dims.ny, e.low % dims.ny, e.high / dims.ny, e.high % dims.ny))
            .collect();
        let decoded: BTreeSet<(usize, usize, usize, usize)> =
            view.edges.iter().map(|s| (s.x1, s.y1, s.x2, s.y2)).collect();
        assert_eq!(by_hand, decoded);
        assert_eq!(view, cluster.graph_view());
    }
}
