use approx::assert_abs_diff_eq;
use ndarray::{Array2, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statcore::cluster::{
    ClusterError, EmptyClusterPolicy, Initialization, KMeansConfig, KMeansRun, PointSet, RunState,
    Termination, best_silhouette_k, fit, fit_from, silhouette_score, sweep,
};

fn two_blobs() -> PointSet {
    PointSet::new(array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]]).unwrap()
}

/// Three 3×3 grids of unit spacing centred on (0, 0), (20, 0) and (0, 20).
fn three_blobs() -> PointSet {
    let centres = [(0.0, 0.0), (20.0, 0.0), (0.0, 20.0)];
    let rows: Vec<Vec<f64>> = centres
        .iter()
        .flat_map(|&(cx, cy)| {
            (0..9).map(move |i| vec![cx + (i % 3) as f64 - 1.0, cy + (i / 3) as f64 - 1.0])
        })
        .collect();
    PointSet::from_rows(&rows).unwrap()
}

fn random_points(n: usize, dim: usize, seed: u64) -> PointSet {
    let mut rng = StdRng::seed_from_u64(seed);
    PointSet::new(Array2::from_shape_fn((n, dim), |_| rng.gen_range(-5.0..5.0))).unwrap()
}

#[test]
fn two_cluster_scenario() {
    let points = two_blobs();
    let start = array![[0.0, 0.0], [10.0, 0.0]];
    let result = fit_from(&points, start, &KMeansConfig::new(2)).unwrap();

    assert_eq!(result.termination, Termination::Converged);
    assert_eq!(result.centroids, array![[0.0, 0.5], [10.0, 0.5]]);
    assert_eq!(result.assignment.labels(), vec![1, 1, 2, 2]);
    assert_eq!(result.assignment.cluster_sizes(), vec![2, 2]);
    // 0.5 within each cluster.
    assert_abs_diff_eq!(result.wcss, 1.0, epsilon = 1e-12);

    let silhouette = silhouette_score(&points, &result.assignment).unwrap();
    assert!(silhouette > 0.85 && silhouette <= 1.0);
}

#[test]
fn seeded_restarts_find_the_two_clusters() {
    let points = two_blobs();
    let config = KMeansConfig::new(2)
        .with_init(Initialization::PlusPlus)
        .with_restarts(10);
    let result = fit(&points, &config).unwrap();
    assert_abs_diff_eq!(result.wcss, 1.0, epsilon = 1e-12);
    let labels = result.assignment.labels();
    assert_eq!(labels[0], labels[1]);
    assert_eq!(labels[2], labels[3]);
    assert_ne!(labels[0], labels[2]);
}

#[test]
fn too_many_clusters_is_invalid_k() {
    let points = two_blobs();
    assert_eq!(
        fit(&points, &KMeansConfig::new(5)).unwrap_err(),
        ClusterError::InvalidK { k: 5, points: 4 }
    );
    assert_eq!(
        fit(&points, &KMeansConfig::new(0)).unwrap_err(),
        ClusterError::InvalidK { k: 0, points: 4 }
    );
}

#[test]
fn converged_centroids_are_a_fixed_point() {
    let points = random_points(60, 3, 1);
    let config = KMeansConfig::new(4).with_seed(8);
    let first = fit(&points, &config).unwrap();
    assert!(first.converged());

    let again = fit_from(&points, first.centroids.clone(), &config).unwrap();
    assert_eq!(again.termination, Termination::Converged);
    assert_eq!(again.iterations, 1);
    assert_eq!(again.assignment, first.assignment);
    for (a, b) in again.centroids.iter().zip(first.centroids.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
    }
}

#[test]
fn wcss_never_increases_across_iterations() {
    let points = random_points(200, 2, 3);
    for seed in 0..5 {
        let config = KMeansConfig::new(6)
            .with_seed(seed)
            .with_history(true)
            .with_tolerance(0.0);
        let result = fit(&points, &config).unwrap();
        assert_eq!(result.history.len(), result.iterations);
        for pair in result.history.windows(2) {
            assert!(
                pair[1].wcss <= pair[0].wcss + 1e-9,
                "WCSS rose from {} to {} at update {}",
                pair[0].wcss,
                pair[1].wcss,
                pair[1].iteration
            );
        }
    }
}

#[test]
fn same_seed_same_result() {
    let points = random_points(80, 4, 21);
    for init in [Initialization::Random, Initialization::PlusPlus] {
        let config = KMeansConfig::new(5).with_seed(99).with_init(init).with_restarts(3);
        let a = fit(&points, &config).unwrap();
        let b = fit(&points, &config).unwrap();
        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.assignment, b.assignment);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.wcss, b.wcss);
    }
}

#[test]
fn silhouette_stays_in_range() {
    let points = random_points(50, 2, 4);
    for k in 2..=6 {
        let result = fit(&points, &KMeansConfig::new(k)).unwrap();
        let score = silhouette_score(&points, &result.assignment).unwrap();
        assert!((-1.0..=1.0).contains(&score), "k = {k}: silhouette {score}");
        assert!(result.wcss >= 0.0);
        assert!(result.assignment.labels().iter().all(|&l| (1..=k).contains(&l)));
    }
}

#[test]
fn sweep_on_structured_data() {
    let points = three_blobs();
    let base = KMeansConfig::new(1)
        .with_init(Initialization::PlusPlus)
        .with_restarts(10);
    let series = sweep(&points, 1..=5, &base).unwrap();

    assert_eq!(series.iter().map(|p| p.k).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
    assert_eq!(series[0].silhouette, None);
    for pair in series.windows(2) {
        assert!(pair[1].wcss <= pair[0].wcss + 1e-9);
    }
    // Three grids of nine points, each with WCSS 12.
    assert_abs_diff_eq!(series[2].wcss, 36.0, epsilon = 1e-9);
    assert_eq!(best_silhouette_k(&series), Some(3));
}

#[test]
fn sweep_matches_independent_fits() {
    let points = random_points(40, 2, 12);
    let base = KMeansConfig::new(1).with_seed(5);
    let series = sweep(&points, 2..=4, &base).unwrap();
    for point in &series {
        let single = fit(&points, &KMeansConfig { k: point.k, ..base.clone() }).unwrap();
        assert_eq!(point.wcss, single.wcss);
        assert_eq!(point.iterations, single.iterations);
    }
}

#[test]
fn stepping_exposes_every_phase() {
    let points = two_blobs();
    let config = KMeansConfig::new(2);
    let mut run = KMeansRun::new(&points, array![[0.0, 0.0], [10.0, 1.0]], &config).unwrap();
    let mut states = vec![run.state()];
    while !run.state().is_terminal() {
        states.push(run.step().unwrap());
    }
    assert_eq!(
        states,
        vec![
            RunState::Initialized,
            RunState::Assigning,
            RunState::Updating,
            RunState::Assigning,
            RunState::Updating,
            RunState::Converged,
        ]
    );
    let result = run.run().unwrap();
    assert_eq!(result.iterations, 2);
}

#[test]
fn empty_cluster_policies() {
    let points = two_blobs();
    let start = array![[0.0, 0.5], [10.0, 0.5], [50.0, 50.0]];

    let kept = fit_from(&points, start.clone(), &KMeansConfig::new(3)).unwrap();
    assert_eq!(kept.termination, Termination::Converged);
    assert_eq!(kept.centroids.row(2).to_vec(), vec![50.0, 50.0]);

    let failing = KMeansConfig::new(3).with_empty_cluster(EmptyClusterPolicy::Fail);
    assert!(matches!(
        fit_from(&points, start, &failing),
        Err(ClusterError::EmptyCluster { cluster: 3, .. })
    ));
}

#[test]
fn iteration_budget_sets_the_flag() {
    let points = random_points(100, 2, 30);
    let config = KMeansConfig::new(8).with_max_iterations(1).with_tolerance(0.0);
    let result = fit(&points, &config).unwrap();
    assert_eq!(result.termination, Termination::MaxIterExceeded);
    assert_eq!(result.iterations, 1);
}
