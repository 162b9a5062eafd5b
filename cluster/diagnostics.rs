//! Model-selection diagnostics for a clustering: within-cluster sum of squares,
//! silhouette coefficients, and a sweep over candidate cluster counts.

use crate::cluster::kmeans::{self, ClusterError, KMeansConfig, Termination};
use crate::cluster::points::{ClusterAssignment, PointSet, squared_distance};
use ndarray::{Array1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Sum of squared distances from each point to its assigned centroid.
pub fn wcss(points: &PointSet, centroids: ArrayView2<f64>, assignment: &ClusterAssignment) -> f64 {
    assignment
        .indices()
        .iter()
        .enumerate()
        .map(|(i, &c)| squared_distance(points.point(i), centroids.row(c)))
        .sum()
}

/// Silhouette coefficient of every point.
///
/// For point `i` with mean distance `a` to the rest of its own cluster and smallest
/// mean distance `b` to any other populated cluster, `s = (b − a) / max(a, b)`.
/// Points in singleton clusters get 0. When fewer than two clusters are populated
/// every coefficient is 0.
pub fn silhouette_samples(points: &PointSet, assignment: &ClusterAssignment) -> Array1<f64> {
    let n = points.len();
    let k = assignment.k();
    let sizes = assignment.cluster_sizes();
    let populated = sizes.iter().filter(|&&s| s > 0).count();
    if populated < 2 {
        return Array1::zeros(n);
    }

    Array1::from_shape_fn(n, |i| {
        let own = assignment.cluster_of(i);
        if sizes[own] <= 1 {
            return 0.0;
        }
        let mut totals = vec![0.0; k];
        for j in 0..n {
            if j != i {
                totals[assignment.cluster_of(j)] +=
                    squared_distance(points.point(i), points.point(j)).sqrt();
            }
        }
        let a = totals[own] / (sizes[own] - 1) as f64;
        let b = (0..k)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| totals[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);
        let scale = a.max(b);
        if scale > 0.0 { (b - a) / scale } else { 0.0 }
    })
}

/// Mean silhouette coefficient in `[-1, 1]`, or `None` when fewer than two clusters
/// are populated.
pub fn silhouette_score(points: &PointSet, assignment: &ClusterAssignment) -> Option<f64> {
    let populated = assignment.cluster_sizes().iter().filter(|&&s| s > 0).count();
    if populated < 2 {
        return None;
    }
    silhouette_samples(points, assignment).mean()
}

/// One candidate of a k sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SweepPoint {
    pub k: usize,
    pub wcss: f64,
    /// Absent for k = 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silhouette: Option<f64>,
    pub termination: Termination,
    pub iterations: usize,
}

/// Clusters `points` once per `k` in `ks`, each with `base` settings and its own
/// seeded generator. Candidates run in parallel; the result is ordered by k.
pub fn sweep(
    points: &PointSet,
    ks: RangeInclusive<usize>,
    base: &KMeansConfig,
) -> Result<Vec<SweepPoint>, ClusterError> {
    if ks.is_empty() {
        return Err(ClusterError::InvalidInput(format!(
            "empty k range {}..={}",
            ks.start(),
            ks.end()
        )));
    }
    log::info!(
        "Sweeping k over {}..={} on {} points",
        ks.start(),
        ks.end(),
        points.len()
    );

    ks.into_par_iter()
        .map(|k| -> Result<SweepPoint, ClusterError> {
            let config = KMeansConfig { k, ..base.clone() };
            let result = kmeans::fit(points, &config)?;
            Ok(SweepPoint {
                k,
                wcss: result.wcss,
                silhouette: silhouette_score(points, &result.assignment),
                termination: result.termination,
                iterations: result.iterations,
            })
        })
        .collect()
}

/// The k with the highest silhouette in a sweep; the smallest such k on ties.
pub fn best_silhouette_k(sweep: &[SweepPoint]) -> Option<usize> {
    sweep
        .iter()
        .filter_map(|p| p.silhouette.map(|s| (p.k, s)))
        .fold(None, |best: Option<(usize, f64)>, (k, s)| match best {
            Some((_, top)) if top >= s => best,
            _ => Some((k, s)),
        })
        .map(|(k, _)| k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn two_blobs() -> PointSet {
        PointSet::new(array![[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]]).unwrap()
    }

    #[test]
    fn wcss_of_two_blobs() {
        let points = two_blobs();
        let assignment = ClusterAssignment::new(vec![0, 0, 1, 1], 2).unwrap();
        let centroids = array![[0.0, 0.5], [10.0, 0.5]];
        assert_abs_diff_eq!(wcss(&points, centroids.view(), &assignment), 1.0);
    }

    #[test]
    fn silhouette_of_separated_blobs() {
        let points = two_blobs();
        let assignment = ClusterAssignment::new(vec![0, 0, 1, 1], 2).unwrap();
        let b = (10.0 + 101.0_f64.sqrt()) / 2.0;
        let expected = (b - 1.0) / b;
        let score = silhouette_score(&points, &assignment).unwrap();
        assert_abs_diff_eq!(score, expected, epsilon = 1e-12);
    }

    #[test]
    fn silhouette_undefined_for_one_cluster() {
        let points = two_blobs();
        let single = ClusterAssignment::new(vec![0, 0, 0, 0], 1).unwrap();
        assert_eq!(silhouette_score(&points, &single), None);
        let one_populated = ClusterAssignment::new(vec![1, 1, 1, 1], 2).unwrap();
        assert_eq!(silhouette_score(&points, &one_populated), None);
    }

    #[test]
    fn singleton_cluster_scores_zero() {
        let points = two_blobs();
        let assignment = ClusterAssignment::new(vec![0, 1, 1, 1], 2).unwrap();
        let samples = silhouette_samples(&points, &assignment);
        assert_eq!(samples[0], 0.0);
        assert!(samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    }

    #[test]
    fn best_k_prefers_highest_then_smallest() {
        let point = |k, silhouette| SweepPoint {
            k,
            wcss: 0.0,
            silhouette,
            termination: Termination::Converged,
            iterations: 1,
        };
        let series = vec![
            point(1, None),
            point(2, Some(0.7)),
            point(3, Some(0.9)),
            point(4, Some(0.9)),
        ];
        assert_eq!(best_silhouette_k(&series), Some(3));
        assert_eq!(best_silhouette_k(&series[..1]), None);
    }

    #[test]
    fn empty_range_is_rejected() {
        let points = two_blobs();
        let (low, high) = (3, 2);
        let result = sweep(&points, low..=high, &KMeansConfig::new(1));
        assert!(matches!(result, Err(ClusterError::InvalidInput(_))));
    }
}
