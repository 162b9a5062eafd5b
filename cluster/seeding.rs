//! Initial centroid selection.
//!
//! Both strategies draw from a caller-owned `StdRng`, so a fixed seed gives a fixed
//! starting configuration.

use crate::cluster::kmeans::ClusterError;
use crate::cluster::points::{PointSet, squared_distance};
use ndarray::Array2;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::index;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initialization {
    /// k distinct points sampled uniformly without replacement.
    #[default]
    Random,
    /// k-means++: each further point is drawn with probability proportional to its
    /// squared distance from the nearest centroid chosen so far.
    PlusPlus,
}

pub fn initial_centroids<R: Rng + ?Sized>(
    points: &PointSet,
    k: usize,
    init: Initialization,
    rng: &mut R,
) -> Result<Array2<f64>, ClusterError> {
    if k == 0 || k > points.len() {
        return Err(ClusterError::InvalidK {
            k,
            points: points.len(),
        });
    }
    let chosen = match init {
        Initialization::Random => index::sample(rng, points.len(), k).into_vec(),
        Initialization::PlusPlus => plus_plus_indices(points, k, rng),
    };
    log::debug!("Initial centroids drawn from points {:?}", chosen);

    let mut centroids = Array2::zeros((k, points.dim()));
    for (row, &source) in chosen.iter().enumerate() {
        centroids.row_mut(row).assign(&points.point(source));
    }
    Ok(centroids)
}

fn plus_plus_indices<R: Rng + ?Sized>(points: &PointSet, k: usize, rng: &mut R) -> Vec<usize> {
    let n = points.len();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    let mut nearest: Vec<f64> = (0..n)
        .map(|i| squared_distance(points.point(i), points.point(chosen[0])))
        .collect();

    while chosen.len() < k {
        let next = match WeightedIndex::new(&nearest) {
            Ok(weights) => weights.sample(rng),
            // Every remaining point coincides with a centroid.
            Err(_) => match (0..n).find(|i| !chosen.contains(i)) {
                Some(i) => i,
                None => break,
            },
        };
        chosen.push(next);
        for (i, d) in nearest.iter_mut().enumerate() {
            *d = d.min(squared_distance(points.point(i), points.point(next)));
        }
    }
    chosen
}
