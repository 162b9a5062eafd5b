use crate::cluster::kmeans::ClusterError;
use ndarray::{Array2, ArrayView1, ArrayView2, Zip};

/// The points to be clustered, one row per point. Immutable, finite, and non-empty.
#[derive(Debug, Clone)]
pub struct PointSet {
    points: Array2<f64>,
}

impl PointSet {
    pub fn new(points: Array2<f64>) -> Result<Self, ClusterError> {
        if points.nrows() == 0 {
            return Err(ClusterError::InvalidInput(
                "the point set has no points".to_string(),
            ));
        }
        if points.ncols() == 0 {
            return Err(ClusterError::InvalidInput(
                "the point set has no feature columns".to_string(),
            ));
        }
        if let Some(row) = points
            .rows()
            .into_iter()
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(ClusterError::InvalidInput(format!(
                "point {} has a non-finite coordinate",
                row + 1
            )));
        }
        Ok(Self { points })
    }

    /// Builds a point set from row vectors, which must all have the same length.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ClusterError> {
        let dim = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().position(|row| row.len() != dim) {
            return Err(ClusterError::InvalidInput(format!(
                "point {} has {} coordinates, expected {}",
                bad + 1,
                rows[bad].len(),
                dim
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let points = Array2::from_shape_vec((rows.len(), dim), flat)
            .map_err(|e| ClusterError::InvalidInput(e.to_string()))?;
        Self::new(points)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.points.view()
    }

    pub fn point(&self, index: usize) -> ArrayView1<'_, f64> {
        self.points.row(index)
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Number of features per point.
    pub fn dim(&self) -> usize {
        self.points.ncols()
    }
}

/// Squared Euclidean distance.
pub fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    Zip::from(&a)
        .and(&b)
        .fold(0.0, |acc, &x, &y| acc + (x - y) * (x - y))
}

/// The cluster of every point.
///
/// Indices are zero-based positions in the centroid set. `labels` gives the
/// one-based cluster labels `1..=k` used in reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    indices: Vec<usize>,
    k: usize,
}

impl ClusterAssignment {
    pub fn new(indices: Vec<usize>, k: usize) -> Result<Self, ClusterError> {
        if let Some(&bad) = indices.iter().find(|&&c| c >= k) {
            return Err(ClusterError::InvalidInput(format!(
                "cluster index {bad} is out of range for k = {k}"
            )));
        }
        Ok(Self { indices, k })
    }

    pub(crate) fn from_trusted(indices: Vec<usize>, k: usize) -> Self {
        debug_assert!(indices.iter().all(|&c| c < k));
        Self { indices, k }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Zero-based cluster of point `i`.
    pub fn cluster_of(&self, i: usize) -> usize {
        self.indices[i]
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// One-based labels in `[1, k]`.
    pub fn labels(&self) -> Vec<usize> {
        self.indices.iter().map(|&c| c + 1).collect()
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.k];
        for &c in &self.indices {
            sizes[c] += 1;
        }
        sizes
    }
}
