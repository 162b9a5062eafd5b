//! Inversion of information matrices into coefficient covariances.

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO, error::LinalgError};
use thiserror::Error;

/// Eigenvalues below this fraction of the largest are treated as zero.
pub const RELATIVE_EIGENVALUE_FLOOR: f64 = 1e-10;

#[derive(Error, Debug)]
pub enum InformationError {
    #[error(
        "The information matrix is singular: smallest eigenvalue {min_eigenvalue:.3e} against largest {max_eigenvalue:.3e}."
    )]
    Singular {
        min_eigenvalue: f64,
        max_eigenvalue: f64,
    },

    #[error("Eigendecomposition of the information matrix failed: {0}")]
    Decomposition(#[from] LinalgError),
}

/// Inverts a symmetric positive-definite information matrix through its
/// eigendecomposition, `I⁻¹ = V diag(1/d) Vᵀ`.
///
/// Fails with `Singular` when the spectrum is not bounded away from zero, which is
/// what collinear design columns produce.
pub fn invert_information(information: &Array2<f64>) -> Result<Array2<f64>, InformationError> {
    let (eigenvalues, eigenvectors) = information.eigh(UPLO::Lower)?;

    let max_eigenvalue = eigenvalues.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min_eigenvalue = eigenvalues.iter().cloned().fold(f64::INFINITY, f64::min);
    if max_eigenvalue.is_nan()
        || max_eigenvalue <= 0.0
        || !min_eigenvalue.is_finite()
        || min_eigenvalue <= max_eigenvalue * RELATIVE_EIGENVALUE_FLOOR
    {
        return Err(InformationError::Singular {
            min_eigenvalue,
            max_eigenvalue,
        });
    }

    let inverse_values: Array1<f64> = eigenvalues.mapv(|d| 1.0 / d);
    let scaled = &eigenvectors * &inverse_values.view().insert_axis(Axis(0));
    Ok(scaled.dot(&eigenvectors.t()))
}

/// Square roots of the diagonal of a covariance matrix.
pub fn standard_errors(covariance: &Array2<f64>) -> Array1<f64> {
    covariance.diag().mapv(|v| v.max(0.0).sqrt())
}
