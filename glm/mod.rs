//! Regression fitting: the Poisson maximum-likelihood estimator, its IRLS reference,
//! and closed-form least squares.

pub mod design;
pub mod estimate;
pub mod information;
pub mod irls;
pub mod likelihood;
pub mod linear;

pub use design::{Covariate, CovariateValues, DesignError, DesignMatrix, ResponseVector};
pub use estimate::{CoefficientRow, EstimationError, EstimatorConfig, PoissonFit, estimate};
