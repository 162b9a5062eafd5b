// glm/estimate.rs

//! # Poisson Regression by Maximum Likelihood
//!
//! This module fits `y ~ Poisson(exp(Xβ))` by directly maximizing the log-likelihood:
//!
//! 1.  Optimization (BFGS). The negative log-likelihood and its analytic gradient
//!     `Xᵀ(λ − y)` are handed to the `wolfe_bfgs` optimizer, starting from the
//!     caller's initial guess or the zero vector. There is no closed form outside the
//!     intercept-only case.
//!
//! 2.  Uncertainty (Hessian). At the optimum, the observed information `XᵀΛX`
//!     is inverted. Standard errors are the square roots of its diagonal.
//!
//! The estimator is a pure function of its inputs. BFGS is deterministic, so identical
//! inputs always give identical fits.

use wolfe_bfgs::{Bfgs, BfgsError, BfgsSolution};

use crate::glm::design::{DesignError, DesignMatrix, ResponseVector};
use crate::glm::information::{self, InformationError};
use crate::glm::likelihood::PoissonLikelihood;

use ndarray::{Array1, ArrayView1};
use ndarray_linalg::{Solve, error::LinalgError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way a regression fit can fail.
#[derive(Error, Debug)]
pub enum EstimationError {
    #[error("Invalid regression input: {0}")]
    InvalidInput(#[from] DesignError),

    #[error(
        "The optimizer did not converge within {max_iterations} iterations (gradient norm {gradient_norm:.3e}): {reason}"
    )]
    NonConvergence {
        max_iterations: usize,
        gradient_norm: f64,
        reason: String,
    },

    #[error(
        "The Hessian is singular (smallest information eigenvalue {min_eigenvalue:.3e}); the covariates are likely collinear."
    )]
    SingularHessian { min_eigenvalue: f64 },

    #[error("A linear algebra routine failed: {0}")]
    LinearAlgebra(#[from] LinalgError),
}

impl From<InformationError> for EstimationError {
    fn from(err: InformationError) -> Self {
        match err {
            InformationError::Singular { min_eigenvalue, .. } => {
                EstimationError::SingularHessian { min_eigenvalue }
            }
            InformationError::Decomposition(e) => EstimationError::LinearAlgebra(e),
        }
    }
}

/// Optimizer settings for `estimate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorConfig {
    /// Tolerance on the gradient norm of the per-observation negative log-likelihood.
    pub tolerance: f64,
    /// BFGS iteration budget.
    pub max_iterations: usize,
}

impl EstimatorConfig {
    /// Rejects settings under which the optimizer cannot run.
    pub fn validate(&self) -> Result<(), EstimationError> {
        if self.max_iterations == 0 {
            return Err(DesignError::InvalidSetting(
                "max_iterations must be at least 1".to_string(),
            )
            .into());
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(DesignError::InvalidSetting(format!(
                "tolerance must be a finite positive number, got {}",
                self.tolerance
            ))
            .into());
        }
        Ok(())
    }
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 500,
        }
    }
}

/// One row of a coefficient table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoefficientRow {
    pub name: String,
    pub estimate: f64,
    pub std_error: f64,
    pub z_value: f64,
}

/// Builds the coefficient table shared by every regression fit.
pub fn coefficient_table(
    names: &[String],
    coefficients: ArrayView1<f64>,
    standard_errors: ArrayView1<f64>,
) -> Vec<CoefficientRow> {
    names
        .iter()
        .zip(coefficients.iter().zip(standard_errors.iter()))
        .map(|(name, (&estimate, &std_error))| CoefficientRow {
            name: name.clone(),
            estimate,
            std_error,
            z_value: estimate / std_error,
        })
        .collect()
}

/// A fitted Poisson regression.
#[derive(Debug, Clone)]
pub struct PoissonFit {
    pub column_names: Vec<String>,
    pub coefficients: Array1<f64>,
    pub standard_errors: Array1<f64>,
    /// Full log-likelihood at the optimum, `lnΓ(y + 1)` included.
    pub log_likelihood: f64,
    pub iterations: usize,
    pub gradient_norm: f64,
}

impl PoissonFit {
    pub fn coefficient_table(&self) -> Vec<CoefficientRow> {
        coefficient_table(
            &self.column_names,
            self.coefficients.view(),
            self.standard_errors.view(),
        )
    }

    /// Expected counts `exp(Xβ)` for a design with the fitted column layout.
    pub fn predict_rates(&self, x: &DesignMatrix) -> Result<Array1<f64>, EstimationError> {
        if x.ncols() != self.coefficients.len() {
            return Err(DesignError::ColumnMismatch {
                found: x.ncols(),
                expected: self.coefficients.len(),
            }
            .into());
        }
        Ok(x.view().dot(&self.coefficients).mapv(f64::exp))
    }
}

/// Fits a Poisson regression by maximum likelihood.
///
/// `initial` defaults to the zero vector. The fit fails with `NonConvergence` when BFGS
/// exhausts its budget or the polished optimum keeps a gradient norm above
/// `config.tolerance`. A failed line search is not fatal on its own: its last point is
/// polished with Newton steps and then checked like any other. The fit fails with
/// `SingularHessian` when the information matrix at the optimum cannot be inverted.
pub fn estimate(
    x: &DesignMatrix,
    y: &ResponseVector,
    initial: Option<ArrayView1<f64>>,
    config: &EstimatorConfig,
) -> Result<PoissonFit, EstimationError> {
    config.validate()?;
    y.check_aligned(x)?;
    let p = x.ncols();
    let initial_beta = match initial {
        Some(beta) if beta.len() != p => {
            return Err(DesignError::InitialLength {
                found: beta.len(),
                expected: p,
            }
            .into());
        }
        Some(beta) if beta.iter().any(|v| !v.is_finite()) => {
            return Err(DesignError::NonFinite("initial coefficients".to_string()).into());
        }
        Some(beta) => beta.to_owned(),
        None => Array1::zeros(p),
    };

    log::info!(
        "Fitting Poisson regression: {} observations, {} coefficients.",
        x.nrows(),
        p
    );

    // BFGS works on the per-observation objective so that the gradient tolerance does
    // not scale with the sample size.
    let scale = 1.0 / x.nrows() as f64;
    let likelihood = PoissonLikelihood::new(x.view(), y.view());
    let cost_and_grad = |beta: &Array1<f64>| -> (f64, Array1<f64>) {
        let (cost, grad) = likelihood.objective_and_gradient(beta.view());
        if cost.is_finite() {
            (cost * scale, grad * scale)
        } else {
            log::warn!("Non-finite objective encountered: {}", cost);
            (f64::MAX, grad * scale)
        }
    };

    let solution = match Bfgs::new(initial_beta, cost_and_grad)
        .with_tolerance(config.tolerance)
        .with_max_iterations(config.max_iterations)
        .run()
    {
        Ok(solution) => solution,
        Err(BfgsError::LineSearchFailed {
            last_solution,
            max_attempts,
        }) => {
            log::warn!(
                "BFGS line search failed after {} attempts; polishing its last point with Newton steps.",
                max_attempts
            );
            *last_solution
        }
        Err(BfgsError::MaxIterationsReached { last_solution }) => {
            return Err(EstimationError::NonConvergence {
                max_iterations: config.max_iterations,
                gradient_norm: scaled_norm(
                    &likelihood.gradient(last_solution.final_point.view()),
                    scale,
                ),
                reason: "iteration budget exhausted".to_string(),
            });
        }
        Err(e) => {
            return Err(EstimationError::NonConvergence {
                max_iterations: config.max_iterations,
                gradient_norm: f64::NAN,
                reason: format!("BFGS failed: {e}"),
            });
        }
    };
    let BfgsSolution {
        final_point,
        final_value,
        iterations,
        ..
    } = solution;

    log::debug!(
        "BFGS finished in {} iterations, objective {:.6}, gradient norm {:.3e}",
        iterations,
        final_value,
        scaled_norm(&likelihood.gradient(final_point.view()), scale)
    );

    let beta = newton_refine(&likelihood, final_point, scale);
    let gradient_norm = scaled_norm(&likelihood.gradient(beta.view()), scale);
    if !gradient_norm.is_finite() || gradient_norm > config.tolerance {
        return Err(EstimationError::NonConvergence {
            max_iterations: config.max_iterations,
            gradient_norm,
            reason: "gradient norm above tolerance at the final point".to_string(),
        });
    }

    let information = likelihood.information(beta.view());
    let covariance = information::invert_information(&information)?;
    let standard_errors = information::standard_errors(&covariance);
    let log_likelihood = likelihood.log_likelihood(beta.view());

    log::info!(
        "Poisson fit converged after {} iterations. Log-likelihood: {:.4}",
        iterations,
        log_likelihood
    );

    Ok(PoissonFit {
        column_names: x.column_names().to_vec(),
        coefficients: beta,
        standard_errors,
        log_likelihood,
        iterations,
        gradient_norm,
    })
}

/// Newton steps on the exact information matrix taken after BFGS.
const NEWTON_REFINEMENTS: usize = 5;

/// Stop refining once the per-observation gradient norm is this small.
const REFINEMENT_TARGET: f64 = 1e-12;

fn scaled_norm(gradient: &Array1<f64>, scale: f64) -> f64 {
    gradient.dot(gradient).sqrt() * scale
}

/// Polishes the BFGS optimum with Newton steps, keeping a step only when it shrinks
/// the gradient.
fn newton_refine(likelihood: &PoissonLikelihood, mut beta: Array1<f64>, scale: f64) -> Array1<f64> {
    for step in 0..NEWTON_REFINEMENTS {
        let gradient = likelihood.gradient(beta.view());
        let norm = scaled_norm(&gradient, scale);
        if norm <= REFINEMENT_TARGET {
            break;
        }
        let Ok(delta) = likelihood.information(beta.view()).solve(&gradient) else {
            log::debug!("Newton refinement stopped at step {}: information not solvable", step);
            break;
        };
        let candidate = &beta - &delta;
        let candidate_norm = scaled_norm(&likelihood.gradient(candidate.view()), scale);
        if candidate_norm.is_nan() || candidate_norm >= norm {
            break;
        }
        beta = candidate;
    }
    beta
}
