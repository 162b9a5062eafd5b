//! Reference Poisson fitter by iteratively reweighted least squares.
//!
//! With the canonical log link, IRLS and Newton-Raphson coincide:
//!
//! ```text
//! β ← β + (XᵀΛX)⁻¹ Xᵀ(y − λ)
//! ```
//!
//! Each trial step is halved while it lowers the log-likelihood or produces non-finite
//! values. This fitter is kept to cross-check `estimate`, not as a second production
//! path, so it reports no standard errors.

use crate::glm::design::{DesignMatrix, ResponseVector};
use crate::glm::estimate::EstimationError;
use crate::glm::likelihood::PoissonLikelihood;
use ndarray::Array1;
use ndarray_linalg::Solve;

/// The status of the IRLS iterations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrlsStatus {
    /// Converged successfully within tolerance.
    Converged,
    /// Reached maximum iterations without converging.
    MaxIterationsReached,
}

#[derive(Clone, Copy, Debug)]
pub struct IrlsConfig {
    /// Convergence threshold on the largest absolute Newton step.
    pub tolerance: f64,
    pub max_iterations: usize,
    pub max_step_halvings: usize,
}

impl Default for IrlsConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 100,
            max_step_halvings: 30,
        }
    }
}

#[derive(Clone, Debug)]
pub struct IrlsResult {
    pub coefficients: Array1<f64>,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub status: IrlsStatus,
}

/// Fits `y ~ Poisson(exp(Xβ))` from a zero start.
pub fn fit_poisson_irls(
    x: &DesignMatrix,
    y: &ResponseVector,
    config: &IrlsConfig,
) -> Result<IrlsResult, EstimationError> {
    y.check_aligned(x)?;
    let likelihood = PoissonLikelihood::new(x.view(), y.view());

    let mut beta = Array1::zeros(x.ncols());
    let mut current = likelihood.log_likelihood(beta.view());

    for iter in 1..=config.max_iterations {
        let score = -likelihood.gradient(beta.view());
        let information = likelihood.information(beta.view());
        let step = information.solve(&score)?;
        let step_size = step.iter().fold(0.0_f64, |m, s| m.max(s.abs()));
        if step_size <= config.tolerance {
            log::debug!("IRLS converged after {} iterations", iter);
            let coefficients = &beta + &step;
            return Ok(IrlsResult {
                log_likelihood: likelihood.log_likelihood(coefficients.view()),
                coefficients,
                iterations: iter,
                status: IrlsStatus::Converged,
            });
        }

        // Differences below this are rounding noise in the log-likelihood.
        let slack = f64::EPSILON * 16.0 * current.abs().max(1.0);
        let mut trial = &beta + &step;
        let mut trial_value = likelihood.log_likelihood(trial.view());
        let mut halvings = 0;
        while (!trial_value.is_finite() || trial_value < current - slack)
            && halvings < config.max_step_halvings
        {
            trial = &beta + 0.5 * (&trial - &beta);
            trial_value = likelihood.log_likelihood(trial.view());
            halvings += 1;
        }
        if halvings > 0 {
            log::debug!("IRLS iteration {}: {} step halvings", iter, halvings);
        }
        if !trial_value.is_finite() || trial_value < current - slack {
            log::warn!("IRLS failed to find an improving step at iteration {}", iter);
            return Ok(IrlsResult {
                coefficients: beta,
                log_likelihood: current,
                iterations: iter,
                status: IrlsStatus::MaxIterationsReached,
            });
        }

        beta = trial;
        current = trial_value;
    }

    log::warn!(
        "IRLS did not converge after {} iterations.",
        config.max_iterations
    );
    Ok(IrlsResult {
        coefficients: beta,
        log_likelihood: current,
        iterations: config.max_iterations,
        status: IrlsStatus::MaxIterationsReached,
    })
}
