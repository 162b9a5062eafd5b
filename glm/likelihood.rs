//! Poisson log-likelihood with a log link.
//!
//! For coefficients `β` the linear predictor is `η = Xβ`, the rate is `λ = exp(η)`
//! and the log-likelihood is
//!
//! ```text
//! ℓ(β) = Σ [ y·η − λ − lnΓ(y + 1) ]
//! ```
//!
//! The `lnΓ(y + 1)` term does not depend on `β`. It is computed once, left out of the
//! optimized objective, and added back whenever `ℓ` itself is reported.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};
use statrs::function::gamma::ln_gamma;

/// Bound applied to `η` before exponentiation. `exp(50)` is far beyond any count rate
/// of interest, and the bound keeps line-search probes finite.
pub const ETA_CLAMP: f64 = 50.0;

/// `Σ lnΓ(yᵢ + 1)`, the coefficient-free part of the log-likelihood.
pub fn log_factorial_sum(y: ArrayView1<f64>) -> f64 {
    y.iter().map(|&yi| ln_gamma(yi + 1.0)).sum()
}

/// Maximum-likelihood rate of the intercept-only model: the sample mean.
pub fn intercept_only_rate(y: ArrayView1<f64>) -> f64 {
    y.mean().unwrap_or(0.0)
}

/// Log-likelihood of the counts under one common rate. Non-positive rates have
/// likelihood zero unless every count is zero.
pub fn rate_log_likelihood(y: ArrayView1<f64>, rate: f64) -> f64 {
    let total: f64 = y.sum();
    let n = y.len() as f64;
    if rate <= 0.0 {
        return if total == 0.0 { 0.0 } else { f64::NEG_INFINITY };
    }
    total * rate.ln() - n * rate - log_factorial_sum(y)
}

/// The Poisson likelihood of a fixed design and response.
pub struct PoissonLikelihood<'a> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    log_factorial_sum: f64,
}

impl<'a> PoissonLikelihood<'a> {
    pub fn new(x: ArrayView2<'a, f64>, y: ArrayView1<'a, f64>) -> Self {
        Self {
            x,
            y,
            log_factorial_sum: log_factorial_sum(y),
        }
    }

    /// Linear predictor `Xβ`, clamped to `±ETA_CLAMP`.
    pub fn linear_predictor(&self, beta: ArrayView1<f64>) -> Array1<f64> {
        self.x.dot(&beta).mapv(|e| e.clamp(-ETA_CLAMP, ETA_CLAMP))
    }

    pub fn rates(&self, beta: ArrayView1<f64>) -> Array1<f64> {
        self.linear_predictor(beta).mapv(f64::exp)
    }

    /// `Σ [λ − y·η]`: the negative log-likelihood without its constant term.
    pub fn objective(&self, beta: ArrayView1<f64>) -> f64 {
        let eta = self.linear_predictor(beta);
        let rates = eta.mapv(f64::exp);
        self.objective_from(&eta, &rates)
    }

    /// Full log-likelihood, `lnΓ(y + 1)` included.
    pub fn log_likelihood(&self, beta: ArrayView1<f64>) -> f64 {
        -self.objective(beta) - self.log_factorial_sum
    }

    /// Gradient of `objective`: `Xᵀ(λ − y)`.
    pub fn gradient(&self, beta: ArrayView1<f64>) -> Array1<f64> {
        self.gradient_from(&self.rates(beta))
    }

    /// Objective and gradient from a single pass over `η`.
    pub fn objective_and_gradient(&self, beta: ArrayView1<f64>) -> (f64, Array1<f64>) {
        let eta = self.linear_predictor(beta);
        let rates = eta.mapv(f64::exp);
        (self.objective_from(&eta, &rates), self.gradient_from(&rates))
    }

    fn objective_from(&self, eta: &Array1<f64>, rates: &Array1<f64>) -> f64 {
        Zip::from(eta)
            .and(rates)
            .and(&self.y)
            .fold(0.0, |acc, &e, &r, &yi| acc + r - yi * e)
    }

    fn gradient_from(&self, rates: &Array1<f64>) -> Array1<f64> {
        let residual = rates - &self.y;
        self.x.t().dot(&residual)
    }

    /// Observed information `XᵀΛX`, the negative Hessian of the log-likelihood.
    /// With the canonical log link it equals the expected information.
    pub fn information(&self, beta: ArrayView1<f64>) -> Array2<f64> {
        let rates = self.rates(beta);
        let weighted = &self.x * &rates.view().insert_axis(Axis(1));
        self.x.t().dot(&weighted)
    }
}
