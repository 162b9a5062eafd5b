//! Ordinary least squares in closed form.
//!
//! `β = (XᵀX)⁻¹ Xᵀy`, with residual variance `σ² = RSS / (n − p)` and standard
//! errors `sqrt(σ² diag((XᵀX)⁻¹))`.

use crate::glm::design::{DesignError, DesignMatrix};
use crate::glm::estimate::{CoefficientRow, EstimationError, coefficient_table};
use crate::glm::information;
use ndarray::{Array1, ArrayView1};
use ndarray_linalg::Solve;

#[derive(Debug, Clone)]
pub struct LinearFit {
    pub column_names: Vec<String>,
    pub coefficients: Array1<f64>,
    pub standard_errors: Array1<f64>,
    pub residual_std_error: f64,
    pub r_squared: f64,
    pub degrees_of_freedom: usize,
}

impl LinearFit {
    pub fn coefficient_table(&self) -> Vec<CoefficientRow> {
        coefficient_table(
            &self.column_names,
            self.coefficients.view(),
            self.standard_errors.view(),
        )
    }
}

/// Fits `y = Xβ + ε` by least squares.
///
/// Requires more observations than columns. A rank-deficient `X` fails with
/// `SingularHessian`, since `XᵀX` plays the role of the information matrix.
pub fn fit_ols(x: &DesignMatrix, y: ArrayView1<f64>) -> Result<LinearFit, EstimationError> {
    let (n, p) = (x.nrows(), x.ncols());
    if y.len() != n {
        return Err(DesignError::RowMismatch {
            design_rows: n,
            response_len: y.len(),
        }
        .into());
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(DesignError::NonFinite("response".to_string()).into());
    }
    if n <= p {
        return Err(DesignError::TooFewObservations {
            observations: n,
            coefficients: p,
        }
        .into());
    }

    let xv = x.view();
    let xtx = xv.t().dot(&xv);
    let xty = xv.t().dot(&y);

    let covariance_unscaled = information::invert_information(&xtx)?;
    let coefficients = xtx.solve(&xty)?;

    let residuals = &y - &xv.dot(&coefficients);
    let rss = residuals.dot(&residuals);
    let degrees_of_freedom = n - p;
    let sigma2 = rss / degrees_of_freedom as f64;

    let mean = y.mean().unwrap_or(0.0);
    let tss = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 1.0 };

    let standard_errors = information::standard_errors(&(covariance_unscaled * sigma2));

    log::info!(
        "OLS fit: {} observations, {} coefficients, R² = {:.4}",
        n,
        p,
        r_squared
    );

    Ok(LinearFit {
        column_names: x.column_names().to_vec(),
        coefficients,
        standard_errors,
        residual_std_error: sigma2.sqrt(),
        r_squared,
        degrees_of_freedom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn line_design() -> DesignMatrix {
        DesignMatrix::new(
            array![[1.0, 0.0], [1.0, 1.0], [1.0, 2.0], [1.0, 3.0]],
            vec!["(Intercept)".to_string(), "x".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn exact_line_is_recovered() {
        let y = array![1.0, 3.0, 5.0, 7.0];
        let fit = fit_ols(&line_design(), y.view()).unwrap();
        assert_abs_diff_eq!(fit.coefficients[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.coefficients[1], 2.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.r_squared, 1.0, epsilon = 1e-10);
        assert_eq!(fit.degrees_of_freedom, 2);
    }

    #[test]
    fn standard_errors_match_textbook_formula() {
        // y = 1 + 2x perturbed by (0.1, -0.2, 0.2, -0.1)
        let y = array![1.1, 2.8, 5.2, 6.9];
        let fit = fit_ols(&line_design(), y.view()).unwrap();

        let residuals = &y - &line_design().view().dot(&fit.coefficients);
        let sigma2 = residuals.dot(&residuals) / 2.0;
        // Sxx = 5, mean x = 1.5
        assert_abs_diff_eq!(fit.standard_errors[1], (sigma2 / 5.0).sqrt(), epsilon = 1e-10);
        assert_abs_diff_eq!(
            fit.standard_errors[0],
            (sigma2 * (0.25 + 1.5 * 1.5 / 5.0)).sqrt(),
            epsilon = 1e-10
        );
        assert_eq!(fit.coefficient_table()[1].name, "x");
    }

    #[test]
    fn too_few_observations_is_invalid() {
        let x = DesignMatrix::new(
            array![[1.0, 0.0], [1.0, 1.0]],
            vec!["a".to_string(), "b".to_string()],
        )
        .unwrap();
        assert!(matches!(
            fit_ols(&x, array![1.0, 2.0].view()),
            Err(EstimationError::InvalidInput(
                DesignError::TooFewObservations { .. }
            ))
        ));
    }
}
