use approx::assert_abs_diff_eq;
use ndarray::{Array1, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};
use statcore::glm::irls::{IrlsConfig, IrlsStatus, fit_poisson_irls};
use statcore::glm::likelihood::{intercept_only_rate, rate_log_likelihood};
use statcore::glm::{
    Covariate, DesignError, DesignMatrix, EstimationError, EstimatorConfig, ResponseVector,
    estimate,
};

/// Draws `n` observations of `y ~ Poisson(exp(b0 + b1·x))` with `x` uniform on [-1, 1].
fn simulate(n: usize, b0: f64, b1: f64, seed: u64) -> (Array1<f64>, ResponseVector) {
    let mut rng = StdRng::seed_from_u64(seed);
    let x = Array1::from_shape_fn(n, |_| rng.gen_range(-1.0..1.0));
    let y = x.mapv(|xi: f64| {
        let rate = (b0 + b1 * xi).exp();
        Poisson::new(rate).unwrap().sample(&mut rng)
    });
    (x, ResponseVector::new(y).unwrap())
}

#[test]
fn synthetic_counts_recover_generating_coefficients() {
    let (x, y) = simulate(2000, 0.5, 0.8, 17);
    let design = DesignMatrix::from_covariates(2000, &[Covariate::numeric("x", x)], true).unwrap();
    let fit = estimate(&design, &y, None, &EstimatorConfig::default()).unwrap();

    assert_eq!(fit.column_names, vec!["(Intercept)", "x"]);
    assert_abs_diff_eq!(fit.coefficients[0], 0.5, epsilon = 0.1);
    assert_abs_diff_eq!(fit.coefficients[1], 0.8, epsilon = 0.1);
    for se in fit.standard_errors.iter() {
        assert!(*se > 0.0 && *se < 0.1, "unexpected standard error {se}");
    }
    assert!(fit.gradient_norm <= 1e-6);
}

#[test]
fn bfgs_agrees_with_irls_reference() {
    let (x, y) = simulate(300, 1.0, -0.6, 5);
    let groups: Vec<String> = (0..300)
        .map(|i| ["a", "b", "c"][i % 3].to_string())
        .collect();
    let levels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let design = DesignMatrix::from_covariates(
        300,
        &[
            Covariate::numeric("x", x),
            Covariate::categorical("group", groups, levels),
        ],
        true,
    )
    .unwrap();
    assert_eq!(design.ncols(), 4);

    let fit = estimate(&design, &y, None, &EstimatorConfig::default()).unwrap();
    let reference = fit_poisson_irls(&design, &y, &IrlsConfig::default()).unwrap();
    assert_eq!(reference.status, IrlsStatus::Converged);
    for (a, b) in fit.coefficients.iter().zip(reference.coefficients.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
    assert_abs_diff_eq!(fit.log_likelihood, reference.log_likelihood, epsilon = 1e-8);
}

#[test]
fn intercept_only_fit_is_the_sample_mean() {
    let counts = [0, 3, 1, 4, 1, 5, 9, 2, 6];
    let y = ResponseVector::from_counts(&counts).unwrap();
    let design = DesignMatrix::intercept_only(counts.len()).unwrap();
    let fit = estimate(&design, &y, None, &EstimatorConfig::default()).unwrap();

    let mean = intercept_only_rate(y.view());
    assert_abs_diff_eq!(mean, 31.0 / 9.0, epsilon = 1e-12);
    assert_abs_diff_eq!(fit.coefficients[0].exp(), mean, epsilon = 1e-8);
    // Var(log λ̂) = 1 / (n λ̂)
    assert_abs_diff_eq!(
        fit.standard_errors[0],
        (1.0 / (9.0 * mean)).sqrt(),
        epsilon = 1e-6
    );
}

#[test]
fn constant_counts_give_rate_two() {
    let y = ResponseVector::from_counts(&[2, 2, 2, 2]).unwrap();
    let design = DesignMatrix::intercept_only(4).unwrap();
    let fit = estimate(&design, &y, None, &EstimatorConfig::default()).unwrap();
    assert_abs_diff_eq!(fit.coefficients[0].exp(), 2.0, epsilon = 1e-8);

    let rates = fit.predict_rates(&design).unwrap();
    for rate in rates.iter() {
        assert_abs_diff_eq!(*rate, 2.0, epsilon = 1e-8);
    }
}

#[test]
fn likelihood_curve_peaks_at_the_mean() {
    let y = array![1.0, 4.0, 2.0, 3.0];
    let grid: Vec<f64> = (1..=50).map(|i| i as f64 * 0.1).collect();
    let curve = |rate: f64| rate_log_likelihood(y.view(), rate);
    let best = grid
        .iter()
        .copied()
        .max_by(|a, b| curve(*a).total_cmp(&curve(*b)))
        .unwrap();
    assert_abs_diff_eq!(best, 2.5, epsilon = 1e-9);
    assert_eq!(rate_log_likelihood(y.view(), 0.0), f64::NEG_INFINITY);
}

#[test]
fn warm_start_reaches_the_same_optimum() {
    let (x, y) = simulate(200, 0.2, 0.4, 9);
    let design = DesignMatrix::from_covariates(200, &[Covariate::numeric("x", x)], true).unwrap();
    let config = EstimatorConfig::default();
    let cold = estimate(&design, &y, None, &config).unwrap();
    let start = array![1.0, -1.0];
    let warm = estimate(&design, &y, Some(start.view()), &config).unwrap();
    for (a, b) in cold.coefficients.iter().zip(warm.coefficients.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}

#[test]
fn malformed_inputs_are_rejected() {
    assert!(matches!(
        ResponseVector::new(array![1.0, -1.0]),
        Err(DesignError::NegativeResponse { index: 1, .. })
    ));

    let design = DesignMatrix::intercept_only(3).unwrap();
    let y = ResponseVector::from_counts(&[1, 2]).unwrap();
    assert!(matches!(
        estimate(&design, &y, None, &EstimatorConfig::default()),
        Err(EstimationError::InvalidInput(DesignError::RowMismatch { .. }))
    ));

    let levels = vec!["a".to_string(), "b".to_string()];
    let values = vec!["a".to_string(), "z".to_string()];
    assert!(matches!(
        DesignMatrix::from_covariates(2, &[Covariate::categorical("g", values, levels)], true),
        Err(DesignError::UnknownLevel { .. })
    ));
}

#[test]
fn collinear_covariates_are_singular() {
    let x = array![0.1, 0.4, 0.2, 0.9, 0.5, 0.3];
    let design = DesignMatrix::from_covariates(
        6,
        &[
            Covariate::numeric("x", x.clone()),
            Covariate::numeric("twice_x", &x * 2.0),
        ],
        true,
    )
    .unwrap();
    let y = ResponseVector::from_counts(&[1, 2, 1, 4, 2, 1]).unwrap();
    assert!(matches!(
        estimate(&design, &y, None, &EstimatorConfig::default()),
        Err(EstimationError::SingularHessian { .. })
    ));
}
