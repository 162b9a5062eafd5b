//! Running a job and the TOML report it produces.

use crate::cluster::{self, KMeansResult, SweepPoint, Termination, diagnostics};
use crate::glm::estimate::{self, CoefficientRow};
use crate::glm::irls::{self, IrlsConfig, IrlsStatus};
use crate::glm::linear;
use crate::job::{Job, JobError, KMeansSection, RegressionSection};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poisson: Option<PoissonReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<LinearReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kmeans: Option<KMeansReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoissonReport {
    pub observations: usize,
    pub log_likelihood: f64,
    pub iterations: usize,
    pub gradient_norm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_check: Option<CrossCheck>,
    pub coefficients: Vec<CoefficientRow>,
}

/// Agreement between the BFGS estimate and the IRLS reference fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCheck {
    pub irls_converged: bool,
    pub irls_iterations: usize,
    pub max_abs_difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearReport {
    pub observations: usize,
    pub degrees_of_freedom: usize,
    pub residual_std_error: f64,
    pub r_squared: f64,
    pub coefficients: Vec<CoefficientRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansReport {
    pub k: usize,
    pub termination: Termination,
    pub iterations: usize,
    pub wcss: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silhouette: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_silhouette_k: Option<usize>,
    pub centroids: Vec<Vec<f64>>,
    /// One-based cluster label of every point.
    pub labels: Vec<usize>,
    pub cluster_sizes: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<IterationReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sweep: Vec<SweepPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub iteration: usize,
    pub wcss: f64,
    pub shift: f64,
    pub centroids: Vec<Vec<f64>>,
    pub labels: Vec<usize>,
}

impl Report {
    pub fn to_toml(&self) -> Result<String, JobError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn from_toml(toml_string: &str) -> Result<Self, JobError> {
        Ok(toml::from_str(toml_string)?)
    }

    /// Writes the report to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), JobError> {
        let toml_string = self.to_toml()?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Runs every section present in the job.
pub fn run_job(job: &Job) -> Result<Report, JobError> {
    job.validate()?;
    let mut report = Report::default();
    if let Some(section) = &job.poisson {
        report.poisson = Some(run_poisson(section)?);
    }
    if let Some(section) = &job.linear {
        report.linear = Some(run_linear(section)?);
    }
    if let Some(section) = &job.kmeans {
        report.kmeans = Some(run_kmeans(section, job.seed)?);
    }
    Ok(report)
}

fn run_poisson(section: &RegressionSection) -> Result<PoissonReport, JobError> {
    let x = section.design()?;
    let y = section.response_vector()?;
    let fit = estimate::estimate(&x, &y, None, &section.estimator_config())?;

    let cross_check = if section.cross_check {
        let reference = irls::fit_poisson_irls(&x, &y, &IrlsConfig::default())?;
        let max_abs_difference = fit
            .coefficients
            .iter()
            .zip(reference.coefficients.iter())
            .fold(0.0_f64, |m, (a, b)| m.max((a - b).abs()));
        log::info!(
            "IRLS cross-check: largest coefficient difference {:.3e}",
            max_abs_difference
        );
        Some(CrossCheck {
            irls_converged: reference.status == IrlsStatus::Converged,
            irls_iterations: reference.iterations,
            max_abs_difference,
        })
    } else {
        None
    };

    Ok(PoissonReport {
        observations: x.nrows(),
        log_likelihood: fit.log_likelihood,
        iterations: fit.iterations,
        gradient_norm: fit.gradient_norm,
        cross_check,
        coefficients: fit.coefficient_table(),
    })
}

fn run_linear(section: &RegressionSection) -> Result<LinearReport, JobError> {
    let x = section.design()?;
    let y = ndarray::Array1::from(section.response.clone());
    let fit = linear::fit_ols(&x, y.view())?;
    Ok(LinearReport {
        observations: x.nrows(),
        degrees_of_freedom: fit.degrees_of_freedom,
        residual_std_error: fit.residual_std_error,
        r_squared: fit.r_squared,
        coefficients: fit.coefficient_table(),
    })
}

fn run_kmeans(section: &KMeansSection, seed: Option<u64>) -> Result<KMeansReport, JobError> {
    let points = section.point_set()?;
    let config = section.config(seed);
    let result = cluster::fit(&points, &config)?;

    let sweep = match section.sweep_range()? {
        Some(range) => diagnostics::sweep(&points, range, &config)?,
        None => Vec::new(),
    };

    Ok(KMeansReport {
        k: result.k(),
        termination: result.termination,
        iterations: result.iterations,
        wcss: result.wcss,
        silhouette: diagnostics::silhouette_score(&points, &result.assignment),
        best_silhouette_k: diagnostics::best_silhouette_k(&sweep),
        centroids: rows(&result.centroids),
        labels: result.assignment.labels(),
        cluster_sizes: result.assignment.cluster_sizes(),
        history: history_rows(&result),
        sweep,
    })
}

fn history_rows(result: &KMeansResult) -> Vec<IterationReport> {
    result
        .history
        .iter()
        .map(|snapshot| IterationReport {
            iteration: snapshot.iteration,
            wcss: snapshot.wcss,
            shift: snapshot.shift,
            centroids: rows(&snapshot.centroids),
            labels: snapshot.assignment.labels(),
        })
        .collect()
}

fn rows(matrix: &Array2<f64>) -> Vec<Vec<f64>> {
    matrix.rows().into_iter().map(|row| row.to_vec()).collect()
}
