//! The analysis job file.
//!
//! A job is a TOML document with an optional `seed` and up to three sections:
//!
//! ```toml
//! seed = 7
//!
//! [poisson]
//! response = [2, 0, 3, 1]
//! cross_check = true
//!
//! [[poisson.covariates]]
//! name = "dose"
//! numeric = [0.5, 0.1, 0.9, 0.4]
//!
//! [[poisson.covariates]]
//! name = "site"
//! categorical = ["north", "south", "south", "north"]
//! levels = ["north", "south"]
//!
//! [kmeans]
//! points = [[0.0, 0.0], [0.0, 1.0], [10.0, 0.0], [10.0, 1.0]]
//! k = 2
//! sweep = [1, 3]
//! ```
//!
//! The `[linear]` section has the same shape as `[poisson]`. Columns arrive already
//! clean; every covariate states its type explicitly.

use crate::cluster::{ClusterError, EmptyClusterPolicy, Initialization, KMeansConfig, PointSet};
use crate::glm::{
    Covariate, DesignError, DesignMatrix, EstimationError, EstimatorConfig, ResponseVector,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Failed to read or write file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML job file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Invalid job: {0}")]
    InvalidJob(String),
    #[error("Invalid regression input: {0}")]
    DesignError(#[from] DesignError),
    #[error("Regression failed: {0}")]
    EstimationError(#[from] EstimationError),
    #[error("Clustering failed: {0}")]
    ClusterError(#[from] ClusterError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Job {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poisson: Option<RegressionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<RegressionSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kmeans: Option<KMeansSection>,
}

fn default_intercept() -> bool {
    true
}

/// A regression of `response` on the declared covariates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegressionSection {
    pub response: Vec<f64>,
    #[serde(default = "default_intercept")]
    pub intercept: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    /// Refit with the IRLS reference and report the largest coefficient discrepancy.
    /// Only meaningful for `[poisson]`.
    #[serde(default)]
    pub cross_check: bool,
    #[serde(default)]
    pub covariates: Vec<CovariateSpec>,
}

/// One covariate as written in the job file: `numeric = [...]`, or
/// `categorical = [...]` together with `levels = [...]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CovariateSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categorical: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KMeansSection {
    pub points: Vec<Vec<f64>>,
    pub k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restarts: Option<usize>,
    #[serde(default)]
    pub init: Initialization,
    #[serde(default)]
    pub empty_cluster: EmptyClusterPolicy,
    #[serde(default)]
    pub record_history: bool,
    /// Inclusive `[min, max]` range of k for the WCSS / silhouette sweep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sweep: Option<[usize; 2]>,
}

impl Job {
    /// Loads a job from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, JobError> {
        let toml_string = fs::read_to_string(path)?;
        Self::from_toml(&toml_string)
    }

    pub fn from_toml(toml_string: &str) -> Result<Self, JobError> {
        let job = toml::from_str(toml_string)?;
        Ok(job)
    }

    pub fn to_toml(&self) -> Result<String, JobError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every section without fitting anything.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.poisson.is_none() && self.linear.is_none() && self.kmeans.is_none() {
            return Err(JobError::InvalidJob(
                "the job has no [poisson], [linear] or [kmeans] section".to_string(),
            ));
        }
        if let Some(poisson) = &self.poisson {
            poisson.estimator_config().validate()?;
            let x = poisson.design()?;
            poisson.response_vector()?.check_aligned(&x)?;
        }
        if let Some(linear) = &self.linear {
            linear.estimator_config().validate()?;
            linear.design()?;
            if linear.response.iter().any(|v| !v.is_finite()) {
                return Err(DesignError::NonFinite("response".to_string()).into());
            }
        }
        if let Some(kmeans) = &self.kmeans {
            let points = kmeans.point_set()?;
            let config = kmeans.config(self.seed);
            if config.k == 0 || config.k > points.len() {
                return Err(ClusterError::InvalidK {
                    k: config.k,
                    points: points.len(),
                }
                .into());
            }
            if let Some(range) = kmeans.sweep_range()? {
                if *range.end() > points.len() {
                    return Err(ClusterError::InvalidK {
                        k: *range.end(),
                        points: points.len(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl RegressionSection {
    pub fn design(&self) -> Result<DesignMatrix, JobError> {
        let covariates = self
            .covariates
            .iter()
            .map(CovariateSpec::to_covariate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(DesignMatrix::from_covariates(
            self.response.len(),
            &covariates,
            self.intercept,
        )?)
    }

    pub fn response_vector(&self) -> Result<ResponseVector, JobError> {
        Ok(ResponseVector::new(Array1::from(self.response.clone()))?)
    }

    pub fn estimator_config(&self) -> EstimatorConfig {
        let defaults = EstimatorConfig::default();
        EstimatorConfig {
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
        }
    }
}

impl CovariateSpec {
    pub fn to_covariate(&self) -> Result<Covariate, JobError> {
        match (&self.numeric, &self.categorical, &self.levels) {
            (Some(values), None, None) => Ok(Covariate::numeric(
                self.name.clone(),
                Array1::from(values.clone()),
            )),
            (None, Some(values), Some(levels)) => Ok(Covariate::categorical(
                self.name.clone(),
                values.clone(),
                levels.clone(),
            )),
            (None, Some(_), None) => Err(JobError::InvalidJob(format!(
                "categorical covariate '{}' must declare its levels",
                self.name
            ))),
            (Some(_), _, Some(_)) => Err(JobError::InvalidJob(format!(
                "numeric covariate '{}' cannot declare levels",
                self.name
            ))),
            _ => Err(JobError::InvalidJob(format!(
                "covariate '{}' must have exactly one of `numeric` or `categorical`",
                self.name
            ))),
        }
    }
}

impl KMeansSection {
    pub fn point_set(&self) -> Result<PointSet, JobError> {
        Ok(PointSet::from_rows(&self.points)?)
    }

    /// Clustering settings, with the job-wide seed when one is given.
    pub fn config(&self, seed: Option<u64>) -> KMeansConfig {
        let defaults = KMeansConfig::new(self.k);
        KMeansConfig {
            k: self.k,
            max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
            tolerance: self.tolerance.unwrap_or(defaults.tolerance),
            seed: seed.unwrap_or(defaults.seed),
            restarts: self.restarts.unwrap_or(defaults.restarts),
            init: self.init,
            empty_cluster: self.empty_cluster,
            record_history: self.record_history,
        }
    }

    pub fn sweep_range(&self) -> Result<Option<RangeInclusive<usize>>, JobError> {
        match self.sweep {
            None => Ok(None),
            Some([min, max]) if min >= 1 && min <= max => Ok(Some(min..=max)),
            Some([min, max]) => Err(JobError::InvalidJob(format!(
                "sweep range [{min}, {max}] must satisfy 1 <= min <= max"
            ))),
        }
    }
}
