//! # Design Matrix and Response Construction
//!
//! Regression inputs enter the estimators through two validated containers:
//!
//! - `DesignMatrix`: the covariate matrix `X`, one row per observation and one named
//!   column per coefficient. It is immutable once built.
//! - `ResponseVector`: the observed counts `y`, finite and non-negative.
//!
//! Column types are never inferred. The caller declares every covariate as either
//! numeric or categorical (with an explicit level list whose first entry is the
//! baseline), and `DesignMatrix::from_covariates` expands categorical covariates into
//! indicator columns named `name[level]`.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use std::collections::HashSet;
use thiserror::Error;

/// Name given to the column of ones when an intercept is requested.
pub const INTERCEPT_NAME: &str = "(Intercept)";

/// Validation failures for design matrices and response vectors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DesignError {
    #[error("The design matrix has no rows.")]
    NoObservations,

    #[error("The design matrix has no columns. Request an intercept or supply a covariate.")]
    NoColumns,

    #[error("The design matrix has {columns} columns but {names} column names were supplied.")]
    NameCountMismatch { columns: usize, names: usize },

    #[error("Covariate '{name}' has {found} values, but {expected} observations were expected.")]
    LengthMismatch {
        name: String,
        found: usize,
        expected: usize,
    },

    #[error(
        "The design matrix has {design_rows} rows, but the response vector has {response_len} entries."
    )]
    RowMismatch {
        design_rows: usize,
        response_len: usize,
    },

    #[error(
        "{observations} observations cannot support {coefficients} coefficients and a residual variance."
    )]
    TooFewObservations {
        observations: usize,
        coefficients: usize,
    },

    #[error("Non-finite values (NaN or Infinity) were found in '{0}'.")]
    NonFinite(String),

    #[error("The response vector holds a negative count ({value}) at observation {index}.")]
    NegativeResponse { index: usize, value: f64 },

    #[error("Categorical covariate '{0}' declares no levels.")]
    NoLevels(String),

    #[error("Categorical covariate '{name}' declares the level '{level}' more than once.")]
    DuplicateLevel { name: String, level: String },

    #[error("Value '{value}' of categorical covariate '{name}' is not one of its declared levels.")]
    UnknownLevel { name: String, value: String },

    #[error(
        "The initial coefficient vector has {found} entries, but the design matrix has {expected} columns."
    )]
    InitialLength { found: usize, expected: usize },

    #[error("The design matrix has {found} columns, but the fit has {expected} coefficients.")]
    ColumnMismatch { found: usize, expected: usize },

    #[error("Invalid optimizer setting: {0}")]
    InvalidSetting(String),
}

/// The values of one covariate, with its type declared up front.
#[derive(Debug, Clone)]
pub enum CovariateValues {
    /// A numeric covariate, copied into the design matrix unchanged.
    Numeric(Array1<f64>),
    /// A categorical covariate. `levels[0]` is the baseline; each further level gets
    /// an indicator column.
    Categorical {
        values: Vec<String>,
        levels: Vec<String>,
    },
}

/// One named covariate of the regression schema.
#[derive(Debug, Clone)]
pub struct Covariate {
    pub name: String,
    pub values: CovariateValues,
}

impl Covariate {
    pub fn numeric(name: impl Into<String>, values: Array1<f64>) -> Self {
        Self {
            name: name.into(),
            values: CovariateValues::Numeric(values),
        }
    }

    pub fn categorical(name: impl Into<String>, values: Vec<String>, levels: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values: CovariateValues::Categorical { values, levels },
        }
    }

    fn len(&self) -> usize {
        match &self.values {
            CovariateValues::Numeric(values) => values.len(),
            CovariateValues::Categorical { values, .. } => values.len(),
        }
    }
}

/// The covariate matrix `X` together with one name per column.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    x: Array2<f64>,
    column_names: Vec<String>,
}

impl DesignMatrix {
    /// Wraps an already-assembled matrix.
    pub fn new(x: Array2<f64>, column_names: Vec<String>) -> Result<Self, DesignError> {
        if x.nrows() == 0 {
            return Err(DesignError::NoObservations);
        }
        if x.ncols() == 0 {
            return Err(DesignError::NoColumns);
        }
        if column_names.len() != x.ncols() {
            return Err(DesignError::NameCountMismatch {
                columns: x.ncols(),
                names: column_names.len(),
            });
        }
        if let Some((j, _)) = x
            .columns()
            .into_iter()
            .enumerate()
            .find(|(_, col)| col.iter().any(|v| !v.is_finite()))
        {
            return Err(DesignError::NonFinite(column_names[j].clone()));
        }
        Ok(Self { x, column_names })
    }

    /// A design with only an intercept column, the single-parameter model.
    pub fn intercept_only(n_obs: usize) -> Result<Self, DesignError> {
        Self::new(
            Array2::ones((n_obs, 1)),
            vec![INTERCEPT_NAME.to_string()],
        )
    }

    /// Builds `X` from an explicit covariate schema.
    ///
    /// Columns appear in schema order, preceded by the intercept when requested.
    /// Categorical covariates contribute one indicator column per non-baseline level.
    pub fn from_covariates(
        n_obs: usize,
        covariates: &[Covariate],
        intercept: bool,
    ) -> Result<Self, DesignError> {
        if n_obs == 0 {
            return Err(DesignError::NoObservations);
        }

        let mut columns: Vec<Array1<f64>> = Vec::new();
        let mut names: Vec<String> = Vec::new();

        if intercept {
            columns.push(Array1::ones(n_obs));
            names.push(INTERCEPT_NAME.to_string());
        }

        for covariate in covariates {
            if covariate.len() != n_obs {
                return Err(DesignError::LengthMismatch {
                    name: covariate.name.clone(),
                    found: covariate.len(),
                    expected: n_obs,
                });
            }
            match &covariate.values {
                CovariateValues::Numeric(values) => {
                    if values.iter().any(|v| !v.is_finite()) {
                        return Err(DesignError::NonFinite(covariate.name.clone()));
                    }
                    columns.push(values.clone());
                    names.push(covariate.name.clone());
                }
                CovariateValues::Categorical { values, levels } => {
                    let indicators = expand_indicators(&covariate.name, values, levels)?;
                    for (level, column) in levels.iter().skip(1).zip(indicators) {
                        columns.push(column);
                        names.push(format!("{}[{}]", covariate.name, level));
                    }
                }
            }
        }

        if columns.is_empty() {
            return Err(DesignError::NoColumns);
        }

        let mut x = Array2::zeros((n_obs, columns.len()));
        for (j, column) in columns.iter().enumerate() {
            x.column_mut(j).assign(column);
        }
        Self::new(x, names)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn nrows(&self) -> usize {
        self.x.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.x.ncols()
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }
}

/// Turns a categorical column into one indicator vector per non-baseline level.
fn expand_indicators(
    name: &str,
    values: &[String],
    levels: &[String],
) -> Result<Vec<Array1<f64>>, DesignError> {
    if levels.is_empty() {
        return Err(DesignError::NoLevels(name.to_string()));
    }
    let mut seen = HashSet::new();
    for level in levels {
        if !seen.insert(level.as_str()) {
            return Err(DesignError::DuplicateLevel {
                name: name.to_string(),
                level: level.clone(),
            });
        }
    }

    let mut indicators = vec![Array1::zeros(values.len()); levels.len() - 1];
    for (i, value) in values.iter().enumerate() {
        let level_index = levels.iter().position(|l| l == value).ok_or_else(|| {
            DesignError::UnknownLevel {
                name: name.to_string(),
                value: value.clone(),
            }
        })?;
        if level_index > 0 {
            indicators[level_index - 1][i] = 1.0;
        }
    }
    Ok(indicators)
}

/// Observed counts `y`. Entries are finite and non-negative; non-integer values are
/// accepted and treated with the continuous extension `lnΓ(y + 1)`.
#[derive(Debug, Clone)]
pub struct ResponseVector {
    y: Array1<f64>,
}

impl ResponseVector {
    pub fn new(y: Array1<f64>) -> Result<Self, DesignError> {
        if y.is_empty() {
            return Err(DesignError::NoObservations);
        }
        for (index, &value) in y.iter().enumerate() {
            if !value.is_finite() {
                return Err(DesignError::NonFinite("response".to_string()));
            }
            if value < 0.0 {
                return Err(DesignError::NegativeResponse { index, value });
            }
        }
        Ok(Self { y })
    }

    pub fn from_counts(counts: &[u64]) -> Result<Self, DesignError> {
        Self::new(counts.iter().map(|&c| c as f64).collect())
    }

    pub fn view(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Checks that `x` and `y` describe the same observations.
    pub fn check_aligned(&self, x: &DesignMatrix) -> Result<(), DesignError> {
        if x.nrows() != self.len() {
            return Err(DesignError::RowMismatch {
                design_rows: x.nrows(),
                response_len: self.len(),
            });
        }
        Ok(())
    }
}
