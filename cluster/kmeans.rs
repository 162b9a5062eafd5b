//! Lloyd's algorithm as an explicit state machine.
//!
//! A run moves through `Initialized → Assigning → Updating` and loops between the
//! last two until the centroids stop moving (`Converged`) or the update budget is
//! spent (`MaxIterExceeded`). Both terminal states are normal results.

use crate::cluster::diagnostics;
use crate::cluster::points::{ClusterAssignment, PointSet, squared_distance};
use crate::cluster::seeding::{self, Initialization};
use itertools::Itertools;
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("Invalid clustering input: {0}")]
    InvalidInput(String),

    #[error("Cannot form {k} clusters from {points} points. k must lie between 1 and the number of points.")]
    InvalidK { k: usize, points: usize },

    /// `cluster` is the one-based label.
    #[error("Cluster {cluster} received no points during update {iteration}.")]
    EmptyCluster { cluster: usize, iteration: usize },
}

/// What to do with a centroid that no point is assigned to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyClusterPolicy {
    /// Keep the centroid where it was and log a warning.
    #[default]
    RetainPrevious,
    Fail,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KMeansConfig {
    pub k: usize,
    pub max_iterations: usize,
    /// Convergence threshold on the L1 centroid shift of one update.
    pub tolerance: f64,
    pub seed: u64,
    pub restarts: usize,
    pub init: Initialization,
    pub empty_cluster: EmptyClusterPolicy,
    pub record_history: bool,
}

impl KMeansConfig {
    pub const DEFAULT_SEED: u64 = 42;

    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: 100,
            tolerance: 1e-4,
            seed: Self::DEFAULT_SEED,
            restarts: 1,
            init: Initialization::Random,
            empty_cluster: EmptyClusterPolicy::RetainPrevious,
            record_history: false,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_restarts(mut self, restarts: usize) -> Self {
        self.restarts = restarts;
        self
    }

    pub fn with_init(mut self, init: Initialization) -> Self {
        self.init = init;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_empty_cluster(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster = policy;
        self
    }

    pub fn with_history(mut self, record_history: bool) -> Self {
        self.record_history = record_history;
        self
    }

    fn validate(&self) -> Result<(), ClusterError> {
        if self.max_iterations == 0 {
            return Err(ClusterError::InvalidInput(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ClusterError::InvalidInput(format!(
                "tolerance must be a finite non-negative number, got {}",
                self.tolerance
            )));
        }
        if self.restarts == 0 {
            return Err(ClusterError::InvalidInput(
                "restarts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Initialized,
    Assigning,
    Updating,
    Converged,
    MaxIterExceeded,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Converged | RunState::MaxIterExceeded)
    }
}

/// How a finished run stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    MaxIterExceeded,
}

/// State of the run right after one centroid update.
#[derive(Clone, Debug)]
pub struct IterationSnapshot {
    pub iteration: usize,
    pub centroids: Array2<f64>,
    /// The assignment the centroids were recomputed from.
    pub assignment: ClusterAssignment,
    /// WCSS of that assignment against the updated centroids.
    pub wcss: f64,
    pub shift: f64,
}

#[derive(Clone, Debug)]
pub struct KMeansResult {
    pub centroids: Array2<f64>,
    pub assignment: ClusterAssignment,
    pub termination: Termination,
    pub iterations: usize,
    pub wcss: f64,
    pub history: Vec<IterationSnapshot>,
}

impl KMeansResult {
    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }

    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// One clustering run. Owns its centroid set exclusively.
pub struct KMeansRun<'a> {
    points: &'a PointSet,
    config: &'a KMeansConfig,
    centroids: Array2<f64>,
    assignment: Option<ClusterAssignment>,
    state: RunState,
    iteration: usize,
    history: Vec<IterationSnapshot>,
}

impl<'a> KMeansRun<'a> {
    /// Starts a run from the given centroids. Their row count is the k of the run;
    /// `config.k` is not consulted.
    pub fn new(
        points: &'a PointSet,
        centroids: Array2<f64>,
        config: &'a KMeansConfig,
    ) -> Result<Self, ClusterError> {
        config.validate()?;
        let k = centroids.nrows();
        if k == 0 || k > points.len() {
            return Err(ClusterError::InvalidK {
                k,
                points: points.len(),
            });
        }
        if centroids.ncols() != points.dim() {
            return Err(ClusterError::InvalidInput(format!(
                "centroids have {} columns but points have {}",
                centroids.ncols(),
                points.dim()
            )));
        }
        if centroids.iter().any(|v| !v.is_finite()) {
            return Err(ClusterError::InvalidInput(
                "initial centroids contain non-finite values".to_string(),
            ));
        }
        Ok(Self {
            points,
            config,
            centroids,
            assignment: None,
            state: RunState::Initialized,
            iteration: 0,
            history: Vec::new(),
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn centroids(&self) -> ArrayView2<'_, f64> {
        self.centroids.view()
    }

    /// The current assignment, once the first assignment phase has run.
    pub fn assignment(&self) -> Option<&ClusterAssignment> {
        self.assignment.as_ref()
    }

    /// Number of centroid updates performed so far.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Advances the run by one phase and returns the new state. Terminal states
    /// are absorbing.
    pub fn step(&mut self) -> Result<RunState, ClusterError> {
        self.state = match self.state {
            RunState::Initialized => RunState::Assigning,
            RunState::Assigning => {
                self.assignment = Some(assign(self.points, self.centroids.view()));
                RunState::Updating
            }
            RunState::Updating => {
                let Some(assignment) = self.assignment.as_ref() else {
                    return Err(ClusterError::InvalidInput(
                        "update requested before any assignment".to_string(),
                    ));
                };
                let update = self.iteration + 1;
                let updated = update_centroids(
                    self.points,
                    assignment,
                    self.centroids.view(),
                    self.config.empty_cluster,
                    update,
                )?;
                let shift = l1_shift(self.centroids.view(), updated.view());
                self.centroids = updated;
                self.iteration = update;

                if self.config.record_history {
                    self.history.push(IterationSnapshot {
                        iteration: update,
                        centroids: self.centroids.clone(),
                        assignment: assignment.clone(),
                        wcss: diagnostics::wcss(self.points, self.centroids.view(), assignment),
                        shift,
                    });
                }
                log::debug!("K-means update {}: centroid shift {:.3e}", update, shift);

                if shift <= self.config.tolerance {
                    RunState::Converged
                } else if update >= self.config.max_iterations {
                    RunState::MaxIterExceeded
                } else {
                    RunState::Assigning
                }
            }
            terminal => terminal,
        };
        Ok(self.state)
    }

    /// Drives the run to a terminal state.
    pub fn run(mut self) -> Result<KMeansResult, ClusterError> {
        while !self.state.is_terminal() {
            self.step()?;
        }
        let termination = match self.state {
            RunState::Converged => Termination::Converged,
            _ => {
                log::warn!(
                    "K-means stopped after {} updates without converging.",
                    self.iteration
                );
                Termination::MaxIterExceeded
            }
        };
        let Some(assignment) = self.assignment else {
            return Err(ClusterError::InvalidInput(
                "run finished without an assignment".to_string(),
            ));
        };
        let wcss = diagnostics::wcss(self.points, self.centroids.view(), &assignment);
        Ok(KMeansResult {
            centroids: self.centroids,
            assignment,
            termination,
            iterations: self.iteration,
            wcss,
            history: self.history,
        })
    }
}

/// Index of the nearest centroid. Ties go to the lowest index.
pub fn nearest_centroid(point: ArrayView1<f64>, centroids: ArrayView2<f64>) -> usize {
    centroids
        .rows()
        .into_iter()
        .map(|c| squared_distance(point, c))
        .position_min_by(|a, b| a.total_cmp(b))
        .unwrap_or(0)
}

/// Assigns every point to its nearest centroid.
pub fn assign(points: &PointSet, centroids: ArrayView2<f64>) -> ClusterAssignment {
    let indices = points
        .view()
        .rows()
        .into_iter()
        .map(|p| nearest_centroid(p, centroids))
        .collect();
    // Every index comes from `0..centroids.nrows()`.
    ClusterAssignment::from_trusted(indices, centroids.nrows())
}

fn update_centroids(
    points: &PointSet,
    assignment: &ClusterAssignment,
    previous: ArrayView2<f64>,
    policy: EmptyClusterPolicy,
    iteration: usize,
) -> Result<Array2<f64>, ClusterError> {
    let k = previous.nrows();
    let mut sums = Array2::<f64>::zeros(previous.raw_dim());
    let mut counts = vec![0usize; k];
    for (i, &c) in assignment.indices().iter().enumerate() {
        let mut row = sums.row_mut(c);
        row += &points.point(i);
        counts[c] += 1;
    }

    for (c, &count) in counts.iter().enumerate() {
        if count == 0 {
            match policy {
                EmptyClusterPolicy::RetainPrevious => {
                    log::warn!(
                        "Cluster {} is empty at update {}; keeping its previous centroid.",
                        c + 1,
                        iteration
                    );
                    sums.row_mut(c).assign(&previous.row(c));
                }
                EmptyClusterPolicy::Fail => {
                    return Err(ClusterError::EmptyCluster {
                        cluster: c + 1,
                        iteration,
                    });
                }
            }
        } else {
            sums.row_mut(c).mapv_inplace(|v| v / count as f64);
        }
    }
    Ok(sums)
}

fn l1_shift(old: ArrayView2<f64>, new: ArrayView2<f64>) -> f64 {
    old.iter().zip(new.iter()).map(|(a, b)| (a - b).abs()).sum()
}

/// Clusters `points` into `config.k` groups.
///
/// Runs `config.restarts` independent initializations seeded `seed`, `seed + 1`, …
/// and keeps the one with the lowest final WCSS (the earliest on ties).
pub fn fit(points: &PointSet, config: &KMeansConfig) -> Result<KMeansResult, ClusterError> {
    config.validate()?;
    if config.k == 0 || config.k > points.len() {
        return Err(ClusterError::InvalidK {
            k: config.k,
            points: points.len(),
        });
    }

    let mut best: Option<KMeansResult> = None;
    for restart in 0..config.restarts {
        let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(restart as u64));
        let centroids = seeding::initial_centroids(points, config.k, config.init, &mut rng)?;
        let result = KMeansRun::new(points, centroids, config)?.run()?;
        log::debug!(
            "K-means restart {}: WCSS {:.6} after {} updates",
            restart,
            result.wcss,
            result.iterations
        );
        if best.as_ref().is_none_or(|b| result.wcss < b.wcss) {
            best = Some(result);
        }
    }

    let best = best.ok_or_else(|| ClusterError::InvalidInput("no restarts were run".to_string()))?;
    log::info!(
        "K-means with k = {}: {:?} after {} updates, WCSS {:.6}",
        config.k,
        best.termination,
        best.iterations,
        best.wcss
    );
    Ok(best)
}

/// Runs a single clustering from caller-supplied centroids. `config.seed`,
/// `config.restarts` and `config.init` do not apply.
pub fn fit_from(
    points: &PointSet,
    centroids: Array2<f64>,
    config: &KMeansConfig,
) -> Result<KMeansResult, ClusterError> {
    KMeansRun::new(points, centroids, config)?.run()
}
