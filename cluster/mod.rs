//! K-means clustering with seeded initialization, step-by-step runs, and WCSS /
//! silhouette diagnostics.

pub mod diagnostics;
pub mod kmeans;
pub mod points;
pub mod seeding;

pub use diagnostics::{SweepPoint, best_silhouette_k, silhouette_score, sweep, wcss};
pub use kmeans::{
    ClusterError, EmptyClusterPolicy, IterationSnapshot, KMeansConfig, KMeansResult, KMeansRun,
    RunState, Termination, assign, fit, fit_from,
};
pub use points::{ClusterAssignment, PointSet};
pub use seeding::Initialization;
