//! Poisson maximum-likelihood regression and K-means clustering, driven by TOML
//! analysis jobs.
//!
//! `glm` and `cluster` are independent numerical components. `job` and `report`
//! wire them to the file formats used by the `statcore` binary.

#![deny(dead_code)]
#![deny(unused_imports)]

#[path = "../glm/mod.rs"]
pub mod glm;

#[path = "../cluster/mod.rs"]
pub mod cluster;

pub mod job;
pub mod report;

pub use job::{Job, JobError};
pub use report::{Report, run_job};
