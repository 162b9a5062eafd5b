#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use statcore::{Job, Report, run_job};

#[derive(Parser)]
#[command(
    name = "statcore",
    version,
    about = "Poisson regression and K-means clustering from TOML analysis jobs",
    long_about = "Runs the sections of an analysis job (Poisson maximum-likelihood regression, \
                 least squares, K-means clustering with WCSS/silhouette sweeps) and writes a TOML report."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every section of a job
    Run {
        /// Path to the job file (.toml)
        job: PathBuf,

        /// Write the report here instead of printing it
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check a job file without fitting anything
    Validate {
        /// Path to the job file (.toml)
        job: PathBuf,
    },
}

fn run(job_path: PathBuf, output: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    log::info!("Loading job from {}", job_path.display());
    let job = Job::load(&job_path)?;
    let report = run_job(&job)?;
    print_summary(&report);

    match output {
        Some(path) => {
            report.save(&path)?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", report.to_toml()?),
    }
    Ok(())
}

fn validate(job_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let job = Job::load(&job_path)?;
    job.validate()?;
    println!("{} is a valid job.", job_path.display());
    Ok(())
}

fn print_summary(report: &Report) {
    if let Some(poisson) = &report.poisson {
        eprintln!(
            "Poisson regression: {} observations, log-likelihood {:.4}",
            poisson.observations, poisson.log_likelihood
        );
        for row in &poisson.coefficients {
            eprintln!(
                "  {:<24} {:>12.6} {:>12.6} {:>9.3}",
                row.name, row.estimate, row.std_error, row.z_value
            );
        }
    }
    if let Some(linear) = &report.linear {
        eprintln!(
            "Linear regression: {} observations, R² {:.4}",
            linear.observations, linear.r_squared
        );
    }
    if let Some(kmeans) = &report.kmeans {
        eprintln!(
            "K-means: k = {}, {:?} after {} iterations, WCSS {:.6}",
            kmeans.k, kmeans.termination, kmeans.iterations, kmeans.wcss
        );
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run { job, output } => run(job, output),
        Commands::Validate { job } => validate(job),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
