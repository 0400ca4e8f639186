use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Train, test and run estimators over chunked datasets.
#[derive(Parser, Debug)]
#[command(name = "mlswarm", about = "Train, test and run estimators over chunked datasets")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered parser and estimator services with their properties
    Services {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create the datasets, estimators and tasks of a TOML manifest and run the tasks in order
    Run {
        /// Path to the job manifest
        manifest: PathBuf,

        /// Root directory for training report directories (overrides REPORTS_DIR)
        #[arg(long, env = "REPORTS_DIR")]
        reports_dir: Option<PathBuf>,

        /// Worker threads for task execution (0 = available parallelism)
        #[arg(long, env = "WORKER_THREADS")]
        workers: Option<usize>,

        /// Print each final task record as JSON
        #[arg(long)]
        json: bool,
    },
}
