use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod engine;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a whole job inside this process
    Run {
        /// Glob spec for the input files
        #[arg(short, long)]
        input: String,

        /// Name of the workload
        #[arg(short, long)]
        workload: String,

        /// Number of reduce partitions
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
        n_reduce: u32,

        /// Directory for intermediate and output files
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}
