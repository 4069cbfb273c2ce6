use anyhow::{ensure, Result};
use clap::Parser;
use glob::glob;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mrfs::standalone::{engine, Args, Commands};
use mrfs::workload;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Run {
            input,
            workload: name,
            n_reduce,
            dir,
        } => {
            let app = workload::named(&name)?;
            // `glob` yields paths in sorted order, so map task ids are
            // stable across runs.
            let inputs: Vec<String> = glob(&input)?
                .flatten()
                .map(|path| path.to_string_lossy().into_owned())
                .collect();
            ensure!(!inputs.is_empty(), "no input files match `{}`", input);

            info!(n_map = inputs.len(), n_reduce, workload = %name, "running standalone job");
            engine::run_job(&dir, &inputs, &app, n_reduce)
        }
    }
}
