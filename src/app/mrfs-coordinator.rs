use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mrfs::cmd::coordinator::Args;
use mrfs::config::Config;
use mrfs::coordinator::{self, CoordinatorService};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    for input in &args.inputs {
        ensure!(
            Path::new(input).is_file(),
            "input file not found: {}",
            input
        );
    }

    let config = Config::from_env().with_task_timeout_ms(args.timeout_ms);
    info!(
        n_map = args.inputs.len(),
        n_reduce = args.n_reduce,
        "starting job"
    );

    let service = Arc::new(CoordinatorService::new(args.inputs, args.n_reduce, config)?);
    coordinator::run(service, &args.dir).await
}
