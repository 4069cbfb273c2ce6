use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mrfs::cmd::worker::Args;
use mrfs::config::Config;
use mrfs::worker::Worker;
use mrfs::workload;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let app = workload::named(&args.app)?;
    let config = Config::from_env();

    let worker = Worker::new(app, args.dir, config);
    worker.run().await
}
