use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Number of reduce partitions
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub n_reduce: u32,

    /// Input files, one map task per file, in argument order
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// [OPT] Override the task timeout in milliseconds
    #[clap(short, long)]
    pub timeout_ms: Option<u64>,

    /// [OPT] Directory for the rendezvous file and the mr-* namespace
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
}
