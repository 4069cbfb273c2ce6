use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Name of the MapReduce application to run (see `workload::try_named`)
    pub app: String,

    /// [OPT] Directory shared with the coordinator
    #[clap(short, long, default_value = ".")]
    pub dir: PathBuf,
}
