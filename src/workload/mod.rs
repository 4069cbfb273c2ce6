//! Converts MapReduce application names to actual application code.
//!
//! # Example
//!
//! To get the word count application:
//! ```
//! # use anyhow::Result;
//! // This is the correct import to use if you are outside the crate:
//! use mrfs::workload;
//! // Since you will be working within the `mrfs` crate,
//! // you should write `use crate::workload;` instead.
//! # fn main() -> Result<()> {
//! let wc = workload::named("wc")?;
//! # Ok(())
//! # }
//! ```

use crate::Workload;
use anyhow::{bail, Result};

pub mod indexer;
pub mod wc;

/// Gets the [`Workload`] named `name`.
///
/// Returns [`None`] if no application with the given name was found.
pub fn try_named(name: &str) -> Option<Workload> {
    match name {
        "wc" => Some(Workload {
            map_fn: wc::map,
            reduce_fn: wc::reduce,
        }),
        "indexer" => Some(Workload {
            map_fn: indexer::map,
            reduce_fn: indexer::reduce,
        }),
        _ => None,
    }
}

/// Gets the [`Workload`] named `name`.
///
/// Returns an [`anyhow::Error`] if no application with the given name was found.
pub fn named(name: &str) -> Result<Workload> {
    match try_named(name) {
        Some(app) => Ok(app),
        None => bail!("No app named `{}` found.", name),
    }
}
