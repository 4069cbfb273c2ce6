//! A MapReduce-compatible inverted index: word -> files containing it.
//!

use crate::{KeyValue, MapOutput};
use anyhow::Result;
use itertools::Itertools;

pub fn map(filename: &str, contents: &str) -> MapOutput {
    let pairs = contents
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| KeyValue::new(word.to_lowercase(), filename))
        .collect();
    Ok(pairs)
}

pub fn reduce(_key: &str, values: Vec<String>) -> Result<String> {
    let files = values.into_iter().sorted().dedup().join(",");
    Ok(files)
}
