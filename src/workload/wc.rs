//! A MapReduce-compatible implementation of word count.
//!

use crate::{KeyValue, MapOutput};
use anyhow::Result;

pub fn map(_filename: &str, contents: &str) -> MapOutput {
    let pairs = contents
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| KeyValue::new(word.to_lowercase(), "1"))
        .collect();
    Ok(pairs)
}

pub fn reduce(_key: &str, values: Vec<String>) -> Result<String> {
    // Every value is "1"; the count is the number of occurrences.
    Ok(values.len().to_string())
}
