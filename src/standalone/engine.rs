//! A single-process engine that runs a whole job through the same on-disk
//! contract the distributed runtime uses.
//!
//! Because map execution, partitioning, and reduce execution are the exact
//! functions the worker runtime runs, output here is byte-identical to a
//! distributed run over the same inputs and `n_reduce`. That makes this
//! engine the reference oracle for the cluster.

use std::path::Path;

use anyhow::Result;

use crate::worker::{run_map_task, run_reduce_task};
use crate::Workload;

/// Run every map task sequentially, one per input file in argument order.
pub fn perform_map(dir: &Path, inputs: &[String], engine: &Workload, n_reduce: u32) -> Result<()> {
    for (task_id, input_file) in inputs.iter().enumerate() {
        run_map_task(dir, engine.map_fn, task_id as u32, input_file, n_reduce)?;
    }
    Ok(())
}

/// Run every reduce task sequentially. Call only after [`perform_map`] has
/// published the full intermediate namespace.
pub fn perform_reduce(dir: &Path, engine: &Workload, n_map: u32, n_reduce: u32) -> Result<()> {
    for task_id in 0..n_reduce {
        run_reduce_task(dir, engine.reduce_fn, task_id, n_map)?;
    }
    Ok(())
}

/// Map phase then reduce phase, in this process.
pub fn run_job(dir: &Path, inputs: &[String], engine: &Workload, n_reduce: u32) -> Result<()> {
    perform_map(dir, inputs, engine, n_reduce)?;
    perform_reduce(dir, engine, inputs.len() as u32, n_reduce)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{storage, workload};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn rerunning_a_job_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.txt");
        fs::write(&input, "the quick brown fox the lazy dog the end").unwrap();
        let inputs = vec![input.to_string_lossy().into_owned()];
        let wc = workload::named("wc").unwrap();

        run_job(dir.path(), &inputs, &wc, 3).unwrap();
        let first: Vec<String> = (0..3)
            .map(|r| fs::read_to_string(storage::output_path(dir.path(), r)).unwrap())
            .collect();

        run_job(dir.path(), &inputs, &wc, 3).unwrap();
        let second: Vec<String> = (0..3)
            .map(|r| fs::read_to_string(storage::output_path(dir.path(), r)).unwrap())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn every_key_lands_in_exactly_one_output() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.txt");
        fs::write(&input, "aa bb cc dd").unwrap();
        let inputs = vec![input.to_string_lossy().into_owned()];
        let wc = workload::named("wc").unwrap();

        run_job(dir.path(), &inputs, &wc, 2).unwrap();

        let mut all_keys = Vec::new();
        for r in 0..2u32 {
            let out = fs::read_to_string(storage::output_path(dir.path(), r)).unwrap();
            for line in out.lines() {
                let (key, value) = line.split_once('\t').unwrap();
                assert_eq!(value, "1");
                assert_eq!(crate::ihash(key) % 2, r, "key {} in wrong partition", key);
                all_keys.push(key.to_string());
            }
        }
        all_keys.sort();
        assert_eq!(all_keys, vec!["aa", "bb", "cc", "dd"]);
    }
}
