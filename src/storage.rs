//! The on-disk data plane shared by every process in a job.
//!
//! Intermediate files are named `mr-{m}-{r}` and hold one JSON
//! `{"key":…,"value":…}` record per line; output files are named
//! `mr-out-{r}` and hold `{key}\t{value}` lines. Writers always produce a
//! `.tmp` sibling first and publish it with an atomic rename, so readers
//! only ever see complete files under the final names.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::KeyValue;

/// Suffix for unpublished files.
pub const TMP_SUFFIX: &str = ".tmp";

/// Rendezvous file the coordinator writes its `host:port` line into.
pub const COORDINATOR_INFO_FILE: &str = "coordinator_info.txt";

/// Path of the intermediate file written by map task `m` for partition `r`.
pub fn intermediate_path(dir: &Path, map_id: u32, reduce_id: u32) -> PathBuf {
    dir.join(format!("mr-{}-{}", map_id, reduce_id))
}

/// Path of the final output file for reduce partition `r`.
pub fn output_path(dir: &Path, reduce_id: u32) -> PathBuf {
    dir.join(format!("mr-out-{}", reduce_id))
}

/// Write `records` as newline-delimited JSON to `path` plus the `.tmp`
/// suffix, then atomically rename into place. An empty `records` slice
/// still publishes an (empty) file.
pub fn publish_records(path: &Path, records: &[KeyValue]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("publishing {}", path.display()))
}

/// Read every record from a published intermediate file.
///
/// A missing file is an error here: by the time a reduce task runs, every
/// map task it depends on has completed, so the file must exist.
pub fn read_records(path: &Path) -> Result<Vec<KeyValue>> {
    let file = File::open(path)
        .with_context(|| format!("opening intermediate file {}", path.display()))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let record: KeyValue = serde_json::from_str(&line)
            .with_context(|| format!("malformed record in {}", path.display()))?;
        records.push(record);
    }
    Ok(records)
}

/// Write `{key}\t{value}` lines to `path` plus the `.tmp` suffix, then
/// atomically rename into place.
pub fn publish_output(path: &Path, lines: &[(String, String)]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let file = File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        let mut writer = BufWriter::new(file);
        for (key, value) in lines {
            writeln!(writer, "{}\t{}", key, value)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("publishing {}", path.display()))
}

/// Record the coordinator endpoint for workers to find.
pub fn write_coordinator_info(dir: &Path, addr: &str) -> Result<()> {
    let path = dir.join(COORDINATOR_INFO_FILE);
    fs::write(&path, format!("{}\n", addr))
        .with_context(|| format!("writing {}", path.display()))
}

/// Read the coordinator endpoint, if the rendezvous file exists yet.
pub fn read_coordinator_info(dir: &Path) -> Result<String> {
    let path = dir.join(COORDINATOR_INFO_FILE);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(contents.trim().to_string())
}

/// Remove the rendezvous file on clean shutdown. Already-gone is fine.
pub fn remove_coordinator_info(dir: &Path) {
    let _ = fs::remove_file(dir.join(COORDINATOR_INFO_FILE));
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TMP_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn records_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = intermediate_path(dir.path(), 0, 1);
        let records = vec![
            KeyValue::new("hello", "1"),
            KeyValue::new("world", "1"),
            KeyValue::new("hello", "1"),
        ];
        publish_records(&path, &records).unwrap();
        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn empty_partition_publishes_an_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = intermediate_path(dir.path(), 3, 0);
        publish_records(&path, &[]).unwrap();
        assert!(path.exists());
        assert_eq!(read_records(&path).unwrap(), Vec::new());
    }

    #[test]
    fn publish_leaves_no_tmp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = output_path(dir.path(), 0);
        publish_output(&path, &[("x".into(), "10".into())]).unwrap();
        assert!(path.exists());
        assert!(!tmp_path(&path).exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), "x\t10\n");
    }

    #[test]
    fn reading_a_missing_intermediate_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = intermediate_path(dir.path(), 9, 9);
        assert!(read_records(&path).is_err());
    }

    #[test]
    fn coordinator_info_round_trip() {
        let dir = TempDir::new().unwrap();
        write_coordinator_info(dir.path(), "127.0.0.1:4000").unwrap();
        assert_eq!(
            read_coordinator_info(dir.path()).unwrap(),
            "127.0.0.1:4000"
        );
        remove_coordinator_info(dir.path());
        assert!(read_coordinator_info(dir.path()).is_err());
        // Removing twice is harmless.
        remove_coordinator_info(dir.path());
    }
}
