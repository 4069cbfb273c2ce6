//! The worker runtime.
//!
//! A worker is stateless: it invents a fresh id at startup, finds the
//! coordinator through the rendezvous file, then loops requesting work and
//! executing it until it is told to exit. Everything a task produces is
//! published by atomic rename, so a worker can die at any point and leave
//! nothing half-visible behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use dashmap::DashMap;
use itertools::Itertools;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::rpc::{client, CompleteTaskAck, CompleteTaskParams, Request, TaskKind, TaskReply};
use crate::storage;
use crate::{ihash, KeyValue, MapFn, ReduceFn, Workload};

// types related to map-side partitioning
type BucketIndex = u32;
type Buckets = DashMap<BucketIndex, Vec<KeyValue>>;

/// Attempts to find the rendezvous file before giving up; covers a
/// coordinator that is still starting.
const RENDEZVOUS_ATTEMPTS: u32 = 20;

pub struct Worker {
    id: String,
    workload: Workload,
    dir: PathBuf,
    config: Config,
}

impl Worker {
    pub fn new(workload: Workload, dir: PathBuf, config: Config) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workload,
            dir,
            config,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Main loop: request, execute, report; sleep on `WAIT`; return cleanly
    /// on `EXIT`. A task failure is reported, not fatal; the coordinator
    /// decides what happens to the task next.
    pub async fn run(&self) -> Result<()> {
        let addr = self.find_coordinator().await?;
        info!(worker = %self.id, %addr, "worker started");

        loop {
            match self.request_task(&addr).await? {
                TaskReply::AssignMap {
                    task_id,
                    input_file,
                    n_reduce,
                } => {
                    debug!(worker = %self.id, task_id, file = %input_file, "running map task");
                    let result =
                        run_map_task(&self.dir, self.workload.map_fn, task_id, &input_file, n_reduce);
                    self.report(&addr, TaskKind::Map, task_id, result).await?;
                }
                TaskReply::AssignReduce { task_id, n_map } => {
                    debug!(worker = %self.id, task_id, "running reduce task");
                    let result =
                        run_reduce_task(&self.dir, self.workload.reduce_fn, task_id, n_map);
                    self.report(&addr, TaskKind::Reduce, task_id, result).await?;
                }
                TaskReply::Wait => sleep(self.config.poll_interval).await,
                TaskReply::Exit => {
                    info!(worker = %self.id, "job complete, exiting");
                    return Ok(());
                }
            }
        }
    }

    /// Read the coordinator endpoint, retrying with backoff while the
    /// rendezvous file does not exist yet.
    async fn find_coordinator(&self) -> Result<String> {
        let mut backoff = Duration::from_millis(100);
        let mut last_error = anyhow!("rendezvous never attempted");
        for attempt in 1..=RENDEZVOUS_ATTEMPTS {
            match storage::read_coordinator_info(&self.dir) {
                Ok(addr) if !addr.is_empty() => return Ok(addr),
                Ok(_) => last_error = anyhow!("rendezvous file is empty"),
                Err(error) => last_error = error,
            }
            debug!(worker = %self.id, attempt, "coordinator endpoint not available yet");
            sleep(backoff).await;
            backoff = (backoff * 2).min(Duration::from_secs(2));
        }
        Err(last_error.context("coordinator endpoint never appeared"))
    }

    async fn request_task(&self, addr: &str) -> Result<TaskReply> {
        let request = Request::request_task(&self.id)?;
        client::call_with_backoff(addr, &request, self.config.io_timeout)
            .await?
            .into_result()
    }

    async fn report(
        &self,
        addr: &str,
        kind: TaskKind,
        task_id: u32,
        result: Result<()>,
    ) -> Result<()> {
        let success = match result {
            Ok(()) => true,
            Err(error) => {
                warn!(worker = %self.id, %kind, task_id, %error, "task failed");
                false
            }
        };
        let request = Request::complete_task(&CompleteTaskParams {
            worker_id: self.id.clone(),
            task_kind: kind,
            task_id,
            success,
        })?;
        let ack: CompleteTaskAck = client::call_with_backoff(addr, &request, self.config.io_timeout)
            .await?
            .into_result()?;
        debug!(worker = %self.id, %kind, task_id, success, acknowledged = ack.acknowledged, "completion reported");
        Ok(())
    }
}

/// Execute map task `task_id`: read the input file, run the transform,
/// partition every pair by `ihash(key) % n_reduce`, and publish one
/// intermediate file per partition, including the empty ones, since
/// reduce tasks open all of them unconditionally.
pub fn run_map_task(
    dir: &Path,
    map_fn: MapFn,
    task_id: u32,
    input_file: &str,
    n_reduce: u32,
) -> Result<()> {
    ensure!(n_reduce >= 1, "map task needs at least one reduce partition");
    let raw = fs::read(input_file).with_context(|| format!("reading input file {}", input_file))?;
    let contents = String::from_utf8_lossy(&raw);
    let pairs = map_fn(input_file, &contents)?;

    let buckets: Buckets = Buckets::new();
    for kv in pairs {
        let bucket_no = ihash(&kv.key) % n_reduce;
        buckets.entry(bucket_no).or_default().push(kv);
    }

    for bucket_no in 0..n_reduce {
        let records = buckets
            .remove(&bucket_no)
            .map(|(_, records)| records)
            .unwrap_or_default();
        storage::publish_records(&storage::intermediate_path(dir, task_id, bucket_no), &records)?;
    }
    Ok(())
}

/// Execute reduce task `task_id`: collect the records of `mr-{m}-{task_id}`
/// for every map task `m`, group them by key in sorted order, run the
/// transform per group, and publish `mr-out-{task_id}`.
///
/// A missing intermediate file fails the task: the coordinator only hands
/// out reduce work once every map task has published all of its partitions.
pub fn run_reduce_task(dir: &Path, reduce_fn: ReduceFn, task_id: u32, n_map: u32) -> Result<()> {
    let mut records = Vec::new();
    for map_id in 0..n_map {
        records.extend(storage::read_records(&storage::intermediate_path(
            dir, map_id, task_id,
        ))?);
    }

    records.sort_unstable_by(|a, b| a.key.cmp(&b.key));

    let mut lines = Vec::new();
    for (key, group) in &records.into_iter().chunk_by(|kv| kv.key.clone()) {
        let values = group.map(|kv| kv.value).collect::<Vec<_>>();
        let reduced = reduce_fn(&key, values)?;
        lines.push((key, reduced));
    }

    storage::publish_output(&storage::output_path(dir, task_id), &lines)
}
