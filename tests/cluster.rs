//! End-to-end jobs: a real coordinator serving real workers over TCP, all
//! inside one runtime, each test in its own scratch directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::time::{sleep, timeout};

use mrfs::config::Config;
use mrfs::coordinator::{self, CoordinatorService};
use mrfs::rpc::{client, CompleteTaskAck, CompleteTaskParams, Request, TaskKind, TaskReply};
use mrfs::worker::Worker;
use mrfs::{storage, workload};

/// Generous deadline for whole-job awaits so a wedged test fails fast.
const JOB_DEADLINE: Duration = Duration::from_secs(30);

fn test_config() -> Config {
    let mut config = Config::default();
    config.poll_interval = Duration::from_millis(50);
    config
}

fn write_input(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn read_output(dir: &Path, reduce_id: u32) -> String {
    fs::read_to_string(storage::output_path(dir, reduce_id)).unwrap()
}

async fn wait_for_endpoint(dir: &Path) -> String {
    loop {
        if let Ok(addr) = storage::read_coordinator_info(dir) {
            if !addr.is_empty() {
                return addr;
            }
        }
        sleep(Duration::from_millis(20)).await;
    }
}

/// Start a coordinator and `n_workers` wc workers and wait for everything
/// to finish cleanly.
async fn run_wc_job(
    dir: &Path,
    inputs: Vec<String>,
    n_reduce: u32,
    n_workers: usize,
    config: Config,
) -> Result<()> {
    let service = Arc::new(CoordinatorService::new(inputs, n_reduce, config)?);
    let coordinator = tokio::spawn({
        let service = service.clone();
        let dir = dir.to_path_buf();
        async move { coordinator::run(service, &dir).await }
    });

    let mut workers = Vec::new();
    for _ in 0..n_workers {
        let dir: PathBuf = dir.to_path_buf();
        workers.push(tokio::spawn(async move {
            Worker::new(workload::named("wc").unwrap(), dir, config)
                .run()
                .await
        }));
    }

    for worker in workers {
        timeout(JOB_DEADLINE, worker).await???;
    }
    timeout(JOB_DEADLINE, coordinator).await???;
    Ok(())
}

#[tokio::test]
async fn minimal_word_count_with_a_single_worker() {
    let scratch = TempDir::new().unwrap();
    let dir = scratch.path();
    let inputs = vec![
        write_input(dir, "a.txt", "hello world"),
        write_input(dir, "b.txt", "hello"),
    ];

    run_wc_job(dir, inputs, 1, 1, test_config()).await.unwrap();

    assert_eq!(read_output(dir, 0), "hello\t2\nworld\t1\n");
    // Clean shutdown removes the rendezvous file.
    assert!(storage::read_coordinator_info(dir).is_err());
}

#[tokio::test]
async fn output_partitions_follow_the_documented_hash() {
    let scratch = TempDir::new().unwrap();
    let dir = scratch.path();
    let inputs = vec![write_input(dir, "a.txt", "aa bb cc dd")];

    run_wc_job(dir, inputs, 2, 1, test_config()).await.unwrap();

    let mut all_keys = Vec::new();
    for r in 0..2u32 {
        for line in read_output(dir, r).lines() {
            let (key, count) = line.split_once('\t').unwrap();
            assert_eq!(count, "1");
            assert_eq!(mrfs::ihash(key) % 2, r, "key {} in wrong partition", key);
            all_keys.push(key.to_string());
        }
    }
    all_keys.sort();
    assert_eq!(all_keys, vec!["aa", "bb", "cc", "dd"]);
}

#[tokio::test]
async fn empty_input_still_produces_every_output_file() {
    let scratch = TempDir::new().unwrap();
    let dir = scratch.path();
    let inputs = vec![write_input(dir, "empty.txt", "")];

    run_wc_job(dir, inputs, 3, 1, test_config()).await.unwrap();

    for r in 0..3 {
        assert_eq!(read_output(dir, r), "");
    }
}

#[tokio::test]
async fn parallel_workers_agree_on_one_result() {
    let scratch = TempDir::new().unwrap();
    let dir = scratch.path();
    let inputs: Vec<String> = (0..10)
        .map(|i| write_input(dir, &format!("in-{}.txt", i), "x"))
        .collect();

    run_wc_job(dir, inputs, 1, 5, test_config()).await.unwrap();

    assert_eq!(read_output(dir, 0), "x\t10\n");

    // No unpublished temporaries survive the job.
    for entry in fs::read_dir(dir).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        assert!(!name.ends_with(".tmp"), "leftover temporary {}", name);
    }
}

#[tokio::test]
async fn crashed_worker_task_is_reassigned_and_the_job_completes() {
    let scratch = TempDir::new().unwrap();
    let dir = scratch.path();
    let inputs = vec![
        write_input(dir, "a.txt", "x y"),
        write_input(dir, "b.txt", "y z"),
    ];

    let mut config = test_config();
    config.task_timeout = Duration::from_millis(500);

    let service = Arc::new(CoordinatorService::new(inputs, 1, config).unwrap());
    let coordinator = tokio::spawn({
        let service = service.clone();
        let dir = dir.to_path_buf();
        async move { coordinator::run(service, &dir).await }
    });
    let addr = wait_for_endpoint(dir).await;

    // A worker takes a map task and dies without reporting.
    let request = Request::request_task("doomed-worker").unwrap();
    let reply: TaskReply = client::call(&addr, &request, config.io_timeout)
        .await
        .unwrap()
        .into_result()
        .unwrap();
    assert!(matches!(reply, TaskReply::AssignMap { .. }));

    // Two live workers finish the job once the monitor reclaims the task.
    let mut workers = Vec::new();
    for _ in 0..2 {
        let dir = dir.to_path_buf();
        workers.push(tokio::spawn(async move {
            Worker::new(workload::named("wc").unwrap(), dir, config)
                .run()
                .await
        }));
    }
    for worker in workers {
        timeout(JOB_DEADLINE, worker).await.unwrap().unwrap().unwrap();
    }
    timeout(JOB_DEADLINE, coordinator)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(read_output(dir, 0), "x\t1\ny\t2\nz\t1\n");
}

#[tokio::test]
async fn late_completion_from_a_timed_out_worker_changes_nothing() {
    let scratch = TempDir::new().unwrap();
    let dir = scratch.path();
    let inputs = vec![write_input(dir, "a.txt", "x")];

    let mut config = test_config();
    config.task_timeout = Duration::from_millis(500);

    let service = Arc::new(CoordinatorService::new(inputs, 1, config).unwrap());
    let coordinator = tokio::spawn({
        let service = service.clone();
        let dir = dir.to_path_buf();
        async move { coordinator::run(service, &dir).await }
    });
    let addr = wait_for_endpoint(dir).await;

    let request_task = |worker: &str| {
        let request = Request::request_task(worker).unwrap();
        let addr = addr.clone();
        async move {
            client::call(&addr, &request, config.io_timeout)
                .await
                .unwrap()
                .into_result::<TaskReply>()
                .unwrap()
        }
    };
    let complete_task = |worker: &str, kind: TaskKind, task_id: u32| {
        let request = Request::complete_task(&CompleteTaskParams {
            worker_id: worker.to_string(),
            task_kind: kind,
            task_id,
            success: true,
        })
        .unwrap();
        let addr = addr.clone();
        async move {
            client::call(&addr, &request, config.io_timeout)
                .await
                .unwrap()
                .into_result::<CompleteTaskAck>()
                .unwrap()
        }
    };

    // The straggler takes the only map task and goes quiet until the
    // monitor reclaims it and a second worker picks it up.
    assert!(matches!(
        request_task("straggler").await,
        TaskReply::AssignMap { task_id: 0, .. }
    ));
    sleep(Duration::from_millis(1200)).await;
    assert!(matches!(
        request_task("successor").await,
        TaskReply::AssignMap { task_id: 0, .. }
    ));

    // The straggler wakes up and reports success. The report is acked but
    // discarded: the task still belongs to the successor.
    let ack = complete_task("straggler", TaskKind::Map, 0).await;
    assert!(ack.acknowledged);
    assert!(matches!(request_task("observer").await, TaskReply::Wait));

    // Only the successor's report completes the task.
    complete_task("successor", TaskKind::Map, 0).await;
    match request_task("successor").await {
        TaskReply::AssignReduce { task_id: 0, n_map: 1 } => {}
        other => panic!("expected the reduce task, got {:?}", other),
    }
    complete_task("successor", TaskKind::Reduce, 0).await;

    timeout(JOB_DEADLINE, coordinator)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn distributed_and_standalone_runs_are_byte_identical() {
    let scratch = TempDir::new().unwrap();
    let cluster_dir = scratch.path().join("cluster");
    let oracle_dir = scratch.path().join("oracle");
    fs::create_dir_all(&cluster_dir).unwrap();
    fs::create_dir_all(&oracle_dir).unwrap();

    let text = "to be or not to be that is the question";
    let cluster_inputs = vec![write_input(&cluster_dir, "a.txt", text)];
    let oracle_inputs = vec![write_input(&oracle_dir, "a.txt", text)];

    run_wc_job(&cluster_dir, cluster_inputs, 2, 3, test_config())
        .await
        .unwrap();

    let wc = workload::named("wc").unwrap();
    mrfs::standalone::engine::run_job(&oracle_dir, &oracle_inputs, &wc, 2).unwrap();

    for r in 0..2 {
        assert_eq!(read_output(&cluster_dir, r), read_output(&oracle_dir, r));
    }
}
