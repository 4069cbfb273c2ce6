//! The coordinator process: one task registry behind one mutex, served
//! over the framed request/response protocol.
//!
//! Handlers run concurrently (one spawned task per connection) but every
//! mutation goes through the single registry lock, so the phase-machine
//! invariants only ever have to hold across one short critical section.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::rpc::{
    self, codec, CompleteTaskAck, CompleteTaskParams, Request, RequestTaskParams, Response,
    TaskReply,
};
use crate::storage;

pub mod registry;

use registry::{Disposition, Registry};

/// Cadence of the timeout monitor. Must stay at or below one second so a
/// crashed worker's task is reclaimed promptly after `task_timeout`.
const MONITOR_INTERVAL: Duration = Duration::from_millis(250);

/// Floor for the post-completion drain window.
const EXIT_GRACE_MIN: Duration = Duration::from_millis(500);

/// Owns the task registry for a single job and answers worker RPCs.
pub struct CoordinatorService {
    registry: Mutex<Registry>,
    config: Config,
}

impl CoordinatorService {
    /// Fails if the job shape is invalid (`n_reduce == 0`).
    pub fn new(input_files: Vec<String>, n_reduce: u32, config: Config) -> Result<Self> {
        Ok(Self {
            registry: Mutex::new(Registry::new(input_files, n_reduce)?),
            config,
        })
    }

    /// True iff the phase machine has reached `Done`.
    pub fn done(&self) -> bool {
        self.lock().done()
    }

    /// Route one decoded request to its handler.
    ///
    /// Malformed params and unknown methods produce an error envelope and
    /// touch no state.
    pub fn dispatch(&self, request: &Request) -> Response {
        match request.method.as_str() {
            rpc::REQUEST_TASK => {
                match serde_json::from_value::<RequestTaskParams>(request.params.clone()) {
                    Ok(params) => self.handle_request_task(&params),
                    Err(error) => Response::err(format!("bad params for request_task: {}", error)),
                }
            }
            rpc::COMPLETE_TASK => {
                match serde_json::from_value::<CompleteTaskParams>(request.params.clone()) {
                    Ok(params) => self.handle_complete_task(&params),
                    Err(error) => Response::err(format!("bad params for complete_task: {}", error)),
                }
            }
            other => Response::err(format!("unknown method: {}", other)),
        }
    }

    fn handle_request_task(&self, params: &RequestTaskParams) -> Response {
        let (reply, phase_changed, phase) = {
            let mut registry = self.lock();
            let before = registry.phase();
            let reply = registry.assign(&params.worker_id, Instant::now());
            (reply, registry.phase() != before, registry.phase())
        };
        if phase_changed {
            info!(%phase, "phase advanced");
        }
        match &reply {
            TaskReply::AssignMap {
                task_id,
                input_file,
                ..
            } => info!(worker = %params.worker_id, task_id = *task_id, file = %input_file, "assigned map task"),
            TaskReply::AssignReduce { task_id, .. } => {
                info!(worker = %params.worker_id, task_id = *task_id, "assigned reduce task")
            }
            TaskReply::Wait => debug!(worker = %params.worker_id, "nothing assignable, worker waits"),
            TaskReply::Exit => debug!(worker = %params.worker_id, "job done, worker told to exit"),
        }
        to_ok_response(&reply)
    }

    fn handle_complete_task(&self, params: &CompleteTaskParams) -> Response {
        let (outcome, phase_changed, phase) = {
            let mut registry = self.lock();
            let before = registry.phase();
            let outcome = registry.complete(
                &params.worker_id,
                params.task_kind,
                params.task_id,
                params.success,
            );
            (outcome, registry.phase() != before, registry.phase())
        };
        match outcome {
            Ok(disposition) => {
                match disposition {
                    Disposition::Completed => info!(
                        worker = %params.worker_id,
                        kind = %params.task_kind,
                        task_id = params.task_id,
                        "task completed"
                    ),
                    Disposition::Reset => warn!(
                        worker = %params.worker_id,
                        kind = %params.task_kind,
                        task_id = params.task_id,
                        "task failed, back to idle"
                    ),
                    Disposition::Ignored => debug!(
                        worker = %params.worker_id,
                        kind = %params.task_kind,
                        task_id = params.task_id,
                        "stale or duplicate completion ignored"
                    ),
                }
                if phase_changed {
                    info!(%phase, "phase advanced");
                }
                to_ok_response(&CompleteTaskAck { acknowledged: true })
            }
            Err(unknown) => {
                warn!(worker = %params.worker_id, %unknown, "completion for unknown task");
                Response::err(unknown.to_string())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_ok_response<T: serde::Serialize>(result: &T) -> Response {
    Response::ok(result).unwrap_or_else(|error| Response::err(error.to_string()))
}

/// Everything the coordinator does for one job: bind on an ephemeral port,
/// announce the endpoint in the rendezvous file, serve and monitor until
/// the job is done, let workers drain, clean up.
pub async fn run(service: Arc<CoordinatorService>, dir: &Path) -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("binding coordinator listener")?;
    let addr = listener.local_addr()?;
    storage::write_coordinator_info(dir, &addr.to_string())?;
    info!(%addr, "coordinator listening");

    let server = tokio::spawn(serve(listener, service.clone()));
    let monitor = tokio::spawn(monitor_tasks(service.clone()));

    while !service.done() {
        sleep(service.config.poll_interval).await;
    }
    info!("job complete");

    // Keep answering EXIT until the slowest poller has had a chance to
    // come back from its WAIT sleep: two poll intervals, at least 500 ms.
    let exit_grace = service
        .config
        .poll_interval
        .saturating_mul(2)
        .max(EXIT_GRACE_MIN);
    sleep(exit_grace).await;
    monitor.abort();
    server.abort();
    storage::remove_coordinator_info(dir);
    Ok(())
}

async fn serve(listener: TcpListener, service: Arc<CoordinatorService>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let service = service.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, &service).await {
                        debug!(%peer, %error, "connection handler failed");
                    }
                });
            }
            Err(error) => warn!(%error, "accept failed"),
        }
    }
}

/// One request, one response, close. The registry lock is only held
/// inside `dispatch`; the deadlines here keep a stalled peer from pinning
/// the handler task.
async fn handle_connection(mut stream: TcpStream, service: &CoordinatorService) -> Result<()> {
    let io_timeout = service.config.io_timeout;
    let decoded = timeout(io_timeout, codec::read_frame::<_, Request>(&mut stream))
        .await
        .context("request read timed out")?;
    let response = match decoded {
        Ok(request) => service.dispatch(&request),
        Err(error) => Response::err(format!("malformed request: {}", error)),
    };
    timeout(io_timeout, codec::write_frame(&mut stream, &response))
        .await
        .context("response write timed out")??;
    Ok(())
}

async fn monitor_tasks(service: Arc<CoordinatorService>) {
    loop {
        sleep(MONITOR_INTERVAL).await;
        let reclaimed = {
            let mut registry = service.lock();
            if registry.done() {
                break;
            }
            registry.reclaim_expired(service.config.task_timeout, Instant::now())
        };
        for (kind, task_id) in reclaimed {
            warn!(%kind, task_id, "task timed out, reclaimed for reassignment");
        }
    }
}
