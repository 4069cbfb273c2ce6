//! One-shot RPC client: dial, send one request, read one response, close.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::debug;

use super::codec;
use super::{Request, Response};

/// First retry delay when the coordinator cannot be reached.
pub const BACKOFF_START: Duration = Duration::from_millis(100);
/// Retry delays double up to this cap.
pub const BACKOFF_MAX: Duration = Duration::from_secs(2);
/// Dial attempts before a call is declared unrecoverable.
pub const MAX_ATTEMPTS: u32 = 8;

/// Make a single call against `addr`. Every I/O step runs under
/// `io_timeout` so a partitioned peer cannot hold the caller hostage.
pub async fn call(addr: &str, request: &Request, io_timeout: Duration) -> Result<Response> {
    let mut stream = timeout(io_timeout, TcpStream::connect(addr))
        .await
        .with_context(|| format!("connecting to {} timed out", addr))?
        .with_context(|| format!("connecting to {}", addr))?;
    timeout(io_timeout, codec::write_frame(&mut stream, request))
        .await
        .context("sending request timed out")??;
    let response = timeout(io_timeout, codec::read_frame(&mut stream))
        .await
        .context("reading response timed out")??;
    Ok(response)
}

/// [`call`], retried with bounded exponential backoff.
///
/// Retries cover transient transport failures (coordinator still starting,
/// connection refused, timeouts). A well-formed error *response* is not a
/// transport failure and is returned to the caller as a success here.
pub async fn call_with_backoff(
    addr: &str,
    request: &Request,
    io_timeout: Duration,
) -> Result<Response> {
    let mut backoff = BACKOFF_START;
    let mut last_error = anyhow!("no rpc attempt was made");
    for attempt in 1..=MAX_ATTEMPTS {
        match call(addr, request, io_timeout).await {
            Ok(response) => return Ok(response),
            Err(error) => {
                debug!(%addr, attempt, %error, "rpc attempt failed");
                last_error = error;
            }
        }
        if attempt < MAX_ATTEMPTS {
            sleep(backoff).await;
            backoff = (backoff * 2).min(BACKOFF_MAX);
        }
    }
    Err(last_error.context(format!("giving up on {} after {} attempts", addr, MAX_ATTEMPTS)))
}
