//! Length-prefixed JSON framing.
//!
//! Each message is a big-endian `u32` byte count followed by exactly that
//! many bytes of JSON. The limit below bounds what a handler will buffer
//! for a single message; anything larger is a protocol error, not data.

use anyhow::{ensure, Result};
use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Control-plane messages are small; a frame this large means a confused
/// or hostile peer.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// Serialize `message` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    ensure!(
        body.len() <= MAX_FRAME_LEN,
        "outgoing frame of {} bytes exceeds the {} byte limit",
        body.len(),
        MAX_FRAME_LEN
    );
    writer.write_u32(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame and deserialize it into `T`.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    ensure!(
        len <= MAX_FRAME_LEN,
        "incoming frame of {} bytes exceeds the {} byte limit",
        len,
        MAX_FRAME_LEN
    );
    let mut body = BytesMut::zeroed(len);
    reader.read_exact(&mut body).await?;
    Ok(serde_json::from_slice(&body)?)
}
