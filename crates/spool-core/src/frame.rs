//! Length-prefixed message framing.
//!
//! Every connection exchanges frames: a 4-byte big-endian length followed by
//! a serde_json payload. The body is self-describing key/value data, not a
//! fixed schema — see `message` for the known shapes.
//!
//! A reader never returns a partial payload: it awaits until the full
//! declared length has arrived, or fails with `EndOfStream` if the peer
//! closes mid-frame.

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Default cap on a single frame's payload, in bytes.
///
/// The declared length is checked before any payload allocation, so a
/// hostile or confused peer cannot make the reader allocate unboundedly.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// Errors that can arise while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream closed before a full header or payload arrived.
    #[error("stream closed mid-frame")]
    EndOfStream,

    /// The declared payload length exceeds the configured maximum.
    #[error("frame of {0} bytes exceeds maximum {1}")]
    TooLarge(usize, usize),

    #[error("frame i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode frame body: {0}")]
    Encode(serde_json::Error),

    #[error("failed to decode frame body: {0}")]
    Decode(serde_json::Error),
}

/// Serialize `value` and write it as one frame.
pub async fn write_frame<W, T>(stream: &mut W, value: &T) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(value).map_err(FrameError::Encode)?;
    if body.len() > u32::MAX as usize {
        return Err(FrameError::TooLarge(body.len(), u32::MAX as usize));
    }
    let mut buf = BytesMut::with_capacity(4 + body.len());
    buf.put_u32(body.len() as u32);
    buf.extend_from_slice(&body);
    stream.write_all(&buf).await?;
    stream.flush().await?;
    Ok(())
}

/// Read one frame and deserialize its body, with the default size cap.
pub async fn read_frame<R, T>(stream: &mut R) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    read_frame_limited(stream, DEFAULT_MAX_FRAME).await
}

/// Read one frame with an explicit size cap.
pub async fn read_frame_limited<R, T>(stream: &mut R, max_frame: usize) -> Result<T, FrameError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    read_exact(stream, &mut header).await?;
    let len = u32::from_be_bytes(header) as usize;
    if len > max_frame {
        return Err(FrameError::TooLarge(len, max_frame));
    }

    let mut body = vec![0u8; len];
    read_exact(stream, &mut body).await?;
    serde_json::from_slice(&body).map_err(FrameError::Decode)
}

/// `read_exact` with EOF mapped to `EndOfStream`.
async fn read_exact<R: AsyncRead + Unpin>(stream: &mut R, buf: &mut [u8]) -> Result<(), FrameError> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FrameError::EndOfStream),
        Err(e) => Err(FrameError::Io(e)),
    }
}
