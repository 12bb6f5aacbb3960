//! Length-prefixed framing: `[u32 big-endian length][payload]`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{TransportError, TransportResult};

/// Maximum frame payload
pub const MAX_FRAME_SIZE: usize = 65535;

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> TransportResult<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. A clean or mid-frame EOF is [`TransportError::Closed`].
pub async fn read_frame<R>(reader: &mut R) -> TransportResult<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let len = reader.read_u32().await? as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
