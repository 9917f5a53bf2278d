//! Framed message transport over a byte stream.
//!
//! The receive side is two-phase: read the fixed header first to learn the
//! total message size, then read exactly that many payload bytes. A frame
//! with an impossible declared size means the stream has desynchronized
//! and the connection cannot be salvaged; a frame that reads fine but
//! fails to decode leaves the stream intact, so the peer can keep talking.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{Message, ProtocolError, HEADER_SIZE, MAX_MESSAGE_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("channel closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Frame declared a size the transport cannot carry; the stream is
    /// desynchronized beyond recovery
    #[error("frame declares {0} payload bytes, over message capacity")]
    FrameTooLarge(usize),
}

/// Read one complete frame (header + payload bytes).
///
/// Returns `Ok(None)` on clean end-of-stream before a header.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut header = [0u8; HEADER_SIZE];

    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    }

    let size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
    if size > MAX_MESSAGE_SIZE - HEADER_SIZE {
        return Err(TransportError::FrameTooLarge(size));
    }

    let mut frame = vec![0u8; HEADER_SIZE + size];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;

    Ok(Some(frame))
}

/// Read and decode one message. Decode failures are returned without
/// consuming more than the offending frame.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Result<Message, ProtocolError>>, TransportError> {
    match read_frame(reader).await? {
        Some(frame) => Ok(Some(Message::decode(&frame))),
        None => Ok(None),
    }
}

/// Encode and write one message
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), TransportError> {
    let bytes = message
        .encode()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}
