//! Length-prefixed framing over a reliable ordered byte stream.
//!
//! Each frame is a 4-byte big-endian length followed by a MessagePack body.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{WireError, WireMessage};

/// Default maximum frame size (64 KiB). Protocol messages are small.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Read one length-prefixed frame.
///
/// A clean EOF before the length prefix yields [`WireError::ConnectionClosed`].
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut len_buf).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => WireError::ConnectionClosed,
            _ => WireError::Io(e),
        });
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_size {
        return Err(WireError::FrameTooLarge {
            size: len,
            limit: max_size,
        });
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame and flush.
///
/// A body over [`MAX_FRAME_SIZE`] is rejected before anything is written.
pub async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let len = match u32::try_from(bytes.len()) {
        Ok(len) if bytes.len() <= MAX_FRAME_SIZE => len,
        _ => {
            return Err(WireError::FrameTooLarge {
                size: bytes.len(),
                limit: MAX_FRAME_SIZE,
            })
        }
    };
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one message.
pub async fn read_message<M, R>(reader: &mut R, max_size: usize) -> Result<M, WireError>
where
    M: WireMessage,
    R: AsyncRead + Unpin,
{
    let bytes = read_frame(reader, max_size).await?;
    M::from_bytes(&bytes)
}

/// Encode and write one message.
pub async fn write_message<M, W>(writer: &mut W, message: &M) -> Result<(), WireError>
where
    M: WireMessage,
    W: AsyncWrite + Unpin,
{
    let bytes = message.to_bytes()?;
    write_frame(writer, &bytes).await
}
