//! Deadline-bounded socket I/O.
//!
//! A deadline is an absolute instant shared by consecutive operations on the
//! same connection. Expiry surfaces as an `io::Error` of kind `TimedOut`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};

fn deadline_exceeded(op: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::TimedOut,
        format!("{} deadline exceeded", op),
    )
}

/// Reads whatever is available (up to `buf.len()`) before `deadline`.
///
/// Returns `Ok(0)` on a clean end of stream.
pub async fn read_before<R>(reader: &mut R, buf: &mut [u8], deadline: Instant) -> io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    match timeout_at(deadline, reader.read(buf)).await {
        Ok(result) => result,
        Err(_) => Err(deadline_exceeded("read")),
    }
}

/// Writes the whole payload before `deadline`.
pub async fn write_before<W>(writer: &mut W, payload: &[u8], deadline: Instant) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match timeout_at(deadline, writer.write_all(payload)).await {
        Ok(result) => result,
        Err(_) => Err(deadline_exceeded("write")),
    }
}
