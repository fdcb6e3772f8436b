//! Transport layer for diagnostic port communication.
//!
//! This module provides the abstraction over the byte stream to QEMU.
//! The write side stays with the transport; the read side is handed to the
//! listener task as a [`Receiver`] so reads never contend with writes.

pub mod console;
pub mod tcp;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

pub use console::SerialConsole;
pub use tcp::{TcpConfig, TcpTransport, dial};

/// Read half handed to the listener.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Trait for transport implementations.
pub trait Transport: Send + Sync {
    /// Connects to the device.
    fn connect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Disconnects from the device. Calling it again is a no-op.
    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Sends data to the device, returning the number of bytes written.
    fn send(&mut self, data: Bytes) -> BoxFuture<'_, Result<usize>>;

    /// Takes the read side of the current connection.
    ///
    /// Returns `None` when not connected or if it was already taken.
    fn take_receiver(&mut self) -> Option<Receiver>;

    /// Returns true if connected.
    fn is_connected(&self) -> bool;
}

/// Shared liveness flag of one connection.
///
/// Cloned into the [`Receiver`] so that closing the connection from any
/// task stops the listener at its next read timeout.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    /// Creates a flag for a live connection.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns true until the connection is closed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the connection closed. Returns true on the first call only.
    pub fn close(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a connection with a short read timeout.
pub struct Receiver {
    reader: BoxedReader,
    timeout: Duration,
    liveness: Liveness,
}

impl Receiver {
    /// Wraps a reader.
    #[must_use]
    pub fn new(reader: BoxedReader, timeout: Duration, liveness: Liveness) -> Self {
        Self {
            reader,
            timeout,
            liveness,
        }
    }

    /// Returns false once the connection has been closed.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Reads up to `buf.len()` bytes.
    ///
    /// # Errors
    ///
    /// - `ReceiveTimeout` if nothing arrived within the read timeout; the
    ///   connection is still usable.
    /// - `ConnectionClosed` if the peer closed the stream or the connection
    ///   was closed locally.
    /// - `Io` on any other read failure.
    ///
    /// Both of the latter mark the connection dead.
    pub async fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_alive() {
            return Err(Error::ConnectionClosed);
        }
        match tokio::time::timeout(self.timeout, self.reader.read(buf)).await {
            Err(_) => Err(Error::ReceiveTimeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Ok(0)) => {
                tracing::debug!("connection closed by peer");
                self.liveness.close();
                Err(Error::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                tracing::trace!("received {} bytes", n);
                Ok(n)
            }
            Ok(Err(e)) => {
                self.liveness.close();
                Err(Error::Io(e))
            }
        }
    }
}

/// Writes all of `data`, failing if the peer stops accepting bytes.
pub(crate) async fn write_fully<W>(writer: &mut W, data: &[u8]) -> Result<usize>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut total = 0;
    while total < data.len() {
        let sent = writer.write(&data[total..]).await?;
        if sent == 0 {
            return Err(Error::SendStalled {
                command: String::from_utf8_lossy(data).into_owned(),
            });
        }
        total += sent;
    }
    writer.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Writer that accepts `budget` bytes and then reports zero-byte writes.
    struct Stalling {
        budget: usize,
        written: Vec<u8>,
    }

    impl AsyncWrite for Stalling {
        fn poll_write(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.budget).min(2);
            self.budget -= n;
            self.written.extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_fully_loops_over_short_writes() {
        let mut writer = Stalling {
            budget: usize::MAX,
            written: Vec::new(),
        };
        let n = write_fully(&mut writer, b"D0L1 ").await.unwrap();
        assert_eq!(n, 5);
        assert_eq!(writer.written, b"D0L1 ");
    }

    #[tokio::test]
    async fn test_zero_byte_write_is_an_error() {
        let mut writer = Stalling {
            budget: 3,
            written: Vec::new(),
        };
        let err = write_fully(&mut writer, b"D0L1 ").await.unwrap_err();
        assert!(matches!(err, Error::SendStalled { ref command } if command == "D0L1 "));
    }

    #[tokio::test]
    async fn test_receive_timeout_keeps_connection() {
        let (_device, panel) = tokio::io::duplex(64);
        let liveness = Liveness::new();
        let mut receiver = Receiver::new(
            Box::new(panel),
            Duration::from_millis(10),
            liveness.clone(),
        );

        let mut buf = [0u8; 16];
        let err = receiver.receive(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::ReceiveTimeout { timeout_ms: 10 }));
        assert!(receiver.is_alive());

        assert!(liveness.close());
        assert!(!liveness.close());
        assert!(matches!(
            receiver.receive(&mut buf).await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_receive_eof_marks_dead() {
        let (mut device, panel) = tokio::io::duplex(64);
        let mut receiver = Receiver::new(
            Box::new(panel),
            Duration::from_millis(100),
            Liveness::new(),
        );

        device.write_all(b"+a8\n").await.unwrap();
        drop(device);

        let mut buf = [0u8; 16];
        assert_eq!(receiver.receive(&mut buf).await.unwrap(), 4);
        assert!(matches!(
            receiver.receive(&mut buf).await,
            Err(Error::ConnectionClosed)
        ));
        assert!(!receiver.is_alive());
    }
}
