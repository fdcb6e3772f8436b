//! USART3 serial console.
//!
//! QEMU forwards the board's USART3 to a second TCP port (7777 by default).
//! There is no framing on this stream: bytes are passed through as text
//! after dropping telnet-style `0xFF` escape triplets.

use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::protocol::{ESCAPE, strip_escapes};
use crate::transport::{TcpConfig, dial, write_fully};

/// Default serial console port.
pub const DEFAULT_SERIAL_PORT: u16 = 7777;

/// Largest chunk taken from the socket per read.
const READ_CHUNK: usize = 12;

/// Raw text connection to the board's serial port.
pub struct SerialConsole {
    stream: TcpStream,
    peer: String,
}

impl SerialConsole {
    /// Connects to the serial console.
    ///
    /// # Errors
    ///
    /// Returns the same connect errors as [`dial`].
    pub async fn connect(config: &TcpConfig) -> Result<Self> {
        let stream = dial(config).await?;
        let peer = format!("{}:{}", config.host, config.port);
        tracing::info!("serial console connected to {}", peer);
        Ok(Self { stream, peer })
    }

    /// Wraps an already connected stream.
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer = stream
            .peer_addr()
            .map_or_else(|_| "unknown".to_string(), |addr| addr.to_string());
        Self { stream, peer }
    }

    /// Reads whatever is available without waiting.
    ///
    /// Returns `Ok(None)` when nothing is pending or the chunk held only
    /// escape bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` if the peer closed the console, `Io` on
    /// any other read failure.
    pub fn poll_text(&mut self) -> Result<Option<String>> {
        let mut chunk = [0u8; READ_CHUNK];
        match self.stream.try_read(&mut chunk) {
            Ok(0) => {
                tracing::debug!("serial console {} closed by peer", self.peer);
                Err(Error::ConnectionClosed)
            }
            Ok(n) => {
                let mut buf = BytesMut::from(&chunk[..n]);
                strip_escapes(&mut buf);
                if buf.first() == Some(&ESCAPE) {
                    // no carry on this stream, a cut escape is dropped whole
                    buf.clear();
                }
                if buf.is_empty() {
                    return Ok(None);
                }
                Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Reads everything currently pending, one chunk at a time.
    ///
    /// # Errors
    ///
    /// See [`poll_text`](Self::poll_text).
    pub fn drain_text(&mut self) -> Result<Vec<String>> {
        let mut texts = Vec::new();
        while let Some(text) = self.poll_text()? {
            texts.push(text);
        }
        Ok(texts)
    }

    /// Writes text to the board's serial input.
    ///
    /// # Errors
    ///
    /// Returns `SendStalled` if the peer accepts no bytes, `Io` on write
    /// failure.
    pub async fn write(&mut self, text: &str) -> Result<usize> {
        write_fully(&mut self.stream, text.as_bytes()).await
    }

    /// Closes the console.
    pub async fn close(mut self) {
        tracing::info!("closing serial console {}", self.peer);
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!("serial console shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn pair() -> (SerialConsole, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let console = SerialConsole::connect(&TcpConfig::new("127.0.0.1", port))
            .await
            .unwrap();
        let (board, _) = listener.accept().await.unwrap();
        (console, board)
    }

    #[tokio::test]
    async fn test_nothing_pending() {
        let (mut console, _board) = pair().await;
        assert_eq!(console.poll_text().unwrap(), None);
        assert!(console.drain_text().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_in_chunks_with_escapes_removed() {
        let (mut console, mut board) = pair().await;
        board
            .write_all(b"\xff\xfb\x01Hello from the WMS board\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let texts = console.drain_text().unwrap();
        assert!(texts.iter().all(|t| t.len() <= READ_CHUNK));
        assert_eq!(texts.concat(), "Hello from the WMS board\r\n");
    }

    #[tokio::test]
    async fn test_write_and_close() {
        let (mut console, mut board) = pair().await;
        assert_eq!(console.write("1").await.unwrap(), 1);
        let mut buf = [0u8; 1];
        board.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"1");

        drop(board);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(console.poll_text(), Err(Error::ConnectionClosed)));
        console.close().await;
    }
}
