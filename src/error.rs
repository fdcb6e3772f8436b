//! Error types for the wms-link library.

use thiserror::Error;

/// The main error type for bridge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on an established connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error while reassembling diagnostic messages.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Host name could not be resolved.
    #[error("unknown host \"{host}\": {source}")]
    UnknownHost {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection attempt did not complete in time.
    #[error("connection to {host}:{port} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        host: String,
        port: u16,
        timeout_ms: u64,
    },

    /// Connection attempt failed (refused, unreachable, ...).
    #[error("cannot connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// The peer accepted zero bytes of a pending write.
    #[error("send error: connection accepted no data for {command:?}")]
    SendStalled { command: String },

    /// No data arrived within the read timeout.
    #[error("receiver timeout after {timeout_ms}ms")]
    ReceiveTimeout { timeout_ms: u64 },

    /// The peer closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Connection is not established.
    #[error("not connected")]
    NotConnected,

    /// No button with this name exists on the panel.
    #[error("unknown button: {name}")]
    UnknownButton { name: String },

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Returns true for errors raised while dialling a connection.
    #[must_use]
    pub const fn is_connect_failure(&self) -> bool {
        matches!(
            self,
            Self::UnknownHost { .. } | Self::ConnectTimeout { .. } | Self::Connect { .. }
        )
    }

    /// Returns true if the connection survives this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Frame(_) | Self::SendStalled { .. } | Self::ReceiveTimeout { .. }
        )
    }

    /// Text shown to the user for this error.
    ///
    /// This is the one place where error kinds are turned into panel
    /// warnings, so every handler can simply return `Result`.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownHost { host, .. } => format!("Unknown host \"{host}\""),
            Self::ConnectTimeout { host, port, .. } => {
                format!("Cannot connect to QEMU on {host}:{port}: timed out")
            }
            Self::Connect { host, port, source } => {
                format!("Cannot connect to QEMU on {host}:{port}: {source}")
            }
            Self::SendStalled { command } => {
                format!("Warning: QEMU connection send error {command:?}")
            }
            Self::ReceiveTimeout { .. } | Self::Frame(_) => {
                "Warning: QEMU receiver timeout".to_string()
            }
            Self::Io(_) | Self::ConnectionClosed => "Warning: QEMU connection closed".to_string(),
            Self::NotConnected => "Warning: not connected to QEMU".to_string(),
            Self::UnknownButton { name } => format!("Unknown button \"{name}\""),
            Self::ChannelClosed => "Warning: bridge stopped".to_string(),
        }
    }
}

/// Message framing errors.
#[derive(Debug, Error)]
pub enum FrameError {
    /// Received bytes are not ASCII text.
    #[error("non-ASCII data in {len} byte message")]
    NotText { len: usize },
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_failures_are_classified() {
        let refused = Error::Connect {
            host: "localhost".into(),
            port: 8888,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(refused.is_connect_failure());
        assert!(!refused.is_recoverable());

        let timeout = Error::ConnectTimeout {
            host: "wms".into(),
            port: 8888,
            timeout_ms: 5000,
        };
        assert!(timeout.is_connect_failure());
        assert!(!Error::ConnectionClosed.is_connect_failure());
    }

    #[test]
    fn test_user_messages() {
        let stalled = Error::SendStalled {
            command: "D0L1 ".into(),
        };
        assert!(stalled.is_recoverable());
        assert_eq!(
            stalled.user_message(),
            "Warning: QEMU connection send error \"D0L1 \""
        );
        assert_eq!(
            Error::ConnectionClosed.user_message(),
            "Warning: QEMU connection closed"
        );
        let unknown = Error::UnknownHost {
            host: "nowhere".into(),
            source: std::io::Error::other("lookup failed"),
        };
        assert_eq!(unknown.user_message(), "Unknown host \"nowhere\"");
    }
}
