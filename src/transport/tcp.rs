//! TCP transport implementation.
//!
//! QEMU exposes the WMS diagnostic monitor on a plain TCP port (8888 by
//! default). The stream is split: the listener task owns the read half, the
//! transport keeps the write half for commands.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::{Error, Result};
use crate::transport::{Liveness, Receiver, Transport, write_fully};

/// Default diagnostic port.
pub const DEFAULT_DIAGNOSTIC_PORT: u16 = 8888;

/// Connect timeout for a host on this machine.
pub const LOCAL_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect timeout for a remote host.
pub const REMOTE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read timeout; bounds how long the listener takes to notice a close.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Returns true if `host` names this machine.
#[must_use]
pub fn is_local_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Configuration for TCP transport.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Time allowed for the connection to be established.
    pub connect_timeout: Duration,
    /// Time a single read waits for data.
    pub read_timeout: Duration,
}

impl TcpConfig {
    /// Creates a configuration with the default timeouts for `host`.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let connect_timeout = if is_local_host(&host) {
            LOCAL_CONNECT_TIMEOUT
        } else {
            REMOTE_CONNECT_TIMEOUT
        };
        Self {
            host,
            port,
            connect_timeout,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Opens a TCP connection.
///
/// # Errors
///
/// - `UnknownHost` if the name does not resolve.
/// - `ConnectTimeout` if no address accepted within the connect timeout.
/// - `Connect` if every address refused or failed.
pub async fn dial(config: &TcpConfig) -> Result<TcpStream> {
    let host = config.host.as_str();
    let port = config.port;

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|source| Error::UnknownHost {
            host: host.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(Error::UnknownHost {
            host: host.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
        });
    }

    tracing::debug!("dialling {}:{} ({} addresses)", host, port, addrs.len());

    let attempt = async {
        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| std::io::Error::other("no address accepted")))
    };

    match tokio::time::timeout(config.connect_timeout, attempt).await {
        Ok(Ok(stream)) => {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::warn!("failed to set TCP_NODELAY: {}", e);
            }
            Ok(stream)
        }
        Ok(Err(source)) => Err(Error::Connect {
            host: host.to_string(),
            port,
            source,
        }),
        Err(_) => Err(Error::ConnectTimeout {
            host: host.to_string(),
            port,
            timeout_ms: u64::try_from(config.connect_timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

/// TCP transport for the diagnostic port.
pub struct TcpTransport {
    config: TcpConfig,
    writer: Option<OwnedWriteHalf>,
    reader: Option<OwnedReadHalf>,
    liveness: Liveness,
}

impl TcpTransport {
    /// Creates a new TCP transport with the given configuration.
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        let liveness = Liveness::new();
        liveness.close();
        Self {
            config,
            writer: None,
            reader: None,
            liveness,
        }
    }

    /// Creates a transport for `host` on the default diagnostic port.
    #[must_use]
    pub fn with_host(host: impl Into<String>) -> Self {
        Self::new(TcpConfig::new(host, DEFAULT_DIAGNOSTIC_PORT))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &TcpConfig {
        &self.config
    }

    /// Returns the liveness flag of the current connection.
    ///
    /// Closing it from any task stops the listener without touching the
    /// transport.
    #[must_use]
    pub fn liveness(&self) -> Liveness {
        self.liveness.clone()
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.is_connected() {
                return Ok(());
            }

            tracing::info!("connecting to {}:{}", self.config.host, self.config.port);
            let stream = dial(&self.config).await?;
            let (reader, writer) = stream.into_split();
            self.reader = Some(reader);
            self.writer = Some(writer);
            self.liveness = Liveness::new();

            tracing::info!("connected to {}:{}", self.config.host, self.config.port);
            Ok(())
        }
        .boxed()
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.liveness.close();
            self.reader = None;
            if let Some(mut writer) = self.writer.take() {
                tracing::info!("disconnecting from {}:{}", self.config.host, self.config.port);
                if let Err(e) = writer.shutdown().await {
                    tracing::debug!("shutdown failed: {}", e);
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn send(&mut self, data: Bytes) -> BoxFuture<'_, Result<usize>> {
        async move {
            if !self.liveness.is_alive() {
                return Err(Error::NotConnected);
            }
            let writer = self.writer.as_mut().ok_or(Error::NotConnected)?;
            tracing::trace!("sending {:?}", String::from_utf8_lossy(&data));
            write_fully(writer, &data).await
        }
        .boxed()
    }

    fn take_receiver(&mut self) -> Option<Receiver> {
        let reader = self.reader.take()?;
        Some(Receiver::new(
            Box::new(reader),
            self.config.read_timeout,
            self.liveness.clone(),
        ))
    }

    fn is_connected(&self) -> bool {
        self.writer.is_some() && self.liveness.is_alive()
    }
}
