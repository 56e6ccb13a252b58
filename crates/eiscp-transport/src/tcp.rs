use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Well-known eISCP control port.
pub const DEFAULT_PORT: u16 = 60128;

/// Configuration for opening the device connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on connection establishment. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm. Packets are 32 bytes, so batching only adds latency.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            nodelay: true,
        }
    }
}

/// Normalize a device address into `host:port` form.
///
/// Accepts `host:port`, a bare host or IP (default port appended), and
/// `:port` (loopback).
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    if address.is_empty() {
        return format!("127.0.0.1:{DEFAULT_PORT}");
    }
    if address.parse::<SocketAddr>().is_ok() {
        return address.to_string();
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    if let Some(port) = address.strip_prefix(':') {
        if port.parse::<u16>().is_ok() {
            return format!("127.0.0.1:{port}");
        }
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            address.to_string()
        }
        _ => format!("{address}:{DEFAULT_PORT}"),
    }
}

/// Connect to a device with default configuration.
pub async fn connect(address: &str) -> Result<TcpStream> {
    connect_with_config(address, &TransportConfig::default()).await
}

/// Connect to a device with explicit configuration.
pub async fn connect_with_config(address: &str, config: &TransportConfig) -> Result<TcpStream> {
    let address = normalize_address(address);

    let stream = match config.connect_timeout {
        Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::Timeout {
                address: address.clone(),
                timeout,
            })?,
        None => TcpStream::connect(&address).await,
    }
    .map_err(|source| TransportError::Connect {
        address: address.clone(),
        source,
    })?;

    if config.nodelay {
        stream.set_nodelay(true)?;
    }

    info!(%address, "connected to device");
    Ok(stream)
}

/// Listens for controller connections, playing the device side of the link.
pub struct DeviceListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl DeviceListener {
    /// Bind to an address. Port `0` picks an ephemeral port.
    pub async fn bind(address: &str) -> Result<Self> {
        let address = normalize_address(address);
        let listener =
            TcpListener::bind(&address)
                .await
                .map_err(|source| TransportError::Bind {
                    address: address.clone(),
                    source,
                })?;
        let local_addr = listener.local_addr()?;

        info!(%local_addr, "listening for controllers");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next controller connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted controller");
        Ok((stream, peer))
    }

    /// The bound address (with the resolved port when bound to `:0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn normalize_keeps_host_and_port() {
        assert_eq!(normalize_address("10.0.0.5:60128"), "10.0.0.5:60128");
        assert_eq!(normalize_address("receiver.local:1234"), "receiver.local:1234");
        assert_eq!(normalize_address("[::1]:60128"), "[::1]:60128");
    }

    #[test]
    fn normalize_appends_default_port() {
        assert_eq!(normalize_address("10.0.0.5"), "10.0.0.5:60128");
        assert_eq!(normalize_address("receiver.local"), "receiver.local:60128");
        assert_eq!(normalize_address("::1"), "[::1]:60128");
    }

    #[test]
    fn normalize_bare_ipv6_is_not_a_port() {
        assert_eq!(normalize_address("::"), "[::]:60128");
        assert_eq!(normalize_address("::ffff:10.0.0.5"), "[::ffff:10.0.0.5]:60128");
        assert_eq!(normalize_address("fe80::1"), "[fe80::1]:60128");
    }

    #[test]
    fn normalize_port_only_means_loopback() {
        assert_eq!(normalize_address(":60128"), "127.0.0.1:60128");
        assert_eq!(normalize_address(""), "127.0.0.1:60128");
    }

    #[tokio::test]
    async fn bind_accept_connect() {
        let listener = DeviceListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();
        assert_ne!(addr.port(), 0);
        assert_eq!(listener.transport_name(), "tcp");

        let server = tokio::spawn(async move {
            let (mut stream, _peer) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut client = connect(&addr.to_string()).await.unwrap();
        client.write_all(b"hello").await.unwrap();

        assert_eq!(&server.await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn connect_refused_reports_address() {
        let port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };

        let err = connect(&format!("127.0.0.1:{port}")).await.unwrap_err();
        match err {
            TransportError::Connect { address, .. } => {
                assert_eq!(address, format!("127.0.0.1:{port}"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn bind_rejects_address_in_use() {
        let first = DeviceListener::bind("127.0.0.1:0").await.unwrap();
        let result = DeviceListener::bind(&first.local_addr().to_string()).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));
    }
}
