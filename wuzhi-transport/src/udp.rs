//! UDP transport
//!
//! Talks to a BLE-to-UDP bridge (or a device simulator) that forwards each
//! GATT write as one datagram and each notification back as one datagram.
//! Datagram boundaries are frame boundaries.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::{error::*, FrameHandler, Transport};

/// Largest datagram accepted from the bridge
const MAX_DATAGRAM: usize = 512;

/// UDP transport to a frame bridge
pub struct UdpTransport {
    endpoint: String,
    bind_addr: String,
    socket: Option<Arc<UdpSocket>>,
    remote_addr: Option<SocketAddr>,
    listener: Option<JoinHandle<()>>,
    connect_timeout: Duration,
}

impl UdpTransport {
    /// Create new UDP transport for a `host:port` endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            bind_addr: "0.0.0.0:0".to_string(),
            socket: None,
            remote_addr: None,
            listener: None,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Set connection timeout (covers address resolution)
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set local bind address
    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    /// Resolve endpoint to SocketAddr
    async fn resolve_addr(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.remote_addr {
            return Ok(addr);
        }

        let addrs: Vec<SocketAddr> = timeout(
            self.connect_timeout,
            tokio::net::lookup_host(self.endpoint.as_str()),
        )
        .await
        .map_err(|_| Error::ConnectionTimeout)?
        .map_err(|e| Error::InvalidAddress(format!("{}: {}", self.endpoint, e)))?
        .collect();

        let addr = addrs
            .first()
            .ok_or_else(|| Error::InvalidAddress(format!("No addresses found for {}", self.endpoint)))?;

        self.remote_addr = Some(*addr);
        Ok(*addr)
    }

    fn stop_listener(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(Error::AlreadyConnected);
        }

        let remote = self.resolve_addr().await?;

        debug!("Connecting to {} via UDP...", remote);

        let socket = UdpSocket::bind(self.bind_addr.as_str()).await.map_err(|e| {
            warn!("Bind to {} failed: {}", self.bind_addr, e);
            Error::ConnectionFailed(remote.to_string())
        })?;

        // Sets the default send/recv peer
        socket.connect(remote).await.map_err(|e| {
            warn!("Connect to {} failed: {}", remote, e);
            Error::ConnectionFailed(remote.to_string())
        })?;

        debug!("Connected to {} via UDP", remote);

        self.socket = Some(Arc::new(socket));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop_listener();

        if let Some(_socket) = self.socket.take() {
            debug!("Disconnecting from {}...", self.remote_addr());
        }

        self.remote_addr = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    async fn subscribe(&mut self, handler: FrameHandler) -> Result<()> {
        let socket = self.socket.clone().ok_or(Error::NotConnected)?;

        self.stop_listener();

        self.listener = Some(tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                match socket.recv(&mut buf).await {
                    Ok(0) => trace!("Ignoring empty datagram"),
                    Ok(n) => {
                        trace!("Received {} bytes via UDP: {:02X?}", n, &buf[..n.min(32)]);
                        handler(Bytes::copy_from_slice(&buf[..n]));
                    }
                    // ICMP errors from an earlier send surface here; the
                    // bridge may come back, so keep listening
                    Err(e) if is_transient(&e) => debug!("Ignoring receive error: {}", e),
                    Err(e) => {
                        warn!("Receive error, notifications stopped: {}", e);
                        break;
                    }
                }
            }
        }));

        debug!("Subscribed to notifications from {}", self.remote_addr());
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let socket = self.socket.as_ref().ok_or(Error::NotConnected)?;

        trace!(
            "Sending {} bytes via UDP: {:02X?}",
            data.len(),
            &data[..data.len().min(32)]
        );

        socket.send(data).await.map_err(Error::Io)?;

        Ok(())
    }

    fn remote_addr(&self) -> String {
        self.remote_addr
            .map(|addr| addr.to_string())
            .unwrap_or_else(|| self.endpoint.clone())
    }
}

/// Receive errors that concern a single datagram, not the socket
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::InvalidData
    )
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_udp_transport_create() {
        let transport = UdpTransport::new("127.0.0.1:8231");
        assert!(!transport.is_connected());
        assert_eq!(transport.remote_addr(), "127.0.0.1:8231");
    }

    #[tokio::test]
    async fn test_udp_transport_invalid_address() {
        let mut transport = UdpTransport::new("invalid..address:8231")
            .with_connect_timeout(Duration::from_millis(100));

        let result = transport.connect().await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_udp_write_requires_connection() {
        let mut transport = UdpTransport::new("127.0.0.1:8231");
        assert!(matches!(transport.write(&[0x01]).await, Err(Error::NotConnected)));

        let handler: FrameHandler = Arc::new(|_| {});
        assert!(matches!(transport.subscribe(handler).await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_udp_round_trip_through_bridge() {
        let bridge = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = bridge.local_addr().unwrap().to_string();

        let mut transport = UdpTransport::new(endpoint).with_bind_addr("127.0.0.1:0");
        transport.connect().await.unwrap();
        assert!(transport.is_connected());

        let (tx, mut rx) = mpsc::unbounded_channel();
        transport
            .subscribe(Arc::new(move |frame| {
                let _ = tx.send(frame);
            }))
            .await
            .unwrap();

        transport.write(&[0x01, 0x03, 0x00]).await.unwrap();

        let mut buf = [0u8; 16];
        let (n, peer) = bridge.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[0x01, 0x03, 0x00]);

        bridge.send_to(&[0x01, 0x06, 0x00, 0x12], peer).await.unwrap();

        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&frame[..], &[0x01, 0x06, 0x00, 0x12]);

        transport.disconnect().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_reply_after_refused_send_is_delivered() {
        // Reserve a port, then close it so the first send is refused
        let reserved = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = reserved.local_addr().unwrap();
        drop(reserved);

        let mut transport = UdpTransport::new(endpoint.to_string()).with_bind_addr("127.0.0.1:0");
        transport.connect().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        transport
            .subscribe(Arc::new(move |frame| {
                let _ = tx.send(frame);
            }))
            .await
            .unwrap();

        let _ = transport.write(&[0x01, 0x03, 0x00]).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Bridge comes up on the same port
        let bridge = UdpSocket::bind(endpoint).await.unwrap();
        transport.write(&[0x01, 0x03, 0x00]).await.unwrap();

        let mut buf = [0u8; 16];
        let (_, peer) = timeout(Duration::from_secs(1), bridge.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        bridge.send_to(&[0x01, 0x06, 0x00, 0x12], peer).await.unwrap();

        let frame = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .expect("listener still running");
        assert_eq!(&frame[..], &[0x01, 0x06, 0x00, 0x12]);
    }

    #[test]
    fn test_transient_receive_errors() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(is_transient(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }
}
