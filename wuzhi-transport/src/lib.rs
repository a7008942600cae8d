//! Transport layer for Wuzhi power supplies
//!
//! The protocol engine only needs three primitives: connect, a callback for
//! inbound frames, and a fire-and-forget write. One transport chunk carries
//! exactly one frame.

pub mod error;
pub mod udp;

pub use error::{Error, Result};
pub use udp::UdpTransport;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// Callback invoked for every inbound frame
pub type FrameHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Transport trait for different communication methods
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to device
    async fn connect(&mut self) -> Result<()>;

    /// Disconnect from device
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Register the inbound frame callback, replacing any previous one
    ///
    /// Must be called after `connect` and before the first `write`.
    async fn subscribe(&mut self, handler: FrameHandler) -> Result<()>;

    /// Send one frame
    ///
    /// Success only means the bytes left this host; delivery is known only
    /// from a matching reply.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Get remote address
    fn remote_addr(&self) -> String;
}
