//! # wuzhi
//!
//! Async control of Wuzhi bench power supplies over a notification-based
//! transport.
//!
//! ## Features
//!
//! - Table-driven reply decoding with CRC verification
//! - One in-flight request per correlation key, timed out and retried
//! - Pluggable transports and event sinks
//!
//! ## Quick Start
//!
//! ```no_run
//! use wuzhi::Device;
//!
//! #[tokio::main]
//! async fn main() -> wuzhi::Result<()> {
//!     // Connect through a BLE-to-UDP bridge
//!     let mut device = Device::new_udp("127.0.0.1:8231");
//!     device.connect().await?;
//!
//!     let status = device.get_status().await?;
//!     if let Some(report) = status.report() {
//!         println!("{}: {:?}", report.kind, report.get("volt_out"));
//!     }
//!
//!     device.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod correlation;
pub mod device;
pub mod error;
pub mod events;

// Re-exports
pub use device::{Device, PreConnectHook};
pub use error::{Error, Result};
pub use events::{Event, EventSink, MemorySink, TracingSink};

// Re-export protocol types
pub use wuzhi_core::{Command, FieldValue, Frame, Reply, Report, ReportKind};
pub use wuzhi_transport::{Transport, UdpTransport};
