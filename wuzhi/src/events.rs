//! Engine events
//!
//! The engine reports what happens on the wire through an [`EventSink`]
//! handed to it at construction, instead of logging on its own. The default
//! [`TracingSink`] forwards to `tracing`; [`MemorySink`] keeps events for
//! inspection.

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use wuzhi_core::frame::nice_hex;

/// Something observable happened in the engine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Session established
    Connected { remote: String },
    /// Optional pre-connect step failed and was skipped
    PreConnectFailed { address: String, reason: String },
    /// Request handed to the transport
    FrameSent { key: u8, attempt: u32, frame: Bytes },
    /// Raw inbound frame, before validation
    FrameReceived { frame: Bytes },
    /// Inbound frame dropped for a bad CRC
    CrcMismatch { expected: [u8; 2], received: [u8; 2] },
    /// Inbound frame dropped because it could not be decoded
    MalformedFrame { error: wuzhi_core::Error },
    /// A pending request received its reply
    Resolved { key: u8 },
    /// Valid reply with no request waiting for it
    UnexpectedReply { key: Option<u8> },
    /// An attempt passed its deadline
    AttemptTimedOut { key: u8, attempt: u32 },
    /// An attempt failed and the command will be sent again
    Retrying { command: String, attempt: u32, reason: String },
    /// Retry budget exhausted
    CommandFailed { command: String, attempts: u32 },
}

/// Receiver of engine events
pub trait EventSink: Send + Sync {
    fn record(&self, event: Event);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: Event) {
        match event {
            Event::Connected { remote } => info!("Connected to {}", remote),
            Event::PreConnectFailed { address, reason } => {
                warn!("Pre-connect step for {} failed: {}", address, reason)
            }
            Event::FrameSent { key, attempt, frame } => {
                debug!(key, attempt, "Sending: {}", nice_hex(&frame))
            }
            Event::FrameReceived { frame } => debug!("Callback: {}", nice_hex(&frame)),
            Event::CrcMismatch { expected, received } => error!(
                "CRC mismatch: {:02x}{:02x} vs. {:02x}{:02x}",
                received[0], received[1], expected[0], expected[1]
            ),
            Event::MalformedFrame { error } => warn!("Dropping malformed frame: {}", error),
            Event::Resolved { key } => trace!(key, "Resolved pending request"),
            Event::UnexpectedReply { key } => {
                warn!(?key, "Discarding reply with no pending request")
            }
            Event::AttemptTimedOut { key, attempt } => {
                warn!(key, attempt, "Timed out waiting for response")
            }
            Event::Retrying {
                command,
                attempt,
                reason,
            } => info!("{}. try of {} failed ({}), retrying...", attempt, command, reason),
            Event::CommandFailed { command, attempts } => {
                error!("Command {} failed after {} tries", command, attempts)
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|event| predicate(event)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: Event) {
        self.events.lock().push(event);
    }
}
