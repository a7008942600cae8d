//! Request/reply correlation
//!
//! Replies arrive as unsolicited notifications. The [`Correlator`] keeps one
//! slot per correlation key and hands each decoded reply to the request
//! waiting in that slot:
//!
//! ```text
//! Idle ──register──▶ Pending ──reply──▶ Resolved ──▶ Idle
//!                       │
//!                       └──deadline──▶ TimedOut ──▶ Idle
//! ```
//!
//! A slot resolves at most once. Whichever of reply and deadline removes the
//! slot first wins; the other becomes a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use wuzhi_core::{frame::correlation_key, Reply};
use wuzhi_transport::FrameHandler;

use crate::error::{Error, Result};
use crate::events::{Event, EventSink};

struct Slot {
    id: u64,
    attempt: u32,
    deadline: Instant,
    tx: oneshot::Sender<Reply>,
}

/// Snapshot of an outstanding request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingInfo {
    pub attempt: u32,
    pub deadline: Instant,
}

/// Slot table for in-flight requests
///
/// Shared between the caller side ([`Correlator::register`]) and the
/// transport's notification callback ([`Correlator::on_frame`]).
pub struct Correlator {
    slots: Mutex<HashMap<u8, Slot>>,
    next_id: AtomicU64,
    sink: Arc<dyn EventSink>,
}

impl Correlator {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            sink,
        }
    }

    /// Open a slot for `key`, due after `timeout`
    ///
    /// # Errors
    ///
    /// Returns [`Error::SlotBusy`] if a request for `key` is still pending.
    pub fn register(self: &Arc<Self>, key: u8, attempt: u32, timeout: Duration) -> Result<Pending> {
        let mut slots = self.slots.lock();
        if slots.contains_key(&key) {
            return Err(Error::SlotBusy { key });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + timeout;
        let (tx, rx) = oneshot::channel();
        slots.insert(
            key,
            Slot {
                id,
                attempt,
                deadline,
                tx,
            },
        );

        Ok(Pending {
            key,
            id,
            attempt,
            deadline,
            timeout,
            rx,
            correlator: Arc::clone(self),
        })
    }

    /// Handle one inbound frame
    ///
    /// Invalid frames and replies nobody waits for are reported to the
    /// event sink and dropped.
    pub fn on_frame(&self, frame: &[u8]) {
        self.sink.record(Event::FrameReceived {
            frame: Bytes::copy_from_slice(frame),
        });

        let reply = match Reply::decode(frame) {
            Ok(reply) => reply,
            Err(wuzhi_core::Error::CrcMismatch { expected, received }) => {
                self.sink.record(Event::CrcMismatch { expected, received });
                return;
            }
            Err(error) => {
                self.sink.record(Event::MalformedFrame { error });
                return;
            }
        };

        let Some(key) = correlation_key(frame) else {
            self.sink.record(Event::UnexpectedReply { key: None });
            return;
        };

        // Deliver under the lock so a waiter that fails to clear the slot
        // always finds the reply in its receiver
        let delivered = {
            let mut slots = self.slots.lock();
            slots
                .remove(&key)
                .is_some_and(|slot| slot.tx.send(reply).is_ok())
        };

        if delivered {
            self.sink.record(Event::Resolved { key });
        } else {
            self.sink.record(Event::UnexpectedReply { key: Some(key) });
        }
    }

    /// Callback to hand to [`wuzhi_transport::Transport::subscribe`]
    pub fn handler(self: &Arc<Self>) -> FrameHandler {
        let correlator = Arc::clone(self);
        Arc::new(move |frame: Bytes| correlator.on_frame(&frame))
    }

    /// Outstanding request for `key`, if any
    pub fn pending(&self, key: u8) -> Option<PendingInfo> {
        self.slots.lock().get(&key).map(|slot| PendingInfo {
            attempt: slot.attempt,
            deadline: slot.deadline,
        })
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }

    pub(crate) fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Remove the slot for `key` if it still belongs to request `id`
    fn clear(&self, key: u8, id: u64) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&key) {
            Some(slot) if slot.id == id => {
                slots.remove(&key);
                true
            }
            _ => false,
        }
    }
}

/// One registered request awaiting its reply
///
/// Dropping it clears the slot.
pub struct Pending {
    key: u8,
    id: u64,
    attempt: u32,
    deadline: Instant,
    timeout: Duration,
    rx: oneshot::Receiver<Reply>,
    correlator: Arc<Correlator>,
}

impl Pending {
    pub fn key(&self) -> u8 {
        self.key
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Suspend until the reply arrives or the deadline passes
    pub async fn wait(mut self) -> Result<Reply> {
        match tokio::time::timeout_at(self.deadline, &mut self.rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(self.timed_out()),
            Err(_) => {
                if self.correlator.clear(self.key, self.id) {
                    return Err(self.timed_out());
                }
                // A reply took the slot right at the deadline and was
                // delivered before the lock was released
                self.rx.try_recv().map_err(|_| self.timed_out())
            }
        }
    }

    fn timed_out(&self) -> Error {
        self.correlator.sink.record(Event::AttemptTimedOut {
            key: self.key,
            attempt: self.attempt,
        });
        Error::Timeout {
            key: self.key,
            attempt: self.attempt,
            after: self.timeout,
        }
    }
}

impl Drop for Pending {
    fn drop(&mut self) {
        self.correlator.clear(self.key, self.id);
    }
}
