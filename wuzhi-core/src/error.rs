//! Error types for wuzhi-core

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Frame is too short for its trailer or its reply shape
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    FrameTooShort {
        expected: usize,
        actual: usize,
    },

    /// Checksum verification failed
    #[error("CRC mismatch: expected {expected:02x?}, received {received:02x?}")]
    CrcMismatch {
        expected: [u8; 2],
        received: [u8; 2],
    },

    /// A setter value does not fit its register even after clamping
    #[error("Value {value} does not fit a {bits}-bit register")]
    ValueTooWide {
        value: i64,
        bits: u32,
    },
}
