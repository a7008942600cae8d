//! High-level error types

use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Core protocol error: {0}")]
    Core(#[from] wuzhi_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] wuzhi_transport::Error),

    #[error("Device not connected")]
    NotConnected,

    #[error("A request for key 0x{key:02x} is already in flight")]
    SlotBusy { key: u8 },

    #[error("No reply for key 0x{key:02x} on attempt {attempt} within {after:?}")]
    Timeout {
        key: u8,
        attempt: u32,
        after: Duration,
    },

    #[error("Command {command} failed after {attempts} tries")]
    CommandFailed { command: String, attempts: u32 },
}

impl Error {
    /// Check if another attempt of the same command might succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(err) => err.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let timeout = Error::Timeout {
            key: 0x01,
            attempt: 1,
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_recoverable());
        assert!(Error::Transport(wuzhi_transport::Error::ConnectionTimeout).is_recoverable());

        assert!(!Error::NotConnected.is_recoverable());
        assert!(!Error::SlotBusy { key: 0x01 }.is_recoverable());
        assert!(!Error::Core(wuzhi_core::Error::ValueTooWide {
            value: 100_000,
            bits: 16
        })
        .is_recoverable());
    }

    #[test]
    fn test_command_failed_message() {
        let err = Error::CommandFailed {
            command: "read_status".into(),
            attempts: 3,
        };
        assert_eq!(err.to_string(), "Command read_status failed after 3 tries");
    }
}
