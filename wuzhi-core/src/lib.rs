//! # wuzhi-core
//!
//! Core protocol implementation for Wuzhi bench power supplies.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame encoding and reply decoding
//! - CRC calculation
//! - Reply schemas (fixed-point field tables)
//! - Command templates
//! - Protocol constants
//!
//! It performs no I/O; see `wuzhi-transport` and `wuzhi` for that.

pub mod command;
pub mod constants;
pub mod crc;
pub mod error;
pub mod frame;
pub mod schema;

pub use command::Command;
pub use error::{Error, Result};
pub use frame::{Frame, Reply};
pub use schema::{FieldValue, Report, ReportKind};
