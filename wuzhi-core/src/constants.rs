//! Protocol constants

use std::time::Duration;

/// Device address, first byte of every frame
pub const DEVICE_ADDRESS: u8 = 0x01;

/// Function codes
pub mod function {
    /// Read holding registers
    pub const READ: u8 = 0x03;

    /// Write single register
    pub const WRITE: u8 = 0x06;
}

/// Register addresses
pub mod register {
    /// Voltage setpoint (0.01 V)
    pub const VOLTAGE: u16 = 0x0000;

    /// Current setpoint (0.01 A)
    pub const CURRENT: u16 = 0x0001;

    /// Output switch
    pub const OUTPUT: u16 = 0x0012;

    /// Display backlight level
    pub const BACKLIGHT: u16 = 0x0014;

    /// Auto-off timeout (minutes)
    pub const TIMEOUT: u16 = 0x0015;

    /// Buzzer switch
    pub const BUZZER: u16 = 0x001c;

    /// Restart trigger
    pub const RESTART: u16 = 0x002f;

    /// First register of the status block
    pub const STATUS_BLOCK: u16 = 0x0000;

    /// Registers in the status block
    pub const STATUS_COUNT: u16 = 0x001e;

    /// First register of the limits block
    pub const LIMITS_BLOCK: u16 = 0x0050;

    /// Registers in the limits block
    pub const LIMITS_COUNT: u16 = 0x000e;
}

/// Setter clamp ranges
pub mod range {
    use std::ops::RangeInclusive;

    pub const VOLTAGE: RangeInclusive<f64> = 0.0..=125.0;
    pub const CURRENT: RangeInclusive<f64> = 0.0..=22.0;
    pub const BACKLIGHT: RangeInclusive<i64> = 0..=5;
    pub const BUZZER: RangeInclusive<i64> = 0..=1;
    pub const TIMEOUT: RangeInclusive<i64> = 0..=100_000;
}

/// Default device MAC address
pub const DEFAULT_ADDRESS: &str = "FB:5E:94:63:70:0C";

/// Deadline for a single attempt
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Attempts per query
pub const MAX_ATTEMPTS: u32 = 3;

/// Pause between attempts
pub const RETRY_BACKOFF: Duration = Duration::from_millis(100);
