//! Command templates
//!
//! Every operation is a single register read or write:
//!
//! ```text
//! read:  [0x01, 0x03, start_hi, start_lo, count_hi, count_lo]
//! write: [0x01, 0x06, reg_hi,   reg_lo,   value_hi, value_lo]
//! ```
//!
//! Numeric setters clamp their argument into the supported range without
//! reporting it.

use std::fmt;
use std::ops::RangeInclusive;

use bytes::{BufMut, BytesMut};
use tracing::debug;

use crate::{
    constants::{function, range, register, DEVICE_ADDRESS},
    error::{Error, Result},
    frame::Frame,
};

/// High-level device commands
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Command {
    /// Read live readings and settings
    ReadStatus,
    /// Read protection limits
    ReadLimits,
    /// Switch the output on or off
    Output(bool),
    /// Set output voltage in volts
    SetVoltage(f64),
    /// Set output current in amperes
    SetCurrent(f64),
    /// Set display backlight level
    SetBacklight(i64),
    /// Switch the buzzer on (1) or off (0)
    SetBuzzer(i64),
    /// Set auto-off timeout in minutes
    SetTimeout(i64),
    /// Restart the supply
    Restart,
}

impl Command {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadStatus => "read_status",
            Self::ReadLimits => "read_limits",
            Self::Output(true) => "output_on",
            Self::Output(false) => "output_off",
            Self::SetVoltage(_) => "set_voltage",
            Self::SetCurrent(_) => "set_current",
            Self::SetBacklight(_) => "set_backlight",
            Self::SetBuzzer(_) => "set_buzzer",
            Self::SetTimeout(_) => "set_timeout",
            Self::Restart => "restart",
        }
    }

    /// Check if this command only reads from the device
    pub fn is_read(self) -> bool {
        matches!(self, Self::ReadStatus | Self::ReadLimits)
    }

    /// Same command with its argument clamped into the supported range
    pub fn clamped(self) -> Self {
        match self {
            Self::SetVoltage(volts) => Self::SetVoltage(clamp_f64(volts, range::VOLTAGE)),
            Self::SetCurrent(amps) => Self::SetCurrent(clamp_f64(amps, range::CURRENT)),
            Self::SetBacklight(level) => Self::SetBacklight(clamp_i64(level, range::BACKLIGHT)),
            Self::SetBuzzer(level) => Self::SetBuzzer(clamp_i64(level, range::BUZZER)),
            Self::SetTimeout(minutes) => Self::SetTimeout(clamp_i64(minutes, range::TIMEOUT)),
            other => other,
        }
    }

    /// Build the request frame (without CRC)
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueTooWide`] if a clamped value still does not
    /// fit its 16-bit register.
    ///
    /// # Examples
    ///
    /// ```
    /// use wuzhi_core::Command;
    ///
    /// let frame = Command::SetVoltage(30.0).frame().unwrap();
    /// assert_eq!(&frame.body[..], &[0x01, 0x06, 0x00, 0x00, 0x0B, 0xB8]);
    /// ```
    pub fn frame(self) -> Result<Frame> {
        let clamped = self.clamped();
        if clamped != self {
            debug!(requested = %self, applied = %clamped, "Clamped command argument");
        }

        let frame = match clamped {
            Self::ReadStatus => read_registers(register::STATUS_BLOCK, register::STATUS_COUNT),
            Self::ReadLimits => read_registers(register::LIMITS_BLOCK, register::LIMITS_COUNT),
            Self::Output(on) => write_register(register::OUTPUT, on as u16),
            Self::SetVoltage(volts) => write_register(register::VOLTAGE, centi(volts)),
            Self::SetCurrent(amps) => write_register(register::CURRENT, centi(amps)),
            Self::SetBacklight(level) => write_register(register::BACKLIGHT, word(level)?),
            Self::SetBuzzer(level) => write_register(register::BUZZER, word(level)?),
            Self::SetTimeout(minutes) => write_register(register::TIMEOUT, word(minutes)?),
            Self::Restart => write_register(register::RESTART, 0x0001),
        };

        Ok(frame)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SetVoltage(volts) => write!(f, "{}({volts}V)", self.name()),
            Self::SetCurrent(amps) => write!(f, "{}({amps}A)", self.name()),
            Self::SetBacklight(value) | Self::SetBuzzer(value) => {
                write!(f, "{}({value})", self.name())
            }
            Self::SetTimeout(minutes) => write!(f, "{}({minutes}min)", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

fn read_registers(start: u16, count: u16) -> Frame {
    request(function::READ, start, count)
}

fn write_register(register: u16, value: u16) -> Frame {
    request(function::WRITE, register, value)
}

fn request(function: u8, register: u16, value: u16) -> Frame {
    let mut buf = BytesMut::with_capacity(6);
    buf.put_u8(DEVICE_ADDRESS);
    buf.put_u8(function);
    buf.put_u16(register);
    buf.put_u16(value);
    Frame::new(buf.freeze())
}

fn clamp_f64(value: f64, range: RangeInclusive<f64>) -> f64 {
    if !value.is_finite() {
        return *range.start();
    }
    value.clamp(*range.start(), *range.end())
}

fn clamp_i64(value: i64, range: RangeInclusive<i64>) -> i64 {
    value.clamp(*range.start(), *range.end())
}

/// Hundredths of a unit, truncated toward zero
fn centi(value: f64) -> u16 {
    (value * 100.0) as u16
}

fn word(value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::ValueTooWide { value, bits: 16 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn body(command: Command) -> Vec<u8> {
        command.frame().unwrap().body.to_vec()
    }

    #[test]
    fn test_read_templates() {
        assert_eq!(body(Command::ReadStatus), [0x01, 0x03, 0x00, 0x00, 0x00, 0x1e]);
        assert_eq!(body(Command::ReadLimits), [0x01, 0x03, 0x00, 0x50, 0x00, 0x0e]);
    }

    #[test]
    fn test_write_templates() {
        assert_eq!(body(Command::Output(false)), [0x01, 0x06, 0x00, 0x12, 0x00, 0x00]);
        assert_eq!(body(Command::Output(true)), [0x01, 0x06, 0x00, 0x12, 0x00, 0x01]);
        assert_eq!(body(Command::SetCurrent(1.5)), [0x01, 0x06, 0x00, 0x01, 0x00, 0x96]);
        assert_eq!(body(Command::SetBacklight(3)), [0x01, 0x06, 0x00, 0x14, 0x00, 0x03]);
        assert_eq!(body(Command::SetBuzzer(1)), [0x01, 0x06, 0x00, 0x1c, 0x00, 0x01]);
        assert_eq!(body(Command::SetTimeout(90)), [0x01, 0x06, 0x00, 0x15, 0x00, 0x5a]);
        assert_eq!(body(Command::Restart), [0x01, 0x06, 0x00, 0x2f, 0x00, 0x01]);
    }

    #[test]
    fn test_voltage_clamping() {
        assert_eq!(body(Command::SetVoltage(-5.0)), body(Command::SetVoltage(0.0)));
        assert_eq!(body(Command::SetVoltage(999.0)), body(Command::SetVoltage(125.0)));
        assert_eq!(body(Command::SetVoltage(125.0)), [0x01, 0x06, 0x00, 0x00, 0x30, 0xd4]);
        assert_eq!(body(Command::SetVoltage(f64::NAN)), body(Command::SetVoltage(0.0)));
        assert_eq!(body(Command::SetCurrent(f64::INFINITY)), body(Command::SetCurrent(0.0)));
    }

    #[test]
    fn test_integer_clamping() {
        assert_eq!(body(Command::SetCurrent(50.0)), body(Command::SetCurrent(22.0)));
        assert_eq!(body(Command::SetBacklight(-1)), body(Command::SetBacklight(0)));
        assert_eq!(body(Command::SetBacklight(9)), body(Command::SetBacklight(5)));
        assert_eq!(body(Command::SetBuzzer(7)), body(Command::SetBuzzer(1)));
        assert_eq!(Command::SetTimeout(-30).clamped(), Command::SetTimeout(0));
    }

    #[test]
    fn test_timeout_wider_than_register() {
        assert_eq!(body(Command::SetTimeout(65_535)), [0x01, 0x06, 0x00, 0x15, 0xff, 0xff]);
        assert_eq!(
            Command::SetTimeout(250_000).frame(),
            Err(Error::ValueTooWide {
                value: 100_000,
                bits: 16
            })
        );
    }

    #[test]
    fn test_fraction_truncates() {
        // 12.345 V is sent as 1234 hundredths
        assert_eq!(body(Command::SetVoltage(12.345)), [0x01, 0x06, 0x00, 0x00, 0x04, 0xd2]);
    }

    #[test]
    fn test_hundredths_keep_double_precision() {
        let cases = [(1.05, 105u16), (0.53, 53), (1.18, 118), (1.15, 114), (20.1, 2010)];
        for (volts, expected) in cases {
            assert_eq!(&body(Command::SetVoltage(volts))[4..], expected.to_be_bytes(), "{volts} V");
        }
    }

    proptest::proptest! {
        #[test]
        fn test_every_centivolt_step_matches_double_truncation(cents in 0u32..=12_500) {
            let volts = cents as f64 / 100.0;
            let expected = (volts * 100.0).trunc() as u16;
            proptest::prop_assert_eq!(&body(Command::SetVoltage(volts))[4..], &expected.to_be_bytes()[..]);
        }

        #[test]
        fn test_every_centiamp_step_matches_double_truncation(cents in 0u32..=2_200) {
            let amps = cents as f64 / 100.0;
            let expected = (amps * 100.0).trunc() as u16;
            proptest::prop_assert_eq!(&body(Command::SetCurrent(amps))[4..], &expected.to_be_bytes()[..]);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Command::SetVoltage(30.0).to_string(), "set_voltage(30V)");
        assert_eq!(Command::Output(true).to_string(), "output_on");
        assert!(Command::ReadLimits.is_read());
        assert!(!Command::Restart.is_read());
    }
}
