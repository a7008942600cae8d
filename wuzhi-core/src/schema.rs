//! Declarative reply schemas
//!
//! Structured replies are described by a table of [`FieldSpec`]s per
//! [`ReplyShape`]. A single routine walks the table, so a new reply shape is
//! a new table entry.
//!
//! Offsets are into the frame with the CRC trailer already stripped. Byte 2
//! of that frame is the discriminator which selects the shape.
//!
//! # 32-bit accumulators
//!
//! The energy counters are sent as two 16-bit halves with the high half
//! stored after the low half, and each half big-endian:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ off      │ off+1    │ off+2    │ off+3    │
//! │ bits 8-15│ bits 0-7 │bits 24-31│bits 16-23│
//! └──────────┴──────────┴──────────┴──────────┘
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Decimal scale of a fixed-point field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scale {
    Unit,
    Tenths,
    Hundredths,
    Thousandths,
}

impl Scale {
    /// Divisor applied to the raw integer
    pub const fn divisor(self) -> i64 {
        match self {
            Self::Unit => 1,
            Self::Tenths => 10,
            Self::Hundredths => 100,
            Self::Thousandths => 1000,
        }
    }

    /// Number of decimals shown
    pub const fn decimals(self) -> usize {
        match self {
            Self::Unit => 0,
            Self::Tenths => 1,
            Self::Hundredths => 2,
            Self::Thousandths => 3,
        }
    }
}

/// Wire width of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    /// 16-bit big-endian
    Word,
    /// 32-bit accumulator with the high half stored second
    SplitDword,
}

impl Width {
    /// Number of bytes occupied on the wire
    pub const fn len(self) -> usize {
        match self {
            Self::Word => 2,
            Self::SplitDword => 4,
        }
    }
}

/// One field of a reply schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub width: Width,
    pub scale: Scale,
    pub signed: bool,
}

impl FieldSpec {
    /// Unsigned 16-bit field
    pub const fn word(name: &'static str, offset: usize, scale: Scale) -> Self {
        Self {
            name,
            offset,
            width: Width::Word,
            scale,
            signed: false,
        }
    }

    /// Unsigned 32-bit accumulator field
    pub const fn split_dword(name: &'static str, offset: usize, scale: Scale) -> Self {
        Self {
            name,
            offset,
            width: Width::SplitDword,
            scale,
            signed: false,
        }
    }

    /// First byte past the end of this field
    pub const fn end(&self) -> usize {
        self.offset + self.width.len()
    }

    /// Read the raw integer from a frame long enough to hold the field
    fn read(&self, data: &[u8]) -> i64 {
        let at = self.offset;
        let raw = match self.width {
            Width::Word => u16::from_be_bytes([data[at], data[at + 1]]) as u32,
            Width::SplitDword => {
                u16::from_be_bytes([data[at], data[at + 1]]) as u32
                    | (data[at + 2] as u32) << 24
                    | (data[at + 3] as u32) << 16
            }
        };

        match (self.signed, self.width) {
            (false, _) => raw as i64,
            (true, Width::Word) => raw as u16 as i16 as i64,
            (true, Width::SplitDword) => raw as i32 as i64,
        }
    }
}

/// Fixed-point field value
///
/// Holds the raw integer untouched; scaling happens only for display and
/// conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldValue {
    raw: i64,
    scale: Scale,
}

impl FieldValue {
    pub const fn new(raw: i64, scale: Scale) -> Self {
        Self { raw, scale }
    }

    /// Raw integer as sent by the device
    pub const fn raw(&self) -> i64 {
        self.raw
    }

    pub const fn scale(&self) -> Scale {
        self.scale
    }

    /// Scaled value
    pub fn as_f64(&self) -> f64 {
        self.raw as f64 / self.scale.divisor() as f64
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let decimals = self.scale.decimals();
        if decimals == 0 {
            return write!(f, "{}", self.raw);
        }

        let divisor = self.scale.divisor().unsigned_abs();
        let magnitude = self.raw.unsigned_abs();
        let sign = if self.raw < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{}.{:0width$}",
            magnitude / divisor,
            magnitude % divisor,
            width = decimals
        )
    }
}

/// Structured reply kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Settings,
    Limits,
}

impl ReportKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Settings => "Status",
            Self::Limits => "Limits",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded structured reply, fields in schema order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub kind: ReportKind,
    fields: Vec<(&'static str, FieldValue)>,
}

impl Report {
    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| *value)
    }

    /// Fields in schema order
    pub fn fields(&self) -> impl Iterator<Item = (&'static str, FieldValue)> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Layout of one structured reply
#[derive(Debug)]
pub struct ReplyShape {
    pub kind: ReportKind,
    pub discriminator: u8,
    pub fields: &'static [FieldSpec],
}

impl ReplyShape {
    /// Minimum frame length (trailer stripped) that holds every field
    pub fn min_len(&self) -> usize {
        self.fields.iter().map(FieldSpec::end).max().unwrap_or(0)
    }

    /// Decode a CRC-verified frame (trailer stripped) against this shape
    pub fn decode(&self, data: &[u8]) -> Result<Report> {
        let expected = self.min_len();
        if data.len() < expected {
            return Err(Error::FrameTooShort {
                expected,
                actual: data.len(),
            });
        }

        let fields = self
            .fields
            .iter()
            .map(|spec| (spec.name, FieldValue::new(spec.read(data), spec.scale)))
            .collect();

        Ok(Report {
            kind: self.kind,
            fields,
        })
    }
}

/// Byte offset of the discriminator
pub const DISCRIMINATOR_OFFSET: usize = 2;

/// Status reply: live readings and device settings
pub const SETTINGS: ReplyShape = ReplyShape {
    kind: ReportKind::Settings,
    discriminator: 0x3c,
    fields: &[
        FieldSpec::word("volt_in", 13, Scale::Hundredths),
        FieldSpec::word("volt_set", 3, Scale::Hundredths),
        FieldSpec::word("amps_set", 5, Scale::Hundredths),
        FieldSpec::word("volt_out", 7, Scale::Hundredths),
        FieldSpec::word("amps_out", 9, Scale::Hundredths),
        FieldSpec::word("w_out", 11, Scale::Tenths),
        FieldSpec::split_dword("ah_out", 15, Scale::Thousandths),
        FieldSpec::split_dword("wh_out", 19, Scale::Thousandths),
        FieldSpec::word("on_time_h", 23, Scale::Unit),
        FieldSpec::word("on_time_m", 25, Scale::Unit),
        FieldSpec::word("on_time_s", 27, Scale::Unit),
        FieldSpec::word("s_temp", 29, Scale::Tenths),
        FieldSpec::word("p_temp", 31, Scale::Tenths),
        FieldSpec::word("keylock", 33, Scale::Unit),
        FieldSpec::word("protection", 35, Scale::Unit),
        FieldSpec::word("outstate", 37, Scale::Unit),
        FieldSpec::word("powerbtn", 39, Scale::Unit),
        FieldSpec::word("reserved", 41, Scale::Unit),
        FieldSpec::word("backlight", 43, Scale::Unit),
        FieldSpec::word("timeout", 45, Scale::Unit),
        FieldSpec::word("product", 47, Scale::Unit),
    ],
};

/// Limits reply: protection thresholds
pub const LIMITS: ReplyShape = ReplyShape {
    kind: ReportKind::Limits,
    discriminator: 0x1c,
    fields: &[
        FieldSpec::word("volt_set", 3, Scale::Hundredths),
        FieldSpec::word("amps_set", 5, Scale::Hundredths),
        FieldSpec::word("lvp", 7, Scale::Hundredths),
        FieldSpec::word("ovp", 9, Scale::Hundredths),
        FieldSpec::word("ocp", 11, Scale::Hundredths),
        FieldSpec::word("opp", 13, Scale::Tenths),
        FieldSpec::word("ohp_h", 15, Scale::Unit),
        FieldSpec::word("ohp_m", 17, Scale::Unit),
        FieldSpec::split_dword("oah", 19, Scale::Thousandths),
        FieldSpec::split_dword("owh", 23, Scale::Hundredths),
        FieldSpec::word("otp", 27, Scale::Tenths),
        FieldSpec::word("ini", 29, Scale::Unit),
    ],
};

/// All known structured reply shapes
pub static SHAPES: [&ReplyShape; 2] = [&SETTINGS, &LIMITS];

/// Find the shape registered for a discriminator byte
pub fn shape_for(discriminator: u8) -> Option<&'static ReplyShape> {
    SHAPES
        .iter()
        .copied()
        .find(|shape| shape.discriminator == discriminator)
}

// Unscaled fields serialize as integers, scaled ones as numbers
#[cfg(feature = "serde")]
impl serde::Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.scale {
            Scale::Unit => serializer.serialize_i64(self.raw),
            _ => serializer.serialize_f64(self.as_f64()),
        }
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Report {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
