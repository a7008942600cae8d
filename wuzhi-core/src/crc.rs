//! Frame checksum
//!
//! Every frame ends with a 16-bit CRC over all preceding bytes:
//! 1. Register starts at 0xFFFF, polynomial 0x8005
//! 2. Each input byte is bit-reversed before it is XORed into the high byte
//! 3. The final register is bit-reversed, then byte-swapped
//! 4. Emitted as 2 big-endian bytes
//!
//! This is the CRC-16/MODBUS checksum with the low byte sent first.

use tracing::trace;

/// Generator polynomial
pub const POLY: u16 = 0x8005;

/// Initial register value
pub const INIT: u16 = 0xFFFF;

/// Length of the checksum trailer in bytes
pub const TRAILER_LEN: usize = 2;

/// Calculate the checksum trailer for `data`
///
/// # Algorithm
///
/// ```text
/// crc = 0xFFFF
/// for byte in data:
///     crc ^= reverse8(byte) << 8
///     8 times: crc = (crc << 1) ^ (0x8005 if msb set)
/// return swap_bytes(reverse16(crc)) as big-endian
/// ```
///
/// # Examples
///
/// ```
/// use wuzhi_core::crc;
///
/// let trailer = crc::calculate(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]);
/// assert_eq!(trailer, [0x84, 0x0A]);
/// ```
pub fn calculate(data: &[u8]) -> [u8; 2] {
    let mut crc = INIT;

    for &byte in data {
        crc ^= (byte.reverse_bits() as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    let trailer = crc.reverse_bits().swap_bytes().to_be_bytes();

    trace!(
        len = data.len(),
        crc = format!("{:02x}{:02x}", trailer[0], trailer[1]),
        "Calculated CRC"
    );

    trailer
}

/// Verify the trailing checksum of a complete frame
///
/// Frames shorter than the trailer never verify.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < TRAILER_LEN {
        return false;
    }
    let (body, trailer) = frame.split_at(frame.len() - TRAILER_LEN);
    calculate(body) == trailer
}

/// Return `data` with its checksum trailer appended
pub fn append(data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(data.len() + TRAILER_LEN);
    frame.extend_from_slice(data);
    frame.extend_from_slice(&calculate(data));
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_crc_empty_input() {
        assert_eq!(calculate(&[]), [0xFF, 0xFF]);
        assert_eq!(calculate(&[]), calculate(&[]));
    }

    #[test]
    fn test_crc_check_value() {
        // CRC-16/MODBUS check value is 0x4B37, sent low byte first
        assert_eq!(calculate(b"123456789"), [0x37, 0x4B]);
    }

    #[test]
    fn test_crc_read_register_frame() {
        assert_eq!(calculate(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), [0x84, 0x0A]);
    }

    #[test]
    fn test_verify_short_frames() {
        assert!(!verify(&[]));
        assert!(!verify(&[0xFF]));
        // Empty body with the matching trailer is a valid frame
        assert!(verify(&[0xFF, 0xFF]));
    }

    #[test]
    fn test_verify_rejects_wrong_trailer() {
        let mut frame = append(&[0x01, 0x06, 0x00, 0x12, 0x00, 0x01]);
        assert!(verify(&frame));

        let last = frame.len() - 1;
        frame[last] = frame[last].wrapping_add(1);
        assert!(!verify(&frame));
    }

    #[test]
    fn test_trailer_is_not_symmetric() {
        // The trailer must not verify when its two bytes are swapped
        let data = [0x01, 0x03, 0x00, 0x50, 0x00, 0x0e];
        let [hi, lo] = calculate(&data);
        assert_ne!(hi, lo);

        let mut frame = data.to_vec();
        frame.extend_from_slice(&[lo, hi]);
        assert!(!verify(&frame));
    }

    proptest! {
        #[test]
        fn prop_appended_crc_verifies(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            prop_assert!(verify(&append(&data)));
        }

        #[test]
        fn prop_single_bit_flip_fails(
            data in proptest::collection::vec(any::<u8>(), 0..128),
            bit in any::<proptest::sample::Index>(),
        ) {
            let mut frame = append(&data);
            let bit = bit.index(frame.len() * 8);
            frame[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(!verify(&frame));
        }
    }
}
