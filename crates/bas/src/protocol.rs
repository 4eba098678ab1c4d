//! Relay board wire protocol
//!
//! Relay writes use Modbus-RTU "write single coil" framing:
//!
//! ```text
//! ┌──────┬──────┬──────────────┬──────────────┬──────────────┐
//! │ 0xFF │ 0x05 │ relay (BE16) │ value (BE16) │ CRC-16 (LE)  │
//! └──────┴──────┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! The board answers, but the engine never reads responses.

use bytes::{BufMut, Bytes, BytesMut};

/// Address byte the relay boards listen on
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Modbus function code for "write single coil"
pub const WRITE_SINGLE_COIL: u8 = 0x05;

pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

/// Encoded frame length including the CRC
pub const FRAME_LEN: usize = 8;

const CRC_POLY: u16 = 0xA001;

/// Modbus CRC-16 (reflected polynomial 0xA001, initial value 0xFFFF)
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC_POLY
            } else {
                crc >> 1
            };
        }
    }
    crc
}

/// Encode a write-single-coil frame for `relay`
pub fn encode_write_coil(relay: u16, on: bool) -> Bytes {
    let mut frame = BytesMut::with_capacity(FRAME_LEN);
    frame.put_u8(BROADCAST_ADDRESS);
    frame.put_u8(WRITE_SINGLE_COIL);
    frame.put_u16(relay);
    frame.put_u16(if on { COIL_ON } else { COIL_OFF });

    let crc = crc16(&frame);
    frame.put_u16_le(crc);
    frame.freeze()
}

/// Check frame length and trailing checksum
pub fn verify_frame(frame: &[u8]) -> bool {
    if frame.len() != FRAME_LEN {
        return false;
    }
    let (body, trailer) = frame.split_at(FRAME_LEN - 2);
    crc16(body) == u16::from_le_bytes([trailer[0], trailer[1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_reference_vector() {
        // Standard Modbus check value for "123456789"
        assert_eq!(crc16(b"123456789"), 0x4B37);
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn test_encode_relay_one_on_golden_frame() {
        let frame = encode_write_coil(1, true);

        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[..], &[0xFF, 0x05, 0x00, 0x01, 0xFF, 0x00, 0xC8, 0x24]);

        let crc = crc16(&frame[..6]);
        assert_eq!(frame[6], (crc & 0xFF) as u8);
        assert_eq!(frame[7], (crc >> 8) as u8);
        assert!(verify_frame(&frame));
    }

    #[test]
    fn test_encode_uses_big_endian_relay_and_off_payload() {
        let frame = encode_write_coil(0x1234, false);
        assert_eq!(&frame[..6], &[0xFF, 0x05, 0x12, 0x34, 0x00, 0x00]);
        assert!(verify_frame(&frame));
    }

    #[test]
    fn test_encode_relay_zero_off_golden_frame() {
        let frame = encode_write_coil(0, false);
        assert_eq!(&frame[..], &[0xFF, 0x05, 0x00, 0x00, 0x00, 0x00, 0xD8, 0x14]);
    }

    #[test]
    fn test_verify_rejects_corruption() {
        let mut frame = encode_write_coil(2, true).to_vec();
        frame[3] ^= 0x01;
        assert!(!verify_frame(&frame));
        assert!(!verify_frame(&frame[..7]));
    }
}
