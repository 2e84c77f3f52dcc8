// src/common/crc.rs

use super::error::DecodingError;
use crc::{Crc, CRC_16_MODBUS};

/// CRC algorithm used by the LLS frame format (CRC-16/MODBUS).
/// Polynomial: 0x8005 (0xA001 reflected)
/// Initial Value: 0xFFFF
/// Input Reflected: true
/// Output Reflected: true
/// Final XOR: 0x0000
/// Check Value: 0x4B37 (for "123456789")
const CRC_COMPUTER: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Number of checksum bytes at the end of every frame.
pub const CRC_LEN: usize = 2;

/// Calculates the frame checksum over `data`.
///
/// The calculation covers every byte from the address up to the byte
/// *before* the checksum field.
#[inline]
pub fn calculate_crc16(data: &[u8]) -> u16 {
    CRC_COMPUTER.checksum(data)
}

/// Encodes a checksum into its two wire bytes `[LSB, MSB]`.
pub fn encode_crc(crc_value: u16) -> [u8; 2] {
    crc_value.to_le_bytes()
}

/// Decodes two wire bytes (LSB first) into a checksum value.
///
/// # Panics
///
/// Panics if `crc_bytes` does not have a length of exactly 2.
pub fn decode_crc(crc_bytes: &[u8]) -> u16 {
    assert_eq!(crc_bytes.len(), CRC_LEN, "CRC must be 2 bytes long");
    u16::from_le_bytes([crc_bytes[0], crc_bytes[1]])
}

/// Verifies a complete frame whose last two bytes are the checksum.
///
/// # Returns
///
/// * `Ok(())` if the checksum is valid.
/// * `Err(DecodingError::Incomplete)` if the buffer cannot even hold a checksum.
/// * `Err(DecodingError::ChecksumFailure)` if the values differ.
pub fn verify_frame_crc(frame_with_crc: &[u8]) -> Result<(), DecodingError> {
    if frame_with_crc.len() <= CRC_LEN {
        return Err(DecodingError::Incomplete {
            needed: CRC_LEN + 1,
            got: frame_with_crc.len(),
        });
    }
    let data_len = frame_with_crc.len() - CRC_LEN;
    let calculated = calculate_crc16(&frame_with_crc[..data_len]);
    let received = decode_crc(&frame_with_crc[data_len..]);

    if calculated == received {
        Ok(())
    } else {
        Err(DecodingError::ChecksumFailure { received, calculated })
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        assert_eq!(calculate_crc16(b"123456789"), 0x4B37);
    }

    #[test]
    fn test_read_level_request_vector() {
        // 01 03 00 00 -> F1 D8
        let data = [0x01, 0x03, 0x00, 0x00];
        let crc = calculate_crc16(&data);
        assert_eq!(crc, 0xD8F1);
        assert_eq!(encode_crc(crc), [0xF1, 0xD8]);
    }

    #[test]
    fn test_response_vectors() {
        assert_eq!(calculate_crc16(&[0x01, 0x03, 0x02, 0x03, 0xE8]), 0xFAB8);
        assert_eq!(calculate_crc16(&[0x01, 0x04, 0x02, 0x00, 0xFB]), 0xB3F8);
        assert_eq!(calculate_crc16(&[0x01, 0x07, 0x00]), 0x3022);
    }

    #[test]
    fn test_verify_valid_frame() {
        let frame = [0x01, 0x03, 0x02, 0x03, 0xE8, 0xB8, 0xFA];
        assert_eq!(verify_frame_crc(&frame), Ok(()));
    }

    #[test]
    fn test_verify_invalid_cases() {
        // Wrong checksum bytes
        let frame = [0x01, 0x03, 0x02, 0x03, 0xE8, 0xB9, 0xFA];
        assert!(matches!(
            verify_frame_crc(&frame),
            Err(DecodingError::ChecksumFailure { received: 0xFAB9, calculated: 0xFAB8 })
        ));

        // Corrupted data, original checksum
        let frame = [0x01, 0x03, 0x02, 0x03, 0xE9, 0xB8, 0xFA];
        assert!(matches!(verify_frame_crc(&frame), Err(DecodingError::ChecksumFailure { .. })));

        // Too short to carry data and a checksum
        assert!(matches!(verify_frame_crc(&[0xB8, 0xFA]), Err(DecodingError::Incomplete { .. })));
        assert!(matches!(verify_frame_crc(&[]), Err(DecodingError::Incomplete { .. })));
    }

    #[test]
    fn test_crc_byte_order_roundtrip() {
        for crc_val in [0x0000, 0xFFFF, 0x1234, 0xABCD] {
            assert_eq!(decode_crc(&encode_crc(crc_val)), crc_val);
        }
        assert_eq!(encode_crc(0x1234), [0x34, 0x12]);
    }

    #[test]
    #[should_panic]
    fn test_decode_panic_short() {
        decode_crc(&[0xF1]);
    }
}
