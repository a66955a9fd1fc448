//! Checksum calculation algorithms
//!
//! Supports the two checks used by scanner dialects: CRC-16/XMODEM (GM65)
//! and the XOR block check character (M3Y-W).

use serde::{Deserialize, Serialize};

/// Checksum algorithm types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumType {
    /// CRC-16 XMODEM (polynomial 0x1021, init 0x0000), big-endian on the wire
    Crc16Xmodem,
    /// XOR of all bytes
    Bcc,
}

impl ChecksumType {
    /// Get all available checksum types
    pub fn all() -> &'static [ChecksumType] {
        &[ChecksumType::Crc16Xmodem, ChecksumType::Bcc]
    }

    /// Get name of checksum type
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumType::Crc16Xmodem => "CRC-16/XMODEM",
            ChecksumType::Bcc => "BCC",
        }
    }

    /// Get output size in bytes
    pub fn size(&self) -> usize {
        match self {
            ChecksumType::Crc16Xmodem => 2,
            ChecksumType::Bcc => 1,
        }
    }
}

/// Calculate checksum for data, in wire byte order
pub fn calculate(data: &[u8], algorithm: ChecksumType) -> Vec<u8> {
    match algorithm {
        ChecksumType::Crc16Xmodem => crc16_xmodem(data).to_be_bytes().to_vec(),
        ChecksumType::Bcc => vec![bcc(data)],
    }
}

/// Verify data that carries its checksum as the trailing bytes
pub fn verify(data_with_checksum: &[u8], algorithm: ChecksumType) -> bool {
    match algorithm {
        ChecksumType::Crc16Xmodem => crc16_verify(data_with_checksum),
        ChecksumType::Bcc => bcc_verify(data_with_checksum),
    }
}

/// CRC-16/XMODEM, bit-serial
///
/// The accumulator is doubled for every input bit, folded with 0x11021 when
/// bit 16 comes up and with 0x1021 when the data bit is set. Only the final
/// value is masked to 16 bits.
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u32 = 0;

    for &byte in data {
        for bit in (0..8).rev() {
            crc *= 2;
            if crc & 0x1_0000 != 0 {
                crc ^= 0x1_1021;
            }
            if byte & (1 << bit) != 0 {
                crc ^= 0x1021;
            }
        }
    }

    let [_, _, hi, lo] = crc.to_be_bytes();
    u16::from_be_bytes([hi, lo])
}

/// Check a buffer whose last two bytes are its big-endian CRC-16/XMODEM
///
/// Anything shorter than one data byte plus the CRC is rejected.
pub fn crc16_verify(data_with_crc: &[u8]) -> bool {
    if data_with_crc.len() < 3 {
        return false;
    }
    let (data, received) = data_with_crc.split_at(data_with_crc.len() - 2);
    crc16_xmodem(data).to_be_bytes() == received
}

/// Block check character: XOR of all bytes
pub fn bcc(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Check a buffer whose last byte is its BCC
pub fn bcc_verify(data_with_bcc: &[u8]) -> bool {
    match data_with_bcc.split_last() {
        Some((&received, data)) if !data.is_empty() => bcc(data) == received,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_xmodem() {
        // Test vector: "123456789" should give 0x31C3
        assert_eq!(crc16_xmodem(b"123456789"), 0x31C3);
        assert_eq!(crc16_xmodem(b""), 0x0000);
    }

    #[test]
    fn test_crc16_gm65_vectors() {
        // Software version query body and its documented reply
        assert_eq!(crc16_xmodem(&[0x07, 0x01, 0x00, 0xE2, 0x01]), 0x7791);
        assert_eq!(crc16_xmodem(&[0x00, 0x00, 0x01, 0x87]), 0xD25E);
        // Set 9600 baud, from the module manual
        assert_eq!(crc16_xmodem(&[0x08, 0x02, 0x00, 0x2A, 0x39, 0x01]), 0xA7EA);
    }

    #[test]
    fn test_crc16_verify() {
        let mut data = b"scanner".to_vec();
        data.extend_from_slice(&crc16_xmodem(b"scanner").to_be_bytes());
        assert!(crc16_verify(&data));

        assert!(!crc16_verify(&[]));
        assert!(!crc16_verify(&[0x00, 0x00]));
    }

    #[test]
    fn test_crc16_detects_single_bit_flips() {
        let payload = [0x08, 0x01, 0x00, 0x00, 0xD5];
        let mut framed = payload.to_vec();
        framed.extend_from_slice(&crc16_xmodem(&payload).to_be_bytes());

        for byte in 0..payload.len() {
            for bit in 0..8 {
                let mut corrupted = framed.clone();
                corrupted[byte] ^= 1 << bit;
                assert!(!crc16_verify(&corrupted), "flip of byte {byte} bit {bit} accepted");
            }
        }
    }

    #[test]
    fn test_bcc() {
        assert_eq!(bcc(&[0x01, 0x02, 0x03]), 0x00);
        assert_eq!(bcc(&[0xFF, 0x00]), 0xFF);
        assert_eq!(bcc(b""), 0x00);

        let data = b"\x00\x0AT_OUT_CVER";
        assert_eq!(bcc(data), 0x12);
        let value = bcc(data);
        assert_eq!(value ^ value ^ value ^ value, 0);
    }

    #[test]
    fn test_bcc_order_independent() {
        let data = [0x5A, 0x13, 0x77, 0xC0, 0x01];
        let mut reversed = data;
        reversed.reverse();
        let mut rotated = data;
        rotated.rotate_left(2);

        assert_eq!(bcc(&data), bcc(&reversed));
        assert_eq!(bcc(&data), bcc(&rotated));
    }

    #[test]
    fn test_bcc_verify() {
        let mut data = b"S_CMD_03L1".to_vec();
        data.push(bcc(b"S_CMD_03L1"));
        assert!(bcc_verify(&data));

        *data.last_mut().unwrap() ^= 0x01;
        assert!(!bcc_verify(&data));

        assert!(!bcc_verify(&[0x00]));
        assert!(!bcc_verify(&[]));
    }

    #[test]
    fn test_calculate_wire_order() {
        assert_eq!(calculate(b"123456789", ChecksumType::Crc16Xmodem), vec![0x31, 0xC3]);
        assert_eq!(calculate(&[0x0F, 0xF0], ChecksumType::Bcc), vec![0xFF]);
        for kind in ChecksumType::all() {
            assert_eq!(calculate(b"abc", *kind).len(), kind.size());
        }
    }
}
