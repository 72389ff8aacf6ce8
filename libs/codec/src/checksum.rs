//! CRC-16 Checksum Validation
//!
//! Frames carry a CRC-16/IBM (reflected polynomial 0xA001, initial value 0)
//! computed over header and payload.

const POLY_REFLECTED: u16 = 0xA001;

const CRC16_TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Calculate the frame checksum of `data`
pub fn calculate_crc16(data: &[u8]) -> u16 {
    let mut hasher = StreamingChecksum::new();
    hasher.update(data);
    hasher.finalize()
}

/// Verify that `expected` is the checksum of `data`
pub fn verify_crc16(data: &[u8], expected: u16) -> bool {
    calculate_crc16(data) == expected
}

/// Streaming checksum calculator for frames read in pieces
#[derive(Debug, Clone, Copy)]
pub struct StreamingChecksum {
    crc: u16,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self { crc: 0 }
    }

    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let idx = ((self.crc ^ byte as u16) & 0xFF) as usize;
            self.crc = (self.crc >> 8) ^ CRC16_TABLE[idx];
        }
    }

    pub fn finalize(self) -> u16 {
        self.crc
    }

    pub fn reset(&mut self) {
        self.crc = 0;
    }
}

impl Default for StreamingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // CRC-16/ARC check value
        assert_eq!(calculate_crc16(b"123456789"), 0xBB3D);
        assert_eq!(calculate_crc16(&[]), 0);
    }

    #[test]
    fn test_streaming_matches_direct() {
        let mut streaming = StreamingChecksum::new();
        streaming.update(b"1234");
        streaming.update(b"56789");
        assert_eq!(streaming.finalize(), calculate_crc16(b"123456789"));
    }

    #[test]
    fn test_streaming_reset() {
        let mut hasher = StreamingChecksum::new();
        hasher.update(b"other data");
        hasher.reset();
        hasher.update(b"123456789");
        assert_eq!(hasher.finalize(), 0xBB3D);
    }

    #[test]
    fn test_corruption_detected() {
        let data = b"\x54\xFE\x97\x00payload";
        let crc = calculate_crc16(data);
        let mut corrupted = data.to_vec();
        corrupted[5] ^= 0x01;
        assert!(verify_crc16(data, crc));
        assert!(!verify_crc16(&corrupted, crc));
    }
}
