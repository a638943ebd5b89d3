//! Frame checksums.

/// CRC-8 polynomial, well suited to frames of up to 64 bytes.
pub const CRC8_POLYNOMIAL: u8 = 0x4D;

/// CRC-16/CCITT-FALSE initial value.
pub const CRC16_INIT: u16 = 0xFFFF;

const CRC16_POLYNOMIAL: u16 = 0x1021;

fn crc8_byte(mut remainder: u8) -> u8 {
    for _ in 0..8 {
        remainder = if remainder & 0x80 != 0 {
            (remainder << 1) ^ CRC8_POLYNOMIAL
        } else {
            remainder << 1
        };
    }
    remainder
}

/// CRC-8 (polynomial 0x4D, initial value 0, no reflection).
pub fn crc8(data: &[u8]) -> u8 {
    data.iter().fold(0, |crc, &b| crc8_byte(crc ^ b))
}

/// CRC-16/CCITT-FALSE (polynomial 0x1021, initial value 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |mut crc, &b| {
        crc ^= u16::from(b) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLYNOMIAL
            } else {
                crc << 1
            };
        }
        crc
    })
}
