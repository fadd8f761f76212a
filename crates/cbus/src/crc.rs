/// Dallas/Maxim CRC-8 (x^8 + x^5 + x^4 + 1, reflected, init 0).
///
/// Running it over data followed by its CRC yields zero.
pub fn crc8_maxim(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| {
        (0..8).fold(crc ^ byte, |crc, _| {
            if crc & 0x01 != 0 {
                (crc >> 1) ^ 0x8C
            } else {
                crc >> 1
            }
        })
    })
}

/// SMBus packet error code, CRC-8 with polynomial 0x07, init 0.
pub fn crc8_smbus(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |crc, &byte| {
        (0..8).fold(crc ^ byte, |crc, _| {
            if crc & 0x80 != 0 {
                (crc << 1) ^ 0x07
            } else {
                crc << 1
            }
        })
    })
}
