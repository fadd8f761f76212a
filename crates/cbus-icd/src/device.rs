use derive_more::From;
use serde::{Deserialize, Serialize};

use crate::BusFamily;

/// 1-Wire ROM code in natural order: family code first, CRC byte last.
///
/// On the wire the MATCH ROM frame carries these bytes reversed; use
/// [`RomCode::wire_order`] and [`RomCode::from_wire`] to convert.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RomCode(pub [u8; 8]);

impl RomCode {
    pub const fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    pub const fn family_code(&self) -> u8 {
        self.0[0]
    }

    pub const fn crc(&self) -> u8 {
        self.0[7]
    }

    /// Bytes in the order they are shifted out after MATCH ROM.
    pub fn wire_order(&self) -> [u8; 8] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    pub fn from_wire(mut bytes: [u8; 8]) -> Self {
        bytes.reverse();
        Self(bytes)
    }

    /// The ROM code as an integer whose big-endian bytes are the natural order.
    pub const fn to_u64(&self) -> u64 {
        u64::from_be_bytes(self.0)
    }

    pub const fn from_u64(value: u64) -> Self {
        Self(value.to_be_bytes())
    }
}

impl core::fmt::Display for RomCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// Dallas 1-Wire device on a single data pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OneWireConfig {
    pub data_pin: u8,
    pub rom_code: RomCode,
    /// Function command bytes sent after the ROM code (0-2).
    pub cmd_bytes: u8,
    /// Memory address bytes sent after the command (0-8).
    pub addr_bytes: u8,
    /// Validate the Dallas CRC-8 over received bytes.
    pub crc_check: bool,
}

impl OneWireConfig {
    pub const fn new(data_pin: u8, rom_code: RomCode) -> Self {
        Self {
            data_pin,
            rom_code,
            cmd_bytes: 0,
            addr_bytes: 0,
            crc_check: false,
        }
    }
}

/// I2C target behind a controller on an (scl, sda) pin pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cConfig {
    pub scl_pin: u8,
    pub sda_pin: u8,
    pub address: u16,
    pub ten_bit_address: bool,
    pub speed_hz: u32,
    /// Per-transfer timeout, 4-bit field (0-15 ms).
    pub timeout_ms: u8,
    /// Register command bytes prefixed to every transfer (0-2).
    pub cmd_bytes: u8,
    /// Register address bytes prefixed after the command (0-8).
    pub addr_bytes: u8,
    pub ack_check: bool,
    /// Treat the last received byte as an SMBus PEC over the others.
    pub crc_check: bool,
}

impl I2cConfig {
    pub const fn new(scl_pin: u8, sda_pin: u8, address: u16) -> Self {
        Self {
            scl_pin,
            sda_pin,
            address,
            ten_bit_address: false,
            speed_hz: 400_000,
            timeout_ms: 10,
            cmd_bytes: 0,
            addr_bytes: 0,
            ack_check: true,
            crc_check: false,
        }
    }
}

/// Half-duplex SPI device; `cs_pin` is per device, the rest selects the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiConfig {
    pub miso_pin: u8,
    pub mosi_pin: u8,
    pub sclk_pin: u8,
    pub cs_pin: u8,
    /// SPI mode 0-3.
    pub mode: u8,
    /// Command phase length in bits (0-16).
    pub command_bits: u8,
    /// Address phase length in bits (0-64).
    pub address_bits: u8,
    pub dummy_bits: u8,
    pub clock_hz: u32,
    pub cs_pretrans: u8,
    pub cs_posttrans: u8,
    pub input_delay_ns: u8,
}

impl SpiConfig {
    pub const fn new(miso_pin: u8, mosi_pin: u8, sclk_pin: u8, cs_pin: u8) -> Self {
        Self {
            miso_pin,
            mosi_pin,
            sclk_pin,
            cs_pin,
            mode: 0,
            command_bits: 0,
            address_bits: 0,
            dummy_bits: 0,
            clock_hz: 1_000_000,
            cs_pretrans: 0,
            cs_posttrans: 0,
            input_delay_ns: 0,
        }
    }
}

/// Attach-time configuration, one variant per bus family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceConfig {
    I2c(I2cConfig),
    Spi(SpiConfig),
    OneWire(OneWireConfig),
}

impl DeviceConfig {
    pub const fn family(&self) -> BusFamily {
        match self {
            DeviceConfig::I2c(_) => BusFamily::I2c,
            DeviceConfig::Spi(_) => BusFamily::Spi,
            DeviceConfig::OneWire(_) => BusFamily::OneWire,
        }
    }
}
