//! Device identifier codec.
//!
//! A [`DeviceId`] is opaque to clients but encodes where the device lives.
//! The layout depends on the bus family, LSB first:
//!
//! | family  | fields                                                          |
//! |---------|-----------------------------------------------------------------|
//! | 1-Wire  | data pin:7, tx channel:3, rx channel:3, reserved:3, discriminator:16 |
//! | I2C     | address:10, controller:2, sda pin:7, scl pin:7, reserved:6       |
//! | SPI     | miso:7, mosi:7, sclk:7, cs:7, host:4                             |

use cbus_icd::{BusFamily, DeviceId, RomCode};
use derive_more::From;

/// Decoded identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, From)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Location {
    OneWire(OneWireLocation),
    I2c(I2cLocation),
    Spi(SpiLocation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OneWireLocation {
    pub data_pin: u8,
    pub tx_channel: u8,
    pub rx_channel: u8,
    /// [`rom_discriminator`] of the device ROM code.
    pub discriminator: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cLocation {
    pub address: u16,
    pub controller: u8,
    pub sda_pin: u8,
    pub scl_pin: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiLocation {
    pub miso_pin: u8,
    pub mosi_pin: u8,
    pub sclk_pin: u8,
    pub cs_pin: u8,
    pub host: u8,
}

/// Largest 1-Wire tx/rx channel index an identifier can carry.
pub const MAX_CHANNEL: u8 = 7;
/// Largest I2C controller index an identifier can carry.
pub const MAX_CONTROLLER: u8 = 3;

const fn field(raw: u32, shift: u32, bits: u32) -> u32 {
    (raw >> shift) & ((1 << bits) - 1)
}

const fn put(value: u32, shift: u32, bits: u32) -> u32 {
    (value & ((1 << bits) - 1)) << shift
}

impl OneWireLocation {
    pub const fn encode(&self) -> DeviceId {
        DeviceId(
            put(self.data_pin as u32, 0, 7)
                | put(self.tx_channel as u32, 7, 3)
                | put(self.rx_channel as u32, 10, 3)
                | put(self.discriminator as u32, 16, 16),
        )
    }

    pub const fn decode(id: DeviceId) -> Self {
        let raw = id.0;
        Self {
            data_pin: field(raw, 0, 7) as u8,
            tx_channel: field(raw, 7, 3) as u8,
            rx_channel: field(raw, 10, 3) as u8,
            discriminator: field(raw, 16, 16) as u16,
        }
    }
}

impl I2cLocation {
    pub const fn encode(&self) -> DeviceId {
        DeviceId(
            put(self.address as u32, 0, 10)
                | put(self.controller as u32, 10, 2)
                | put(self.sda_pin as u32, 12, 7)
                | put(self.scl_pin as u32, 19, 7),
        )
    }

    pub const fn decode(id: DeviceId) -> Self {
        let raw = id.0;
        Self {
            address: field(raw, 0, 10) as u16,
            controller: field(raw, 10, 2) as u8,
            sda_pin: field(raw, 12, 7) as u8,
            scl_pin: field(raw, 19, 7) as u8,
        }
    }
}

impl SpiLocation {
    pub const fn encode(&self) -> DeviceId {
        DeviceId(
            put(self.miso_pin as u32, 0, 7)
                | put(self.mosi_pin as u32, 7, 7)
                | put(self.sclk_pin as u32, 14, 7)
                | put(self.cs_pin as u32, 21, 7)
                | put(self.host as u32, 28, 4),
        )
    }

    pub const fn decode(id: DeviceId) -> Self {
        let raw = id.0;
        Self {
            miso_pin: field(raw, 0, 7) as u8,
            mosi_pin: field(raw, 7, 7) as u8,
            sclk_pin: field(raw, 14, 7) as u8,
            cs_pin: field(raw, 21, 7) as u8,
            host: field(raw, 28, 4) as u8,
        }
    }
}

impl Location {
    pub const fn family(&self) -> BusFamily {
        match self {
            Location::OneWire(_) => BusFamily::OneWire,
            Location::I2c(_) => BusFamily::I2c,
            Location::Spi(_) => BusFamily::Spi,
        }
    }

    /// Pack into an identifier. Fields wider than their slot are truncated.
    pub const fn encode(&self) -> DeviceId {
        match self {
            Location::OneWire(l) => l.encode(),
            Location::I2c(l) => l.encode(),
            Location::Spi(l) => l.encode(),
        }
    }

    pub const fn decode(family: BusFamily, id: DeviceId) -> Self {
        match family {
            BusFamily::OneWire => Location::OneWire(OneWireLocation::decode(id)),
            BusFamily::I2c => Location::I2c(I2cLocation::decode(id)),
            BusFamily::Spi => Location::Spi(SpiLocation::decode(id)),
        }
    }
}

/// 16-bit discriminator of a ROM code (CRC-16/MCRF4XX byte update).
///
/// Bytes are consumed in external order, family code first.
pub fn rom_discriminator(seed: u16, rom: &RomCode) -> u16 {
    rom.0.iter().fold(seed, |acc, &byte| {
        let acc = acc ^ u16::from(byte);
        let mut low = (acc ^ (acc << 4)) as u8;
        let mut high = low.rotate_left(3);
        low ^= high & 0x07;
        high = (high & 0xF8) ^ (high.rotate_left(1) & 0x0F) ^ (acc >> 8) as u8;
        (u16::from(low) << 8) | u16::from(high)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROM: RomCode = RomCode::new([0x28, 0x02, 0x01, 0x03, 0x04, 0x05, 0x06, 0x99]);

    #[test]
    fn discriminator_matches_reference_values() {
        assert_eq!(rom_discriminator(0x1D2C, &ROM), 0xB5CD);
        assert_eq!(rom_discriminator(0x0000, &ROM), 0xA3D9);
        assert_eq!(rom_discriminator(0xFFFF, &ROM), 0xDF55);
    }

    #[test]
    fn crafted_roms_collide_under_the_same_seed() {
        let twin = RomCode::new([0x28, 0x02, 0x01, 0x03, 0x04, 0x14, 0x0E, 0x98]);
        assert_ne!(ROM, twin);
        assert_eq!(rom_discriminator(0x1D2C, &ROM), rom_discriminator(0x1D2C, &twin));
    }

    #[test]
    fn onewire_layout() {
        let location = OneWireLocation {
            data_pin: 22,
            tx_channel: 0,
            rx_channel: 0,
            discriminator: 0xB5CD,
        };
        assert_eq!(location.encode(), DeviceId(0xB5CD_0016));

        let with_channels = OneWireLocation { tx_channel: 3, rx_channel: 5, ..location };
        let id = with_channels.encode();
        assert_eq!(id.0 & 0xE000, 0, "reserved bits stay clear");
        assert_eq!(
            Location::decode(BusFamily::OneWire, id),
            Location::OneWire(with_channels)
        );
    }

    #[test]
    fn i2c_layout() {
        let location = I2cLocation {
            address: 0x76,
            controller: 1,
            sda_pin: 18,
            scl_pin: 26,
        };
        let id = location.encode();
        assert_eq!(id.0, 0x76 | 1 << 10 | 18 << 12 | 26 << 19);
        assert_eq!(I2cLocation::decode(id), location);
    }

    #[test]
    fn spi_layout() {
        let location = SpiLocation {
            miso_pin: 12,
            mosi_pin: 13,
            sclk_pin: 14,
            cs_pin: 16,
            host: 1,
        };
        let id = Location::from(location).encode();
        assert_eq!(id.0, 12 | 13 << 7 | 14 << 14 | 16 << 21 | 1 << 28);
        assert_eq!(Location::decode(BusFamily::Spi, id), Location::Spi(location));
        assert_eq!(Location::Spi(location).family(), BusFamily::Spi);
    }
}
