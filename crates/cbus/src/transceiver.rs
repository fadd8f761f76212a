//! Capabilities the registry needs from the electrical layer.
//!
//! A host creates physical buses from pins and tears them down again. The
//! registry owns every bus it opens and hands it back to its host on
//! close, so a host never has to track buses itself.

use cbus_icd::RomCode;

use crate::error::{OpenError, TransceiverError};

/// Creates 1-Wire buses, each bound to a data pin and a channel pair.
pub trait OneWireHost {
    type Bus: OneWireBus;

    fn open(&mut self, data_pin: u8) -> Result<Self::Bus, OpenError>;

    /// Release the channel pair. The pin itself is freed by the caller.
    fn close(&mut self, bus: Self::Bus) -> Result<(), TransceiverError>;
}

pub trait OneWireBus {
    /// `(tx, rx)` channel indices, 0-7 each.
    fn channels(&self) -> (u8, u8);

    /// Reset pulse. `NotAcknowledged` when no device answers with presence.
    fn reset(&mut self) -> Result<(), TransceiverError>;

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransceiverError>;

    fn read(&mut self, buf: &mut [u8]) -> Result<(), TransceiverError>;

    /// ROM search. Yields ROM codes in external byte order until the bus is
    /// exhausted.
    fn search(
        &mut self,
    ) -> impl Iterator<Item = Result<RomCode, TransceiverError>> + '_;
}

/// Per-device addressing handed to every I2C transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct I2cTarget {
    pub address: u16,
    pub ten_bit_address: bool,
    pub speed_hz: u32,
    /// Treat a NACK as failure.
    pub ack_check: bool,
    pub timeout_ms: u8,
}

/// Creates I2C controllers on an (scl, sda) pin pair.
pub trait I2cHost {
    type Bus: I2cBus;

    /// Returns the controller index (0-3) together with the bus.
    fn open(&mut self, scl_pin: u8, sda_pin: u8) -> Result<(u8, Self::Bus), OpenError>;

    fn close(&mut self, bus: Self::Bus) -> Result<(), TransceiverError>;
}

pub trait I2cBus {
    fn write(&mut self, target: &I2cTarget, bytes: &[u8]) -> Result<(), TransceiverError>;

    fn read(&mut self, target: &I2cTarget, buf: &mut [u8]) -> Result<(), TransceiverError>;

    /// Transmit then receive, repeated start in between.
    fn write_read(
        &mut self,
        target: &I2cTarget,
        bytes: &[u8],
        buf: &mut [u8],
    ) -> Result<(), TransceiverError>;

    /// Address-only transaction. `NotAcknowledged` when nobody answers.
    fn probe(&mut self, address: u16, timeout_ms: u8) -> Result<(), TransceiverError>;
}

/// Pins shared by every device on an SPI host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiPins {
    pub miso: u8,
    pub mosi: u8,
    pub sclk: u8,
}

/// Per-device settings of an SPI transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiTarget {
    pub cs_pin: u8,
    pub mode: u8,
    pub command_bits: u8,
    pub address_bits: u8,
    pub dummy_bits: u8,
    pub clock_hz: u32,
    pub cs_pretrans: u8,
    pub cs_posttrans: u8,
    pub input_delay_ns: u8,
}

/// Bytes that fit in the transaction descriptor itself.
pub const SPI_INLINE_TX: usize = 4;

/// Transmit phase of an SPI transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiTx<'a> {
    None,
    Inline { data: [u8; SPI_INLINE_TX], len: u8 },
    /// DMA-capable scratch buffer.
    Buffer(&'a [u8]),
}

impl SpiTx<'_> {
    pub fn bytes(&self) -> &[u8] {
        match self {
            SpiTx::None => &[],
            SpiTx::Inline { data, len } => &data[..usize::from(*len).min(SPI_INLINE_TX)],
            SpiTx::Buffer(bytes) => bytes,
        }
    }
}

/// One half-duplex SPI transaction.
#[derive(Debug)]
pub struct SpiTransfer<'a> {
    pub command: u16,
    pub address: u64,
    pub tx: SpiTx<'a>,
    pub rx: &'a mut [u8],
}

/// Creates SPI hosts in a fixed number of hardware slots.
pub trait SpiHost {
    type Bus: SpiBus;

    /// Hardware SPI hosts available to the registry.
    fn slots(&self) -> u8;

    fn open(&mut self, slot: u8, pins: SpiPins) -> Result<Self::Bus, OpenError>;

    fn close(&mut self, bus: Self::Bus) -> Result<(), TransceiverError>;
}

pub trait SpiBus {
    fn polling_transmit(
        &mut self,
        target: &SpiTarget,
        transfer: SpiTransfer<'_>,
    ) -> Result<(), TransceiverError>;
}
