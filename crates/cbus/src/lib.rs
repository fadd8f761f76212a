#![no_std]
//! Common bus registry and dispatch engine.
//!
//! Multiplexes logical 1-Wire, I2C and SPI devices over a small number of
//! physical controllers and GPIO pins. Physical buses are created lazily
//! when the first device needing them attaches and torn down when the last
//! one detaches. Each attached device gets a deterministic 32-bit
//! identifier that encodes where it lives, and every command is routed
//! through a single [`Registry`] owned by one dispatcher task.

extern crate alloc;

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod config;
mod crc;
mod dispatch;
mod driver;
mod error;
mod id;
mod lease;
mod pins;
mod registry;
mod stats;
mod transceiver;

pub use cbus_icd as icd;
pub use config::CbusConfig;
pub use crc::{crc8_maxim, crc8_smbus};
pub use dispatch::{process, serve, Client, CommandChannel, Envelope, ReplySlot};
pub use driver::i2c::I2cDriver;
pub use driver::onewire::OneWireDriver;
pub use driver::spi::SpiDriver;
pub use driver::{BusDriver, Completion, Rejection, Taken, Transfer};
pub use error::{Error, OpenError, TransceiverError};
pub use id::{rom_discriminator, I2cLocation, Location, OneWireLocation, SpiLocation};
pub use pins::{PinMask, PinPool, PinReservation, GPIO_COUNT};
pub use registry::Registry;
pub use stats::{summary, DESCRIPTION_LEN};
pub use transceiver::*;
