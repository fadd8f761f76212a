//! Per-family drivers behind one object-safe interface.

pub mod i2c;
pub mod onewire;
pub mod spi;

use cbus_icd::{BusFamily, Command, DeviceConfig, DeviceId, StatsReport, MAX_DATA_LEN, PAYLOAD_LEN};
use heapless::Vec;

use crate::error::Error;
use crate::pins::PinReservation;

/// Failed attach. `id` carries the colliding identifier for
/// [`Error::DeviceExists`] and [`DeviceId::NONE`] otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rejection {
    pub error: Error,
    pub id: DeviceId,
}

impl From<Error> for Rejection {
    fn from(error: Error) -> Self {
        Self { error, id: DeviceId::NONE }
    }
}

impl core::fmt::Display for Rejection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.id == DeviceId::NONE {
            write!(f, "{}", self.error)
        } else {
            write!(f, "{} ({})", self.error, self.id)
        }
    }
}

/// A data-moving command addressed at one driver.
///
/// `payload` holds `in_len` bytes to send on entry and the received bytes
/// on return, also when the transfer fails with [`Error::BadCrc`].
#[derive(Debug)]
pub struct Transfer<'a> {
    pub command: Command,
    /// Device to address; for scans, the bus to enumerate.
    pub device_id: DeviceId,
    pub device_command: u16,
    pub register_address: u64,
    pub in_len: usize,
    pub out_len: usize,
    pub payload: &'a mut [u8; PAYLOAD_LEN],
}

impl<'a> Transfer<'a> {
    pub fn new(command: Command, device_id: DeviceId, payload: &'a mut [u8; PAYLOAD_LEN]) -> Self {
        Self {
            command,
            device_id,
            device_command: 0,
            register_address: 0,
            in_len: 0,
            out_len: 0,
            payload,
        }
    }

    pub(crate) fn check_lengths(&self) -> Result<(), Error> {
        if self.in_len > MAX_DATA_LEN || self.out_len > MAX_DATA_LEN {
            return Err(Error::BadArguments);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Completion {
    /// Resolved device, or the number of results for a scan.
    pub id: DeviceId,
    /// Valid bytes now in the payload.
    pub out_len: usize,
}

/// Identifiers already owned outside the driver being attached to.
pub type Taken<'a> = &'a dyn Fn(DeviceId) -> bool;

pub trait BusDriver {
    fn family(&self) -> BusFamily;

    /// Attach a device. The driver rejects an identifier it already holds,
    /// or one `taken` reports, with [`Error::DeviceExists`] before inserting.
    fn attach(
        &mut self,
        pins: &dyn PinReservation,
        config: &DeviceConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection>;

    fn detach(&mut self, pins: &dyn PinReservation, id: DeviceId) -> Result<(), Error>;

    fn execute(
        &mut self,
        pins: &dyn PinReservation,
        transfer: Transfer<'_>,
    ) -> Result<Completion, Error>;

    /// Write a NUL-terminated description of the device into `out`.
    fn describe(&self, id: DeviceId, out: &mut [u8]) -> Result<usize, Error>;

    fn stats(&self, id: DeviceId) -> Result<StatsReport, Error>;

    fn contains(&self, id: DeviceId) -> bool;

    fn device_count(&self) -> usize;

    fn bus_count(&self) -> usize;
}

pub(crate) type Frame = Vec<u8, PAYLOAD_LEN>;

/// Append to a frame, failing once it would exceed the payload size.
pub(crate) fn push_all(
    frame: &mut Frame,
    bytes: impl IntoIterator<Item = u8>,
) -> Result<(), Error> {
    for byte in bytes {
        frame.push(byte).map_err(|_| Error::BadArguments)?;
    }
    Ok(())
}

/// Low `count` bytes of `value`, least significant first.
pub(crate) fn lsb_first(value: u64, count: u8) -> impl Iterator<Item = u8> {
    value.to_le_bytes().into_iter().take(usize::from(count))
}

/// Low `count` bytes of `value`, most significant first.
pub(crate) fn msb_first(value: u64, count: u8) -> impl Iterator<Item = u8> {
    let skip = 8usize.saturating_sub(usize::from(count));
    value.to_be_bytes().into_iter().skip(skip)
}
