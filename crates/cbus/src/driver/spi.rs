use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use cbus_icd::{BusFamily, Command, DeviceConfig, DeviceId, SpiConfig, Statistics, StatsReport};

use super::{BusDriver, Completion, Rejection, Taken, Transfer};
use crate::config::CbusConfig;
use crate::error::Error;
use crate::id::SpiLocation;
use crate::lease::PinLease;
use crate::pins::{PinMask, PinReservation};
use crate::stats::{self, Traffic};
use crate::transceiver::{SpiBus, SpiHost, SpiPins, SpiTarget, SpiTransfer, SpiTx, SPI_INLINE_TX};

/// Host slots addressable through the 4-bit identifier field.
pub const MAX_HOSTS: u8 = 16;
pub const MAX_COMMAND_BITS: u8 = 16;
pub const MAX_ADDRESS_BITS: u8 = 64;

struct HostSlot<B> {
    pins: SpiPins,
    bus: B,
}

struct SpiDevice {
    location: SpiLocation,
    target: SpiTarget,
    stats: Statistics,
}

/// SPI devices sharing a fixed pool of host slots.
///
/// Devices on the same (miso, mosi, sclk) triple share a host and differ
/// only by chip select.
pub struct SpiDriver<H: SpiHost> {
    host: H,
    slots: Vec<Option<HostSlot<H::Bus>>>,
    occupancy: u16,
    devices: BTreeMap<DeviceId, SpiDevice>,
    max_devices: usize,
}

impl<H: SpiHost> SpiDriver<H> {
    pub fn new(host: H, config: &CbusConfig) -> Self {
        let count = host.slots().min(MAX_HOSTS);
        let mut slots = Vec::with_capacity(usize::from(count));
        slots.resize_with(usize::from(count), || None);
        Self {
            host,
            slots,
            occupancy: 0,
            devices: BTreeMap::new(),
            max_devices: config.max_devices,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Host slots not yet bound to a pin triple.
    pub fn free_hosts(&self) -> usize {
        self.slots.len() - self.occupancy.count_ones() as usize
    }

    fn find_host(&self, pins: SpiPins) -> Option<u8> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.pins == pins))
            .map(|index| index as u8)
    }

    fn free_slot(&self) -> Option<u8> {
        (0..self.slots.len() as u8).find(|slot| self.occupancy & (1u16 << *slot) == 0)
    }

    fn collides(&self, id: DeviceId, taken: Taken<'_>) -> bool {
        self.devices.contains_key(&id) || taken(id)
    }

    fn attach_device(
        &mut self,
        pins: &dyn PinReservation,
        config: &SpiConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection> {
        let bus_pins = SpiPins {
            miso: config.miso_pin,
            mosi: config.mosi_pin,
            sclk: config.sclk_pin,
        };
        let bus_mask = PinMask::distinct(&[bus_pins.miso, bus_pins.mosi, bus_pins.sclk])
            .ok_or(Error::BadArguments)?;
        let cs_mask = PinMask::pin(config.cs_pin).ok_or(Error::BadArguments)?;
        if bus_mask.0 & cs_mask.0 != 0
            || config.mode > 3
            || config.command_bits > MAX_COMMAND_BITS
            || config.address_bits > MAX_ADDRESS_BITS
        {
            return Err(Error::BadArguments.into());
        }
        // The slot is known before the host is opened, so is the identifier.
        let shared = self.find_host(bus_pins);
        let slot = shared.or_else(|| self.free_slot()).ok_or(Error::NoMoreBuses)?;
        let location = spi_location(config, slot);
        let id = location.encode();
        if self.collides(id, taken) {
            warn!("SPI id {} already attached", id);
            return Err(Rejection { error: Error::DeviceExists, id });
        }
        if self.devices.len() >= self.max_devices {
            return Err(Error::NoMemory.into());
        }

        let lease = match shared {
            Some(_) => PinLease::acquire(pins, cs_mask)?,
            None => {
                let lease = PinLease::acquire(pins, bus_mask | cs_mask)?;
                let bus = self.host.open(slot, bus_pins).map_err(Error::from)?;
                self.slots[usize::from(slot)] = Some(HostSlot { pins: bus_pins, bus });
                self.occupancy |= 1u16 << slot;
                debug!("SPI host {} bound", slot);
                lease
            }
        };
        lease.commit();

        self.devices.insert(
            id,
            SpiDevice {
                location,
                target: SpiTarget {
                    cs_pin: config.cs_pin,
                    mode: config.mode,
                    command_bits: config.command_bits,
                    address_bits: config.address_bits,
                    dummy_bits: config.dummy_bits,
                    clock_hz: config.clock_hz,
                    cs_pretrans: config.cs_pretrans,
                    cs_posttrans: config.cs_posttrans,
                    input_delay_ns: config.input_delay_ns,
                },
                stats: Statistics {
                    framing_correction: framing_correction(config),
                    ..Statistics::default()
                },
            },
        );
        info!("SPI device {} attached on host {} cs {}", id, slot, config.cs_pin);
        Ok(id)
    }

    /// Close the bus in `slot` and mark the slot free. Pins are untouched.
    fn release_host(&mut self, slot: u8) -> Option<SpiPins> {
        let taken = self.slots.get_mut(usize::from(slot))?.take()?;
        self.occupancy &= !(1u16 << slot);
        if let Err(e) = self.host.close(taken.bus) {
            warn!("closing SPI host {} failed: {}", slot, e);
        }
        Some(taken.pins)
    }
}

fn spi_location(config: &SpiConfig, host: u8) -> SpiLocation {
    SpiLocation {
        miso_pin: config.miso_pin,
        mosi_pin: config.mosi_pin,
        sclk_pin: config.sclk_pin,
        cs_pin: config.cs_pin,
        host,
    }
}

/// Command and address phase bytes the host clocks out on every transfer.
fn framing_correction(config: &SpiConfig) -> u8 {
    (u16::from(config.command_bits) + u16::from(config.address_bits)).div_ceil(8) as u8
}

fn exchange<B: SpiBus>(
    bus: &mut B,
    device: &SpiDevice,
    transfer: &mut Transfer<'_>,
) -> Result<Traffic, Error> {
    let correction = usize::from(device.stats.framing_correction);
    match transfer.command {
        Command::Read => {
            let receive = transfer.out_len;
            if receive == 0 {
                return Err(Error::BadArguments);
            }
            bus.polling_transmit(
                &device.target,
                SpiTransfer {
                    command: transfer.device_command,
                    address: transfer.register_address,
                    tx: SpiTx::None,
                    rx: &mut transfer.payload[..receive],
                },
            )?;
            Ok(Traffic::new(correction, receive))
        }
        Command::Write => {
            let data = &transfer.payload[..transfer.in_len];
            if data.is_empty() {
                return Err(Error::BadArguments);
            }
            let scratch;
            let tx = if data.len() <= SPI_INLINE_TX {
                let mut inline = [0; SPI_INLINE_TX];
                inline[..data.len()].copy_from_slice(data);
                SpiTx::Inline { data: inline, len: data.len() as u8 }
            } else {
                let mut buffer = Vec::new();
                buffer.try_reserve_exact(data.len()).map_err(|_| Error::NoMemory)?;
                buffer.extend_from_slice(data);
                scratch = buffer;
                SpiTx::Buffer(&scratch)
            };
            bus.polling_transmit(
                &device.target,
                SpiTransfer {
                    command: transfer.device_command,
                    address: transfer.register_address,
                    tx,
                    rx: &mut [],
                },
            )?;
            Ok(Traffic::new(data.len() + correction, 0))
        }
        _ => Err(Error::NotUsed),
    }
}

impl<H: SpiHost> BusDriver for SpiDriver<H> {
    fn family(&self) -> BusFamily {
        BusFamily::Spi
    }

    fn attach(
        &mut self,
        pins: &dyn PinReservation,
        config: &DeviceConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection> {
        match config {
            DeviceConfig::Spi(config) => self.attach_device(pins, config, taken),
            _ => Err(Error::BadArguments.into()),
        }
    }

    fn detach(&mut self, pins: &dyn PinReservation, id: DeviceId) -> Result<(), Error> {
        let device = self.devices.remove(&id).ok_or(Error::DeviceNotFound)?;
        let host = device.location.host;
        pins.free(device.target.cs_pin);
        info!("SPI device {} detached", id);

        if !self.devices.values().any(|d| d.location.host == host) {
            if let Some(bus_pins) = self.release_host(host) {
                pins.free(bus_pins.miso);
                pins.free(bus_pins.mosi);
                pins.free(bus_pins.sclk);
                debug!("SPI host {} released", host);
            }
        }
        Ok(())
    }

    fn execute(
        &mut self,
        _pins: &dyn PinReservation,
        mut transfer: Transfer<'_>,
    ) -> Result<Completion, Error> {
        transfer.check_lengths()?;
        if !matches!(transfer.command, Command::Read | Command::Write) {
            return Err(Error::NotUsed);
        }

        let id = transfer.device_id;
        let device = self.devices.get_mut(&id).ok_or(Error::DeviceNotFound)?;
        let slot = self
            .slots
            .get_mut(usize::from(device.location.host))
            .and_then(Option::as_mut)
            .ok_or(Error::Unknown)?;

        let outcome = exchange(&mut slot.bus, device, &mut transfer);
        stats::account(&mut device.stats, &outcome);

        let traffic = outcome?;
        trace!("SPI {} sent {} received {}", id, traffic.sent, traffic.received);
        Ok(Completion { id, out_len: traffic.received })
    }

    fn describe(&self, id: DeviceId, out: &mut [u8]) -> Result<usize, Error> {
        let device = self.devices.get(&id).ok_or(Error::DeviceNotFound)?;
        let location = &device.location;
        stats::describe(
            out,
            format_args!(
                "CS{:02X} @ spi/p{:02}cl{:02}do{:02}di{:02}",
                location.cs_pin,
                location.host,
                location.sclk_pin,
                location.mosi_pin,
                location.miso_pin
            ),
        )
    }

    fn stats(&self, id: DeviceId) -> Result<StatsReport, Error> {
        let device = self.devices.get(&id).ok_or(Error::DeviceNotFound)?;
        Ok(StatsReport {
            statistics: device.stats,
            identity: u64::from(device.target.cs_pin),
        })
    }

    fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn bus_count(&self) -> usize {
        self.occupancy.count_ones() as usize
    }
}
