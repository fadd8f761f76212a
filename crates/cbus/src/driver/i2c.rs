use alloc::collections::BTreeMap;

use cbus_icd::{
    BusFamily, Command, DeviceConfig, DeviceId, I2cConfig, Statistics, StatsReport,
};

use super::{msb_first, push_all, BusDriver, Completion, Frame, Rejection, Taken, Transfer};
use crate::config::CbusConfig;
use crate::crc::crc8_smbus;
use crate::error::{Error, TransceiverError};
use crate::id::{I2cLocation, MAX_CONTROLLER};
use crate::lease::PinLease;
use crate::pins::{PinMask, PinReservation};
use crate::stats::{self, Traffic};
use crate::transceiver::{I2cBus, I2cHost, I2cTarget};

pub const MAX_CMD_BYTES: u8 = 2;
pub const MAX_ADDR_BYTES: u8 = 8;
/// Largest per-device timeout; the config field is 4 bits wide.
pub const MAX_TIMEOUT_MS: u8 = 15;
/// Addresses probed by a scan, reserved ranges excluded.
pub const SCAN_RANGE: core::ops::RangeInclusive<u16> = 0x08..=0x77;
/// Per-address timeout used while scanning.
pub const SCAN_TIMEOUT_MS: u8 = 5;

struct Controller<B> {
    index: u8,
    bus: B,
}

struct I2cDevice {
    location: I2cLocation,
    target: I2cTarget,
    cmd_bytes: u8,
    addr_bytes: u8,
    crc_check: bool,
    stats: Statistics,
}

/// I2C devices, one controller per (scl, sda) pair.
pub struct I2cDriver<H: I2cHost> {
    host: H,
    controllers: BTreeMap<(u8, u8), Controller<H::Bus>>,
    devices: BTreeMap<DeviceId, I2cDevice>,
    max_devices: usize,
}

impl<H: I2cHost> I2cDriver<H> {
    pub fn new(host: H, config: &CbusConfig) -> Self {
        Self {
            host,
            controllers: BTreeMap::new(),
            devices: BTreeMap::new(),
            max_devices: config.max_devices,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn collides(&self, id: DeviceId, taken: Taken<'_>) -> bool {
        self.devices.contains_key(&id) || taken(id)
    }

    fn attach_device(
        &mut self,
        pins: &dyn PinReservation,
        config: &I2cConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection> {
        let mask = PinMask::distinct(&[config.scl_pin, config.sda_pin]).ok_or(Error::BadArguments)?;
        let max_address = if config.ten_bit_address { 0x3FF } else { 0x7F };
        if config.address > max_address
            || config.timeout_ms > MAX_TIMEOUT_MS
            || config.cmd_bytes > MAX_CMD_BYTES
            || config.addr_bytes > MAX_ADDR_BYTES
        {
            return Err(Error::BadArguments.into());
        }

        let key = (config.scl_pin, config.sda_pin);
        if let Some(controller) = self.controllers.get(&key) {
            let id = i2c_location(config, controller.index).encode();
            if self.collides(id, taken) {
                warn!("I2C id {} already attached", id);
                return Err(Rejection { error: Error::DeviceExists, id });
            }
        }
        if self.devices.len() >= self.max_devices {
            return Err(Error::NoMemory.into());
        }

        let mut lease = None;
        if !self.controllers.contains_key(&key) {
            let guard = PinLease::acquire(pins, mask)?;
            let (index, bus) = self
                .host
                .open(config.scl_pin, config.sda_pin)
                .map_err(Error::from)?;
            self.controllers.insert(key, Controller { index, bus });
            if index > MAX_CONTROLLER {
                error!("I2C host gave controller {}", index);
                self.close_controller(key);
                return Err(Error::Unknown.into());
            }
            lease = Some(guard);
        }

        let controller = match self.controllers.get(&key) {
            Some(controller) => controller.index,
            None => return Err(Error::Unknown.into()),
        };
        let location = i2c_location(config, controller);
        let id = location.encode();

        if self.collides(id, taken) {
            warn!("I2C id {} already attached", id);
            if lease.is_some() {
                self.close_controller(key);
            }
            return Err(Rejection { error: Error::DeviceExists, id });
        }
        if let Some(lease) = lease {
            lease.commit();
        }

        self.devices.insert(
            id,
            I2cDevice {
                location,
                target: I2cTarget {
                    address: config.address,
                    ten_bit_address: config.ten_bit_address,
                    speed_hz: config.speed_hz,
                    ack_check: config.ack_check,
                    timeout_ms: config.timeout_ms,
                },
                cmd_bytes: config.cmd_bytes,
                addr_bytes: config.addr_bytes,
                crc_check: config.crc_check,
                stats: Statistics::default(),
            },
        );
        info!("I2C device {} attached at {=u16:#x}", id, config.address);
        Ok(id)
    }

    fn close_controller(&mut self, key: (u8, u8)) {
        if let Some(controller) = self.controllers.remove(&key) {
            if let Err(e) = self.host.close(controller.bus) {
                warn!("closing I2C controller {} failed: {}", controller.index, e);
            }
        }
    }

    fn scan(
        &mut self,
        pins: &dyn PinReservation,
        transfer: Transfer<'_>,
    ) -> Result<Completion, Error> {
        let location = I2cLocation::decode(transfer.device_id);
        let key = (location.scl_pin, location.sda_pin);
        let mask = PinMask::distinct(&[key.0, key.1]).ok_or(Error::BadArguments)?;

        let mut temporary = None;
        let mut lease = None;
        let bus = match self.controllers.get_mut(&key) {
            Some(controller) => &mut controller.bus,
            None => {
                lease = Some(PinLease::acquire(pins, mask)?);
                debug!("opening temporary I2C controller on scl {} sda {}", key.0, key.1);
                let (_, bus) = self.host.open(key.0, key.1)?;
                temporary.insert(bus)
            }
        };

        let mut found = 0;
        let mut outcome = Ok(());
        for address in SCAN_RANGE {
            match bus.probe(address, SCAN_TIMEOUT_MS) {
                Ok(()) => {
                    // SCAN_RANGE is 7-bit.
                    transfer.payload[found] = address as u8;
                    found += 1;
                }
                Err(TransceiverError::NotAcknowledged) => {}
                Err(e) => {
                    outcome = Err(Error::from(e));
                    break;
                }
            }
        }

        if let Some(bus) = temporary {
            if let Err(e) = self.host.close(bus) {
                warn!("closing temporary I2C controller failed: {}", e);
            }
        }
        drop(lease);

        outcome?;
        debug!("I2C scan found {} devices", found);
        Ok(Completion {
            id: DeviceId(found as u32),
            out_len: found,
        })
    }
}

fn i2c_location(config: &I2cConfig, controller: u8) -> I2cLocation {
    I2cLocation {
        address: config.address,
        controller,
        sda_pin: config.sda_pin,
        scl_pin: config.scl_pin,
    }
}

/// Command bytes then register address bytes, most significant first.
fn prefix(device: &I2cDevice, transfer: &Transfer<'_>) -> Result<Frame, Error> {
    let mut frame = Frame::new();
    push_all(&mut frame, msb_first(u64::from(transfer.device_command), device.cmd_bytes))?;
    push_all(&mut frame, msb_first(transfer.register_address, device.addr_bytes))?;
    Ok(frame)
}

fn check_pec(device: &I2cDevice, data: &[u8]) -> Result<(), Error> {
    match data.split_last() {
        Some((&pec, body)) if device.crc_check && !body.is_empty() => {
            if crc8_smbus(body) == pec {
                Ok(())
            } else {
                Err(Error::BadCrc)
            }
        }
        _ => Ok(()),
    }
}

fn exchange<B: I2cBus>(
    bus: &mut B,
    device: &I2cDevice,
    transfer: &mut Transfer<'_>,
) -> Result<Traffic, Error> {
    let mut frame = prefix(device, transfer)?;
    let target = &device.target;

    match transfer.command {
        Command::Read => {
            let receive = transfer.out_len;
            if receive == 0 {
                return Err(Error::BadArguments);
            }
            let buf = &mut transfer.payload[..receive];
            if frame.is_empty() {
                bus.read(target, buf)?;
            } else {
                bus.write_read(target, &frame, buf)?;
            }
            check_pec(device, &transfer.payload[..receive])?;
            Ok(Traffic::new(frame.len(), receive))
        }
        Command::Write => {
            push_all(&mut frame, transfer.payload[..transfer.in_len].iter().copied())?;
            bus.write(target, &frame)?;
            Ok(Traffic::new(frame.len(), 0))
        }
        Command::ReadWrite => {
            let receive = transfer.out_len;
            if receive == 0 {
                return Err(Error::BadArguments);
            }
            push_all(&mut frame, transfer.payload[..transfer.in_len].iter().copied())?;
            bus.write_read(target, &frame, &mut transfer.payload[..receive])?;
            check_pec(device, &transfer.payload[..receive])?;
            Ok(Traffic::new(frame.len(), receive))
        }
        _ => Err(Error::NotUsed),
    }
}

impl<H: I2cHost> BusDriver for I2cDriver<H> {
    fn family(&self) -> BusFamily {
        BusFamily::I2c
    }

    fn attach(
        &mut self,
        pins: &dyn PinReservation,
        config: &DeviceConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection> {
        match config {
            DeviceConfig::I2c(config) => self.attach_device(pins, config, taken),
            _ => Err(Error::BadArguments.into()),
        }
    }

    fn detach(&mut self, pins: &dyn PinReservation, id: DeviceId) -> Result<(), Error> {
        let device = self.devices.remove(&id).ok_or(Error::DeviceNotFound)?;
        let location = device.location;
        info!("I2C device {} detached", id);

        let shared = self.devices.values().any(|d| {
            d.location.scl_pin == location.scl_pin && d.location.sda_pin == location.sda_pin
        });
        if !shared {
            self.close_controller((location.scl_pin, location.sda_pin));
            pins.free(location.scl_pin);
            pins.free(location.sda_pin);
        }
        Ok(())
    }

    fn execute(
        &mut self,
        pins: &dyn PinReservation,
        mut transfer: Transfer<'_>,
    ) -> Result<Completion, Error> {
        transfer.check_lengths()?;
        match transfer.command {
            Command::Scan => return self.scan(pins, transfer),
            Command::Reset => return Err(Error::NotUsed),
            _ => {}
        }

        let id = transfer.device_id;
        let device = self.devices.get_mut(&id).ok_or(Error::DeviceNotFound)?;
        let key = (device.location.scl_pin, device.location.sda_pin);
        let controller = self.controllers.get_mut(&key).ok_or(Error::Unknown)?;

        let outcome = match transfer.command {
            Command::Probe => controller
                .bus
                .probe(device.target.address, device.target.timeout_ms)
                .map(|()| Traffic::NONE)
                .map_err(Error::from),
            _ => exchange(&mut controller.bus, device, &mut transfer),
        };
        stats::account(&mut device.stats, &outcome);

        let traffic = outcome?;
        trace!("I2C {} sent {} received {}", id, traffic.sent, traffic.received);
        Ok(Completion { id, out_len: traffic.received })
    }

    fn describe(&self, id: DeviceId, out: &mut [u8]) -> Result<usize, Error> {
        let device = self.devices.get(&id).ok_or(Error::DeviceNotFound)?;
        let location = &device.location;
        stats::describe(
            out,
            format_args!(
                "0x{:03X} @ i2c/p{}cl{:02}da{:02}",
                location.address, location.controller, location.scl_pin, location.sda_pin
            ),
        )
    }

    fn stats(&self, id: DeviceId) -> Result<StatsReport, Error> {
        let device = self.devices.get(&id).ok_or(Error::DeviceNotFound)?;
        Ok(StatsReport {
            statistics: device.stats,
            identity: u64::from(device.location.address),
        })
    }

    fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn bus_count(&self) -> usize {
        self.controllers.len()
    }
}
