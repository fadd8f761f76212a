use alloc::collections::BTreeMap;

use cbus_icd::{
    BusFamily, Command, DeviceConfig, DeviceId, OneWireConfig, RomCode, Statistics, StatsReport,
    PAYLOAD_LEN,
};

use super::{lsb_first, push_all, BusDriver, Completion, Frame, Rejection, Taken, Transfer};
use crate::config::CbusConfig;
use crate::crc::crc8_maxim;
use crate::error::Error;
use crate::id::{rom_discriminator, OneWireLocation, MAX_CHANNEL};
use crate::lease::PinLease;
use crate::pins::{PinMask, PinReservation};
use crate::stats::{self, Traffic};
use crate::transceiver::{OneWireBus, OneWireHost};

/// ROM function command addressing a single device.
pub const MATCH_ROM: u8 = 0x55;
pub const MAX_CMD_BYTES: u8 = 2;
pub const MAX_ADDR_BYTES: u8 = 8;

const ROM_LEN: usize = 8;

struct OneWireDevice {
    location: OneWireLocation,
    rom_code: RomCode,
    cmd_bytes: u8,
    addr_bytes: u8,
    crc_check: bool,
    stats: Statistics,
}

/// 1-Wire devices, grouped into one bus per data pin.
pub struct OneWireDriver<H: OneWireHost> {
    host: H,
    buses: BTreeMap<u8, H::Bus>,
    devices: BTreeMap<DeviceId, OneWireDevice>,
    seed: u16,
    max_devices: usize,
    scan_limit: usize,
}

impl<H: OneWireHost> OneWireDriver<H> {
    pub fn new(host: H, config: &CbusConfig) -> Self {
        Self {
            host,
            buses: BTreeMap::new(),
            devices: BTreeMap::new(),
            seed: config.device_seed,
            max_devices: config.max_devices,
            scan_limit: config.scan_limit,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn location(&self, pin: u8, channels: (u8, u8), rom_code: &RomCode) -> OneWireLocation {
        OneWireLocation {
            data_pin: pin,
            tx_channel: channels.0,
            rx_channel: channels.1,
            discriminator: rom_discriminator(self.seed, rom_code),
        }
    }

    fn collides(&self, id: DeviceId, taken: Taken<'_>) -> bool {
        self.devices.contains_key(&id) || taken(id)
    }

    fn attach_device(
        &mut self,
        pins: &dyn PinReservation,
        config: &OneWireConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection> {
        let pin = config.data_pin;
        let mask = PinMask::pin(pin).ok_or(Error::BadArguments)?;
        if config.cmd_bytes > MAX_CMD_BYTES || config.addr_bytes > MAX_ADDR_BYTES {
            return Err(Error::BadArguments.into());
        }

        // A known bus fixes the identifier before anything is allocated.
        if let Some(bus) = self.buses.get(&pin) {
            let id = self.location(pin, bus.channels(), &config.rom_code).encode();
            if self.collides(id, taken) {
                warn!("1-Wire id {} already attached", id);
                return Err(Rejection { error: Error::DeviceExists, id });
            }
        }
        if self.devices.len() >= self.max_devices {
            return Err(Error::NoMemory.into());
        }

        let mut lease = None;
        if !self.buses.contains_key(&pin) {
            let guard = PinLease::acquire(pins, mask)?;
            let bus = self.host.open(pin).map_err(Error::from)?;
            let (tx, rx) = bus.channels();
            self.buses.insert(pin, bus);
            if tx > MAX_CHANNEL || rx > MAX_CHANNEL {
                error!("1-Wire host gave channels {}/{} on pin {}", tx, rx, pin);
                self.close_bus(pin);
                return Err(Error::Unknown.into());
            }
            lease = Some(guard);
        }

        let channels = match self.buses.get(&pin) {
            Some(bus) => bus.channels(),
            None => return Err(Error::Unknown.into()),
        };
        let location = self.location(pin, channels, &config.rom_code);
        let id = location.encode();

        if self.collides(id, taken) {
            warn!("1-Wire id {} already attached", id);
            if lease.is_some() {
                self.close_bus(pin);
            }
            return Err(Rejection { error: Error::DeviceExists, id });
        }
        if let Some(lease) = lease {
            lease.commit();
        }

        self.devices.insert(
            id,
            OneWireDevice {
                location,
                rom_code: config.rom_code,
                cmd_bytes: config.cmd_bytes,
                addr_bytes: config.addr_bytes,
                crc_check: config.crc_check,
                stats: Statistics::default(),
            },
        );
        info!("1-Wire device {} attached on pin {}", id, pin);
        Ok(id)
    }

    /// Hand the bus back to the host. The pin stays reserved.
    fn close_bus(&mut self, pin: u8) {
        if let Some(bus) = self.buses.remove(&pin) {
            if let Err(e) = self.host.close(bus) {
                warn!("closing 1-Wire bus on pin {} failed: {}", pin, e);
            }
        }
    }

    fn scan(
        &mut self,
        pins: &dyn PinReservation,
        transfer: Transfer<'_>,
    ) -> Result<Completion, Error> {
        let pin = OneWireLocation::decode(transfer.device_id).data_pin;
        let mask = PinMask::pin(pin).ok_or(Error::BadArguments)?;
        let limit = self.scan_limit.min(PAYLOAD_LEN / ROM_LEN);

        let mut temporary = None;
        let mut lease = None;
        let bus = match self.buses.get_mut(&pin) {
            Some(bus) => bus,
            None => {
                lease = Some(PinLease::acquire(pins, mask)?);
                debug!("opening temporary 1-Wire bus on pin {}", pin);
                temporary.insert(self.host.open(pin)?)
            }
        };

        let mut found = 0;
        let mut outcome = Ok(());
        for rom in bus.search().take(limit) {
            match rom {
                Ok(rom) => {
                    transfer.payload[found * ROM_LEN..][..ROM_LEN].copy_from_slice(&rom.0);
                    found += 1;
                }
                Err(e) => {
                    outcome = Err(Error::from(e));
                    break;
                }
            }
        }

        if let Some(bus) = temporary {
            if let Err(e) = self.host.close(bus) {
                warn!("closing temporary 1-Wire bus on pin {} failed: {}", pin, e);
            }
        }
        drop(lease);

        outcome?;
        debug!("1-Wire scan on pin {} found {} devices", pin, found);
        Ok(Completion {
            id: DeviceId(found as u32),
            out_len: found * ROM_LEN,
        })
    }
}

/// MATCH ROM, the ROM code in wire order, then command and address bytes.
fn addressing(device: &OneWireDevice, transfer: &Transfer<'_>) -> Result<Frame, Error> {
    let mut frame = Frame::new();
    push_all(&mut frame, [MATCH_ROM])?;
    push_all(&mut frame, device.rom_code.wire_order())?;
    push_all(&mut frame, lsb_first(u64::from(transfer.device_command), device.cmd_bytes))?;
    push_all(&mut frame, lsb_first(transfer.register_address, device.addr_bytes))?;
    Ok(frame)
}

fn exchange<B: OneWireBus>(
    bus: &mut B,
    device: &OneWireDevice,
    transfer: &mut Transfer<'_>,
) -> Result<Traffic, Error> {
    let mut frame = addressing(device, transfer)?;
    if transfer.command != Command::Read {
        push_all(&mut frame, transfer.payload[..transfer.in_len].iter().copied())?;
    }
    let receive = if transfer.command.is_read() { transfer.out_len } else { 0 };
    if transfer.command.is_read() && receive == 0 {
        return Err(Error::BadArguments);
    }

    bus.reset()?;
    bus.write(&frame)?;
    if receive > 0 {
        bus.read(&mut transfer.payload[..receive])?;
        if device.crc_check && crc8_maxim(&transfer.payload[..receive]) != 0 {
            return Err(Error::BadCrc);
        }
    }
    Ok(Traffic::new(frame.len(), receive))
}

fn probe<B: OneWireBus>(bus: &mut B, rom_code: &RomCode) -> Result<Traffic, Error> {
    for found in bus.search() {
        if found? == *rom_code {
            return Ok(Traffic::NONE);
        }
    }
    Err(Error::DeviceNotAcknowledged)
}

impl<H: OneWireHost> BusDriver for OneWireDriver<H> {
    fn family(&self) -> BusFamily {
        BusFamily::OneWire
    }

    fn attach(
        &mut self,
        pins: &dyn PinReservation,
        config: &DeviceConfig,
        taken: Taken<'_>,
    ) -> Result<DeviceId, Rejection> {
        match config {
            DeviceConfig::OneWire(config) => self.attach_device(pins, config, taken),
            _ => Err(Error::BadArguments.into()),
        }
    }

    fn detach(&mut self, pins: &dyn PinReservation, id: DeviceId) -> Result<(), Error> {
        let device = self.devices.remove(&id).ok_or(Error::DeviceNotFound)?;
        let pin = device.location.data_pin;
        info!("1-Wire device {} detached", id);

        if !self.devices.values().any(|d| d.location.data_pin == pin) {
            self.close_bus(pin);
            pins.free(pin);
        }
        Ok(())
    }

    fn execute(
        &mut self,
        pins: &dyn PinReservation,
        mut transfer: Transfer<'_>,
    ) -> Result<Completion, Error> {
        transfer.check_lengths()?;
        if transfer.command == Command::Scan {
            return self.scan(pins, transfer);
        }

        let id = transfer.device_id;
        let device = self.devices.get_mut(&id).ok_or(Error::DeviceNotFound)?;
        let bus = self
            .buses
            .get_mut(&device.location.data_pin)
            .ok_or(Error::Unknown)?;

        let outcome = match transfer.command {
            Command::Reset => bus.reset().map(|()| Traffic::NONE).map_err(Error::from),
            Command::Probe => probe(bus, &device.rom_code),
            Command::Read | Command::Write | Command::ReadWrite => {
                exchange(bus, device, &mut transfer)
            }
            _ => Err(Error::NotUsed),
        };
        stats::account(&mut device.stats, &outcome);

        let traffic = outcome?;
        trace!("1-Wire {} sent {} received {}", id, traffic.sent, traffic.received);
        Ok(Completion { id, out_len: traffic.received })
    }

    fn describe(&self, id: DeviceId, out: &mut [u8]) -> Result<usize, Error> {
        let device = self.devices.get(&id).ok_or(Error::DeviceNotFound)?;
        let location = &device.location;
        stats::describe(
            out,
            format_args!(
                "{} @ 1w/g{:02}t{}r{}",
                device.rom_code, location.data_pin, location.tx_channel, location.rx_channel
            ),
        )
    }

    fn stats(&self, id: DeviceId) -> Result<StatsReport, Error> {
        let device = self.devices.get(&id).ok_or(Error::DeviceNotFound)?;
        Ok(StatsReport {
            statistics: device.stats,
            identity: device.rom_code.to_u64(),
        })
    }

    fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn bus_count(&self) -> usize {
        self.buses.len()
    }
}
