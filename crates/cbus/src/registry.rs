use alloc::collections::BTreeMap;

use cbus_icd::{
    BusFamily, Command, CommandRecord, DataType, DeviceConfig, DeviceId, ReplyRecord,
    StatsReport, MAX_DATA_LEN,
};

use crate::config::CbusConfig;
use crate::driver::i2c::I2cDriver;
use crate::driver::onewire::OneWireDriver;
use crate::driver::spi::SpiDriver;
use crate::driver::{BusDriver, Completion, Rejection, Transfer};
use crate::error::Error;
use crate::pins::PinReservation;
use crate::transceiver::{I2cHost, OneWireHost, SpiHost};

/// Owns every driver and the identifier-to-family index.
///
/// A registry is meant to be driven by a single task; see
/// [`serve`](crate::serve).
pub struct Registry<P, O, I, S>
where
    P: PinReservation,
    O: OneWireHost,
    I: I2cHost,
    S: SpiHost,
{
    pins: P,
    onewire: OneWireDriver<O>,
    i2c: I2cDriver<I>,
    spi: SpiDriver<S>,
    devices: BTreeMap<DeviceId, BusFamily>,
}

impl<P, O, I, S> Registry<P, O, I, S>
where
    P: PinReservation,
    O: OneWireHost,
    I: I2cHost,
    S: SpiHost,
{
    pub fn new(config: &CbusConfig, pins: P, onewire: O, i2c: I, spi: S) -> Self {
        Self {
            pins,
            onewire: OneWireDriver::new(onewire, config),
            i2c: I2cDriver::new(i2c, config),
            spi: SpiDriver::new(spi, config),
            devices: BTreeMap::new(),
        }
    }

    pub fn pins(&self) -> &P {
        &self.pins
    }

    pub fn onewire(&self) -> &OneWireDriver<O> {
        &self.onewire
    }

    pub fn i2c(&self) -> &I2cDriver<I> {
        &self.i2c
    }

    pub fn spi(&self) -> &SpiDriver<S> {
        &self.spi
    }

    pub fn family_of(&self, id: DeviceId) -> Option<BusFamily> {
        self.devices.get(&id).copied()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn driver(&self, family: BusFamily) -> &dyn BusDriver {
        match family {
            BusFamily::OneWire => &self.onewire as &dyn BusDriver,
            BusFamily::I2c => &self.i2c as &dyn BusDriver,
            BusFamily::Spi => &self.spi as &dyn BusDriver,
        }
    }

    fn parts(&mut self, family: BusFamily) -> (&P, &mut dyn BusDriver) {
        match family {
            BusFamily::OneWire => (&self.pins, &mut self.onewire as &mut dyn BusDriver),
            BusFamily::I2c => (&self.pins, &mut self.i2c as &mut dyn BusDriver),
            BusFamily::Spi => (&self.pins, &mut self.spi as &mut dyn BusDriver),
        }
    }

    fn resolve(&self, id: DeviceId) -> Result<BusFamily, Error> {
        self.family_of(id).ok_or(Error::DeviceNotFound)
    }

    pub fn attach(
        &mut self,
        family: BusFamily,
        config: &DeviceConfig,
    ) -> Result<DeviceId, Rejection> {
        if config.family() != family {
            return Err(Error::BadArguments.into());
        }

        let Self { pins, onewire, i2c, spi, devices } = self;
        let driver = match family {
            BusFamily::OneWire => onewire as &mut dyn BusDriver,
            BusFamily::I2c => i2c as &mut dyn BusDriver,
            BusFamily::Spi => spi as &mut dyn BusDriver,
        };
        // Identifiers held by the other families.
        let taken = |id: DeviceId| devices.contains_key(&id);
        let id = driver.attach(&*pins, config, &taken)?;

        devices.insert(id, family);
        Ok(id)
    }

    pub fn detach(&mut self, id: DeviceId) -> Result<(), Error> {
        let family = self.resolve(id)?;
        let (pins, driver) = self.parts(family);
        let result = driver.detach(pins, id);
        if matches!(result, Ok(()) | Err(Error::DeviceNotFound)) {
            self.devices.remove(&id);
        }
        result
    }

    /// Run a data-moving command. Scans of buses without attached devices
    /// go to `family`; everything else resolves through the device index.
    pub fn execute(
        &mut self,
        family: BusFamily,
        transfer: Transfer<'_>,
    ) -> Result<Completion, Error> {
        let family = match (self.family_of(transfer.device_id), transfer.command) {
            (Some(owner), _) => owner,
            (None, Command::Scan) => family,
            (None, _) => return Err(Error::DeviceNotFound),
        };
        let (pins, driver) = self.parts(family);
        driver.execute(pins, transfer)
    }

    pub fn describe(&self, id: DeviceId, out: &mut [u8]) -> Result<usize, Error> {
        self.driver(self.resolve(id)?).describe(id, out)
    }

    pub fn stats(&self, id: DeviceId) -> Result<StatsReport, Error> {
        self.driver(self.resolve(id)?).stats(id)
    }

    /// Serve one command record.
    ///
    /// Never fails: errors are reported in the reply status, and the reply
    /// id is [`DeviceId::NONE`] when no device could be resolved.
    pub fn handle(&mut self, request: &CommandRecord) -> ReplyRecord {
        let mut reply = ReplyRecord::to(request);
        if let Err(e) = self.serve_record(request, &mut reply) {
            debug!("{} on {} failed: {}", request.command, request.device_id(), e);
            if e == Error::DeviceNotFound {
                reply.transaction.device_id = DeviceId::NONE;
            }
            reply.status = Err(e);
        }
        reply
    }

    fn serve_record(
        &mut self,
        request: &CommandRecord,
        reply: &mut ReplyRecord,
    ) -> Result<(), Error> {
        let id = request.device_id();
        match request.command {
            Command::Attach => {
                reply.transaction.device_id = DeviceId::NONE;
                let config = request.config.as_ref().ok_or(Error::BadArguments)?;
                match self.attach(request.family, config) {
                    Ok(id) => {
                        reply.transaction.device_id = id;
                        Ok(())
                    }
                    Err(rejection) => {
                        reply.transaction.device_id = rejection.id;
                        Err(rejection.error)
                    }
                }
            }
            Command::Detach => self.detach(id),
            Command::Info => {
                reply.out_len = 0;
                let len = self.describe(id, &mut reply.payload[..])?;
                reply.out_len = len as u8;
                Ok(())
            }
            Command::Stats => {
                reply.out_len = 0;
                let report = self.stats(id)?;
                let used = postcard::to_slice(&report, &mut reply.payload[..])
                    .map_err(|_| Error::NoMemory)?
                    .len();
                reply.out_len = used as u8;
                Ok(())
            }
            Command::Reset
            | Command::Read
            | Command::Write
            | Command::ReadWrite
            | Command::Probe
            | Command::Scan => {
                let (in_len, out_len) = validate(request)?;
                reply.out_len = out_len as u8;
                let transfer = Transfer {
                    command: request.command,
                    device_id: id,
                    device_command: request.transaction.device_command,
                    register_address: request.transaction.register_address,
                    in_len,
                    out_len,
                    payload: &mut reply.payload.0,
                };
                let done = self.execute(request.family, transfer)?;
                reply.transaction.device_id = done.id;
                reply.out_len = done.out_len as u8;
                Ok(())
            }
        }
    }
}

/// Check the record lengths and fill in a read length implied by the data
/// type. Returns `(in_len, out_len)`.
fn validate(request: &CommandRecord) -> Result<(usize, usize), Error> {
    let in_len = usize::from(request.in_len);
    let mut out_len = usize::from(request.out_len);
    if in_len > MAX_DATA_LEN || out_len > MAX_DATA_LEN {
        return Err(Error::BadArguments);
    }

    if request.command.is_read() && out_len == 0 {
        out_len = match request.data_type {
            DataType::Blob => return Err(Error::BadArguments),
            other => other.width().map(usize::from).ok_or(Error::BadArguments)?,
        };
    }
    Ok((in_len, out_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(out_len: u8, data_type: DataType) -> CommandRecord {
        CommandRecord::new(Command::Read, BusFamily::I2c, DeviceId(1)).with_read(out_len, data_type)
    }

    #[test]
    fn read_length_is_filled_from_the_data_type() {
        assert_eq!(validate(&read(0, DataType::U8)), Ok((0, 1)));
        assert_eq!(validate(&read(0, DataType::U16)), Ok((0, 2)));
        assert_eq!(validate(&read(0, DataType::U32)), Ok((0, 4)));
        assert_eq!(validate(&read(0, DataType::U64)), Ok((0, 8)));
        assert_eq!(validate(&read(3, DataType::U64)), Ok((0, 3)));
    }

    #[test]
    fn blob_reads_need_a_length() {
        assert_eq!(validate(&read(0, DataType::Blob)), Err(Error::BadArguments));
        assert_eq!(validate(&read(5, DataType::Blob)), Ok((0, 5)));
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        let mut request = read(128, DataType::Blob);
        assert_eq!(validate(&request), Err(Error::BadArguments));
        request.out_len = 127;
        request.in_len = 128;
        assert_eq!(validate(&request), Err(Error::BadArguments));
    }

    #[test]
    fn writes_keep_a_zero_read_length() {
        let request = CommandRecord::new(Command::Write, BusFamily::OneWire, DeviceId(1));
        assert_eq!(validate(&request), Ok((0, 0)));
    }
}
