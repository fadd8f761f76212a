#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use cbus::icd::RomCode;
use cbus::{
    CbusConfig, I2cBus, I2cHost, I2cTarget, OneWireBus, OneWireHost, OpenError, PinPool, Registry,
    SpiBus, SpiHost, SpiPins, SpiTarget, SpiTransfer, SpiTx, TransceiverError,
};

// ---------------------------------------------------------------------------
// 1-Wire
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct OneWireState {
    /// Pins with an open bus.
    pub open: Vec<u8>,
    pub opened: usize,
    pub closed: usize,
    pub channels: (u8, u8),
    /// ROM codes answering a search on any bus.
    pub present: Vec<RomCode>,
    /// Error yielded after the present devices during a search.
    pub search_error: Option<TransceiverError>,
    pub resets: usize,
    pub frames: Vec<Vec<u8>>,
    /// Bytes served to reads, in order.
    pub response: Vec<u8>,
    pub fail_open: Option<OpenError>,
    pub fail_reset: Option<TransceiverError>,
}

pub struct MockOneWireHost {
    pub state: Rc<RefCell<OneWireState>>,
}

pub struct MockOneWireBus {
    pin: u8,
    state: Rc<RefCell<OneWireState>>,
}

impl OneWireHost for MockOneWireHost {
    type Bus = MockOneWireBus;

    fn open(&mut self, data_pin: u8) -> Result<MockOneWireBus, OpenError> {
        let mut state = self.state.borrow_mut();
        if let Some(e) = state.fail_open.take() {
            return Err(e);
        }
        state.opened += 1;
        state.open.push(data_pin);
        Ok(MockOneWireBus { pin: data_pin, state: self.state.clone() })
    }

    fn close(&mut self, bus: MockOneWireBus) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.closed += 1;
        state.open.retain(|pin| *pin != bus.pin);
        Ok(())
    }
}

impl OneWireBus for MockOneWireBus {
    fn channels(&self) -> (u8, u8) {
        self.state.borrow().channels
    }

    fn reset(&mut self) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.resets += 1;
        match state.fail_reset {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), TransceiverError> {
        self.state.borrow_mut().frames.push(bytes.to_vec());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), TransceiverError> {
        let state = self.state.borrow();
        let n = buf.len().min(state.response.len());
        buf[..n].copy_from_slice(&state.response[..n]);
        Ok(())
    }

    fn search(&mut self) -> impl Iterator<Item = Result<RomCode, TransceiverError>> + '_ {
        let state = self.state.borrow();
        let found: Vec<_> = state.present.iter().copied().map(Ok).collect();
        found.into_iter().chain(state.search_error.map(Err))
    }
}

// ---------------------------------------------------------------------------
// I2C
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct I2cState {
    /// Hardware controllers available.
    pub controllers: u8,
    /// (scl, sda, controller index) of every open controller.
    pub open: Vec<(u8, u8, u8)>,
    pub opened: usize,
    pub closed: usize,
    /// Addresses that acknowledge.
    pub present: Vec<u16>,
    pub writes: Vec<(u16, Vec<u8>)>,
    pub reads: Vec<(u16, usize)>,
    pub probes: usize,
    pub response: Vec<u8>,
    pub fail: Option<TransceiverError>,
}

impl Default for I2cState {
    fn default() -> Self {
        Self {
            controllers: 2,
            open: Vec::new(),
            opened: 0,
            closed: 0,
            present: Vec::new(),
            writes: Vec::new(),
            reads: Vec::new(),
            probes: 0,
            response: Vec::new(),
            fail: None,
        }
    }
}

impl I2cState {
    fn check(&self, target: &I2cTarget) -> Result<(), TransceiverError> {
        if let Some(e) = self.fail {
            return Err(e);
        }
        if target.ack_check && !self.present.contains(&target.address) {
            return Err(TransceiverError::NotAcknowledged);
        }
        Ok(())
    }

    fn fill(&self, buf: &mut [u8]) {
        let n = buf.len().min(self.response.len());
        buf[..n].copy_from_slice(&self.response[..n]);
    }
}

pub struct MockI2cHost {
    pub state: Rc<RefCell<I2cState>>,
}

pub struct MockI2cBus {
    index: u8,
    state: Rc<RefCell<I2cState>>,
}

impl I2cHost for MockI2cHost {
    type Bus = MockI2cBus;

    fn open(&mut self, scl_pin: u8, sda_pin: u8) -> Result<(u8, MockI2cBus), OpenError> {
        let mut state = self.state.borrow_mut();
        let index = (0..state.controllers)
            .find(|i| state.open.iter().all(|(_, _, used)| used != i))
            .ok_or(OpenError::NoMoreBuses)?;
        state.opened += 1;
        state.open.push((scl_pin, sda_pin, index));
        Ok((index, MockI2cBus { index, state: self.state.clone() }))
    }

    fn close(&mut self, bus: MockI2cBus) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.closed += 1;
        state.open.retain(|(_, _, index)| *index != bus.index);
        Ok(())
    }
}

impl I2cBus for MockI2cBus {
    fn write(&mut self, target: &I2cTarget, bytes: &[u8]) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.check(target)?;
        state.writes.push((target.address, bytes.to_vec()));
        Ok(())
    }

    fn read(&mut self, target: &I2cTarget, buf: &mut [u8]) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.check(target)?;
        state.reads.push((target.address, buf.len()));
        state.fill(buf);
        Ok(())
    }

    fn write_read(
        &mut self,
        target: &I2cTarget,
        bytes: &[u8],
        buf: &mut [u8],
    ) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.check(target)?;
        state.writes.push((target.address, bytes.to_vec()));
        state.reads.push((target.address, buf.len()));
        state.fill(buf);
        Ok(())
    }

    fn probe(&mut self, address: u16, _timeout_ms: u8) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.probes += 1;
        if let Some(e) = state.fail {
            return Err(e);
        }
        if state.present.contains(&address) {
            Ok(())
        } else {
            Err(TransceiverError::NotAcknowledged)
        }
    }
}

// ---------------------------------------------------------------------------
// SPI
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiRecord {
    pub cs_pin: u8,
    pub command: u16,
    pub address: u64,
    pub tx: Vec<u8>,
    pub inline: bool,
    pub rx_len: usize,
}

#[derive(Debug)]
pub struct SpiState {
    pub slots: u8,
    pub open: Vec<(u8, SpiPins)>,
    pub opened: usize,
    pub closed: usize,
    pub transfers: Vec<SpiRecord>,
    pub response: Vec<u8>,
    pub fail: Option<TransceiverError>,
}

impl Default for SpiState {
    fn default() -> Self {
        Self {
            slots: 2,
            open: Vec::new(),
            opened: 0,
            closed: 0,
            transfers: Vec::new(),
            response: Vec::new(),
            fail: None,
        }
    }
}

pub struct MockSpiHost {
    pub state: Rc<RefCell<SpiState>>,
}

pub struct MockSpiBus {
    slot: u8,
    state: Rc<RefCell<SpiState>>,
}

impl SpiHost for MockSpiHost {
    type Bus = MockSpiBus;

    fn slots(&self) -> u8 {
        self.state.borrow().slots
    }

    fn open(&mut self, slot: u8, pins: SpiPins) -> Result<MockSpiBus, OpenError> {
        let mut state = self.state.borrow_mut();
        state.opened += 1;
        state.open.push((slot, pins));
        Ok(MockSpiBus { slot, state: self.state.clone() })
    }

    fn close(&mut self, bus: MockSpiBus) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        state.closed += 1;
        state.open.retain(|(slot, _)| *slot != bus.slot);
        Ok(())
    }
}

impl SpiBus for MockSpiBus {
    fn polling_transmit(
        &mut self,
        target: &SpiTarget,
        transfer: SpiTransfer<'_>,
    ) -> Result<(), TransceiverError> {
        let mut state = self.state.borrow_mut();
        if let Some(e) = state.fail {
            return Err(e);
        }
        let n = transfer.rx.len().min(state.response.len());
        transfer.rx[..n].copy_from_slice(&state.response[..n]);
        state.transfers.push(SpiRecord {
            cs_pin: target.cs_pin,
            command: transfer.command,
            address: transfer.address,
            tx: transfer.tx.bytes().to_vec(),
            inline: matches!(transfer.tx, SpiTx::Inline { .. }),
            rx_len: transfer.rx.len(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub type TestRegistry = Registry<PinPool, MockOneWireHost, MockI2cHost, MockSpiHost>;

pub struct Harness {
    pub registry: TestRegistry,
    pub onewire: Rc<RefCell<OneWireState>>,
    pub i2c: Rc<RefCell<I2cState>>,
    pub spi: Rc<RefCell<SpiState>>,
}

pub fn harness() -> Harness {
    harness_with(CbusConfig::new().with_seed(0x1D2C))
}

pub fn harness_with(config: CbusConfig) -> Harness {
    let onewire = Rc::new(RefCell::new(OneWireState::default()));
    let i2c = Rc::new(RefCell::new(I2cState::default()));
    let spi = Rc::new(RefCell::new(SpiState::default()));
    let registry = Registry::new(
        &config,
        PinPool::new(),
        MockOneWireHost { state: onewire.clone() },
        MockI2cHost { state: i2c.clone() },
        MockSpiHost { state: spi.clone() },
    );
    Harness { registry, onewire, i2c, spi }
}

/// DS18B20-style ROM code used throughout the tests.
pub const ROM: RomCode = RomCode::new([0x28, 0x02, 0x01, 0x03, 0x04, 0x05, 0x06, 0x99]);
/// Collides with [`ROM`] under seed 0x1D2C.
pub const ROM_TWIN: RomCode = RomCode::new([0x28, 0x02, 0x01, 0x03, 0x04, 0x14, 0x0E, 0x98]);

pub fn rom(serial: u8) -> RomCode {
    RomCode::new([0x28, serial, 0, 0, 0, 0, 0, 0])
}
