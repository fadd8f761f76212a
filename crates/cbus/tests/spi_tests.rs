mod common;

use cbus::icd::{BusError, BusFamily, Command, CommandRecord, DataType, DeviceId, SpiConfig};
use cbus::{BusDriver, CbusConfig, Rejection, SpiLocation, SpiPins, TransceiverError};
use common::{harness, harness_with, SpiRecord};

fn flash(cs: u8) -> SpiConfig {
    let mut config = SpiConfig::new(12, 13, 14, cs);
    config.command_bits = 8;
    config.address_bits = 8;
    config
}

// ---------------------------------------------------------------------------
// Host pool
// ---------------------------------------------------------------------------

#[test]
fn devices_on_one_triple_share_a_host() {
    let mut h = harness();
    assert_eq!(h.registry.spi().free_hosts(), 2);

    let first = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();
    assert_eq!(h.registry.spi().free_hosts(), 1);
    let second = h.registry.attach(BusFamily::Spi, &flash(17).into()).unwrap();
    assert_eq!(h.registry.spi().free_hosts(), 1);

    assert_eq!(h.spi.borrow().opened, 1);
    assert_eq!(
        h.spi.borrow().open,
        vec![(0, SpiPins { miso: 12, mosi: 13, sclk: 14 })]
    );
    let location = SpiLocation { miso_pin: 12, mosi_pin: 13, sclk_pin: 14, cs_pin: 16, host: 0 };
    assert_eq!(first, location.encode());
    assert_eq!(second, SpiLocation { cs_pin: 17, ..location }.encode());
}

#[test]
fn last_detach_releases_the_host() {
    let mut h = harness();
    let first = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();
    let second = h.registry.attach(BusFamily::Spi, &flash(17).into()).unwrap();

    h.registry.detach(first).unwrap();
    assert!(!h.registry.pins().is_reserved(16));
    assert!(h.registry.pins().is_reserved(12));
    assert_eq!(h.registry.spi().bus_count(), 1);

    h.registry.detach(second).unwrap();
    for pin in [12, 13, 14, 17] {
        assert!(!h.registry.pins().is_reserved(pin), "pin {pin} still reserved");
    }
    assert_eq!(h.registry.spi().free_hosts(), 2);
    assert_eq!(h.spi.borrow().closed, 1);
}

#[test]
fn same_chip_select_is_device_exists() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    let rejection = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap_err();

    assert_eq!(rejection.error, BusError::DeviceExists);
    assert_eq!(rejection.id, id);
    assert!(h.registry.pins().is_reserved(16));
}

#[test]
fn duplicate_at_device_limit_reports_existing_id() {
    let mut h = harness_with(CbusConfig::new().with_max_devices(1));
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    let result = h.registry.attach(BusFamily::Spi, &flash(16).into());

    assert_eq!(result, Err(Rejection { error: BusError::DeviceExists, id }));
    let other = h.registry.attach(BusFamily::Spi, &flash(17).into());
    assert_eq!(other, Err(Rejection::from(BusError::NoMemory)));
    assert!(!h.registry.pins().is_reserved(17));
}

#[test]
fn taken_pin_fails_before_opening_a_host() {
    let mut h = harness();
    h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    let result = h.registry.attach(BusFamily::Spi, &SpiConfig::new(20, 21, 22, 13).into());

    assert_eq!(result.map_err(|r| r.error), Err(BusError::PinInUse));
    assert_eq!(h.spi.borrow().opened, 1);
    assert!(!h.registry.pins().is_reserved(20));
    assert_eq!(h.registry.spi().free_hosts(), 1);
}

#[test]
fn exhausted_pool_is_no_more_buses() {
    let mut h = harness();
    h.registry.attach(BusFamily::Spi, &SpiConfig::new(1, 2, 3, 4).into()).unwrap();
    h.registry.attach(BusFamily::Spi, &SpiConfig::new(5, 6, 7, 8).into()).unwrap();

    let result = h.registry.attach(BusFamily::Spi, &SpiConfig::new(9, 10, 11, 15).into());

    assert_eq!(result.map_err(|r| r.error), Err(BusError::NoMoreBuses));
    assert!(!h.registry.pins().is_reserved(9));
    assert_eq!(h.registry.spi().free_hosts(), 0);

    let reuse = h.registry.attach(BusFamily::Spi, &SpiConfig::new(1, 2, 3, 9).into());
    assert!(reuse.is_ok());
}

#[test]
fn chip_select_on_a_bus_pin_is_bad_arguments() {
    let mut h = harness();
    let result = h.registry.attach(BusFamily::Spi, &SpiConfig::new(12, 13, 14, 14).into());
    assert_eq!(result.map_err(|r| r.error), Err(BusError::BadArguments));

    let mut mode = flash(16);
    mode.mode = 4;
    let result = h.registry.attach(BusFamily::Spi, &mode.into());
    assert_eq!(result.map_err(|r| r.error), Err(BusError::BadArguments));
}

// ---------------------------------------------------------------------------
// Transfers
// ---------------------------------------------------------------------------

#[test]
fn short_writes_go_inline() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    let request = CommandRecord::new(Command::Write, BusFamily::Spi, id)
        .with_device_command(0x02)
        .with_register(0x40)
        .with_data(&[1, 2, 3, 4])
        .unwrap();
    assert!(h.registry.handle(&request).is_ok());

    let request = request.with_data(&[1, 2, 3, 4, 5]).unwrap();
    assert!(h.registry.handle(&request).is_ok());

    let state = h.spi.borrow();
    assert_eq!(
        state.transfers,
        vec![
            SpiRecord {
                cs_pin: 16,
                command: 0x02,
                address: 0x40,
                tx: vec![1, 2, 3, 4],
                inline: true,
                rx_len: 0,
            },
            SpiRecord {
                cs_pin: 16,
                command: 0x02,
                address: 0x40,
                tx: vec![1, 2, 3, 4, 5],
                inline: false,
                rx_len: 0,
            },
        ]
    );

    let stats = h.registry.stats(id).unwrap().statistics;
    assert_eq!(stats.framing_correction, 2);
    assert_eq!(stats.bytes_sent, (4 + 2) + (5 + 2));
}

#[test]
fn read_receives_out_len() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();
    h.spi.borrow_mut().response = vec![0xEF, 0x40];

    let request = CommandRecord::new(Command::Read, BusFamily::Spi, id)
        .with_device_command(0x9F)
        .with_read(0, DataType::U16);
    let reply = h.registry.handle(&request);

    assert_eq!(reply.status, Ok(()));
    assert_eq!(reply.data(), &[0xEF, 0x40]);
    assert_eq!(h.spi.borrow().transfers[0].rx_len, 2);

    let stats = h.registry.stats(id).unwrap().statistics;
    assert_eq!(stats.bytes_sent, 2);
    assert_eq!(stats.bytes_received, 2);
}

#[test]
fn empty_write_is_bad_arguments() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    let reply = h.registry.handle(&CommandRecord::new(Command::Write, BusFamily::Spi, id));

    assert_eq!(reply.status, Err(BusError::BadArguments));
    assert!(h.spi.borrow().transfers.is_empty());
}

#[test]
fn unsupported_commands_are_not_used() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    for command in [Command::Reset, Command::Probe, Command::Scan] {
        let reply = h.registry.handle(&CommandRecord::new(command, BusFamily::Spi, id));
        assert_eq!(reply.status, Err(BusError::NotUsed), "{command:?}");
    }
    let read_write = CommandRecord::new(Command::ReadWrite, BusFamily::Spi, id)
        .with_read(1, DataType::U8);
    assert_eq!(h.registry.handle(&read_write).status, Err(BusError::NotUsed));

    let unattached = CommandRecord::new(Command::Scan, BusFamily::Spi, DeviceId(0x0123));
    assert_eq!(h.registry.handle(&unattached).status, Err(BusError::NotUsed));
}

#[test]
fn transceiver_failures() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();
    let request = CommandRecord::new(Command::Read, BusFamily::Spi, id).with_read(1, DataType::U8);

    h.spi.borrow_mut().fail = Some(TransceiverError::Timeout);
    assert_eq!(h.registry.handle(&request).status, Err(BusError::Timeout));
    h.spi.borrow_mut().fail = Some(TransceiverError::Other);
    assert_eq!(h.registry.handle(&request).status, Err(BusError::Unknown));

    let stats = h.registry.stats(id).unwrap().statistics;
    assert_eq!((stats.timeouts, stats.other_errors), (1, 1));
}

#[test]
fn info_and_stats_identity() {
    let mut h = harness();
    let id = h.registry.attach(BusFamily::Spi, &flash(16).into()).unwrap();

    let reply = h.registry.handle(&CommandRecord::new(Command::Info, BusFamily::Spi, id));
    assert_eq!(reply.data(), b"CS10 @ spi/p00cl14do13di12");

    assert_eq!(h.registry.stats(id).unwrap().identity, 16);
}
