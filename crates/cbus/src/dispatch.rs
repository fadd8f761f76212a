//! Single-task command dispatch.
//!
//! Clients post [`Envelope`]s on a shared [`CommandChannel`]; the task
//! running [`serve`] owns the [`Registry`] and answers every envelope on
//! the reply slot it carries, in arrival order.

use cbus_icd::{
    BusFamily, Command, CommandRecord, DataType, DeviceConfig, DeviceId, ReplyRecord, StatsReport,
    PAYLOAD_LEN,
};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use heapless::String;

use crate::driver::Rejection;
use crate::error::Error;
use crate::pins::PinReservation;
use crate::registry::Registry;
use crate::transceiver::{I2cHost, OneWireHost, SpiHost};

/// Where the dispatcher delivers the reply for one client.
pub type ReplySlot<M> = Signal<M, ReplyRecord>;

/// A command together with the slot its reply goes to.
pub struct Envelope<'r, M: RawMutex> {
    pub record: CommandRecord,
    pub reply: &'r ReplySlot<M>,
}

/// Queue of pending commands, drained in order by [`serve`].
pub type CommandChannel<'r, M, const N: usize> = Channel<M, Envelope<'r, M>, N>;

/// Handle one envelope and signal its reply.
pub fn process<M, P, O, I, S>(registry: &mut Registry<P, O, I, S>, envelope: Envelope<'_, M>)
where
    M: RawMutex,
    P: PinReservation,
    O: OneWireHost,
    I: I2cHost,
    S: SpiHost,
{
    let reply = registry.handle(&envelope.record);
    envelope.reply.signal(reply);
}

/// Dispatcher task body.
pub async fn serve<M, P, O, I, S, const N: usize>(
    registry: &mut Registry<P, O, I, S>,
    inbox: Receiver<'_, M, Envelope<'_, M>, N>,
) -> !
where
    M: RawMutex,
    P: PinReservation,
    O: OneWireHost,
    I: I2cHost,
    S: SpiHost,
{
    info!("bus dispatcher started");
    loop {
        let envelope = inbox.receive().await;
        trace!("dispatching {} tag {}", envelope.record.command, envelope.record.tag);
        process(registry, envelope);
    }
}

/// Request side of the dispatcher for one task.
///
/// Each client owns its reply slot, so it may only have one request in
/// flight.
pub struct Client<'c, 'r, M: RawMutex, const N: usize> {
    outbox: Sender<'c, M, Envelope<'r, M>, N>,
    mailbox: &'r ReplySlot<M>,
    next_tag: u32,
}

impl<'c, 'r, M: RawMutex, const N: usize> Client<'c, 'r, M, N> {
    pub fn new(outbox: Sender<'c, M, Envelope<'r, M>, N>, mailbox: &'r ReplySlot<M>) -> Self {
        Self { outbox, mailbox, next_tag: 1 }
    }

    /// Post `record` and wait for its reply. A zero tag is replaced by a
    /// per-client sequence number; any other tag is sent as given.
    pub async fn call(&mut self, mut record: CommandRecord) -> ReplyRecord {
        if record.tag == 0 {
            record.tag = self.next_tag;
            self.next_tag = self.next_tag.wrapping_add(1).max(1);
        }
        let tag = record.tag;

        self.mailbox.reset();
        self.outbox.send(Envelope { record, reply: self.mailbox }).await;
        let reply = self.mailbox.wait().await;
        if reply.tag != tag {
            warn!("reply tag {} does not match request tag {}", reply.tag, tag);
        }
        reply
    }

    async fn call_with_data(&mut self, record: CommandRecord, data: &[u8]) -> ReplyRecord {
        match record.clone().with_data(data) {
            Ok(record) => self.call(record).await,
            Err(e) => {
                let mut reply = ReplyRecord::to(&record);
                reply.transaction.device_id = DeviceId::NONE;
                reply.status = Err(e);
                reply
            }
        }
    }

    pub async fn attach(&mut self, config: impl Into<DeviceConfig>) -> Result<DeviceId, Rejection> {
        let reply = self.call(CommandRecord::attach(config.into())).await;
        match reply.status {
            Ok(()) => Ok(reply.device_id()),
            Err(error) => Err(Rejection { error, id: reply.device_id() }),
        }
    }

    pub async fn detach(&mut self, family: BusFamily, id: DeviceId) -> Result<(), Error> {
        self.call(CommandRecord::detach(family, id)).await.status
    }

    pub async fn read(
        &mut self,
        family: BusFamily,
        id: DeviceId,
        device_command: u16,
        out_len: u8,
        data_type: DataType,
    ) -> ReplyRecord {
        let record = CommandRecord::new(Command::Read, family, id)
            .with_device_command(device_command)
            .with_read(out_len, data_type);
        self.call(record).await
    }

    pub async fn write(
        &mut self,
        family: BusFamily,
        id: DeviceId,
        device_command: u16,
        data: &[u8],
    ) -> ReplyRecord {
        let record =
            CommandRecord::new(Command::Write, family, id).with_device_command(device_command);
        self.call_with_data(record, data).await
    }

    pub async fn read_write(
        &mut self,
        family: BusFamily,
        id: DeviceId,
        device_command: u16,
        data: &[u8],
        out_len: u8,
    ) -> ReplyRecord {
        let record = CommandRecord::new(Command::ReadWrite, family, id)
            .with_device_command(device_command)
            .with_read(out_len, DataType::Blob);
        self.call_with_data(record, data).await
    }

    /// Enumerate the bus `id` lives on. The count comes back in the reply
    /// id field.
    pub async fn scan(&mut self, family: BusFamily, id: DeviceId) -> ReplyRecord {
        self.call(CommandRecord::new(Command::Scan, family, id)).await
    }

    pub async fn stats(&mut self, family: BusFamily, id: DeviceId) -> Result<StatsReport, Error> {
        let reply = self.call(CommandRecord::new(Command::Stats, family, id)).await;
        reply.status?;
        postcard::from_bytes(reply.data()).map_err(|_| Error::Unknown)
    }

    pub async fn info(
        &mut self,
        family: BusFamily,
        id: DeviceId,
    ) -> Result<String<PAYLOAD_LEN>, Error> {
        let reply = self.call(CommandRecord::new(Command::Info, family, id)).await;
        reply.status?;
        let text = core::str::from_utf8(reply.data()).map_err(|_| Error::Unknown)?;
        let mut description = String::new();
        description.push_str(text).map_err(|_| Error::NoMemory)?;
        Ok(description)
    }
}
