use core::ops::{Deref, DerefMut};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    BusError, BusFamily, Command, DataType, DeviceConfig, DeviceId, MAX_DATA_LEN,
    PAYLOAD_LEN,
};

/// Addressing part of a command: which device, which device command and
/// which register or memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceTransaction {
    pub device_id: DeviceId,
    pub device_command: u16,
    pub register_address: u64,
}

/// Fixed 128-byte data buffer shared by requests and replies.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Payload(pub [u8; PAYLOAD_LEN]);

impl Payload {
    pub const fn new() -> Self {
        Self([0; PAYLOAD_LEN])
    }

    /// Copy `data` to the front of a zeroed buffer.
    pub fn from_slice(data: &[u8]) -> Result<Self, BusError> {
        if data.len() > PAYLOAD_LEN {
            return Err(BusError::BadArguments);
        }
        let mut payload = Self::new();
        payload.0[..data.len()].copy_from_slice(data);
        Ok(payload)
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Payload {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let used = self.0.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
        write!(f, "Payload({:02X?})", &self.0[..used])
    }
}

impl Deref for Payload {
    type Target = [u8; PAYLOAD_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Payload {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PayloadVisitor;

        impl Visitor<'_> for PayloadVisitor {
            type Value = Payload;

            fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{} payload bytes", PAYLOAD_LEN)
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Payload, E> {
                let bytes: [u8; PAYLOAD_LEN] = v
                    .try_into()
                    .map_err(|_| E::invalid_length(v.len(), &self))?;
                Ok(Payload(bytes))
            }
        }

        deserializer.deserialize_bytes(PayloadVisitor)
    }
}

/// Request posted by a client to the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandRecord {
    pub command: Command,
    pub family: BusFamily,
    pub transaction: DeviceTransaction,
    /// Bytes of `payload` sent to the device.
    pub in_len: u8,
    /// Bytes expected back from the device.
    pub out_len: u8,
    pub data_type: DataType,
    /// Opaque value echoed in the reply.
    pub tag: u32,
    /// Device configuration, only read by [`Command::Attach`].
    pub config: Option<DeviceConfig>,
    pub payload: Payload,
}

impl CommandRecord {
    pub fn new(command: Command, family: BusFamily, device_id: DeviceId) -> Self {
        Self {
            command,
            family,
            transaction: DeviceTransaction {
                device_id,
                ..Default::default()
            },
            in_len: 0,
            out_len: 0,
            data_type: DataType::Blob,
            tag: 0,
            config: None,
            payload: Payload::new(),
        }
    }

    pub fn attach(config: DeviceConfig) -> Self {
        let mut record = Self::new(Command::Attach, config.family(), DeviceId::NONE);
        record.config = Some(config);
        record
    }

    pub fn detach(family: BusFamily, device_id: DeviceId) -> Self {
        Self::new(Command::Detach, family, device_id)
    }

    pub fn with_device_command(mut self, device_command: u16) -> Self {
        self.transaction.device_command = device_command;
        self
    }

    pub fn with_register(mut self, register_address: u64) -> Self {
        self.transaction.register_address = register_address;
        self
    }

    pub fn with_read(mut self, out_len: u8, data_type: DataType) -> Self {
        self.out_len = out_len;
        self.data_type = data_type;
        self
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    /// Place `data` at the front of the payload and set `in_len`.
    pub fn with_data(mut self, data: &[u8]) -> Result<Self, BusError> {
        if data.len() > MAX_DATA_LEN {
            return Err(BusError::BadArguments);
        }
        self.payload = Payload::from_slice(data)?;
        self.in_len = data.len() as u8;
        Ok(self)
    }

    pub fn device_id(&self) -> DeviceId {
        self.transaction.device_id
    }

    pub fn to_frame<'a>(&self, buf: &'a mut [u8]) -> postcard::Result<&'a mut [u8]> {
        postcard::to_slice(self, buf)
    }

    pub fn from_frame(frame: &[u8]) -> postcard::Result<Self> {
        postcard::from_bytes(frame)
    }
}

/// Completion delivered back to the client that posted a [`CommandRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReplyRecord {
    pub command: Command,
    pub family: BusFamily,
    pub transaction: DeviceTransaction,
    pub status: Result<(), BusError>,
    pub in_len: u8,
    pub out_len: u8,
    pub data_type: DataType,
    pub tag: u32,
    pub payload: Payload,
}

impl ReplyRecord {
    /// Start a reply that echoes the request shape.
    pub fn to(request: &CommandRecord) -> Self {
        Self {
            command: request.command,
            family: request.family,
            transaction: request.transaction,
            status: Ok(()),
            in_len: request.in_len,
            out_len: request.out_len,
            data_type: request.data_type,
            tag: request.tag,
            payload: request.payload,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Resolved device id, or the result count for scans.
    pub fn device_id(&self) -> DeviceId {
        self.transaction.device_id
    }

    /// Bytes returned by the device.
    pub fn data(&self) -> &[u8] {
        &self.payload[..usize::from(self.out_len).min(PAYLOAD_LEN)]
    }

    pub fn status_code(&self) -> u8 {
        crate::status_code(&self.status)
    }

    pub fn to_frame<'a>(&self, buf: &'a mut [u8]) -> postcard::Result<&'a mut [u8]> {
        postcard::to_slice(self, buf)
    }

    pub fn from_frame(frame: &[u8]) -> postcard::Result<Self> {
        postcard::from_bytes(frame)
    }
}
