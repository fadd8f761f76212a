//! Interface control document for the common bus dispatcher.
//!
//! Everything that crosses the dispatch boundary lives here: the bus
//! families, the command set, device configurations, the flat error
//! taxonomy and the fixed-shape command and reply records exchanged with
//! sensor clients.
#![no_std]

use serde::{Deserialize, Serialize};

macro_rules! define_code_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident = $code:literal),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[cfg_attr(feature = "defmt", derive(defmt::Format))]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $code),*
        }

        impl TryFrom<u8> for $name {
            type Error = BusError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($code => Ok(Self::$variant),)*
                    _ => Err(BusError::BadArguments),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

mod device;
pub use device::*;

mod error;
pub use error::*;

mod record;
pub use record::*;

mod stats;
pub use stats::*;

/// Size of the fixed payload buffer carried by every record.
pub const PAYLOAD_LEN: usize = 128;
/// Largest `in_len` / `out_len` a record may carry (7-bit length fields).
pub const MAX_DATA_LEN: usize = PAYLOAD_LEN - 1;
/// Upper bound for a postcard-encoded command or reply record.
pub const MAX_FRAME_LEN: usize = 256;

define_code_enum!(
    /// Physical bus family; selects the driver and the identifier layout.
    BusFamily {
        I2c = 0,
        Spi = 1,
        OneWire = 2,
    }
);

define_code_enum!(
    /// Commands understood by the dispatcher.
    Command {
        Reset = 0,
        Read = 1,
        Write = 2,
        ReadWrite = 3,
        Probe = 4,
        Scan = 5,
        Attach = 6,
        Detach = 7,
        Info = 8,
        Stats = 9,
    }
);

define_code_enum!(
    /// Shape of the data a client expects back from a read.
    ///
    /// Raw code 5 was the end-of-table sentinel on the original wire and is
    /// rejected on decode.
    DataType {
        Blob = 0,
        U8 = 1,
        U16 = 2,
        U32 = 3,
        U64 = 4,
    }
);

impl Command {
    /// Commands that move data over the bus and need length validation.
    pub const fn is_transfer(&self) -> bool {
        matches!(self, Command::Read | Command::Write | Command::ReadWrite)
    }

    /// Commands that expect bytes back from the device.
    pub const fn is_read(&self) -> bool {
        matches!(self, Command::Read | Command::ReadWrite)
    }
}

impl DataType {
    /// Byte width implied by the type, `None` for blobs.
    pub const fn width(&self) -> Option<u8> {
        match self {
            DataType::Blob => None,
            DataType::U8 => Some(1),
            DataType::U16 => Some(2),
            DataType::U32 => Some(4),
            DataType::U64 => Some(8),
        }
    }
}

/// Opaque 32-bit device handle; its layout depends on the bus family.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Placeholder echoed when no device could be resolved.
    pub const NONE: DeviceId = DeviceId(0);

    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for DeviceId {
    fn from(value: u32) -> Self {
        DeviceId(value)
    }
}

impl core::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}
