pub use cbus_icd::BusError as Error;

/// Failure reported by a transceiver while moving bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransceiverError {
    /// The transfer did not complete within the device or hardware limit.
    Timeout,
    /// No presence pulse (1-Wire) or address NACK (I2C).
    NotAcknowledged,
    /// Anything the transceiver could not classify.
    Other,
}

/// Failure while bringing up a physical bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OpenError {
    NoMemory,
    /// Every controller or channel pair of this kind is taken.
    NoMoreBuses,
    Failed,
}

impl From<TransceiverError> for Error {
    fn from(e: TransceiverError) -> Self {
        match e {
            TransceiverError::Timeout => Error::Timeout,
            TransceiverError::NotAcknowledged => Error::DeviceNotAcknowledged,
            TransceiverError::Other => Error::Unknown,
        }
    }
}

impl From<OpenError> for Error {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::NoMemory => Error::NoMemory,
            OpenError::NoMoreBuses => Error::NoMoreBuses,
            OpenError::Failed => Error::Unknown,
        }
    }
}

impl core::fmt::Display for TransceiverError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransceiverError::Timeout => write!(f, "transceiver timeout"),
            TransceiverError::NotAcknowledged => {
                write!(f, "no acknowledge from device")
            }
            TransceiverError::Other => write!(f, "transceiver failure"),
        }
    }
}

impl core::fmt::Display for OpenError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            OpenError::NoMemory => write!(f, "out of memory creating bus"),
            OpenError::NoMoreBuses => write!(f, "no free bus controller"),
            OpenError::Failed => write!(f, "bus creation failed"),
        }
    }
}
