use crate::error::Error;
use crate::pins::{PinMask, PinReservation};

/// Pins reserved for a bus that is still being brought up.
///
/// Dropping the lease returns the pins to the pool. Call
/// [`commit`](PinLease::commit) once the bus is registered to keep them.
pub(crate) struct PinLease<'a> {
    pins: &'a dyn PinReservation,
    mask: PinMask,
    armed: bool,
}

impl<'a> PinLease<'a> {
    pub(crate) fn acquire(
        pins: &'a dyn PinReservation,
        mask: PinMask,
    ) -> Result<Self, Error> {
        if !pins.reserve_mask(mask) {
            debug!("pins {=u64:#x} already reserved", mask.0);
            return Err(Error::PinInUse);
        }
        Ok(Self { pins, mask, armed: true })
    }

    pub(crate) fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for PinLease<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.pins.free_mask(self.mask);
        }
    }
}
