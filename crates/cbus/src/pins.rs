use core::ops::BitOr;

use portable_atomic::{AtomicU64, Ordering};

/// Number of GPIOs the pin pool can track.
pub const GPIO_COUNT: u8 = 64;

/// Set of GPIO numbers, one bit per pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinMask(pub u64);

impl PinMask {
    pub const EMPTY: PinMask = PinMask(0);

    /// Mask for a single pin, `None` when the pin is out of range.
    pub const fn pin(pin: u8) -> Option<Self> {
        if pin < GPIO_COUNT {
            Some(PinMask(1u64 << pin))
        } else {
            None
        }
    }

    /// Mask covering every pin in `pins`.
    ///
    /// Returns `None` if any pin is out of range or listed twice.
    pub fn distinct(pins: &[u8]) -> Option<Self> {
        pins.iter().try_fold(PinMask::EMPTY, |mask, &pin| {
            let bit = PinMask::pin(pin)?;
            if mask.0 & bit.0 != 0 {
                None
            } else {
                Some(mask | bit)
            }
        })
    }

    pub const fn contains(&self, pin: u8) -> bool {
        pin < GPIO_COUNT && self.0 & (1u64 << pin) != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn count(&self) -> u32 {
        self.0.count_ones()
    }
}

impl BitOr for PinMask {
    type Output = PinMask;

    fn bitor(self, rhs: PinMask) -> PinMask {
        PinMask(self.0 | rhs.0)
    }
}

/// Process-wide GPIO ownership.
///
/// Reservation of a mask is all-or-nothing: if any pin in it is taken,
/// nothing changes.
pub trait PinReservation {
    /// Claim every pin in `mask`; `false` if any was already taken.
    fn reserve_mask(&self, mask: PinMask) -> bool;

    /// Release every pin in `mask`. Releasing a free pin is a no-op.
    fn free_mask(&self, mask: PinMask);

    fn reserve(&self, pin: u8) -> bool {
        PinMask::pin(pin).is_some_and(|mask| self.reserve_mask(mask))
    }

    fn free(&self, pin: u8) {
        if let Some(mask) = PinMask::pin(pin) {
            self.free_mask(mask);
        }
    }
}

/// Lock-free [`PinReservation`] backed by a single atomic bitmap.
#[derive(Debug, Default)]
pub struct PinPool {
    reserved: AtomicU64,
}

impl PinPool {
    pub const fn new() -> Self {
        Self { reserved: AtomicU64::new(0) }
    }

    /// Pool with `mask` permanently taken (flash, console, strapping pins).
    pub const fn with_reserved(mask: PinMask) -> Self {
        Self { reserved: AtomicU64::new(mask.0) }
    }

    pub fn reserved(&self) -> PinMask {
        PinMask(self.reserved.load(Ordering::Acquire))
    }

    pub fn is_reserved(&self, pin: u8) -> bool {
        self.reserved().contains(pin)
    }
}

impl PinReservation for PinPool {
    fn reserve_mask(&self, mask: PinMask) -> bool {
        self.reserved
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current & mask.0 == 0).then_some(current | mask.0)
            })
            .is_ok()
    }

    fn free_mask(&self, mask: PinMask) {
        self.reserved.fetch_and(!mask.0, Ordering::AcqRel);
    }
}
