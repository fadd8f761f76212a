use core::fmt::Write;

use cbus_icd::Statistics;
use heapless::String;

use crate::error::Error;

/// Longest description any driver produces.
pub const DESCRIPTION_LEN: usize = 48;

/// Bytes moved by a transfer that completed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Traffic {
    pub sent: usize,
    pub received: usize,
}

impl Traffic {
    pub(crate) const NONE: Traffic = Traffic { sent: 0, received: 0 };

    pub(crate) const fn new(sent: usize, received: usize) -> Self {
        Self { sent, received }
    }
}

fn clamp(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Fold the outcome of one transfer into the device counters.
///
/// Requests rejected before touching the bus are not counted.
pub(crate) fn account(stats: &mut Statistics, outcome: &Result<Traffic, Error>) {
    match outcome {
        Ok(traffic) => {
            stats.bytes_sent = stats.bytes_sent.saturating_add(clamp(traffic.sent));
            stats.bytes_received =
                stats.bytes_received.saturating_add(clamp(traffic.received));
        }
        Err(Error::Timeout) => stats.timeouts = stats.timeouts.saturating_add(1),
        Err(Error::BadCrc) => stats.crc_errors = stats.crc_errors.saturating_add(1),
        Err(Error::BadArguments | Error::NotUsed) => {}
        Err(_) => stats.other_errors = stats.other_errors.saturating_add(1),
    }
}

/// One-line human readable rendering of the counters.
pub fn summary(stats: &Statistics) -> String<80> {
    let mut line = String::new();
    // Worst case is 68 bytes, always fits.
    let _ = write!(
        line,
        "tx {} rx {} timeout {} crc {} other {}",
        stats.bytes_sent, stats.bytes_received, stats.timeouts, stats.crc_errors, stats.other_errors
    );
    line
}

/// Render a description into `out`, truncated and NUL-terminated.
///
/// Returns the text length without the terminator.
pub(crate) fn describe(out: &mut [u8], args: core::fmt::Arguments<'_>) -> Result<usize, Error> {
    let mut text: String<DESCRIPTION_LEN> = String::new();
    text.write_fmt(args).map_err(|_| Error::NoMemory)?;

    let Some(room) = out.len().checked_sub(1) else {
        return Err(Error::BadArguments);
    };
    let len = text.len().min(room);
    out[..len].copy_from_slice(&text.as_bytes()[..len]);
    out[len] = 0;
    Ok(len)
}
