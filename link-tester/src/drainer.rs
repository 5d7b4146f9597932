//! Receive side: request, drain and accumulate.
//!
//! The DUT holds its output while the flow-control line is in the choke
//! state.  [`ReceiveDrainer::drain`] substitutes a request/response rhythm for
//! the missing hardware handshake:
//!
//! ```text
//!  Idle ──▶ Pulse ──▶ Check ──(pending = 0)──▶ Done
//!             ▲         │
//!             │    (pending > 0)
//!             │         ▼
//!             └────── Drain
//! ```
//!
//! A full pulse cycle that yields no data is the only available signal that
//! the DUT's queue is empty, so that is where the call ends.
//!
//! The accumulated buffer is owned by one call and returned to the caller in
//! a [`DrainReport`]; nothing carries over between calls.

use log::{debug, trace};
use thiserror::Error;

use crate::flow_control::{pulse, FlowControlLine, LineError, LineLevel, PulsePolicy};
use crate::package::{END_DELIMITER, START_DELIMITER};
use crate::poll::Sleeper;
use crate::report::Observer;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum DrainError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Line(#[from] LineError),
}

/// States of one drain call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    /// Request a burst from the DUT.
    Pulse,
    /// Decide whether the burst produced anything.
    Check,
    /// Read until the transport reports nothing pending.
    Drain,
    Done,
}

/// Everything one drain call received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Received bytes in arrival order, one `char` per byte.
    pub buffer: String,
    /// Number of end delimiters seen.
    pub packages: usize,
    /// Number of flow-control pulses issued.
    pub pulses: usize,
    pub bytes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveDrainer {
    policy: PulsePolicy,
}

impl ReceiveDrainer {
    pub fn new(policy: PulsePolicy) -> Self {
        Self { policy }
    }

    /// Pulse and drain until a pulse produces no data.
    ///
    /// The line is left in the choke state on return, also on error.
    pub fn drain<T, L, S, O>(
        &self,
        transport: &mut T,
        line: &mut L,
        sleeper: &mut S,
        observer: &mut O,
    ) -> Result<DrainReport, DrainError>
    where
        T: Transport + ?Sized,
        L: FlowControlLine + ?Sized,
        S: Sleeper + ?Sized,
        O: Observer + ?Sized,
    {
        let result = self.run(transport, line, sleeper, observer);
        if result.is_err() {
            // Best effort; the first error wins.
            let _ = line.drive(LineLevel::Deassert);
        }
        result
    }

    fn run<T, L, S, O>(
        &self,
        transport: &mut T,
        line: &mut L,
        sleeper: &mut S,
        observer: &mut O,
    ) -> Result<DrainReport, DrainError>
    where
        T: Transport + ?Sized,
        L: FlowControlLine + ?Sized,
        S: Sleeper + ?Sized,
        O: Observer + ?Sized,
    {
        let mut report = DrainReport::default();
        let mut state = DrainState::Idle;

        loop {
            state = match state {
                DrainState::Idle => DrainState::Pulse,
                DrainState::Pulse => {
                    pulse(line, &self.policy, sleeper)?;
                    report.pulses += 1;
                    DrainState::Check
                }
                DrainState::Check => {
                    if transport.bytes_to_read()? == 0 {
                        DrainState::Done
                    } else {
                        DrainState::Drain
                    }
                }
                DrainState::Drain => {
                    drain_pending(transport, &mut report, observer)?;
                    DrainState::Pulse
                }
                DrainState::Done => {
                    debug!(
                        "drain done: {} bytes, {} packages, {} pulses",
                        report.bytes, report.packages, report.pulses
                    );
                    return Ok(report);
                }
            };
            trace!("drain -> {state:?}");
        }
    }
}

/// Read while the transport reports pending bytes.
fn drain_pending<T, O>(
    transport: &mut T,
    report: &mut DrainReport,
    observer: &mut O,
) -> Result<(), TransportError>
where
    T: Transport + ?Sized,
    O: Observer + ?Sized,
{
    while transport.bytes_to_read()? > 0 {
        let Some(byte) = transport.read_byte()? else {
            // Pending count said yes, the read timed out: go request again.
            break;
        };
        let c = char::from(byte);
        report.buffer.push(c);
        report.bytes += 1;
        if c == END_DELIMITER {
            observer.package_received(report.packages, last_package(&report.buffer));
            report.packages += 1;
        }
    }
    Ok(())
}

/// The text from the last start delimiter to the end of `buffer`.
fn last_package(buffer: &str) -> &str {
    match buffer.rfind(START_DELIMITER) {
        Some(start) => &buffer[start..],
        None => buffer,
    }
}
