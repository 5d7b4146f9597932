//! Manually driven flow-control line.
//!
//! The DUT only transmits while the line is asserted.  Without a working
//! hardware handshake the tester requests data with a short pulse:
//!
//! ```text
//!  choke ────┐     ┌──────────────────────  (deasserted)
//!            │     │
//!            └─────┘                         (asserted)
//!            |<-w->|<------ settle ------>|
//! ```
//!
//! `w` is [`PulsePolicy::pulse_width`]; the settle delay must exceed the time
//! the DUT needs to put its ready bytes on the line.
//!
//! Two line drivers are provided:
//! - [`GpioLine`]: a Raspberry Pi GPIO addressed by its BCM number.
//! - [`RtsLine`]: the RTS modem line of a serial port, toggled by hand.

use std::time::Duration;

use rppal::gpio::{Gpio, Level, OutputPin};
use serialport::SerialPort;
use thiserror::Error;

use crate::poll::Sleeper;

#[derive(Debug, Error)]
pub enum LineError {
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
    #[error("modem line error: {0}")]
    Serial(#[from] serialport::Error),
}

/// Logical level of the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineLevel {
    /// Allow the DUT to send.
    Assert,
    /// Choke state: the DUT must hold its data.
    #[default]
    Deassert,
}

/// Maps logical levels to electrical ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    /// Asserting drives the pin low.
    #[default]
    ActiveLow,
    /// Asserting drives the pin high.
    ActiveHigh,
}

impl Polarity {
    /// Whether `level` corresponds to a high pin under this polarity.
    pub fn is_high(self, level: LineLevel) -> bool {
        match self {
            Polarity::ActiveLow => level == LineLevel::Deassert,
            Polarity::ActiveHigh => level == LineLevel::Assert,
        }
    }
}

/// A single digital output.
pub trait FlowControlLine {
    fn drive(&mut self, level: LineLevel) -> Result<(), LineError>;
}

impl<L: FlowControlLine + ?Sized> FlowControlLine for Box<L> {
    fn drive(&mut self, level: LineLevel) -> Result<(), LineError> {
        (**self).drive(level)
    }
}

// ---------------------------------------------------------------------------
// Pulse
// ---------------------------------------------------------------------------

/// Timing of one data request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePolicy {
    /// How long the line stays asserted.
    pub pulse_width: Duration,
    /// Wait after returning to choke before checking for data.
    pub settle_delay: Duration,
}

impl Default for PulsePolicy {
    fn default() -> Self {
        Self {
            pulse_width: Duration::from_millis(1),
            settle_delay: Duration::from_millis(10),
        }
    }
}

/// Assert, hold, return to choke, then settle.
pub fn pulse<L, S>(line: &mut L, policy: &PulsePolicy, sleeper: &mut S) -> Result<(), LineError>
where
    L: FlowControlLine + ?Sized,
    S: Sleeper + ?Sized,
{
    line.drive(LineLevel::Assert)?;
    sleeper.sleep(policy.pulse_width);
    line.drive(LineLevel::Deassert)?;
    sleeper.sleep(policy.settle_delay);
    Ok(())
}

// ---------------------------------------------------------------------------
// GpioLine
// ---------------------------------------------------------------------------

/// Electrical level of the pin for `level` under `polarity`.
fn pin_level(polarity: Polarity, level: LineLevel) -> Level {
    if polarity.is_high(level) {
        Level::High
    } else {
        Level::Low
    }
}

/// A GPIO pin driven as an output through `/dev/gpiomem`.
///
/// The pin is released and returned to its previous mode on drop.
#[derive(Debug)]
pub struct GpioLine {
    pin: OutputPin,
    polarity: Polarity,
}

impl GpioLine {
    /// Claim BCM pin `bcm` as an output and start it in the choke state.
    pub fn open(bcm: u8, polarity: Polarity) -> Result<Self, LineError> {
        let pin = Gpio::new()?.get(bcm)?;
        // Configure the direction with the choke level already applied.
        let pin = match pin_level(polarity, LineLevel::Deassert) {
            Level::High => pin.into_output_high(),
            Level::Low => pin.into_output_low(),
        };
        log::debug!("BCM {bcm} claimed as output ({polarity:?})");
        Ok(Self { pin, polarity })
    }
}

impl FlowControlLine for GpioLine {
    fn drive(&mut self, level: LineLevel) -> Result<(), LineError> {
        self.pin.write(pin_level(self.polarity, level));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RtsLine
// ---------------------------------------------------------------------------

/// The RTS output of a serial port, driven as a plain output.
///
/// A UART asserts RTS by pulling the pin low, so [`Polarity::ActiveLow`] maps
/// `Assert` to RTS on.
pub struct RtsLine {
    port: Box<dyn SerialPort>,
    polarity: Polarity,
}

impl RtsLine {
    /// Take over the RTS line of `port` and put it in the choke state.
    pub fn new(port: Box<dyn SerialPort>, polarity: Polarity) -> Result<Self, LineError> {
        let mut line = Self { port, polarity };
        line.drive(LineLevel::Deassert)?;
        Ok(line)
    }
}

impl FlowControlLine for RtsLine {
    fn drive(&mut self, level: LineLevel) -> Result<(), LineError> {
        // RTS on = pin low.
        let rts_on = !self.polarity.is_high(level);
        self.port.write_request_to_send(rts_on)?;
        Ok(())
    }
}
