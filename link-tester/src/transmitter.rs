//! Outbound side of a load level.
//!
//! [`Transmitter`] encodes payloads, hands them to the transport and records
//! each package in the [`ReferenceQueue`] that the verifier later drains.
//!
//! # Flush contract
//! - A package is written in one call, then recorded as a reference.
//! - The next package may only be written once the transport reports its
//!   output buffer empty, so nothing piles up on this side of the link.
//! - Waiting for the flush is bounded by [`PollConfig`]; exceeding it is an
//!   error, not a retry.

use std::collections::VecDeque;
use std::time::Duration;

use thiserror::Error;

use crate::package::{encode, Payload, WirePackage};
use crate::poll::{wait_until, PollConfig, PollError, Sleeper};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Error)]
pub enum TransmitError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The transport never reported its output buffer empty.
    #[error("package {package} not flushed after {waited:?}")]
    FlushTimeout { package: String, waited: Duration },
}

// ---------------------------------------------------------------------------
// ReferenceQueue
// ---------------------------------------------------------------------------

/// Packages sent in the current load level, oldest first.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceQueue {
    packages: VecDeque<WirePackage>,
}

impl ReferenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, package: WirePackage) {
        self.packages.push_back(package);
    }

    /// Remove and return the oldest package.
    pub fn pop_oldest(&mut self) -> Option<WirePackage> {
        self.packages.pop_front()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn clear(&mut self) {
        self.packages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &WirePackage> {
        self.packages.iter()
    }
}

// ---------------------------------------------------------------------------
// Transmitter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Transmitter {
    flush: PollConfig,
}

impl Transmitter {
    pub fn new(flush: PollConfig) -> Self {
        Self { flush }
    }

    /// Send one package and wait until the transport has shifted it out.
    pub fn transmit<T, S>(
        &self,
        transport: &mut T,
        sleeper: &mut S,
        queue: &mut ReferenceQueue,
        payload: &Payload,
    ) -> Result<(), TransmitError>
    where
        T: Transport + ?Sized,
        S: Sleeper + ?Sized,
    {
        let package = encode(payload);
        transport.write_all(package.as_bytes())?;
        log::trace!("tx {package}");
        queue.push(package.clone());

        match wait_until(sleeper, &self.flush, || Ok(transport.bytes_to_write()? == 0)) {
            Ok(_) => Ok(()),
            Err(PollError::Transport(e)) => Err(e.into()),
            Err(PollError::TimedOut { waited }) => Err(TransmitError::FlushTimeout {
                package: package.into_string(),
                waited,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::VirtualClock;

    /// Transport whose output drains after a fixed number of polls.
    struct SlowUart {
        written: Vec<u8>,
        polls_until_empty: u32,
    }

    impl Transport for SlowUart {
        fn bytes_to_read(&mut self) -> Result<u32, TransportError> {
            Ok(0)
        }

        fn bytes_to_write(&mut self) -> Result<u32, TransportError> {
            if self.polls_until_empty == 0 {
                return Ok(0);
            }
            self.polls_until_empty -= 1;
            Ok(1)
        }

        fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
            Ok(None)
        }

        fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }
    }

    fn payload(n: u64) -> Payload {
        Payload::counter(n, 4).unwrap()
    }

    #[test]
    fn transmit_writes_and_records_in_order() {
        let mut uart = SlowUart {
            written: Vec::new(),
            polls_until_empty: 0,
        };
        let mut clock = VirtualClock::default();
        let mut queue = ReferenceQueue::new();
        let tx = Transmitter::default();

        for n in 0..3 {
            tx.transmit(&mut uart, &mut clock, &mut queue, &payload(n)).unwrap();
        }

        assert_eq!(uart.written, b"<0000><0001><0002>");
        let recorded: Vec<_> = queue.iter().map(WirePackage::as_str).collect();
        assert_eq!(recorded, ["<0000>", "<0001>", "<0002>"]);
    }

    #[test]
    fn transmit_waits_for_output_to_drain() {
        let mut uart = SlowUart {
            written: Vec::new(),
            polls_until_empty: 3,
        };
        let mut clock = VirtualClock::default();
        let mut queue = ReferenceQueue::new();
        let tx = Transmitter::new(PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        });

        tx.transmit(&mut uart, &mut clock, &mut queue, &payload(9)).unwrap();
        assert_eq!(clock.sleeps, 3);
        assert_eq!(clock.elapsed, Duration::from_millis(3));
    }

    #[test]
    fn stuck_output_times_out_but_package_is_recorded() {
        let mut uart = SlowUart {
            written: Vec::new(),
            polls_until_empty: u32::MAX,
        };
        let mut clock = VirtualClock::default();
        let mut queue = ReferenceQueue::new();
        let tx = Transmitter::new(PollConfig {
            interval: Duration::from_millis(1),
            timeout: Duration::from_millis(4),
        });

        let err = tx
            .transmit(&mut uart, &mut clock, &mut queue, &payload(1))
            .unwrap_err();
        assert!(matches!(
            err,
            TransmitError::FlushTimeout { ref package, .. } if package == "<0001>"
        ));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn pop_oldest_is_fifo() {
        let mut queue = ReferenceQueue::new();
        queue.push(encode(&payload(1)));
        queue.push(encode(&payload(2)));
        assert_eq!(queue.pop_oldest().unwrap().as_str(), "<0001>");
        assert_eq!(queue.pop_oldest().unwrap().as_str(), "<0002>");
        assert!(queue.pop_oldest().is_none());
        assert!(queue.is_empty());
    }
}
