//! Pacing and bounded polling.
//!
//! The tester never blocks on an event; it sleeps for fixed, empirically
//! tuned intervals and re-checks device state.  This module provides:
//! - [`Sleeper`]: the injectable source of delay, so tests and the
//!   simulator run without wall-clock waits.
//! - [`PollConfig`] / [`wait_until`]: poll a predicate at a fixed interval
//!   and give up once the accumulated wait reaches a timeout.
//!
//! The timeout is measured as the sum of requested sleeps, not wall time, so
//! a [`VirtualClock`] gives deterministic behaviour.

use std::time::Duration;

use thiserror::Error;

use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// Sleeper
// ---------------------------------------------------------------------------

/// Something that can wait for a duration.
pub trait Sleeper {
    fn sleep(&mut self, duration: Duration);
}

/// Blocks the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Returns immediately and records how much time was requested.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VirtualClock {
    /// Sum of every requested sleep.
    pub elapsed: Duration,
    /// Number of sleep calls.
    pub sleeps: u64,
}

impl Sleeper for VirtualClock {
    fn sleep(&mut self, duration: Duration) {
        self.elapsed += duration;
        self.sleeps += 1;
    }
}

// ---------------------------------------------------------------------------
// Bounded polling
// ---------------------------------------------------------------------------

/// Poll interval and give-up bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("condition still unmet after waiting {waited:?}")]
    TimedOut { waited: Duration },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Check `done` until it returns `true`, sleeping `config.interval` between
/// checks.
///
/// Returns the number of sleeps taken.  The predicate is always checked at
/// least once, and once more after the final sleep.
pub fn wait_until<S, F>(sleeper: &mut S, config: &PollConfig, mut done: F) -> Result<u32, PollError>
where
    S: Sleeper + ?Sized,
    F: FnMut() -> Result<bool, TransportError>,
{
    let mut waited = Duration::ZERO;
    let mut polls = 0;
    while !done()? {
        if waited >= config.timeout {
            return Err(PollError::TimedOut { waited });
        }
        sleeper.sleep(config.interval);
        waited += config.interval;
        polls += 1;
    }
    Ok(polls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval_ms: u64, timeout_ms: u64) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    #[test]
    fn ready_condition_does_not_sleep() {
        let mut clock = VirtualClock::default();
        let polls = wait_until(&mut clock, &config(1, 10), || Ok(true)).unwrap();
        assert_eq!(polls, 0);
        assert_eq!(clock.sleeps, 0);
    }

    #[test]
    fn delayed_condition_sleeps_until_ready() {
        let mut clock = VirtualClock::default();
        let mut remaining = 3;
        let polls = wait_until(&mut clock, &config(2, 100), || {
            remaining -= 1;
            Ok(remaining == 0)
        })
        .unwrap();
        assert_eq!(polls, 2);
        assert_eq!(clock.elapsed, Duration::from_millis(4));
    }

    #[test]
    fn never_ready_condition_times_out() {
        let mut clock = VirtualClock::default();
        let err = wait_until(&mut clock, &config(1, 5), || Ok(false)).unwrap_err();
        assert!(matches!(err, PollError::TimedOut { waited } if waited == Duration::from_millis(5)));
        assert_eq!(clock.sleeps, 5);
    }

    #[test]
    fn predicate_error_is_propagated() {
        let mut clock = VirtualClock::default();
        let err = wait_until(&mut clock, &config(1, 5), || {
            Err(TransportError::Io(std::io::Error::other("gone")))
        })
        .unwrap_err();
        assert!(matches!(err, PollError::Transport(_)));
    }
}
