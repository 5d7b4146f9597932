//! Load-level driver.
//!
//! An [`Orchestrator`] owns every piece of state for one run: the transport,
//! the flow-control line, the pacing source and the reference queue.  Its
//! responsibilities are:
//! - Flushing stale bytes off the line before the first level.
//! - Running each load level as transmit → drain → verify.
//! - Turning verification results into pass/fail and stopping at the first
//!   failed level.
//!
//! I/O faults are returned as [`TesterError`]; detected link defects are
//! returned as a [`LevelFailure`] inside the [`RunSummary`].

use std::fmt;

use log::{info, warn};

use crate::config::RunConfig;
use crate::drainer::{DrainReport, ReceiveDrainer};
use crate::error::TesterError;
use crate::flow_control::FlowControlLine;
use crate::package::{FramingError, Payload, WirePackage};
use crate::poll::Sleeper;
use crate::report::Observer;
use crate::transmitter::{ReferenceQueue, Transmitter};
use crate::transport::Transport;
use crate::verifier::{verify, Verdict, VerifyError};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a load level failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelFailure {
    /// Package `index` arrived with different content.
    Mismatch {
        index: usize,
        received: WirePackage,
        expected: WirePackage,
    },
    /// Everything received matched, but some packages never arrived.
    Missing { expected: usize, received: usize },
    /// The receive buffer ended inside a package.
    Framing(FramingError),
    /// More packages arrived than were sent.
    QueueUnderflow { index: usize, received: String },
}

impl fmt::Display for LevelFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelFailure::Mismatch {
                index,
                received,
                expected,
            } => write!(
                f,
                "Rx not equal Tx at package {index}: received {received}, expected {expected}"
            ),
            LevelFailure::Missing { expected, received } => {
                write!(f, "only {received} of {expected} packages received")
            }
            LevelFailure::Framing(e) => write!(f, "{e}"),
            LevelFailure::QueueUnderflow { index, received } => write!(
                f,
                "package {index} ({received}) received but never sent"
            ),
        }
    }
}

impl From<VerifyError> for LevelFailure {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Framing(f) => LevelFailure::Framing(f),
            VerifyError::QueueUnderflow { index, received } => {
                LevelFailure::QueueUnderflow { index, received }
            }
        }
    }
}

/// A level that passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelReport {
    pub count: usize,
    pub bytes: usize,
    pub pulses: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevelOutcome {
    Passed(LevelReport),
    Failed(LevelFailure),
}

/// The level that stopped a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedLevel {
    pub count: usize,
    pub failure: LevelFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Stale bytes removed before the first level.
    pub flushed_bytes: usize,
    pub passed: Vec<LevelReport>,
    pub failed: Option<FailedLevel>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_none()
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator<T, L, S> {
    transport: T,
    line: L,
    sleeper: S,
    config: RunConfig,
    transmitter: Transmitter,
    drainer: ReceiveDrainer,
    queue: ReferenceQueue,
}

impl<T, L, S> Orchestrator<T, L, S>
where
    T: Transport,
    L: FlowControlLine,
    S: Sleeper,
{
    pub fn new(transport: T, line: L, sleeper: S, config: RunConfig) -> Self {
        Self {
            transmitter: Transmitter::new(config.flush),
            drainer: ReceiveDrainer::new(config.pulse),
            transport,
            line,
            sleeper,
            config,
            queue: ReferenceQueue::new(),
        }
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    /// References still outstanding from the last level.
    pub fn queue(&self) -> &ReferenceQueue {
        &self.queue
    }

    pub fn into_parts(self) -> (T, L, S) {
        (self.transport, self.line, self.sleeper)
    }

    /// Flush, then run every configured level until one fails.
    pub fn run<O>(&mut self, observer: &mut O) -> Result<RunSummary, TesterError>
    where
        O: Observer + ?Sized,
    {
        let mut summary = RunSummary {
            flushed_bytes: self.flush_stale(observer)?,
            ..RunSummary::default()
        };

        let levels = self.config.levels.clone();
        for count in levels {
            match self.run_level(count, observer)? {
                LevelOutcome::Passed(report) => {
                    info!("level {count}: passed ({} bytes, {} pulses)", report.bytes, report.pulses);
                    observer.level_passed(&report);
                    summary.passed.push(report);
                }
                LevelOutcome::Failed(failure) => {
                    warn!("level {count}: {failure}");
                    observer.level_failed(count, &failure);
                    summary.failed = Some(FailedLevel { count, failure });
                    break;
                }
            }
        }

        observer.finished(&summary);
        Ok(summary)
    }

    /// Discard whatever an earlier run left on the line.
    ///
    /// Returns the number of bytes thrown away.
    pub fn flush_stale<O>(&mut self, observer: &mut O) -> Result<usize, TesterError>
    where
        O: Observer + ?Sized,
    {
        let mut flushed = 0;
        for pass in 0..self.config.flush_passes {
            observer.flushing(pass);
            let report = self.drain(observer)?;
            if report.bytes > 0 {
                warn!("flush pass {pass}: discarded {} stale bytes", report.bytes);
            }
            flushed += report.bytes;
        }
        Ok(flushed)
    }

    /// One transmit → drain → verify cycle of `count` packages.
    pub fn run_level<O>(&mut self, count: usize, observer: &mut O) -> Result<LevelOutcome, TesterError>
    where
        O: Observer + ?Sized,
    {
        info!("level {count}: transmitting");
        observer.level_started(count);
        self.queue.clear();

        for n in 0..count {
            let payload = Payload::counter(n as u64, self.config.width)?;
            observer.package_sent(n, &payload);
            self.transmitter
                .transmit(&mut self.transport, &mut self.sleeper, &mut self.queue, &payload)?;
        }

        observer.receive_started(count);
        let report = self.drain(observer)?;

        let verdict = match verify(&report.buffer, &mut self.queue, observer) {
            Ok(verdict) => verdict,
            Err(e) => return Ok(LevelOutcome::Failed(e.into())),
        };

        let outcome = match verdict {
            Verdict::Mismatch {
                index,
                received,
                expected,
            } => LevelOutcome::Failed(LevelFailure::Mismatch {
                index,
                received,
                expected,
            }),
            Verdict::Matched { compared } if !self.queue.is_empty() => {
                LevelOutcome::Failed(LevelFailure::Missing {
                    expected: count,
                    received: compared,
                })
            }
            Verdict::Matched { .. } => LevelOutcome::Passed(LevelReport {
                count,
                bytes: report.bytes,
                pulses: report.pulses,
            }),
        };
        Ok(outcome)
    }

    fn drain<O>(&mut self, observer: &mut O) -> Result<DrainReport, TesterError>
    where
        O: Observer + ?Sized,
    {
        let report = self.drainer.drain(
            &mut self.transport,
            &mut self.line,
            &mut self.sleeper,
            observer,
        )?;
        observer.drained(&report);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::VirtualClock;
    use crate::report::Silent;
    use crate::simulator::{LoopbackDevice, LoopbackLine, LoopbackTransport, SimulatorConfig};

    fn orchestrator(
        dut: &LoopbackDevice,
        width: usize,
        levels: &[usize],
    ) -> Orchestrator<LoopbackTransport, LoopbackLine, VirtualClock> {
        let config = RunConfig {
            width,
            levels: levels.to_vec(),
            ..RunConfig::default()
        };
        Orchestrator::new(dut.transport(), dut.line(), VirtualClock::default(), config)
    }

    fn device(capacity: usize, burst: usize) -> LoopbackDevice {
        LoopbackDevice::new(SimulatorConfig {
            capacity,
            burst,
            ..SimulatorConfig::default()
        })
    }

    #[test]
    fn single_level_passes_on_lossless_link() {
        let dut = device(1024, 7);
        let mut orch = orchestrator(&dut, 3, &[4]);

        let outcome = orch.run_level(4, &mut Silent).unwrap();

        match outcome {
            LevelOutcome::Passed(report) => {
                assert_eq!(report.count, 4);
                assert_eq!(report.bytes, 20);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(orch.queue().is_empty());
    }

    #[test]
    fn counter_restarts_each_level() {
        #[derive(Default)]
        struct Sent(Vec<String>);
        impl Observer for Sent {
            fn package_sent(&mut self, _index: usize, payload: &Payload) {
                self.0.push(payload.to_string());
            }
        }

        let dut = device(1024, 64);
        let mut orch = orchestrator(&dut, 2, &[2, 3]);
        let mut sent = Sent::default();
        let summary = orch.run(&mut sent).unwrap();

        assert!(summary.is_success());
        assert_eq!(sent.0, ["00", "01", "00", "01", "02"]);
    }

    #[test]
    fn overrun_fails_with_missing_packages() {
        // Room for four 5-byte packages.
        let dut = device(20, 8);
        let mut orch = orchestrator(&dut, 3, &[6]);

        let outcome = orch.run_level(6, &mut Silent).unwrap();
        assert_eq!(
            outcome,
            LevelOutcome::Failed(LevelFailure::Missing {
                expected: 6,
                received: 4
            })
        );
    }

    #[test]
    fn partial_package_at_capacity_is_a_framing_failure() {
        // 22 bytes: four packages plus two bytes of a fifth.
        let dut = device(22, 8);
        let mut orch = orchestrator(&dut, 3, &[6]);

        let outcome = orch.run_level(6, &mut Silent).unwrap();
        assert_eq!(
            outcome,
            LevelOutcome::Failed(LevelFailure::Framing(FramingError::Unterminated {
                offset: 20
            }))
        );
    }

    #[test]
    fn flush_reports_stale_bytes() {
        let dut = device(1024, 8);
        dut.preload_stale(b"<0000><00");
        let mut orch = orchestrator(&dut, 3, &[2]);

        let summary = orch.run(&mut Silent).unwrap();

        assert_eq!(summary.flushed_bytes, 9);
        assert!(summary.is_success());
    }

    #[test]
    fn failure_display_is_readable() {
        let failure = LevelFailure::QueueUnderflow {
            index: 3,
            received: "<003>".to_owned(),
        };
        assert_eq!(failure.to_string(), "package 3 (<003>) received but never sent");
    }
}
