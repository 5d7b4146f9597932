//! Operator-facing progress output.
//!
//! Protocol code reports what it does through [`Observer`]; it never prints.
//! [`ConsoleReporter`] renders the classic single-line progress display, with
//! per-package lines overwritten in place using `\r`.  Diagnostic detail goes
//! through the `log` facade instead.

use std::io::{self, Write};

use crate::drainer::DrainReport;
use crate::orchestrator::{LevelFailure, LevelReport, RunSummary};
use crate::package::{Payload, WirePackage};

/// Receives progress events.  Every method defaults to doing nothing.
pub trait Observer {
    /// A stale-data flush pass is starting.
    fn flushing(&mut self, _pass: usize) {}

    /// Transmission for a load level is starting.
    fn level_started(&mut self, _count: usize) {}

    fn package_sent(&mut self, _index: usize, _payload: &Payload) {}

    /// Transmission is done; the receive phase is starting.
    fn receive_started(&mut self, _expected: usize) {}

    /// An end delimiter arrived.  `tail` is the package text received so far.
    fn package_received(&mut self, _index: usize, _tail: &str) {}

    /// A drain call finished.
    fn drained(&mut self, _report: &DrainReport) {}

    fn compared(&mut self, _received: &WirePackage, _expected: &WirePackage, _equal: bool) {}

    fn level_passed(&mut self, _report: &LevelReport) {}

    fn level_failed(&mut self, _count: usize, _failure: &LevelFailure) {}

    fn finished(&mut self, _summary: &RunSummary) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Observer for Silent {}

/// Writes human-readable progress to a terminal.
#[derive(Debug)]
pub struct ConsoleReporter<W: Write> {
    out: W,
    /// Suppress the receive phase banner during flush passes.
    flushing: bool,
}

impl ConsoleReporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            flushing: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    // Console output is best effort; a closed stdout must not abort a run.
    fn emit(&mut self, args: std::fmt::Arguments<'_>) {
        let _ = self.out.write_fmt(args);
        let _ = self.out.flush();
    }
}

impl<W: Write> Observer for ConsoleReporter<W> {
    fn flushing(&mut self, pass: usize) {
        self.flushing = true;
        if pass == 0 {
            self.emit(format_args!("Flushing DUT\n"));
        }
    }

    fn level_started(&mut self, count: usize) {
        self.flushing = false;
        self.emit(format_args!("\nTx started, {count} packages.\n"));
    }

    fn package_sent(&mut self, _index: usize, payload: &Payload) {
        self.emit(format_args!("\rTx # {payload}\r"));
    }

    fn receive_started(&mut self, expected: usize) {
        self.emit(format_args!("\nRx started, expecting {expected} packages.\n"));
    }

    fn package_received(&mut self, index: usize, tail: &str) {
        self.emit(format_args!("Rx # {index}: {tail:<12}\r"));
    }

    fn drained(&mut self, report: &DrainReport) {
        if !self.flushing {
            self.emit(format_args!(
                "\nReceived buffer ({} bytes), comparing to reference\n",
                report.bytes
            ));
        }
    }

    fn compared(&mut self, received: &WirePackage, expected: &WirePackage, equal: bool) {
        self.emit(format_args!(
            "{:<12} equals {:<12} ? :{:<10}\r",
            received.as_str(),
            expected.as_str(),
            equal
        ));
    }

    fn level_passed(&mut self, report: &LevelReport) {
        self.emit(format_args!(
            "\nTest with {} packages terminated OK.\n",
            report.count
        ));
    }

    fn level_failed(&mut self, _count: usize, failure: &LevelFailure) {
        self.emit(format_args!("\n*** Rx test error: {failure} ***\n\n"));
    }

    fn finished(&mut self, summary: &RunSummary) {
        if summary.is_success() {
            self.emit(format_args!("\nTest terminated.\n"));
        } else {
            self.emit(format_args!("\nTest aborted.\n"));
        }
    }
}
