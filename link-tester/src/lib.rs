//! `link-tester` — integrity tester for a throttled serial link.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────┐  payloads  ┌─────────────┐  bytes   ┌───────────┐
//!  │ Orchestrator │───────────▶│ Transmitter │─────────▶│ Transport │──▶ DUT
//!  └──────┬───────┘            └──────┬──────┘          └─────▲─────┘     │
//!         │                           │ references            │ bytes     │
//!         │                    ┌──────▼──────┐          ┌─────┴─────┐     │
//!         │                    │  Reference  │          │  Receive  │◀────┘
//!         │                    │    Queue    │          │  Drainer  │──▶ flow-control
//!         │                    └──────┬──────┘          └─────┬─────┘    pulses
//!         │                           │                       │ buffer
//!         │                    ┌──────▼───────────────────────▼──┐
//!         └───────────────────▶│            Verifier             │
//!                              └─────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`package`]       — payload and wire-package format, stream splitting
//! - [`transmitter`]   — send packages, keep the reference queue
//! - [`drainer`]       — pulse the flow-control line and accumulate input
//! - [`verifier`]      — ordered, fail-fast comparison
//! - [`orchestrator`]  — flush, then run each load level
//! - [`flow_control`]  — the flow-control output and its pulse timing
//! - [`transport`]     — byte I/O over a serial port
//! - [`poll`]          — sleeping and bounded polling
//! - [`simulator`]     — in-memory DUT for tests and dry runs
//! - [`report`]        — operator console output
//! - [`config`]        — run settings and their defaults
//! - [`error`]         — crate-level error type

pub mod config;
pub mod drainer;
pub mod error;
pub mod flow_control;
pub mod orchestrator;
pub mod package;
pub mod poll;
pub mod report;
pub mod simulator;
pub mod transmitter;
pub mod transport;
pub mod verifier;

pub use error::TesterError;
