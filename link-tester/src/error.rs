//! Crate-level error type.
//!
//! Each module defines its own error enum next to the code that raises it;
//! [`TesterError`] collects the ones that abort a run.  Link defects the
//! tester exists to find (mismatches, missing packages) are not errors, see
//! [`crate::orchestrator::LevelFailure`].

use thiserror::Error;

use crate::config::ConfigError;
use crate::drainer::DrainError;
use crate::flow_control::LineError;
use crate::package::PackageError;
use crate::transmitter::TransmitError;
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum TesterError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("payload error: {0}")]
    Package(#[from] PackageError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("flow-control line error: {0}")]
    Line(#[from] LineError),
    #[error("transmit failed: {0}")]
    Transmit(#[from] TransmitError),
    #[error("receive failed: {0}")]
    Drain(#[from] DrainError),
}
