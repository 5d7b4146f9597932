//! Ordered comparison of received packages against the reference queue.
//!
//! [`verify`] walks the accumulated receive buffer one package at a time and
//! pairs each with the oldest outstanding reference.  The first mismatch ends
//! the walk: one bad package invalidates the whole cycle, so the remaining
//! buffer and queue entries are left unchecked.

use log::{debug, warn};
use thiserror::Error;

use crate::package::{decode_next, FramingError, WirePackage};
use crate::report::Observer;
use crate::transmitter::ReferenceQueue;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("framing defect in receive buffer: {0}")]
    Framing(#[from] FramingError),
    /// More packages arrived than were sent.
    #[error("received package #{index} ({received}) has no reference left")]
    QueueUnderflow { index: usize, received: String },
}

/// Outcome of a verification walk that found no hard defect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every received package matched; the whole buffer was consumed.
    Matched { compared: usize },
    /// Package `index` (zero based) differs from its reference.
    Mismatch {
        index: usize,
        received: WirePackage,
        expected: WirePackage,
    },
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Matched { .. })
    }

    /// Number of comparisons performed.
    pub fn compared(&self) -> usize {
        match self {
            Verdict::Matched { compared } => *compared,
            Verdict::Mismatch { index, .. } => index + 1,
        }
    }
}

/// Compare `buffer` against `queue`, consuming one reference per package.
pub fn verify<O>(
    buffer: &str,
    queue: &mut ReferenceQueue,
    observer: &mut O,
) -> Result<Verdict, VerifyError>
where
    O: Observer + ?Sized,
{
    let mut cursor = 0;
    let mut compared = 0;

    while cursor < buffer.len() {
        let (received, next) = decode_next(buffer, cursor)?;
        let expected = queue
            .pop_oldest()
            .ok_or_else(|| VerifyError::QueueUnderflow {
                index: compared,
                received: received.as_str().to_owned(),
            })?;
        cursor = next;

        let equal = received == expected;
        observer.compared(&received, &expected, equal);
        if !equal {
            warn!("package #{compared}: received {received}, expected {expected}");
            return Ok(Verdict::Mismatch {
                index: compared,
                received,
                expected,
            });
        }
        compared += 1;
    }

    debug!("{compared} packages verified, {} references left", queue.len());
    Ok(Verdict::Matched { compared })
}
