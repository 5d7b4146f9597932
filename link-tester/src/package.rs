//! Wire-format definitions for test packages.
//!
//! Every unit exchanged with the DUT is a [`WirePackage`]: a fixed-width
//! decimal [`Payload`] wrapped in a start and an end delimiter.  This module is
//! responsible for:
//! - Building payloads from a counter and validating caller-supplied ones.
//! - Encoding a payload into its wire form.
//! - Splitting an accumulated receive string back into packages, returning
//!   errors for an unterminated tail.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! ```text
//!  +---+-----------------------------+---+
//!  | < |  d d d ... d   (width)      | > |
//!  +---+-----------------------------+---+
//! ```
//!
//! Total package size: `width + 2` bytes, all ASCII.

use std::fmt;

use thiserror::Error;

/// Marks the first byte of a package on the wire.
pub const START_DELIMITER: char = '<';
/// Marks the last byte of a package on the wire.
pub const END_DELIMITER: char = '>';

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building a [`Payload`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PackageError {
    /// A payload width of zero cannot carry a counter.
    #[error("payload width must be at least one digit")]
    ZeroWidth,
    /// The counter needs more digits than the configured width.
    #[error("counter {value} does not fit in {width} digits")]
    CounterOverflow { value: u64, width: usize },
    /// Payload text was empty.
    #[error("payload is empty")]
    Empty,
    /// Payload text contains a package delimiter.
    #[error("payload contains delimiter {found:?} at offset {offset}")]
    DelimiterInPayload { found: char, offset: usize },
    /// Payload text contains something other than an ASCII digit.
    #[error("payload contains non-digit {found:?} at offset {offset}")]
    NonDigit { found: char, offset: usize },
}

/// Errors raised while splitting a receive buffer into packages.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// No end delimiter follows `offset`: the stream ends mid-package.
    #[error("unterminated package starting at offset {offset}")]
    Unterminated { offset: usize },
    /// `offset` is past the end of the buffer or not on a character boundary.
    #[error("scan offset {offset} is outside the {len}-byte buffer")]
    OutOfBounds { offset: usize, len: usize },
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// A fixed-width, zero-padded decimal payload.
///
/// The only way to obtain one is through [`Payload::counter`] or
/// [`Payload::new`], so a `Payload` never contains a delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Payload(String);

impl Payload {
    /// Format `value` zero-padded to exactly `width` digits.
    pub fn counter(value: u64, width: usize) -> Result<Self, PackageError> {
        if width == 0 {
            return Err(PackageError::ZeroWidth);
        }
        let text = format!("{value:0width$}");
        if text.len() > width {
            return Err(PackageError::CounterOverflow { value, width });
        }
        Ok(Self(text))
    }

    /// Validate caller-supplied payload text.
    pub fn new(text: impl Into<String>) -> Result<Self, PackageError> {
        let text = text.into();
        if text.is_empty() {
            return Err(PackageError::Empty);
        }
        if let Some((offset, found)) = text.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            return Err(if found == START_DELIMITER || found == END_DELIMITER {
                PackageError::DelimiterInPayload { found, offset }
            } else {
                PackageError::NonDigit { found, offset }
            });
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of digits (always equal to the width it was built with).
    pub fn width(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// WirePackage
// ---------------------------------------------------------------------------

/// A package exactly as it appears on the wire, delimiters included.
///
/// Packages produced by [`encode`] are well formed.  Packages produced by
/// [`decode_next`] are whatever the line delivered up to an end delimiter and
/// may be malformed; comparing them against the reference is how corruption
/// is detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WirePackage(String);

impl WirePackage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The text between the delimiters, or `None` if the package is not
    /// wrapped in exactly one start and one end delimiter.
    pub fn payload(&self) -> Option<&str> {
        let inner = self
            .0
            .strip_prefix(START_DELIMITER)?
            .strip_suffix(END_DELIMITER)?;
        if inner.contains([START_DELIMITER, END_DELIMITER]) {
            return None;
        }
        Some(inner)
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for WirePackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Wrap `payload` in delimiters.
pub fn encode(payload: &Payload) -> WirePackage {
    let mut wire = String::with_capacity(payload.width() + 2);
    wire.push(START_DELIMITER);
    wire.push_str(payload.as_str());
    wire.push(END_DELIMITER);
    WirePackage(wire)
}

/// Extract the package that starts at `from` in `buffer`.
///
/// Scans forward to the first end delimiter (inclusive) and returns the text
/// `[from, found]` together with `found + 1`, the offset to resume from.  The
/// extracted text is not checked for a start delimiter.
pub fn decode_next(buffer: &str, from: usize) -> Result<(WirePackage, usize), FramingError> {
    let rest = buffer.get(from..).ok_or(FramingError::OutOfBounds {
        offset: from,
        len: buffer.len(),
    })?;
    let end = rest
        .find(END_DELIMITER)
        .ok_or(FramingError::Unterminated { offset: from })?;
    let found = from + end;
    Ok((WirePackage(buffer[from..=found].to_owned()), found + 1))
}

/// Iterate over every package in `buffer`, front to back.
///
/// Stops after yielding the first [`FramingError`].
pub fn packages(buffer: &str) -> Packages<'_> {
    Packages {
        buffer,
        cursor: 0,
        failed: false,
    }
}

/// Iterator returned by [`packages`].
#[derive(Debug)]
pub struct Packages<'a> {
    buffer: &'a str,
    cursor: usize,
    failed: bool,
}

impl Iterator for Packages<'_> {
    type Item = Result<WirePackage, FramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.buffer.len() {
            return None;
        }
        match decode_next(self.buffer, self.cursor) {
            Ok((package, next)) => {
                self.cursor = next;
                Some(Ok(package))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_is_zero_padded() {
        let p = Payload::counter(42, 8).unwrap();
        assert_eq!(p.as_str(), "00000042");
        assert_eq!(p.width(), 8);
    }

    #[test]
    fn counter_at_full_width_is_kept() {
        assert_eq!(Payload::counter(999, 3).unwrap().as_str(), "999");
    }

    #[test]
    fn counter_wider_than_width_is_rejected() {
        assert_eq!(
            Payload::counter(1000, 3),
            Err(PackageError::CounterOverflow {
                value: 1000,
                width: 3
            })
        );
    }

    #[test]
    fn zero_width_is_rejected() {
        assert_eq!(Payload::counter(0, 0), Err(PackageError::ZeroWidth));
    }

    #[test]
    fn payload_with_delimiter_is_rejected() {
        assert_eq!(
            Payload::new("12>4"),
            Err(PackageError::DelimiterInPayload {
                found: '>',
                offset: 2
            })
        );
    }

    #[test]
    fn payload_with_letter_is_rejected() {
        assert!(matches!(
            Payload::new("12a4"),
            Err(PackageError::NonDigit { found: 'a', .. })
        ));
        assert_eq!(Payload::new(""), Err(PackageError::Empty));
    }

    #[test]
    fn encode_wraps_payload() {
        let wire = encode(&Payload::counter(7, 3).unwrap());
        assert_eq!(wire.as_str(), "<007>");
        assert_eq!(wire.len(), 5);
        assert_eq!(wire.payload(), Some("007"));
    }

    #[test]
    fn decode_next_returns_package_and_resume_offset() {
        let (pkg, next) = decode_next("<000><001>", 0).unwrap();
        assert_eq!(pkg.as_str(), "<000>");
        assert_eq!(next, 5);

        let (pkg, next) = decode_next("<000><001>", next).unwrap();
        assert_eq!(pkg.as_str(), "<001>");
        assert_eq!(next, 10);
    }

    #[test]
    fn decode_next_without_end_delimiter_is_an_error() {
        assert_eq!(
            decode_next("<000><00", 5),
            Err(FramingError::Unterminated { offset: 5 })
        );
    }

    #[test]
    fn decode_next_past_end_is_an_error() {
        assert_eq!(
            decode_next("<0>", 9),
            Err(FramingError::OutOfBounds { offset: 9, len: 3 })
        );
    }

    #[test]
    fn decoded_garbage_is_returned_verbatim() {
        // A lost start delimiter is a content problem, not a framing one.
        let (pkg, _) = decode_next("0001>", 0).unwrap();
        assert_eq!(pkg.as_str(), "0001>");
        assert_eq!(pkg.payload(), None);
    }

    #[test]
    fn round_trip_across_widths() {
        for width in 1..=12 {
            let payload = Payload::counter(5, width).unwrap();
            let wire = encode(&payload);
            let (decoded, next) = decode_next(wire.as_str(), 0).unwrap();
            assert_eq!(decoded, wire);
            assert_eq!(next, width + 2);
            assert_eq!(decoded.payload(), Some(payload.as_str()));
        }
    }

    #[test]
    fn packages_stops_after_framing_error() {
        let parsed: Vec<_> = packages("<1><2><3").collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].as_ref().unwrap().as_str(), "<1>");
        assert_eq!(parsed[1].as_ref().unwrap().as_str(), "<2>");
        assert_eq!(parsed[2], Err(FramingError::Unterminated { offset: 6 }));
    }

    #[test]
    fn packages_of_empty_buffer_is_empty() {
        assert_eq!(packages("").count(), 0);
    }
}
