//! Byte transport to the DUT.
//!
//! [`Transport`] is the byte-level seam the protocol code talks to.
//! [`SerialTransport`] is a thin wrapper around a `serialport` handle; all
//! framing and pacing lives elsewhere, this module owns only byte I/O.
//!
//! A read or pending-count query that hits the port timeout is reported as
//! "nothing available" rather than as an error.  Writes are different: a
//! write that times out means the port stopped accepting bytes mid-level, so
//! it surfaces as [`TransportError::Io`] and aborts the run.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    /// Port-level failure (open, modem lines, buffer queries).
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
    /// Read or write failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A bidirectional byte stream with pending-byte queries.
pub trait Transport {
    /// Bytes received and waiting to be read.
    fn bytes_to_read(&mut self) -> Result<u32, TransportError>;

    /// Bytes written but not yet shifted out.
    fn bytes_to_write(&mut self) -> Result<u32, TransportError>;

    /// Read one byte, or `None` if nothing arrived before the read timeout.
    fn read_byte(&mut self) -> Result<Option<u8>, TransportError>;

    /// Queue all of `bytes` for transmission.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn bytes_to_read(&mut self) -> Result<u32, TransportError> {
        (**self).bytes_to_read()
    }

    fn bytes_to_write(&mut self) -> Result<u32, TransportError> {
        (**self).bytes_to_write()
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        (**self).read_byte()
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(bytes)
    }
}

// ---------------------------------------------------------------------------
// SerialTransport
// ---------------------------------------------------------------------------

/// Port settings.  Framing is fixed at 8N1 with no hardware flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub path: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            path: "/dev/serial0".to_owned(),
            baud_rate: 38_400,
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// The same port is used for both directions.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the port described by `settings`.
    pub fn open(settings: &SerialSettings) -> Result<Self, TransportError> {
        let port = serialport::new(&settings.path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()?;
        log::debug!(
            "opened {} at {} baud, read timeout {:?}",
            settings.path,
            settings.baud_rate,
            settings.read_timeout
        );
        Ok(Self { port })
    }

    /// A second handle to the same device, used to drive its modem lines.
    pub fn try_clone_port(&self) -> Result<Box<dyn SerialPort>, TransportError> {
        Ok(self.port.try_clone()?)
    }

    pub fn name(&self) -> Option<String> {
        self.port.name()
    }
}

fn serial_timed_out(e: &serialport::Error) -> bool {
    e.kind == serialport::ErrorKind::Io(io::ErrorKind::TimedOut)
}

impl Transport for SerialTransport {
    fn bytes_to_read(&mut self) -> Result<u32, TransportError> {
        match self.port.bytes_to_read() {
            Ok(n) => Ok(n),
            Err(e) if serial_timed_out(&e) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn bytes_to_write(&mut self) -> Result<u32, TransportError> {
        Ok(self.port.bytes_to_write()?)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(bytes)?;
        Ok(())
    }
}
