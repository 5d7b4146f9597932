//! In-memory stand-in for the DUT.
//!
//! A real run needs the device, a serial cable and a GPIO pin.  To exercise
//! the drain and verification logic without any of that, [`LoopbackDevice`]
//! models a DUT that echoes everything it receives, but only while it is
//! allowed to send:
//!
//! | Behaviour        | Model                                            |
//! |------------------|--------------------------------------------------|
//! | Buffering        | Written bytes are stored up to `capacity`.       |
//! | Overrun          | Bytes arriving at a full buffer are dropped.     |
//! | Flow control     | Each assert edge releases up to `burst` bytes.   |
//! | Corruption       | Each stored byte is flipped with `corrupt_rate`. |
//!
//! The transport and line handles share one state through `Rc<RefCell<_>>`;
//! the tester is single threaded.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::flow_control::{FlowControlLine, LineError, LineLevel};
use crate::transport::{Transport, TransportError};

/// Fault-model parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Bytes the device can hold before it starts dropping input.
    pub capacity: usize,
    /// Bytes released per flow-control pulse.
    pub burst: usize,
    /// Probability in `[0.0, 1.0]` that a stored byte is corrupted.
    pub corrupt_rate: f64,
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // A 10 KiB buffer and no faults.
        Self {
            capacity: 10 * 1024,
            burst: 64,
            corrupt_rate: 0.0,
            seed: 0,
        }
    }
}

/// Counters exposed for assertions and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceStats {
    pub level: LineLevel,
    pub pulses: usize,
    pub stored: usize,
    pub dropped: usize,
    pub corrupted: usize,
}

#[derive(Debug)]
struct DeviceState {
    config: SimulatorConfig,
    rng: StdRng,
    /// Held by the device, waiting for permission to send.
    stored: VecDeque<u8>,
    /// On the wire towards the tester.
    rx: VecDeque<u8>,
    stats: DeviceStats,
}

impl DeviceState {
    fn accept(&mut self, mut byte: u8) {
        if self.stored.len() >= self.config.capacity {
            self.stats.dropped += 1;
            return;
        }
        if self.config.corrupt_rate > 0.0 && self.rng.random_bool(self.config.corrupt_rate) {
            byte ^= 0x01;
            self.stats.corrupted += 1;
        }
        self.stored.push_back(byte);
    }

    fn release_burst(&mut self) {
        let n = self.config.burst.min(self.stored.len());
        self.rx.extend(self.stored.drain(..n));
        self.stats.pulses += 1;
    }
}

/// A simulated DUT.  Cloning yields another handle to the same device.
#[derive(Debug, Clone)]
pub struct LoopbackDevice {
    state: Rc<RefCell<DeviceState>>,
}

impl LoopbackDevice {
    /// `corrupt_rate` is clamped to `[0.0, 1.0]`.
    pub fn new(mut config: SimulatorConfig) -> Self {
        config.corrupt_rate = config.corrupt_rate.clamp(0.0, 1.0);
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            state: Rc::new(RefCell::new(DeviceState {
                config,
                rng,
                stored: VecDeque::new(),
                rx: VecDeque::new(),
                stats: DeviceStats::default(),
            })),
        }
    }

    /// The tester's view of the serial port.
    pub fn transport(&self) -> LoopbackTransport {
        LoopbackTransport {
            state: Rc::clone(&self.state),
        }
    }

    /// The tester's view of the flow-control pin.
    pub fn line(&self) -> LoopbackLine {
        LoopbackLine {
            state: Rc::clone(&self.state),
        }
    }

    /// Leave bytes on the wire as if from an earlier, aborted run.
    pub fn preload_stale(&self, bytes: &[u8]) {
        self.state.borrow_mut().rx.extend(bytes.iter().copied());
    }

    /// Overwrite a byte still held by the device.  Returns `false` if `index`
    /// is out of range.
    pub fn corrupt_stored(&self, index: usize, byte: u8) -> bool {
        let mut state = self.state.borrow_mut();
        match state.stored.get_mut(index) {
            Some(slot) => {
                *slot = byte;
                state.stats.corrupted += 1;
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> DeviceStats {
        let state = self.state.borrow();
        DeviceStats {
            stored: state.stored.len(),
            ..state.stats
        }
    }
}

/// Transport handle of a [`LoopbackDevice`].
#[derive(Debug)]
pub struct LoopbackTransport {
    state: Rc<RefCell<DeviceState>>,
}

impl Transport for LoopbackTransport {
    fn bytes_to_read(&mut self) -> Result<u32, TransportError> {
        Ok(u32::try_from(self.state.borrow().rx.len()).unwrap_or(u32::MAX))
    }

    /// Writes complete instantly.
    fn bytes_to_write(&mut self) -> Result<u32, TransportError> {
        Ok(0)
    }

    fn read_byte(&mut self) -> Result<Option<u8>, TransportError> {
        Ok(self.state.borrow_mut().rx.pop_front())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        for &byte in bytes {
            state.accept(byte);
        }
        Ok(())
    }
}

/// Flow-control handle of a [`LoopbackDevice`].
#[derive(Debug)]
pub struct LoopbackLine {
    state: Rc<RefCell<DeviceState>>,
}

impl FlowControlLine for LoopbackLine {
    fn drive(&mut self, level: LineLevel) -> Result<(), LineError> {
        let mut state = self.state.borrow_mut();
        if level == LineLevel::Assert && state.stats.level == LineLevel::Deassert {
            state.release_burst();
        }
        state.stats.level = level;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(capacity: usize, burst: usize) -> LoopbackDevice {
        LoopbackDevice::new(SimulatorConfig {
            capacity,
            burst,
            ..SimulatorConfig::default()
        })
    }

    fn read_all(transport: &mut LoopbackTransport) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(b) = transport.read_byte().unwrap() {
            out.push(b);
        }
        out
    }

    #[test]
    fn nothing_is_sent_while_choked() {
        let dut = device(64, 8);
        let mut transport = dut.transport();
        transport.write_all(b"<01>").unwrap();

        assert_eq!(transport.bytes_to_read().unwrap(), 0);
        assert_eq!(dut.stats().stored, 4);
    }

    #[test]
    fn each_assert_edge_releases_one_burst() {
        let dut = device(64, 3);
        let mut transport = dut.transport();
        let mut line = dut.line();
        transport.write_all(b"<01><02>").unwrap();

        line.drive(LineLevel::Assert).unwrap();
        // Holding the line asserted is not a new edge.
        line.drive(LineLevel::Assert).unwrap();
        assert_eq!(read_all(&mut transport), b"<01");

        line.drive(LineLevel::Deassert).unwrap();
        line.drive(LineLevel::Assert).unwrap();
        assert_eq!(read_all(&mut transport), b"><0");
        assert_eq!(dut.stats().pulses, 2);
    }

    #[test]
    fn full_buffer_drops_input() {
        let dut = device(4, 8);
        dut.transport().write_all(b"<01><02>").unwrap();

        let stats = dut.stats();
        assert_eq!(stats.stored, 4);
        assert_eq!(stats.dropped, 4);
    }

    #[test]
    fn corruption_is_reproducible_from_seed() {
        let run = || {
            let dut = LoopbackDevice::new(SimulatorConfig {
                corrupt_rate: 0.5,
                seed: 7,
                ..SimulatorConfig::default()
            });
            let mut transport = dut.transport();
            transport.write_all(&[b'0'; 64]).unwrap();
            dut.line().drive(LineLevel::Assert).unwrap();
            (read_all(&mut transport), dut.stats().corrupted)
        };

        let (first, corrupted) = run();
        assert_eq!(run(), (first.clone(), corrupted));
        assert!(corrupted > 0);
        assert_eq!(first.iter().filter(|&&b| b == b'1').count(), corrupted);
    }

    #[test]
    fn stale_bytes_are_readable_without_a_pulse() {
        let dut = device(64, 8);
        dut.preload_stale(b"<99");
        assert_eq!(read_all(&mut dut.transport()), b"<99");
    }

    #[test]
    fn corrupt_stored_overwrites_in_place() {
        let dut = device(64, 64);
        dut.transport().write_all(b"<000><001>").unwrap();
        assert!(dut.corrupt_stored(8, b'9'));
        assert!(!dut.corrupt_stored(10, b'9'));

        dut.line().drive(LineLevel::Assert).unwrap();
        assert_eq!(read_all(&mut dut.transport()), b"<000><009>");
    }
}
