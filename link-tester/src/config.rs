//! Run configuration.
//!
//! Everything that was tuned by hand for one bench setup (port, baud rate,
//! pin, timing, load levels) lives here with the bench's values as defaults.
//! `main.rs` fills a [`TesterConfig`] from the command line.

use std::time::Duration;

use thiserror::Error;

use crate::flow_control::{Polarity, PulsePolicy};
use crate::poll::PollConfig;
use crate::simulator::SimulatorConfig;
use crate::transport::SerialSettings;

/// Load levels of a full run.  The last one overruns a 10 KiB DUT buffer
/// with 10-byte packages, so a healthy device fails it.
pub const DEFAULT_LEVELS: [usize; 4] = [16, 128, 1024, 10 * 1024 + 10];

/// Digits per payload.
pub const DEFAULT_WIDTH: usize = 8;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("payload width must be at least 1")]
    ZeroWidth,
    #[error("no load levels given")]
    NoLevels,
    #[error("load level {index} is zero")]
    ZeroLevel { index: usize },
    #[error("load level {count} needs counters wider than {width} digits")]
    LevelTooWide { count: usize, width: usize },
    #[error("write flush timeout must be non-zero")]
    ZeroFlushTimeout,
    #[error("simulator burst must be at least 1 byte")]
    ZeroBurst,
    #[error("corruption rate {0} is outside [0, 1]")]
    CorruptRate(f64),
}

/// Which output drives flow control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LineKind {
    /// A Raspberry Pi GPIO, by BCM number.
    #[default]
    Gpio,
    /// The serial port's RTS line.
    Rts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSettings {
    pub kind: LineKind,
    /// BCM pin number, used by [`LineKind::Gpio`].
    pub pin: u8,
    pub polarity: Polarity,
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            kind: LineKind::Gpio,
            pin: 17,
            polarity: Polarity::ActiveLow,
        }
    }
}

/// What the orchestrator needs to run the levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub width: usize,
    pub levels: Vec<usize>,
    pub pulse: PulsePolicy,
    /// Polling for transmit completion.
    pub flush: PollConfig,
    /// Discard drains before the first level.
    pub flush_passes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            levels: DEFAULT_LEVELS.to_vec(),
            pulse: PulsePolicy::default(),
            flush: PollConfig::default(),
            flush_passes: 2,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 {
            return Err(ConfigError::ZeroWidth);
        }
        if self.levels.is_empty() {
            return Err(ConfigError::NoLevels);
        }
        if let Some(index) = self.levels.iter().position(|&n| n == 0) {
            return Err(ConfigError::ZeroLevel { index });
        }
        // The last counter sent is `count - 1`.
        if let Some(&count) = self
            .levels
            .iter()
            .find(|&&n| digits(n as u64 - 1) > self.width)
        {
            return Err(ConfigError::LevelTooWide {
                count,
                width: self.width,
            });
        }
        if self.flush.timeout == Duration::ZERO {
            return Err(ConfigError::ZeroFlushTimeout);
        }
        Ok(())
    }
}

fn digits(mut n: u64) -> usize {
    let mut d = 1;
    while n >= 10 {
        n /= 10;
        d += 1;
    }
    d
}

/// Complete configuration of one process run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TesterConfig {
    pub serial: SerialSettings,
    pub line: LineSettings,
    pub run: RunConfig,
    /// Run against [`crate::simulator::LoopbackDevice`] instead of hardware.
    pub simulator: Option<SimulatorConfig>,
}

impl TesterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.run.validate()?;
        if let Some(sim) = &self.simulator {
            if sim.burst == 0 {
                return Err(ConfigError::ZeroBurst);
            }
            if !(0.0..=1.0).contains(&sim.corrupt_rate) {
                return Err(ConfigError::CorruptRate(sim.corrupt_rate));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(TesterConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_level_is_rejected() {
        let run = RunConfig {
            levels: vec![4, 0],
            ..RunConfig::default()
        };
        assert_eq!(run.validate(), Err(ConfigError::ZeroLevel { index: 1 }));
    }

    #[test]
    fn level_must_fit_width() {
        let run = RunConfig {
            width: 2,
            levels: vec![100, 101],
            ..RunConfig::default()
        };
        // 100 packages count 00..99; 101 needs "100".
        assert_eq!(
            run.validate(),
            Err(ConfigError::LevelTooWide {
                count: 101,
                width: 2
            })
        );
    }

    #[test]
    fn empty_levels_are_rejected() {
        let run = RunConfig {
            levels: Vec::new(),
            ..RunConfig::default()
        };
        assert_eq!(run.validate(), Err(ConfigError::NoLevels));
    }

    #[test]
    fn simulator_settings_are_checked() {
        let config = TesterConfig {
            simulator: Some(SimulatorConfig {
                burst: 0,
                ..SimulatorConfig::default()
            }),
            ..TesterConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroBurst));
    }

    #[test]
    fn digit_count() {
        assert_eq!(digits(0), 1);
        assert_eq!(digits(9), 1);
        assert_eq!(digits(10), 2);
        assert_eq!(digits(10249), 5);
    }
}
