//! Entry point for `link-tester`.
//!
//! Parses CLI arguments, opens the port and flow-control line (or builds a
//! simulated DUT) and hands everything to the orchestrator.  `main.rs` owns
//! only process setup: logging, argument parsing and the exit status.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use link_tester::config::{LineKind, LineSettings, RunConfig, TesterConfig};
use link_tester::flow_control::{FlowControlLine, Polarity, PulsePolicy, GpioLine, RtsLine};
use link_tester::orchestrator::{Orchestrator, RunSummary};
use link_tester::poll::{PollConfig, ThreadSleeper, VirtualClock};
use link_tester::report::ConsoleReporter;
use link_tester::simulator::{LoopbackDevice, SimulatorConfig};
use link_tester::transport::{SerialSettings, SerialTransport};

/// Serial link integrity tester for a flow-controlled loopback DUT.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Serial device shared for Tx and Rx.
    #[arg(long, default_value = "/dev/serial0")]
    port: String,

    #[arg(long, default_value_t = 38_400)]
    baud: u32,

    /// Read timeout of the serial port, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    read_timeout_ms: u64,

    /// Output used for flow control.
    #[arg(long, value_enum, default_value_t = LineKind::Gpio)]
    line: LineKind,

    /// BCM pin number of the flow-control GPIO.
    #[arg(long, default_value_t = 17)]
    pin: u8,

    /// Assert by driving the line high (default: active low).
    #[arg(long)]
    active_high: bool,

    /// Digits per payload.
    #[arg(long, default_value_t = link_tester::config::DEFAULT_WIDTH)]
    width: usize,

    /// Comma-separated package counts, run in order.
    #[arg(long, value_delimiter = ',', default_values_t = link_tester::config::DEFAULT_LEVELS)]
    levels: Vec<usize>,

    /// How long each flow-control pulse is held, in microseconds.
    #[arg(long, default_value_t = 1000)]
    pulse_us: u64,

    /// Wait after a pulse before checking for data, in milliseconds.
    #[arg(long, default_value_t = 10)]
    settle_ms: u64,

    /// Poll interval while waiting for a write to complete, in microseconds.
    #[arg(long, default_value_t = 1000)]
    flush_poll_us: u64,

    /// Give up on a write that has not completed after this many milliseconds.
    #[arg(long, default_value_t = 5000)]
    flush_timeout_ms: u64,

    /// Discard drains before the first level.
    #[arg(long, default_value_t = 2)]
    flush_passes: usize,

    /// Run against an in-memory DUT instead of hardware.
    #[arg(long)]
    simulate: bool,

    /// Simulated DUT buffer size in bytes.
    #[arg(long, default_value_t = 10 * 1024)]
    sim_capacity: usize,

    /// Bytes the simulated DUT sends per pulse.
    #[arg(long, default_value_t = 64)]
    sim_burst: usize,

    /// Per-byte corruption probability of the simulated DUT.
    #[arg(long, default_value_t = 0.0)]
    sim_corrupt: f64,

    /// Seed for the simulated DUT's fault model.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl Cli {
    fn into_config(self) -> TesterConfig {
        TesterConfig {
            serial: SerialSettings {
                path: self.port,
                baud_rate: self.baud,
                read_timeout: Duration::from_millis(self.read_timeout_ms),
            },
            line: LineSettings {
                kind: self.line,
                pin: self.pin,
                polarity: if self.active_high {
                    Polarity::ActiveHigh
                } else {
                    Polarity::ActiveLow
                },
            },
            run: RunConfig {
                width: self.width,
                levels: self.levels,
                pulse: PulsePolicy {
                    pulse_width: Duration::from_micros(self.pulse_us),
                    settle_delay: Duration::from_millis(self.settle_ms),
                },
                flush: PollConfig {
                    interval: Duration::from_micros(self.flush_poll_us),
                    timeout: Duration::from_millis(self.flush_timeout_ms),
                },
                flush_passes: self.flush_passes,
            },
            simulator: self.simulate.then(|| SimulatorConfig {
                capacity: self.sim_capacity,
                burst: self.sim_burst,
                corrupt_rate: self.sim_corrupt,
                seed: self.seed,
            }),
        }
    }
}

fn run_simulated(config: &TesterConfig, sim: &SimulatorConfig) -> anyhow::Result<RunSummary> {
    let device = LoopbackDevice::new(sim.clone());
    let mut orchestrator = Orchestrator::new(
        device.transport(),
        device.line(),
        VirtualClock::default(),
        config.run.clone(),
    );
    let summary = orchestrator.run(&mut ConsoleReporter::stdout())?;

    let stats = device.stats();
    log::info!(
        "simulated link time {:?}; DUT pulses {}, dropped {}, corrupted {}",
        orchestrator.sleeper().elapsed,
        stats.pulses,
        stats.dropped,
        stats.corrupted
    );
    Ok(summary)
}

fn run_hardware(config: &TesterConfig) -> anyhow::Result<RunSummary> {
    let transport = SerialTransport::open(&config.serial)
        .with_context(|| format!("opening {}", config.serial.path))?;

    let settings = &config.line;
    let line: Box<dyn FlowControlLine> = match settings.kind {
        LineKind::Gpio => Box::new(
            GpioLine::open(settings.pin, settings.polarity)
                .with_context(|| format!("claiming BCM pin {}", settings.pin))?,
        ),
        LineKind::Rts => {
            let port = transport
                .try_clone_port()
                .context("cloning serial port for RTS control")?;
            Box::new(RtsLine::new(port, settings.polarity).context("claiming RTS line")?)
        }
    };

    log::info!(
        "testing {} at {} baud, flow control on {:?}",
        transport.name().unwrap_or_else(|| config.serial.path.clone()),
        config.serial.baud_rate,
        settings.kind
    );
    let mut orchestrator = Orchestrator::new(transport, line, ThreadSleeper, config.run.clone());
    Ok(orchestrator.run(&mut ConsoleReporter::stdout())?)
}

fn main() -> anyhow::Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let config = Cli::parse().into_config();
    config.validate().context("invalid arguments")?;
    log::debug!("{config:?}");

    let summary = match &config.simulator {
        Some(sim) => run_simulated(&config, sim)?,
        None => run_hardware(&config)?,
    };

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
