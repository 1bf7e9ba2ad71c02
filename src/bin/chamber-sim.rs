//! Host simulator.
//!
//! Runs the full controller service against a directory standing in for
//! the SD card, a simulated coprocessor and a first-order thermal model of
//! the chamber.  Simulated time advances 50 ms per loop without sleeping,
//! so a whole program finishes in seconds.
//!
//! ```text
//! chamber-sim [DATA_DIR] [PROGRAM]      (defaults: ./sim-card INT1)
//! ```
//!
//! Retrieval pauses are acknowledged automatically after two simulated
//! seconds.  Console commands typed on stdin are applied as they arrive.

use std::cell::Cell;
use std::convert::Infallible;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use log::{info, warn};

use chamber::adapters::config_store::ConfigStore;
use chamber::adapters::console::{parse_line, resolve, spawn_stdin_reader, ConsoleRequest};
use chamber::adapters::fs_storage::FsStorage;
use chamber::adapters::hardware::HardwareAdapter;
use chamber::adapters::log_sink::LogEventSink;
use chamber::adapters::modem::SimModem;
use chamber::adapters::time::SystemClock;
use chamber::app::commands::AppCommand;
use chamber::app::ports::ConfigPort;
use chamber::app::service::{ControllerService, Io};
use chamber::drivers::relay::RelayBank;
use chamber::run::RunPhase;
use chamber::sensors::{Probe, Reading, SensorHub};
use chamber::text::bounded;

const STEP_MS: u64 = 50;
const ACK_AFTER_MS: u64 = 2_000;
/// Keep ticking this long after the run ends so the queue and uploads drain.
const DRAIN_MS: u64 = 30_000;

// ── Simulated plant ───────────────────────────────────────────

/// Relay outputs shared between the pins and the thermal model.
type Outputs = Rc<Cell<u8>>;

struct SimPin {
    bit: u8,
    outputs: Outputs,
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        // relay board is driven active-low
        self.outputs.set(self.outputs.get() | (1 << self.bit));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.outputs.set(self.outputs.get() & !(1 << self.bit));
        Ok(())
    }
}

/// Chamber air heats toward 40 °C with the heater on and relaxes to
/// ambient otherwise; one probe call per sample.
struct ThermalProbe {
    outputs: Outputs,
    heater_bit: u8,
    temp: f32,
    offset: f32,
}

impl Probe for ThermalProbe {
    fn read(&mut self) -> Option<Reading> {
        let target = if self.outputs.get() & (1 << self.heater_bit) != 0 {
            40.0
        } else {
            20.0
        };
        self.temp += (target - self.temp) * 0.05;
        Some(Reading {
            temp: ((self.temp + self.offset) * 10.0) as i16,
            humidity: 550,
        })
    }
}

struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| "sim-card".to_string());
    let program = args.next().unwrap_or_else(|| "INT1".to_string());

    std::fs::create_dir_all(&dir).with_context(|| format!("creating {dir}"))?;
    let mut fs = FsStorage::new(&dir);
    let config = ConfigStore::new(&mut fs).load()?;

    let outputs: Outputs = Rc::new(Cell::new(0));
    let probe = |offset| ThermalProbe {
        outputs: outputs.clone(),
        heater_bit: config.thermo.heater_bit,
        temp: 20.0,
        offset,
    };
    let sensors = SensorHub::new(probe(0.0), Some(probe(0.3)), NoDelay);
    let pins = [0, 1, 2, 3].map(|bit| SimPin {
        bit,
        outputs: outputs.clone(),
    });
    let mut hw = HardwareAdapter::new(sensors, RelayBank::new(pins, true));

    let mut modem = SimModem::new();
    let clock = SystemClock::new();
    let mut sink = LogEventSink::new();
    let console = spawn_stdin_reader()?;

    let mut app = ControllerService::new(config);
    app.start(&mut sink);

    let mut now = 0;
    let mut io = Io {
        hw: &mut hw,
        fs: &mut fs,
        modem: &mut modem,
        clock: &clock,
    };
    app.tick(now, &mut io, &mut sink);

    let Some(name) = bounded(&program) else {
        bail!("program name '{program}' too long");
    };
    let start = resolve(ConsoleRequest::Start(name), &mut *io.fs, app.config())?;
    app.handle_command(now, start, &mut io, &mut sink);
    if !app.phase().is_active() {
        bail!("run did not start");
    }

    let mut waiting_since = None;
    let mut ended_at = None;
    loop {
        now += STEP_MS;
        app.tick(now, &mut io, &mut sink);

        while let Ok(line) = console.try_recv() {
            match parse_line(&line).map(|r| resolve(r, &mut *io.fs, app.config())) {
                Ok(Ok(cmd)) => app.handle_command(now, cmd, &mut io, &mut sink),
                Ok(Err(e)) => warn!("console: {}", e),
                Err(e) => warn!("console: {} ({})", e, line.trim()),
            }
        }

        if app.phase() == RunPhase::WaitingRetrieval {
            let since = *waiting_since.get_or_insert(now);
            if now - since >= ACK_AFTER_MS {
                app.handle_command(now, AppCommand::AcknowledgeRetrieval, &mut io, &mut sink);
                waiting_since = None;
            }
        }

        if !app.phase().is_active() {
            let ended = *ended_at.get_or_insert(now);
            if now - ended >= DRAIN_MS {
                break;
            }
        }
    }

    app.force_save_if_dirty(&mut ConfigStore::new(&mut fs));
    info!(
        "sim: {:?} after {} ms, log {:?}, {} records dropped, {} requests sent",
        app.phase(),
        now,
        app.run_log_file(),
        app.dropped_records(),
        modem.requests.len()
    );
    Ok(())
}
