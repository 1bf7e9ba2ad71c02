//! Mock adapters for integration tests.
//!
//! Records every actuator call and keeps files in memory so tests can
//! assert on the full history without a card or relay board.

use std::collections::BTreeMap;

use chamber::app::events::AppEvent;
use chamber::app::ports::{
    ActuatorPort, ClockPort, EventSink, FileEntry, FileStore, SensorPort,
};
use chamber::app::service::{ControllerService, Io};
use chamber::adapters::modem::SimModem;
use chamber::config::{CloudConfig, SystemConfig};
use chamber::error::StorageFault;
use chamber::rtc::{RtcState, WallTime};
use chamber::sensors::{Reading, SensorSnapshot};
use chamber::text::bounded;

// ── MockHardware ──────────────────────────────────────────────

/// Fake probes plus a recording relay bank.
pub struct MockHardware {
    /// Temperature both probes report, in tenths.
    pub temp: i16,
    pub masks: Vec<u8>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new(temp: i16) -> Self {
        Self {
            temp,
            masks: Vec::new(),
        }
    }

    pub fn last_mask(&self) -> u8 {
        self.masks.last().copied().unwrap_or(0)
    }
}

impl SensorPort for MockHardware {
    fn read_all(&mut self) -> SensorSnapshot {
        let r = Reading {
            temp: self.temp,
            humidity: 500,
        };
        SensorSnapshot {
            first: r,
            second: r,
            average: r,
            valid: true,
            first_ok: true,
            second_ok: true,
        }
    }
}

impl ActuatorPort for MockHardware {
    fn apply_mask(&mut self, mask: u8) {
        self.masks.push(mask);
    }
}

// ── MockStore ─────────────────────────────────────────────────

/// In-memory card.  `down` makes every call fail as if it was pulled.
#[derive(Default)]
pub struct MockStore {
    pub files: BTreeMap<String, Vec<u8>>,
    pub down: bool,
}

#[allow(dead_code)]
impl MockStore {
    pub fn with_file(mut self, name: &str, text: &str) -> Self {
        self.files.insert(name.to_string(), text.as_bytes().to_vec());
        self
    }

    pub fn text(&self, name: &str) -> String {
        self.files
            .get(name)
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default()
    }

    /// Acknowledged byte offset stored in an `.ACK` file.
    pub fn acked(&self, ack: &str) -> Option<u64> {
        self.text(ack).split(',').next()?.trim().parse().ok()
    }

    pub fn len(&self, name: &str) -> u64 {
        self.files.get(name).map_or(0, |b| b.len() as u64)
    }

    fn check(&self) -> Result<(), StorageFault> {
        if self.down {
            Err(StorageFault::NotMounted)
        } else {
            Ok(())
        }
    }
}

impl FileStore for MockStore {
    fn mount(&mut self) -> Result<(), StorageFault> {
        self.check()
    }

    fn probe(&mut self) -> Result<(), StorageFault> {
        self.check()
    }

    fn exists(&mut self, name: &str) -> bool {
        !self.down && self.files.contains_key(name)
    }

    fn size(&mut self, name: &str) -> Result<u64, StorageFault> {
        self.check()?;
        self.files
            .get(name)
            .map(|b| b.len() as u64)
            .ok_or(StorageFault::NotFound)
    }

    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageFault> {
        self.check()?;
        self.files
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    fn sync(&mut self, _name: &str) -> Result<(), StorageFault> {
        self.check()
    }

    fn close(&mut self, _name: &str) {}

    fn read_at(&mut self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageFault> {
        self.check()?;
        let data = self.files.get(name).ok_or(StorageFault::NotFound)?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), StorageFault> {
        self.check()?;
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageFault> {
        self.check()?;
        self.files.remove(name);
        Ok(())
    }

    fn list(&mut self) -> Result<Vec<FileEntry>, StorageFault> {
        self.check()?;
        Ok(self
            .files
            .iter()
            .filter_map(|(name, data)| {
                Some(FileEntry {
                    name: bounded(name)?,
                    size: data.len() as u64,
                })
            })
            .collect())
    }
}

// ── Clock and sink ────────────────────────────────────────────

/// Wall clock pinned to 2023-11-14T22:13:20Z.
pub struct MockClock;

impl ClockPort for MockClock {
    fn wall_time(&self) -> WallTime {
        WallTime::valid(1_700_000_000)
    }
}

/// Wall clock that was never set.
#[allow(dead_code)]
pub struct UnsetClock;

impl ClockPort for UnsetClock {
    fn wall_time(&self) -> WallTime {
        WallTime::unavailable(RtcState::Invalid)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Bench ─────────────────────────────────────────────────────

/// Service plus every adapter it needs, advanced in 50 ms ticks.
pub struct Bench {
    pub app: ControllerService,
    pub hw: MockHardware,
    pub fs: MockStore,
    pub modem: SimModem,
    pub sink: RecordingSink,
    pub now: u64,
}

#[allow(dead_code)]
impl Bench {
    pub const STEP_MS: u64 = 50;

    pub fn new(config: SystemConfig, fs: MockStore) -> Self {
        let mut bench = Self {
            app: ControllerService::new(config),
            hw: MockHardware::new(230),
            fs,
            modem: SimModem::new(),
            sink: RecordingSink::default(),
            now: 0,
        };
        bench.app.start(&mut bench.sink);
        bench.tick();
        bench
    }

    pub fn tick(&mut self) {
        let mut io = Io {
            hw: &mut self.hw,
            fs: &mut self.fs,
            modem: &mut self.modem,
            clock: &MockClock,
        };
        self.app.tick(self.now, &mut io, &mut self.sink);
    }

    pub fn command(&mut self, cmd: chamber::app::commands::AppCommand) {
        let mut io = Io {
            hw: &mut self.hw,
            fs: &mut self.fs,
            modem: &mut self.modem,
            clock: &MockClock,
        };
        self.app.handle_command(self.now, cmd, &mut io, &mut self.sink);
    }

    /// Tick until `now` reaches `until_ms`.
    pub fn run_until(&mut self, until_ms: u64) {
        while self.now < until_ms {
            self.now += Self::STEP_MS;
            self.tick();
        }
    }

    /// Tick until `done` holds or `limit_ms` passes; returns whether it held.
    pub fn run_while_not(&mut self, limit_ms: u64, done: impl Fn(&Self) -> bool) -> bool {
        while self.now < limit_ms {
            if done(self) {
                return true;
            }
            self.now += Self::STEP_MS;
            self.tick();
        }
        done(self)
    }
}

/// Cloud settings the simulated coprocessor accepts.
#[allow(dead_code)]
pub fn lab_cloud() -> CloudConfig {
    CloudConfig {
        enabled: true,
        ssid: bounded("lab").unwrap(),
        passphrase: bounded("secret").unwrap(),
        api_host: bounded("api.example.com").unwrap(),
        api_token: bounded("token").unwrap(),
        ..CloudConfig::default()
    }
}

/// Three steps of 2, 3 and 4 seconds driving relays 0, 1 and 2.
pub const THREE_STEPS: &str = "ID=T3\nSTEP_UNIT=SEC\n\
A,2,0,1000,0\n\
B,3,0,0100,0\n\
C,4,0,0010,0\n";
