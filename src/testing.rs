//! In-memory test doubles shared by the unit tests.

use std::collections::{BTreeMap, VecDeque};

use crate::app::events::AppEvent;
use crate::app::ports::{
    ActuatorPort, ClockPort, ConfigPort, EventSink, FileEntry, FileName, FileStore, ModemPort,
    SensorPort,
};
use crate::config::{CloudConfig, SystemConfig};
use crate::error::{NetworkFault, Result as CrateResult, StorageFault};
use crate::rtc::{RtcState, WallTime};
use crate::sensors::{Reading, SensorSnapshot};
use crate::text::bounded;

/// Cloud settings complete enough for bring-up.
pub fn usable_cloud() -> CloudConfig {
    CloudConfig {
        enabled: true,
        ssid: bounded("lab").unwrap(),
        passphrase: bounded("pw").unwrap(),
        api_host: bounded("api.example.com").unwrap(),
        api_token: bounded("token").unwrap(),
        ..CloudConfig::default()
    }
}

/// Coprocessor double: records every write, replays queued replies.
#[derive(Debug, Default)]
pub struct ScriptModem {
    pub sent: Vec<String>,
    pub inbox: VecDeque<u8>,
    pub fail_writes: bool,
}

impl ScriptModem {
    pub fn reply(&mut self, text: &str) {
        self.inbox.extend(text.bytes());
    }
}

impl ModemPort for ScriptModem {
    fn write(&mut self, data: &[u8]) -> Result<(), NetworkFault> {
        if self.fail_writes {
            return Err(NetworkFault::LinkWrite);
        }
        self.sent.push(String::from_utf8_lossy(data).into_owned());
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.inbox.len());
        for (slot, b) in buf.iter_mut().zip(self.inbox.drain(..n)) {
            *slot = b;
        }
        n
    }
}

/// Flat in-memory medium with switchable failures.
#[derive(Debug, Default)]
pub struct MemStore {
    pub files: BTreeMap<String, Vec<u8>>,
    /// Every call fails as if the card were pulled.
    pub down: bool,
    /// Appends fail while the rest keeps working.
    pub fail_appends: bool,
    pub syncs: u32,
    pub closes: u32,
}

impl MemStore {
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

    fn check(&self) -> Result<(), StorageFault> {
        if self.down { Err(StorageFault::NotMounted) } else { Ok(()) }
    }
}

impl FileStore for MemStore {
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
        if self.fail_appends {
            return Err(StorageFault::WriteFailed);
        }
        self.files.entry(name.to_string()).or_default().extend_from_slice(data);
        Ok(())
    }

    fn sync(&mut self, _name: &str) -> Result<(), StorageFault> {
        self.check()?;
        self.syncs += 1;
        Ok(())
    }

    fn close(&mut self, _name: &str) {
        self.closes += 1;
    }

    fn read_at(&mut self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageFault> {
        self.check()?;
        let data = self.files.get(name).ok_or(StorageFault::NotFound)?;
        let start = (offset as usize).min(data.len());
        let n = (data.len() - start).min(buf.len());
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
                let name: FileName = bounded(name)?;
                Some(FileEntry {
                    name,
                    size: data.len() as u64,
                })
            })
            .collect())
    }
}

/// Relay bank and probe pair in one: records masks, serves a fixed reading.
#[derive(Debug, Default)]
pub struct FakeHw {
    /// Reading both probes return; `None` simulates a dead sensor.
    pub reading: Option<Reading>,
    pub masks: Vec<u8>,
}

impl FakeHw {
    pub fn at(temp: i16) -> Self {
        Self {
            reading: Some(Reading { temp, humidity: 500 }),
            masks: Vec::new(),
        }
    }

    pub fn last_mask(&self) -> Option<u8> {
        self.masks.last().copied()
    }
}

impl SensorPort for FakeHw {
    fn read_all(&mut self) -> SensorSnapshot {
        match self.reading {
            Some(r) => SensorSnapshot {
                first: r,
                second: r,
                average: r,
                valid: true,
                first_ok: true,
                second_ok: true,
            },
            None => SensorSnapshot::default(),
        }
    }
}

impl ActuatorPort for FakeHw {
    fn apply_mask(&mut self, mask: u8) {
        self.masks.push(mask);
    }
}

/// Wall clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub WallTime);

impl Default for FixedClock {
    fn default() -> Self {
        Self(WallTime::unavailable(RtcState::Fail))
    }
}

impl ClockPort for FixedClock {
    fn wall_time(&self) -> WallTime {
        self.0
    }
}

/// Keeps every emitted event.
#[derive(Debug, Default)]
pub struct Recorder(pub Vec<AppEvent>);

impl EventSink for Recorder {
    fn emit(&mut self, event: &AppEvent) {
        self.0.push(event.clone());
    }
}

/// Configuration port backed by a field.
#[derive(Debug, Default)]
pub struct MemConfig {
    pub stored: Option<SystemConfig>,
    pub saves: u32,
}

impl ConfigPort for MemConfig {
    fn load(&mut self) -> CrateResult<SystemConfig> {
        Ok(self.stored.clone().unwrap_or_default())
    }

    fn save(&mut self, config: &SystemConfig) -> CrateResult<()> {
        self.stored = Some(config.clone());
        self.saves += 1;
        Ok(())
    }
}
