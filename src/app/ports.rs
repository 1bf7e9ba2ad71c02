//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ControllerService (domain)
//! ```
//!
//! Driven adapters (sensors, relays, removable storage, the radio
//! coprocessor link, clocks, event sinks) implement these traits.  The
//! [`ControllerService`](super::service::ControllerService) consumes them
//! via generics, so the domain core never touches hardware directly.
//!
//! All port errors are typed; nothing behind a port may panic the loop.

use heapless::String;

use crate::config::SystemConfig;
use crate::error::{NetworkFault, Result, StorageFault};
use crate::rtc::WallTime;
use crate::sensors::SensorSnapshot;

/// 8.3 file name on the removable medium.
pub type FileName = String<12>;

// ───────────────────────────────────────────────────────────────
// Sensor port (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read-side port: the domain calls this to obtain sensor data.
pub trait SensorPort {
    /// Sample both probes and return the (last-good) snapshot.
    fn read_all(&mut self) -> SensorSnapshot;
}

// ───────────────────────────────────────────────────────────────
// Actuator port (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port: the domain calls this to command the relay bank.
pub trait ActuatorPort {
    /// Drive all four outputs from a 4-bit mask.
    fn apply_mask(&mut self, mask: u8);
}

// ───────────────────────────────────────────────────────────────
// File storage port (driven adapter: domain ↔ removable medium)
// ───────────────────────────────────────────────────────────────

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: FileName,
    pub size: u64,
}

/// Flat-directory file storage on an unreliable removable medium.
///
/// Every call may fail at any time (card pulled, bus error).  Writes are
/// append-only except for [`FileStore::write_file`], which replaces a small
/// file as a whole.
pub trait FileStore {
    /// (Re)initialise the medium.
    fn mount(&mut self) -> core::result::Result<(), StorageFault>;

    /// Open the root directory to prove the medium answers.
    fn probe(&mut self) -> core::result::Result<(), StorageFault>;

    fn exists(&mut self, name: &str) -> bool;

    /// Current size in bytes; `NotFound` if the file does not exist.
    fn size(&mut self, name: &str) -> core::result::Result<u64, StorageFault>;

    /// Append bytes, creating the file if needed.
    fn append(&mut self, name: &str, data: &[u8]) -> core::result::Result<(), StorageFault>;

    /// Push buffered appends to durable storage.
    fn sync(&mut self, name: &str) -> core::result::Result<(), StorageFault>;

    /// Release any handle held for `name`.
    fn close(&mut self, name: &str);

    /// Read up to `buf.len()` bytes at `offset`; `Ok(0)` at end of file.
    fn read_at(
        &mut self,
        name: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> core::result::Result<usize, StorageFault>;

    /// Create or truncate `name` and write `data`.
    fn write_file(&mut self, name: &str, data: &[u8]) -> core::result::Result<(), StorageFault>;

    /// Delete `name`.  Succeeds if it did not exist.
    fn remove(&mut self, name: &str) -> core::result::Result<(), StorageFault>;

    /// Files in the root directory.
    fn list(&mut self) -> core::result::Result<Vec<FileEntry>, StorageFault>;

    /// Read a whole small file.  Files above `limit` bytes are refused with
    /// [`StorageFault::CapacityExceeded`].
    fn read_to_end(
        &mut self,
        name: &str,
        limit: u64,
    ) -> core::result::Result<Vec<u8>, StorageFault> {
        let size = self.size(name)?;
        if size > limit {
            return Err(StorageFault::CapacityExceeded);
        }
        let mut bytes = vec![0u8; size as usize];
        let mut filled = 0;
        while filled < bytes.len() {
            let n = self.read_at(name, filled as u64, &mut bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.close(name);
        bytes.truncate(filled);
        Ok(bytes)
    }
}

// ───────────────────────────────────────────────────────────────
// Modem port (driven adapter: domain ↔ radio coprocessor)
// ───────────────────────────────────────────────────────────────

/// Byte link to the command/response radio coprocessor.
pub trait ModemPort {
    fn write(&mut self, data: &[u8]) -> core::result::Result<(), NetworkFault>;

    /// Non-blocking: copy whatever has arrived into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

// ───────────────────────────────────────────────────────────────
// Clock port
// ───────────────────────────────────────────────────────────────

/// Real-time clock.  Monotonic time is passed into every `tick` instead.
pub trait ClockPort {
    fn wall_time(&self) -> WallTime;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → presentation / logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go (serial log, display,
/// test recorder).
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations must validate before persisting; invalid ranges are
/// rejected, not clamped.
pub trait ConfigPort {
    /// Load configuration, falling back to defaults when nothing is stored.
    fn load(&mut self) -> Result<SystemConfig>;

    /// Validate and persist configuration.
    fn save(&mut self, config: &SystemConfig) -> Result<()>;
}
