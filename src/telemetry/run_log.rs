//! Flush worker for the per-run CSV log.
//!
//! Every [`FLUSH_INTERVAL_MS`] the worker writes at most [`FLUSH_BURST`]
//! queued records to the open `RUNxx.CSV`, syncing the file every
//! [`SYNC_EVERY_BURSTS`] bursts.  The file is opened lazily when the first
//! record needs it, so a run that started without storage begins logging
//! (into a fresh file) once the medium comes back.
//!
//! A failed write puts the record back at the head of the queue, drops the
//! handle and demotes storage; the run itself carries on.

use core::fmt::Write as _;

use log::{debug, info, warn};

use super::queue::LogQueue;
use super::record::RUN_LOG_HEADER;
use super::storage::StorageHealth;
use crate::app::ports::{FileName, FileStore};
use crate::error::StorageFault;
use crate::scheduler::Cadence;

pub const FLUSH_INTERVAL_MS: u64 = 400;
pub const FLUSH_BURST: usize = 3;
pub const SYNC_EVERY_BURSTS: u8 = 5;
/// Highest run log number (`RUN98.CSV`).
pub const MAX_RUN_LOGS: u8 = 98;

#[derive(Debug)]
pub struct RunLog {
    file: Option<FileName>,
    cadence: Cadence,
    bursts: u8,
    written: u32,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLog {
    pub fn new() -> Self {
        Self {
            file: None,
            cadence: Cadence::new(FLUSH_INTERVAL_MS),
            bursts: 0,
            written: 0,
        }
    }

    /// Name of the open log file, if any.
    pub fn file(&self) -> Option<&FileName> {
        self.file.as_ref()
    }

    /// Records written since the last reset.
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Forget per-run counters (run start).  Any open file must already
    /// have been closed.
    pub fn reset(&mut self) {
        self.file = None;
        self.cadence.trigger();
        self.bursts = 0;
        self.written = 0;
    }

    /// Create the next free `RUNxx.CSV` and write its header.
    pub fn open(
        &mut self,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
        now_ms: u64,
        run_active: bool,
    ) -> Result<FileName, StorageFault> {
        if !health.ensure_ready(fs, now_ms, false, run_active) {
            return Err(StorageFault::NotMounted);
        }
        let name = next_free_name(fs)?;
        let mut header = heapless::String::<48>::new();
        let _ = writeln!(header, "{}", RUN_LOG_HEADER);
        if let Err(e) = fs.append(&name, header.as_bytes()) {
            warn!("storage: cannot create {}: {}", name, e);
            health.demote(run_active);
            return Err(e);
        }
        info!("storage: logging to {}", name);
        self.file = Some(name.clone());
        Ok(name)
    }

    /// One flush-worker step.
    pub fn flush(
        &mut self,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
        queue: &mut LogQueue,
        now_ms: u64,
        run_active: bool,
    ) {
        if queue.is_empty() || !self.cadence.poll(now_ms) {
            return;
        }
        if self.file.is_none() && self.open(fs, health, now_ms, run_active).is_err() {
            return;
        }
        if self.write_burst(fs, health, queue, run_active).is_err() {
            return;
        }

        self.bursts += 1;
        if self.bursts >= SYNC_EVERY_BURSTS {
            self.bursts = 0;
            if let Some(name) = self.file.clone() {
                if let Err(e) = fs.sync(&name) {
                    warn!("storage: sync of {} failed: {}", name, e);
                    self.close(fs);
                    health.demote(run_active);
                }
            }
        }
    }

    /// Run ended: drain what is still queued, then sync and close.
    ///
    /// Records that cannot be written are discarded (and counted).
    pub fn finish(
        &mut self,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
        queue: &mut LogQueue,
        now_ms: u64,
    ) {
        while !queue.is_empty() {
            if self.file.is_none() && self.open(fs, health, now_ms, false).is_err() {
                break;
            }
            if self.write_burst(fs, health, queue, false).is_err() {
                break;
            }
        }
        if !queue.is_empty() {
            debug!("storage: discarding {} unwritten records", queue.len());
            queue.discard();
        }
        if let Some(name) = self.file.clone() {
            let _ = fs.sync(&name);
        }
        self.close(fs);
    }

    pub fn close(&mut self, fs: &mut impl FileStore) {
        if let Some(name) = self.file.take() {
            fs.close(&name);
        }
    }

    fn write_burst(
        &mut self,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
        queue: &mut LogQueue,
        run_active: bool,
    ) -> Result<(), StorageFault> {
        let Some(name) = self.file.clone() else {
            return Err(StorageFault::NotMounted);
        };
        for _ in 0..FLUSH_BURST {
            let Some(rec) = queue.pop() else { break };
            let row = match rec.to_row() {
                Ok(row) => row,
                Err(e) => {
                    warn!("storage: unformattable record dropped: {}", e);
                    continue;
                }
            };
            if let Err(e) = fs.append(&name, row.as_bytes()) {
                warn!("storage: write to {} failed: {}", name, e);
                queue.requeue(rec);
                self.close(fs);
                health.demote(run_active);
                return Err(e);
            }
            self.written += 1;
        }
        Ok(())
    }
}

/// First `RUNxx.CSV` (01..=98) that does not exist yet.
pub fn next_free_name(fs: &mut impl FileStore) -> Result<FileName, StorageFault> {
    for n in 1..=MAX_RUN_LOGS {
        let mut name = FileName::new();
        write!(name, "RUN{:02}.CSV", n).map_err(|_| StorageFault::CapacityExceeded)?;
        if !fs.exists(&name) {
            return Ok(name);
        }
    }
    Err(StorageFault::NamespaceExhausted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::StepLabel;
    use crate::sensors::Reading;
    use crate::telemetry::record::LogRecord;
    use crate::testing::MemStore;

    fn rec(ms: u64) -> LogRecord {
        LogRecord {
            ms,
            first: Reading { temp: 200, humidity: 500 },
            second: Reading { temp: 200, humidity: 500 },
            average: Reading { temp: 200, humidity: 500 },
            mask: 1,
            step: StepLabel::new(),
        }
    }

    fn ready(fs: &mut MemStore) -> StorageHealth {
        let mut h = StorageHealth::new();
        assert!(h.ensure_ready(fs, 0, true, true));
        h.take_notice();
        h
    }

    #[test]
    fn picks_first_free_name() {
        let mut fs = MemStore::default()
            .with_file("RUN01.CSV", "x")
            .with_file("RUN02.CSV", "x");
        assert_eq!(next_free_name(&mut fs).unwrap().as_str(), "RUN03.CSV");
    }

    #[test]
    fn namespace_exhaustion_reported() {
        let mut fs = MemStore::default();
        for n in 1..=MAX_RUN_LOGS {
            fs.files.insert(format!("RUN{:02}.CSV", n), Vec::new());
        }
        assert_eq!(next_free_name(&mut fs), Err(StorageFault::NamespaceExhausted));
    }

    #[test]
    fn flush_writes_bounded_bursts_on_cadence() {
        let mut fs = MemStore::default();
        let mut h = ready(&mut fs);
        let mut q = LogQueue::new();
        let mut log = RunLog::new();
        for i in 0..5 {
            q.push(rec(i));
        }
        log.flush(&mut fs, &mut h, &mut q, 0, true);
        assert_eq!(log.written(), 3);
        assert_eq!(q.len(), 2);
        // too early for another burst
        log.flush(&mut fs, &mut h, &mut q, 100, true);
        assert_eq!(q.len(), 2);
        log.flush(&mut fs, &mut h, &mut q, 400, true);
        assert!(q.is_empty());

        let text = fs.text("RUN01.CSV");
        assert!(text.starts_with(RUN_LOG_HEADER));
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn sync_every_fifth_burst() {
        let mut fs = MemStore::default();
        let mut h = ready(&mut fs);
        let mut q = LogQueue::new();
        let mut log = RunLog::new();
        for burst in 0..5u64 {
            q.push(rec(burst));
            log.flush(&mut fs, &mut h, &mut q, burst * FLUSH_INTERVAL_MS, true);
        }
        assert_eq!(fs.syncs, 1);
    }

    #[test]
    fn write_failure_requeues_and_demotes() {
        let mut fs = MemStore::default();
        let mut h = ready(&mut fs);
        let mut q = LogQueue::new();
        let mut log = RunLog::new();
        q.push(rec(1));
        log.flush(&mut fs, &mut h, &mut q, 0, true);
        assert!(log.file().is_some());

        fs.fail_appends = true;
        q.push(rec(2));
        q.push(rec(3));
        log.flush(&mut fs, &mut h, &mut q, 400, true);
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().map(|r| r.ms), Some(2));
        assert!(log.file().is_none());
        assert_eq!(h.state(), super::super::storage::StorageState::Degraded);
    }

    #[test]
    fn finish_drains_then_closes() {
        let mut fs = MemStore::default();
        let mut h = ready(&mut fs);
        let mut q = LogQueue::new();
        let mut log = RunLog::new();
        for i in 0..7 {
            q.push(rec(i));
        }
        log.finish(&mut fs, &mut h, &mut q, 0);
        assert!(q.is_empty());
        assert_eq!(q.dropped(), 0);
        assert!(log.file().is_none());
        assert_eq!(fs.text("RUN01.CSV").lines().count(), 8);
    }
}
