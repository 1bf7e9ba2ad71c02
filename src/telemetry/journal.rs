//! Append-only event journal (`EVENTS.CSV`).
//!
//! One row per notable event: run transitions, retrieval pauses, and tags
//! supplied by the presentation layer (`wifi_test`, `time_set`, ...).  The
//! journal is opened, appended and closed per event; it never holds a
//! handle between ticks.

use core::fmt::Write as _;

use heapless::String;
use log::{debug, warn};

use super::storage::StorageHealth;
use crate::app::ports::{FileName, FileStore};
use crate::error::StorageFault;
use crate::rtc::IsoTime;

pub const EVENTS_FILE: &str = "EVENTS.CSV";
pub const EVENTS_HEADER: &str = "ms;rtc_iso;event;screen;arg0;arg1;run_file;step";

pub type EventTag = String<16>;
pub type ScreenName = String<14>;

/// One journal row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub ms: u64,
    pub rtc_iso: IsoTime,
    pub event: EventTag,
    pub screen: ScreenName,
    pub arg0: i16,
    pub arg1: i16,
    /// Program source the run was started from (file or built-in name).
    pub run_file: FileName,
    pub step: u16,
}

impl JournalEntry {
    pub fn to_row(&self) -> Result<String<128>, StorageFault> {
        let mut row = String::new();
        writeln!(
            row,
            "{};{};{};{};{};{};{};{}",
            self.ms,
            self.rtc_iso,
            self.event,
            self.screen,
            self.arg0,
            self.arg1,
            self.run_file,
            self.step
        )
        .map_err(|_| StorageFault::CapacityExceeded)?;
        Ok(row)
    }
}

#[derive(Debug, Default)]
pub struct EventJournal {
    written: u32,
}

impl EventJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    /// Append one entry, writing the header first if the file is empty.
    ///
    /// A failed write demotes storage like a flush failure does.
    pub fn record(
        &mut self,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
        entry: &JournalEntry,
        now_ms: u64,
        run_active: bool,
    ) -> Result<(), StorageFault> {
        if !health.ensure_ready(fs, now_ms, false, run_active) {
            debug!("journal: storage not ready, '{}' not recorded", entry.event);
            return Err(StorageFault::NotMounted);
        }
        let row = entry.to_row()?;
        let res = append_row(fs, row.as_bytes());
        fs.close(EVENTS_FILE);
        if let Err(e) = res {
            warn!("journal: write failed: {}", e);
            health.demote(run_active);
            return Err(e);
        }
        self.written += 1;
        Ok(())
    }
}

fn append_row(fs: &mut impl FileStore, row: &[u8]) -> Result<(), StorageFault> {
    let size = match fs.size(EVENTS_FILE) {
        Ok(size) => size,
        Err(StorageFault::NotFound) => 0,
        Err(e) => return Err(e),
    };
    if size == 0 {
        let mut header = String::<64>::new();
        let _ = writeln!(header, "{}", EVENTS_HEADER);
        fs.append(EVENTS_FILE, header.as_bytes())?;
    }
    fs.append(EVENTS_FILE, row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtc::format_iso;
    use crate::testing::MemStore;
    use crate::text::bounded;

    fn entry(event: &str) -> JournalEntry {
        JournalEntry {
            ms: 1500,
            rtc_iso: format_iso(0),
            event: bounded(event).unwrap(),
            screen: bounded("running").unwrap(),
            arg0: 3,
            arg1: 0,
            run_file: bounded("INT1").unwrap(),
            step: 0,
        }
    }

    #[test]
    fn header_written_once() {
        let mut fs = MemStore::default();
        let mut h = StorageHealth::new();
        let mut j = EventJournal::new();
        j.record(&mut fs, &mut h, &entry("run_start"), 0, true).unwrap();
        j.record(&mut fs, &mut h, &entry("run_done"), 0, true).unwrap();
        let text = fs.text(EVENTS_FILE);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], EVENTS_HEADER);
        assert_eq!(lines[1], "1500;1970-01-01T00:00:00Z;run_start;running;3;0;INT1;0");
        assert_eq!(lines.len(), 3);
        assert_eq!(j.written(), 2);
    }

    #[test]
    fn failed_write_demotes_storage() {
        let mut fs = MemStore::default();
        let mut h = StorageHealth::new();
        assert!(h.ensure_ready(&mut fs, 0, true, true));
        fs.fail_appends = true;
        let mut j = EventJournal::new();
        assert_eq!(
            j.record(&mut fs, &mut h, &entry("run_stop"), 0, true),
            Err(StorageFault::WriteFailed)
        );
        assert!(!h.is_ready());
    }
}
