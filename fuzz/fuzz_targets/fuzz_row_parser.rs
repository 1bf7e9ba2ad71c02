//! Fuzz target: run-log and journal row parsers
//!
//! Feeds arbitrary text to both row parsers and asserts they never panic
//! and that accepted telemetry rows keep the mask within four bits.
//!
//! cargo fuzz run fuzz_row_parser

#![no_main]

use chamber::sync::rows::{EventRow, LogRow, TelemetryRow};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = core::str::from_utf8(data) else {
        return;
    };
    if let Ok(row) = TelemetryRow::parse(line) {
        assert!(row.mask <= 0x0F, "mask wider than the relay bank");
    }
    let _ = EventRow::parse(line);
});
