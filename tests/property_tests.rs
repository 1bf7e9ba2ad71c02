//! Property tests for the cross-module guarantees of the controller.
//!
//! Runs on host only; proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use std::collections::BTreeMap;

use chamber::app::ports::{FileEntry, FileStore};
use chamber::config::ThermoConfig;
use chamber::control::thermostat::Thermostat;
use chamber::error::StorageFault;
use chamber::program::{Program, ProgramSource, TempBand};
use chamber::run::{RunController, RunPhase};
use chamber::sync::batch::read_batch;
use chamber::sync::rows::TelemetryRow;
use chamber::sync::{Backoff, UploadCursor};
use chamber::telemetry::DropOldestQueue;
use chamber::text::bounded;
use proptest::prelude::*;

const HEATER: u8 = 0b0100;

fn thermo(min_on: u16, min_off: u16) -> ThermoConfig {
    ThermoConfig {
        min_on_secs: min_on,
        min_off_secs: min_off,
        heater_bit: 2,
        safety_max_on_secs: 0,
        ..ThermoConfig::default()
    }
}

/// One-file store for cursor reads.
#[derive(Default)]
struct MemFiles(BTreeMap<String, Vec<u8>>);

impl FileStore for MemFiles {
    fn mount(&mut self) -> Result<(), StorageFault> {
        Ok(())
    }
    fn probe(&mut self) -> Result<(), StorageFault> {
        Ok(())
    }
    fn exists(&mut self, name: &str) -> bool {
        self.0.contains_key(name)
    }
    fn size(&mut self, name: &str) -> Result<u64, StorageFault> {
        self.0.get(name).map(|b| b.len() as u64).ok_or(StorageFault::NotFound)
    }
    fn append(&mut self, name: &str, data: &[u8]) -> Result<(), StorageFault> {
        self.0.entry(name.to_string()).or_default().extend_from_slice(data);
        Ok(())
    }
    fn sync(&mut self, _name: &str) -> Result<(), StorageFault> {
        Ok(())
    }
    fn close(&mut self, _name: &str) {}
    fn read_at(&mut self, name: &str, offset: u64, buf: &mut [u8]) -> Result<usize, StorageFault> {
        let data = self.0.get(name).ok_or(StorageFault::NotFound)?;
        let start = (offset as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
    fn write_file(&mut self, name: &str, data: &[u8]) -> Result<(), StorageFault> {
        self.0.insert(name.to_string(), data.to_vec());
        Ok(())
    }
    fn remove(&mut self, name: &str) -> Result<(), StorageFault> {
        self.0.remove(name);
        Ok(())
    }
    fn list(&mut self) -> Result<Vec<FileEntry>, StorageFault> {
        Ok(Vec::new())
    }
}

// ── Queue FIFO + drop ─────────────────────────────────────────

proptest! {
    /// The consumer sees the most recent `min(n, 8)` items in order and
    /// the drop counter accounts for the rest.
    #[test]
    fn queue_keeps_newest_in_order(n in 0u32..40) {
        let mut q: DropOldestQueue<u32, 8> = DropOldestQueue::new();
        for i in 0..n {
            q.push(i);
        }
        let mut seen = Vec::new();
        while let Some(v) = q.pop() {
            seen.push(v);
        }
        let expected: Vec<u32> = (n.saturating_sub(8)..n).collect();
        prop_assert_eq!(seen, expected);
        prop_assert_eq!(q.dropped(), n.saturating_sub(8));
    }
}

// ── Cursor monotonicity / idempotence ─────────────────────────

proptest! {
    #[test]
    fn cursor_only_moves_forward(rows in 1usize..20, batch in 1usize..4) {
        let mut fs = MemFiles::default();
        let mut text = String::from("ms;T1;U1;T2;U2;Tavg;Uavg;mask;step\n");
        for i in 0..rows {
            text.push_str(&format!("{};23.5;50.0;23.4;50.1;23.4;50.0;1;A\n", i * 3000));
        }
        fs.append("RUN01.CSV", text.as_bytes()).unwrap();

        let mut cursor = UploadCursor::start(bounded("RUN01.CSV").unwrap());
        let mut total = 0;
        loop {
            let b = read_batch::<TelemetryRow>(&mut fs, &cursor, batch).unwrap();
            prop_assert!(b.next.byte_offset >= cursor.byte_offset);
            if b.is_empty() {
                break;
            }
            total += b.rows.len();
            cursor = b.next;
        }
        prop_assert_eq!(total, rows);

        // unchanged cursor, unchanged file: nothing new
        let again = read_batch::<TelemetryRow>(&mut fs, &cursor, batch).unwrap();
        prop_assert!(again.is_empty());
        prop_assert_eq!(again.next.byte_offset, cursor.byte_offset);
    }
}

// ── Thermostat ────────────────────────────────────────────────

#[test]
fn hysteresis_scenario() {
    let cfg = thermo(10, 10);
    let band = TempBand { low: 200, high: 250 };
    let mut th = Thermostat::new();
    assert_eq!(th.update(&cfg, band, 0, Some(190), 0) & HEATER, HEATER);
    assert_eq!(th.update(&cfg, band, 0, Some(260), 5_000) & HEATER, HEATER);
    assert_eq!(th.update(&cfg, band, 0, Some(260), 10_000) & HEATER, 0);
}

#[test]
fn threshold_scenario() {
    let cfg = thermo(10, 10);
    let band = TempBand { low: 280, high: 0 };
    let mut th = Thermostat::new();
    assert_eq!(th.update(&cfg, band, 0, Some(275), 0) & HEATER, HEATER);
    // off at the threshold regardless of min-on
    assert_eq!(th.update(&cfg, band, 0, Some(285), 1_000) & HEATER, 0);
    // back on only once min-off has elapsed
    assert_eq!(th.update(&cfg, band, 0, Some(275), 10_999) & HEATER, 0);
    assert_eq!(th.update(&cfg, band, 0, Some(275), 11_000) & HEATER, HEATER);
}

proptest! {
    /// Under hysteresis every switch honours the dwell of the state it
    /// leaves (the very first switch is free).
    #[test]
    fn hysteresis_honours_dwell(
        readings in proptest::collection::vec(150i16..300, 1..200),
        min_on in 1u16..20,
        min_off in 1u16..20,
    ) {
        let cfg = thermo(min_on, min_off);
        let band = TempBand { low: 200, high: 250 };
        let mut th = Thermostat::new();
        let mut on = false;
        let mut last_switch: Option<u64> = None;
        for (i, t) in readings.into_iter().enumerate() {
            let now = i as u64 * 500;
            let now_on = th.update(&cfg, band, 0, Some(t), now) & HEATER != 0;
            if now_on != on {
                if let Some(at) = last_switch {
                    let dwell = if on { min_on } else { min_off };
                    prop_assert!(now - at >= u64::from(dwell) * 1000);
                }
                last_switch = Some(now);
                on = now_on;
            }
        }
    }
}

// ── Backoff ───────────────────────────────────────────────────

#[test]
fn backoff_doubles_from_floor() {
    let mut b = Backoff::new();
    let waits: Vec<u64> = (0..5).map(|i| b.record_failure(i * 100)).collect();
    assert_eq!(waits, vec![1000, 2000, 4000, 8000, 16000]);
    b.record_success();
    assert_eq!(b.record_failure(1_000), 1000);
}

proptest! {
    #[test]
    fn backoff_is_capped_and_reset(failures in 1u32..30) {
        let mut b = Backoff::new();
        let mut last = 0;
        for i in 0..failures {
            let wait = b.record_failure(u64::from(i));
            prop_assert!(wait <= 60_000);
            prop_assert!(wait >= last);
            last = wait;
        }
        b.record_success();
        prop_assert_eq!(b.record_failure(0), 1000);
    }
}

// ── Run sequencing ────────────────────────────────────────────

fn program(text: &str) -> Program {
    Program::parse(text, ProgramSource::Storage).unwrap()
}

proptest! {
    /// A three-step program finishes on the first tick after the sum of
    /// its step durations and never advances afterwards.
    #[test]
    fn run_finishes_after_sum_of_steps(d1 in 1u16..20, d2 in 1u16..20, d3 in 1u16..20) {
        let text = format!(
            "STEP_UNIT=SEC\nA,{d1},0,1000,0,28.0,0\nB,{d2},0,0100,0,28.0,0\nC,{d3},0,0010,0,28.0,0\n"
        );
        let mut run = RunController::new();
        run.start(&program(&text), 0).unwrap();
        let end = u64::from(d1 + d2 + d3) * 1000;

        let mut now = 0;
        while now < end {
            now += 100;
            run.tick(now);
            prop_assert_eq!(run.phase(), RunPhase::Running);
        }
        run.tick(end + 100);
        prop_assert_eq!(run.phase(), RunPhase::Finished);
        run.tick(end + 60_000);
        prop_assert_eq!(run.phase(), RunPhase::Finished);
        prop_assert_eq!(run.context().step_index, 3);
    }

    /// The step clock is frozen for exactly as long as the retrieval wait.
    #[test]
    fn retrieval_freezes_step_clock(wait in 0u64..600_000) {
        let mut run = RunController::new();
        run.start(&program("RETRIEVALS=1\nINTERVAL_MIN=1\nA,600,0,1000,0\n"), 0).unwrap();
        run.tick(60_000);
        prop_assert_eq!(run.phase(), RunPhase::WaitingRetrieval);
        let deadline = run.context().step_deadline_ms();

        run.tick(60_000 + wait);
        prop_assert_eq!(run.phase(), RunPhase::WaitingRetrieval);
        run.acknowledge_retrieval(60_000 + wait).unwrap();
        prop_assert_eq!(run.context().retrieval_index, 1);
        prop_assert_eq!(run.context().step_deadline_ms(), deadline.map(|d| d + wait));
        prop_assert_eq!(run.phase(), RunPhase::Running);
    }
}
