//! End-to-end run flows: program load → sequencing → relays → run log and
//! journal, all through `ControllerService`.

use chamber::app::commands::AppCommand;
use chamber::app::events::AppEvent;
use chamber::config::SystemConfig;
use chamber::program::Program;
use chamber::run::RunPhase;
use chamber::telemetry::StorageState;

use crate::mock_hw::{Bench, MockStore, THREE_STEPS};

fn bench_with(name: &str, text: &str) -> Bench {
    let fs = MockStore::default().with_file(name, text);
    let mut b = Bench::new(SystemConfig::default(), fs);
    let program = Program::load(&mut b.fs, name).unwrap();
    b.command(AppCommand::StartRun(program));
    assert_eq!(b.app.phase(), RunPhase::Running);
    b
}

fn distinct(masks: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    for &m in masks {
        if out.last() != Some(&m) {
            out.push(m);
        }
    }
    out
}

// ── Sequencing ────────────────────────────────────────────────

#[test]
fn three_step_program_runs_to_completion() {
    let mut b = bench_with("T3.TXT", THREE_STEPS);

    b.run_until(8_800);
    assert_eq!(b.app.phase(), RunPhase::Running);
    assert_eq!(b.hw.last_mask(), 0b0100);

    assert!(b.run_while_not(9_500, |b| b.app.phase() == RunPhase::Finished));
    assert_eq!(b.hw.last_mask(), 0);
    assert_eq!(distinct(&b.hw.masks), vec![0, 0b0001, 0b0010, 0b0100, 0]);

    // a finished run never advances again
    b.run_until(20_000);
    assert_eq!(b.app.phase(), RunPhase::Finished);
    assert_eq!(b.app.run().context().step_index, 3);
}

#[test]
fn run_log_and_journal_are_written() {
    let mut b = bench_with("T3.TXT", THREE_STEPS);
    b.run_until(12_000);

    assert_eq!(b.app.run_log_file(), None);
    let log = b.fs.text("RUN01.CSV");
    let mut lines = log.lines();
    assert_eq!(lines.next(), Some("ms;T1;U1;T2;U2;Tavg;Uavg;mask;step"));
    let rows: Vec<&str> = lines.collect();
    assert!(rows.len() >= 3, "expected a record every 3 s, got {rows:?}");
    assert!(rows[0].contains(";23.0;50.0;23.0;50.0;23.0;50.0;1;"));

    let events = b.fs.text("EVENTS.CSV");
    assert!(events.starts_with("ms;rtc_iso;event;screen;arg0;arg1;run_file;step\n"));
    assert!(events.contains(";2023-11-14T22:13:20Z;run_start;running;3;0;T3.TXT;"));
    assert!(events.contains(";run_done;running;3;0;T3.TXT;3"));
}

#[test]
fn second_run_gets_next_log_number() {
    let fs = MockStore::default()
        .with_file("T3.TXT", THREE_STEPS)
        .with_file("RUN01.CSV", "ms;T1;U1;T2;U2;Tavg;Uavg;mask;step\n");
    let mut b = Bench::new(SystemConfig::default(), fs);
    let program = Program::load(&mut b.fs, "T3.TXT").unwrap();
    b.command(AppCommand::StartRun(program));
    assert_eq!(b.app.run_log_file(), Some("RUN02.CSV"));
}

// ── Holds ─────────────────────────────────────────────────────

#[test]
fn pause_holds_outputs_and_shifts_schedule() {
    let mut b = bench_with("T3.TXT", THREE_STEPS);
    b.run_until(1_000);
    b.command(AppCommand::Pause);
    assert_eq!(b.app.phase(), RunPhase::Paused);

    b.run_until(6_000);
    assert_eq!(b.hw.last_mask(), 0b0001);
    b.command(AppCommand::Resume);

    b.run_until(13_800);
    assert_eq!(b.app.phase(), RunPhase::Running);
    assert!(b.run_while_not(14_500, |b| b.app.phase() == RunPhase::Finished));
}

#[test]
fn retrieval_waits_for_operator() {
    let text = "ID=R1\nRETRIEVALS=1\nINTERVAL_MIN=1\nSTEP_UNIT=SEC\nA,90,0,1000,0\n";
    let mut b = bench_with("R1.TXT", text);

    assert!(b.run_while_not(61_000, |b| b.app.phase() == RunPhase::WaitingRetrieval));
    assert!(b.now >= 60_000);
    b.run_until(80_000);
    assert_eq!(b.app.phase(), RunPhase::WaitingRetrieval);
    assert_eq!(b.hw.last_mask(), 0b0001);

    b.command(AppCommand::AcknowledgeRetrieval);
    assert_eq!(b.app.phase(), RunPhase::Running);
    assert_eq!(b.app.run().context().retrieval_index, 1);

    // 90 s of step time plus the 20 s wait
    b.run_until(109_800);
    assert_eq!(b.app.phase(), RunPhase::Running);
    assert!(b.run_while_not(110_500, |b| b.app.phase() == RunPhase::Finished));
    assert!(b.fs.text("EVENTS.CSV").contains(";retrieval;running;1;0;R1.TXT;"));
}

#[test]
fn operator_stop_turns_everything_off() {
    let mut b = bench_with("T3.TXT", THREE_STEPS);
    b.run_until(3_000);
    b.command(AppCommand::Stop);
    assert_eq!(b.app.phase(), RunPhase::Stopped);
    assert_eq!(b.hw.last_mask(), 0);
    assert!(b
        .sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::Notice { terminal: true, .. })));
}

// ── Thermostat ────────────────────────────────────────────────

#[test]
fn hysteresis_band_drives_heater_with_dwell() {
    let text = "ID=H1\nSTEP_UNIT=SEC\nH,60,0,0000,0,25.0,30.0\n";
    let mut b = bench_with("H1.TXT", text);

    b.run_until(1_000);
    assert_eq!(b.hw.last_mask(), 0b0100, "23.0 is below the band");

    b.hw.temp = 310;
    b.run_until(8_000);
    assert_eq!(b.hw.last_mask(), 0b0100, "minimum on-time not elapsed");

    b.run_until(14_000);
    assert_eq!(b.hw.last_mask(), 0);
    assert!(b.app.run().is_active());
}

// ── Storage resilience ────────────────────────────────────────

#[test]
fn card_pulled_mid_run_does_not_stop_it() {
    let mut b = bench_with("T3.TXT", THREE_STEPS);
    b.run_until(2_000);
    assert_eq!(b.app.storage_state(), StorageState::Ready);

    b.fs.down = true;
    b.run_until(5_000);
    assert_eq!(b.app.storage_state(), StorageState::Degraded);
    assert!(b
        .sink
        .events
        .iter()
        .any(|e| matches!(e, AppEvent::Notice { terminal: false, .. })));

    b.fs.down = false;
    assert!(b.run_while_not(20_000, |b| b.app.phase() == RunPhase::Finished));
    b.run_until(25_000);
    assert_eq!(b.app.storage_state(), StorageState::Ready);
}
