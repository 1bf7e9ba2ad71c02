//! End-to-end cloud sync: bring-up over the simulated coprocessor, batch
//! upload of run logs and the journal, and acknowledgment files.

use chamber::app::commands::AppCommand;
use chamber::config::SystemConfig;
use chamber::program::Program;
use chamber::run::RunPhase;
use chamber::sync::NetStatus;

use crate::mock_hw::{lab_cloud, Bench, MockStore, THREE_STEPS};

fn cloud_bench() -> Bench {
    let config = SystemConfig {
        cloud: lab_cloud(),
        ..SystemConfig::default()
    };
    let fs = MockStore::default().with_file("T3.TXT", THREE_STEPS);
    let mut b = Bench::new(config, fs);
    let program = Program::load(&mut b.fs, "T3.TXT").unwrap();
    b.command(AppCommand::StartRun(program));
    b
}

fn fully_acked(b: &Bench) -> bool {
    b.app.phase() == RunPhase::Finished
        && b.fs.acked("RUN01.ACK") == Some(b.fs.len("RUN01.CSV"))
        && b.fs.acked("EVENTS.ACK") == Some(b.fs.len("EVENTS.CSV"))
}

#[test]
fn finished_run_is_uploaded_and_acknowledged() {
    let mut b = cloud_bench();
    assert!(b.run_while_not(200_000, fully_acked));
    assert_eq!(b.app.net_status(), NetStatus::Online);

    let requests = &b.modem.requests;
    assert!(requests
        .iter()
        .any(|r| r.starts_with("POST /v1/telemetry/batch HTTP/1.1\r\n")));
    assert!(requests
        .iter()
        .any(|r| r.starts_with("POST /v1/events/batch HTTP/1.1\r\n")));
    assert!(requests.iter().all(|r| r.contains("X-Device-Id: MEGA001\r\n")));
    assert!(requests.iter().any(|r| r.contains("\"sd_state\":\"ok\"")));

    let stats = b.app.net_stats();
    assert_eq!(stats.sent as usize, requests.len());
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.last_http_code, 200);
    assert_eq!(stats.last_sync_epoch, 1_700_000_000);

    // nothing left to send: the link stays quiet
    let sent = requests.len();
    b.run_until(b.now + 30_000);
    assert_eq!(b.modem.requests.len(), sent);
}

#[test]
fn rejected_batches_back_off_and_are_resent() {
    let mut b = cloud_bench();
    b.modem.status = 503;
    b.run_until(60_000);

    assert_eq!(b.fs.acked("RUN01.ACK"), None);
    let stats = b.app.net_stats();
    assert!(stats.failed >= 2);
    assert_eq!(stats.sent, 0);
    assert_eq!(stats.last_http_code, 503);
    let attempts = b.modem.requests.len();
    assert!((2..=8).contains(&attempts), "{attempts} attempts in 60 s");
    // a status rejection is not a link failure
    assert_eq!(b.app.net_status(), NetStatus::Online);

    b.modem.status = 200;
    assert!(b.run_while_not(400_000, fully_acked));
}

#[test]
fn disabled_cloud_never_touches_the_modem() {
    let fs = MockStore::default().with_file("T3.TXT", THREE_STEPS);
    let mut b = Bench::new(SystemConfig::default(), fs);
    let program = Program::load(&mut b.fs, "T3.TXT").unwrap();
    b.command(AppCommand::StartRun(program));
    b.run_until(30_000);

    assert_eq!(b.app.phase(), RunPhase::Finished);
    assert_eq!(b.app.net_status(), NetStatus::Off);
    assert!(b.modem.requests.is_empty());
    assert!(!b.fs.files.contains_key("RUN01.ACK"));
}

#[test]
fn refused_join_recovers_after_forced_reconnect() {
    let config = SystemConfig {
        cloud: lab_cloud(),
        ..SystemConfig::default()
    };
    let mut b = Bench::new(config, MockStore::default());
    b.modem.refuse_join = true;
    assert!(b.run_while_not(30_000, |b| b.app.net_status() == NetStatus::Error));

    b.modem.refuse_join = false;
    b.command(AppCommand::ForceReconnect);
    assert_eq!(b.app.net_status(), NetStatus::Connecting);
    let deadline = b.now + 5_000;
    assert!(b.run_while_not(deadline, |b| b.app.net_status() == NetStatus::Online));
}
