//! Cloud synchronisation: network bring-up plus cursor-driven batch upload.
//!
//! ```text
//!  RUNxx.CSV ─┐                        ┌─▶ POST …/telemetry/batch
//!             ├─▶ read_batch ─▶ JSON ──┤
//!  EVENTS.CSV ┘        ▲               └─▶ POST …/events/batch
//!                      │                          │ 2xx
//!                 RUNxx.ACK / EVENTS.ACK ◀────────┘
//! ```
//!
//! The oldest run log with unsent rows goes first; the event journal is
//! only uploaded when no run log is pending.  At most one job is in flight.

pub mod backoff;
pub mod batch;
pub mod cursor;
pub mod job;
pub mod link;
pub mod payload;
pub mod rows;

use log::{debug, info, warn};

pub use backoff::Backoff;
pub use cursor::UploadCursor;
pub use job::{JobMachine, JobOutcome, JobStage, UploadJob};
pub use link::{NetState, NetStatus, NetworkLink, RxWindow};
pub use payload::{BatchKind, DeviceStatus};

use self::batch::read_batch;
use self::cursor::{load_cursor, save_cursor};
use self::rows::{EventRow, TelemetryRow};
use crate::app::ports::{FileEntry, FileName, FileStore, ModemPort};
use crate::config::CloudConfig;
use crate::error::{JobFault, StorageFault};
use crate::rtc::WallTime;
use crate::scheduler::Cadence;
use crate::telemetry::journal::EVENTS_FILE;
use crate::telemetry::storage::StorageHealth;
use crate::text::{bounded, cmp_ignore_ascii_case};

pub const UPLOAD_INTERVAL_MS: u64 = 3000;
pub const BATCH_MAX_ROWS: usize = 1;

/// Upload counters shown on the network status screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    pub sent: u32,
    pub failed: u32,
    pub retried: u32,
    /// Rows in the batch currently in flight.
    pub pending_lines: u8,
    /// Last HTTP status, `-1` when none was parsed.
    pub last_http_code: i16,
    pub last_sync_epoch: u64,
}

/// Snapshot of the device handed to the uploader each tick.
#[derive(Debug, Clone, Copy)]
pub struct SyncInputs<'a> {
    pub cloud: &'a CloudConfig,
    pub wall: WallTime,
    pub run_state: &'static str,
    pub run_active: bool,
}

#[derive(Debug)]
pub struct CloudSync {
    link: NetworkLink,
    job: JobMachine,
    rx: RxWindow,
    backoff: Backoff,
    cadence: Cadence,
    stats: NetStats,
}

impl Default for CloudSync {
    fn default() -> Self {
        Self::new()
    }
}

impl CloudSync {
    pub fn new() -> Self {
        Self {
            link: NetworkLink::new(),
            job: JobMachine::new(),
            rx: RxWindow::new(),
            backoff: Backoff::new(),
            cadence: Cadence::new(UPLOAD_INTERVAL_MS),
            stats: NetStats {
                last_http_code: -1,
                ..NetStats::default()
            },
        }
    }

    pub fn status(&self) -> NetStatus {
        self.link.status()
    }

    pub fn stats(&self) -> NetStats {
        self.stats
    }

    pub fn link(&self) -> &NetworkLink {
        &self.link
    }

    pub fn job_stage(&self) -> JobStage {
        self.job.stage()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn force_reconnect(&mut self, now_ms: u64, cloud: &CloudConfig, modem: &mut impl ModemPort) {
        self.link
            .force_reconnect(now_ms, cloud, modem, &mut self.rx, &mut self.backoff);
    }

    /// One cooperative step: drain the link, advance the job and bring-up,
    /// then maybe start the next upload.  Returns a finished job, if any.
    pub fn tick(
        &mut self,
        now_ms: u64,
        inputs: &SyncInputs<'_>,
        modem: &mut impl ModemPort,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
    ) -> Option<JobOutcome> {
        self.rx.pump(modem);

        let outcome = self.job.tick(now_ms, modem, &mut self.rx);
        if let Some(out) = &outcome {
            self.settle(out, now_ms, inputs.wall, fs, health, inputs.run_active);
        }

        self.link
            .tick(now_ms, inputs.cloud, modem, &mut self.rx, &mut self.backoff);

        self.upload_tick(now_ms, inputs, modem, fs, health);
        outcome
    }

    fn settle(
        &mut self,
        out: &JobOutcome,
        now_ms: u64,
        wall: WallTime,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
        run_active: bool,
    ) {
        self.stats.pending_lines = 0;
        match out.result {
            Ok(code) => {
                self.stats.sent += 1;
                self.stats.last_http_code = code as i16;
                self.backoff.record_success();
                let epoch = wall.epoch().unwrap_or(self.stats.last_sync_epoch);
                match save_cursor(fs, &out.next_cursor, epoch) {
                    Ok(()) => {
                        self.stats.last_sync_epoch = epoch;
                        debug!(
                            "sync: {} acknowledged to offset {}",
                            out.next_cursor.file, out.next_cursor.byte_offset
                        );
                    }
                    Err(e) => {
                        // rows get re-sent once storage is back
                        warn!("sync: cannot persist cursor for {}: {}", out.next_cursor.file, e);
                        health.demote(run_active);
                    }
                }
            }
            Err(fault) => {
                self.stats.failed += 1;
                self.stats.retried += 1;
                self.stats.last_http_code = match fault {
                    JobFault::Status(code) => code as i16,
                    _ => -1,
                };
                let wait = self.backoff.record_failure(now_ms);
                debug!("sync: next attempt in {} ms", wait);
                if fault.is_network_level() {
                    self.link.mark_failed(now_ms);
                }
            }
        }
    }

    fn upload_tick(
        &mut self,
        now_ms: u64,
        inputs: &SyncInputs<'_>,
        modem: &mut impl ModemPort,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
    ) {
        if !inputs.cloud.is_usable() || !self.link.is_online() || self.job.is_busy() {
            return;
        }
        if !self.cadence.poll(now_ms) || !self.backoff.ready(now_ms) {
            return;
        }
        if !health.ensure_ready(fs, now_ms, false, inputs.run_active) {
            return;
        }

        let job = match self.next_job(inputs, fs, health) {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(JobFault::PayloadTooLarge) | Err(JobFault::HeaderTooLarge) => {
                warn!("sync: batch does not fit the request buffers");
                return;
            }
            Err(e) => {
                debug!("sync: no batch: {}", e);
                return;
            }
        };
        let rows = job.rows;
        match self
            .job
            .start(job, &inputs.cloud.api_host, true, now_ms, modem, &mut self.rx)
        {
            Ok(()) => self.stats.pending_lines = rows,
            Err(e) => {
                warn!("sync: job not started: {}", e);
                self.stats.failed += 1;
                self.backoff.record_failure(now_ms);
                self.link.mark_failed(now_ms);
            }
        }
    }

    /// Build the next job: oldest pending run log first, then the journal.
    fn next_job(
        &mut self,
        inputs: &SyncInputs<'_>,
        fs: &mut impl FileStore,
        health: &mut StorageHealth,
    ) -> Result<Option<UploadJob>, JobFault> {
        let found = match self.run_log_job(inputs, fs, health.state().as_str()) {
            Ok(None) => self.events_job(inputs, fs),
            other => other,
        };
        match found {
            Ok(job) => Ok(job),
            Err(SyncReadError::Job(e)) => Err(e),
            Err(SyncReadError::Storage(e)) => {
                warn!("sync: reading logs failed: {}", e);
                if e != StorageFault::NotFound {
                    health.demote(inputs.run_active);
                }
                Ok(None)
            }
        }
    }

    fn run_log_job(
        &mut self,
        inputs: &SyncInputs<'_>,
        fs: &mut impl FileStore,
        sd_state: &'static str,
    ) -> Result<Option<UploadJob>, SyncReadError> {
        let Some(cursor) = oldest_pending_run(fs)? else {
            return Ok(None);
        };
        let batch = read_batch::<TelemetryRow>(fs, &cursor, BATCH_MAX_ROWS)?;
        if batch.is_empty() {
            self.skip_ahead(fs, &cursor, &batch.next, inputs.wall)?;
            return Ok(None);
        }

        let rtc_iso = inputs.wall.iso();
        let status = DeviceStatus {
            rtc_iso: &rtc_iso,
            sd_state,
            rtc_state: inputs.wall.state.as_str(),
            run_state: inputs.run_state,
        };
        let body =
            payload::telemetry_payload(&inputs.cloud.device_id, &cursor.file, &batch.rows, &status)?;
        let head = payload::request_head(inputs.cloud, BatchKind::Telemetry, body.len())?;
        Ok(Some(UploadJob {
            kind: BatchKind::Telemetry,
            head,
            payload: body,
            rows: batch.rows.len() as u8,
            next_cursor: batch.next,
        }))
    }

    fn events_job(
        &mut self,
        inputs: &SyncInputs<'_>,
        fs: &mut impl FileStore,
    ) -> Result<Option<UploadJob>, SyncReadError> {
        if !fs.exists(EVENTS_FILE) {
            return Ok(None);
        }
        let name: FileName = bounded(EVENTS_FILE).unwrap_or_default();
        let (cursor, _) = load_cursor(fs, &name)?;
        let batch = read_batch::<EventRow>(fs, &cursor, BATCH_MAX_ROWS)?;
        if batch.is_empty() {
            self.skip_ahead(fs, &cursor, &batch.next, inputs.wall)?;
            return Ok(None);
        }
        let body = payload::events_payload(&inputs.cloud.device_id, &batch.rows)?;
        let head = payload::request_head(inputs.cloud, BatchKind::Events, body.len())?;
        Ok(Some(UploadJob {
            kind: BatchKind::Events,
            head,
            payload: body,
            rows: batch.rows.len() as u8,
            next_cursor: batch.next,
        }))
    }

    /// Persist a cursor that only moved over headers or unparsable lines.
    ///
    /// This is the one cursor write not preceded by a remote acknowledgment.
    /// The skipped span holds no rows, so no telemetry can be lost by it.
    /// The line index is left unchanged; only the byte offset moves.
    fn skip_ahead(
        &mut self,
        fs: &mut impl FileStore,
        from: &UploadCursor,
        to: &UploadCursor,
        wall: WallTime,
    ) -> Result<(), StorageFault> {
        if to.byte_offset > from.byte_offset {
            debug!("sync: {} has no rows up to offset {}", to.file, to.byte_offset);
            save_cursor(fs, to, wall.epoch().unwrap_or(self.stats.last_sync_epoch))?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum SyncReadError {
    Storage(StorageFault),
    Job(JobFault),
}

impl From<StorageFault> for SyncReadError {
    fn from(e: StorageFault) -> Self {
        Self::Storage(e)
    }
}

impl From<JobFault> for SyncReadError {
    fn from(e: JobFault) -> Self {
        Self::Job(e)
    }
}

/// `RUNxx.CSV`, case-insensitive.
pub fn is_run_log(name: &str) -> bool {
    let ext = name.len().checked_sub(4).and_then(|at| name.get(at..));
    match (name.get(..3), ext) {
        (Some(prefix), Some(ext)) => {
            name.len() >= 7 && prefix.eq_ignore_ascii_case("RUN") && ext.eq_ignore_ascii_case(".CSV")
        }
        _ => false,
    }
}

/// Cursor of the name-wise smallest run log whose cursor is short of its
/// size.
pub fn oldest_pending_run(fs: &mut impl FileStore) -> Result<Option<UploadCursor>, StorageFault> {
    let mut runs: Vec<FileEntry> = fs.list()?.into_iter().filter(|e| is_run_log(&e.name)).collect();
    runs.sort_by(|a, b| cmp_ignore_ascii_case(&a.name, &b.name));
    for entry in runs {
        let (cursor, _) = load_cursor(fs, &entry.name)?;
        if cursor.byte_offset < entry.size {
            info!("sync: {} pending from offset {}", entry.name, cursor.byte_offset);
            return Ok(Some(cursor));
        }
    }
    Ok(None)
}
