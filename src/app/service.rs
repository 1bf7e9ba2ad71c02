//! Controller service: the hexagonal core.
//!
//! [`ControllerService`] owns the run machine, thermostat, telemetry
//! pipeline and cloud uploader together with the explicit context they
//! share (configuration, last sensor snapshot, storage health).  It exposes
//! a hardware-agnostic API; all I/O flows through port traits passed in at
//! call sites, so the whole service runs against mock adapters in tests.
//!
//! ```text
//!  SensorPort ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                 │      ControllerService       │
//! ActuatorPort ◀──│ Run · Thermostat · Telemetry │ ◀─▶ FileStore
//!                 │          · CloudSync         │ ◀─▶ ModemPort
//!                 └──────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::config::{validate_config, SystemConfig};
use crate::control::thermostat::Thermostat;
use crate::error::ConfigValidationError;
use crate::program::ProgramSource;
use crate::run::{RunController, RunEvent, RunPhase, StopReason};
use crate::scheduler::{Cadence, Task};
use crate::sensors::{SensorSnapshot, FAIL_RETRY_MS, SAMPLE_PERIOD_MS};
use crate::sync::{CloudSync, NetStats, NetStatus, SyncInputs};
use crate::telemetry::journal::{EventJournal, EventTag, JournalEntry, ScreenName};
use crate::telemetry::{LogQueue, LogRecord, RunLog, StorageHealth, StorageState};
use crate::text::bounded;

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{ActuatorPort, ClockPort, ConfigPort, EventSink, FileStore, ModemPort, SensorPort};

/// Log-record cadence while a run is active.
pub const LOG_INTERVAL_MS: u64 = 3000;
/// Quiet period after the last config change before it is persisted.
pub const AUTO_SAVE_DELAY_MS: u64 = 5000;

/// Screen name journaled with run transitions.
const RUN_SCREEN: &str = "running";

// ───────────────────────────────────────────────────────────────
// Port bundle
// ───────────────────────────────────────────────────────────────

/// The driven adapters one tick or command needs.
///
/// `hw` satisfies both [`SensorPort`] and [`ActuatorPort`]; storage and the
/// modem stay separate because the uploader borrows both at once.
pub struct Io<'a, H, F, M, C> {
    pub hw: &'a mut H,
    pub fs: &'a mut F,
    pub modem: &'a mut M,
    pub clock: &'a C,
}

// ───────────────────────────────────────────────────────────────
// ControllerService
// ───────────────────────────────────────────────────────────────

/// The controller service orchestrates all domain logic.
pub struct ControllerService {
    config: SystemConfig,
    run: RunController,
    thermostat: Thermostat,
    snapshot: SensorSnapshot,
    sensor_cadence: Cadence,
    sample_cadence: Cadence,
    queue: LogQueue,
    run_log: RunLog,
    journal: EventJournal,
    storage: StorageHealth,
    sync: CloudSync,
    net_status: NetStatus,
    tick_count: u64,
    config_dirty: bool,
    dirty_since_ms: u64,
}

impl ControllerService {
    /// Construct the service from configuration.
    ///
    /// Does **not** emit anything; call [`start`](Self::start) next.
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            run: RunController::new(),
            thermostat: Thermostat::new(),
            snapshot: SensorSnapshot::default(),
            sensor_cadence: Cadence::new(SAMPLE_PERIOD_MS),
            sample_cadence: Cadence::new(LOG_INTERVAL_MS),
            queue: LogQueue::new(),
            run_log: RunLog::new(),
            journal: EventJournal::new(),
            storage: StorageHealth::new(),
            sync: CloudSync::new(),
            net_status: NetStatus::Off,
            tick_count: 0,
            config_dirty: false,
            dirty_since_ms: 0,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub fn start(&mut self, sink: &mut impl EventSink) {
        sink.emit(&AppEvent::Started(self.run.phase()));
        info!(
            "ControllerService started (heater bit {}, cloud {})",
            self.config.thermo.heater_bit,
            if self.config.cloud.is_usable() { "on" } else { "off" }
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one pass over every subsystem in [`Task::ORDER`].
    pub fn tick<H, F, M, C>(
        &mut self,
        now_ms: u64,
        io: &mut Io<'_, H, F, M, C>,
        sink: &mut impl EventSink,
    ) where
        H: SensorPort + ActuatorPort,
        F: FileStore,
        M: ModemPort,
        C: ClockPort,
    {
        self.tick_count += 1;
        for task in Task::ORDER {
            match task {
                Task::StorageHealth => {
                    self.storage
                        .health_check(io.fs, now_ms, self.run.is_active());
                }
                Task::Sensors => self.read_sensors(now_ms, io.hw),
                Task::Run => {
                    let prev = self.run.phase();
                    self.run.tick(now_ms);
                    self.after_run_change(prev, now_ms, io, sink);
                }
                Task::Thermostat => self.drive_outputs(now_ms, io.hw, sink),
                Task::Sample => self.sample(now_ms),
                Task::Flush => {
                    let run_active = self.run.is_active();
                    self.run_log.flush(
                        io.fs,
                        &mut self.storage,
                        &mut self.queue,
                        now_ms,
                        run_active,
                    );
                }
                Task::CloudSync => self.sync_tick(now_ms, io, sink),
            }
        }
        self.emit_storage_notice(sink);
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an operator or console command.
    pub fn handle_command<H, F, M, C>(
        &mut self,
        now_ms: u64,
        cmd: AppCommand,
        io: &mut Io<'_, H, F, M, C>,
        sink: &mut impl EventSink,
    ) where
        H: SensorPort + ActuatorPort,
        F: FileStore,
        M: ModemPort,
        C: ClockPort,
    {
        let prev = self.run.phase();
        let result = match cmd {
            AppCommand::StartRun(program) => self.run.start(&program, now_ms),
            AppCommand::Pause => self.run.pause(now_ms),
            AppCommand::Resume => self.run.resume(now_ms),
            AppCommand::AcknowledgeRetrieval => self.run.acknowledge_retrieval(now_ms),
            AppCommand::Stop => self.run.stop(StopReason::Operator, now_ms),
            AppCommand::UpdateConfig(config) => {
                self.update_config(config, now_ms, sink);
                Ok(())
            }
            AppCommand::SaveConfig => {
                self.config_dirty = true;
                self.dirty_since_ms = now_ms.saturating_sub(AUTO_SAVE_DELAY_MS);
                info!("Explicit config save requested");
                Ok(())
            }
            AppCommand::ForceReconnect => {
                self.sync
                    .force_reconnect(now_ms, &self.config.cloud, io.modem);
                self.emit_net_status(sink);
                Ok(())
            }
            AppCommand::JournalEvent {
                tag,
                screen,
                arg0,
                arg1,
            } => {
                let entry = self.journal_entry(now_ms, io.clock, tag, screen, arg0, arg1);
                let run_active = self.run.is_active();
                // a journal failure already demoted storage
                let _ = self
                    .journal
                    .record(io.fs, &mut self.storage, &entry, now_ms, run_active);
                Ok(())
            }
        };

        if let Err(e) = result {
            warn!("command rejected: {}", e);
            sink.emit(&AppEvent::CommandFailed(e));
        }
        self.after_run_change(prev, now_ms, io, sink);
        self.emit_storage_notice(sink);
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn phase(&self) -> RunPhase {
        self.run.phase()
    }

    pub fn run(&self) -> &RunController {
        &self.run
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        self.snapshot
    }

    pub fn heater_on(&self) -> bool {
        self.thermostat.heater_on()
    }

    pub fn applied_mask(&self) -> Option<u8> {
        self.thermostat.applied_mask()
    }

    pub fn storage_state(&self) -> StorageState {
        self.storage.state()
    }

    /// Name of the run log currently open, if any.
    pub fn run_log_file(&self) -> Option<&str> {
        self.run_log.file().map(|f| f.as_str())
    }

    /// Records lost to queue overflow during the current run.
    pub fn dropped_records(&self) -> u32 {
        self.queue.dropped()
    }

    pub fn net_status(&self) -> NetStatus {
        self.net_status
    }

    pub fn net_stats(&self) -> NetStats {
        self.sync.stats()
    }

    pub fn cloud(&self) -> &CloudSync {
        &self.sync
    }

    /// Total ticks executed since startup.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    // ── Internal ──────────────────────────────────────────────

    fn read_sensors(&mut self, now_ms: u64, hw: &mut impl SensorPort) {
        if !self.sensor_cadence.poll(now_ms) {
            return;
        }
        self.snapshot = hw.read_all();
        if !self.snapshot.first_ok {
            self.sensor_cadence.reschedule(now_ms, FAIL_RETRY_MS);
        }
    }

    /// Compute this tick's actuator mask and write it if it changed.
    ///
    /// Held phases keep whatever the relays already show; outside a run
    /// every output is off.
    fn drive_outputs(&mut self, now_ms: u64, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let phase = self.run.phase();
        let mask = match self.run.current_step() {
            Some(step) if phase == RunPhase::Running => self.thermostat.update(
                &self.config.thermo,
                step.band,
                step.mask,
                self.snapshot.temperature(),
                now_ms,
            ),
            _ if phase.is_active() => return,
            _ => 0,
        };
        if let Some(mask) = self.thermostat.take_changed(mask) {
            debug!("relays: mask {:04b}", mask);
            hw.apply_mask(mask);
            sink.emit(&AppEvent::MaskApplied(mask));
        }
    }

    fn sample(&mut self, now_ms: u64) {
        if self.run.phase() != RunPhase::Running || !self.snapshot.valid {
            return;
        }
        let Some(step) = self.run.current_step() else {
            return;
        };
        if !self.sample_cadence.poll(now_ms) {
            return;
        }
        let mask = self.thermostat.applied_mask().unwrap_or(0);
        let record = LogRecord::from_snapshot(now_ms, &self.snapshot, mask, step.label.clone());
        if self.queue.push(record) {
            debug!("storage: log queue full, oldest record dropped");
        }
    }

    fn sync_tick<H, F, M, C>(&mut self, now_ms: u64, io: &mut Io<'_, H, F, M, C>, sink: &mut impl EventSink)
    where
        F: FileStore,
        M: ModemPort,
        C: ClockPort,
    {
        let inputs = SyncInputs {
            cloud: &self.config.cloud,
            wall: io.clock.wall_time(),
            run_state: self.run.phase().label(),
            run_active: self.run.is_active(),
        };
        if let Some(out) = self
            .sync
            .tick(now_ms, &inputs, io.modem, io.fs, &mut self.storage)
        {
            sink.emit(&AppEvent::UploadFinished {
                kind: out.kind,
                rows: out.rows,
                result: out.result,
            });
        }
        self.emit_net_status(sink);
    }

    /// Publish run events and phase changes, journaling the ones that are
    /// recorded on the medium.
    fn after_run_change<H, F, M, C>(
        &mut self,
        prev: RunPhase,
        now_ms: u64,
        io: &mut Io<'_, H, F, M, C>,
        sink: &mut impl EventSink,
    ) where
        H: SensorPort + ActuatorPort,
        F: FileStore,
        C: ClockPort,
    {
        for event in self.run.drain_events() {
            match &event {
                RunEvent::Started { steps } => {
                    self.begin_logging(now_ms, io.fs);
                    self.journal_run(now_ms, io, "run_start", *steps as i16);
                }
                RunEvent::RetrievalDue { index } => {
                    self.journal_run(now_ms, io, "retrieval", i16::from(*index));
                }
                RunEvent::Finished { .. } => {
                    self.end_logging(now_ms, io.fs);
                    let step = self.run.context().step_index;
                    self.journal_run(now_ms, io, "run_done", step as i16);
                }
                RunEvent::Stopped { reason, step } => {
                    self.end_logging(now_ms, io.fs);
                    self.journal_run(now_ms, io, "run_stop", *step as i16);
                    sink.emit(&AppEvent::Notice {
                        message: reason.as_str(),
                        terminal: true,
                    });
                }
                RunEvent::StepStarted { .. }
                | RunEvent::Paused { .. }
                | RunEvent::Resumed { .. }
                | RunEvent::RetrievalAcknowledged { .. } => {}
            }
            sink.emit(&AppEvent::Run(event));
        }

        let next = self.run.phase();
        if next != prev {
            sink.emit(&AppEvent::PhaseChanged {
                from: prev,
                to: next,
            });
            // outputs follow the new phase within the same tick
            self.drive_outputs(now_ms, io.hw, sink);
        }
    }

    /// Fresh queue and log for a new run.  Programs read from storage get
    /// their log file right away; built-in ones open it on the first flush.
    fn begin_logging(&mut self, now_ms: u64, fs: &mut impl FileStore) {
        self.run_log.close(fs);
        self.run_log.reset();
        self.queue.reset();
        self.thermostat.reset();
        self.sample_cadence.trigger();
        if self.run.context().source == ProgramSource::Storage {
            if let Err(e) = self.run_log.open(fs, &mut self.storage, now_ms, true) {
                warn!("storage: run log not opened at start: {}", e);
            }
        }
    }

    fn end_logging(&mut self, now_ms: u64, fs: &mut impl FileStore) {
        self.run_log
            .finish(fs, &mut self.storage, &mut self.queue, now_ms);
        info!(
            "storage: run log closed, {} records written, {} dropped",
            self.run_log.written(),
            self.queue.dropped()
        );
    }

    fn journal_run<H, F: FileStore, M, C: ClockPort>(
        &mut self,
        now_ms: u64,
        io: &mut Io<'_, H, F, M, C>,
        tag: &str,
        arg0: i16,
    ) {
        let entry = self.journal_entry(
            now_ms,
            io.clock,
            bounded(tag).unwrap_or_default(),
            bounded(RUN_SCREEN).unwrap_or_default(),
            arg0,
            0,
        );
        let run_active = self.run.is_active();
        if let Err(e) = self
            .journal
            .record(io.fs, &mut self.storage, &entry, now_ms, run_active)
        {
            debug!("journal: '{}' lost: {}", tag, e);
        }
    }

    fn journal_entry(
        &self,
        now_ms: u64,
        clock: &impl ClockPort,
        event: EventTag,
        screen: ScreenName,
        arg0: i16,
        arg1: i16,
    ) -> JournalEntry {
        let ctx = self.run.context();
        JournalEntry {
            ms: now_ms,
            rtc_iso: clock.wall_time().iso(),
            event,
            screen,
            arg0,
            arg1,
            run_file: ctx.run_file.clone(),
            step: ctx.step_index,
        }
    }

    fn emit_storage_notice(&mut self, sink: &mut impl EventSink) {
        if let Some(notice) = self.storage.take_notice() {
            sink.emit(&AppEvent::Notice {
                message: notice.message(),
                terminal: false,
            });
        }
    }

    fn emit_net_status(&mut self, sink: &mut impl EventSink) {
        let status = self.sync.status();
        if status != self.net_status {
            sink.emit(&AppEvent::NetStatusChanged {
                from: self.net_status,
                to: status,
            });
            self.net_status = status;
        }
    }

    // ── Config dirty-flag management ──────────────────────────

    fn update_config(&mut self, config: SystemConfig, now_ms: u64, sink: &mut impl EventSink) {
        let verdict = if self.run.is_active() {
            Err(ConfigValidationError::RunActive)
        } else {
            validate_config(&config)
        };
        match verdict {
            Ok(()) => {
                self.config = config;
                self.mark_config_dirty(now_ms);
                info!("Configuration updated at runtime");
            }
            Err(e) => {
                warn!("Configuration rejected: {}", e);
                sink.emit(&AppEvent::ConfigRejected(e));
            }
        }
    }

    /// Mark the config as modified.
    pub fn mark_config_dirty(&mut self, now_ms: u64) {
        if !self.config_dirty {
            self.config_dirty = true;
            self.dirty_since_ms = now_ms;
        }
    }

    /// Persist the config once it has been quiet for
    /// [`AUTO_SAVE_DELAY_MS`].  Returns `true` if it was saved.
    pub fn auto_save_if_needed(
        &mut self,
        now_ms: u64,
        storage: &mut impl ConfigPort,
        sink: &mut impl EventSink,
    ) -> bool {
        if !self.config_dirty || now_ms.saturating_sub(self.dirty_since_ms) < AUTO_SAVE_DELAY_MS {
            return false;
        }
        match storage.save(&self.config) {
            Ok(()) => {
                self.config_dirty = false;
                info!("Config auto-saved");
                sink.emit(&AppEvent::ConfigSaved);
                true
            }
            Err(e) => {
                warn!("Config auto-save failed: {}", e);
                // retry after another quiet period
                self.dirty_since_ms = now_ms;
                false
            }
        }
    }

    /// Force-save if dirty (call before shutdown).
    pub fn force_save_if_dirty(&mut self, storage: &mut impl ConfigPort) {
        if !self.config_dirty {
            return;
        }
        match storage.save(&self.config) {
            Ok(()) => {
                self.config_dirty = false;
                info!("Config force-saved before shutdown");
            }
            Err(e) => {
                warn!("Config force-save failed: {}", e);
            }
        }
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_dirty
    }
}
