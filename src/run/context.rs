//! Shared mutable context threaded through every run-phase handler.
//!
//! `RunContext` is the blackboard the phase handlers read from and write
//! to: the step cache, the step and experiment clocks, the retrieval
//! schedule and an outbox of [`RunEvent`]s the controller service drains
//! after each tick.  Exactly one exists; [`RunContext::load`] resets it for
//! a new run.

use heapless::{Deque, Vec};

use crate::app::ports::FileName;
use crate::program::{Program, ProgramSource, Step, StepLabel, MAX_STEPS};

/// Events buffered between two drains.
pub const OUTBOX_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// Stop reasons and run events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Operator pressed stop.
    Operator,
    /// The step cache ran dry before the program's step count was reached.
    StepCacheStarved,
}

impl StopReason {
    /// Free text for the presentation layer.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operator => "stopped by operator",
            Self::StepCacheStarved => "storage fault: program steps missing",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started { steps: u16 },
    StepStarted { index: u16, label: StepLabel },
    Paused { step: u16 },
    Resumed { step: u16 },
    RetrievalDue { index: u8 },
    RetrievalAcknowledged { index: u8 },
    Finished { steps: u16 },
    Stopped { reason: StopReason, step: u16 },
}

// ---------------------------------------------------------------------------
// RunContext
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RunContext {
    // -- Timing --
    /// Monotonic time of the current tick.  Set before every handler call.
    pub now_ms: u64,
    pub started_ms: u64,
    /// Pause time already folded into the experiment clock.
    pub paused_total_ms: u64,
    /// Start of the current pause or retrieval wait.
    pub pause_started_ms: Option<u64>,

    // -- Program --
    pub program_id: FileName,
    /// Program file name written to the event journal.
    pub run_file: FileName,
    pub source: ProgramSource,
    pub step_unit_ms: u32,
    pub steps: Deque<Step, MAX_STEPS>,
    pub total_steps: u16,
    /// Steps popped so far; never decreases within a run.
    pub step_index: u16,
    pub current: Option<Step>,
    pub step_started_ms: u64,
    pub step_done: bool,

    // -- Retrieval schedule --
    pub retrievals: u8,
    pub retrieval_interval_min: u16,
    pub retrieval_index: u8,

    // -- Outputs --
    pub stop_reason: Option<StopReason>,
    pub outbox: Vec<RunEvent, OUTBOX_CAPACITY>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            now_ms: 0,
            started_ms: 0,
            paused_total_ms: 0,
            pause_started_ms: None,
            program_id: FileName::new(),
            run_file: FileName::new(),
            source: ProgramSource::Builtin,
            step_unit_ms: 1000,
            steps: Deque::new(),
            total_steps: 0,
            step_index: 0,
            current: None,
            step_started_ms: 0,
            step_done: false,
            retrievals: 0,
            retrieval_interval_min: 0,
            retrieval_index: 0,
            stop_reason: None,
            outbox: Vec::new(),
        }
    }

    /// Reset every run counter and fill the step cache from `program`.
    pub fn load(&mut self, program: &Program, now_ms: u64) {
        let outbox = core::mem::take(&mut self.outbox);
        *self = Self::new();
        self.outbox = outbox;
        self.now_ms = now_ms;
        self.started_ms = now_ms;
        self.step_started_ms = now_ms;
        self.program_id = program.id.clone();
        self.run_file = program.run_file().clone();
        self.source = program.source;
        self.step_unit_ms = program.step_unit_ms;
        self.retrievals = program.retrievals;
        self.retrieval_interval_min = program.retrieval_interval_min;
        for step in &program.steps {
            if self.steps.push_back(step.clone()).is_err() {
                break;
            }
        }
        self.total_steps = program.step_count();
    }

    /// Queue an event; the oldest is dropped if the outbox was not drained.
    pub fn emit(&mut self, event: RunEvent) {
        if self.outbox.is_full() {
            self.outbox.remove(0);
        }
        let _ = self.outbox.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<RunEvent, OUTBOX_CAPACITY> {
        core::mem::take(&mut self.outbox)
    }

    /// Experiment time excluding pauses.
    pub fn elapsed_ms(&self) -> u64 {
        let paused = self.paused_total_ms
            + self
                .pause_started_ms
                .map_or(0, |at| self.now_ms.saturating_sub(at));
        self.now_ms.saturating_sub(self.started_ms).saturating_sub(paused)
    }

    /// Step duration in milliseconds under the program's time unit.
    pub fn step_duration_ms(&self, step: &Step) -> u64 {
        u64::from(step.duration) * u64::from(self.step_unit_ms)
    }

    /// Deadline of the step in progress.
    pub fn step_deadline_ms(&self) -> Option<u64> {
        self.current
            .as_ref()
            .map(|s| self.step_started_ms + self.step_duration_ms(s))
    }

    /// 1-based number of the step in progress (0 before the first pop).
    pub fn step_number(&self) -> u16 {
        self.step_index
    }

    pub fn begin_pause(&mut self) {
        if self.pause_started_ms.is_none() {
            self.pause_started_ms = Some(self.now_ms);
        }
    }

    /// Fold the pause into the experiment clock and push the step clock
    /// forward by the same amount.
    pub fn end_pause(&mut self) {
        if let Some(at) = self.pause_started_ms.take() {
            let held = self.now_ms.saturating_sub(at);
            self.paused_total_ms += held;
            self.step_started_ms += held;
        }
    }
}
