//! Table-driven run state machine and step sequencer.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PhaseTable                                                  │
//! │  ┌──────────────────┬───────────┬──────────┬──────────────┐  │
//! │  │ RunPhase         │ on_enter  │ on_exit  │ on_update    │  │
//! │  ├──────────────────┼───────────┼──────────┼──────────────┤  │
//! │  │ Idle             │ -         │ -        │ hold         │  │
//! │  │ Running          │ -         │ -        │ sequence     │  │
//! │  │ Paused           │ freeze    │ thaw     │ hold         │  │
//! │  │ WaitingRetrieval │ freeze    │ thaw     │ hold         │  │
//! │  │ Finished         │ report    │ -        │ hold         │  │
//! │  │ Stopped          │ report    │ -        │ hold         │  │
//! │  └──────────────────┴───────────┴──────────┴──────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the machine calls `on_update` for the current phase.  If it
//! returns `Some(next)`, the machine runs `on_exit` for the current phase,
//! then `on_enter` for the next.  Every handler receives `&mut RunContext`.

pub mod context;
pub mod phases;
pub mod sequencer;

use log::info;

use crate::error::{Error, ProgramLoadError, RunError};
use crate::program::{Program, Step};
pub use context::{RunContext, RunEvent, StopReason, OUTBOX_CAPACITY};

// ---------------------------------------------------------------------------
// Phase identity
// ---------------------------------------------------------------------------

/// Must stay in sync with [`phases::build_phase_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Running = 1,
    Paused = 2,
    WaitingRetrieval = 3,
    Finished = 4,
    Stopped = 5,
}

impl RunPhase {
    pub const COUNT: usize = 6;

    /// Panics on out-of-range in debug builds; `Stopped` in release.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Paused,
            3 => Self::WaitingRetrieval,
            4 => Self::Finished,
            5 => Self::Stopped,
            _ => {
                debug_assert!(false, "invalid run phase index: {idx}");
                Self::Stopped
            }
        }
    }

    /// A run is in progress (possibly held).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::WaitingRetrieval)
    }

    /// `idle` / `paused` / `running`, as reported upstream.
    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused | Self::WaitingRetrieval => "paused",
            _ => "idle",
        }
    }
}

// ---------------------------------------------------------------------------
// Phase descriptor
// ---------------------------------------------------------------------------

pub type PhaseActionFn = fn(&mut RunContext);
pub type PhaseUpdateFn = fn(&mut RunContext) -> Option<RunPhase>;

pub struct PhaseDescriptor {
    pub id: RunPhase,
    pub name: &'static str,
    pub on_enter: Option<PhaseActionFn>,
    pub on_exit: Option<PhaseActionFn>,
    pub on_update: PhaseUpdateFn,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RunMachine {
    table: [PhaseDescriptor; RunPhase::COUNT],
    current: usize,
    /// Time the current phase was entered.
    entered_ms: u64,
}

impl RunMachine {
    pub fn new(table: [PhaseDescriptor; RunPhase::COUNT], initial: RunPhase) -> Self {
        Self {
            table,
            current: initial as usize,
            entered_ms: 0,
        }
    }

    pub fn tick(&mut self, ctx: &mut RunContext) {
        let next = (self.table[self.current].on_update)(ctx);
        if let Some(next) = next {
            self.transition(next, ctx);
        }
    }

    /// Jump to `next` regardless of what `on_update` would return.
    pub fn force_transition(&mut self, next: RunPhase, ctx: &mut RunContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn phase(&self) -> RunPhase {
        RunPhase::from_index(self.current)
    }

    pub fn ms_in_phase(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.entered_ms)
    }

    fn transition(&mut self, next: RunPhase, ctx: &mut RunContext) {
        let next_idx = next as usize;
        info!(
            "run transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );
        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }
        self.current = next_idx;
        self.entered_ms = ctx.now_ms;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// The machine plus its context, with the operator command surface.
pub struct RunController {
    machine: RunMachine,
    ctx: RunContext,
}

impl Default for RunController {
    fn default() -> Self {
        Self::new()
    }
}

impl RunController {
    pub fn new() -> Self {
        Self {
            machine: RunMachine::new(phases::build_phase_table(), RunPhase::Idle),
            ctx: RunContext::new(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.machine.phase()
    }

    pub fn is_active(&self) -> bool {
        self.phase().is_active()
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Step driving the actuators, if a run is in progress.
    pub fn current_step(&self) -> Option<&Step> {
        if self.is_active() { self.ctx.current.as_ref() } else { None }
    }

    /// Start `program`.  Nothing changes if it is rejected.
    pub fn start(&mut self, program: &Program, now_ms: u64) -> Result<(), Error> {
        if self.is_active() {
            return Err(RunError::AlreadyActive.into());
        }
        if program.steps.is_empty() {
            return Err(ProgramLoadError::ProgramEmpty.into());
        }
        self.ctx.load(program, now_ms);
        info!(
            "run: starting '{}' ({} steps, unit {} ms)",
            program.id,
            program.step_count(),
            program.step_unit_ms
        );
        self.ctx.emit(RunEvent::Started {
            steps: self.ctx.total_steps,
        });
        self.machine.force_transition(RunPhase::Running, &mut self.ctx);
        // the first step starts with the run
        self.machine.tick(&mut self.ctx);
        Ok(())
    }

    pub fn tick(&mut self, now_ms: u64) {
        self.ctx.now_ms = now_ms;
        self.machine.tick(&mut self.ctx);
    }

    pub fn pause(&mut self, now_ms: u64) -> Result<(), Error> {
        if self.phase() != RunPhase::Running {
            return Err(RunError::NotActive.into());
        }
        self.ctx.now_ms = now_ms;
        self.machine.force_transition(RunPhase::Paused, &mut self.ctx);
        self.ctx.emit(RunEvent::Paused {
            step: self.ctx.step_index,
        });
        Ok(())
    }

    pub fn resume(&mut self, now_ms: u64) -> Result<(), Error> {
        if self.phase() != RunPhase::Paused {
            return Err(RunError::NotActive.into());
        }
        self.ctx.now_ms = now_ms;
        self.machine.force_transition(RunPhase::Running, &mut self.ctx);
        self.ctx.emit(RunEvent::Resumed {
            step: self.ctx.step_index,
        });
        Ok(())
    }

    /// Operator confirmed the scheduled retrieval.
    pub fn acknowledge_retrieval(&mut self, now_ms: u64) -> Result<(), Error> {
        if self.phase() != RunPhase::WaitingRetrieval {
            return Err(RunError::NoRetrievalPending.into());
        }
        self.ctx.now_ms = now_ms;
        self.ctx.retrieval_index += 1;
        self.machine.force_transition(RunPhase::Running, &mut self.ctx);
        self.ctx.emit(RunEvent::RetrievalAcknowledged {
            index: self.ctx.retrieval_index,
        });
        Ok(())
    }

    pub fn stop(&mut self, reason: StopReason, now_ms: u64) -> Result<(), Error> {
        if !self.is_active() {
            return Err(RunError::NotActive.into());
        }
        self.ctx.now_ms = now_ms;
        self.ctx.stop_reason = Some(reason);
        self.machine.force_transition(RunPhase::Stopped, &mut self.ctx);
        Ok(())
    }

    pub fn drain_events(&mut self) -> heapless::Vec<RunEvent, OUTBOX_CAPACITY> {
        self.ctx.drain_events()
    }
}
