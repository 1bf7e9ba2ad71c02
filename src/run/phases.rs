//! Concrete run-phase handlers and the table builder.
//!
//! ```text
//!  IDLE ──start──▶ RUNNING ──pause──▶ PAUSED ──resume──┐
//!                   │  ▲ ▲                             │
//!                   │  │ └─────────────────────────────┘
//!     [retrieval due]  └──acknowledge── WAITING_RETRIEVAL
//!                   │
//!        [last step done]──▶ FINISHED
//!        [cache starved] ──▶ STOPPED ◀──stop── any active phase
//! ```
//!
//! Operator commands go through [`RunController`](super::RunController),
//! which forces the transition; automatic transitions come from
//! `running_update`.

use log::{info, warn};

use super::context::{RunContext, RunEvent, StopReason};
use super::sequencer::{self, Advance};
use super::{PhaseDescriptor, RunPhase};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

pub fn build_phase_table() -> [PhaseDescriptor; RunPhase::COUNT] {
    [
        PhaseDescriptor {
            id: RunPhase::Idle,
            name: "Idle",
            on_enter: None,
            on_exit: None,
            on_update: hold,
        },
        PhaseDescriptor {
            id: RunPhase::Running,
            name: "Running",
            on_enter: None,
            on_exit: None,
            on_update: running_update,
        },
        PhaseDescriptor {
            id: RunPhase::Paused,
            name: "Paused",
            on_enter: Some(paused_enter),
            on_exit: Some(paused_exit),
            on_update: hold,
        },
        PhaseDescriptor {
            id: RunPhase::WaitingRetrieval,
            name: "WaitingRetrieval",
            on_enter: Some(retrieval_enter),
            on_exit: Some(paused_exit),
            on_update: hold,
        },
        PhaseDescriptor {
            id: RunPhase::Finished,
            name: "Finished",
            on_enter: Some(finished_enter),
            on_exit: None,
            on_update: hold,
        },
        PhaseDescriptor {
            id: RunPhase::Stopped,
            name: "Stopped",
            on_enter: Some(stopped_enter),
            on_exit: None,
            on_update: hold,
        },
    ]
}

/// Phases that only leave on a command.
fn hold(_ctx: &mut RunContext) -> Option<RunPhase> {
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING
// ═══════════════════════════════════════════════════════════════════════════

fn running_update(ctx: &mut RunContext) -> Option<RunPhase> {
    // retrieval wins over step advance on the same tick
    if sequencer::retrieval_due(ctx) {
        return Some(RunPhase::WaitingRetrieval);
    }
    match sequencer::advance(ctx) {
        Advance::Continue => None,
        Advance::Finished => Some(RunPhase::Finished),
        Advance::Starved => {
            warn!(
                "run: step cache empty after {} of {} steps",
                ctx.step_index, ctx.total_steps
            );
            ctx.stop_reason = Some(StopReason::StepCacheStarved);
            Some(RunPhase::Stopped)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  PAUSED / WAITING_RETRIEVAL: both freeze the step clock
// ═══════════════════════════════════════════════════════════════════════════

fn paused_enter(ctx: &mut RunContext) {
    ctx.begin_pause();
}

fn paused_exit(ctx: &mut RunContext) {
    ctx.end_pause();
}

fn retrieval_enter(ctx: &mut RunContext) {
    ctx.begin_pause();
    let index = ctx.retrieval_index + 1;
    info!(
        "run: retrieval {}/{} due at {} ms",
        index,
        ctx.retrievals,
        ctx.elapsed_ms()
    );
    ctx.emit(RunEvent::RetrievalDue { index });
}

// ═══════════════════════════════════════════════════════════════════════════
//  Terminal phases
// ═══════════════════════════════════════════════════════════════════════════

fn finished_enter(ctx: &mut RunContext) {
    info!("run: '{}' finished after {} steps", ctx.program_id, ctx.step_index);
    ctx.current = None;
    ctx.steps.clear();
    ctx.emit(RunEvent::Finished {
        steps: ctx.total_steps,
    });
}

fn stopped_enter(ctx: &mut RunContext) {
    let reason = *ctx.stop_reason.get_or_insert(StopReason::Operator);
    info!("run: stopped at step {}: {}", ctx.step_index, reason.as_str());
    ctx.current = None;
    ctx.steps.clear();
    ctx.pause_started_ms = None;
    ctx.emit(RunEvent::Stopped {
        reason,
        step: ctx.step_index,
    });
}
