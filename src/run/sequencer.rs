//! Step sequencing and the retrieval schedule.
//!
//! A step completes on the first tick at or past its deadline; the next
//! step is popped on the following tick and starts at the previous step's
//! deadline, so tick jitter never accumulates across steps.

use log::debug;

use super::context::{RunContext, RunEvent};

/// Outcome of one sequencer step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Continue,
    /// Every step of the program has run.
    Finished,
    /// The cache is empty but fewer steps were consumed than expected.
    Starved,
}

pub fn advance(ctx: &mut RunContext) -> Advance {
    if let Some(deadline) = ctx.step_deadline_ms() {
        if !ctx.step_done {
            if ctx.now_ms >= deadline {
                ctx.step_done = true;
                debug!("run: step {} complete at {} ms", ctx.step_index, ctx.now_ms);
            }
            return Advance::Continue;
        }
    }

    let anchor = match (ctx.step_done, ctx.step_deadline_ms()) {
        (true, Some(deadline)) => deadline,
        _ => ctx.step_started_ms,
    };
    ctx.current = None;
    ctx.step_done = false;

    match ctx.steps.pop_front() {
        Some(step) => {
            ctx.step_index += 1;
            ctx.step_started_ms = anchor;
            debug!(
                "run: step {}/{} '{}' for {} ms",
                ctx.step_index,
                ctx.total_steps,
                step.label,
                ctx.step_duration_ms(&step)
            );
            ctx.emit(RunEvent::StepStarted {
                index: ctx.step_index,
                label: step.label.clone(),
            });
            ctx.current = Some(step);
            Advance::Continue
        }
        None if ctx.step_index >= ctx.total_steps => Advance::Finished,
        None => Advance::Starved,
    }
}

/// The next scheduled retrieval is due on the experiment clock.
pub fn retrieval_due(ctx: &RunContext) -> bool {
    if ctx.retrieval_interval_min == 0 || ctx.retrieval_index >= ctx.retrievals {
        return false;
    }
    let due_at = (u64::from(ctx.retrieval_index) + 1) * u64::from(ctx.retrieval_interval_min) * 60_000;
    ctx.elapsed_ms() >= due_at
}
