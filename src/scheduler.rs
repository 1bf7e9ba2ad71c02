//! Cooperative tick scheduler.
//!
//! There is exactly one control loop.  Every iteration the controller
//! service walks [`Task::ORDER`] and gives each subsystem one non-blocking
//! step; each subsystem decides for itself (usually through a [`Cadence`])
//! whether it has work this time round.
//!
//! ```text
//!  loop ─▶ StorageHealth ─▶ Sensors ─▶ Run ─▶ Thermostat
//!            ─▶ Sample ─▶ Flush ─▶ CloudSync ─▶ (sleep 50 ms) ─┐
//!   ▲                                                          │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The order matters: the run machine must see this iteration's sensor
//! snapshot, the thermostat must see the step the run machine just
//! activated, and the flush worker must run before the uploader so that the
//! reader only ever consumes fully flushed bytes.

// ═══════════════════════════════════════════════════════════════
//  Task order
// ═══════════════════════════════════════════════════════════════

/// One slot in the fixed per-iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    StorageHealth,
    Sensors,
    Run,
    Thermostat,
    Sample,
    Flush,
    CloudSync,
}

impl Task {
    pub const ORDER: [Task; 7] = [
        Task::StorageHealth,
        Task::Sensors,
        Task::Run,
        Task::Thermostat,
        Task::Sample,
        Task::Flush,
        Task::CloudSync,
    ];
}

// ═══════════════════════════════════════════════════════════════
//  Cadence gate
// ═══════════════════════════════════════════════════════════════

/// Fixed-interval gate over a millisecond clock.
///
/// Fires on the first poll, then every `period_ms`.  A caller may pull the
/// next firing earlier or push it later with [`Cadence::reschedule`] (the
/// sensor reader uses this for its short retry after a failed read).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    period_ms: u64,
    next_due_ms: u64,
}

impl Cadence {
    pub const fn new(period_ms: u64) -> Self {
        Self {
            period_ms,
            next_due_ms: 0,
        }
    }

    /// `true` (and re-arm) if the gate is due at `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        self.next_due_ms = now_ms.saturating_add(self.period_ms);
        true
    }

    /// Next firing at `now_ms + delay_ms` instead of the regular period.
    pub fn reschedule(&mut self, now_ms: u64, delay_ms: u64) {
        self.next_due_ms = now_ms.saturating_add(delay_ms);
    }

    /// Fire on the next poll regardless of the period.
    pub fn trigger(&mut self) {
        self.next_due_ms = 0;
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }
}
