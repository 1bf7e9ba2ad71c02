//! Outbound application events.
//!
//! The [`ControllerService`](super::service::ControllerService) emits these
//! through the [`EventSink`](super::ports::EventSink) port.  Adapters on the
//! other side decide what to do with them: log to serial, drive the
//! display, record them in a test.

use crate::error::{ConfigValidationError, Error, JobFault};
use crate::run::{RunEvent, RunPhase};
use crate::sync::{BatchKind, NetStatus};

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// The service has started (carries the initial run phase).
    Started(RunPhase),

    /// The run machine moved between phases.
    PhaseChanged { from: RunPhase, to: RunPhase },

    /// Step, pause, retrieval and completion events from the run machine.
    Run(RunEvent),

    /// A new actuator mask was written to the relays.
    MaskApplied(u8),

    /// Short advisory for the presentation layer.  `terminal` is set when
    /// the condition ended the run.
    Notice {
        message: &'static str,
        terminal: bool,
    },

    /// Network bring-up status changed.
    NetStatusChanged { from: NetStatus, to: NetStatus },

    /// An upload job completed, successfully or not.
    UploadFinished {
        kind: BatchKind,
        rows: u8,
        result: Result<u16, JobFault>,
    },

    /// A configuration update was refused; the previous values stay.
    ConfigRejected(ConfigValidationError),

    /// Configuration was written to persistent storage.
    ConfigSaved,

    /// An operator command could not be carried out.
    CommandFailed(Error),
}
