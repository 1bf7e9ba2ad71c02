//! Inbound commands to the controller service.
//!
//! These represent actions requested by the outside world (menu buttons,
//! serial console, the simulation script) that the
//! [`ControllerService`](super::service::ControllerService) interprets and
//! acts upon.

use crate::config::SystemConfig;
use crate::program::Program;
use crate::telemetry::journal::{EventTag, ScreenName};

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone)]
pub enum AppCommand {
    /// Start a run of an already loaded program.
    StartRun(Program),

    Pause,

    Resume,

    /// Operator confirmed the scheduled sample retrieval.
    AcknowledgeRetrieval,

    /// Abort the active run.
    Stop,

    /// Replace the live configuration.  Refused while a run is active.
    UpdateConfig(SystemConfig),

    /// Persist the current configuration on the next save check.
    SaveConfig,

    /// Restart network bring-up from the first stage.
    ForceReconnect,

    /// Journal a presentation-layer event (`wifi_test`, `time_set`, ...).
    JournalEvent {
        tag: EventTag,
        screen: ScreenName,
        arg0: i16,
        arg1: i16,
    },
}
