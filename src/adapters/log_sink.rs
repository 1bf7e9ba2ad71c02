//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the logger (UART on the firmware, stderr in the simulator).  The display
//! adapter implements the same trait.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::run::RunEvent;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started(phase) => {
                info!("START | phase={:?}", phase);
            }
            AppEvent::PhaseChanged { from, to } => {
                info!("PHASE | {:?} -> {:?}", from, to);
            }
            AppEvent::Run(run) => match run {
                RunEvent::StepStarted { index, label } => {
                    info!("STEP  | #{} '{}'", index, label);
                }
                RunEvent::RetrievalDue { index } => {
                    info!("RETR  | retrieval {} due, waiting for operator", index);
                }
                other => info!("RUN   | {:?}", other),
            },
            AppEvent::MaskApplied(mask) => {
                info!("RELAY | mask={:04b}", mask);
            }
            AppEvent::Notice { message, terminal } => {
                if *terminal {
                    warn!("NOTE  | {} (run ended)", message);
                } else {
                    info!("NOTE  | {}", message);
                }
            }
            AppEvent::NetStatusChanged { from, to } => {
                info!("NET   | {} -> {}", from.as_str(), to.as_str());
            }
            AppEvent::UploadFinished { kind, rows, result } => match result {
                Ok(code) => info!("SYNC  | {:?} x{} -> {}", kind, rows, code),
                Err(e) => warn!("SYNC  | {:?} x{} failed: {}", kind, rows, e),
            },
            AppEvent::ConfigRejected(e) => {
                warn!("CFG   | rejected: {}", e);
            }
            AppEvent::ConfigSaved => {
                info!("CFG   | saved");
            }
            AppEvent::CommandFailed(e) => {
                warn!("CMD   | {}", e);
            }
        }
    }
}
