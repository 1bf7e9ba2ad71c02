//! Chamber controller library.
//!
//! Exposes the run sequencer, thermostat, telemetry pipeline and cloud
//! sync for the firmware binary, the host simulator and the integration
//! tests.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod program;
pub mod rtc;
pub mod run;
pub mod scheduler;
pub mod sync;
pub mod telemetry;
pub mod text;

pub mod adapters;
pub mod control;
pub mod drivers;
pub mod sensors;

#[cfg(test)]
mod testing;
