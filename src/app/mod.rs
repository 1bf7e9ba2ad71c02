//! Application core: pure domain logic, zero I/O.
//!
//! This module wires the chamber's business rules together: run
//! sequencing, thermostat control, telemetry logging and cloud upload.
//! All interaction with hardware, storage and the radio happens through
//! **port traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
