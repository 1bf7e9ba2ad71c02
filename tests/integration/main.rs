//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific flow against
//! mock adapters.  All tests run on the host with no real hardware
//! required.

mod mock_hw;
mod run_flow_tests;
mod sync_flow_tests;
