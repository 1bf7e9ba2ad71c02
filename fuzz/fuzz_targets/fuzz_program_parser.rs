//! Fuzz target: `Program::parse`
//!
//! Arbitrary program text must either parse into a bounded, non-empty
//! program or fail with a typed error; it must never panic.
//!
//! cargo fuzz run fuzz_program_parser

#![no_main]

use chamber::program::{Program, ProgramSource, MAX_STEPS};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(program) = Program::parse(&text, ProgramSource::Storage) {
        assert!(!program.steps.is_empty(), "empty program accepted");
        assert!(program.steps.len() <= MAX_STEPS);
        assert!(program.step_unit_ms > 0, "zero step unit");
        for step in &program.steps {
            assert!(step.mask <= 0x0F);
        }
    }
});
