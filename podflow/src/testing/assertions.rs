//! Test assertions for pipeline runs.

use super::ScriptedBackend;
use crate::errors::{PodflowError, WiringFault};

/// Asserts that the last instruction sent for `stage` contains `needle`.
pub fn assert_instruction_contains(backend: &ScriptedBackend, stage: &str, needle: &str) {
    let instruction = backend
        .last_instruction(stage)
        .unwrap_or_else(|| panic!("Expected a call for stage '{stage}', none was recorded"));
    assert!(
        instruction.contains(needle),
        "Expected instruction for '{stage}' to contain {needle:?}, got: {instruction}"
    );
}

/// Asserts that the run failed while executing `stage`.
pub fn assert_stage_failed(err: &PodflowError, stage: &str) {
    match err {
        PodflowError::Execution(inner) => assert_eq!(
            inner.stage, stage,
            "Expected stage '{stage}' to fail, got '{}'",
            inner.stage
        ),
        other => panic!("Expected an execution failure in '{stage}', got: {other}"),
    }
}

/// Asserts that the run failed with a wiring fault.
pub fn assert_wiring_fault(err: &PodflowError, fault: WiringFault) {
    match err {
        PodflowError::Wiring(inner) => assert_eq!(
            inner.fault, fault,
            "Expected wiring fault {fault:?}, got {:?}",
            inner.fault
        ),
        other => panic!("Expected a wiring error, got: {other}"),
    }
}
