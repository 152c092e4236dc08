//! Testing utilities for podflow pipelines.
//!
//! This module provides:
//! - A scripted model backend that records every call
//! - Sample transcripts and settings
//! - Assertions for run outcomes

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_instruction_contains, assert_stage_failed, assert_wiring_fault};
pub use fixtures::{
    podcast_backend, sample_payload, sample_transcript, test_settings, write_transcript,
};
pub use mocks::{CallHook, RecordedCall, ScriptedBackend};
