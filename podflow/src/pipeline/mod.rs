//! Pipeline building and execution.
//!
//! This module provides:
//! - Stage specifications and prompt templates
//! - A builder that validates slot and delegate wiring
//! - The layered stage graph and its executor
//! - The retry policy applied to every model call
//! - The orchestrator driving one run from transcript to result

mod builder;
mod graph;
mod orchestrator;
mod retry;
mod run;
mod slots;
mod spec;
mod template;

#[cfg(test)]
mod integration_tests;

pub use builder::PipelineBuilder;
pub use graph::{ExecutionContext, ExecutionStrategy, GraphOutcome, StageGraph};
pub use orchestrator::PipelineOrchestrator;
pub use retry::{RetryDecision, RetryPolicy};
pub use run::{PipelineResult, PipelineRun, TIMESTAMP_LABEL_FORMAT};
pub use slots::{OutputSlots, SlotConflictError};
pub use spec::{StageRole, StageSpec};
pub use template::{PromptTemplate, PAYLOAD_PLACEHOLDER};
