//! # Podflow
//!
//! A multi-stage language-model pipeline that turns a podcast transcript
//! into a fact-checked analysis.
//!
//! A run loads a JSON transcript, renders it to a payload and executes
//! three scheduled stages:
//!
//! - **summarize** and **key_insights** read the payload independently and
//!   write the `summary` and `insights` slots
//! - **fact_check** reads both slots and may call the other stages, plus a
//!   delegate-only **search** stage, as tools
//!
//! The text of the final stage's response is the run's result.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use podflow::prelude::*;
//!
//! let settings = Settings::from_env()?;
//! let backend = Arc::new(GeminiBackend::new(GeminiConfig::from_env()?));
//! let orchestrator = PipelineOrchestrator::new(settings, backend);
//!
//! let result = orchestrator.run("data/input/ep001_remote_work.json").await?;
//! println!("{}", result.text);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod agents;
pub mod backend;
pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod extract;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod transcript;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::agents::{AgentFactory, PIPELINE_NAME};
    #[cfg(feature = "gemini")]
    pub use crate::backend::{GeminiBackend, GeminiConfig};
    pub use crate::backend::{CompletionRequest, Invocable, ModelBackend, StageTool};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{EnvFile, Settings, StageTiers};
    pub use crate::core::{ModelCatalog, ModelTier, ResponseSequence, RunStatus};
    pub use crate::errors::{
        BackendError, ConfigurationError, DatasetError, DependencyWiringError,
        PipelineExecutionError, PodflowError, WiringFault,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::extract::ResultExtractor;
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::pipeline::{
        ExecutionStrategy, PipelineBuilder, PipelineOrchestrator, PipelineResult,
        RetryPolicy, StageGraph, StageSpec,
    };
    pub use crate::transcript::{JsonTranscriptLoader, TranscriptPayload, TranscriptSource};
    pub use std::sync::Arc;
}
