//! Pipeline lifecycle events.
//!
//! Every run publishes its lifecycle to the [`EventSink`] injected into
//! the orchestrator. Sinks are per orchestrator; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run has started.
pub const PIPELINE_STARTED: &str = "pipeline.started";
/// A run completed and produced its result.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// A run failed.
pub const PIPELINE_FAILED: &str = "pipeline.failed";
/// A run was cancelled by its caller.
pub const PIPELINE_CANCELLED: &str = "pipeline.cancelled";
/// A stage's instruction was rendered and sent.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage completed and wrote its slot.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A stage failed after retries.
pub const STAGE_FAILED: &str = "stage.failed";
