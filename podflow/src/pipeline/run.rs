//! Run records and results.

use super::OutputSlots;
use crate::core::{ResponseSequence, RunStatus};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

/// Format of [`PipelineResult::timestamp_label`].
pub const TIMESTAMP_LABEL_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One execution of the pipeline.
///
/// Created per call to `run` and dropped once the caller has the result;
/// nothing in it outlives the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run id.
    pub id: Uuid,
    /// The pipeline being run.
    pub pipeline: String,
    /// Current lifecycle state.
    pub status: RunStatus,
    /// Scheduled stages in insertion order.
    pub stages: Vec<String>,
    /// Slots populated so far.
    pub slots: OutputSlots,
    /// When the run started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Why the run failed.
    pub error: Option<String>,
}

impl PipelineRun {
    /// Creates a run in the `Created` state.
    #[must_use]
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            status: RunStatus::Created,
            stages: Vec::new(),
            slots: OutputSlots::new(),
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: RunStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            warn!(run_id = %self.id, from = %self.status, to = %next, "Ignored illegal run transition");
            false
        }
    }

    /// Moves the run to `Running`.
    pub fn start(&mut self) -> bool {
        let moved = self.transition(RunStatus::Running);
        if moved {
            self.started_at = Some(Utc::now());
        }
        moved
    }

    /// Records the scheduled stage list.
    pub fn set_stages(&mut self, stages: impl IntoIterator<Item = impl Into<String>>) {
        self.stages = stages.into_iter().map(Into::into).collect();
    }

    /// Moves the run to `Completed` with its populated slots.
    pub fn complete(&mut self, slots: OutputSlots) -> bool {
        let moved = self.transition(RunStatus::Completed);
        if moved {
            self.slots = slots;
            self.finished_at = Some(Utc::now());
        }
        moved
    }

    /// Moves the run to `Failed`.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        let moved = self.transition(RunStatus::Failed);
        if moved {
            self.error = Some(error.into());
            self.finished_at = Some(Utc::now());
        }
        moved
    }

    /// Returns the run duration in milliseconds, once finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        Some((self.finished_at? - self.started_at?).num_milliseconds())
    }

    /// Converts the run to a dictionary for event payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("run_id".to_string(), serde_json::json!(self.id.to_string()));
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("status".to_string(), serde_json::json!(self.status));
        map.insert("stages".to_string(), serde_json::json!(self.stages));
        if let Some(duration) = self.duration_ms() {
            map.insert("duration_ms".to_string(), serde_json::json!(duration));
        }
        if let Some(ref error) = self.error {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        map
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The run that produced this result.
    pub run_id: Uuid,
    /// Text extracted from the terminal response; possibly empty.
    pub text: String,
    /// When the result was produced, in local time.
    pub timestamp: DateTime<Local>,
    /// The terminal stage's raw response.
    pub response: ResponseSequence,
    /// Every slot populated during the run.
    pub slots: OutputSlots,
}

impl PipelineResult {
    /// Returns the timestamp as `YYYYMMDD_HHMMSS`.
    #[must_use]
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format(TIMESTAMP_LABEL_FORMAT).to_string()
    }

    /// Returns true if the terminal stage produced no text.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
