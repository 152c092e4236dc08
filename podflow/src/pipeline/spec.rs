//! Stage specifications.

use super::PromptTemplate;
use crate::core::ModelTier;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a stage participates in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    /// Scheduled by the orchestrator in dependency order.
    #[default]
    Sequence,
    /// Never scheduled; only exposed as a tool to stages that delegate to it.
    Delegate,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Delegate => write!(f, "delegate"),
        }
    }
}

/// Specification for a single stage in a pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// The unique name of the stage.
    pub name: String,
    /// One-line description, shown to models that may invoke the stage as a tool.
    pub description: String,
    /// The model tier the stage runs on.
    pub tier: ModelTier,
    /// The instruction template.
    pub template: PromptTemplate,
    /// The slot this stage's text is written to, if any.
    pub output_slot: Option<String>,
    /// Stages this stage may invoke as tools, in declaration order.
    pub delegates: Vec<String>,
    /// Whether the stage is scheduled or delegate-only.
    pub role: StageRole,
    /// Whether the backend should give the stage access to web search.
    pub grounded_search: bool,
}

impl StageSpec {
    /// Creates a new stage specification.
    #[must_use]
    pub fn new(name: impl Into<String>, tier: ModelTier, template: impl Into<PromptTemplate>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tier,
            template: template.into(),
            output_slot: None,
            delegates: Vec::new(),
            role: StageRole::Sequence,
            grounded_search: false,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declares the slot the stage writes.
    #[must_use]
    pub fn with_output_slot(mut self, slot: impl Into<String>) -> Self {
        self.output_slot = Some(slot.into());
        self
    }

    /// Adds a delegate.
    #[must_use]
    pub fn with_delegate(mut self, stage: impl Into<String>) -> Self {
        let stage = stage.into();
        if !self.delegates.contains(&stage) {
            self.delegates.push(stage);
        }
        self
    }

    /// Sets the delegates.
    #[must_use]
    pub fn with_delegates(mut self, stages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.delegates.clear();
        for stage in stages {
            self = self.with_delegate(stage);
        }
        self
    }

    /// Marks the stage as delegate-only.
    #[must_use]
    pub fn delegate_only(mut self) -> Self {
        self.role = StageRole::Delegate;
        self
    }

    /// Enables web search for the stage.
    #[must_use]
    pub fn with_grounded_search(mut self) -> Self {
        self.grounded_search = true;
        self
    }

    /// Returns the slots the stage reads.
    #[must_use]
    pub fn reads(&self) -> &[String] {
        self.template.slot_refs()
    }

    /// Returns true if the stage is scheduled by the orchestrator.
    #[must_use]
    pub fn is_scheduled(&self) -> bool {
        self.role == StageRole::Sequence
    }
}
