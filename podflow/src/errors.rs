//! Error types for the podflow pipeline.
//!
//! Every failure a run can surface is one of the kinds below. No stage
//! swallows an error: each one aborts the run and reaches the caller with
//! the stage name and cause attached.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for podflow operations.
#[derive(Debug, Error)]
pub enum PodflowError {
    /// Required settings were missing or invalid.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The transcript could not be loaded.
    #[error("{0}")]
    Dataset(#[from] DatasetError),

    /// A stage references a slot or delegate that is not declared before it.
    #[error("{0}")]
    Wiring(#[from] DependencyWiringError),

    /// A stage failed after retries were exhausted (or without retry).
    #[error("{0}")]
    Execution(#[from] PipelineExecutionError),

    /// The run was abandoned by its caller.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),
}

impl PodflowError {
    /// Returns true if the transcript path did not resolve.
    #[must_use]
    pub fn is_dataset_not_found(&self) -> bool {
        matches!(self, Self::Dataset(DatasetError::NotFound { .. }))
    }

    /// Returns the name of the failing stage, if the error came from one.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Execution(err) => Some(&err.stage),
            Self::Wiring(err) => Some(&err.stage),
            _ => None,
        }
    }

    /// Returns a hint for fixing a wiring error.
    #[must_use]
    pub fn fix_hint(&self) -> Option<&'static str> {
        match self {
            Self::Wiring(err) => Some(err.fix_hint()),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self {
            Self::Configuration(_) => "ConfigurationError",
            Self::Dataset(DatasetError::NotFound { .. }) => "DatasetNotFound",
            Self::Dataset(_) => "DatasetError",
            Self::Wiring(_) => "DependencyWiringError",
            Self::Execution(_) => "PipelineExecutionError",
            Self::Cancelled(_) => "Cancelled",
        };

        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        if let Some(hint) = self.fix_hint() {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        map
    }
}

/// Error raised when settings are missing or invalid.
#[derive(Debug, Clone, Error)]
#[error("Configuration error: {message}")]
pub struct ConfigurationError {
    /// The error message.
    pub message: String,
    /// Names of the settings involved.
    pub keys: Vec<String>,
}

impl ConfigurationError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            keys: Vec::new(),
        }
    }

    /// Creates an error listing every missing required setting.
    #[must_use]
    pub fn missing(keys: Vec<String>) -> Self {
        Self {
            message: format!("Missing required environment variables: {}", keys.join(", ")),
            keys,
        }
    }

    /// Sets the keys involved.
    #[must_use]
    pub fn with_keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }
}

/// Errors raised while loading a transcript.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The transcript path does not resolve.
    #[error("Transcript file not found: {}", path.display())]
    NotFound {
        /// The requested path.
        path: PathBuf,
    },

    /// The file exists but is not valid structured data.
    #[error("Transcript file {} is not valid JSON: {reason}", path.display())]
    Format {
        /// The requested path.
        path: PathBuf,
        /// The parser's explanation.
        reason: String,
    },

    /// The file could not be read.
    #[error("Failed to read transcript {}: {source}", path.display())]
    Io {
        /// The requested path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors returned by the model backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// A failure carrying a status code. Retried when the retry policy lists the code.
    #[error("Backend returned status {status_code}: {message}")]
    Transient {
        /// The status code reported by the backend.
        status_code: u16,
        /// The backend's message.
        message: String,
    },

    /// A failure that is never retried.
    #[error("Backend failure: {message}")]
    Fatal {
        /// The backend's message.
        message: String,
    },

    /// A delegate failed after its own retries. Never retried again by the
    /// calling stage.
    #[error("Delegate '{tool}' failed: {cause}")]
    Delegate {
        /// The delegate that failed.
        tool: String,
        /// The delegate's last failure.
        #[source]
        cause: Box<BackendError>,
    },
}

impl BackendError {
    /// Creates a status-coded failure.
    #[must_use]
    pub fn transient(status_code: u16, message: impl Into<String>) -> Self {
        Self::Transient {
            status_code,
            message: message.into(),
        }
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Wraps the final failure of a delegate.
    #[must_use]
    pub fn delegate(tool: impl Into<String>, cause: BackendError) -> Self {
        Self::Delegate {
            tool: tool.into(),
            cause: Box::new(cause),
        }
    }

    /// Returns the status code, if the failure carries one.
    ///
    /// Delegate failures report none, so a retry policy treats them as final.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transient { status_code, .. } => Some(*status_code),
            Self::Fatal { .. } | Self::Delegate { .. } => None,
        }
    }
}

/// The specific wiring mistake found while building the stage list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WiringFault {
    /// A template reads a slot that no earlier stage declares.
    UndeclaredSlot,
    /// Two stages declare the same output slot.
    DuplicateSlot,
    /// A delegate names a stage that is not defined yet.
    UnknownDelegate,
    /// Two stages share a name.
    DuplicateStage,
    /// A delegate-only or delegated stage reads an output slot.
    DelegateReadsSlot,
    /// No stage is scheduled for execution.
    EmptyPipeline,
}

impl WiringFault {
    /// Returns a short code for the fault.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UndeclaredSlot => "WIRING-UNDECLARED_SLOT",
            Self::DuplicateSlot => "WIRING-DUPLICATE_SLOT",
            Self::UnknownDelegate => "WIRING-UNKNOWN_DELEGATE",
            Self::DuplicateStage => "WIRING-DUPLICATE_STAGE",
            Self::DelegateReadsSlot => "WIRING-DELEGATE_READS_SLOT",
            Self::EmptyPipeline => "WIRING-EMPTY",
        }
    }

    /// Returns a hint for fixing the fault.
    #[must_use]
    pub fn fix_hint(&self) -> &'static str {
        match self {
            Self::UndeclaredSlot => {
                "Add the stage that declares this slot before the stage that reads it."
            }
            Self::DuplicateSlot => "Give each stage's output slot a distinct name.",
            Self::UnknownDelegate => {
                "Define delegate stages before the stage that invokes them."
            }
            Self::DuplicateStage => "Rename one of the stages.",
            Self::DelegateReadsSlot => {
                "Delegate stages are rendered from the transcript payload only."
            }
            Self::EmptyPipeline => "Add at least one stage to the pipeline before building.",
        }
    }
}

impl fmt::Display for WiringFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Error raised when a stage references something that is not declared before it.
///
/// Always detected while the stage list is built, never during a run.
#[derive(Debug, Clone, Error)]
#[error("Dependency wiring error in stage '{stage}': {fault} '{reference}'")]
pub struct DependencyWiringError {
    /// The stage whose definition is invalid.
    pub stage: String,
    /// The slot, delegate or stage name at fault.
    pub reference: String,
    /// What went wrong.
    pub fault: WiringFault,
}

impl DependencyWiringError {
    /// Creates a new wiring error.
    #[must_use]
    pub fn new(stage: impl Into<String>, reference: impl Into<String>, fault: WiringFault) -> Self {
        Self {
            stage: stage.into(),
            reference: reference.into(),
            fault,
        }
    }

    /// Returns a hint for fixing the error.
    #[must_use]
    pub fn fix_hint(&self) -> &'static str {
        self.fault.fix_hint()
    }
}

/// Error raised when a stage fails during a run.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {cause}")]
pub struct PipelineExecutionError {
    /// The failing stage.
    pub stage: String,
    /// The backend failure that ended the stage.
    #[source]
    pub cause: BackendError,
}

impl PipelineExecutionError {
    /// Creates a new execution error.
    #[must_use]
    pub fn new(stage: impl Into<String>, cause: BackendError) -> Self {
        Self {
            stage: stage.into(),
            cause,
        }
    }
}
