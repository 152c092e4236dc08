//! The language-model backend seam.
//!
//! The orchestrator treats the model as a black box: it sends a rendered
//! instruction for a tier and receives a response sequence or a failure.
//! Delegate capabilities travel with the request; the backend decides
//! whether and when to invoke them.

#[cfg(feature = "gemini")]
mod gemini;
mod tool;

#[cfg(feature = "gemini")]
pub use gemini::{GeminiBackend, GeminiConfig};
pub use tool::StageTool;

use crate::core::{ModelTier, ResponseSequence};
use crate::errors::BackendError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A capability a stage may invoke during its own execution.
///
/// The set handed to a stage is fixed when the stage is prepared.
#[async_trait]
pub trait Invocable: Send + Sync + Debug {
    /// Returns the tool name the model uses to call this capability.
    fn name(&self) -> &str;

    /// Returns a one-line description shown to the model.
    fn description(&self) -> &str;

    /// Invokes the capability with a free-text request and returns its text.
    async fn invoke(&self, request: &str) -> Result<String, BackendError>;
}

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The stage issuing the call.
    pub stage: String,
    /// The concrete model id resolved from the tier.
    pub model: String,
    /// The tier the stage runs on.
    pub tier: ModelTier,
    /// The fully rendered instruction.
    pub instruction: String,
    /// Capabilities the model may invoke while answering.
    pub delegates: Vec<Arc<dyn Invocable>>,
    /// Whether the model may use web search.
    pub grounded_search: bool,
}

impl CompletionRequest {
    /// Creates a request with no delegates.
    #[must_use]
    pub fn new(
        stage: impl Into<String>,
        model: impl Into<String>,
        tier: ModelTier,
        instruction: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            model: model.into(),
            tier,
            instruction: instruction.into(),
            delegates: Vec::new(),
            grounded_search: false,
        }
    }

    /// Sets the delegates.
    #[must_use]
    pub fn with_delegates(mut self, delegates: Vec<Arc<dyn Invocable>>) -> Self {
        self.delegates = delegates;
        self
    }

    /// Sets web-search access.
    #[must_use]
    pub fn with_grounded_search(mut self, enabled: bool) -> Self {
        self.grounded_search = enabled;
        self
    }

    /// Finds a delegate by tool name.
    #[must_use]
    pub fn delegate(&self, name: &str) -> Option<&Arc<dyn Invocable>> {
        self.delegates.iter().find(|delegate| delegate.name() == name)
    }
}

/// Trait for language-model backends.
///
/// Implementations report failures carrying a status code as
/// [`BackendError::Transient`] and everything else as
/// [`BackendError::Fatal`]; retrying is the caller's concern.
#[async_trait]
pub trait ModelBackend: Send + Sync + Debug {
    /// Returns the backend name, for logs.
    fn name(&self) -> &str;

    /// Completes one instruction.
    async fn complete(&self, request: &CompletionRequest) -> Result<ResponseSequence, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Named(&'static str);

    #[async_trait]
    impl Invocable for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test capability"
        }

        async fn invoke(&self, request: &str) -> Result<String, BackendError> {
            Ok(format!("{}:{request}", self.0))
        }
    }

    #[tokio::test]
    async fn test_request_delegate_lookup() {
        let request = CompletionRequest::new("fact_check", "model", ModelTier::Pro, "verify")
            .with_delegates(vec![Arc::new(Named("summarize")), Arc::new(Named("search"))]);

        let delegate = request.delegate("search").unwrap();
        assert_eq!(delegate.invoke("q").await.unwrap(), "search:q");
        assert!(request.delegate("missing").is_none());
        assert!(!request.grounded_search);
    }
}
