//! Stages exposed as invocable tools.

use super::{CompletionRequest, Invocable, ModelBackend};
use crate::errors::BackendError;
use crate::extract::ResultExtractor;
use crate::pipeline::RetryPolicy;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info_span, Instrument};

/// A stage wrapped as a capability another stage can call.
///
/// The stage's instruction is rendered once, when the tool is prepared;
/// each invocation appends the caller's request and runs one completion
/// under the shared retry policy.
pub struct StageTool {
    name: String,
    description: String,
    instruction: String,
    request: CompletionRequest,
    backend: Arc<dyn ModelBackend>,
    retry: Arc<RetryPolicy>,
}

impl StageTool {
    /// Creates a tool from a prepared completion request.
    ///
    /// `request.instruction` is the stage's rendered instruction; the
    /// caller's text is appended on every invocation.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        request: CompletionRequest,
        backend: Arc<dyn ModelBackend>,
        retry: Arc<RetryPolicy>,
    ) -> Self {
        Self {
            name: request.stage.clone(),
            description: description.into(),
            instruction: request.instruction.clone(),
            request,
            backend,
            retry,
        }
    }

    fn instruction_for(&self, request: &str) -> String {
        let request = request.trim();
        if request.is_empty() {
            self.instruction.clone()
        } else {
            format!("{}\n\nRequest: {request}", self.instruction)
        }
    }
}

impl fmt::Debug for StageTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageTool")
            .field("name", &self.name)
            .field("model", &self.request.model)
            .field("delegates", &self.request.delegates.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Invocable for StageTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, request: &str) -> Result<String, BackendError> {
        let mut call = self.request.clone();
        call.instruction = self.instruction_for(request);

        let span = info_span!("delegate", tool = %self.name, model = %call.model);
        async {
            debug!(request_len = request.len(), "Invoking delegate stage");
            let response = self
                .retry
                .execute(&self.name, || self.backend.complete(&call))
                .await
                .map_err(|cause| BackendError::delegate(&self.name, cause))?;
            Ok(ResultExtractor::extract(&response))
        }
        .instrument(span)
        .await
    }
}
