//! Scripted model backend for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{CompletionRequest, ModelBackend};
use crate::core::{Content, ModelTier, Part, ResponseElement, ResponseSequence};
use crate::errors::BackendError;

/// Hook run when a stage's call is received.
pub type CallHook = Arc<dyn Fn(&CompletionRequest) + Send + Sync>;

/// A completion call as seen by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// The calling stage.
    pub stage: String,
    /// The resolved model id.
    pub model: String,
    /// The stage tier.
    pub tier: ModelTier,
    /// The rendered instruction.
    pub instruction: String,
    /// Names of the delegates handed to the call.
    pub delegates: Vec<String>,
    /// Whether web search was enabled.
    pub grounded_search: bool,
}

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Echo,
    Sequence(ResponseSequence),
}

#[derive(Default)]
struct Script {
    reply: Option<Reply>,
    failures: VecDeque<BackendError>,
    delay: Option<Duration>,
    delegate_calls: Vec<(String, String)>,
    hook: Option<CallHook>,
}

/// A backend that answers each stage from a script.
///
/// Each stage can return fixed text, echo its instruction, or return a
/// custom response sequence. Scripted failures are returned, in order,
/// before the reply. Calls for stages without a script fail fatally.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, stage: &str, update: impl FnOnce(&mut Script)) -> Self {
        update(self.scripts.lock().entry(stage.to_string()).or_default());
        self
    }

    /// Answers `stage` with fixed text.
    #[must_use]
    pub fn with_response(self, stage: &str, text: impl Into<String>) -> Self {
        let text = text.into();
        self.script(stage, |script| script.reply = Some(Reply::Text(text)))
    }

    /// Answers `stage` with its own instruction.
    #[must_use]
    pub fn with_echo(self, stage: &str) -> Self {
        self.script(stage, |script| script.reply = Some(Reply::Echo))
    }

    /// Answers `stage` with a custom response sequence.
    #[must_use]
    pub fn with_sequence(self, stage: &str, sequence: ResponseSequence) -> Self {
        self.script(stage, |script| script.reply = Some(Reply::Sequence(sequence)))
    }

    /// Fails the next calls for `stage` with these errors, in order.
    #[must_use]
    pub fn with_failures(self, stage: &str, failures: Vec<BackendError>) -> Self {
        self.script(stage, |script| script.failures.extend(failures))
    }

    /// Delays every call for `stage`.
    #[must_use]
    pub fn with_delay(self, stage: &str, delay: Duration) -> Self {
        self.script(stage, |script| script.delay = Some(delay))
    }

    /// Makes `stage` invoke a delegate before replying, as a model would.
    #[must_use]
    pub fn with_delegate_call(self, stage: &str, tool: &str, request: &str) -> Self {
        let call = (tool.to_string(), request.to_string());
        self.script(stage, |script| script.delegate_calls.push(call))
    }

    /// Runs `hook` whenever a call for `stage` is received.
    #[must_use]
    pub fn with_hook(
        self,
        stage: &str,
        hook: impl Fn(&CompletionRequest) + Send + Sync + 'static,
    ) -> Self {
        let hook: CallHook = Arc::new(hook);
        self.script(stage, |script| script.hook = Some(hook))
    }

    /// Returns every recorded call, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the recorded calls for one stage.
    #[must_use]
    pub fn calls_for(&self, stage: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.stage == stage)
            .cloned()
            .collect()
    }

    /// Returns the last instruction received for a stage.
    #[must_use]
    pub fn last_instruction(&self, stage: &str) -> Option<String> {
        self.calls_for(stage).pop().map(|call| call.instruction)
    }

    /// Returns the total number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the stages in the order their calls arrived.
    #[must_use]
    pub fn call_order(&self) -> Vec<String> {
        self.calls.lock().iter().map(|call| call.stage.clone()).collect()
    }
}

impl fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("stages", &self.scripts.lock().keys().cloned().collect::<Vec<_>>())
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ResponseSequence, BackendError> {
        self.calls.lock().push(RecordedCall {
            stage: request.stage.clone(),
            model: request.model.clone(),
            tier: request.tier,
            instruction: request.instruction.clone(),
            delegates: request.delegates.iter().map(|d| d.name().to_string()).collect(),
            grounded_search: request.grounded_search,
        });

        let (reply, failure, delay, delegate_calls, hook) = {
            let mut scripts = self.scripts.lock();
            let Some(script) = scripts.get_mut(&request.stage) else {
                return Err(BackendError::fatal(format!(
                    "no script for stage '{}'",
                    request.stage
                )));
            };
            (
                script.reply.clone(),
                script.failures.pop_front(),
                script.delay,
                script.delegate_calls.clone(),
                script.hook.clone(),
            )
        };

        if let Some(hook) = hook {
            hook(request);
        }
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = failure {
            return Err(failure);
        }

        let mut sequence = ResponseSequence::new();
        for (tool, tool_request) in delegate_calls {
            let delegate = request.delegate(&tool).ok_or_else(|| {
                BackendError::fatal(format!("stage '{}' has no delegate '{tool}'", request.stage))
            })?;
            let args = serde_json::json!({ "request": tool_request });
            sequence.push(ResponseElement::new(
                &request.stage,
                Content::new("model", vec![Part::function_call(&tool, args)]),
            ));
            let result = delegate.invoke(&tool_request).await?;
            sequence.push(ResponseElement::new(
                &request.stage,
                Content::new(
                    "user",
                    vec![Part::function_response(&tool, serde_json::json!({ "result": result }))],
                ),
            ));
        }

        match reply {
            Some(Reply::Text(text)) => sequence.push(ResponseElement::text(&request.stage, text)),
            Some(Reply::Echo) => {
                sequence.push(ResponseElement::text(&request.stage, &request.instruction));
            }
            Some(Reply::Sequence(custom)) => sequence.0.extend(custom.0),
            None => {}
        }
        Ok(sequence)
    }
}
