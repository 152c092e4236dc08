//! Gemini `generateContent` backend.
//!
//! Delegates are declared to the model as functions taking a single
//! `request` string. When the model calls one, the delegate runs locally
//! and its text is sent back as a function response; the exchange repeats
//! until the model answers without calling a function or the round limit
//! is reached.

use super::{CompletionRequest, Invocable, ModelBackend};
use crate::core::{Content, Part, ResponseElement, ResponseSequence};
use crate::errors::{BackendError, ConfigurationError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// API key variable.
pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
/// Optional endpoint override.
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";

/// Default API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const MAX_ERROR_BODY: usize = 512;

fn default_max_tool_rounds() -> usize {
    8
}

fn default_timeout_secs() -> u64 {
    300
}

/// Connection settings for [`GeminiBackend`].
#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key sent as `x-goog-api-key`.
    pub api_key: String,
    /// Endpoint root, without the `/v1beta` suffix.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Function-calling rounds allowed per completion.
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("max_tool_rounds", &self.max_tool_rounds)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GeminiConfig {
    /// Creates a config for the public endpoint.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: default_base_url(),
            max_tool_rounds: default_max_tool_rounds(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Reads the config from the process environment.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the config through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup(ENV_API_KEY)
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigurationError::missing(vec![ENV_API_KEY.to_string()]))?;
        let mut config = Self::new(api_key);
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|url| !url.trim().is_empty()) {
            config.base_url = base_url;
        }
        Ok(config)
    }

    /// Sets the endpoint root.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the function-calling round limit.
    #[must_use]
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

/// Backend calling the Gemini REST API.
pub struct GeminiBackend {
    config: GeminiConfig,
    http: reqwest::Client,
}

impl GeminiBackend {
    /// Creates a backend.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn endpoint(&self, model: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/v1beta/models/{model}:generateContent")
    }

    async fn generate(
        &self,
        model: &str,
        contents: &[Content],
        tools: &[Value],
    ) -> Result<Option<Content>, BackendError> {
        let body = GenerateRequest {
            contents,
            tools: tools.to_vec(),
        };

        let response = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError::fatal(format!("request to {model} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0);
                text.truncate(cut);
            }
            warn!(model, status_code = status.as_u16(), "Model call returned an error status");
            return Err(BackendError::transient(status.as_u16(), text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|err| BackendError::fatal(format!("invalid response from {model}: {err}")))?;
        Ok(parsed.candidates.into_iter().find_map(|candidate| candidate.content))
    }
}

/// Builds the tool list for a request.
fn tools_for(request: &CompletionRequest) -> Vec<Value> {
    let mut tools = Vec::new();
    if !request.delegates.is_empty() {
        let declarations: Vec<Value> = request
            .delegates
            .iter()
            .map(|delegate| {
                json!({
                    "name": delegate.name(),
                    "description": delegate.description(),
                    "parameters": {
                        "type": "OBJECT",
                        "properties": {
                            "request": {
                                "type": "STRING",
                                "description": "What the tool should focus on."
                            }
                        }
                    }
                })
            })
            .collect();
        tools.push(json!({ "functionDeclarations": declarations }));
    }
    if request.grounded_search {
        tools.push(json!({ "googleSearch": {} }));
    }
    tools
}

fn request_text(args: &Value) -> String {
    match args.get("request") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None if args.is_null() => String::new(),
        None => args.to_string(),
    }
}

async fn call_delegate(
    delegate: Option<&Arc<dyn Invocable>>,
    name: &str,
    args: &Value,
) -> Result<Value, BackendError> {
    let Some(delegate) = delegate else {
        warn!(tool = name, "Model called an unknown tool");
        return Ok(json!({ "error": format!("unknown tool '{name}'") }));
    };
    let result = delegate.invoke(&request_text(args)).await?;
    Ok(json!({ "result": result }))
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ResponseSequence, BackendError> {
        let tools = tools_for(request);
        let mut contents = vec![Content::new("user", vec![Part::text(&request.instruction)])];
        let mut sequence = ResponseSequence::new();

        debug!(
            stage = %request.stage,
            model = %request.model,
            tools = tools.len(),
            "Sending generateContent request"
        );

        for round in 0..=self.config.max_tool_rounds {
            let Some(content) = self.generate(&request.model, &contents, &tools).await? else {
                warn!(stage = %request.stage, round, "Model returned no candidates");
                break;
            };

            let calls: Vec<_> = content
                .parts
                .iter()
                .filter_map(|part| part.function_call.clone())
                .collect();
            sequence.push(ResponseElement::new(&request.stage, content.clone()));
            contents.push(content);

            if calls.is_empty() {
                break;
            }
            if round == self.config.max_tool_rounds {
                warn!(
                    stage = %request.stage,
                    rounds = self.config.max_tool_rounds,
                    "Tool round limit reached; returning partial response"
                );
                break;
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                trace!(stage = %request.stage, tool = %call.name, "Invoking delegate");
                let result = call_delegate(request.delegate(&call.name), &call.name, &call.args).await?;
                responses.push(Part::function_response(&call.name, result));
            }
            let reply = Content::new("user", responses);
            sequence.push(ResponseElement::new(&request.stage, reply.clone()));
            contents.push(reply);
        }

        Ok(sequence)
    }
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
