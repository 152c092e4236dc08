//! Drives one pipeline run from transcript path to result.

use super::{ExecutionContext, PipelineResult, PipelineRun, StageGraph};
use crate::agents::AgentFactory;
use crate::backend::ModelBackend;
use crate::cancellation::CancellationToken;
use crate::config::Settings;
use crate::errors::PodflowError;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::extract::ResultExtractor;
use crate::transcript::{JsonTranscriptLoader, TranscriptPayload, TranscriptSource};
use chrono::Local;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};

/// Runs the podcast pipeline.
///
/// Holds only read-only configuration, so one orchestrator can serve many
/// concurrent runs; each run owns its payload and slots.
pub struct PipelineOrchestrator {
    settings: Arc<Settings>,
    backend: Arc<dyn ModelBackend>,
    source: Arc<dyn TranscriptSource>,
    events: Arc<dyn EventSink>,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator reading JSON transcripts.
    #[must_use]
    pub fn new(settings: Settings, backend: Arc<dyn ModelBackend>) -> Self {
        Self {
            settings: Arc::new(settings),
            backend,
            source: Arc::new(JsonTranscriptLoader::new()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the transcript source.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn TranscriptSource>) -> Self {
        self.source = source;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the pipeline over the transcript at `path`.
    pub async fn run(&self, path: impl AsRef<Path>) -> Result<PipelineResult, PodflowError> {
        self.run_with_cancellation(path, &CancellationToken::new()).await
    }

    /// Runs the pipeline, giving up as soon as `cancel` fires.
    pub async fn run_with_cancellation(
        &self,
        path: impl AsRef<Path>,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PodflowError> {
        let path = path.as_ref();
        let mut run = PipelineRun::new(crate::agents::PIPELINE_NAME);
        run.start();

        let span = info_span!("pipeline_run", run_id = %run.id, path = %path.display());
        async {
            info!("Starting pipeline execution for dataset");
            self.emit(events::PIPELINE_STARTED, &run, json!({ "path": path.display().to_string() }))
                .await;

            match self.load_payload(path) {
                Ok(payload) => self.execute(&mut run, payload, cancel).await,
                Err(err) => {
                    self.finish_failed(&mut run, &err).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Runs the pipeline over an already rendered payload.
    pub async fn run_payload(
        &self,
        payload: TranscriptPayload,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PodflowError> {
        let mut run = PipelineRun::new(crate::agents::PIPELINE_NAME);
        run.start();

        let span = info_span!("pipeline_run", run_id = %run.id);
        async {
            self.emit(events::PIPELINE_STARTED, &run, Value::Null).await;
            if let Err(err) = self.settings.retry.validate() {
                let err = PodflowError::from(err);
                self.finish_failed(&mut run, &err).await;
                return Err(err);
            }
            self.execute(&mut run, payload, cancel).await
        }
        .instrument(span)
        .await
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        payload: TranscriptPayload,
        cancel: &CancellationToken,
    ) -> Result<PipelineResult, PodflowError> {
        info!(
            payload_len = payload.len(),
            fingerprint = %payload.fingerprint(),
            "Rendered transcript payload"
        );

        let outcome = match self.graph() {
            Ok(graph) => {
                run.set_stages(
                    graph
                        .stages()
                        .iter()
                        .filter(|spec| spec.is_scheduled())
                        .map(|spec| spec.name.clone()),
                );
                let ctx = ExecutionContext {
                    run_id: run.id,
                    payload,
                    backend: self.backend.clone(),
                    models: &self.settings.models,
                    retry: Arc::new(self.settings.retry.clone()),
                    strategy: self.settings.execution,
                    events: self.events.clone(),
                    cancel,
                };
                graph.execute(&ctx).await
            }
            Err(err) => Err(err),
        };

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.finish_failed(run, &err).await;
                return Err(err);
            }
        };

        let text = ResultExtractor::extract(&outcome.terminal);
        run.complete(outcome.slots.clone());
        info!(
            duration_ms = run.duration_ms().unwrap_or_default(),
            text_len = text.len(),
            "Pipeline execution completed successfully"
        );
        self.emit(events::PIPELINE_COMPLETED, run, json!({ "text_len": text.len() }))
            .await;

        Ok(PipelineResult {
            run_id: run.id,
            text,
            timestamp: Local::now(),
            response: outcome.terminal,
            slots: outcome.slots,
        })
    }

    fn load_payload(&self, path: &Path) -> Result<TranscriptPayload, PodflowError> {
        self.settings.retry.validate()?;
        let data = self.source.load(path)?;
        Ok(self.source.render(&data))
    }

    fn graph(&self) -> Result<StageGraph, PodflowError> {
        Ok(AgentFactory::new(self.settings.tiers).build()?)
    }

    async fn finish_failed(&self, run: &mut PipelineRun, err: &PodflowError) {
        run.fail(err.to_string());
        if matches!(err, PodflowError::Cancelled(_)) {
            info!(reason = %err, "Pipeline run cancelled");
            self.emit(events::PIPELINE_CANCELLED, run, json!({ "reason": err.to_string() }))
                .await;
        } else {
            error!(
                error = %err,
                stage = err.stage().unwrap_or_default(),
                fix_hint = err.fix_hint().unwrap_or_default(),
                "Pipeline execution failed"
            );
            let details = serde_json::to_value(err.to_dict()).unwrap_or(Value::Null);
            self.emit(events::PIPELINE_FAILED, run, details).await;
        }
    }

    async fn emit(&self, event_type: &str, run: &PipelineRun, extra: Value) {
        let mut data = run.to_dict();
        if let Value::Object(extra) = extra {
            data.extend(extra);
        }
        self.events
            .emit(event_type, serde_json::to_value(data).ok())
            .await;
    }
}

impl fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("backend", &self.backend.name())
            .field("execution", &self.settings.execution)
            .finish_non_exhaustive()
    }
}
