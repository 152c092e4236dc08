//! Stage graph execution.
//!
//! Sequence stages are layered by their slot dependencies: a stage that
//! reads no slot sits in the first layer, and every other stage sits one
//! layer below the deepest stage whose slot it reads. A layer only starts
//! once every stage of the previous layer has written its slot, so no
//! template is ever rendered against a missing value.

use super::{OutputSlots, RetryPolicy, StageSpec};
use crate::backend::{CompletionRequest, Invocable, ModelBackend, StageTool};
use crate::cancellation::CancellationToken;
use crate::core::{ModelCatalog, ResponseSequence};
use crate::errors::{DependencyWiringError, PipelineExecutionError, PodflowError, WiringFault};
use crate::events::{self, EventSink};
use crate::extract::ResultExtractor;
use crate::observability::StageTimer;
use crate::transcript::TranscriptPayload;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How the stages of one layer are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// Stages of a layer run as joined futures on the caller's task.
    #[default]
    Concurrent,
    /// Stages run one at a time in the order they were added.
    Sequential,
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concurrent => write!(f, "concurrent"),
            Self::Sequential => write!(f, "sequential"),
        }
    }
}

impl FromStr for ExecutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "concurrent" | "parallel" => Ok(Self::Concurrent),
            "sequential" | "sequence" => Ok(Self::Sequential),
            other => Err(format!("unknown execution strategy '{other}'")),
        }
    }
}

/// Everything a graph needs to execute one run.
#[derive(Clone)]
pub struct ExecutionContext<'a> {
    /// The run being executed.
    pub run_id: Uuid,
    /// The transcript payload.
    pub payload: TranscriptPayload,
    /// The model backend.
    pub backend: Arc<dyn ModelBackend>,
    /// Model id per tier.
    pub models: &'a ModelCatalog,
    /// Retry policy for every model call.
    pub retry: Arc<RetryPolicy>,
    /// Layer scheduling.
    pub strategy: ExecutionStrategy,
    /// Lifecycle event sink.
    pub events: Arc<dyn EventSink>,
    /// The caller's cancellation token.
    pub cancel: &'a CancellationToken,
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("run_id", &self.run_id)
            .field("payload", &self.payload)
            .field("backend", &self.backend.name())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

/// What a completed graph produced.
#[derive(Debug, Clone)]
pub struct GraphOutcome {
    /// Every populated slot.
    pub slots: OutputSlots,
    /// The raw response of the terminal stage.
    pub terminal: ResponseSequence,
}

struct StageOutcome {
    index: usize,
    text: String,
    response: ResponseSequence,
}

/// A validated set of stages ready to execute.
///
/// Built by [`super::PipelineBuilder`]; immutable and reusable across runs.
#[derive(Debug, Clone)]
pub struct StageGraph {
    name: String,
    stages: Vec<StageSpec>,
    index: HashMap<String, usize>,
    layers: Vec<Vec<usize>>,
    terminal: usize,
}

impl StageGraph {
    /// Creates a graph from stages already validated by the builder.
    pub(crate) fn new(name: String, stages: Vec<StageSpec>) -> Self {
        let index: HashMap<String, usize> = stages
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.name.clone(), i))
            .collect();

        let mut producers: HashMap<&str, usize> = HashMap::new();
        let mut levels: HashMap<usize, usize> = HashMap::new();
        let mut layers: Vec<Vec<usize>> = Vec::new();
        let mut terminal = 0;

        for (i, spec) in stages.iter().enumerate().filter(|(_, s)| s.is_scheduled()) {
            let level = spec
                .reads()
                .iter()
                .filter_map(|slot| producers.get(slot.as_str()))
                .filter_map(|producer| levels.get(producer))
                .map(|level| level + 1)
                .max()
                .unwrap_or(0);

            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(i);
            levels.insert(i, level);
            if let Some(slot) = &spec.output_slot {
                producers.insert(slot.as_str(), i);
            }
            terminal = i;
        }

        Self {
            name,
            stages,
            index,
            layers,
            terminal,
        }
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages, delegate-only stages included.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns every stage in insertion order.
    #[must_use]
    pub fn stages(&self) -> &[StageSpec] {
        &self.stages
    }

    /// Looks up a stage by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageSpec> {
        self.index.get(name).map(|&i| &self.stages[i])
    }

    /// Returns the stage names of each layer.
    #[must_use]
    pub fn layers(&self) -> Vec<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|&i| self.stages[i].name.as_str()).collect())
            .collect()
    }

    /// Returns the stage whose response is the run's result.
    #[must_use]
    pub fn terminal(&self) -> &StageSpec {
        &self.stages[self.terminal]
    }

    fn schedule(&self, strategy: ExecutionStrategy) -> Vec<Vec<usize>> {
        match strategy {
            ExecutionStrategy::Concurrent => self.layers.clone(),
            ExecutionStrategy::Sequential => self
                .stages
                .iter()
                .enumerate()
                .filter(|(_, spec)| spec.is_scheduled())
                .map(|(i, _)| vec![i])
                .collect(),
        }
    }

    /// Executes every sequence stage and returns the populated slots.
    ///
    /// Slots written by a layer become visible only once the whole layer
    /// has succeeded. The first stage failure, or a cancellation, ends the
    /// run and drops the stages still in flight.
    pub async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<GraphOutcome, PodflowError> {
        let mut slots = OutputSlots::new();
        let mut terminal = None;

        for (depth, layer) in self.schedule(ctx.strategy).into_iter().enumerate() {
            ctx.cancel.check()?;
            debug!(
                pipeline = %self.name,
                run_id = %ctx.run_id,
                depth,
                stages = layer.len(),
                "Executing layer"
            );

            let outcomes = tokio::select! {
                biased;
                () = ctx.cancel.cancelled() => {
                    warn!(run_id = %ctx.run_id, depth, "Run cancelled while stages were in flight");
                    return Err(ctx.cancel.check().err().unwrap_or_else(|| {
                        PodflowError::Cancelled("cancelled".to_string())
                    }));
                }
                outcomes = self.run_layer(&layer, &slots, ctx) => outcomes?,
            };

            for outcome in outcomes {
                let spec = &self.stages[outcome.index];
                if let Some(slot) = &spec.output_slot {
                    slots.insert(&spec.name, slot.as_str(), outcome.text).map_err(|err| {
                        DependencyWiringError::new(&spec.name, err.slot, WiringFault::DuplicateSlot)
                    })?;
                }
                if outcome.index == self.terminal {
                    terminal = Some(outcome.response);
                }
            }
        }

        Ok(GraphOutcome {
            slots,
            terminal: terminal.unwrap_or_default(),
        })
    }

    async fn run_layer(
        &self,
        layer: &[usize],
        slots: &OutputSlots,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Vec<StageOutcome>, PodflowError> {
        match ctx.strategy {
            ExecutionStrategy::Concurrent => {
                try_join_all(layer.iter().map(|&i| self.run_stage(i, slots, ctx))).await
            }
            ExecutionStrategy::Sequential => {
                let mut outcomes = Vec::with_capacity(layer.len());
                for &i in layer {
                    outcomes.push(self.run_stage(i, slots, ctx).await?);
                }
                Ok(outcomes)
            }
        }
    }

    async fn run_stage(
        &self,
        index: usize,
        slots: &OutputSlots,
        ctx: &ExecutionContext<'_>,
    ) -> Result<StageOutcome, PodflowError> {
        ctx.cancel.check()?;

        let spec = &self.stages[index];
        let instruction = spec.template.render(&spec.name, &ctx.payload, slots)?;
        let request = self.request_for(spec, instruction, ctx)?;

        let span = info_span!(
            "stage",
            stage = %spec.name,
            run_id = %ctx.run_id,
            tier = %spec.tier,
            model = %request.model,
        );

        async {
            let timer = StageTimer::start(&spec.name);
            info!(
                delegates = request.delegates.len(),
                instruction_len = request.instruction.len(),
                "Stage started"
            );
            ctx.events
                .emit(
                    events::STAGE_STARTED,
                    Some(json!({
                        "run_id": ctx.run_id.to_string(),
                        "stage": spec.name,
                        "tier": spec.tier,
                        "model": request.model,
                    })),
                )
                .await;

            let response = match ctx
                .retry
                .execute(&spec.name, || ctx.backend.complete(&request))
                .await
            {
                Ok(response) => response,
                Err(cause) => {
                    warn!(error = %cause, duration_ms = timer.elapsed_ms(), "Stage failed");
                    ctx.events
                        .emit(
                            events::STAGE_FAILED,
                            Some(json!({
                                "run_id": ctx.run_id.to_string(),
                                "stage": spec.name,
                                "error": cause.to_string(),
                                "status_code": cause.status_code(),
                            })),
                        )
                        .await;
                    return Err(PipelineExecutionError::new(&spec.name, cause).into());
                }
            };

            let text = ResultExtractor::extract(&response);
            info!(
                duration_ms = timer.elapsed_ms(),
                elements = response.len(),
                text_len = text.len(),
                "Stage completed"
            );
            ctx.events
                .emit(
                    events::STAGE_COMPLETED,
                    Some(json!({
                        "run_id": ctx.run_id.to_string(),
                        "stage": spec.name,
                        "slot": spec.output_slot,
                        "duration_ms": timer.elapsed_ms(),
                    })),
                )
                .await;

            Ok(StageOutcome {
                index,
                text,
                response,
            })
        }
        .instrument(span)
        .await
    }

    /// Builds the completion request for a stage, delegates included.
    fn request_for(
        &self,
        spec: &StageSpec,
        instruction: String,
        ctx: &ExecutionContext<'_>,
    ) -> Result<CompletionRequest, DependencyWiringError> {
        let delegates = spec
            .delegates
            .iter()
            .map(|name| {
                let delegate = self.stage(name).ok_or_else(|| {
                    DependencyWiringError::new(&spec.name, name, WiringFault::UnknownDelegate)
                })?;
                self.delegate_tool(delegate, ctx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompletionRequest::new(
            &spec.name,
            ctx.models.model_for(spec.tier),
            spec.tier,
            instruction,
        )
        .with_delegates(delegates)
        .with_grounded_search(spec.grounded_search))
    }

    /// Wraps a delegated stage as a tool.
    ///
    /// Delegated stages read only the payload. A slot reference here means
    /// the builder was bypassed, and fails the calling stage.
    fn delegate_tool(
        &self,
        spec: &StageSpec,
        ctx: &ExecutionContext<'_>,
    ) -> Result<Arc<dyn Invocable>, DependencyWiringError> {
        let instruction = spec
            .template
            .render(&spec.name, &ctx.payload, &OutputSlots::new())
            .map_err(|err| {
                DependencyWiringError::new(&spec.name, err.reference, WiringFault::DelegateReadsSlot)
            })?;
        let description = if spec.description.is_empty() {
            format!("Runs the {} stage", spec.name)
        } else {
            spec.description.clone()
        };

        Ok(Arc::new(StageTool::new(
            description,
            self.request_for(spec, instruction, ctx)?,
            ctx.backend.clone(),
            ctx.retry.clone(),
        )))
    }
}
