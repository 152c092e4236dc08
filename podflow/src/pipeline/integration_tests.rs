//! End-to-end tests for pipeline runs.

use super::{ExecutionStrategy, PipelineOrchestrator, RetryPolicy};
use crate::agents::{
    FACT_CHECK_STAGE, INSIGHTS_SLOT, KEY_INSIGHTS_STAGE, SEARCH_STAGE, SUMMARIZE_STAGE,
    SUMMARY_SLOT,
};
use crate::cancellation::CancellationToken;
use crate::core::{ModelTier, ResponseSequence};
use crate::errors::{BackendError, DatasetError, PodflowError};
use crate::events::{self, CollectingEventSink};
use crate::testing::{
    assert_instruction_contains, assert_stage_failed, podcast_backend, sample_payload,
    test_settings, write_transcript, ScriptedBackend,
};
use crate::transcript::{MockTranscriptSource, TranscriptPayload};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn orchestrator(backend: Arc<ScriptedBackend>) -> (PipelineOrchestrator, Arc<CollectingEventSink>) {
    let sink = Arc::new(CollectingEventSink::new());
    let orchestrator =
        PipelineOrchestrator::new(test_settings(), backend).with_event_sink(sink.clone());
    (orchestrator, sink)
}

#[tokio::test]
async fn test_fact_check_sees_upstream_slots() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_transcript(dir.path()).unwrap();
    let backend = Arc::new(podcast_backend());
    let (orchestrator, sink) = orchestrator(backend.clone());

    let result = orchestrator.run(&path).await.unwrap();

    assert_instruction_contains(&backend, FACT_CHECK_STAGE, "SUM");
    assert_instruction_contains(&backend, FACT_CHECK_STAGE, "INS");
    assert_instruction_contains(&backend, SUMMARIZE_STAGE, "Remote Work Futures");
    assert_instruction_contains(&backend, KEY_INSIGHTS_STAGE, "Remote Work Futures");

    let fact_check = backend.last_instruction(FACT_CHECK_STAGE).unwrap();
    assert!(!fact_check.contains("Remote Work Futures"));
    assert!(result.text.contains("SUM") && result.text.contains("INS"));
    assert_eq!(result.slots.get(SUMMARY_SLOT), Some("SUM"));
    assert_eq!(result.slots.get(INSIGHTS_SLOT), Some("INS"));
    assert_eq!(result.timestamp_label().len(), 15);

    assert_eq!(backend.call_count(), 3);
    assert_eq!(backend.call_order().last().map(String::as_str), Some(FACT_CHECK_STAGE));
    assert_eq!(sink.event_types().first().map(String::as_str), Some(events::PIPELINE_STARTED));
    assert_eq!(sink.event_types().last().map(String::as_str), Some(events::PIPELINE_COMPLETED));
    assert_eq!(sink.stages_for(events::STAGE_COMPLETED).len(), 3);
}

#[tokio::test]
async fn test_stage_models_follow_tiers() {
    let backend = Arc::new(podcast_backend());
    let (orchestrator, _) = orchestrator(backend.clone());

    orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(backend.calls_for(SUMMARIZE_STAGE)[0].model, "lite-model");
    assert_eq!(backend.calls_for(KEY_INSIGHTS_STAGE)[0].tier, ModelTier::Lite);
    let fact_check = &backend.calls_for(FACT_CHECK_STAGE)[0];
    assert_eq!(fact_check.model, "pro-model");
    assert_eq!(
        fact_check.delegates,
        vec![SUMMARIZE_STAGE, KEY_INSIGHTS_STAGE, SEARCH_STAGE]
    );
    assert!(backend.calls_for(SUMMARIZE_STAGE)[0].delegates.is_empty());
}

#[tokio::test]
async fn test_sequential_strategy_order() {
    let backend = Arc::new(podcast_backend());
    let settings = test_settings().with_execution(ExecutionStrategy::Sequential);
    let orchestrator = PipelineOrchestrator::new(settings, backend.clone());

    orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        backend.call_order(),
        vec![SUMMARIZE_STAGE, KEY_INSIGHTS_STAGE, FACT_CHECK_STAGE]
    );
}

#[tokio::test]
async fn test_missing_dataset_fails_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(podcast_backend());
    let (orchestrator, sink) = orchestrator(backend.clone());

    let err = orchestrator.run(dir.path().join("missing.json")).await.unwrap_err();

    assert!(err.is_dataset_not_found());
    assert_eq!(backend.call_count(), 0);
    assert_eq!(sink.event_types(), vec![events::PIPELINE_STARTED, events::PIPELINE_FAILED]);
}

#[tokio::test]
async fn test_malformed_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{\"segments\": [").unwrap();
    let backend = Arc::new(podcast_backend());
    let (orchestrator, _) = orchestrator(backend.clone());

    let err = orchestrator.run(&path).await.unwrap_err();

    assert!(matches!(err, PodflowError::Dataset(DatasetError::Format { .. })));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_retry_policy_is_configuration_error() {
    let backend = Arc::new(podcast_backend());
    let settings = test_settings().with_retry(RetryPolicy::new().with_max_attempts(0));
    let orchestrator = PipelineOrchestrator::new(settings, backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, PodflowError::Configuration(_)));
    assert_eq!(backend.call_count(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let backend = Arc::new(podcast_backend().with_failures(
        SUMMARIZE_STAGE,
        vec![
            BackendError::transient(503, "unavailable"),
            BackendError::transient(429, "rate limited"),
        ],
    ));
    let (orchestrator, _) = orchestrator(backend.clone());

    let result = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(backend.calls_for(SUMMARIZE_STAGE).len(), 3);
    assert_eq!(result.slots.get(SUMMARY_SLOT), Some("SUM"));
}

#[tokio::test]
async fn test_exhausted_retries_fail_the_run() {
    let failures = vec![BackendError::transient(429, "rate limited"); 3];
    let backend = Arc::new(podcast_backend().with_failures(SUMMARIZE_STAGE, failures));
    let (orchestrator, sink) = orchestrator(backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_stage_failed(&err, SUMMARIZE_STAGE);
    match &err {
        PodflowError::Execution(inner) => assert_eq!(inner.cause.status_code(), Some(429)),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(backend.calls_for(SUMMARIZE_STAGE).len(), 3);
    assert!(backend.calls_for(FACT_CHECK_STAGE).is_empty());
    assert_eq!(sink.event_types().last().map(String::as_str), Some(events::PIPELINE_FAILED));
    assert_eq!(err.to_dict()["stage"], json!(SUMMARIZE_STAGE));
}

#[tokio::test]
async fn test_fatal_failure_is_not_retried() {
    let backend = Arc::new(
        podcast_backend().with_failures(KEY_INSIGHTS_STAGE, vec![BackendError::fatal("bad request")]),
    );
    let (orchestrator, _) = orchestrator(backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_stage_failed(&err, KEY_INSIGHTS_STAGE);
    assert_eq!(backend.calls_for(KEY_INSIGHTS_STAGE).len(), 1);
    assert!(backend.calls_for(FACT_CHECK_STAGE).is_empty());
}

#[tokio::test]
async fn test_terminal_failure_names_fact_check() {
    let backend = Arc::new(
        podcast_backend().with_failures(FACT_CHECK_STAGE, vec![BackendError::transient(400, "bad")]),
    );
    let (orchestrator, _) = orchestrator(backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_stage_failed(&err, FACT_CHECK_STAGE);
    assert_eq!(backend.calls_for(FACT_CHECK_STAGE).len(), 1);
}

#[tokio::test]
async fn test_cancel_after_first_layer_skips_fact_check() {
    let cancel = Arc::new(CancellationToken::new());
    let hook_token = cancel.clone();
    let backend = Arc::new(
        podcast_backend().with_hook(SUMMARIZE_STAGE, move |_| hook_token.cancel("caller left")),
    );
    let (orchestrator, sink) = orchestrator(backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PodflowError::Cancelled(ref reason) if reason == "caller left"));
    assert!(backend.calls_for(FACT_CHECK_STAGE).is_empty());
    assert_eq!(sink.event_types().last().map(String::as_str), Some(events::PIPELINE_CANCELLED));
}

#[tokio::test]
async fn test_cancel_mid_layer_drops_in_flight_stage() {
    let cancel = Arc::new(CancellationToken::new());
    let hook_token = cancel.clone();
    let backend = Arc::new(
        podcast_backend()
            .with_delay(KEY_INSIGHTS_STAGE, Duration::from_secs(5))
            .with_hook(SUMMARIZE_STAGE, move |_| hook_token.cancel("timeout")),
    );
    let (orchestrator, sink) = orchestrator(backend.clone());

    let err = tokio::time::timeout(
        Duration::from_secs(2),
        orchestrator.run_payload(sample_payload(), &cancel),
    )
    .await
    .unwrap()
    .unwrap_err();

    assert!(matches!(err, PodflowError::Cancelled(_)));
    assert!(backend.calls_for(FACT_CHECK_STAGE).is_empty());
    assert!(sink.stages_for(events::STAGE_COMPLETED).len() <= 1);
}

#[tokio::test]
async fn test_sequential_cancel_stops_before_next_stage() {
    let cancel = Arc::new(CancellationToken::new());
    let hook_token = cancel.clone();
    let backend = Arc::new(
        podcast_backend().with_hook(SUMMARIZE_STAGE, move |_| hook_token.cancel("stop")),
    );
    let settings = test_settings().with_execution(ExecutionStrategy::Sequential);
    let orchestrator = PipelineOrchestrator::new(settings, backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, PodflowError::Cancelled(_)));
    assert_eq!(backend.call_order(), vec![SUMMARIZE_STAGE]);
}

#[tokio::test]
async fn test_fact_check_invokes_search_delegate() {
    let backend = Arc::new(
        podcast_backend()
            .with_delegate_call(FACT_CHECK_STAGE, SEARCH_STAGE, "share of hybrid office jobs 2020"),
    );
    let (orchestrator, _) = orchestrator(backend.clone());

    let result = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap();

    let search = backend.calls_for(SEARCH_STAGE);
    assert_eq!(search.len(), 1);
    assert!(search[0].grounded_search);
    assert!(search[0]
        .instruction
        .ends_with("Request: share of hybrid office jobs 2020"));
    assert!(!result.text.contains("remote work hybrid share 2020"));
    assert!(result.response.elements().iter().any(|e| e.function_calls().count() == 1));
}

#[tokio::test]
async fn test_delegate_failure_fails_the_run() {
    let backend = Arc::new(
        podcast_backend()
            .with_failures(SEARCH_STAGE, vec![BackendError::fatal("search disabled")])
            .with_delegate_call(FACT_CHECK_STAGE, SEARCH_STAGE, "claim"),
    );
    let (orchestrator, _) = orchestrator(backend.clone());

    let err = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_stage_failed(&err, FACT_CHECK_STAGE);
}

#[tokio::test]
async fn test_exhausted_delegate_is_not_retried_by_caller() {
    let busy = (0..50).map(|_| BackendError::transient(503, "busy")).collect();
    let backend = Arc::new(
        podcast_backend()
            .with_failures(SEARCH_STAGE, busy)
            .with_delegate_call(FACT_CHECK_STAGE, SEARCH_STAGE, "claim"),
    );
    let (orchestrator, _) = orchestrator(backend.clone());
    let max_attempts = orchestrator.settings().retry.max_attempts as usize;

    let err = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_stage_failed(&err, FACT_CHECK_STAGE);
    assert_eq!(backend.calls_for(SEARCH_STAGE).len(), max_attempts);
    assert_eq!(backend.calls_for(FACT_CHECK_STAGE).len(), 1);
    match err {
        PodflowError::Execution(inner) => {
            assert_eq!(inner.cause.status_code(), None);
            assert!(matches!(inner.cause, BackendError::Delegate { ref tool, .. } if tool == SEARCH_STAGE));
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_terminal_response_yields_empty_text() {
    let backend = Arc::new(podcast_backend().with_sequence(FACT_CHECK_STAGE, ResponseSequence::new()));
    let (orchestrator, _) = orchestrator(backend.clone());

    let result = orchestrator
        .run_payload(sample_payload(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.text, "");
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let backend = Arc::new(
        ScriptedBackend::new()
            .with_echo(SUMMARIZE_STAGE)
            .with_response(KEY_INSIGHTS_STAGE, "INS")
            .with_response(SEARCH_STAGE, "q")
            .with_echo(FACT_CHECK_STAGE),
    );
    let orchestrator = PipelineOrchestrator::new(test_settings(), backend.clone());
    let cancel = CancellationToken::new();

    let (first, second) = tokio::join!(
        orchestrator.run_payload(TranscriptPayload::new("episode-one"), &cancel),
        orchestrator.run_payload(TranscriptPayload::new("episode-two"), &cancel),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_ne!(first.run_id, second.run_id);
    assert!(first.text.contains("episode-one") && !first.text.contains("episode-two"));
    assert!(second.text.contains("episode-two") && !second.text.contains("episode-one"));
}

#[tokio::test]
async fn test_custom_transcript_source() {
    let mut source = MockTranscriptSource::new();
    source
        .expect_load()
        .times(1)
        .returning(|_| Ok(json!({"title": "Mocked Episode"})));
    source
        .expect_render()
        .returning(|data| TranscriptPayload::new(data["title"].as_str().unwrap_or_default()));

    let backend = Arc::new(podcast_backend().with_echo(SUMMARIZE_STAGE));
    let orchestrator =
        PipelineOrchestrator::new(test_settings(), backend.clone()).with_source(Arc::new(source));

    let result = orchestrator.run("virtual.json").await.unwrap();

    assert!(result.slots.get(SUMMARY_SLOT).unwrap().contains("Podcast raw data: Mocked Episode"));
}
