//! Test fixtures for pipeline testing.

use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::ScriptedBackend;
use crate::agents::{FACT_CHECK_STAGE, KEY_INSIGHTS_STAGE, SEARCH_STAGE, SUMMARIZE_STAGE};
use crate::config::Settings;
use crate::core::ModelCatalog;
use crate::pipeline::RetryPolicy;
use crate::transcript::TranscriptPayload;

/// Returns a small single-episode transcript.
#[must_use]
pub fn sample_transcript() -> Value {
    json!({
        "episode_id": "ep001",
        "title": "Remote Work Futures",
        "host": "Dana",
        "guests": ["Priya"],
        "segments": [
            {"speaker": "Dana", "start": "00:00:05", "text": "Welcome back. Today we talk about remote work."},
            {"speaker": "Priya", "start": "00:01:12", "text": "Since 2020 about a third of office jobs went hybrid."},
            {"speaker": "Dana", "start": "00:03:40", "text": "Does productivity hold up?"}
        ]
    })
}

/// Returns the sample transcript rendered as a payload.
#[must_use]
pub fn sample_payload() -> TranscriptPayload {
    TranscriptPayload::from_value(&sample_transcript())
}

/// Writes the sample transcript into `dir` and returns the file path.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be written.
pub fn write_transcript(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join("ep001_remote_work.json");
    std::fs::write(&path, sample_transcript().to_string())?;
    Ok(path)
}

/// Returns settings with distinct model ids and millisecond retry delays.
#[must_use]
pub fn test_settings() -> Settings {
    Settings::default()
        .with_models(ModelCatalog::new("lite-model", "standard-model", "pro-model"))
        .with_retry(
            RetryPolicy::new()
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(5)),
        )
}

/// Returns a backend scripted for the podcast pipeline.
///
/// Summaries answer `SUM`, insights answer `INS`, search answers a query
/// and the fact check echoes its instruction.
#[must_use]
pub fn podcast_backend() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_response(SUMMARIZE_STAGE, "SUM")
        .with_response(KEY_INSIGHTS_STAGE, "INS")
        .with_response(SEARCH_STAGE, "remote work hybrid share 2020")
        .with_echo(FACT_CHECK_STAGE)
}
