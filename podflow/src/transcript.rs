//! Transcript loading and payload rendering.

use crate::errors::DatasetError;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// The serialized transcript handed to every stage of a run.
///
/// Immutable once produced. Clones share the same buffer, so concurrent
/// stages read one copy.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TranscriptPayload(Arc<str>);

impl TranscriptPayload {
    /// Creates a payload from already serialized text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(Arc::from(text.into()))
    }

    /// Renders structured episode data as 2-space indented JSON.
    #[must_use]
    pub fn from_value(data: &Value) -> Self {
        // Serializing a `Value` to a string cannot fail.
        let text = serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
        Self::new(text)
    }

    /// Returns the payload text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the SHA-256 hex digest of the payload.
    ///
    /// Logged in place of the transcript itself.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for TranscriptPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptPayload")
            .field("len", &self.len())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl AsRef<str> for TranscriptPayload {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Source of episode data.
#[cfg_attr(test, mockall::automock)]
pub trait TranscriptSource: Send + Sync {
    /// Loads structured episode data from `path`.
    fn load(&self, path: &Path) -> Result<Value, DatasetError>;

    /// Renders loaded data as the payload string.
    fn render(&self, data: &Value) -> TranscriptPayload {
        TranscriptPayload::from_value(data)
    }
}

/// Loads transcripts from UTF-8 JSON files.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTranscriptLoader;

impl JsonTranscriptLoader {
    /// Creates a new loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TranscriptSource for JsonTranscriptLoader {
    fn load(&self, path: &Path) -> Result<Value, DatasetError> {
        let owned = || PathBuf::from(path);
        if !path.exists() {
            return Err(DatasetError::NotFound { path: owned() });
        }

        let raw = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::InvalidData {
                DatasetError::Format {
                    path: owned(),
                    reason: "file is not valid UTF-8".to_string(),
                }
            } else {
                DatasetError::Io {
                    path: owned(),
                    source,
                }
            }
        })?;
        let data: Value = serde_json::from_str(&raw).map_err(|err| DatasetError::Format {
            path: owned(),
            reason: err.to_string(),
        })?;

        info!(path = %path.display(), bytes = raw.len(), "Loaded transcript file");
        debug!(path = %path.display(), top_level = %value_kind(&data), "Parsed transcript");
        Ok(data)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_payload_is_pretty_json() {
        let payload = TranscriptPayload::from_value(&json!({"title": "Ep", "segments": [1]}));
        assert_eq!(payload.as_str(), "{\n  \"title\": \"Ep\",\n  \"segments\": [\n    1\n  ]\n}");
    }

    #[test]
    fn test_payload_preserves_key_order() {
        let data: Value = serde_json::from_str(r#"{"z": 1, "a": 2}"#).unwrap();
        let payload = TranscriptPayload::from_value(&data);
        assert!(payload.as_str().find("\"z\"").unwrap() < payload.as_str().find("\"a\"").unwrap());
    }

    #[test]
    fn test_payload_fingerprint() {
        let payload = TranscriptPayload::new("abc");
        assert_eq!(
            payload.fingerprint(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        let clone = payload.clone();
        assert_eq!(clone, payload);
        assert!(!format!("{payload:?}").contains("abc"));
    }

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"episode_id": "ep001"}}"#).unwrap();

        let data = JsonTranscriptLoader::new().load(file.path()).unwrap();
        assert_eq!(data["episode_id"], "ep001");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonTranscriptLoader::new()
            .load(&dir.path().join("missing.json"))
            .unwrap_err();
        assert!(matches!(err, DatasetError::NotFound { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let err = JsonTranscriptLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::Format { .. }));
    }

    #[test]
    fn test_load_non_utf8_file_is_format_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'{', 0xff, 0xfe, b'}']).unwrap();

        let err = JsonTranscriptLoader::new().load(file.path()).unwrap_err();
        assert!(matches!(err, DatasetError::Format { ref reason, .. } if reason.contains("UTF-8")));
    }

    #[test]
    fn test_mock_source_render_default() {
        let mut source = MockTranscriptSource::new();
        source
            .expect_load()
            .returning(|_| Ok(json!({"title": "mocked"})));
        source
            .expect_render()
            .returning(|data| TranscriptPayload::from_value(data));

        let data = source.load(Path::new("any.json")).unwrap();
        assert!(source.render(&data).as_str().contains("mocked"));
    }
}
