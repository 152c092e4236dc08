//! Prompt templates with named placeholders.
//!
//! Placeholders use `{{name}}`. The name `payload` is reserved for the
//! transcript payload; every other name refers to an output slot. Slot
//! references are parsed once at construction so wiring can be checked
//! before anything runs.

use crate::errors::{DependencyWiringError, WiringFault};
use crate::pipeline::OutputSlots;
use crate::transcript::TranscriptPayload;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::OnceLock;

/// The placeholder name bound to the transcript payload.
pub const PAYLOAD_PLACEHOLDER: &str = "payload";

// The pattern is a literal; `test_placeholder_pattern_compiles` covers it.
#[allow(clippy::expect_used)]
fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// An instruction template rendered once per stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
    slot_refs: Vec<String>,
    uses_payload: bool,
}

impl PromptTemplate {
    /// Parses a template.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut slot_refs: Vec<String> = Vec::new();
        let mut uses_payload = false;

        for caps in placeholder_pattern().captures_iter(&source) {
            let name = &caps[1];
            if name == PAYLOAD_PLACEHOLDER {
                uses_payload = true;
            } else if !slot_refs.iter().any(|existing| existing == name) {
                slot_refs.push(name.to_string());
            }
        }

        Self {
            source,
            slot_refs,
            uses_payload,
        }
    }

    /// Returns the raw template text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the output slots read by this template, in first-use order.
    #[must_use]
    pub fn slot_refs(&self) -> &[String] {
        &self.slot_refs
    }

    /// Returns true if the template embeds the transcript payload.
    #[must_use]
    pub fn uses_payload(&self) -> bool {
        self.uses_payload
    }

    /// Renders the template.
    ///
    /// Substitution is a single pass: text inserted for one placeholder is
    /// never scanned for further placeholders, so payloads and slot values
    /// appear verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if a referenced slot has no value.
    pub fn render(
        &self,
        stage: &str,
        payload: &TranscriptPayload,
        slots: &OutputSlots,
    ) -> Result<String, DependencyWiringError> {
        if let Some(missing) = self.slot_refs.iter().find(|slot| slots.get(slot).is_none()) {
            return Err(DependencyWiringError::new(
                stage,
                missing.as_str(),
                WiringFault::UndeclaredSlot,
            ));
        }

        let rendered = placeholder_pattern().replace_all(&self.source, |caps: &Captures<'_>| {
            let name = &caps[1];
            if name == PAYLOAD_PLACEHOLDER {
                payload.as_str().to_string()
            } else {
                slots.get(name).unwrap_or_default().to_string()
            }
        });

        Ok(match rendered {
            Cow::Borrowed(text) => text.to_string(),
            Cow::Owned(text) => text,
        })
    }
}

impl From<&str> for PromptTemplate {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<String> for PromptTemplate {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slots(entries: &[(&str, &str)]) -> OutputSlots {
        let mut slots = OutputSlots::new();
        for (name, value) in entries {
            slots.insert("test", *name, *value).unwrap();
        }
        slots
    }

    #[test]
    fn test_placeholder_pattern_compiles() {
        let pattern = placeholder_pattern();
        assert!(pattern.is_match("{{ summary }}"));
        assert!(!pattern.is_match("{{9lives}}"));
        assert_eq!(&pattern.captures("{{payload}}").unwrap()[1], "payload");
    }

    #[test]
    fn test_parses_slot_refs() {
        let template = PromptTemplate::new("A {{summary}} B {{ insights }} C {{summary}} {{payload}}");
        assert_eq!(template.slot_refs(), &["summary".to_string(), "insights".to_string()]);
        assert!(template.uses_payload());
    }

    #[test]
    fn test_plain_braces_are_not_placeholders() {
        let template = PromptTemplate::new(r#"Return JSON like {"claim": "..."} or {single}"#);
        assert!(template.slot_refs().is_empty());
        assert!(!template.uses_payload());
    }

    #[test]
    fn test_render_substitutes_verbatim() {
        let template = PromptTemplate::new("Summary:\n{{summary}}\nInsights:\n{{insights}}");
        let rendered = template
            .render(
                "fact_check",
                &TranscriptPayload::new("unused"),
                &slots(&[("summary", "SUM  with  spaces\n"), ("insights", "INS")]),
            )
            .unwrap();

        assert_eq!(rendered, "Summary:\nSUM  with  spaces\n\nInsights:\nINS");
    }

    #[test]
    fn test_render_does_not_rescan_inserted_text() {
        let template = PromptTemplate::new("Data: {{payload}} / {{summary}}");
        let payload = TranscriptPayload::new(r#"{"note": "{{summary}}"}"#);
        let rendered = template
            .render("stage", &payload, &slots(&[("summary", "S")]))
            .unwrap();

        assert_eq!(rendered, r#"Data: {"note": "{{summary}}"} / S"#);
    }

    #[test]
    fn test_render_missing_slot_fails() {
        let template = PromptTemplate::new("{{summary}}");
        let err = template
            .render("fact_check", &TranscriptPayload::new(""), &OutputSlots::new())
            .unwrap_err();

        assert_eq!(err.fault, WiringFault::UndeclaredSlot);
        assert_eq!(err.reference, "summary");
    }

    #[test]
    fn test_render_is_deterministic() {
        let template = PromptTemplate::new("{{summary}}|{{insights}}");
        let values = slots(&[("summary", "x"), ("insights", "y")]);
        let payload = TranscriptPayload::new("p");

        let first = template.render("s", &payload, &values).unwrap();
        let second = template.render("s", &payload, &values).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "x|y");
    }
}
