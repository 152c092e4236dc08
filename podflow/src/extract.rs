//! Normalizes backend responses into display text.

use crate::core::ResponseSequence;
use tracing::warn;

/// Separator placed between text fragments.
pub const FRAGMENT_SEPARATOR: &str = "\n\n";

/// Turns a response sequence into a single string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultExtractor;

impl ResultExtractor {
    /// Joins every non-empty text part, in emission order, with a blank line.
    ///
    /// Elements without content, function calls and function responses
    /// contribute nothing. A sequence that yields no text produces `""`.
    #[must_use]
    pub fn extract(response: &ResponseSequence) -> String {
        let fragments: Vec<&str> = response
            .elements()
            .iter()
            .filter_map(|element| element.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .filter(|text| !text.is_empty())
            .collect();

        if fragments.is_empty() {
            warn!(elements = response.len(), "Response produced no text");
            return String::new();
        }
        fragments.join(FRAGMENT_SEPARATOR)
    }
}
