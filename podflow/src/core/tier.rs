//! Model tiers and the catalog mapping them to concrete models.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A capability level of the language-model backend.
///
/// Higher tiers trade latency and cost for quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Fast and cheap; used for summarization-style work.
    Lite,
    /// Balanced latency and quality.
    Standard,
    /// Highest quality; used for verification.
    Pro,
}

impl Default for ModelTier {
    fn default() -> Self {
        Self::Lite
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lite => write!(f, "lite"),
            Self::Standard => write!(f, "standard"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

/// Concrete model identifiers for each tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCatalog {
    /// Model used for [`ModelTier::Lite`].
    pub lite: String,
    /// Model used for [`ModelTier::Standard`].
    pub standard: String,
    /// Model used for [`ModelTier::Pro`].
    pub pro: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            lite: "gemini-2.0-flash-lite".to_string(),
            standard: "gemini-2.5-flash".to_string(),
            pro: "gemini-2.5-pro".to_string(),
        }
    }
}

impl ModelCatalog {
    /// Creates a catalog from explicit model ids.
    #[must_use]
    pub fn new(lite: impl Into<String>, standard: impl Into<String>, pro: impl Into<String>) -> Self {
        Self {
            lite: lite.into(),
            standard: standard.into(),
            pro: pro.into(),
        }
    }

    /// Returns the model id for a tier.
    #[must_use]
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Lite => &self.lite,
            ModelTier::Standard => &self.standard,
            ModelTier::Pro => &self.pro,
        }
    }
}
