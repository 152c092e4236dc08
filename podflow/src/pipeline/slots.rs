//! Write-once output slots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error raised when a slot is written twice in one run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Output slot '{slot}' already populated; stage '{stage}' cannot overwrite it")]
pub struct SlotConflictError {
    /// The slot name.
    pub slot: String,
    /// The stage that attempted the second write.
    pub stage: String,
}

/// Named text values produced by stages during one run.
///
/// Each slot is populated exactly once and is read-only afterwards. The map
/// is owned by a single run; nothing is shared across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputSlots {
    values: BTreeMap<String, String>,
}

impl OutputSlots {
    /// Creates an empty slot map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populates a slot.
    ///
    /// # Errors
    ///
    /// Returns `SlotConflictError` if the slot already holds a value.
    pub fn insert(
        &mut self,
        stage: &str,
        slot: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<(), SlotConflictError> {
        let slot = slot.into();
        if self.values.contains_key(&slot) {
            return Err(SlotConflictError {
                slot,
                stage: stage.to_string(),
            });
        }
        self.values.insert(slot, text.into());
        Ok(())
    }

    /// Returns the value of a slot.
    #[must_use]
    pub fn get(&self, slot: &str) -> Option<&str> {
        self.values.get(slot).map(String::as_str)
    }

    /// Returns true if the slot is populated.
    #[must_use]
    pub fn contains(&self, slot: &str) -> bool {
        self.values.contains_key(slot)
    }

    /// Returns true if every named slot is populated.
    #[must_use]
    pub fn contains_all<S: AsRef<str>>(&self, slots: &[S]) -> bool {
        slots.iter().all(|slot| self.contains(slot.as_ref()))
    }

    /// Returns the number of populated slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no slot is populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the populated slot names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Consumes the map, returning the raw values.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.values
    }
}
