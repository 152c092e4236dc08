//! Pipeline builder with wiring validation.

use super::{StageGraph, StageSpec};
use crate::errors::{DependencyWiringError, WiringFault};
use std::collections::HashMap;
use tracing::debug;

/// Builder for creating validated stage graphs.
///
/// Every stage is checked as it is added: it may only read slots declared
/// by an earlier scheduled stage and may only delegate to stages that are
/// already defined. Forward and cyclic references are therefore rejected
/// before anything runs.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    /// The pipeline name.
    name: String,
    /// Stage specifications in insertion order.
    stages: Vec<StageSpec>,
    /// Stage name to position in `stages`.
    index: HashMap<String, usize>,
    /// Slot name to the stage that declares it.
    declared_slots: HashMap<String, String>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            index: HashMap::new(),
            declared_slots: HashMap::new(),
        }
    }

    /// Builds a graph from an ordered list of stages.
    ///
    /// # Errors
    ///
    /// Returns the first wiring error found.
    pub fn from_specs(
        name: impl Into<String>,
        specs: impl IntoIterator<Item = StageSpec>,
    ) -> Result<StageGraph, DependencyWiringError> {
        let mut builder = Self::new(name);
        for spec in specs {
            builder.add_stage(spec)?;
        }
        builder.build()
    }

    /// Adds a stage to the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn stage(mut self, spec: StageSpec) -> Result<Self, DependencyWiringError> {
        self.add_stage(spec)?;
        Ok(self)
    }

    /// Adds a stage in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage name is taken, a delegate is not yet
    /// defined or reads a slot, a read slot is not yet declared, or the
    /// output slot is already declared.
    pub fn add_stage(&mut self, spec: StageSpec) -> Result<(), DependencyWiringError> {
        if self.index.contains_key(&spec.name) {
            return Err(DependencyWiringError::new(
                &spec.name,
                &spec.name,
                WiringFault::DuplicateStage,
            ));
        }

        for delegate in &spec.delegates {
            let Some(&position) = self.index.get(delegate) else {
                return Err(DependencyWiringError::new(
                    &spec.name,
                    delegate,
                    WiringFault::UnknownDelegate,
                ));
            };
            if !self.stages[position].reads().is_empty() {
                return Err(DependencyWiringError::new(
                    &spec.name,
                    delegate,
                    WiringFault::DelegateReadsSlot,
                ));
            }
        }

        if spec.is_scheduled() {
            for slot in spec.reads() {
                if !self.declared_slots.contains_key(slot) {
                    return Err(DependencyWiringError::new(
                        &spec.name,
                        slot,
                        WiringFault::UndeclaredSlot,
                    ));
                }
            }
        } else if let Some(slot) = spec.reads().first() {
            return Err(DependencyWiringError::new(
                &spec.name,
                slot,
                WiringFault::DelegateReadsSlot,
            ));
        }

        if let Some(slot) = &spec.output_slot {
            if self.declared_slots.contains_key(slot) {
                return Err(DependencyWiringError::new(
                    &spec.name,
                    slot,
                    WiringFault::DuplicateSlot,
                ));
            }
            if spec.is_scheduled() {
                self.declared_slots.insert(slot.clone(), spec.name.clone());
            }
        }

        debug!(
            pipeline = %self.name,
            stage = %spec.name,
            role = %spec.role,
            tier = %spec.tier,
            "Registered stage"
        );

        self.index.insert(spec.name.clone(), self.stages.len());
        self.stages.push(spec);
        Ok(())
    }

    /// Builds the stage graph.
    ///
    /// # Errors
    ///
    /// Returns an error if no scheduled stage was added.
    pub fn build(self) -> Result<StageGraph, DependencyWiringError> {
        if !self.stages.iter().any(StageSpec::is_scheduled) {
            return Err(DependencyWiringError::new(
                &self.name,
                &self.name,
                WiringFault::EmptyPipeline,
            ));
        }

        Ok(StageGraph::new(self.name, self.stages))
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}
