//! Core domain model types for podflow.
//!
//! This module contains the fundamental types used throughout the pipeline:
//! - Model tiers and the tier-to-model catalog
//! - The response shape returned by the model backend
//! - Run status

mod response;
mod status;
mod tier;

pub use response::{
    Content, FunctionCall, FunctionResponse, Part, ResponseElement, ResponseSequence,
};
pub use status::RunStatus;
pub use tier::{ModelCatalog, ModelTier};
