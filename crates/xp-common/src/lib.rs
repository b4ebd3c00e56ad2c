//! Prompt experiment common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the xp crates:
//! - Experiment and document identifiers
//! - The unified error taxonomy with stable codes
//! - Schema versioning for JSON outputs
//! - Output format selection

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{Error, Result};
pub use id::{DocumentId, ExperimentId};
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
