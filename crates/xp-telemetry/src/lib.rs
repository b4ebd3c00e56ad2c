//! Prompt experiment telemetry.
//!
//! This crate provides:
//! - The immutable per-extraction `TelemetryRecord`
//! - Extracted-field modelling and completeness counting
//! - Inclusive time windows
//! - The `TelemetryStore` capability with in-memory and JSONL backends

pub mod extraction;
pub mod record;
pub mod store;
pub mod window;

pub use extraction::{ExtractedFields, EXTRACTION_SCHEMA_FIELDS};
pub use record::{CompletedExtraction, ExtractionOutcome, TelemetryRecord, TelemetryStatus};
pub use store::{JsonlTelemetryStore, MemoryTelemetryStore, TelemetryStore};
pub use window::TimeWindow;

/// Directory under the data dir holding telemetry files.
pub const TELEMETRY_DIR: &str = "telemetry";

/// JSONL file name for telemetry records.
pub const TELEMETRY_FILE: &str = "records.jsonl";
