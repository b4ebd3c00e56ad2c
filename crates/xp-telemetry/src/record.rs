//! The telemetry record: one extraction attempt's outcome.
//!
//! Latency and token fields exist only on completed extractions, which the
//! type makes unrepresentable otherwise. Records are written once and never
//! mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use xp_common::{DocumentId, Error, Result};

use crate::extraction::ExtractedFields;

/// Outcome status of an extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryStatus {
    Completed,
    Failed,
}

impl fmt::Display for TelemetryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryStatus::Completed => write!(f, "completed"),
            TelemetryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Measurements available only when the model call succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedExtraction {
    pub processing_time_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub extracted_field_count: u32,
}

/// What happened to the extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Completed(CompletedExtraction),
    Failed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

/// One logged extraction attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub document_id: DocumentId,
    pub prompt_version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: ExtractionOutcome,
}

impl TelemetryRecord {
    /// Record a successful extraction.
    pub fn completed(
        document_id: DocumentId,
        prompt_version: impl Into<String>,
        timestamp: DateTime<Utc>,
        measurements: CompletedExtraction,
    ) -> Self {
        Self {
            document_id,
            prompt_version: prompt_version.into(),
            timestamp,
            outcome: ExtractionOutcome::Completed(measurements),
        }
    }

    /// Record a successful extraction, deriving the field count from its output.
    pub fn from_extraction(
        document_id: DocumentId,
        prompt_version: impl Into<String>,
        timestamp: DateTime<Utc>,
        processing_time_ms: u64,
        input_tokens: u64,
        output_tokens: u64,
        fields: &ExtractedFields,
    ) -> Self {
        Self::completed(
            document_id,
            prompt_version,
            timestamp,
            CompletedExtraction {
                processing_time_ms,
                input_tokens,
                output_tokens,
                extracted_field_count: fields.populated_count(),
            },
        )
    }

    /// Record a failed extraction.
    pub fn failed(
        document_id: DocumentId,
        prompt_version: impl Into<String>,
        timestamp: DateTime<Utc>,
        error_message: Option<String>,
    ) -> Self {
        Self {
            document_id,
            prompt_version: prompt_version.into(),
            timestamp,
            outcome: ExtractionOutcome::Failed { error_message },
        }
    }

    pub fn status(&self) -> TelemetryStatus {
        match self.outcome {
            ExtractionOutcome::Completed(_) => TelemetryStatus::Completed,
            ExtractionOutcome::Failed { .. } => TelemetryStatus::Failed,
        }
    }

    /// Measurements, if the extraction completed.
    pub fn measurements(&self) -> Option<&CompletedExtraction> {
        match &self.outcome {
            ExtractionOutcome::Completed(m) => Some(m),
            ExtractionOutcome::Failed { .. } => None,
        }
    }

    /// Check the record against a schema of `field_count` semantic fields.
    pub fn validate(&self, field_count: u32) -> Result<()> {
        if self.document_id.0.is_empty() {
            return Err(Error::Validation("document_id must not be empty".into()));
        }
        if self.prompt_version.trim().is_empty() {
            return Err(Error::Validation("prompt_version must not be empty".into()));
        }
        if let Some(m) = self.measurements() {
            if m.extracted_field_count > field_count {
                return Err(Error::Validation(format!(
                    "extracted_field_count {} exceeds schema size {}",
                    m.extracted_field_count, field_count
                )));
            }
        }
        Ok(())
    }
}
