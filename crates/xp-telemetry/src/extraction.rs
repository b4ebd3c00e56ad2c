//! Structured extraction output and field-population counting.
//!
//! Only the count of populated fields reaches telemetry; the extracted
//! values themselves stay with the extraction adapter.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Number of semantic fields in the extraction schema.
pub const EXTRACTION_SCHEMA_FIELDS: u32 = 9;

/// The semantic fields an extraction can populate.
///
/// Nulls deserialize as empty so that `null`, `""`, `[]` and `{}` are all
/// treated the same: not populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFields {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub diagnoses: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub medications: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub lab_values: BTreeMap<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub procedures: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub allergies: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub vital_signs: BTreeMap<String, Value>,
    #[serde(default)]
    pub notes: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn text_populated(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.is_empty())
}

impl ExtractedFields {
    /// Count of populated fields, in `[0, EXTRACTION_SCHEMA_FIELDS]`.
    pub fn populated_count(&self) -> u32 {
        [
            text_populated(&self.patient_name),
            text_populated(&self.date_of_birth),
            !self.diagnoses.is_empty(),
            !self.medications.is_empty(),
            !self.lab_values.is_empty(),
            !self.procedures.is_empty(),
            !self.allergies.is_empty(),
            !self.vital_signs.is_empty(),
            text_populated(&self.notes),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count() as u32
    }

    /// Populated fields as a percentage of the schema.
    pub fn completeness_pct(&self) -> f64 {
        self.populated_count() as f64 / EXTRACTION_SCHEMA_FIELDS as f64 * 100.0
    }
}
