//! Experiment records and their lifecycle states.
//!
//! # State Machine
//!
//! ```text
//! Draft ──start──▶ Running ──complete──▶ Completed ──promote──▶ Promoted
//!                                            │
//!                                            └──rollback──▶ RolledBack
//! ```
//!
//! Promoted and RolledBack are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xp_common::{Error, ExperimentId, Result};
use xp_config::MIN_SAMPLES_FLOOR;

pub const DEFAULT_TARGET_SAMPLE_SIZE: u64 = 100;
pub const DEFAULT_MAX_DURATION_DAYS: u32 = 30;
pub const MAX_DURATION_DAYS_LIMIT: u32 = 90;
pub const DEFAULT_MIN_SUCCESS_RATE_DELTA: f64 = 5.0;
pub const DEFAULT_MAX_COST_INCREASE_PCT: f64 = 20.0;
pub const DEFAULT_CREATED_BY: &str = "system";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    Draft,
    Running,
    Completed,
    Promoted,
    RolledBack,
}

impl ExperimentStatus {
    pub const ALL: [ExperimentStatus; 5] = [
        ExperimentStatus::Draft,
        ExperimentStatus::Running,
        ExperimentStatus::Completed,
        ExperimentStatus::Promoted,
        ExperimentStatus::RolledBack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentStatus::Draft => "draft",
            ExperimentStatus::Running => "running",
            ExperimentStatus::Completed => "completed",
            ExperimentStatus::Promoted => "promoted",
            ExperimentStatus::RolledBack => "rolled_back",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExperimentStatus::Promoted | ExperimentStatus::RolledBack)
    }

    /// Legal edges of the lifecycle.
    pub fn can_transition_to(&self, next: ExperimentStatus) -> bool {
        use ExperimentStatus::*;
        matches!(
            (self, next),
            (Draft, Running) | (Running, Completed) | (Completed, Promoted) | (Completed, RolledBack)
        )
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperimentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ExperimentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown experiment status: {s}")))
    }
}

/// Planned traffic split between control and treatment.
///
/// Recorded on the experiment for the router; the engine itself does not
/// route requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficAllocation {
    #[default]
    #[serde(rename = "50/50")]
    Even,
    #[serde(rename = "80/20")]
    ControlHeavy,
    #[serde(rename = "20/80")]
    TreatmentHeavy,
    #[serde(rename = "95/5")]
    Canary,
}

impl TrafficAllocation {
    pub const ALL: [TrafficAllocation; 4] = [
        TrafficAllocation::Even,
        TrafficAllocation::ControlHeavy,
        TrafficAllocation::TreatmentHeavy,
        TrafficAllocation::Canary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficAllocation::Even => "50/50",
            TrafficAllocation::ControlHeavy => "80/20",
            TrafficAllocation::TreatmentHeavy => "20/80",
            TrafficAllocation::Canary => "95/5",
        }
    }

    /// `(control, treatment)` percentages; always sum to 100.
    pub fn weights(&self) -> (u8, u8) {
        match self {
            TrafficAllocation::Even => (50, 50),
            TrafficAllocation::ControlHeavy => (80, 20),
            TrafficAllocation::TreatmentHeavy => (20, 80),
            TrafficAllocation::Canary => (95, 5),
        }
    }
}

impl fmt::Display for TrafficAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrafficAllocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TrafficAllocation::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown traffic allocation {s}; expected one of 50/50, 80/20, 20/80, 95/5"
                ))
            })
    }
}

/// Which side of an experiment a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    Control,
    Treatment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: ExperimentId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub control_version: String,
    pub treatment_version: String,
    #[serde(default)]
    pub traffic_allocation: TrafficAllocation,
    pub target_sample_size: u64,
    pub max_duration_days: u32,
    pub min_success_rate_delta: f64,
    pub max_cost_increase_pct: f64,
    pub status: ExperimentStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default)]
    pub control_requests: u64,
    #[serde(default)]
    pub treatment_requests: u64,
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub conclusion: Option<String>,
}

fn default_created_by() -> String {
    DEFAULT_CREATED_BY.to_string()
}

impl Experiment {
    /// Requests for the control version count toward control; any other
    /// version counts toward treatment.
    pub fn arm_for(&self, prompt_version: &str) -> Arm {
        if prompt_version == self.control_version {
            Arm::Control
        } else {
            Arm::Treatment
        }
    }

    pub fn requests(&self, arm: Arm) -> u64 {
        match arm {
            Arm::Control => self.control_requests,
            Arm::Treatment => self.treatment_requests,
        }
    }

    pub fn total_requests(&self) -> u64 {
        self.control_requests.saturating_add(self.treatment_requests)
    }

    /// Both arms have reached the target sample size.
    pub fn target_reached(&self) -> bool {
        self.control_requests >= self.target_sample_size
            && self.treatment_requests >= self.target_sample_size
    }

    /// Whether `version` is one of this experiment's two versions.
    pub fn has_version(&self, version: &str) -> bool {
        version == self.control_version || version == self.treatment_version
    }
}

/// Parameters for a new experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewExperiment {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub control_version: String,
    pub treatment_version: String,
    #[serde(default)]
    pub traffic_allocation: TrafficAllocation,
    #[serde(default = "default_target_sample_size")]
    pub target_sample_size: u64,
    #[serde(default = "default_max_duration_days")]
    pub max_duration_days: u32,
    #[serde(default = "default_min_success_rate_delta")]
    pub min_success_rate_delta: f64,
    #[serde(default = "default_max_cost_increase_pct")]
    pub max_cost_increase_pct: f64,
    #[serde(default = "default_created_by")]
    pub created_by: String,
}

fn default_target_sample_size() -> u64 {
    DEFAULT_TARGET_SAMPLE_SIZE
}

fn default_max_duration_days() -> u32 {
    DEFAULT_MAX_DURATION_DAYS
}

fn default_min_success_rate_delta() -> f64 {
    DEFAULT_MIN_SUCCESS_RATE_DELTA
}

fn default_max_cost_increase_pct() -> f64 {
    DEFAULT_MAX_COST_INCREASE_PCT
}

impl NewExperiment {
    /// Defaults for everything but the identifying fields.
    pub fn new(
        name: impl Into<String>,
        control_version: impl Into<String>,
        treatment_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            control_version: control_version.into(),
            treatment_version: treatment_version.into(),
            traffic_allocation: TrafficAllocation::default(),
            target_sample_size: DEFAULT_TARGET_SAMPLE_SIZE,
            max_duration_days: DEFAULT_MAX_DURATION_DAYS,
            min_success_rate_delta: DEFAULT_MIN_SUCCESS_RATE_DELTA,
            max_cost_increase_pct: DEFAULT_MAX_COST_INCREASE_PCT,
            created_by: default_created_by(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_traffic_allocation(mut self, allocation: TrafficAllocation) -> Self {
        self.traffic_allocation = allocation;
        self
    }

    pub fn with_target_sample_size(mut self, size: u64) -> Self {
        self.target_sample_size = size;
        self
    }

    pub fn with_created_by(mut self, who: impl Into<String>) -> Self {
        self.created_by = who.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("name must not be empty".into()));
        }
        if self.control_version.trim().is_empty() || self.treatment_version.trim().is_empty() {
            return Err(Error::Validation("prompt versions must not be empty".into()));
        }
        if self.control_version == self.treatment_version {
            return Err(Error::Validation(format!(
                "control and treatment are both {}",
                self.control_version
            )));
        }
        if self.target_sample_size < MIN_SAMPLES_FLOOR {
            return Err(Error::Validation(format!(
                "target_sample_size {} is below the minimum {}",
                self.target_sample_size, MIN_SAMPLES_FLOOR
            )));
        }
        if !(1..=MAX_DURATION_DAYS_LIMIT).contains(&self.max_duration_days) {
            return Err(Error::Validation(format!(
                "max_duration_days {} outside 1..={}",
                self.max_duration_days, MAX_DURATION_DAYS_LIMIT
            )));
        }
        for (field, value) in [
            ("min_success_rate_delta", self.min_success_rate_delta),
            ("max_cost_increase_pct", self.max_cost_increase_pct),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Validation(format!(
                    "{field} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Materialize as a draft with zero counters.
    pub fn into_experiment(self, experiment_id: ExperimentId, now: DateTime<Utc>) -> Experiment {
        let created_by = if self.created_by.trim().is_empty() {
            default_created_by()
        } else {
            self.created_by
        };
        Experiment {
            experiment_id,
            name: self.name,
            description: self.description,
            control_version: self.control_version,
            treatment_version: self.treatment_version,
            traffic_allocation: self.traffic_allocation,
            target_sample_size: self.target_sample_size,
            max_duration_days: self.max_duration_days,
            min_success_rate_delta: self.min_success_rate_delta,
            max_cost_increase_pct: self.max_cost_increase_pct,
            status: ExperimentStatus::Draft,
            created_at: now,
            started_at: None,
            ended_at: None,
            created_by,
            control_requests: 0,
            treatment_requests: 0,
            winner: None,
            conclusion: None,
        }
    }
}
