//! Whether a running experiment has an answer yet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xp_common::ExperimentId;

use super::model::{Experiment, ExperimentStatus};
use crate::compare::ComparisonResult;

/// An experiment's progress judged against its own thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentEvaluation {
    pub experiment_id: ExperimentId,
    pub status: ExperimentStatus,
    pub control_requests: u64,
    pub treatment_requests: u64,
    pub target_sample_size: u64,
    pub target_reached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_running: Option<i64>,
    pub duration_exceeded: bool,
    /// Success-rate delta is at least the experiment's `min_success_rate_delta`.
    pub meets_success_threshold: bool,
    /// Cost increase is at most the experiment's `max_cost_increase_pct`.
    pub within_cost_limit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_winner: Option<String>,
    /// Running, and either the sample target or the duration cap was hit.
    pub ready_to_complete: bool,
    pub comparison: ComparisonResult,
}

/// Judge `experiment` using a comparison of its two versions.
///
/// A winner is suggested only when the comparison is significant: the
/// treatment if it clears both of the experiment's thresholds, the control
/// if the treatment is worse. A better but too expensive treatment gets no
/// suggestion.
pub fn evaluate(
    experiment: &Experiment,
    comparison: ComparisonResult,
    now: DateTime<Utc>,
) -> ExperimentEvaluation {
    let days_running = experiment
        .started_at
        .map(|started| (now - started).num_days());
    let duration_exceeded =
        days_running.is_some_and(|d| d >= i64::from(experiment.max_duration_days));
    let target_reached = experiment.target_reached();

    let meets_success_threshold =
        comparison.success_rate_delta >= experiment.min_success_rate_delta;
    let within_cost_limit = comparison.cost_delta_pct <= experiment.max_cost_increase_pct;

    let suggested_winner = if !comparison.is_significant {
        None
    } else if meets_success_threshold && within_cost_limit {
        Some(experiment.treatment_version.clone())
    } else if comparison.success_rate_delta < 0.0 {
        Some(experiment.control_version.clone())
    } else {
        None
    };

    ExperimentEvaluation {
        experiment_id: experiment.experiment_id.clone(),
        status: experiment.status,
        control_requests: experiment.control_requests,
        treatment_requests: experiment.treatment_requests,
        target_sample_size: experiment.target_sample_size,
        target_reached,
        days_running,
        duration_exceeded,
        meets_success_threshold,
        within_cost_limit,
        suggested_winner,
        ready_to_complete: experiment.status == ExperimentStatus::Running
            && (target_reached || duration_exceeded),
        comparison,
    }
}
