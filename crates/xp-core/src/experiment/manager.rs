use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use xp_common::{Error, ExperimentId, Result};

use super::model::{Arm, Experiment, ExperimentStatus, NewExperiment};
use super::store::{ExperimentStore, ExperimentUpdate};

/// Lifecycle operations over an [`ExperimentStore`].
///
/// Each transition reads the current status to reject illegal moves with
/// [`Error::InvalidTransition`], then writes conditionally on that status;
/// losing a race to another writer surfaces as [`Error::ConditionFailed`].
#[derive(Clone)]
pub struct ExperimentManager {
    store: Arc<dyn ExperimentStore>,
}

impl ExperimentManager {
    pub fn new(store: Arc<dyn ExperimentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ExperimentStore> {
        &self.store
    }

    /// Validate and persist a new draft experiment.
    #[instrument(skip_all, fields(name = %params.name))]
    pub fn create(&self, params: NewExperiment) -> Result<Experiment> {
        params.validate()?;
        let experiment = params.into_experiment(ExperimentId::new(), Utc::now());
        self.store.put(&experiment)?;
        info!(
            experiment_id = %experiment.experiment_id,
            control = %experiment.control_version,
            treatment = %experiment.treatment_version,
            allocation = %experiment.traffic_allocation,
            "created experiment"
        );
        Ok(experiment)
    }

    pub fn get(&self, id: &ExperimentId) -> Result<Experiment> {
        self.store.get(id)
    }

    /// draft → running; stamps `started_at`.
    #[instrument(skip(self), fields(experiment_id = %id))]
    pub fn start(&self, id: &ExperimentId) -> Result<Experiment> {
        self.transition(
            id,
            "start",
            ExperimentStatus::Draft,
            ExperimentUpdate::status(ExperimentStatus::Running).with_started_at(Utc::now()),
        )
    }

    /// Count one request for `prompt_version` against its arm.
    ///
    /// Allowed in any status. The increment happens inside the store, so
    /// concurrent calls are all counted.
    #[instrument(skip(self), fields(experiment_id = %id))]
    pub fn record_request(&self, id: &ExperimentId, prompt_version: &str) -> Result<Experiment> {
        let experiment = self.store.get(id)?;
        let arm = experiment.arm_for(prompt_version);
        if arm == Arm::Treatment && prompt_version != experiment.treatment_version {
            warn!(
                prompt_version,
                treatment = %experiment.treatment_version,
                "version belongs to neither arm; counting as treatment"
            );
        }
        self.store
            .update(id, &ExperimentUpdate::increment(arm), None)
    }

    /// running → completed with a declared winner.
    #[instrument(skip(self, conclusion), fields(experiment_id = %id))]
    pub fn complete(
        &self,
        id: &ExperimentId,
        winner: &str,
        conclusion: Option<String>,
    ) -> Result<Experiment> {
        let current = self.store.get(id)?;
        if !current.has_version(winner) {
            return Err(Error::Validation(format!(
                "winner {} is neither {} nor {}",
                winner, current.control_version, current.treatment_version
            )));
        }
        self.transition_from(
            current,
            "complete",
            ExperimentStatus::Running,
            ExperimentUpdate::status(ExperimentStatus::Completed)
                .with_ended_at(Utc::now())
                .with_winner(winner)
                .with_conclusion(conclusion),
        )
    }

    /// completed → promoted.
    #[instrument(skip(self), fields(experiment_id = %id))]
    pub fn promote(&self, id: &ExperimentId) -> Result<Experiment> {
        self.transition(
            id,
            "promote",
            ExperimentStatus::Completed,
            ExperimentUpdate::status(ExperimentStatus::Promoted),
        )
    }

    /// completed → rolled_back.
    #[instrument(skip(self, reason), fields(experiment_id = %id))]
    pub fn rollback(&self, id: &ExperimentId, reason: Option<String>) -> Result<Experiment> {
        self.transition(
            id,
            "roll back",
            ExperimentStatus::Completed,
            ExperimentUpdate::status(ExperimentStatus::RolledBack).with_conclusion(reason),
        )
    }

    /// Experiments, optionally filtered by status, newest first, at most
    /// `limit` after filtering.
    pub fn list(
        &self,
        status: Option<ExperimentStatus>,
        limit: Option<usize>,
    ) -> Result<Vec<Experiment>> {
        let mut experiments = self.store.scan(status)?;
        experiments.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.experiment_id.cmp(&a.experiment_id))
        });
        if let Some(limit) = limit {
            experiments.truncate(limit);
        }
        Ok(experiments)
    }

    fn transition(
        &self,
        id: &ExperimentId,
        action: &'static str,
        from: ExperimentStatus,
        update: ExperimentUpdate,
    ) -> Result<Experiment> {
        let current = self.store.get(id)?;
        self.transition_from(current, action, from, update)
    }

    fn transition_from(
        &self,
        current: Experiment,
        action: &'static str,
        from: ExperimentStatus,
        update: ExperimentUpdate,
    ) -> Result<Experiment> {
        let to = update.status.unwrap_or(current.status);
        if current.status != from || !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                experiment_id: current.experiment_id.to_string(),
                action,
                from: current.status.to_string(),
            });
        }
        let updated = self
            .store
            .update(&current.experiment_id, &update, Some(from))?;
        info!(
            experiment_id = %updated.experiment_id,
            from = %from,
            to = %updated.status,
            "experiment transitioned"
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::store::MemoryExperimentStore;

    fn manager() -> ExperimentManager {
        ExperimentManager::new(Arc::new(MemoryExperimentStore::new()))
    }

    #[test]
    fn full_promote_path() {
        let m = manager();
        let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
        assert_eq!(e.status, ExperimentStatus::Draft);
        assert_eq!((e.control_requests, e.treatment_requests), (0, 0));

        let e = m.start(&e.experiment_id).unwrap();
        assert_eq!(e.status, ExperimentStatus::Running);

        let e = m
            .complete(&e.experiment_id, "v2", Some("clear win".into()))
            .unwrap();
        assert_eq!(e.winner.as_deref(), Some("v2"));
        assert!(e.ended_at.is_some());

        let e = m.promote(&e.experiment_id).unwrap();
        assert_eq!(e.status, ExperimentStatus::Promoted);
        assert!(e.status.is_terminal());
    }

    #[test]
    fn start_twice_is_invalid_transition() {
        let m = manager();
        let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
        m.start(&e.experiment_id).unwrap();
        let err = m.start(&e.experiment_id).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "start", .. }));
    }

    #[test]
    fn start_outside_draft_changes_nothing() {
        let m = manager();
        let reach = |status: ExperimentStatus| {
            let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
            let id = e.experiment_id;
            m.start(&id).unwrap();
            m.record_request(&id, "v1").unwrap();
            m.record_request(&id, "v2").unwrap();
            match status {
                ExperimentStatus::Running => {}
                ExperimentStatus::Completed => {
                    m.complete(&id, "v2", Some("done".into())).unwrap();
                }
                ExperimentStatus::Promoted => {
                    m.complete(&id, "v2", None).unwrap();
                    m.promote(&id).unwrap();
                }
                ExperimentStatus::RolledBack => {
                    m.complete(&id, "v1", None).unwrap();
                    m.rollback(&id, Some("reverted".into())).unwrap();
                }
                ExperimentStatus::Draft => unreachable!(),
            }
            id
        };

        for status in [
            ExperimentStatus::Running,
            ExperimentStatus::Completed,
            ExperimentStatus::Promoted,
            ExperimentStatus::RolledBack,
        ] {
            let id = reach(status);
            let before = m.get(&id).unwrap();
            assert_eq!(before.status, status);

            let err = m.start(&id).unwrap_err();
            assert!(
                matches!(err, Error::InvalidTransition { action: "start", .. }),
                "{status}: {err}"
            );
            assert_eq!(m.get(&id).unwrap(), before, "{status} changed");
        }
    }

    #[test]
    fn complete_requires_running() {
        let m = manager();
        let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
        let err = m.complete(&e.experiment_id, "v1", None).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
    }

    #[test]
    fn bad_winner_does_not_transition() {
        let m = manager();
        let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
        m.start(&e.experiment_id).unwrap();
        let err = m.complete(&e.experiment_id, "v3", None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(
            m.get(&e.experiment_id).unwrap().status,
            ExperimentStatus::Running
        );
    }

    #[test]
    fn promote_and_rollback_need_completed() {
        let m = manager();
        let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
        m.start(&e.experiment_id).unwrap();
        assert!(m.promote(&e.experiment_id).is_err());
        assert!(m.rollback(&e.experiment_id, None).is_err());

        m.complete(&e.experiment_id, "v1", None).unwrap();
        let e = m
            .rollback(&e.experiment_id, Some("regression in prod".into()))
            .unwrap();
        assert_eq!(e.status, ExperimentStatus::RolledBack);
        assert_eq!(e.conclusion.as_deref(), Some("regression in prod"));
        assert!(m.promote(&e.experiment_id).is_err());
    }

    #[test]
    fn record_request_in_any_state() {
        let m = manager();
        let e = m.create(NewExperiment::new("t", "v1", "v2")).unwrap();
        m.record_request(&e.experiment_id, "v1").unwrap();
        m.record_request(&e.experiment_id, "v2").unwrap();
        let e = m.record_request(&e.experiment_id, "v-other").unwrap();
        assert_eq!((e.control_requests, e.treatment_requests), (1, 2));
    }

    #[test]
    fn unknown_experiment_is_not_found() {
        let m = manager();
        let id = ExperimentId::new();
        assert!(m.start(&id).unwrap_err().is_not_found());
        assert!(m.record_request(&id, "v1").unwrap_err().is_not_found());
    }

    #[test]
    fn list_filters_then_limits() {
        let m = manager();
        for i in 0..5 {
            let e = m
                .create(NewExperiment::new(format!("e{i}"), "v1", "v2"))
                .unwrap();
            if i % 2 == 0 {
                m.start(&e.experiment_id).unwrap();
            }
        }
        assert_eq!(m.list(None, None).unwrap().len(), 5);
        assert_eq!(m.list(Some(ExperimentStatus::Running), None).unwrap().len(), 3);
        let limited = m.list(Some(ExperimentStatus::Running), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert!(limited.iter().all(|e| e.status == ExperimentStatus::Running));
        assert!(limited[0].created_at >= limited[1].created_at);
    }
}
