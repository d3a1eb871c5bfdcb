//! Scenario replay with the in-memory collaborators.
//!
//! A scenario seeds users (job progress, current entitlements, online flag)
//! and lists join/leave events. The simulator stands in for the progression
//! system: it feeds each event to the engine and flips the job's `active`
//! flag the way the real system would once the transition is accepted.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::engine::{TransitionEngine, TransitionKind, TransitionRecord};
use crate::ids::{JobId, UserId};
use crate::memory::{InMemoryEntitlementStore, InMemoryProgression, JobState, RecordingPresenter};
use crate::ports::TransitionEvent;
use crate::rules::{EntitlementEntry, RuleTableHandle};

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub users: Vec<ScenarioUser>,
    #[serde(default)]
    pub display_names: HashMap<String, String>,
    pub events: Vec<ScenarioEvent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioUser {
    pub name: String,
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default = "default_online")]
    pub online: bool,
    #[serde(default)]
    pub entitlements: Vec<EntitlementEntry>,
    #[serde(default)]
    pub jobs: HashMap<String, JobState>,
}

fn default_online() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Join,
    Leave,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioEvent {
    pub kind: EventKind,
    /// Name of a user declared in `users`.
    pub user: String,
    pub job: String,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self> {
        let scenario: Scenario = serde_json::from_str(json).context("invalid scenario JSON")?;
        scenario.validate()?;
        Ok(scenario)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scenario {}", path.display()))?;
        Self::from_json(&contents)
    }

    fn validate(&self) -> Result<()> {
        let mut names = std::collections::HashSet::new();
        for user in &self.users {
            if !names.insert(user.name.as_str()) {
                bail!("user '{}' is declared twice", user.name);
            }
        }
        for event in &self.events {
            if !names.contains(event.user.as_str()) {
                bail!("event references unknown user '{}'", event.user);
            }
        }
        Ok(())
    }
}

/// Final state of one user after the replay.
#[derive(Debug, Clone, Serialize)]
pub struct UserOutcome {
    pub name: String,
    pub id: UserId,
    pub jobs: BTreeMap<JobId, JobState>,
    pub entitlements: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub records: Vec<TransitionRecord>,
    pub users: Vec<UserOutcome>,
}

impl SimulationReport {
    pub fn user_name(&self, id: UserId) -> &str {
        self.users
            .iter()
            .find(|u| u.id == id)
            .map_or("?", |u| u.name.as_str())
    }
}

pub struct Simulator {
    engine: Arc<TransitionEngine>,
    progression: Arc<InMemoryProgression>,
    store: Arc<InMemoryEntitlementStore>,
    users: Vec<(String, UserId)>,
}

impl Simulator {
    pub fn new(rules: Arc<RuleTableHandle>, scenario: &Scenario) -> Self {
        let progression = Arc::new(InMemoryProgression::new());
        let store = Arc::new(InMemoryEntitlementStore::new());

        for (job, name) in &scenario.display_names {
            progression.set_display_name(job.as_str(), name.clone());
        }

        let mut users = Vec::with_capacity(scenario.users.len());
        for seeded in &scenario.users {
            let id = seeded.id.map_or_else(UserId::new_v4, UserId);
            for (job, state) in &seeded.jobs {
                progression.set_job(id, job.as_str(), state.clone());
            }
            store.insert_user(id, seeded.entitlements.iter().cloned());
            store.set_offline(id, !seeded.online);
            users.push((seeded.name.clone(), id));
        }

        let engine = Arc::new(TransitionEngine::new(
            rules,
            progression.clone(),
            store.clone(),
            Arc::new(RecordingPresenter::new()),
        ));

        Self {
            engine,
            progression,
            store,
            users,
        }
    }

    fn user_id(&self, name: &str) -> Option<UserId> {
        self.users.iter().find(|(n, _)| n == name).map(|(_, id)| *id)
    }

    fn to_event(&self, event: &ScenarioEvent) -> Result<TransitionEvent> {
        let user = self
            .user_id(&event.user)
            .with_context(|| format!("unknown user '{}'", event.user))?;
        let job = JobId::new(event.job.clone());
        Ok(match event.kind {
            EventKind::Join => TransitionEvent::Join { user, job },
            EventKind::Leave => TransitionEvent::Leave { user, job },
        })
    }

    /// Replays `events` and returns the records in event order.
    ///
    /// Sequential mode waits for each transition before sending the next.
    /// Parallel mode runs one lane per user: a user's events stay in order
    /// and each sees the membership changes of the ones before it, while
    /// different users run concurrently.
    pub async fn run(&self, events: &[ScenarioEvent], parallel: bool) -> Result<SimulationReport> {
        let events = events
            .iter()
            .map(|e| self.to_event(e))
            .collect::<Result<Vec<_>>>()?;

        let records = if parallel {
            self.run_lanes(events).await?
        } else {
            let mut records = Vec::with_capacity(events.len());
            for event in events {
                let record = self
                    .engine
                    .dispatch(event)
                    .await
                    .context("transition task panicked")?;
                track_membership(&self.progression, &record);
                records.push(record);
            }
            records
        };

        Ok(SimulationReport {
            records,
            users: self.outcomes(),
        })
    }

    async fn run_lanes(&self, events: Vec<TransitionEvent>) -> Result<Vec<TransitionRecord>> {
        let mut lanes: HashMap<UserId, Vec<(usize, TransitionEvent)>> = HashMap::new();
        for (index, event) in events.into_iter().enumerate() {
            lanes.entry(event.user()).or_default().push((index, event));
        }

        let mut tasks = JoinSet::new();
        for lane in lanes.into_values() {
            let engine = Arc::clone(&self.engine);
            let progression = Arc::clone(&self.progression);
            tasks.spawn(async move {
                let mut done = Vec::with_capacity(lane.len());
                for (index, event) in lane {
                    let record = engine.handle(event).await;
                    track_membership(&progression, &record);
                    done.push((index, record));
                }
                done
            });
        }

        let mut indexed = Vec::new();
        while let Some(lane) = tasks.join_next().await {
            indexed.extend(lane.context("transition task panicked")?);
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, record)| record).collect())
    }

    fn outcomes(&self) -> Vec<UserOutcome> {
        self.users
            .iter()
            .map(|(name, id)| {
                let mut entitlements: Vec<String> = self
                    .store
                    .snapshot_of(*id)
                    .unwrap_or_default()
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                entitlements.sort();
                UserOutcome {
                    name: name.clone(),
                    id: *id,
                    jobs: self.progression.jobs_of(*id).into_iter().collect(),
                    entitlements,
                }
            })
            .collect()
    }
}

// Denied joins are vetoed; every other transition happened upstream.
fn track_membership(progression: &InMemoryProgression, record: &TransitionRecord) {
    match record.kind {
        TransitionKind::Join if !record.is_denied() => {
            progression.set_active(record.user, &record.job, true)
        }
        TransitionKind::Leave => progression.set_active(record.user, &record.job, false),
        TransitionKind::Join => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::TransitionState;
    use crate::rules::RuleTable;

    const RULES: &str = r#"
jobs:
  miner:
    incompatible-jobs: [fisher]
    on-join:
      give-permissions-per-level:
        1: [perm.a]
        5: [perm.b, group.vip]
    on-leave:
      decrease-level: 2
      remove-permissions: [perm.a, perm.b, group.vip]
  fisher:
    on-join:
      give-permissions-per-level:
        1: [perm.rod]
"#;

    const SCENARIO: &str = r#"{
        "users": [
            {"name": "alex", "entitlements": ["perm.b"], "jobs": {"miner": {"level": 7}}},
            {"name": "sam", "jobs": {"miner": {"level": 3}}}
        ],
        "display_names": {"fisher": "Fisherman"},
        "events": [
            {"kind": "join", "user": "alex", "job": "miner"},
            {"kind": "join", "user": "sam", "job": "fisher"},
            {"kind": "join", "user": "sam", "job": "miner"},
            {"kind": "leave", "user": "alex", "job": "miner"}
        ]
    }"#;

    fn rules() -> Arc<RuleTableHandle> {
        Arc::new(RuleTableHandle::new(RuleTable::from_yaml_str(RULES).unwrap()))
    }

    #[tokio::test]
    async fn replays_events_in_order() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();
        let sim = Simulator::new(rules(), &scenario);
        let report = sim.run(&scenario.events, false).await.unwrap();

        let states: Vec<TransitionState> = report.records.iter().map(|r| r.state).collect();
        assert_eq!(
            states,
            vec![
                TransitionState::Done,
                TransitionState::Done,
                TransitionState::Denied,
                TransitionState::Done
            ]
        );
        assert_eq!(
            report.records[2].denial.as_ref().unwrap().message,
            "You cannot join this job because you already have an incompatible job active: Fisherman"
        );

        let alex = &report.users[0];
        assert!(alex.entitlements.is_empty());
        let miner = &alex.jobs[&JobId::from("miner")];
        assert_eq!(miner.level, 5);
        assert!(!miner.active);

        let sam = &report.users[1];
        assert_eq!(sam.entitlements, vec!["perm.rod".to_string()]);
        assert!(sam.jobs[&JobId::from("fisher")].active);
        assert!(!sam.jobs[&JobId::from("miner")].active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_replay_matches_sequential_gate_decisions() {
        let scenario = Scenario::from_json(SCENARIO).unwrap();

        let sequential = Simulator::new(rules(), &scenario)
            .run(&scenario.events, false)
            .await
            .unwrap();
        let parallel = Simulator::new(rules(), &scenario)
            .run(&scenario.events, true)
            .await
            .unwrap();

        let states = |report: &SimulationReport| -> Vec<TransitionState> {
            report.records.iter().map(|r| r.state).collect()
        };
        assert_eq!(states(&parallel), states(&sequential));
        assert_eq!(parallel.records[2].state, TransitionState::Denied);

        let sam = &parallel.users[1];
        assert!(sam.jobs[&JobId::from("fisher")].active);
        assert!(!sam.jobs[&JobId::from("miner")].active);
        assert_eq!(sam.entitlements, vec!["perm.rod".to_string()]);
    }

    #[tokio::test]
    async fn offline_user_fails_without_changes() {
        let scenario = Scenario::from_json(
            r#"{
                "users": [{"name": "kim", "online": false, "jobs": {"miner": {"level": 9}}}],
                "events": [{"kind": "join", "user": "kim", "job": "miner"}]
            }"#,
        )
        .unwrap();
        let sim = Simulator::new(rules(), &scenario);
        let report = sim.run(&scenario.events, true).await.unwrap();

        assert!(report.records[0].is_failed());
        assert!(report.users[0].entitlements.is_empty());
    }

    #[test]
    fn rejects_unknown_user_in_events() {
        let err = Scenario::from_json(
            r#"{"users": [], "events": [{"kind": "join", "user": "ghost", "job": "miner"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn rejects_malformed_entitlement() {
        assert!(
            Scenario::from_json(
                r#"{"users": [{"name": "a", "entitlements": ["group."]}], "events": []}"#
            )
            .is_err()
        );
    }
}
