//! In-process implementations of the collaborator ports.
//!
//! They back the `simulate` command and the engine tests. Every call is
//! recorded so tests can assert what the engine read and wrote, and each
//! store can be made slow or failing on demand.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{JobGateError, Result};
use crate::gate::DenialNotice;
use crate::ids::{JobId, UserId};
use crate::ports::{EntitlementStore, JobProgression, Presenter};
use crate::reconciler::EntitlementOp;
use crate::rules::EntitlementEntry;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pause(latency: Option<Duration>) {
    if let Some(d) = latency {
        tokio::time::sleep(d).await;
    }
}

// ---------------------------------------------------------------------------
// Entitlement store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Snapshot,
    Add(EntitlementEntry),
    Remove(EntitlementEntry),
    Save,
}

#[derive(Debug, Default)]
struct StoredUser {
    committed: HashSet<EntitlementEntry>,
    pending: Vec<EntitlementOp>,
    saves: usize,
    offline: bool,
}

/// Entitlement store with explicit commit: adds and removes stay pending
/// until `save`, and a failed save discards them.
#[derive(Debug, Default)]
pub struct InMemoryEntitlementStore {
    users: Mutex<HashMap<UserId, StoredUser>>,
    calls: Mutex<Vec<(UserId, StoreCall)>>,
    fail_saves: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before touching state.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn insert_user(&self, user: UserId, entries: impl IntoIterator<Item = EntitlementEntry>) {
        lock(&self.users).insert(
            user,
            StoredUser {
                committed: entries.into_iter().collect(),
                ..Default::default()
            },
        );
    }

    pub fn set_offline(&self, user: UserId, offline: bool) {
        lock(&self.users).entry(user).or_default().offline = offline;
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Committed entries of `user`, if the store knows them.
    pub fn snapshot_of(&self, user: UserId) -> Option<HashSet<EntitlementEntry>> {
        lock(&self.users).get(&user).map(|u| u.committed.clone())
    }

    pub fn save_count(&self, user: UserId) -> usize {
        lock(&self.users).get(&user).map_or(0, |u| u.saves)
    }

    pub fn calls_for(&self, user: UserId) -> Vec<StoreCall> {
        lock(&self.calls)
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn record(&self, user: UserId, call: StoreCall) {
        lock(&self.calls).push((user, call));
    }

    fn with_online_user<T>(&self, user: UserId, f: impl FnOnce(&mut StoredUser) -> T) -> Result<T> {
        let mut users = lock(&self.users);
        match users.get_mut(&user) {
            Some(stored) if !stored.offline => Ok(f(stored)),
            _ => Err(JobGateError::UserOffline(user)),
        }
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn snapshot(&self, user: UserId) -> Result<HashSet<EntitlementEntry>> {
        pause(self.latency).await;
        self.record(user, StoreCall::Snapshot);
        self.with_online_user(user, |u| u.committed.clone())
    }

    async fn add_entry(&self, user: UserId, entry: &EntitlementEntry) -> Result<()> {
        pause(self.latency).await;
        self.record(user, StoreCall::Add(entry.clone()));
        self.with_online_user(user, |u| u.pending.push(EntitlementOp::Add(entry.clone())))
    }

    async fn remove_entry(&self, user: UserId, entry: &EntitlementEntry) -> Result<()> {
        pause(self.latency).await;
        self.record(user, StoreCall::Remove(entry.clone()));
        self.with_online_user(user, |u| {
            u.pending.push(EntitlementOp::Remove(entry.clone()))
        })
    }

    async fn save(&self, user: UserId) -> Result<()> {
        pause(self.latency).await;
        self.record(user, StoreCall::Save);
        let fail = self.fail_saves.load(Ordering::SeqCst);
        self.with_online_user(user, |u| {
            let pending = std::mem::take(&mut u.pending);
            if fail {
                return Err(JobGateError::StoreUnavailable(format!(
                    "save rejected for {user}"
                )));
            }
            for op in pending {
                match op {
                    EntitlementOp::Add(entry) => {
                        u.committed.insert(entry);
                    }
                    EntitlementOp::Remove(entry) => {
                        u.committed.remove(&entry);
                    }
                }
            }
            u.saves += 1;
            Ok(())
        })?
    }
}

// ---------------------------------------------------------------------------
// Job progression
// ---------------------------------------------------------------------------

/// Per (user, job) progress as the progression system tracks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub xp: f64,
    #[serde(default)]
    pub active: bool,
}

fn default_level() -> u32 {
    1
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            level: default_level(),
            xp: 0.0,
            active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressionCall {
    ActiveJobs,
    Level(JobId),
    SetLevel(JobId, u32),
    SetXp(JobId, f64),
}

#[derive(Debug, Default)]
pub struct InMemoryProgression {
    users: Mutex<HashMap<UserId, HashMap<JobId, JobState>>>,
    display_names: Mutex<HashMap<JobId, String>>,
    calls: Mutex<Vec<(UserId, ProgressionCall)>>,
    latency: Option<Duration>,
}

impl InMemoryProgression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_job(&self, user: UserId, job: impl Into<JobId>, state: JobState) {
        lock(&self.users)
            .entry(user)
            .or_default()
            .insert(job.into(), state);
    }

    /// Marks the job active or inactive, creating it at level 1 if unknown.
    pub fn set_active(&self, user: UserId, job: &JobId, active: bool) {
        lock(&self.users)
            .entry(user)
            .or_default()
            .entry(job.clone())
            .or_default()
            .active = active;
    }

    pub fn set_display_name(&self, job: impl Into<JobId>, name: impl Into<String>) {
        lock(&self.display_names).insert(job.into(), name.into());
    }

    pub fn job_state(&self, user: UserId, job: &JobId) -> Option<JobState> {
        lock(&self.users).get(&user).and_then(|jobs| jobs.get(job).cloned())
    }

    pub fn jobs_of(&self, user: UserId) -> HashMap<JobId, JobState> {
        lock(&self.users).get(&user).cloned().unwrap_or_default()
    }

    pub fn calls_for(&self, user: UserId) -> Vec<ProgressionCall> {
        lock(&self.calls)
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, c)| c.clone())
            .collect()
    }

    fn record(&self, user: UserId, call: ProgressionCall) {
        lock(&self.calls).push((user, call));
    }
}

#[async_trait]
impl JobProgression for InMemoryProgression {
    async fn active_jobs(&self, user: UserId) -> Result<HashSet<JobId>> {
        pause(self.latency).await;
        self.record(user, ProgressionCall::ActiveJobs);
        Ok(lock(&self.users)
            .get(&user)
            .map(|jobs| {
                jobs.iter()
                    .filter(|(_, state)| state.active)
                    .map(|(job, _)| job.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn level(&self, user: UserId, job: &JobId) -> Result<u32> {
        pause(self.latency).await;
        self.record(user, ProgressionCall::Level(job.clone()));
        Ok(self.job_state(user, job).unwrap_or_default().level)
    }

    async fn set_level(&self, user: UserId, job: &JobId, level: u32) -> Result<()> {
        pause(self.latency).await;
        self.record(user, ProgressionCall::SetLevel(job.clone(), level));
        lock(&self.users)
            .entry(user)
            .or_default()
            .entry(job.clone())
            .or_default()
            .level = level;
        Ok(())
    }

    async fn set_xp(&self, user: UserId, job: &JobId, xp: f64) -> Result<()> {
        pause(self.latency).await;
        self.record(user, ProgressionCall::SetXp(job.clone(), xp));
        lock(&self.users)
            .entry(user)
            .or_default()
            .entry(job.clone())
            .or_default()
            .xp = xp;
        Ok(())
    }

    async fn display_name(&self, job: &JobId) -> String {
        lock(&self.display_names)
            .get(job)
            .cloned()
            .unwrap_or_else(|| job.to_string())
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// Keeps every denial notice instead of showing it.
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    notices: Mutex<Vec<(UserId, DenialNotice)>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(UserId, DenialNotice)> {
        lock(&self.notices).clone()
    }
}

#[async_trait]
impl Presenter for RecordingPresenter {
    async fn deny(&self, user: UserId, notice: &DenialNotice) -> Result<()> {
        lock(&self.notices).push((user, notice.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_keeps_changes_pending_until_save() {
        let store = InMemoryEntitlementStore::new();
        let user = UserId::new_v4();
        store.insert_user(user, []);

        store
            .add_entry(user, &EntitlementEntry::group("vip"))
            .await
            .unwrap();
        assert!(store.snapshot(user).await.unwrap().is_empty());

        store.save(user).await.unwrap();
        assert!(
            store
                .snapshot(user)
                .await
                .unwrap()
                .contains(&EntitlementEntry::group("vip"))
        );
    }

    #[tokio::test]
    async fn unknown_or_offline_user_is_offline() {
        let store = InMemoryEntitlementStore::new();
        let user = UserId::new_v4();
        assert!(matches!(
            store.snapshot(user).await,
            Err(JobGateError::UserOffline(u)) if u == user
        ));

        store.insert_user(user, []);
        store.set_offline(user, true);
        assert!(store.snapshot(user).await.is_err());
    }

    #[tokio::test]
    async fn progression_reports_only_active_jobs() {
        let progression = InMemoryProgression::new();
        let user = UserId::new_v4();
        progression.set_job(
            user,
            "fisher",
            JobState {
                active: true,
                ..Default::default()
            },
        );
        progression.set_job(user, "miner", JobState::default());

        let active = progression.active_jobs(user).await.unwrap();
        assert_eq!(active, HashSet::from([JobId::from("fisher")]));
    }

    #[tokio::test]
    async fn display_name_falls_back_to_id() {
        let progression = InMemoryProgression::new();
        progression.set_display_name("fisher", "Fisherman");
        assert_eq!(progression.display_name(&JobId::from("fisher")).await, "Fisherman");
        assert_eq!(progression.display_name(&JobId::from("miner")).await, "miner");
    }

    #[test]
    fn job_state_defaults_from_json() {
        let state: JobState = serde_json::from_str(r#"{"active": true}"#).unwrap();
        assert_eq!(state.level, 1);
        assert_eq!(state.xp, 0.0);
        assert!(state.active);
    }
}
