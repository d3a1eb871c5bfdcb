//! Job transition engine.
//!
//! Runs join and leave transitions against the injected collaborators. All
//! store and progression calls of one user happen under that user's lock, so
//! a join and a leave for the same user never interleave their
//! read → diff → apply → save sequences. [`TransitionEngine::dispatch`] also
//! keeps each user's events in arrival order. Different users run in parallel.

mod state;

pub use state::{TransitionFailure, TransitionKind, TransitionRecord, TransitionState};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::decay::{DecayOutcome, decay};
use crate::error::Result;
use crate::gate::{self, DenialNotice, GateDecision};
use crate::ids::{JobId, UserId};
use crate::ports::{EntitlementStore, JobProgression, Presenter, TransitionEvent};
use crate::reconciler::{self, ReconcileMode};
use crate::resolver::resolve;
use crate::rules::{EntitlementEntry, RuleTable, RuleTableHandle};

pub struct TransitionEngine {
    rules: Arc<RuleTableHandle>,
    progression: Arc<dyn JobProgression>,
    store: Arc<dyn EntitlementStore>,
    presenter: Arc<dyn Presenter>,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    user_tails: DashMap<UserId, QueueTail>,
    next_seq: AtomicU64,
}

// Last dispatched transition of a user; the next one waits on `done`.
struct QueueTail {
    seq: u64,
    done: oneshot::Receiver<()>,
}

impl TransitionEngine {
    pub fn new(
        rules: Arc<RuleTableHandle>,
        progression: Arc<dyn JobProgression>,
        store: Arc<dyn EntitlementStore>,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            rules,
            progression,
            store,
            presenter,
            user_locks: DashMap::new(),
            user_tails: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn rules(&self) -> &Arc<RuleTableHandle> {
        &self.rules
    }

    /// Runs the transition on a runtime task and returns its handle.
    ///
    /// Events of one user run in the order they were dispatched: the task
    /// waits for the user's previously dispatched transition before it
    /// starts. The task runs to completion even if the handle is dropped, so
    /// a leave that has started is never cut short.
    pub fn dispatch(self: &Arc<Self>, event: TransitionEvent) -> JoinHandle<TransitionRecord> {
        let user = event.user();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();
        // The queue position is taken here, before the task is spawned.
        let previous = self.user_tails.insert(
            user,
            QueueTail {
                seq,
                done: done_rx,
            },
        );

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(previous) = previous {
                // A closed channel means the earlier task is gone as well.
                let _ = previous.done.await;
            }
            let record = engine.handle(event).await;
            engine
                .user_tails
                .remove_if(&user, |_, tail| tail.seq == seq);
            let _ = done_tx.send(());
            record
        })
    }

    /// Runs one transition inline and returns its record.
    ///
    /// Failures do not surface as `Err`: the record ends in
    /// [`TransitionState::Failed`] and the failure is logged once here.
    pub async fn handle(&self, event: TransitionEvent) -> TransitionRecord {
        let user = event.user();
        let user_lock = self.user_lock(user);

        let record = {
            let _guard = user_lock.lock().await;
            let table = self.rules.snapshot();
            let mut record = TransitionRecord::new(&event);

            let result = match &event {
                TransitionEvent::Join { job, .. } => self.join(&table, user, job, &mut record).await,
                TransitionEvent::Leave { job, .. } => self.leave(&table, user, job, &mut record).await,
            };
            if let Err(e) = result {
                error!(
                    user = %user,
                    job = %record.job,
                    kind = %record.kind,
                    error = %e,
                    "Transition failed"
                );
                record.fail(&e);
            }
            record
        };

        drop(user_lock);
        self.release_user_lock(user);
        record
    }

    async fn join(
        &self,
        table: &RuleTable,
        user: UserId,
        job: &JobId,
        record: &mut TransitionRecord,
    ) -> Result<()> {
        record.advance(TransitionState::Evaluating);
        let rule = table.lookup(job);

        let active = self.progression.active_jobs(user).await?;
        if let GateDecision::Deny { conflicting } = gate::check(rule, &active) {
            let display_name = self.progression.display_name(&conflicting).await;
            let notice = DenialNotice::render(conflicting, &display_name, &table.messages_for(job));
            info!(
                user = %user,
                job = %job,
                conflicting = %notice.conflicting,
                "Join denied by incompatible job"
            );
            record.advance(TransitionState::Denied);
            if let Err(e) = self.presenter.deny(user, &notice).await {
                warn!(user = %user, error = %e, "Could not present denial notice");
            }
            record.denial = Some(notice);
            return Ok(());
        }
        record.advance(TransitionState::Allowed);

        let Some(rule) = rule else {
            debug!(job = %job, "No rule for job, nothing to grant");
            record.advance(TransitionState::Done);
            return Ok(());
        };
        if rule.level_permissions.is_empty() {
            record.advance(TransitionState::Done);
            return Ok(());
        }

        let level = self.progression.level(user, job).await?;
        let Some(bundle) = resolve(&rule.level_permissions, level) else {
            debug!(user = %user, job = %job, user_level = level, "No bundle defined at or below level");
            record.advance(TransitionState::Done);
            return Ok(());
        };
        record.resolved_level = Some(bundle.level);

        record.applied = self
            .reconcile(user, bundle.entries, ReconcileMode::Grant)
            .await?;
        info!(
            user = %user,
            job = %job,
            user_level = level,
            bundle_level = bundle.level,
            added = record.applied.ops.len(),
            "Permissions and groups assigned"
        );
        record.advance(TransitionState::Done);
        Ok(())
    }

    async fn leave(
        &self,
        table: &RuleTable,
        user: UserId,
        job: &JobId,
        record: &mut TransitionRecord,
    ) -> Result<()> {
        record.advance(TransitionState::Processing);
        let rule = table.lookup(job);

        // Removals run whether or not the level write-back succeeded.
        let decayed = self
            .decay_level(user, job, rule.map_or(0, |r| r.on_leave_decrease))
            .await;
        let removals = rule.map_or(&[][..], |r| r.on_leave_removals.as_slice());
        let revoked = self.reconcile(user, removals, ReconcileMode::Revoke).await;

        if let Ok(outcome) = &decayed {
            record.decay = Some(*outcome);
        }
        if let Ok(applied) = &revoked {
            record.applied = applied.clone();
        }
        decayed?;
        revoked?;

        info!(
            user = %user,
            job = %job,
            removed = record.applied.ops.len(),
            "Leave processed"
        );
        record.advance(TransitionState::Done);
        Ok(())
    }

    async fn decay_level(
        &self,
        user: UserId,
        job: &JobId,
        decrease: u32,
    ) -> Result<DecayOutcome> {
        let current = self.progression.level(user, job).await?;
        let outcome = decay(current, decrease);
        self.progression.set_level(user, job, outcome.new_level).await?;
        self.progression.set_xp(user, job, outcome.xp).await?;
        info!(
            user = %user,
            job = %job,
            decrease,
            from = outcome.previous_level,
            to = outcome.new_level,
            "Job level decreased on leave"
        );
        Ok(outcome)
    }

    async fn reconcile(
        &self,
        user: UserId,
        desired: &[EntitlementEntry],
        mode: ReconcileMode,
    ) -> Result<reconciler::AppliedOps> {
        if desired.is_empty() {
            return Ok(reconciler::AppliedOps::default());
        }
        let current = self.store.snapshot(user).await?;
        let plan = reconciler::plan(&current, desired, mode);
        reconciler::apply(self.store.as_ref(), user, plan).await
    }

    fn user_lock(&self, user: UserId) -> Arc<Mutex<()>> {
        self.user_locks.entry(user).or_default().clone()
    }

    // Drops the map's lock once no transition of the user holds or waits on it.
    fn release_user_lock(&self, user: UserId) {
        self.user_locks
            .remove_if(&user, |_, lock| Arc::strong_count(lock) == 1);
    }
}
