//! The one place entitlements are diffed and applied.
//!
//! [`plan`] is pure: it compares a desired list with the store's current
//! snapshot and yields only the commands that change something. [`apply`]
//! sends those commands and then commits them with a single `save`.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::ids::UserId;
use crate::ports::EntitlementStore;
use crate::rules::EntitlementEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileMode {
    /// Add desired entries the user lacks.
    Grant,
    /// Remove desired entries the user holds.
    Revoke,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "entry", rename_all = "lowercase")]
pub enum EntitlementOp {
    Add(EntitlementEntry),
    Remove(EntitlementEntry),
}

impl EntitlementOp {
    pub fn entry(&self) -> &EntitlementEntry {
        match self {
            EntitlementOp::Add(entry) | EntitlementOp::Remove(entry) => entry,
        }
    }
}

impl fmt::Display for EntitlementOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitlementOp::Add(entry) => write!(f, "+{entry}"),
            EntitlementOp::Remove(entry) => write!(f, "-{entry}"),
        }
    }
}

/// Ordered commands for one transition, in the order of the desired list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub ops: Vec<EntitlementOp>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Commands that reached the store and were committed by a successful save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedOps {
    pub ops: Vec<EntitlementOp>,
    pub saved: bool,
}

/// Computes the minimal command list turning `current` toward `desired`.
///
/// An entry listed twice in `desired` produces at most one command.
pub fn plan(
    current: &HashSet<EntitlementEntry>,
    desired: &[EntitlementEntry],
    mode: ReconcileMode,
) -> ReconcilePlan {
    let mut seen = HashSet::with_capacity(desired.len());
    let ops = desired
        .iter()
        .filter(|entry| seen.insert(*entry))
        .filter_map(|entry| match (mode, current.contains(entry)) {
            (ReconcileMode::Grant, false) => Some(EntitlementOp::Add(entry.clone())),
            (ReconcileMode::Revoke, true) => Some(EntitlementOp::Remove(entry.clone())),
            _ => None,
        })
        .collect();
    ReconcilePlan { ops }
}

/// Sends every command of `plan` to `store`, then saves once.
///
/// An empty plan touches nothing. If any command or the save fails the error
/// is returned and none of the plan is reported as applied.
pub async fn apply<S>(store: &S, user: UserId, plan: ReconcilePlan) -> Result<AppliedOps>
where
    S: EntitlementStore + ?Sized,
{
    if plan.is_empty() {
        debug!(user = %user, "Nothing to reconcile");
        return Ok(AppliedOps::default());
    }

    for op in &plan.ops {
        match op {
            EntitlementOp::Add(entry) => store.add_entry(user, entry).await?,
            EntitlementOp::Remove(entry) => store.remove_entry(user, entry).await?,
        }
        debug!(user = %user, op = %op, "Queued entitlement change");
    }
    store.save(user).await?;

    for op in &plan.ops {
        match op {
            EntitlementOp::Add(entry) => {
                info!(user = %user, kind = %entry.kind(), entry = entry.name(), "Entitlement added")
            }
            EntitlementOp::Remove(entry) => {
                info!(user = %user, kind = %entry.kind(), entry = entry.name(), "Entitlement removed")
            }
        }
    }

    Ok(AppliedOps {
        ops: plan.ops,
        saved: true,
    })
}
