//! Collaborators the engine talks to but does not own.
//!
//! The progression system owns job membership, levels and XP. The entitlement
//! store is the system of record for permissions and groups. Presentation
//! shows denial notices to users. Each is injected into
//! [`TransitionEngine`](crate::engine::TransitionEngine) at construction.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::gate::DenialNotice;
use crate::ids::{JobId, UserId};
use crate::rules::EntitlementEntry;

/// A job lifecycle notification from the progression system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransitionEvent {
    Join { user: UserId, job: JobId },
    Leave { user: UserId, job: JobId },
}

impl TransitionEvent {
    pub fn user(&self) -> UserId {
        match self {
            TransitionEvent::Join { user, .. } | TransitionEvent::Leave { user, .. } => *user,
        }
    }

    pub fn job(&self) -> &JobId {
        match self {
            TransitionEvent::Join { job, .. } | TransitionEvent::Leave { job, .. } => job,
        }
    }
}

#[async_trait]
pub trait JobProgression: Send + Sync {
    /// Jobs the user is currently active in.
    async fn active_jobs(&self, user: UserId) -> Result<HashSet<JobId>>;

    async fn level(&self, user: UserId, job: &JobId) -> Result<u32>;

    async fn set_level(&self, user: UserId, job: &JobId, level: u32) -> Result<()>;

    async fn set_xp(&self, user: UserId, job: &JobId, xp: f64) -> Result<()>;

    /// Human-readable job name for messages. Falls back to the id.
    async fn display_name(&self, job: &JobId) -> String {
        job.to_string()
    }
}

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Current entries of the user.
    ///
    /// Returns [`JobGateError::UserOffline`](crate::error::JobGateError::UserOffline)
    /// when the store has no loaded record for the user.
    async fn snapshot(&self, user: UserId) -> Result<HashSet<EntitlementEntry>>;

    async fn add_entry(&self, user: UserId, entry: &EntitlementEntry) -> Result<()>;

    async fn remove_entry(&self, user: UserId, entry: &EntitlementEntry) -> Result<()>;

    /// Persists every add/remove queued since the last save.
    async fn save(&self, user: UserId) -> Result<()>;
}

#[async_trait]
pub trait Presenter: Send + Sync {
    async fn deny(&self, user: UserId, notice: &DenialNotice) -> Result<()>;
}
