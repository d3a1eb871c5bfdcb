//! Job-driven entitlement engine.
//!
//! When a user joins a job, the engine checks the job's incompatibility list,
//! picks the permission bundle for the user's level and grants whatever the
//! user is missing. When a user leaves, it lowers the job level (never below
//! 1), clears XP and revokes the configured entries. Job progress and
//! entitlements live in external systems reached through [`ports`].

pub mod cli;
pub mod config;
pub mod decay;
pub mod engine;
pub mod error;
pub mod gate;
pub mod ids;
pub mod memory;
pub mod ports;
pub mod reconciler;
pub mod resolver;
pub mod rules;
pub mod simulate;
pub mod ui;

pub use engine::{TransitionEngine, TransitionRecord, TransitionState};
pub use error::{JobGateError, Result};
pub use ids::{JobId, UserId};
pub use ports::{EntitlementStore, JobProgression, Presenter, TransitionEvent};
pub use rules::{EntitlementEntry, RuleTable, RuleTableHandle};
