//! Incompatibility gate for job joins.
//!
//! [`check`] is a pure predicate over the joining job's rule and the user's
//! active jobs. Only the joining job's own list is consulted: `hunter`
//! listing `fisher` does not stop a hunter from becoming a fisher.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::rules::{DEFAULT_INCOMPATIBLE_MESSAGE, JobRule, Messages};

const JOB_PLACEHOLDER: &str = "{job}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// First active job in the rule's declared incompatibility order.
    Deny { conflicting: JobId },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

/// Decides whether a user with `active_jobs` may join the job `rule` describes.
///
/// A missing rule (`None`) has no incompatibilities.
pub fn check(rule: Option<&JobRule>, active_jobs: &HashSet<JobId>) -> GateDecision {
    rule.into_iter()
        .flat_map(|r| r.incompatible_jobs.iter())
        .find(|job| active_jobs.contains(*job))
        .map_or(GateDecision::Allow, |job| GateDecision::Deny {
            conflicting: job.clone(),
        })
}

/// What presentation shows a user whose join was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenialNotice {
    pub conflicting: JobId,
    pub message: String,
    pub sound: Option<String>,
}

impl DenialNotice {
    /// Renders the configured template for `conflicting`.
    ///
    /// `{job}` in the template is replaced by the display name; a template
    /// without the placeholder gets the name appended.
    pub fn render(conflicting: JobId, display_name: &str, messages: &Messages) -> Self {
        let template = messages
            .incompatible_job
            .as_deref()
            .unwrap_or(DEFAULT_INCOMPATIBLE_MESSAGE);

        let message = if template.contains(JOB_PLACEHOLDER) {
            template.replace(JOB_PLACEHOLDER, display_name)
        } else {
            format!("{template}{display_name}")
        };

        let sound = messages
            .incompatible_job_sound
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty());

        Self {
            conflicting,
            message,
            sound,
        }
    }
}
