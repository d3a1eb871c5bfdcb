//! Typed rule table: one [`JobRule`] per configured job.
//!
//! The table is built once from raw configuration and never mutated. A reload
//! builds a fresh table and swaps it in through
//! [`RuleTableHandle`](super::RuleTableHandle).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::entry::EntitlementEntry;
use crate::error::{JobGateError, Result};
use crate::ids::JobId;

/// Message used when neither the job nor the global settings configure one.
pub const DEFAULT_INCOMPATIBLE_MESSAGE: &str =
    "You cannot join this job because you already have an incompatible job active: {job}";

/// Presentation settings for a denied join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Messages {
    pub incompatible_job: Option<String>,
    pub incompatible_job_sound: Option<String>,
}

impl Messages {
    /// Fills unset fields from `fallback`.
    fn or(&self, fallback: &Messages) -> Messages {
        Messages {
            incompatible_job: self
                .incompatible_job
                .clone()
                .or_else(|| fallback.incompatible_job.clone()),
            incompatible_job_sound: self
                .incompatible_job_sound
                .clone()
                .or_else(|| fallback.incompatible_job_sound.clone()),
        }
    }
}

/// Everything the engine knows about one job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobRule {
    /// Jobs that may not be active while joining this one, in declared order.
    pub incompatible_jobs: Vec<JobId>,
    /// Bundle granted on join, keyed by the minimum level that unlocks it.
    pub level_permissions: BTreeMap<u32, Vec<EntitlementEntry>>,
    /// Levels taken away on leave.
    pub on_leave_decrease: u32,
    /// Entries revoked on leave.
    pub on_leave_removals: Vec<EntitlementEntry>,
    pub messages: Messages,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleTable {
    jobs: HashMap<JobId, JobRule>,
    messages: Messages,
}

impl RuleTable {
    pub fn new(jobs: HashMap<JobId, JobRule>, messages: Messages) -> Self {
        Self { jobs, messages }
    }

    /// Builds a validated table from a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawSettings = serde_yaml::from_str(yaml)?;
        raw.into_table()
    }

    pub fn lookup(&self, job: &JobId) -> Option<&JobRule> {
        self.jobs.get(job)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Job ids in sorted order.
    pub fn job_ids(&self) -> Vec<&JobId> {
        let mut ids: Vec<&JobId> = self.jobs.keys().collect();
        ids.sort();
        ids
    }

    pub fn global_messages(&self) -> &Messages {
        &self.messages
    }

    /// Messages for a job: per-job overrides first, then global settings.
    pub fn messages_for(&self, job: &JobId) -> Messages {
        match self.lookup(job) {
            Some(rule) => rule.messages.or(&self.messages),
            None => self.messages.clone(),
        }
    }
}

// Raw shapes of the YAML document, validated into the types above.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawSettings {
    #[serde(default)]
    messages: RawMessages,
    #[serde(default)]
    jobs: BTreeMap<String, Option<RawJob>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawMessages {
    #[serde(default)]
    incompatible_job: Option<String>,
    #[serde(default)]
    incompatible_job_sound: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawJob {
    #[serde(default)]
    incompatible_jobs: Vec<String>,
    #[serde(default)]
    on_join: RawOnJoin,
    #[serde(default)]
    on_leave: RawOnLeave,
    #[serde(default)]
    messages: RawMessages,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawOnJoin {
    #[serde(default)]
    give_permissions_per_level: serde_yaml::Mapping,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawOnLeave {
    #[serde(default)]
    decrease_level: i64,
    #[serde(default)]
    remove_permissions: Vec<String>,
}

impl RawSettings {
    fn into_table(self) -> Result<RuleTable> {
        let messages = self.messages.into_messages();
        let mut jobs = HashMap::with_capacity(self.jobs.len());
        for (id, raw) in self.jobs {
            let rule = raw.unwrap_or_default().into_rule(&id)?;
            jobs.insert(JobId::new(id), rule);
        }
        Ok(RuleTable::new(jobs, messages))
    }
}

impl RawMessages {
    fn into_messages(self) -> Messages {
        Messages {
            incompatible_job: self.incompatible_job,
            incompatible_job_sound: self
                .incompatible_job_sound
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        }
    }
}

impl RawJob {
    fn into_rule(self, job: &str) -> Result<JobRule> {
        let incompatible_jobs = self
            .incompatible_jobs
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .map(JobId::new)
            .collect();

        let mut level_permissions = BTreeMap::new();
        for (key, value) in self.on_join.give_permissions_per_level {
            let level = parse_level_key(job, &key)?;
            let tokens: Vec<String> = match value {
                serde_yaml::Value::Null => Vec::new(),
                other => serde_yaml::from_value(other).map_err(|e| {
                    JobGateError::Config(format!(
                        "job '{job}': level {level} must be a list of entries: {e}"
                    ))
                })?,
            };
            let bundle = parse_entries(job, &tokens)?;
            if level_permissions.insert(level, bundle).is_some() {
                return Err(JobGateError::Config(format!(
                    "job '{job}': level {level} is defined more than once"
                )));
            }
        }

        let on_leave_decrease = u32::try_from(self.on_leave.decrease_level).map_err(|_| {
            JobGateError::Config(format!(
                "job '{job}': on-leave.decrease-level must be a non-negative integer, got {}",
                self.on_leave.decrease_level
            ))
        })?;

        Ok(JobRule {
            incompatible_jobs,
            level_permissions,
            on_leave_decrease,
            on_leave_removals: parse_entries(job, &self.on_leave.remove_permissions)?,
            messages: self.messages.into_messages(),
        })
    }
}

fn parse_level_key(job: &str, key: &serde_yaml::Value) -> Result<u32> {
    let text = match key {
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::String(s) => s.trim().to_string(),
        other => format!("{other:?}"),
    };
    text.parse::<u32>().map_err(|_| {
        JobGateError::Config(format!(
            "job '{job}': level key '{text}' is not a non-negative integer"
        ))
    })
}

fn parse_entries(job: &str, tokens: &[String]) -> Result<Vec<EntitlementEntry>> {
    tokens
        .iter()
        .map(|token| {
            EntitlementEntry::parse(token).map_err(|e| match e {
                JobGateError::Config(msg) => JobGateError::Config(format!("job '{job}': {msg}")),
                other => other,
            })
        })
        .collect()
}
