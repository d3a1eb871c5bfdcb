//! A single grantable entitlement: a permission flag or a group membership.
//!
//! Configuration writes both as plain strings. A `group.` prefix marks a
//! group membership; anything else is a permission node. Comparison ignores
//! ASCII case on the name, but the configured spelling is kept for display
//! and for the commands sent to the entitlement store.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{JobGateError, Result};

const GROUP_PREFIX: &str = "group.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Permission,
    Group,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Permission => write!(f, "permission"),
            EntryKind::Group => write!(f, "group"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EntitlementEntry {
    Permission(String),
    Group(String),
}

impl EntitlementEntry {
    pub fn permission(name: impl Into<String>) -> Self {
        EntitlementEntry::Permission(name.into())
    }

    pub fn group(name: impl Into<String>) -> Self {
        EntitlementEntry::Group(name.into())
    }

    /// Parses the configuration syntax: `group.<name>` or a bare permission.
    ///
    /// Empty tokens, a `group.` prefix with no name, and tokens containing
    /// whitespace are rejected; the store has no representation for them.
    pub fn parse(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.is_empty() {
            return Err(JobGateError::Config("empty entitlement entry".into()));
        }
        if token.chars().any(char::is_whitespace) {
            return Err(JobGateError::Config(format!(
                "entitlement entry '{token}' contains whitespace"
            )));
        }

        match strip_prefix_ignore_case(token, GROUP_PREFIX) {
            Some("") => Err(JobGateError::Config(format!(
                "entitlement entry '{token}' names no group"
            ))),
            Some(group) => Ok(EntitlementEntry::Group(group.to_string())),
            None => Ok(EntitlementEntry::Permission(token.to_string())),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntitlementEntry::Permission(_) => EntryKind::Permission,
            EntitlementEntry::Group(_) => EntryKind::Group,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EntitlementEntry::Permission(name) | EntitlementEntry::Group(name) => name,
        }
    }
}

fn strip_prefix_ignore_case<'a>(token: &'a str, prefix: &str) -> Option<&'a str> {
    let head = token.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &token[prefix.len()..])
}

// Unicode case folding, char by char, shared by `eq` and `hash`.
fn folded(name: &str) -> impl Iterator<Item = char> + '_ {
    name.chars().flat_map(char::to_lowercase)
}

impl PartialEq for EntitlementEntry {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && folded(self.name()).eq(folded(other.name()))
    }
}

impl Eq for EntitlementEntry {}

impl Hash for EntitlementEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        for c in folded(self.name()) {
            c.hash(state);
        }
    }
}

impl fmt::Display for EntitlementEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntitlementEntry::Permission(name) => write!(f, "{name}"),
            EntitlementEntry::Group(name) => write!(f, "{GROUP_PREFIX}{name}"),
        }
    }
}

impl std::str::FromStr for EntitlementEntry {
    type Err = JobGateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for EntitlementEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EntitlementEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
