use thiserror::Error;

use crate::ids::UserId;

#[derive(Debug, Error)]
pub enum JobGateError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("User {0} is offline")]
    UserOffline(UserId),

    #[error("Entitlement store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Job progression error: {0}")]
    Progression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, JobGateError>;

/// Classifies a transition failure for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    /// The user went offline before the store could be read.
    Offline,
    /// A collaborator call (store, save, progression) failed.
    System,
}

impl JobGateError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            JobGateError::UserOffline(_) => FailureKind::Offline,
            _ => FailureKind::System,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Offline => write!(f, "Offline"),
            FailureKind::System => write!(f, "System"),
        }
    }
}
