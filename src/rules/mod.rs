mod entry;
mod loader;
mod table;

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::error::Result;

pub use entry::{EntitlementEntry, EntryKind};
pub use loader::{DEFAULT_RULES, load_or_init, load_rules};
pub use table::{DEFAULT_INCOMPATIBLE_MESSAGE, JobRule, Messages, RuleTable};

/// Shared, atomically replaceable reference to the current rule table.
///
/// Readers take an `Arc` snapshot and keep using it even if a reload swaps
/// in a new table halfway through their transition.
#[derive(Debug)]
pub struct RuleTableHandle {
    current: RwLock<Arc<RuleTable>>,
}

impl RuleTableHandle {
    pub fn new(table: RuleTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    pub fn snapshot(&self) -> Arc<RuleTable> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in `table` and returns the one it replaced.
    pub fn replace(&self, table: RuleTable) -> Arc<RuleTable> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(table))
    }

    /// Reloads from `path`. On error the current table stays in place.
    pub fn reload_from(&self, path: &Path) -> Result<Arc<RuleTable>> {
        match load_rules(path) {
            Ok(table) => {
                self.replace(table);
                info!(path = %path.display(), "Rule table reloaded");
                Ok(self.snapshot())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Reload failed, keeping previous rule table");
                Err(e)
            }
        }
    }
}

impl Default for RuleTableHandle {
    fn default() -> Self {
        Self::new(RuleTable::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::JobId;

    #[test]
    fn snapshot_survives_replace() {
        let handle = RuleTableHandle::new(RuleTable::from_yaml_str("jobs:\n  miner:\n").unwrap());
        let before = handle.snapshot();

        handle.replace(RuleTable::from_yaml_str("jobs:\n  fisher:\n").unwrap());

        assert!(before.lookup(&JobId::from("miner")).is_some());
        let after = handle.snapshot();
        assert!(after.lookup(&JobId::from("miner")).is_none());
        assert!(after.lookup(&JobId::from("fisher")).is_some());
    }

    #[test]
    fn failed_reload_keeps_previous_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs_settings.yml");
        std::fs::write(&path, "jobs:\n  miner:\n").unwrap();

        let handle = RuleTableHandle::new(load_rules(&path).unwrap());
        std::fs::write(
            &path,
            "jobs:\n  miner:\n    on-join:\n      give-permissions-per-level:\n        x: [a]\n",
        )
        .unwrap();

        assert!(handle.reload_from(&path).is_err());
        assert!(handle.snapshot().lookup(&JobId::from("miner")).is_some());
    }

    #[test]
    fn successful_reload_swaps_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs_settings.yml");
        std::fs::write(&path, "jobs:\n  miner:\n").unwrap();
        let handle = RuleTableHandle::new(load_rules(&path).unwrap());

        std::fs::write(&path, "jobs:\n  hunter:\n").unwrap();
        let table = handle.reload_from(&path).unwrap();
        assert!(table.lookup(&JobId::from("hunter")).is_some());
        assert!(handle.snapshot().lookup(&JobId::from("miner")).is_none());
    }
}
