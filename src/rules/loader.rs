//! Reading the rule table from disk.

use std::path::Path;

use tracing::info;

use super::table::RuleTable;
use crate::error::Result;

/// Rule file written on first start when none exists yet.
pub const DEFAULT_RULES: &str = include_str!("../../assets/jobs_settings.yml");

/// Reads and validates the rule file at `path`.
pub fn load_rules(path: &Path) -> Result<RuleTable> {
    let contents = std::fs::read_to_string(path)?;
    let table = RuleTable::from_yaml_str(&contents)?;
    info!(path = %path.display(), jobs = table.len(), "Rule table loaded");
    Ok(table)
}

/// Like [`load_rules`], but first writes [`DEFAULT_RULES`] to `path` when the
/// file is missing and `write_default` is set.
pub fn load_or_init(path: &Path, write_default: bool) -> Result<RuleTable> {
    if write_default && !path.exists() {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_RULES)?;
        info!(path = %path.display(), "Wrote default rule file");
    }
    load_rules(path)
}
