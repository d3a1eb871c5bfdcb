use std::collections::BTreeMap;

use crate::rules::EntitlementEntry;

/// The bundle picked for a user, with the level threshold that unlocked it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedBundle<'a> {
    pub level: u32,
    pub entries: &'a [EntitlementEntry],
}

/// Nearest-level lookup.
///
/// Returns the bundle of the greatest defined level that does not exceed
/// `user_level`, or `None` when the table is empty or every defined level is
/// above the user. `None` means "change nothing", not an error.
pub fn resolve(
    level_permissions: &BTreeMap<u32, Vec<EntitlementEntry>>,
    user_level: u32,
) -> Option<ResolvedBundle<'_>> {
    level_permissions
        .range(..=user_level)
        .next_back()
        .map(|(level, entries)| ResolvedBundle {
            level: *level,
            entries,
        })
}
