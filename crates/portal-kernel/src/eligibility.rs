//! Root eligibility: which top-level names the bridge may resolve.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// What the bridge knows about a top-level name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RootState {
    /// Always resolve remotely; failures are fatal.
    Forced,
    /// Resolved remotely before; keep resolving remotely.
    ConfirmedRemote,
    /// An auto-discovery probe found nothing; never probe again.
    ConfirmedAbsent,
}

/// Per-root eligibility table.
///
/// A name holds at most one state. Apart from [`Eligibility::force`] and
/// [`Eligibility::unforce`], transitions only move unknown names forward, so
/// concurrent marking can at worst cause a redundant probe.
pub struct Eligibility {
    roots: DashMap<String, RootState>,
}

impl Eligibility {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            roots: DashMap::new(),
        }
    }

    /// Force `name` remote, clearing any discovered state.
    pub fn force(&self, name: &str) {
        self.roots.insert(name.to_string(), RootState::Forced);
    }

    /// Drop the forced state of `name`. Returns whether it was forced.
    pub fn unforce(&self, name: &str) -> bool {
        self.roots
            .remove_if(name, |_, state| *state == RootState::Forced)
            .is_some()
    }

    /// Drop every forced name. Discovered states are kept.
    pub fn clear_forced(&self) {
        self.roots.retain(|_, state| *state != RootState::Forced);
    }

    /// Record a successful remote resolution of `name`.
    pub fn mark_remote(&self, name: &str) {
        match self.roots.entry(name.to_string()) {
            Entry::Occupied(mut e) => {
                if *e.get() != RootState::Forced {
                    e.insert(RootState::ConfirmedRemote);
                }
            }
            Entry::Vacant(e) => {
                debug!(root = %name, "Root confirmed remote");
                e.insert(RootState::ConfirmedRemote);
            }
        }
    }

    /// Remember that `name` is not served remotely. Only unknown names
    /// change; forced and confirmed names are left alone.
    pub fn mark_absent(&self, name: &str) {
        if let Entry::Vacant(e) = self.roots.entry(name.to_string()) {
            debug!(root = %name, "Root remembered as absent");
            e.insert(RootState::ConfirmedAbsent);
        }
    }

    /// Current state of `name`, if known.
    pub fn state(&self, name: &str) -> Option<RootState> {
        self.roots.get(name).map(|s| *s.value())
    }

    /// Names currently forced, sorted.
    pub fn forced(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .roots
            .iter()
            .filter(|e| *e.value() == RootState::Forced)
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Point-in-time copy of the whole table.
    pub fn snapshot(&self) -> BTreeMap<String, RootState> {
        self.roots
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

impl Default for Eligibility {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_clears_other_states() {
        let table = Eligibility::new();
        table.mark_absent("numpy");
        table.force("numpy");
        assert_eq!(table.state("numpy"), Some(RootState::Forced));

        table.mark_remote("numpy");
        assert_eq!(table.state("numpy"), Some(RootState::Forced));
        table.mark_absent("numpy");
        assert_eq!(table.state("numpy"), Some(RootState::Forced));
    }

    #[test]
    fn test_absent_only_from_unknown() {
        let table = Eligibility::new();
        table.mark_remote("pkg");
        table.mark_absent("pkg");
        assert_eq!(table.state("pkg"), Some(RootState::ConfirmedRemote));

        table.mark_absent("other");
        assert_eq!(table.state("other"), Some(RootState::ConfirmedAbsent));
    }

    #[test]
    fn test_unforce_only_affects_forced() {
        let table = Eligibility::new();
        table.force("a");
        table.mark_remote("b");
        assert!(table.unforce("a"));
        assert!(!table.unforce("b"));
        assert_eq!(table.state("a"), None);
        assert_eq!(table.state("b"), Some(RootState::ConfirmedRemote));
    }

    #[test]
    fn test_clear_forced_keeps_discoveries() {
        let table = Eligibility::new();
        table.force("b");
        table.force("a");
        table.mark_absent("c");
        assert_eq!(table.forced(), vec!["a".to_string(), "b".to_string()]);

        table.clear_forced();
        assert!(table.forced().is_empty());
        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.get("c"), Some(&RootState::ConfirmedAbsent));
    }
}
