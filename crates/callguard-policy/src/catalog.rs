//! Operation to allow-list mapping.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use callguard_types::{Operation, Principal};

use crate::config::PolicyConfig;

/// Who may perform each guarded operation.
///
/// Built once at startup and never mutated afterwards; share it behind an
/// `Arc`. Anything not listed is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionCatalog {
    allow: BTreeMap<Operation, BTreeSet<Principal>>,
}

impl PermissionCatalog {
    /// A catalog that denies every operation to everyone.
    pub fn deny_all() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            allow: config.allow.clone(),
        }
    }

    /// Add `principal` to the allow-list of `operation`.
    pub fn grant(mut self, operation: Operation, principal: Principal) -> Self {
        self.allow.entry(operation).or_default().insert(principal);
        self
    }

    pub fn allows(&self, operation: Operation, principal: &Principal) -> bool {
        self.allow
            .get(&operation)
            .is_some_and(|principals| principals.contains(principal))
    }

    pub fn allowed(&self, operation: Operation) -> impl Iterator<Item = &Principal> {
        self.allow.get(&operation).into_iter().flatten()
    }

    /// Total number of grants across all operations.
    pub fn grant_count(&self) -> usize {
        self.allow.values().map(BTreeSet::len).sum()
    }
}

impl From<&PolicyConfig> for PermissionCatalog {
    fn from(config: &PolicyConfig) -> Self {
        Self::from_config(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_all() {
        let catalog = PermissionCatalog::deny_all();
        for op in Operation::ALL {
            assert!(!catalog.allows(op, &Principal::module("java.base")));
            assert_eq!(catalog.allowed(op).count(), 0);
        }
    }

    #[test]
    fn test_grants_are_per_operation() {
        let x = Principal::module("app.x");
        let catalog = PermissionCatalog::deny_all().grant(Operation::ProcessStart, x.clone());
        assert!(catalog.allows(Operation::ProcessStart, &x));
        assert!(!catalog.allows(Operation::RuntimeExit, &x));
        assert!(!catalog.allows(Operation::ProcessStart, &Principal::module("app.y")));
        assert_eq!(catalog.grant_count(), 1);
    }
}
