//! Intent definition storage.
//!
//! The store is the only shared mutable state in the framework. Creation is an
//! atomic compare-and-insert on the effective-scope key, so two racing creations of
//! the same `(intent_code, scope)` cannot both succeed.

mod matcher;
mod memory;
mod sled_store;

pub use matcher::{match_keywords, KeywordMatch};
pub use memory::InMemoryDefinitionStore;
pub use sled_store::SledDefinitionStore;

use crate::definition::{IntentDefinition, IntentScope};
use crate::error::IntentResult;
use std::collections::BTreeMap;

/// Before/after pair returned by [`DefinitionStore::modify`].
#[derive(Debug, Clone)]
pub struct Modified {
    pub before: IntentDefinition,
    pub after: IntentDefinition,
}

pub trait DefinitionStore: Send + Sync {
    /// Inserts `definition` unless an active definition with the same code exists in
    /// the same effective scope (→ `Conflict`). An inactive one is replaced.
    fn insert_new(&self, definition: IntentDefinition) -> IntentResult<IntentDefinition>;

    /// Exact lookup in one scope, active or not.
    fn get(&self, intent_code: &str, scope: &IntentScope) -> IntentResult<Option<IntentDefinition>>;

    /// Atomic read-modify-write. `apply` may run more than once on fresh copies when
    /// the backend retries, so it must be deterministic. `None` when absent.
    fn modify(
        &self,
        intent_code: &str,
        scope: &IntentScope,
        apply: &mut dyn FnMut(&mut IntentDefinition),
    ) -> IntentResult<Option<Modified>>;

    fn list(&self) -> IntentResult<Vec<IntentDefinition>>;

    /// Active definition for `intent_code` as seen by `tenant`: the tenant's own
    /// factory-scoped definition first, then the platform one.
    fn resolve(&self, intent_code: &str, tenant: Option<&str>) -> IntentResult<Option<IntentDefinition>> {
        if let Some(tenant) = tenant {
            let scoped = self.get(intent_code, &IntentScope::Factory(tenant.to_string()))?;
            if let Some(definition) = scoped.filter(|d| d.active) {
                return Ok(Some(definition));
            }
        }
        Ok(self
            .get(intent_code, &IntentScope::Platform)?
            .filter(|d| d.active))
    }

    /// Active definitions visible to `tenant`, with tenant definitions shadowing
    /// platform ones of the same code. Sorted by intent code.
    fn visible_to(&self, tenant: Option<&str>) -> IntentResult<Vec<IntentDefinition>> {
        let mut visible: BTreeMap<String, IntentDefinition> = BTreeMap::new();
        let all = self.list()?;
        for definition in all.iter().filter(|d| d.active && d.scope == IntentScope::Platform) {
            visible.insert(definition.intent_code.clone(), definition.clone());
        }
        if let Some(tenant) = tenant {
            for definition in all
                .into_iter()
                .filter(|d| d.active && d.scope.tenant_id() == Some(tenant))
            {
                visible.insert(definition.intent_code.clone(), definition);
            }
        }
        Ok(visible.into_values().collect())
    }
}
