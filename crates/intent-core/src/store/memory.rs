//! In-process definition store. The DashMap entry API gives per-key atomicity for
//! compare-and-insert and read-modify-write.

use super::{DefinitionStore, Modified};
use crate::definition::{definition_key, IntentDefinition, IntentScope};
use crate::error::{IntentError, IntentResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct InMemoryDefinitionStore {
    definitions: DashMap<String, IntentDefinition>,
}

impl InMemoryDefinitionStore {
    pub fn new() -> Self {
        Self {
            definitions: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl DefinitionStore for InMemoryDefinitionStore {
    fn insert_new(&self, definition: IntentDefinition) -> IntentResult<IntentDefinition> {
        match self.definitions.entry(definition.key()) {
            Entry::Occupied(existing) if existing.get().active => Err(IntentError::Conflict(format!(
                "intent {} already exists in scope {}",
                definition.intent_code, definition.scope
            ))),
            Entry::Occupied(mut inactive) => {
                inactive.insert(definition.clone());
                Ok(definition)
            }
            Entry::Vacant(slot) => {
                slot.insert(definition.clone());
                Ok(definition)
            }
        }
    }

    fn get(&self, intent_code: &str, scope: &IntentScope) -> IntentResult<Option<IntentDefinition>> {
        Ok(self
            .definitions
            .get(&definition_key(intent_code, scope))
            .map(|entry| entry.value().clone()))
    }

    fn modify(
        &self,
        intent_code: &str,
        scope: &IntentScope,
        apply: &mut dyn FnMut(&mut IntentDefinition),
    ) -> IntentResult<Option<Modified>> {
        let Some(mut entry) = self.definitions.get_mut(&definition_key(intent_code, scope)) else {
            return Ok(None);
        };
        let before = entry.value().clone();
        apply(entry.value_mut());
        Ok(Some(Modified {
            before,
            after: entry.value().clone(),
        }))
    }

    fn list(&self) -> IntentResult<Vec<IntentDefinition>> {
        let mut all: Vec<IntentDefinition> =
            self.definitions.iter().map(|entry| entry.value().clone()).collect();
        all.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::IntentDraft;
    use crate::store::contract;
    use std::sync::Arc;

    #[test]
    fn duplicate_in_same_scope_conflicts() {
        contract::duplicate_in_same_scope_conflicts(&InMemoryDefinitionStore::new());
    }

    #[test]
    fn inactive_duplicate_is_replaced() {
        contract::inactive_duplicate_is_replaced(&InMemoryDefinitionStore::new());
    }

    #[test]
    fn resolve_prefers_tenant_then_platform() {
        contract::resolve_prefers_tenant_then_platform(&InMemoryDefinitionStore::new());
    }

    #[test]
    fn modify_returns_before_and_after() {
        contract::modify_returns_before_and_after(&InMemoryDefinitionStore::new());
    }

    #[test]
    fn visible_to_shadows_platform() {
        contract::visible_to_shadows_platform(&InMemoryDefinitionStore::new());
    }

    #[test]
    fn racing_creations_admit_exactly_one() {
        let store = Arc::new(InMemoryDefinitionStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let def = IntentDraft::new("INVENTORY_ALERT", "ALERT")
                        .into_definition(IntentScope::Factory("F1".into()), chrono::Utc::now());
                    store.insert_new(def).is_ok()
                })
            })
            .collect();
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
