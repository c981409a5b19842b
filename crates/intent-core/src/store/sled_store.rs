//! Sled-backed definition store. One tree, keyed by `platform/{code}` or
//! `factory/{tenant}/{code}`, JSON values. Writes go through `compare_and_swap`
//! retry loops so concurrent writers never both win.

use super::{DefinitionStore, Modified};
use crate::definition::{definition_key, IntentDefinition, IntentScope};
use crate::error::{IntentError, IntentResult};
use sled::{Db, Tree};
use std::path::Path;

const DEFINITIONS_TREE: &str = "intent_definitions";

pub struct SledDefinitionStore {
    tree: Tree,
}

impl SledDefinitionStore {
    /// Opens (or creates) a sled database at `path` and uses its definitions tree.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    /// Uses the definitions tree of an already opened database. sled is
    /// single-process, so stores sharing a path must share the `Db`.
    pub fn from_db(db: &Db) -> Result<Self, sled::Error> {
        Ok(Self {
            tree: db.open_tree(DEFINITIONS_TREE)?,
        })
    }

    fn decode(raw: &[u8]) -> IntentResult<IntentDefinition> {
        Ok(serde_json::from_slice(raw)?)
    }
}

impl DefinitionStore for SledDefinitionStore {
    fn insert_new(&self, definition: IntentDefinition) -> IntentResult<IntentDefinition> {
        let key = definition.key();
        let encoded = serde_json::to_vec(&definition)?;
        loop {
            let current = self.tree.get(key.as_bytes())?;
            if let Some(raw) = &current {
                if Self::decode(raw)?.active {
                    return Err(IntentError::Conflict(format!(
                        "intent {} already exists in scope {}",
                        definition.intent_code, definition.scope
                    )));
                }
            }
            match self
                .tree
                .compare_and_swap(key.as_bytes(), current, Some(encoded.clone()))?
            {
                Ok(()) => {
                    self.tree.flush()?;
                    return Ok(definition);
                }
                Err(_) => {
                    tracing::debug!(target: "intent::store", key = %key, "insert raced; retrying");
                }
            }
        }
    }

    fn get(&self, intent_code: &str, scope: &IntentScope) -> IntentResult<Option<IntentDefinition>> {
        self.tree
            .get(definition_key(intent_code, scope).as_bytes())?
            .map(|raw| Self::decode(&raw))
            .transpose()
    }

    fn modify(
        &self,
        intent_code: &str,
        scope: &IntentScope,
        apply: &mut dyn FnMut(&mut IntentDefinition),
    ) -> IntentResult<Option<Modified>> {
        let key = definition_key(intent_code, scope);
        loop {
            let Some(current) = self.tree.get(key.as_bytes())? else {
                return Ok(None);
            };
            let before = Self::decode(&current)?;
            let mut after = before.clone();
            apply(&mut after);
            let encoded = serde_json::to_vec(&after)?;
            match self
                .tree
                .compare_and_swap(key.as_bytes(), Some(current), Some(encoded))?
            {
                Ok(()) => {
                    self.tree.flush()?;
                    return Ok(Some(Modified { before, after }));
                }
                Err(_) => {
                    tracing::debug!(target: "intent::store", key = %key, "modify raced; retrying");
                }
            }
        }
    }

    fn list(&self) -> IntentResult<Vec<IntentDefinition>> {
        let mut all = Vec::new();
        for item in self.tree.iter() {
            let (_, raw) = item?;
            all.push(Self::decode(&raw)?);
        }
        Ok(all)
    }
}
