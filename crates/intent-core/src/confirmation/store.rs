use super::{ConfirmationStore, PendingConfirmation};
use crate::error::IntentResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sled::{Db, Tree};
use std::path::Path;

const CONFIRMATIONS_TREE: &str = "intent_confirmations";

/// Process-local pending confirmations.
#[derive(Debug, Default)]
pub struct InMemoryConfirmationStore {
    pending: DashMap<String, PendingConfirmation>,
}

impl InMemoryConfirmationStore {
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }
}

impl ConfirmationStore for InMemoryConfirmationStore {
    fn put(&self, pending: PendingConfirmation) -> IntentResult<()> {
        self.pending.insert(pending.token.clone(), pending);
        Ok(())
    }

    fn take(&self, token: &str) -> IntentResult<Option<PendingConfirmation>> {
        Ok(self.pending.remove(token).map(|(_, pending)| pending))
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> IntentResult<usize> {
        let before = self.pending.len();
        self.pending.retain(|_, pending| !pending.is_expired(now));
        Ok(before.saturating_sub(self.pending.len()))
    }

    fn len(&self) -> IntentResult<usize> {
        Ok(self.pending.len())
    }
}

/// Pending confirmations persisted in a sled tree so tokens outlive a restart.
pub struct SledConfirmationStore {
    tree: Tree,
}

impl SledConfirmationStore {
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Self::from_db(&db)
    }

    pub fn from_db(db: &Db) -> Result<Self, sled::Error> {
        Ok(Self {
            tree: db.open_tree(CONFIRMATIONS_TREE)?,
        })
    }
}

impl ConfirmationStore for SledConfirmationStore {
    fn put(&self, pending: PendingConfirmation) -> IntentResult<()> {
        let encoded = serde_json::to_vec(&pending)?;
        self.tree.insert(pending.token.as_bytes(), encoded)?;
        self.tree.flush()?;
        Ok(())
    }

    fn take(&self, token: &str) -> IntentResult<Option<PendingConfirmation>> {
        match self.tree.remove(token.as_bytes())? {
            Some(raw) => {
                self.tree.flush()?;
                Ok(Some(serde_json::from_slice(&raw)?))
            }
            None => Ok(None),
        }
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> IntentResult<usize> {
        let mut removed = 0;
        for item in self.tree.iter() {
            let (key, raw) = item?;
            let expired = match serde_json::from_slice::<PendingConfirmation>(&raw) {
                Ok(pending) => pending.is_expired(now),
                Err(err) => {
                    tracing::warn!(target: "intent::confirm", error = %err, "dropping undecodable confirmation");
                    true
                }
            };
            if expired && self.tree.remove(&key)?.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.tree.flush()?;
        }
        Ok(removed)
    }

    fn len(&self) -> IntentResult<usize> {
        Ok(self.tree.len())
    }
}
