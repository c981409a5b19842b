//! Per-call execution request and the acting identity.

use crate::value::{ContextBag, ContextValue};
use serde::{Deserialize, Serialize};

/// Who is executing. `tenant_id` is the factory the actor belongs to; platform
/// operators may have none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: i64,
    pub role: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Actor {
    pub fn new(user_id: i64, role: &str, tenant_id: Option<&str>) -> Self {
        Self {
            user_id,
            role: role.to_string(),
            tenant_id: tenant_id.map(str::to_string),
        }
    }

    pub fn tenant(user_id: i64, role: &str, tenant_id: &str) -> Self {
        Self::new(user_id, role, Some(tenant_id))
    }

    pub fn platform(user_id: i64, role: &str) -> Self {
        Self::new(user_id, role, None)
    }

    /// Tenant id, treating blank values as absent.
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// One execution request: free text, the loosely typed context bag and optional
/// entity hints from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub context: ContextBag,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub actor: Actor,
}

impl ExecutionRequest {
    pub fn new(user_input: &str, actor: Actor) -> Self {
        Self {
            user_input: user_input.to_string(),
            context: ContextBag::new(),
            entity_type: None,
            entity_id: None,
            actor,
        }
    }

    pub fn with_context(mut self, key: &str, value: impl Into<ContextValue>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn with_entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self.entity_id = Some(entity_id.to_string());
        self
    }

    /// Copy of this request whose context is replaced by `context`. Used to replay a
    /// confirmed preview without touching the original context.
    pub fn replay_with(&self, context: ContextBag) -> Self {
        Self {
            context,
            ..self.clone()
        }
    }
}
