//! Two-phase preview/confirm workflow.
//!
//! A `Preview` response leaves the dispatcher with a pending [`ConfirmableAction`];
//! [`ConfirmationWorkflow::issue`] attaches an unguessable token and stores the
//! preview snapshot server-side. [`ConfirmationWorkflow::redeem`] atomically takes
//! the snapshot out of the store, so a token confirms at most once. Unconfirmed
//! tokens simply lapse; nothing is mutated before confirm.

mod store;

pub use store::{InMemoryConfirmationStore, SledConfirmationStore};

use crate::clock::Clock;
use crate::definition::IntentDefinition;
use crate::error::{IntentError, IntentResult};
use crate::request::{Actor, ExecutionRequest};
use crate::response::ExecutionResponse;
use crate::value::ContextBag;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Server-side snapshot of a previewed operation. Confirm replays exactly this,
/// never a client-returned copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub token: String,
    pub description: String,
    pub definition: IntentDefinition,
    pub request: ExecutionRequest,
    pub preview_data: ContextBag,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingConfirmation {
    /// Expired once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Request to hand to `handle()` on confirm: same actor and hints, context
    /// replaced by the preview data.
    pub fn replay_request(&self) -> ExecutionRequest {
        self.request.replay_with(self.preview_data.clone())
    }
}

pub trait ConfirmationStore: Send + Sync {
    fn put(&self, pending: PendingConfirmation) -> IntentResult<()>;

    /// Removes and returns the pending entry. Must be atomic: of two concurrent
    /// calls with the same token at most one gets `Some`.
    fn take(&self, token: &str) -> IntentResult<Option<PendingConfirmation>>;

    /// Drops entries expired at `now`; returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> IntentResult<usize>;

    fn len(&self) -> IntentResult<usize>;
}

pub struct ConfirmationWorkflow {
    store: Arc<dyn ConfirmationStore>,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
}

impl ConfirmationWorkflow {
    pub fn new(store: Arc<dyn ConfirmationStore>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            store,
            clock,
            ttl_secs: ttl_secs.max(1),
        }
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// Attaches a fresh token to the pending action of a `Preview` response and
    /// stores the snapshot. Errors when the response carries no action.
    pub fn issue(
        &self,
        response: &mut ExecutionResponse,
        definition: &IntentDefinition,
        request: &ExecutionRequest,
    ) -> IntentResult<String> {
        let Some(action) = response.confirmable_action.as_mut() else {
            return Err(IntentError::invalid(
                "confirmable_action",
                "preview produced no confirmable action",
            ));
        };

        let token = new_token();
        let now = self.clock.now();
        action.confirm_token = token.clone();
        action.expires_in_seconds = self.ttl_secs;

        self.store.put(PendingConfirmation {
            token: token.clone(),
            description: action.description.clone(),
            definition: definition.clone(),
            request: request.clone(),
            preview_data: action.preview_data.clone(),
            created_at: now,
            expires_at: now + Duration::seconds(self.ttl_secs as i64),
        })?;

        tracing::info!(
            target: "intent::confirm",
            intent_code = %definition.intent_code,
            user_id = request.actor.user_id,
            ttl_secs = self.ttl_secs,
            "confirmation issued"
        );
        Ok(token)
    }

    /// Consumes `token`. Unknown or used tokens, expired tokens and tokens presented
    /// by another tenant all fail, and all of them burn the token.
    pub fn redeem(&self, token: &str, actor: &Actor) -> IntentResult<PendingConfirmation> {
        let pending = self.claim(token)?;
        self.check(&pending, actor)?;
        Ok(pending)
    }

    /// Removes and returns the snapshot behind `token` without validating it.
    pub fn claim(&self, token: &str) -> IntentResult<PendingConfirmation> {
        let token = token.trim();
        if token.is_empty() {
            return Err(IntentError::missing("confirm_token"));
        }
        self.store
            .take(token)?
            .ok_or(IntentError::InvalidConfirmation)
    }

    /// Expiry and tenant binding of a claimed snapshot.
    pub fn check(&self, pending: &PendingConfirmation, actor: &Actor) -> IntentResult<()> {
        if pending.is_expired(self.clock.now()) {
            tracing::info!(
                target: "intent::confirm",
                intent_code = %pending.definition.intent_code,
                expired_at = %pending.expires_at,
                "confirmation expired"
            );
            return Err(IntentError::ExpiredConfirmation);
        }
        if pending.request.actor.tenant_id() != actor.tenant_id() {
            tracing::warn!(
                target: "intent::confirm",
                intent_code = %pending.definition.intent_code,
                user_id = actor.user_id,
                "confirmation presented by a different tenant"
            );
            return Err(IntentError::Forbidden(
                "confirmation belongs to another tenant".to_string(),
            ));
        }
        Ok(())
    }

    pub fn purge_expired(&self) -> IntentResult<usize> {
        let removed = self.store.purge_expired(self.clock.now())?;
        if removed > 0 {
            tracing::debug!(target: "intent::confirm", removed, "expired confirmations purged");
        }
        Ok(removed)
    }

    pub fn pending_count(&self) -> IntentResult<usize> {
        self.store.len()
    }
}

/// 122 random bits from UUID v4, rendered without dashes.
fn new_token() -> String {
    format!("cfm_{}", uuid::Uuid::new_v4().simple())
}
