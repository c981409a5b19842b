//! NOTIFICATION category: message every user holding a role in the factory.
//!
//! The preview freezes the recipient list; a confirmed replay notifies exactly
//! those users even if role membership changed in between. Direct calls always
//! resolve recipients from the role.

use crate::collaborators::{NotificationService, UserDirectory};
use crate::require_factory;
use intent_core::{
    fan_out, AffectedEntity, ConfirmableAction, ContextBag, ExecutionContext, ExecutionResponse,
    ExecutionStatus, IntentCategory, IntentError, IntentHandler, IntentResult, Semantics,
};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const NOTIFICATION_CATEGORY: &str = "NOTIFICATION";
pub const NOTIFY_ROLE: &str = "NOTIFY_ROLE";

const DEFAULT_TITLE: &str = "Factory notice";

pub struct NotificationHandler {
    users: Arc<dyn UserDirectory>,
    notifier: Arc<dyn NotificationService>,
}

struct Broadcast {
    factory_id: String,
    role: String,
    title: String,
    message: String,
}

impl Broadcast {
    fn from_fields(ctx: &ExecutionContext, fields: &Semantics) -> IntentResult<Self> {
        Ok(Self {
            factory_id: require_factory(ctx, fields)?,
            role: fields.require_string("role")?,
            title: fields.string("title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            message: fields.require_string("message")?,
        })
    }
}

impl NotificationHandler {
    pub fn new(users: Arc<dyn UserDirectory>, notifier: Arc<dyn NotificationService>) -> Self {
        Self { users, notifier }
    }

    async fn recipients(&self, broadcast: &Broadcast) -> IntentResult<Vec<i64>> {
        let ids: BTreeSet<i64> = self
            .users
            .users_with_role(&broadcast.factory_id, &broadcast.role)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn nobody(broadcast: &Broadcast) -> ExecutionResponse {
        ExecutionResponse::completed(format!("No users hold the role {}", broadcast.role))
            .with_data(serde_json::json!({ "total": 0, "succeeded": 0, "skipped": 0 }))
    }
}

#[async_trait::async_trait]
impl IntentHandler for NotificationHandler {
    fn supported_category(&self) -> IntentCategory {
        IntentCategory::new(NOTIFICATION_CATEGORY)
    }

    async fn handle(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        if ctx.intent_code() != NOTIFY_ROLE {
            return Err(IntentError::UnknownIntentCode(ctx.intent_code().to_string()));
        }
        let fields = ctx.fields();
        let broadcast = Broadcast::from_fields(ctx, &fields)?;
        // Only a confirmed replay may carry its own recipient list.
        let frozen = ctx.confirmed.then(|| fields.long_list("recipient_ids")).flatten();
        let recipients = match frozen {
            Some(frozen) => frozen,
            None => self.recipients(&broadcast).await?,
        };
        if recipients.is_empty() {
            return Ok(Self::nobody(&broadcast));
        }

        let notifier = Arc::clone(&self.notifier);
        let report = fan_out("notify_role", recipients.clone(), |user_id| {
            let notifier = Arc::clone(&notifier);
            let factory_id = broadcast.factory_id.clone();
            let title = broadcast.title.clone();
            let message = broadcast.message.clone();
            async move { notifier.send(&factory_id, user_id, &title, &message).await }
        })
        .await;

        let failed: BTreeSet<&str> = report.failures.iter().map(|f| f.target.as_str()).collect();
        let mut response = match report.status() {
            ExecutionStatus::Failed => ExecutionResponse::failed(format!(
                "Could not notify any of the {} user(s) with role {}",
                report.total, broadcast.role
            )),
            _ => ExecutionResponse::completed(format!(
                "Notified role {}: {}",
                broadcast.role,
                report.summary("notifications")
            )),
        }
        .with_data(serde_json::to_value(&report).unwrap_or_default());
        for user_id in recipients {
            if !failed.contains(user_id.to_string().as_str()) {
                response = response.with_affected(AffectedEntity::new("user", user_id, "NOTIFIED"));
            }
        }
        Ok(response)
    }

    async fn preview(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        if ctx.intent_code() != NOTIFY_ROLE {
            return self.handle(ctx).await;
        }
        let fields = ctx.fields();
        let broadcast = Broadcast::from_fields(ctx, &fields)?;
        let recipients = self.recipients(&broadcast).await?;
        if recipients.is_empty() {
            return Ok(Self::nobody(&broadcast));
        }

        let mut data = ContextBag::new();
        data.insert("factory_id".into(), broadcast.factory_id.as_str().into());
        data.insert("role".into(), broadcast.role.as_str().into());
        data.insert("title".into(), broadcast.title.as_str().into());
        data.insert("message".into(), broadcast.message.as_str().into());
        data.insert("recipient_ids".into(), recipients.clone().into());
        let description = format!(
            "Send \"{}\" to {} user(s) with role {}",
            broadcast.title,
            recipients.len(),
            broadcast.role
        );
        Ok(ExecutionResponse::preview(
            description.clone(),
            ConfirmableAction::pending(&description, data),
        )
        .with_data(serde_json::json!({ "recipient_ids": recipients })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::UserRef;
    use crate::memory::{InMemoryUserDirectory, RecordingNotifier};
    use chrono::Utc;
    use intent_core::{Actor, ContextValue, ExecutionRequest, IntentDraft, IntentScope};

    fn ctx(request: ExecutionRequest) -> ExecutionContext {
        let definition = IntentDraft::new(NOTIFY_ROLE, NOTIFICATION_CATEGORY)
            .into_definition(IntentScope::Platform, Utc::now());
        ExecutionContext::new(request, definition)
    }

    #[tokio::test]
    async fn empty_role_completes_without_token() {
        let handler = NotificationHandler::new(
            Arc::new(InMemoryUserDirectory::new()),
            Arc::new(RecordingNotifier::new()),
        );
        let request = ExecutionRequest::new("", Actor::tenant(1, "supervisor", "F1"))
            .with_context("role", "night_shift")
            .with_context("message", "Line 3 restarts at 02:00");
        let response = handler.preview(&ctx(request)).await.unwrap();
        assert_eq!(response.status, ExecutionStatus::Completed);
        assert!(response.confirmable_action.is_none());
    }

    #[tokio::test]
    async fn every_recipient_failing_reports_failed() {
        let users = InMemoryUserDirectory::new();
        users.add("F1", "qa", UserRef { id: 1, name: "Ana".into() });
        users.add("F1", "qa", UserRef { id: 2, name: "Ben".into() });
        let handler = NotificationHandler::new(
            Arc::new(users),
            Arc::new(RecordingNotifier::failing_for([1, 2])),
        );
        let request = ExecutionRequest::new("", Actor::tenant(1, "supervisor", "F1"))
            .with_context("role", "qa")
            .with_context("message", "Audit tomorrow");
        let response = handler.handle(&ctx(request)).await.unwrap();
        assert_eq!(response.status, ExecutionStatus::Failed);
        assert_eq!(response.result_data["skipped"], 2);
        assert!(response.affected_entities.is_empty());
    }

    #[tokio::test]
    async fn recipient_list_is_honored_only_on_confirmed_replay() {
        let users = InMemoryUserDirectory::new();
        users.add("F1", "qa", UserRef { id: 1, name: "Ana".into() });
        let notifier = Arc::new(RecordingNotifier::new());
        let handler = NotificationHandler::new(Arc::new(users), notifier.clone());
        let request = ExecutionRequest::new("", Actor::tenant(1, "supervisor", "F1"))
            .with_context("role", "qa")
            .with_context("message", "Audit tomorrow")
            .with_context("recipient_ids", vec![1_i64, 77]);

        handler.handle(&ctx(request.clone())).await.unwrap();
        assert_eq!(notifier.delivered_to(), vec![1]);

        let mut replay = ctx(request);
        replay.confirmed = true;
        handler.handle(&replay).await.unwrap();
        assert_eq!(notifier.delivered_to(), vec![1, 1, 77]);
    }

    #[tokio::test]
    async fn preview_carries_the_factory() {
        let users = InMemoryUserDirectory::new();
        users.add("F1", "qa", UserRef { id: 1, name: "Ana".into() });
        let handler = NotificationHandler::new(Arc::new(users), Arc::new(RecordingNotifier::new()));
        let request = ExecutionRequest::new("", Actor::tenant(1, "supervisor", "F1"))
            .with_context("role", "qa")
            .with_context("message", "Audit tomorrow");
        let response = handler.preview(&ctx(request)).await.unwrap();
        let action = response.confirmable_action.unwrap();
        assert_eq!(action.preview_data["factory_id"], ContextValue::from("F1"));
    }
}
