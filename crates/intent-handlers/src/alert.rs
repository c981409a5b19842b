//! ALERT category: list, acknowledge and resolve equipment / inventory alerts.
//!
//! Semantics-aware: the alert id usually arrives as the extractor's object id.

use crate::collaborators::{Alert, AlertService, AlertStatus};
use crate::require_factory;
use intent_core::{
    AffectedEntity, ConfirmableAction, ContextBag, ContextValue, ExecutionContext,
    ExecutionResponse, FieldChange, IntentCategory, IntentError, IntentHandler, IntentResult,
    Semantics, SuggestedAction,
};
use std::sync::Arc;

pub const ALERT_CATEGORY: &str = "ALERT";
pub const ALERT_LIST: &str = "ALERT_LIST";
pub const ALERT_ACKNOWLEDGE: &str = "ALERT_ACKNOWLEDGE";
pub const ALERT_RESOLVE: &str = "ALERT_RESOLVE";

const DEFAULT_LIST_LIMIT: i32 = 20;
const MAX_LIST_LIMIT: i32 = 100;

pub struct AlertHandler {
    alerts: Arc<dyn AlertService>,
}

impl AlertHandler {
    pub fn new(alerts: Arc<dyn AlertService>) -> Self {
        Self { alerts }
    }

    async fn load(&self, factory_id: &str, fields: &Semantics) -> IntentResult<Alert> {
        let alert_id = alert_id(fields)?;
        self.alerts
            .get(factory_id, alert_id)
            .await?
            .ok_or_else(|| IntentError::invalid("alert_id", format!("No alert #{} was found", alert_id)))
    }

    async fn list(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let fields = ctx.fields();
        let factory_id = require_factory(ctx, &fields)?;
        let status = match fields.string("status") {
            Some(raw) => Some(AlertStatus::parse(&raw).ok_or_else(|| {
                IntentError::invalid("status", "Status must be open, acknowledged or resolved")
            })?),
            None => None,
        };
        let limit = fields
            .int("limit")
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT) as usize;

        let alerts = self.alerts.list(&factory_id, status, limit).await?;
        let label = status.map(|s| format!("{} ", s.as_str())).unwrap_or_default();
        let mut response = ExecutionResponse::completed(format!("Found {} {}alert(s)", alerts.len(), label))
            .with_data(serde_json::json!({ "alerts": alerts }));
        if let Some(first_open) = alerts.iter().find(|a| a.status == AlertStatus::Open) {
            response = response.with_suggestion(
                SuggestedAction::new(ALERT_ACKNOWLEDGE, &format!("Acknowledge \"{}\"", first_open.title))
                    .with_parameters(serde_json::json!({ "alert_id": first_open.id })),
            );
        }
        Ok(response)
    }

    async fn acknowledge(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let fields = ctx.fields();
        let factory_id = require_factory(ctx, &fields)?;
        let alert_id = alert_id(&fields)?;
        let updated = self
            .alerts
            .acknowledge(&factory_id, alert_id, ctx.actor().user_id)
            .await?;
        Ok(ExecutionResponse::completed(format!("Alert #{} acknowledged", updated.id)).with_affected(
            AffectedEntity::new("alert", updated.id, "UPDATED")
                .named(&updated.title)
                .with_change(FieldChange::new("status", "open", updated.status.as_str())),
        ))
    }

    async fn resolve(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let fields = ctx.fields();
        let factory_id = require_factory(ctx, &fields)?;
        let alert_id = alert_id(&fields)?;
        let resolution = fields.require_string("resolution")?;
        let before = self.alerts.get(&factory_id, alert_id).await?;
        let updated = self
            .alerts
            .resolve(&factory_id, alert_id, ctx.actor().user_id, &resolution)
            .await?;
        let old_status = before
            .map(|a| a.status.as_str())
            .unwrap_or(AlertStatus::Open.as_str());
        Ok(ExecutionResponse::completed(format!("Alert #{} resolved", updated.id)).with_affected(
            AffectedEntity::new("alert", updated.id, "UPDATED")
                .named(&updated.title)
                .with_change(FieldChange::new("status", old_status, updated.status.as_str()))
                .with_change(FieldChange::new(
                    "resolution",
                    serde_json::Value::Null,
                    resolution.as_str(),
                )),
        ))
    }
}

/// Explicit `alert_id` first so a confirmed replay reads the previewed id.
fn alert_id(fields: &Semantics) -> IntentResult<i64> {
    fields
        .long("alert_id")
        .or_else(|| fields.object_id())
        .ok_or_else(|| IntentError::missing("alert_id"))
}

#[async_trait::async_trait]
impl IntentHandler for AlertHandler {
    fn supported_category(&self) -> IntentCategory {
        IntentCategory::new(ALERT_CATEGORY)
    }

    async fn handle(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        match ctx.intent_code() {
            ALERT_LIST => self.list(ctx).await,
            ALERT_ACKNOWLEDGE => self.acknowledge(ctx).await,
            ALERT_RESOLVE => self.resolve(ctx).await,
            other => Err(IntentError::UnknownIntentCode(other.to_string())),
        }
    }

    async fn preview(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let code = ctx.intent_code();
        if code == ALERT_LIST {
            return self.list(ctx).await;
        }
        let fields = ctx.fields();
        let factory_id = require_factory(ctx, &fields)?;
        let alert = self.load(&factory_id, &fields).await?;

        let mut data = ContextBag::new();
        data.insert("alert_id".into(), ContextValue::Integer(alert.id));
        data.insert("factory_id".into(), factory_id.as_str().into());
        let description = match code {
            ALERT_ACKNOWLEDGE => {
                if alert.status != AlertStatus::Open {
                    return Ok(ExecutionResponse::completed(format!(
                        "Alert #{} is already {}",
                        alert.id,
                        alert.status.as_str()
                    )));
                }
                format!("Acknowledge alert #{} \"{}\"", alert.id, alert.title)
            }
            ALERT_RESOLVE => {
                if alert.status == AlertStatus::Resolved {
                    return Ok(ExecutionResponse::completed(format!(
                        "Alert #{} is already resolved",
                        alert.id
                    )));
                }
                let resolution = fields.require_string("resolution")?;
                data.insert("resolution".into(), resolution.as_str().into());
                format!(
                    "Resolve alert #{} \"{}\" with: {}",
                    alert.id, alert.title, resolution
                )
            }
            other => return Err(IntentError::UnknownIntentCode(other.to_string())),
        };
        Ok(ExecutionResponse::preview(
            description.clone(),
            ConfirmableAction::pending(&description, data),
        )
        .with_data(serde_json::json!({ "alert": alert })))
    }

    fn supports_semantics_mode(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryAlertService;
    use chrono::Utc;
    use intent_core::{
        Actor, ExecutionRequest, ExecutionStatus, IntentDraft, IntentScope,
    };

    fn handler() -> (Arc<InMemoryAlertService>, AlertHandler) {
        let service = Arc::new(InMemoryAlertService::with_alerts(vec![Alert {
            id: 7,
            factory_id: "F1".into(),
            title: "Freezer 2 above -15C".into(),
            level: "critical".into(),
            status: AlertStatus::Open,
            resolution: None,
            handled_by: None,
            raised_at: Utc::now(),
        }]));
        (service.clone(), AlertHandler::new(service))
    }

    fn ctx(code: &str, semantics: Semantics) -> ExecutionContext {
        let definition = IntentDraft::new(code, ALERT_CATEGORY).into_definition(IntentScope::Platform, Utc::now());
        ExecutionContext::new(ExecutionRequest::new("", Actor::tenant(4, "operator", "F1")), definition)
            .with_semantics(semantics)
    }

    #[tokio::test]
    async fn resolve_preview_requires_resolution_text() {
        let (_, handler) = handler();
        let err = handler
            .preview(&ctx(ALERT_RESOLVE, Semantics::default().with_object_id(7)))
            .await
            .unwrap_err();
        assert_eq!(err, IntentError::missing("resolution"));
    }

    #[tokio::test]
    async fn acknowledge_preview_does_not_mutate() {
        let (service, handler) = handler();
        let response = handler
            .preview(&ctx(ALERT_ACKNOWLEDGE, Semantics::default().with_object_id(7)))
            .await
            .unwrap();
        assert_eq!(response.status, ExecutionStatus::Preview);
        assert_eq!(service.snapshot(7).unwrap().status, AlertStatus::Open);
    }

    #[tokio::test]
    async fn unknown_alert_asks_again() {
        let (_, handler) = handler();
        let err = handler
            .preview(&ctx(ALERT_ACKNOWLEDGE, Semantics::default().with_object_id(99)))
            .await
            .unwrap_err();
        assert!(matches!(err, IntentError::Validation { ref field, .. } if field == "alert_id"));
    }

    #[tokio::test]
    async fn list_filters_by_status_and_suggests_acknowledge() {
        let (_, handler) = handler();
        let open = handler
            .handle(&ctx(ALERT_LIST, Semantics::default().with_constraint("status", "open")))
            .await
            .unwrap();
        assert_eq!(open.result_data["alerts"].as_array().unwrap().len(), 1);
        assert_eq!(open.suggested_actions[0].intent_code, ALERT_ACKNOWLEDGE);

        let resolved = handler
            .handle(&ctx(ALERT_LIST, Semantics::default().with_constraint("status", "closed")))
            .await
            .unwrap();
        assert!(resolved.result_data["alerts"].as_array().unwrap().is_empty());
    }
}
