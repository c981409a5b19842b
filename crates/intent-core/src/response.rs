//! The structured result every execution produces. Nothing else is exposed to callers.

use crate::definition::IntentDefinition;
use crate::value::ContextBag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default confirmation window in seconds.
pub const DEFAULT_CONFIRM_TTL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    NeedMoreInfo,
    /// Non-terminal: a confirm call carrying the returned token must follow.
    Preview,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Preview)
    }
}

/// One old/new pair in an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

impl FieldChange {
    pub fn new(
        field: &str,
        old: impl Into<serde_json::Value>,
        new: impl Into<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.to_string(),
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Audit record for an entity touched by an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedEntity {
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub entity_name: Option<String>,
    /// Action tag, e.g. `CREATED`, `UPDATED`, `NOTIFIED`.
    pub action: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

impl AffectedEntity {
    pub fn new(entity_type: &str, entity_id: impl ToString, action: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            entity_name: None,
            action: action.to_string(),
            changes: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.entity_name = Some(name.to_string());
        self
    }

    pub fn with_change(mut self, change: FieldChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes.extend(changes);
        self
    }
}

/// Deferred, token-gated step. The token is filled in by the confirmation workflow
/// when the preview response leaves the dispatcher; handlers only describe the
/// operation and the exact parameters needed to replay it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmableAction {
    pub confirm_token: String,
    pub description: String,
    pub expires_in_seconds: u64,
    pub preview_data: ContextBag,
}

impl ConfirmableAction {
    pub fn pending(description: &str, preview_data: ContextBag) -> Self {
        Self {
            confirm_token: String::new(),
            description: description.to_string(),
            expires_in_seconds: DEFAULT_CONFIRM_TTL_SECS,
            preview_data,
        }
    }
}

/// Follow-up hint. Carries no side effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub intent_code: String,
    pub label: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl SuggestedAction {
    pub fn new(intent_code: &str, label: &str) -> Self {
        Self {
            intent_code: intent_code.to_string(),
            label: label.to_string(),
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResponse {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub intent_code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub result_data: serde_json::Value,
    #[serde(default)]
    pub affected_entities: Vec<AffectedEntity>,
    #[serde(default)]
    pub confirmable_action: Option<ConfirmableAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_actions: Vec<SuggestedAction>,
    #[serde(default)]
    pub quota_cost: u32,
    #[serde(default)]
    pub requires_approval: bool,
    pub executed_at: DateTime<Utc>,
}

impl ExecutionResponse {
    fn with_status(status: ExecutionStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            intent_code: None,
            message: message.into(),
            result_data: serde_json::Value::Null,
            affected_entities: Vec::new(),
            confirmable_action: None,
            suggested_actions: Vec::new(),
            quota_cost: 0,
            requires_approval: false,
            executed_at: Utc::now(),
        }
    }

    pub fn completed(message: impl Into<String>) -> Self {
        Self::with_status(ExecutionStatus::Completed, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::with_status(ExecutionStatus::Failed, message)
    }

    /// Incomplete input: names the fields the user still has to provide.
    pub fn need_more_info(message: impl Into<String>, missing_fields: &[&str]) -> Self {
        let mut response = Self::with_status(ExecutionStatus::NeedMoreInfo, message);
        response.result_data = serde_json::json!({ "missing_fields": missing_fields });
        response
    }

    pub fn preview(message: impl Into<String>, action: ConfirmableAction) -> Self {
        let mut response = Self::with_status(ExecutionStatus::Preview, message);
        response.confirmable_action = Some(action);
        response
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.result_data = data;
        self
    }

    pub fn with_affected(mut self, entity: AffectedEntity) -> Self {
        self.affected_entities.push(entity);
        self
    }

    pub fn with_suggestion(mut self, suggestion: SuggestedAction) -> Self {
        self.suggested_actions.push(suggestion);
        self
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed | ExecutionStatus::Preview
        )
    }

    /// Copies accounting attributes of the definition onto the response.
    pub fn stamp(&mut self, definition: &IntentDefinition) {
        self.intent_code = Some(definition.intent_code.clone());
        self.quota_cost = definition.quota_cost;
        self.requires_approval = definition.requires_approval;
    }

    /// Token of the attached confirmable action, if any.
    pub fn confirm_token(&self) -> Option<&str> {
        self.confirmable_action
            .as_ref()
            .map(|a| a.confirm_token.as_str())
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&ExecutionStatus::NeedMoreInfo).unwrap();
        assert_eq!(json, "\"NEED_MORE_INFO\"");
        assert!(!ExecutionStatus::Preview.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn need_more_info_lists_missing_fields() {
        let response = ExecutionResponse::need_more_info("which batch?", &["batch_id"]);
        assert_eq!(response.status, ExecutionStatus::NeedMoreInfo);
        assert_eq!(response.result_data["missing_fields"][0], "batch_id");
    }

    #[test]
    fn pending_action_has_no_token_until_registered() {
        let response =
            ExecutionResponse::preview("adjust", ConfirmableAction::pending("adjust", ContextBag::new()));
        assert_eq!(response.confirm_token(), None);
        assert_eq!(
            response.confirmable_action.as_ref().map(|a| a.expires_in_seconds),
            Some(DEFAULT_CONFIRM_TTL_SECS)
        );
    }
}
