//! The meta layer exposed as an ordinary category handler.

use super::{DefinitionUpdate, MetaExtension};
use crate::definition::{
    DefinitionPatch, IntentCategory, IntentDefinition, IntentDraft, IntentScope, SensitivityLevel,
};
use crate::error::{IntentError, IntentResult};
use crate::handler::{ExecutionContext, IntentHandler};
use crate::response::{AffectedEntity, ConfirmableAction, ExecutionResponse, SuggestedAction};
use crate::semantics::Semantics;
use crate::value::{ContextBag, ContextValue};
use std::sync::Arc;

pub const META_CATEGORY: &str = "META";

pub const INTENT_CREATE: &str = "INTENT_CREATE";
pub const INTENT_UPDATE: &str = "INTENT_UPDATE";
pub const INTENT_LIST: &str = "INTENT_LIST";

/// Tenant role allowed to change its factory's registry. Platform roles bypass it.
pub const REGISTRY_ADMIN_ROLE: &str = "factory_admin";

/// Definitions for the meta intents themselves, seeded at bootstrap.
pub fn builtin_definitions() -> Vec<IntentDraft> {
    vec![
        IntentDraft::new(INTENT_CREATE, META_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_sensitivity(SensitivityLevel::High)
            .with_required_roles(&[REGISTRY_ADMIN_ROLE])
            .with_keywords(&["create intent", "new intent", "add intent"])
            .with_description("Register a new intent definition"),
        IntentDraft::new(INTENT_UPDATE, META_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_sensitivity(SensitivityLevel::High)
            .with_required_roles(&[REGISTRY_ADMIN_ROLE])
            .with_keywords(&["update intent", "change intent", "add keyword"])
            .with_description("Edit keywords, description, priority or active flag of an intent"),
        IntentDraft::new(INTENT_LIST, META_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_keywords(&["list intents", "available intents"])
            .with_description("List the intents available to the caller"),
    ]
}

pub struct MetaIntentHandler {
    meta: Arc<MetaExtension>,
}

impl MetaIntentHandler {
    pub fn new(meta: Arc<MetaExtension>) -> Self {
        Self { meta }
    }

    fn create_response(definition: &IntentDefinition) -> ExecutionResponse {
        ExecutionResponse::completed(format!(
            "Intent {} created in scope {}",
            definition.intent_code, definition.scope
        ))
        .with_data(serde_json::to_value(definition).unwrap_or_default())
        .with_affected(
            AffectedEntity::new("intent_definition", definition.key(), "CREATED")
                .named(&definition.name),
        )
    }

    fn update_response(update: &DefinitionUpdate) -> ExecutionResponse {
        let definition = &update.definition;
        let message = if update.changes.is_empty() {
            format!("Intent {} is already up to date", definition.intent_code)
        } else {
            format!(
                "Intent {} updated ({} field(s) changed)",
                definition.intent_code,
                update.changes.len()
            )
        };
        ExecutionResponse::completed(message)
            .with_data(serde_json::json!({
                "intent_code": definition.intent_code,
                "scope": definition.scope.to_string(),
                "changes": update.changes,
            }))
            .with_affected(
                AffectedEntity::new("intent_definition", definition.key(), "UPDATED")
                    .named(&definition.name)
                    .with_changes(update.changes.clone()),
            )
    }
}

#[async_trait::async_trait]
impl IntentHandler for MetaIntentHandler {
    fn supported_category(&self) -> IntentCategory {
        IntentCategory::new(META_CATEGORY)
    }

    async fn handle(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let fields = ctx.fields();
        match ctx.intent_code() {
            INTENT_CREATE => {
                let definition = self.meta.create(ctx.actor(), draft_from_fields(&fields)?)?;
                Ok(Self::create_response(&definition))
            }
            INTENT_UPDATE => {
                let (code, scope, patch) = update_from_fields(&fields)?;
                let update = self.meta.update(ctx.actor(), &code, scope, &patch)?;
                Ok(Self::update_response(&update))
            }
            INTENT_LIST => {
                let visible = self.meta.list(ctx.actor())?;
                let rows: Vec<serde_json::Value> = visible
                    .iter()
                    .map(|d| {
                        serde_json::json!({
                            "intent_code": d.intent_code,
                            "category": d.category.as_str(),
                            "scope": d.scope.to_string(),
                            "priority": d.priority,
                            "description": d.description,
                        })
                    })
                    .collect();
                Ok(
                    ExecutionResponse::completed(format!("{} intent(s) available", rows.len()))
                        .with_data(serde_json::json!({ "intents": rows })),
                )
            }
            other => Err(IntentError::UnknownIntentCode(other.to_string())),
        }
    }

    async fn preview(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let fields = ctx.fields();
        match ctx.intent_code() {
            INTENT_CREATE => {
                let draft = draft_from_fields(&fields)?;
                let planned = self.meta.plan_create(ctx.actor(), draft.clone())?;
                let description = format!(
                    "Create intent {} ({}) in scope {}",
                    planned.intent_code, planned.category, planned.scope
                );
                let response = ExecutionResponse::preview(
                    description.clone(),
                    ConfirmableAction::pending(&description, draft_to_bag(&draft, &planned.scope)),
                )
                .with_data(serde_json::to_value(&planned).unwrap_or_default());
                Ok(response)
            }
            INTENT_UPDATE => {
                let (code, scope, patch) = update_from_fields(&fields)?;
                let planned = self.meta.plan_update(ctx.actor(), &code, scope, &patch)?;
                if planned.changes.is_empty() {
                    return Ok(Self::update_response(&planned).with_suggestion(SuggestedAction::new(
                        INTENT_LIST,
                        "Show available intents",
                    )));
                }
                let description = format!(
                    "Update intent {}: {}",
                    planned.definition.intent_code,
                    planned
                        .changes
                        .iter()
                        .map(|c| c.field.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                Ok(ExecutionResponse::preview(
                    description.clone(),
                    ConfirmableAction::pending(
                        &description,
                        patch_to_bag(&code, &planned.definition.scope, &patch),
                    ),
                )
                .with_data(serde_json::json!({ "changes": planned.changes })))
            }
            _ => self.handle(ctx).await,
        }
    }
}

fn scope_from_fields(fields: &Semantics) -> IntentResult<Option<IntentScope>> {
    let Some(kind) = fields.string("scope") else {
        return Ok(fields
            .string("tenant_id")
            .map(IntentScope::Factory));
    };
    let tenant = fields.string("tenant_id");
    IntentScope::parse(&kind, tenant.as_deref())
        .map(Some)
        .ok_or_else(|| {
            IntentError::invalid(
                "scope",
                format!("Scope must be platform or factory with a tenant id, got {}", kind),
            )
        })
}

fn sensitivity_from_fields(fields: &Semantics) -> IntentResult<SensitivityLevel> {
    match fields.string("sensitivity") {
        None => Ok(SensitivityLevel::default()),
        Some(raw) => serde_json::from_value(serde_json::Value::String(raw.to_lowercase())).map_err(
            |_| IntentError::invalid("sensitivity", "Sensitivity must be low, medium, high or critical"),
        ),
    }
}

fn target_code(fields: &Semantics) -> IntentResult<String> {
    fields
        .string("intent_code")
        .or_else(|| fields.object_identifier().map(str::to_string))
        .ok_or_else(|| IntentError::missing("intent_code"))
}

fn draft_from_fields(fields: &Semantics) -> IntentResult<IntentDraft> {
    let quota_cost = match fields.long("quota_cost") {
        Some(cost) => u32::try_from(cost)
            .map_err(|_| IntentError::invalid("quota_cost", "Quota cost must be a non-negative number"))?,
        None => 0,
    };
    Ok(IntentDraft {
        intent_code: target_code(fields)?,
        name: fields.string("name"),
        category: fields.require_string("category")?,
        scope: scope_from_fields(fields)?,
        sensitivity: sensitivity_from_fields(fields)?,
        quota_cost,
        priority: fields.int("priority").unwrap_or(0),
        required_roles: fields.string_list("required_roles").unwrap_or_default(),
        requires_approval: fields.boolean("requires_approval").unwrap_or(false),
        keywords: fields.string_list("keywords").unwrap_or_default(),
        description: fields.string("description").unwrap_or_default(),
    })
}

fn update_from_fields(
    fields: &Semantics,
) -> IntentResult<(String, Option<IntentScope>, DefinitionPatch)> {
    let patch = DefinitionPatch {
        add_keywords: fields.string_list("add_keywords").unwrap_or_default(),
        remove_keywords: fields.string_list("remove_keywords").unwrap_or_default(),
        description: fields.string("description"),
        priority: fields.int("priority"),
        active: fields.boolean("active"),
    };
    Ok((target_code(fields)?, scope_from_fields(fields)?, patch))
}

fn put_scope(bag: &mut ContextBag, scope: &IntentScope) {
    match scope {
        IntentScope::Platform => {
            bag.insert("scope".into(), "platform".into());
        }
        IntentScope::Factory(tenant) => {
            bag.insert("scope".into(), "factory".into());
            bag.insert("tenant_id".into(), tenant.as_str().into());
        }
    }
}

/// Replayable field bag for a previewed creation, with the scope pinned.
fn draft_to_bag(draft: &IntentDraft, scope: &IntentScope) -> ContextBag {
    let mut bag = ContextBag::new();
    bag.insert("intent_code".into(), draft.normalized_code().into());
    bag.insert("category".into(), draft.category.trim().into());
    if let Some(name) = &draft.name {
        bag.insert("name".into(), name.as_str().into());
    }
    bag.insert(
        "sensitivity".into(),
        serde_json::to_value(draft.sensitivity)
            .map(ContextValue::from)
            .unwrap_or_default(),
    );
    bag.insert("quota_cost".into(), i64::from(draft.quota_cost).into());
    bag.insert("priority".into(), draft.priority.into());
    bag.insert("required_roles".into(), draft.required_roles.clone().into());
    bag.insert("requires_approval".into(), draft.requires_approval.into());
    bag.insert("keywords".into(), draft.keywords.clone().into());
    bag.insert("description".into(), draft.description.as_str().into());
    put_scope(&mut bag, scope);
    bag
}

fn patch_to_bag(code: &str, scope: &IntentScope, patch: &DefinitionPatch) -> ContextBag {
    let mut bag = ContextBag::new();
    bag.insert("intent_code".into(), code.into());
    if !patch.add_keywords.is_empty() {
        bag.insert("add_keywords".into(), patch.add_keywords.clone().into());
    }
    if !patch.remove_keywords.is_empty() {
        bag.insert("remove_keywords".into(), patch.remove_keywords.clone().into());
    }
    if let Some(description) = &patch.description {
        bag.insert("description".into(), description.as_str().into());
    }
    if let Some(priority) = patch.priority {
        bag.insert("priority".into(), priority.into());
    }
    if let Some(active) = patch.active {
        bag.insert("active".into(), active.into());
    }
    put_scope(&mut bag, scope);
    bag
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::meta::AccessPolicy;
    use crate::request::{Actor, ExecutionRequest};
    use crate::response::ExecutionStatus;
    use crate::store::{DefinitionStore, InMemoryDefinitionStore};

    fn setup() -> (Arc<InMemoryDefinitionStore>, MetaIntentHandler) {
        let store = Arc::new(InMemoryDefinitionStore::new());
        let meta = MetaExtension::new(store.clone(), AccessPolicy::default(), Arc::new(SystemClock));
        (store, MetaIntentHandler::new(Arc::new(meta)))
    }

    fn ctx(code: &str, request: ExecutionRequest) -> ExecutionContext {
        let definition =
            IntentDraft::new(code, META_CATEGORY).into_definition(IntentScope::Platform, chrono::Utc::now());
        ExecutionContext::new(request, definition)
    }

    #[tokio::test]
    async fn create_preview_writes_nothing_and_replays() {
        let (store, handler) = setup();
        let request = ExecutionRequest::new("new intent", Actor::tenant(3, "factory_admin", "F1"))
            .with_context("intent_code", "inventory_alert")
            .with_context("category", "alert")
            .with_context("keywords", "low stock, inventory");

        let preview = handler.preview(&ctx(INTENT_CREATE, request.clone())).await.unwrap();
        assert_eq!(preview.status, ExecutionStatus::Preview);
        assert!(store.list().unwrap().is_empty());

        let action = preview.confirmable_action.unwrap();
        let mut replay = ctx(INTENT_CREATE, request.replay_with(action.preview_data));
        replay.confirmed = true;
        let done = handler.handle(&replay).await.unwrap();
        assert_eq!(done.status, ExecutionStatus::Completed);

        let stored = store
            .get("INVENTORY_ALERT", &IntentScope::Factory("F1".into()))
            .unwrap()
            .unwrap();
        assert_eq!(stored.category.as_str(), "ALERT");
        assert_eq!(stored.keywords, vec!["low stock", "inventory"]);
    }

    #[tokio::test]
    async fn create_without_category_needs_more_info() {
        let (_, handler) = setup();
        let request = ExecutionRequest::new("", Actor::platform(1, "super_admin"))
            .with_context("intent_code", "SHIFT_REPORT");
        let err = handler.preview(&ctx(INTENT_CREATE, request)).await.unwrap_err();
        assert_eq!(err, IntentError::missing("category"));
    }

    #[tokio::test]
    async fn update_preview_lists_changed_fields() {
        let (store, handler) = setup();
        store
            .insert_new(
                IntentDraft::new("ALERT_LIST", "ALERT")
                    .into_definition(IntentScope::Platform, chrono::Utc::now()),
            )
            .unwrap();
        let request = ExecutionRequest::new("", Actor::platform(1, "platform_admin"))
            .with_context("intent_code", "ALERT_LIST")
            .with_context("scope", "platform")
            .with_context("priority", 4);
        let preview = handler.preview(&ctx(INTENT_UPDATE, request)).await.unwrap();
        assert_eq!(preview.status, ExecutionStatus::Preview);
        assert_eq!(preview.result_data["changes"][0]["field"], "priority");
        let current = store.get("ALERT_LIST", &IntentScope::Platform).unwrap().unwrap();
        assert_eq!(current.priority, 0);
    }

    #[tokio::test]
    async fn list_shows_visible_definitions() {
        let (store, handler) = setup();
        for draft in builtin_definitions() {
            store
                .insert_new(draft.into_definition(IntentScope::Platform, chrono::Utc::now()))
                .unwrap();
        }
        let request = ExecutionRequest::new("", Actor::tenant(5, "operator", "F1"));
        let response = handler.handle(&ctx(INTENT_LIST, request)).await.unwrap();
        assert_eq!(response.result_data["intents"].as_array().unwrap().len(), 3);
    }
}
