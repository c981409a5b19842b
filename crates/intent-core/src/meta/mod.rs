//! Runtime extension of the intent registry.
//!
//! Definitions created or updated here are read by the executor on the very next
//! call; there is no cache to invalidate.

mod handler;

pub use handler::{
    builtin_definitions, MetaIntentHandler, INTENT_CREATE, INTENT_LIST, INTENT_UPDATE, META_CATEGORY,
    REGISTRY_ADMIN_ROLE,
};

use crate::clock::Clock;
use crate::definition::{
    is_valid_intent_code, normalize_intent_code, DefinitionPatch, IntentDefinition, IntentDraft,
    IntentScope,
};
use crate::error::{IntentError, IntentResult};
use crate::request::Actor;
use crate::response::FieldChange;
use crate::store::DefinitionStore;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Roles that act platform-wide: they may touch Platform-scoped definitions and
/// bypass per-definition `required_roles`.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    platform_roles: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn new<I, S>(platform_roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            platform_roles: platform_roles
                .into_iter()
                .map(|r| r.as_ref().trim().to_lowercase())
                .filter(|r| !r.is_empty())
                .collect(),
        }
    }

    pub fn is_platform(&self, actor: &Actor) -> bool {
        self.platform_roles.contains(&actor.role.trim().to_lowercase())
    }

    /// Platform actors write anywhere; tenant actors only inside their own factory.
    pub fn can_write(&self, actor: &Actor, scope: &IntentScope) -> bool {
        if self.is_platform(actor) {
            return true;
        }
        match scope {
            IntentScope::Platform => false,
            IntentScope::Factory(tenant) => actor.tenant_id() == Some(tenant.as_str()),
        }
    }

    /// Scope used when a request names none: the actor's factory, or Platform for a
    /// platform actor without one.
    pub fn default_scope(&self, actor: &Actor) -> IntentResult<IntentScope> {
        match actor.tenant_id() {
            Some(tenant) => Ok(IntentScope::Factory(tenant.to_string())),
            None if self.is_platform(actor) => Ok(IntentScope::Platform),
            None => Err(IntentError::missing("tenant_id")),
        }
    }

    /// Whether `actor` satisfies the definition's `required_roles`.
    pub fn permits(&self, actor: &Actor, definition: &IntentDefinition) -> bool {
        definition.required_roles.is_empty()
            || self.is_platform(actor)
            || definition
                .required_roles
                .iter()
                .any(|r| r.eq_ignore_ascii_case(actor.role.trim()))
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new(["super_admin", "platform_admin"])
    }
}

/// Outcome of an update: the stored definition and the fields that actually changed.
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionUpdate {
    pub definition: IntentDefinition,
    pub changes: Vec<FieldChange>,
}

pub struct MetaExtension {
    store: Arc<dyn DefinitionStore>,
    policy: AccessPolicy,
    clock: Arc<dyn Clock>,
}

impl MetaExtension {
    pub fn new(store: Arc<dyn DefinitionStore>, policy: AccessPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            policy,
            clock,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn DefinitionStore> {
        &self.store
    }

    /// Validates a draft and builds the definition it would create, without writing.
    /// Also reports `Conflict` early when an active duplicate already exists.
    pub fn plan_create(&self, actor: &Actor, draft: IntentDraft) -> IntentResult<IntentDefinition> {
        let code = draft.normalized_code();
        if code.is_empty() {
            return Err(IntentError::missing("intent_code"));
        }
        if !is_valid_intent_code(&code) {
            return Err(IntentError::invalid(
                "intent_code",
                format!(
                    "Intent code {} must start with a letter and use only A-Z, 0-9 and _",
                    code
                ),
            ));
        }
        if draft.category.trim().is_empty() {
            return Err(IntentError::missing("category"));
        }

        let scope = match draft.scope.clone() {
            Some(IntentScope::Factory(tenant)) if tenant.trim().is_empty() => {
                return Err(IntentError::missing("tenant_id"))
            }
            Some(scope) => scope,
            None => self.policy.default_scope(actor)?,
        };
        if !self.policy.can_write(actor, &scope) {
            return Err(IntentError::Forbidden(format!(
                "role {} may not create intents in scope {}",
                actor.role, scope
            )));
        }
        if let Some(existing) = self.store.get(&code, &scope)? {
            if existing.active {
                return Err(IntentError::Conflict(format!(
                    "intent {} already exists in scope {}",
                    code, scope
                )));
            }
        }
        Ok(draft.into_definition(scope, self.clock.now()))
    }

    /// Creates a definition. Uniqueness is enforced atomically by the store, so a
    /// racing creation that slipped past the early check still gets `Conflict`.
    pub fn create(&self, actor: &Actor, draft: IntentDraft) -> IntentResult<IntentDefinition> {
        let definition = self.plan_create(actor, draft)?;
        let created = self.store.insert_new(definition)?;
        tracing::info!(
            target: "intent::meta",
            intent_code = %created.intent_code,
            scope = %created.scope,
            category = %created.category,
            user_id = actor.user_id,
            "intent definition created"
        );
        Ok(created)
    }

    /// Computes the result of `patch` against the current definition without writing.
    pub fn plan_update(
        &self,
        actor: &Actor,
        intent_code: &str,
        scope: Option<IntentScope>,
        patch: &DefinitionPatch,
    ) -> IntentResult<DefinitionUpdate> {
        let (code, scope) = self.authorize_update(actor, intent_code, scope, patch)?;
        let before = self
            .store
            .get(&code, &scope)?
            .ok_or_else(|| IntentError::UnknownIntentCode(code.clone()))?;
        let mut after = before.clone();
        patch.apply(&mut after, self.clock.now());
        Ok(DefinitionUpdate {
            changes: diff_definitions(&before, &after),
            definition: after,
        })
    }

    /// Applies `patch` to the definition `intent_code` in `scope` (default: the
    /// actor's scope). Inactive definitions can be updated, which is how they are
    /// re-activated.
    pub fn update(
        &self,
        actor: &Actor,
        intent_code: &str,
        scope: Option<IntentScope>,
        patch: &DefinitionPatch,
    ) -> IntentResult<DefinitionUpdate> {
        let (code, scope) = self.authorize_update(actor, intent_code, scope, patch)?;
        let now = self.clock.now();
        let modified = self
            .store
            .modify(&code, &scope, &mut |definition| patch.apply(definition, now))?
            .ok_or_else(|| IntentError::UnknownIntentCode(code.clone()))?;

        let changes = diff_definitions(&modified.before, &modified.after);
        tracing::info!(
            target: "intent::meta",
            intent_code = %code,
            scope = %scope,
            user_id = actor.user_id,
            changed = changes.len(),
            "intent definition updated"
        );
        Ok(DefinitionUpdate {
            definition: modified.after,
            changes,
        })
    }

    /// Definitions the actor can currently dispatch.
    pub fn list(&self, actor: &Actor) -> IntentResult<Vec<IntentDefinition>> {
        self.store.visible_to(actor.tenant_id())
    }

    fn authorize_update(
        &self,
        actor: &Actor,
        intent_code: &str,
        scope: Option<IntentScope>,
        patch: &DefinitionPatch,
    ) -> IntentResult<(String, IntentScope)> {
        let code = normalize_intent_code(intent_code);
        if code.is_empty() {
            return Err(IntentError::missing("intent_code"));
        }
        let scope = match scope {
            Some(scope) => scope,
            None => self.policy.default_scope(actor)?,
        };
        if !self.policy.can_write(actor, &scope) {
            tracing::warn!(
                target: "intent::meta",
                intent_code = %code,
                scope = %scope,
                user_id = actor.user_id,
                role = %actor.role,
                "update rejected"
            );
            return Err(IntentError::Forbidden(format!(
                "role {} may not update intents in scope {}",
                actor.role, scope
            )));
        }
        if patch.is_empty() {
            return Err(IntentError::invalid("changes", "Please say what should change"));
        }
        Ok((code, scope))
    }
}

/// Fields that differ between two versions of a definition. `updated_at` is
/// bookkeeping and never reported.
fn diff_definitions(before: &IntentDefinition, after: &IntentDefinition) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    if before.keywords != after.keywords {
        changes.push(FieldChange::new(
            "keywords",
            before.keywords.clone(),
            after.keywords.clone(),
        ));
    }
    if before.description != after.description {
        changes.push(FieldChange::new(
            "description",
            before.description.clone(),
            after.description.clone(),
        ));
    }
    if before.priority != after.priority {
        changes.push(FieldChange::new("priority", before.priority, after.priority));
    }
    if before.active != after.active {
        changes.push(FieldChange::new("active", before.active, after.active));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::InMemoryDefinitionStore;

    fn meta() -> MetaExtension {
        MetaExtension::new(
            Arc::new(InMemoryDefinitionStore::new()),
            AccessPolicy::default(),
            Arc::new(SystemClock),
        )
    }

    fn admin() -> Actor {
        Actor::platform(1, "super_admin")
    }

    fn operator(tenant: &str) -> Actor {
        Actor::tenant(2, "factory_admin", tenant)
    }

    #[test]
    fn scenario_a_scoped_uniqueness() {
        let meta = meta();
        let draft = || IntentDraft::new("inventory_alert", "ALERT");

        let created = meta.create(&operator("F1"), draft()).unwrap();
        assert_eq!(created.intent_code, "INVENTORY_ALERT");
        assert_eq!(created.scope, IntentScope::Factory("F1".into()));

        let err = meta.create(&operator("F1"), draft()).unwrap_err();
        assert!(matches!(err, IntentError::Conflict(_)));

        meta.create(&operator("F2"), draft()).unwrap();
        meta.create(&admin(), draft()).unwrap();
    }

    #[test]
    fn tenant_cannot_create_platform_or_foreign_scope() {
        let meta = meta();
        let platform = IntentDraft::new("SHIFT_REPORT", "REPORT").with_scope(IntentScope::Platform);
        assert!(matches!(
            meta.create(&operator("F1"), platform).unwrap_err(),
            IntentError::Forbidden(_)
        ));
        let foreign =
            IntentDraft::new("SHIFT_REPORT", "REPORT").with_scope(IntentScope::Factory("F2".into()));
        assert!(matches!(
            meta.create(&operator("F1"), foreign).unwrap_err(),
            IntentError::Forbidden(_)
        ));
    }

    #[test]
    fn create_validates_code_and_category() {
        let meta = meta();
        let err = meta
            .create(&admin(), IntentDraft::new("9-bad code", "ALERT"))
            .unwrap_err();
        assert!(matches!(err, IntentError::Validation { ref field, .. } if field == "intent_code"));
        let err = meta.create(&admin(), IntentDraft::new("GOOD", " ")).unwrap_err();
        assert!(matches!(err, IntentError::Validation { ref field, .. } if field == "category"));
    }

    #[test]
    fn tenant_update_of_platform_definition_is_forbidden() {
        let meta = meta();
        meta.create(&admin(), IntentDraft::new("ALERT_LIST", "ALERT")).unwrap();
        let patch = DefinitionPatch {
            priority: Some(5),
            ..Default::default()
        };
        let err = meta
            .update(&operator("F1"), "ALERT_LIST", Some(IntentScope::Platform), &patch)
            .unwrap_err();
        assert!(matches!(err, IntentError::Forbidden(_)));
    }

    #[test]
    fn platform_update_reports_exactly_the_changed_fields() {
        let meta = meta();
        meta.create(
            &admin(),
            IntentDraft::new("ALERT_LIST", "ALERT")
                .with_keywords(&["alerts"])
                .with_description("List alerts"),
        )
        .unwrap();
        let patch = DefinitionPatch {
            add_keywords: vec!["ALERTS".into(), "open alerts".into()],
            remove_keywords: vec!["not there".into()],
            description: Some("List alerts".into()),
            priority: Some(7),
            active: None,
        };
        let update = meta
            .update(&admin(), "alert_list", Some(IntentScope::Platform), &patch)
            .unwrap();

        let fields: Vec<&str> = update.changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["keywords", "priority"]);
        assert_eq!(update.definition.keywords, vec!["alerts", "open alerts"]);
        assert_eq!(update.changes[1].old, serde_json::json!(0));
        assert_eq!(update.changes[1].new, serde_json::json!(7));
    }

    #[test]
    fn duplicate_keyword_only_patch_changes_nothing() {
        let meta = meta();
        meta.create(&admin(), IntentDraft::new("ALERT_LIST", "ALERT").with_keywords(&["alerts"]))
            .unwrap();
        let patch = DefinitionPatch {
            add_keywords: vec!["alerts".into()],
            ..Default::default()
        };
        let update = meta.update(&admin(), "ALERT_LIST", None, &patch).unwrap();
        assert!(update.changes.is_empty());
    }

    #[test]
    fn update_of_missing_definition_is_unknown() {
        let meta = meta();
        let patch = DefinitionPatch {
            active: Some(false),
            ..Default::default()
        };
        let err = meta.update(&operator("F1"), "NOPE", None, &patch).unwrap_err();
        assert_eq!(err, IntentError::UnknownIntentCode("NOPE".into()));
    }

    #[test]
    fn required_roles_respect_platform_bypass() {
        let policy = AccessPolicy::default();
        let definition = IntentDraft::new("MATERIAL_BATCH_ADJUST", "MATERIAL")
            .with_required_roles(&["warehouse_manager"])
            .into_definition(IntentScope::Platform, chrono::Utc::now());
        assert!(policy.permits(&Actor::tenant(1, "Warehouse_Manager", "F1"), &definition));
        assert!(!policy.permits(&Actor::tenant(1, "operator", "F1"), &definition));
        assert!(policy.permits(&admin(), &definition));
    }
}
