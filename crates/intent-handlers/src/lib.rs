//! intent-handlers: category handlers for the intent execution core.
//!
//! Each handler owns one category and branches over its closed set of intent codes.
//! Domain services are injected through the traits in [`collaborators`].

pub mod alert;
pub mod collaborators;
pub mod material;
pub mod memory;
pub mod notification;

pub use alert::AlertHandler;
pub use collaborators::{
    Alert, AlertService, AlertStatus, CollaboratorError, CollaboratorResult, MaterialBatch,
    MaterialService, NotificationService, UserDirectory, UserRef,
};
pub use material::MaterialHandler;
pub use notification::NotificationHandler;

use intent_core::{
    ExecutionContext, HandlerRegistry, IntentDraft, IntentError, IntentResult, IntentScope,
    RegistryError, Semantics, SensitivityLevel,
};
use std::sync::Arc;

/// The collaborators the default handlers need.
#[derive(Clone)]
pub struct DomainServices {
    pub alerts: Arc<dyn AlertService>,
    pub materials: Arc<dyn MaterialService>,
    pub users: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn NotificationService>,
}

/// Registers the ALERT, MATERIAL and NOTIFICATION handlers.
pub fn register_default_handlers(
    registry: &mut HandlerRegistry,
    services: &DomainServices,
) -> Result<(), RegistryError> {
    registry.register(Arc::new(AlertHandler::new(Arc::clone(&services.alerts))))?;
    registry.register(Arc::new(MaterialHandler::new(Arc::clone(&services.materials))))?;
    registry.register(Arc::new(NotificationHandler::new(
        Arc::clone(&services.users),
        Arc::clone(&services.notifier),
    )))?;
    Ok(())
}

/// Platform definitions for the intents these handlers implement.
pub fn default_definitions() -> Vec<IntentDraft> {
    vec![
        IntentDraft::new(alert::ALERT_LIST, alert::ALERT_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_keywords(&["alerts", "open alerts", "show alerts"])
            .with_description("List alerts of the current factory"),
        IntentDraft::new(alert::ALERT_ACKNOWLEDGE, alert::ALERT_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_sensitivity(SensitivityLevel::Medium)
            .with_quota_cost(1)
            .with_priority(10)
            .with_keywords(&["acknowledge alert", "ack alert"])
            .with_description("Acknowledge an open alert"),
        IntentDraft::new(alert::ALERT_RESOLVE, alert::ALERT_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_sensitivity(SensitivityLevel::Medium)
            .with_quota_cost(1)
            .with_priority(10)
            .with_keywords(&["resolve alert", "close alert"])
            .with_description("Resolve an alert with a resolution note"),
        IntentDraft::new(material::MATERIAL_BATCH_QUERY, material::MATERIAL_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_keywords(&["batch", "stock of", "inventory"])
            .with_description("Look up material batches and stock levels"),
        IntentDraft::new(material::MATERIAL_BATCH_ADJUST, material::MATERIAL_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_sensitivity(SensitivityLevel::High)
            .with_quota_cost(2)
            .with_priority(20)
            .with_required_roles(&["warehouse_manager", "factory_admin"])
            .with_keywords(&["adjust batch", "adjust stock", "correct inventory"])
            .with_description("Change the quantity of a material batch"),
        IntentDraft::new(notification::NOTIFY_ROLE, notification::NOTIFICATION_CATEGORY)
            .with_scope(IntentScope::Platform)
            .with_sensitivity(SensitivityLevel::Medium)
            .with_quota_cost(1)
            .with_keywords(&["notify", "tell all", "broadcast"])
            .with_description("Send a message to every user holding a role"),
    ]
}

/// Factory the call operates on: the actor's tenant, or an explicit `factory_id`
/// field for platform actors.
pub(crate) fn require_factory(ctx: &ExecutionContext, fields: &Semantics) -> IntentResult<String> {
    ctx.factory_id()
        .map(str::to_string)
        .or_else(|| fields.string("factory_id"))
        .ok_or_else(|| IntentError::missing("factory_id"))
}
