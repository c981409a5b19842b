//! Default handlers behind a bootstrapped executor:
//!
//! - material adjustment through preview / confirm with a manual clock
//! - role broadcast with one unreachable recipient (partial failure)
//! - broadcast recipients frozen at preview time
//! - alert acknowledgement driven by an NLU parser's object id
//! - role-gated adjustment and keyword routing per role
//! - platform actors confirming adjustments and broadcasts for a named factory
//! - direct broadcasts resolving recipients from the role only

use chrono::Utc;
use intent_core::{
    bootstrap_with_clock, Actor, ExecutionRequest, ExecutionStatus, HandlerRegistry,
    IntentConfig, IntentDefinition, IntentExecutor, IntentResult, ManualClock, Semantics,
    SemanticsParser,
};
use intent_handlers::memory::{
    InMemoryAlertService, InMemoryMaterialService, InMemoryUserDirectory, RecordingNotifier,
};
use intent_handlers::{
    default_definitions, register_default_handlers, Alert, AlertStatus, DomainServices,
    MaterialBatch, UserRef,
};
use std::sync::Arc;

struct Plant {
    executor: IntentExecutor,
    clock: Arc<ManualClock>,
    alerts: Arc<InMemoryAlertService>,
    materials: Arc<InMemoryMaterialService>,
    users: Arc<InMemoryUserDirectory>,
    notifier: Arc<RecordingNotifier>,
}

fn plant_with_notifier(notifier: RecordingNotifier) -> Plant {
    let alerts = Arc::new(InMemoryAlertService::with_alerts(vec![Alert {
        id: 7,
        factory_id: "F1".into(),
        title: "Compressor 4 pressure low".into(),
        level: "warning".into(),
        status: AlertStatus::Open,
        resolution: None,
        handled_by: None,
        raised_at: Utc::now(),
    }]));
    let materials = Arc::new(InMemoryMaterialService::with_batches(vec![MaterialBatch {
        id: 11,
        factory_id: "F1".into(),
        batch_number: "MB-1".into(),
        material_name: "Copper wire".into(),
        quantity: 100.0,
        unit: "m".into(),
    }]));
    let users = Arc::new(InMemoryUserDirectory::new());
    for (id, name) in [(21, "Ana"), (22, "Ben"), (23, "Chen"), (24, "Dara"), (25, "Eli")] {
        users.add("F1", "line_lead", UserRef { id, name: name.into() });
    }
    let notifier = Arc::new(notifier);

    let services = DomainServices {
        alerts: alerts.clone(),
        materials: materials.clone(),
        users: users.clone(),
        notifier: notifier.clone(),
    };
    let mut registry = HandlerRegistry::new();
    register_default_handlers(&mut registry, &services).unwrap();
    let clock = Arc::new(ManualClock::default());
    let executor = bootstrap_with_clock(
        &IntentConfig::default(),
        registry,
        default_definitions(),
        clock.clone(),
    )
    .unwrap();

    Plant {
        executor,
        clock,
        alerts,
        materials,
        users,
        notifier,
    }
}

fn plant() -> Plant {
    plant_with_notifier(RecordingNotifier::new())
}

fn manager() -> Actor {
    Actor::tenant(3, "warehouse_manager", "F1")
}

fn supervisor() -> Actor {
    Actor::tenant(4, "supervisor", "F1")
}

fn adjust_request() -> ExecutionRequest {
    ExecutionRequest::new("take 12.5 m off MB-1, damaged on reel", manager())
        .with_entity("material_batch", "MB-1")
        .with_context("delta", -12.5)
        .with_context("reason", "damaged on reel")
}

#[tokio::test]
async fn material_adjustment_preview_confirm_window() {
    let p = plant();

    let stale = p.executor.preview("MATERIAL_BATCH_ADJUST", adjust_request()).await;
    assert_eq!(stale.status, ExecutionStatus::Preview, "{}", stale.message);
    assert_eq!(stale.confirmable_action.as_ref().unwrap().expires_in_seconds, 300);
    let stale_token = stale.confirm_token().unwrap().to_string();
    assert_eq!(p.materials.quantity(11), Some(100.0));

    p.clock.advance_secs(301);
    let expired = p.executor.confirm(&stale_token, &manager()).await;
    assert_eq!(expired.result_data["error"], "expired_confirmation");
    assert_eq!(p.materials.quantity(11), Some(100.0));

    let fresh = p.executor.preview("MATERIAL_BATCH_ADJUST", adjust_request()).await;
    let token = fresh.confirm_token().unwrap().to_string();
    p.clock.advance_secs(100);
    let done = p.executor.confirm(&token, &manager()).await;
    assert_eq!(done.status, ExecutionStatus::Completed, "{}", done.message);
    assert_eq!(done.quota_cost, 2);
    assert_eq!(p.materials.quantity(11), Some(87.5));
    let change = &done.affected_entities[0].changes[0];
    assert_eq!(change.field, "quantity");
    assert_eq!(change.old, serde_json::json!(100.0));
    assert_eq!(change.new, serde_json::json!(87.5));
}

#[tokio::test]
async fn broadcast_skips_unreachable_recipient() {
    let p = plant_with_notifier(RecordingNotifier::failing_for([23]));
    let request = ExecutionRequest::new("tell all line leads", supervisor())
        .with_context("role", "line_lead")
        .with_context("message", "Shift handover moved to 14:30");

    let response = p.executor.execute("NOTIFY_ROLE", request).await;
    assert_eq!(response.status, ExecutionStatus::Completed);
    assert_eq!(response.result_data["total"], 5);
    assert_eq!(response.result_data["succeeded"], 4);
    assert_eq!(response.result_data["skipped"], 1);
    assert_eq!(response.result_data["failures"][0]["target"], "23");
    assert_eq!(response.affected_entities.len(), 4);
    assert_eq!(p.notifier.delivered_to(), vec![21, 22, 24, 25]);
}

#[tokio::test]
async fn broadcast_recipients_are_frozen_at_preview() {
    let p = plant();
    let request = ExecutionRequest::new("notify line leads", supervisor())
        .with_context("role", "line_lead")
        .with_context("message", "Fire drill at 10:00");

    let preview = p.executor.preview("NOTIFY_ROLE", request).await;
    assert_eq!(preview.status, ExecutionStatus::Preview);
    assert_eq!(p.notifier.delivered_to(), Vec::<i64>::new());

    p.users.add("F1", "line_lead", UserRef { id: 26, name: "Fay".into() });
    let done = p
        .executor
        .confirm(preview.confirm_token().unwrap(), &supervisor())
        .await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(p.notifier.delivered_to(), vec![21, 22, 23, 24, 25]);
}

/// Picks `#<id>` out of the user text as the object id.
struct HashIdParser;

#[async_trait::async_trait]
impl SemanticsParser for HashIdParser {
    async fn parse(&self, request: &ExecutionRequest, _: &IntentDefinition) -> IntentResult<Semantics> {
        let mut semantics = Semantics::from_request(request);
        if let Some(id) = request
            .user_input
            .split_whitespace()
            .find_map(|w| w.strip_prefix('#'))
            .and_then(|w| w.parse::<i64>().ok())
        {
            semantics = semantics.with_object_id(id);
        }
        Ok(semantics)
    }
}

#[tokio::test]
async fn alert_acknowledge_uses_extracted_object_id() {
    let p = plant();
    let executor = p.executor.with_semantics_parser(Arc::new(HashIdParser));
    let actor = supervisor();

    let preview = executor
        .preview("ALERT_ACKNOWLEDGE", ExecutionRequest::new("ack alert #7 please", actor.clone()))
        .await;
    assert_eq!(preview.status, ExecutionStatus::Preview, "{}", preview.message);
    assert_eq!(p.alerts.snapshot(7).unwrap().status, AlertStatus::Open);

    let done = executor.confirm(preview.confirm_token().unwrap(), &actor).await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    let alert = p.alerts.snapshot(7).unwrap();
    assert_eq!(alert.status, AlertStatus::Acknowledged);
    assert_eq!(alert.handled_by, Some(4));

    let again = executor
        .preview("ALERT_ACKNOWLEDGE", ExecutionRequest::new("ack alert #7", actor))
        .await;
    assert_eq!(again.status, ExecutionStatus::Completed);
    assert!(again.confirm_token().is_none());
}

#[tokio::test]
async fn adjustment_is_role_gated_and_keywords_follow_roles() {
    let p = plant();
    let operator = Actor::tenant(9, "operator", "F1");

    let mut as_operator = adjust_request();
    as_operator.actor = operator.clone();
    let refused = p.executor.preview("MATERIAL_BATCH_ADJUST", as_operator).await;
    assert_eq!(refused.status, ExecutionStatus::Failed);
    assert_eq!(refused.result_data["error"], "forbidden");
    assert_eq!(p.executor.pending_confirmations().unwrap(), 0);

    let for_manager = p.executor.match_intents("please adjust batch MB-1", &manager()).unwrap();
    assert_eq!(for_manager[0].intent_code, "MATERIAL_BATCH_ADJUST");
    let for_operator = p.executor.match_intents("please adjust batch MB-1", &operator).unwrap();
    assert_eq!(for_operator[0].intent_code, "MATERIAL_BATCH_QUERY");
}

#[tokio::test]
async fn platform_actor_confirms_adjustment_for_a_named_factory() {
    let p = plant();
    let admin = Actor::platform(1, "super_admin");
    let request = ExecutionRequest::new("scrap five metres", admin.clone())
        .with_context("factory_id", "F1")
        .with_context("batch_id", 11)
        .with_context("delta", -5)
        .with_context("reason", "scrap");

    let preview = p.executor.preview("MATERIAL_BATCH_ADJUST", request).await;
    assert_eq!(preview.status, ExecutionStatus::Preview, "{}", preview.message);
    let done = p
        .executor
        .confirm(preview.confirm_token().unwrap(), &admin)
        .await;
    assert_eq!(done.status, ExecutionStatus::Completed, "{}", done.message);
    assert_eq!(p.materials.quantity(11), Some(95.0));
}

#[tokio::test]
async fn platform_actor_confirms_broadcast_for_a_named_factory() {
    let p = plant();
    let admin = Actor::platform(1, "super_admin");
    let request = ExecutionRequest::new("notify line leads", admin.clone())
        .with_context("factory_id", "F1")
        .with_context("role", "line_lead")
        .with_context("message", "Audit at 09:00");

    let preview = p.executor.preview("NOTIFY_ROLE", request).await;
    assert_eq!(preview.status, ExecutionStatus::Preview, "{}", preview.message);
    let done = p
        .executor
        .confirm(preview.confirm_token().unwrap(), &admin)
        .await;
    assert_eq!(done.status, ExecutionStatus::Completed, "{}", done.message);
    assert_eq!(p.notifier.delivered_to(), vec![21, 22, 23, 24, 25]);
}

#[tokio::test]
async fn direct_broadcast_ignores_caller_supplied_recipients() {
    let p = plant();
    let request = ExecutionRequest::new("tell all line leads", supervisor())
        .with_context("role", "line_lead")
        .with_context("message", "Canteen closed today")
        .with_context("recipient_ids", vec![99_i64, 12345]);

    let response = p.executor.execute("NOTIFY_ROLE", request).await;
    assert_eq!(response.status, ExecutionStatus::Completed);
    assert_eq!(response.result_data["total"], 5);
    assert_eq!(p.notifier.delivered_to(), vec![21, 22, 23, 24, 25]);
}
