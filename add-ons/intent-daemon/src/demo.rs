//! In-memory factory used when the daemon runs without real backends.

use chrono::Utc;
use intent_handlers::memory::{
    InMemoryAlertService, InMemoryMaterialService, InMemoryUserDirectory, RecordingNotifier,
};
use intent_handlers::{Alert, AlertStatus, DomainServices, MaterialBatch, UserRef};
use std::sync::Arc;

pub const DEMO_FACTORY: &str = "F1";

pub fn demo_services() -> DomainServices {
    let alerts = InMemoryAlertService::with_alerts([
        Alert {
            id: 1,
            factory_id: DEMO_FACTORY.into(),
            title: "Freezer 2 above -15C".into(),
            level: "critical".into(),
            status: AlertStatus::Open,
            resolution: None,
            handled_by: None,
            raised_at: Utc::now(),
        },
        Alert {
            id: 2,
            factory_id: DEMO_FACTORY.into(),
            title: "PET resin below reorder point".into(),
            level: "warning".into(),
            status: AlertStatus::Open,
            resolution: None,
            handled_by: None,
            raised_at: Utc::now(),
        },
    ]);
    let materials = InMemoryMaterialService::with_batches([
        MaterialBatch {
            id: 11,
            factory_id: DEMO_FACTORY.into(),
            batch_number: "MB-2024-011".into(),
            material_name: "PET resin".into(),
            quantity: 40.0,
            unit: "kg".into(),
        },
        MaterialBatch {
            id: 12,
            factory_id: DEMO_FACTORY.into(),
            batch_number: "MB-2024-012".into(),
            material_name: "Copper wire".into(),
            quantity: 250.0,
            unit: "m".into(),
        },
    ]);
    let users = InMemoryUserDirectory::new();
    users.add(DEMO_FACTORY, "line_lead", UserRef { id: 21, name: "Ana".into() });
    users.add(DEMO_FACTORY, "line_lead", UserRef { id: 22, name: "Ben".into() });
    users.add(DEMO_FACTORY, "warehouse_manager", UserRef { id: 3, name: "Chen".into() });

    DomainServices {
        alerts: Arc::new(alerts),
        materials: Arc::new(materials),
        users: Arc::new(users),
        notifier: Arc::new(RecordingNotifier::new()),
    }
}
