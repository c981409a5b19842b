//! In-process collaborator backends for tests, demos and the daemon's sample mode.

use crate::collaborators::{
    Alert, AlertService, AlertStatus, CollaboratorError, CollaboratorResult, MaterialBatch,
    MaterialService, NotificationService, UserDirectory, UserRef,
};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryAlertService {
    alerts: DashMap<i64, Alert>,
}

impl InMemoryAlertService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alerts(alerts: impl IntoIterator<Item = Alert>) -> Self {
        let service = Self::new();
        for alert in alerts {
            service.alerts.insert(alert.id, alert);
        }
        service
    }

    pub fn snapshot(&self, alert_id: i64) -> Option<Alert> {
        self.alerts.get(&alert_id).map(|a| a.value().clone())
    }

    fn transition(
        &self,
        factory_id: &str,
        alert_id: i64,
        apply: impl FnOnce(&mut Alert) -> CollaboratorResult<()>,
    ) -> CollaboratorResult<Alert> {
        let mut entry = self
            .alerts
            .get_mut(&alert_id)
            .filter(|a| a.factory_id == factory_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("alert {}", alert_id)))?;
        apply(entry.value_mut())?;
        Ok(entry.value().clone())
    }
}

#[async_trait::async_trait]
impl AlertService for InMemoryAlertService {
    async fn list(
        &self,
        factory_id: &str,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> CollaboratorResult<Vec<Alert>> {
        let mut alerts: Vec<Alert> = self
            .alerts
            .iter()
            .filter(|a| a.factory_id == factory_id)
            .filter(|a| status.map_or(true, |s| a.status == s))
            .map(|a| a.value().clone())
            .collect();
        alerts.sort_by(|a, b| b.raised_at.cmp(&a.raised_at).then(a.id.cmp(&b.id)));
        alerts.truncate(limit);
        Ok(alerts)
    }

    async fn get(&self, factory_id: &str, alert_id: i64) -> CollaboratorResult<Option<Alert>> {
        Ok(self
            .alerts
            .get(&alert_id)
            .filter(|a| a.factory_id == factory_id)
            .map(|a| a.value().clone()))
    }

    async fn acknowledge(&self, factory_id: &str, alert_id: i64, user_id: i64) -> CollaboratorResult<Alert> {
        self.transition(factory_id, alert_id, |alert| {
            if alert.status == AlertStatus::Resolved {
                return Err(CollaboratorError::Rejected(format!("alert {} is already resolved", alert.id)));
            }
            alert.status = AlertStatus::Acknowledged;
            alert.handled_by = Some(user_id);
            Ok(())
        })
    }

    async fn resolve(
        &self,
        factory_id: &str,
        alert_id: i64,
        user_id: i64,
        resolution: &str,
    ) -> CollaboratorResult<Alert> {
        self.transition(factory_id, alert_id, |alert| {
            alert.status = AlertStatus::Resolved;
            alert.resolution = Some(resolution.to_string());
            alert.handled_by = Some(user_id);
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryMaterialService {
    batches: DashMap<i64, MaterialBatch>,
}

impl InMemoryMaterialService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batches(batches: impl IntoIterator<Item = MaterialBatch>) -> Self {
        let service = Self::new();
        for batch in batches {
            service.batches.insert(batch.id, batch);
        }
        service
    }

    pub fn quantity(&self, batch_id: i64) -> Option<f64> {
        self.batches.get(&batch_id).map(|b| b.quantity)
    }
}

#[async_trait::async_trait]
impl MaterialService for InMemoryMaterialService {
    async fn find_by_id(&self, factory_id: &str, batch_id: i64) -> CollaboratorResult<Option<MaterialBatch>> {
        Ok(self
            .batches
            .get(&batch_id)
            .filter(|b| b.factory_id == factory_id)
            .map(|b| b.value().clone()))
    }

    async fn find_by_number(
        &self,
        factory_id: &str,
        batch_number: &str,
    ) -> CollaboratorResult<Option<MaterialBatch>> {
        Ok(self
            .batches
            .iter()
            .find(|b| b.factory_id == factory_id && b.batch_number.eq_ignore_ascii_case(batch_number.trim()))
            .map(|b| b.value().clone()))
    }

    async fn list(&self, factory_id: &str, material: Option<&str>) -> CollaboratorResult<Vec<MaterialBatch>> {
        let needle = material.map(|m| m.trim().to_lowercase());
        let mut batches: Vec<MaterialBatch> = self
            .batches
            .iter()
            .filter(|b| b.factory_id == factory_id)
            .filter(|b| {
                needle
                    .as_deref()
                    .map_or(true, |n| b.material_name.to_lowercase().contains(n))
            })
            .map(|b| b.value().clone())
            .collect();
        batches.sort_by_key(|b| b.id);
        Ok(batches)
    }

    async fn adjust(
        &self,
        factory_id: &str,
        batch_id: i64,
        delta: f64,
        _reason: &str,
        _user_id: i64,
    ) -> CollaboratorResult<MaterialBatch> {
        let mut entry = self
            .batches
            .get_mut(&batch_id)
            .filter(|b| b.factory_id == factory_id)
            .ok_or_else(|| CollaboratorError::NotFound(format!("batch {}", batch_id)))?;
        let next = entry.quantity + delta;
        if next < 0.0 {
            return Err(CollaboratorError::Rejected(format!(
                "batch {} cannot go below zero",
                entry.batch_number
            )));
        }
        entry.quantity = next;
        Ok(entry.value().clone())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    /// (factory_id, role) → users.
    users: DashMap<(String, String), Vec<UserRef>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, factory_id: &str, role: &str, user: UserRef) {
        self.users
            .entry((factory_id.to_string(), role.trim().to_lowercase()))
            .or_default()
            .push(user);
    }
}

#[async_trait::async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn users_with_role(&self, factory_id: &str, role: &str) -> CollaboratorResult<Vec<UserRef>> {
        Ok(self
            .users
            .get(&(factory_id.to_string(), role.trim().to_lowercase()))
            .map(|u| u.value().clone())
            .unwrap_or_default())
    }
}

/// Records deliveries; users listed in `unreachable` fail with `Unavailable`.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    delivered: Mutex<Vec<(i64, String)>>,
    unreachable: BTreeSet<i64>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(user_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            unreachable: user_ids.into_iter().collect(),
        }
    }

    pub fn delivered_to(&self) -> Vec<i64> {
        self.delivered
            .lock()
            .map(|d| d.iter().map(|(id, _)| *id).collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NotificationService for RecordingNotifier {
    async fn send(&self, _factory_id: &str, user_id: i64, title: &str, _body: &str) -> CollaboratorResult<()> {
        if self.unreachable.contains(&user_id) {
            return Err(CollaboratorError::Unavailable(format!(
                "push gateway rejected user {}",
                user_id
            )));
        }
        if let Ok(mut delivered) = self.delivered.lock() {
            delivered.push((user_id, title.to_string()));
        }
        Ok(())
    }
}
