//! Domain services the handlers consume. Only the interface lives here; the
//! platform supplies real implementations, [`crate::memory`] supplies in-process ones.

use chrono::{DateTime, Utc};
use intent_core::IntentError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl From<CollaboratorError> for IntentError {
    fn from(err: CollaboratorError) -> Self {
        IntentError::downstream(err)
    }
}

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

// -----------------------------------------------------------------------------
// Alerts
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "open" | "active" | "new" => Some(AlertStatus::Open),
            "acknowledged" | "ack" => Some(AlertStatus::Acknowledged),
            "resolved" | "closed" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Open => "open",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    pub factory_id: String,
    pub title: String,
    pub level: String,
    pub status: AlertStatus,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub handled_by: Option<i64>,
    pub raised_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait AlertService: Send + Sync {
    async fn list(
        &self,
        factory_id: &str,
        status: Option<AlertStatus>,
        limit: usize,
    ) -> CollaboratorResult<Vec<Alert>>;

    async fn get(&self, factory_id: &str, alert_id: i64) -> CollaboratorResult<Option<Alert>>;

    async fn acknowledge(&self, factory_id: &str, alert_id: i64, user_id: i64) -> CollaboratorResult<Alert>;

    async fn resolve(
        &self,
        factory_id: &str,
        alert_id: i64,
        user_id: i64,
        resolution: &str,
    ) -> CollaboratorResult<Alert>;
}

// -----------------------------------------------------------------------------
// Material batches
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialBatch {
    pub id: i64,
    pub factory_id: String,
    pub batch_number: String,
    pub material_name: String,
    pub quantity: f64,
    pub unit: String,
}

#[async_trait::async_trait]
pub trait MaterialService: Send + Sync {
    async fn find_by_id(&self, factory_id: &str, batch_id: i64) -> CollaboratorResult<Option<MaterialBatch>>;

    async fn find_by_number(
        &self,
        factory_id: &str,
        batch_number: &str,
    ) -> CollaboratorResult<Option<MaterialBatch>>;

    /// Batches of a factory, optionally narrowed to a material name (substring match).
    async fn list(&self, factory_id: &str, material: Option<&str>) -> CollaboratorResult<Vec<MaterialBatch>>;

    /// Applies `delta` to the batch quantity; rejects results below zero.
    async fn adjust(
        &self,
        factory_id: &str,
        batch_id: i64,
        delta: f64,
        reason: &str,
        user_id: i64,
    ) -> CollaboratorResult<MaterialBatch>;
}

// -----------------------------------------------------------------------------
// Users & notifications
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
}

#[async_trait::async_trait]
pub trait UserDirectory: Send + Sync {
    async fn users_with_role(&self, factory_id: &str, role: &str) -> CollaboratorResult<Vec<UserRef>>;
}

#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    async fn send(&self, factory_id: &str, user_id: i64, title: &str, body: &str) -> CollaboratorResult<()>;
}
