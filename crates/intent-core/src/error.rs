//! Error taxonomy. Every variant converts into a structured [`ExecutionResponse`];
//! startup-only failures ([`RegistryError`], [`BootstrapError`]) are returned from
//! construction instead.

use crate::definition::IntentCategory;
use crate::response::ExecutionResponse;
use crate::sanitize::sanitize_message;

pub type IntentResult<T> = Result<T, IntentError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IntentError {
    /// A required field is missing or unusable. Surfaces as `NeedMoreInfo`.
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("no handler registered for category {0}")]
    UnsupportedCategory(IntentCategory),

    #[error("unknown intent code: {0}")]
    UnknownIntentCode(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("confirmation expired")]
    ExpiredConfirmation,

    #[error("confirmation token is unknown or has already been used")]
    InvalidConfirmation,

    /// A collaborator call failed. The message is sanitized before it reaches users.
    #[error("downstream failure: {0}")]
    Downstream(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl IntentError {
    pub fn missing(field: &str) -> Self {
        IntentError::Validation {
            field: field.to_string(),
            message: format!("Please provide {}", field.replace('_', " ")),
        }
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        IntentError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn downstream(err: impl std::fmt::Display) -> Self {
        IntentError::Downstream(sanitize_message(&err.to_string()))
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        IntentError::Storage(sanitize_message(&err.to_string()))
    }

    /// Stable kind tag reported in `result_data.error`.
    pub fn kind(&self) -> &'static str {
        match self {
            IntentError::Validation { .. } => "validation",
            IntentError::UnsupportedCategory(_) => "unsupported_category",
            IntentError::UnknownIntentCode(_) => "unknown_intent_code",
            IntentError::Conflict(_) => "conflict",
            IntentError::Forbidden(_) => "forbidden",
            IntentError::ExpiredConfirmation => "expired_confirmation",
            IntentError::InvalidConfirmation => "invalid_confirmation",
            IntentError::Downstream(_) => "downstream",
            IntentError::Storage(_) => "storage",
        }
    }

    pub fn into_response(self) -> ExecutionResponse {
        match &self {
            IntentError::Validation { field, message } => {
                ExecutionResponse::need_more_info(message.clone(), &[field.as_str()])
            }
            IntentError::Downstream(msg) => ExecutionResponse::failed(format!(
                "The operation could not be completed: {}",
                sanitize_message(msg)
            ))
            .with_data(serde_json::json!({ "error": self.kind() })),
            IntentError::Storage(_) => {
                ExecutionResponse::failed("The intent registry is temporarily unavailable")
                    .with_data(serde_json::json!({ "error": self.kind() }))
            }
            _ => ExecutionResponse::failed(self.to_string())
                .with_data(serde_json::json!({ "error": self.kind() })),
        }
    }
}

impl From<sled::Error> for IntentError {
    fn from(err: sled::Error) -> Self {
        IntentError::storage(err)
    }
}

impl From<serde_json::Error> for IntentError {
    fn from(err: serde_json::Error) -> Self {
        IntentError::storage(err)
    }
}

/// Fatal handler registration error, raised while the registry is being built.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("ambiguous registration: category {0} already has a handler")]
    AmbiguousRegistration(IntentCategory),
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("failed to open storage: {0}")]
    Storage(#[from] sled::Error),

    #[error("failed to read seed file {path}: {message}")]
    Seed { path: String, message: String },

    #[error("failed to seed definitions: {0}")]
    Intent(#[from] IntentError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ExecutionStatus;

    #[test]
    fn validation_becomes_need_more_info() {
        let response = IntentError::missing("batch_id").into_response();
        assert_eq!(response.status, ExecutionStatus::NeedMoreInfo);
        assert_eq!(response.message, "Please provide batch id");
        assert_eq!(response.result_data["missing_fields"][0], "batch_id");
    }

    #[test]
    fn other_errors_become_failed_with_kind() {
        let response = IntentError::UnsupportedCategory(IntentCategory::new("ALERT")).into_response();
        assert_eq!(response.status, ExecutionStatus::Failed);
        assert_eq!(response.result_data["error"], "unsupported_category");
        assert!(response.message.contains("ALERT"));
    }

    #[test]
    fn downstream_messages_are_sanitized() {
        let response =
            IntentError::downstream("connect failed: password=topsecret\n  at db.rs:10").into_response();
        assert_eq!(response.status, ExecutionStatus::Failed);
        assert!(!response.message.contains("topsecret"));
        assert!(!response.message.contains("db.rs"));
    }
}
