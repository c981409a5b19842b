//! Category → handler routing.
//!
//! The registry is filled once at process start and frozen into the [`Dispatcher`];
//! after that lookups are plain reads of an immutable map. The dispatcher never
//! looks at intent codes.

use crate::definition::IntentCategory;
use crate::error::{IntentError, RegistryError};
use crate::handler::{DispatchMode, ExecutionContext, IntentHandler};
use crate::response::ExecutionResponse;
use futures_util::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Build-time map from category to handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<IntentCategory, Arc<dyn IntentHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler. Two handlers for one category is a fatal startup error.
    pub fn register(&mut self, handler: Arc<dyn IntentHandler>) -> Result<(), RegistryError> {
        let category = handler.supported_category();
        if self.handlers.contains_key(&category) {
            return Err(RegistryError::AmbiguousRegistration(category));
        }
        tracing::debug!(target: "intent::dispatch", category = %category, "handler registered");
        self.handlers.insert(category, handler);
        Ok(())
    }

    pub fn get(&self, category: &IntentCategory) -> Option<Arc<dyn IntentHandler>> {
        self.handlers.get(category).cloned()
    }

    pub fn categories(&self) -> Vec<IntentCategory> {
        let mut categories: Vec<IntentCategory> = self.handlers.keys().cloned().collect();
        categories.sort();
        categories
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Routes a call to exactly one handler and converts every outcome into a response.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn categories(&self) -> Vec<IntentCategory> {
        self.registry.categories()
    }

    pub fn supports_semantics(&self, category: &IntentCategory) -> bool {
        self.registry
            .get(category)
            .map(|h| h.supports_semantics_mode())
            .unwrap_or(false)
    }

    /// Dispatches in `mode` to the handler for `category`. Never returns an error:
    /// unsupported categories, handler errors and handler panics all become responses.
    pub async fn dispatch(
        &self,
        mode: DispatchMode,
        category: &IntentCategory,
        ctx: &ExecutionContext,
    ) -> ExecutionResponse {
        let Some(handler) = self.registry.get(category) else {
            tracing::warn!(
                target: "intent::dispatch",
                category = %category,
                intent_code = ctx.intent_code(),
                "no handler for category"
            );
            let mut response = IntentError::UnsupportedCategory(category.clone()).into_response();
            response.stamp(&ctx.definition);
            return response;
        };

        let outcome = match mode {
            DispatchMode::Direct => AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await,
            DispatchMode::Preview => AssertUnwindSafe(handler.preview(ctx)).catch_unwind().await,
        };

        let mut response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                tracing::info!(
                    target: "intent::dispatch",
                    category = %category,
                    intent_code = ctx.intent_code(),
                    error = %err,
                    kind = err.kind(),
                    "handler returned error"
                );
                err.into_response()
            }
            Err(_) => {
                tracing::error!(
                    target: "intent::dispatch",
                    category = %category,
                    intent_code = ctx.intent_code(),
                    "handler panicked"
                );
                ExecutionResponse::failed("The operation failed unexpectedly")
                    .with_data(serde_json::json!({ "error": "handler_panic" }))
            }
        };
        response.stamp(&ctx.definition);
        response
    }
}
