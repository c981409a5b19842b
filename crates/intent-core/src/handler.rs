//! The contract every category handler implements.

use crate::definition::{IntentCategory, IntentDefinition};
use crate::error::IntentResult;
use crate::request::{Actor, ExecutionRequest};
use crate::response::ExecutionResponse;
use crate::semantics::Semantics;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Execute immediately. Mutations are real.
    Direct,
    /// Describe the operation and defer it behind a confirmation token when meaningful.
    Preview,
}

/// Everything a handler sees for one call. Owned by that call only.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request: ExecutionRequest,
    pub definition: IntentDefinition,
    /// Present when the handler is semantics-aware and extraction ran.
    pub semantics: Option<Semantics>,
    /// True when this call replays a confirmed preview.
    pub confirmed: bool,
}

impl ExecutionContext {
    pub fn new(request: ExecutionRequest, definition: IntentDefinition) -> Self {
        Self {
            request,
            definition,
            semantics: None,
            confirmed: false,
        }
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = Some(semantics);
        self
    }

    pub fn intent_code(&self) -> &str {
        &self.definition.intent_code
    }

    pub fn actor(&self) -> &Actor {
        &self.request.actor
    }

    /// Factory (tenant) the call operates on.
    pub fn factory_id(&self) -> Option<&str> {
        self.request.actor.tenant_id()
    }

    /// Lenient field access: extracted semantics when present, otherwise a raw-only
    /// view of the request context.
    pub fn fields(&self) -> Cow<'_, Semantics> {
        match &self.semantics {
            Some(semantics) => Cow::Borrowed(semantics),
            None => Cow::Owned(Semantics::from_request(&self.request)),
        }
    }
}

/// Category-specific behavior. Branching on intent code happens inside the handler
/// over the closed set of codes it owns.
#[async_trait::async_trait]
pub trait IntentHandler: Send + Sync {
    fn supported_category(&self) -> IntentCategory;

    /// Terminal path. Any mutation performed here is real and immediate; the handler
    /// must not assume it is called more than once per user action.
    async fn handle(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse>;

    /// Returns `Preview` with a pending [`crate::ConfirmableAction`] when the
    /// operation can be deferred, or a terminal response when confirmation is not
    /// meaningful for the intent. Defaults to [`IntentHandler::handle`].
    async fn preview(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        self.handle(ctx).await
    }

    /// When true the caller runs NLU extraction first and passes [`Semantics`] in
    /// [`ExecutionContext::semantics`].
    fn supports_semantics_mode(&self) -> bool {
        false
    }
}
