//! Caller-facing facade: resolve → authorize → extract → dispatch → confirm.
//!
//! Every method returns a structured [`ExecutionResponse`]; no error escapes to the
//! caller. The definition store is consulted on every call, so definitions created
//! or updated through the meta layer are dispatchable immediately.

use crate::confirmation::ConfirmationWorkflow;
use crate::definition::{is_valid_intent_code, normalize_intent_code, IntentDefinition};
use crate::dispatcher::Dispatcher;
use crate::error::{IntentError, IntentResult};
use crate::handler::{DispatchMode, ExecutionContext};
use crate::meta::AccessPolicy;
use crate::request::{Actor, ExecutionRequest};
use crate::response::{ExecutionResponse, ExecutionStatus};
use crate::semantics::{Semantics, SemanticsParser};
use crate::store::{match_keywords, DefinitionStore, KeywordMatch};
use std::sync::Arc;

/// Usage accounting collaborator. Charged once per completed execution.
#[async_trait::async_trait]
pub trait QuotaRecorder: Send + Sync {
    async fn record(&self, tenant_id: Option<&str>, intent_code: &str, cost: u32) -> IntentResult<()>;
}

pub struct IntentExecutor {
    definitions: Arc<dyn DefinitionStore>,
    dispatcher: Dispatcher,
    confirmations: ConfirmationWorkflow,
    policy: AccessPolicy,
    semantics_parser: Option<Arc<dyn SemanticsParser>>,
    quota: Option<Arc<dyn QuotaRecorder>>,
}

impl IntentExecutor {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        dispatcher: Dispatcher,
        confirmations: ConfirmationWorkflow,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            definitions,
            dispatcher,
            confirmations,
            policy,
            semantics_parser: None,
            quota: None,
        }
    }

    pub fn with_semantics_parser(mut self, parser: Arc<dyn SemanticsParser>) -> Self {
        self.semantics_parser = Some(parser);
        self
    }

    pub fn with_quota_recorder(mut self, quota: Arc<dyn QuotaRecorder>) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn definitions(&self) -> &Arc<dyn DefinitionStore> {
        &self.definitions
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Direct execution. Mutations performed by the handler are real.
    pub async fn execute(&self, intent_code: &str, request: ExecutionRequest) -> ExecutionResponse {
        let ctx = match self.prepare(intent_code, request).await {
            Ok(ctx) => ctx,
            Err(response) => return response,
        };
        let response = self
            .dispatcher
            .dispatch(DispatchMode::Direct, &ctx.definition.category, &ctx)
            .await;
        self.charge(&ctx, &response).await;
        response
    }

    /// Preview execution. A `Preview` response leaves here with a live confirm token;
    /// terminal responses pass through unchanged.
    pub async fn preview(&self, intent_code: &str, request: ExecutionRequest) -> ExecutionResponse {
        let ctx = match self.prepare(intent_code, request).await {
            Ok(ctx) => ctx,
            Err(response) => return response,
        };
        let mut response = self
            .dispatcher
            .dispatch(DispatchMode::Preview, &ctx.definition.category, &ctx)
            .await;

        if response.status == ExecutionStatus::Preview {
            if response.confirmable_action.is_none() {
                tracing::error!(
                    target: "intent::dispatch",
                    intent_code = ctx.intent_code(),
                    "handler returned a preview without a confirmable action"
                );
                let mut failed =
                    ExecutionResponse::failed("The operation could not be prepared for confirmation")
                        .with_data(serde_json::json!({ "error": "invalid_preview" }));
                failed.stamp(&ctx.definition);
                return failed;
            }
            if let Err(err) = self
                .confirmations
                .issue(&mut response, &ctx.definition, &ctx.request)
            {
                let mut failed = err.into_response();
                failed.stamp(&ctx.definition);
                return failed;
            }
        } else {
            self.charge(&ctx, &response).await;
        }
        response
    }

    /// Redeems `token` and replays the previewed operation through `handle()` with
    /// the stored snapshot. A token works at most once.
    pub async fn confirm(&self, token: &str, actor: &Actor) -> ExecutionResponse {
        let pending = match self.confirmations.claim(token) {
            Ok(pending) => pending,
            Err(err) => return err.into_response(),
        };
        if let Err(err) = self.confirmations.check(&pending, actor) {
            let mut response = err.into_response();
            response.stamp(&pending.definition);
            return response;
        }
        if !self.policy.permits(actor, &pending.definition) {
            return forbidden(&pending.definition, actor);
        }

        let mut ctx = ExecutionContext::new(pending.replay_request(), pending.definition);
        ctx.confirmed = true;
        tracing::info!(
            target: "intent::confirm",
            intent_code = ctx.intent_code(),
            user_id = actor.user_id,
            "confirmation redeemed; executing"
        );
        let response = self
            .dispatcher
            .dispatch(DispatchMode::Direct, &ctx.definition.category, &ctx)
            .await;
        self.charge(&ctx, &response).await;
        response
    }

    /// Keyword candidates for free text, restricted to what the actor may run.
    pub fn match_intents(&self, text: &str, actor: &Actor) -> IntentResult<Vec<KeywordMatch>> {
        let visible: Vec<IntentDefinition> = self
            .definitions
            .visible_to(actor.tenant_id())?
            .into_iter()
            .filter(|d| self.policy.permits(actor, d))
            .collect();
        Ok(match_keywords(text, &visible))
    }

    pub fn purge_expired_confirmations(&self) -> IntentResult<usize> {
        self.confirmations.purge_expired()
    }

    pub fn pending_confirmations(&self) -> IntentResult<usize> {
        self.confirmations.pending_count()
    }

    async fn prepare(
        &self,
        intent_code: &str,
        request: ExecutionRequest,
    ) -> Result<ExecutionContext, ExecutionResponse> {
        let code = normalize_intent_code(intent_code);
        if !is_valid_intent_code(&code) {
            tracing::info!(target: "intent::dispatch", intent_code = %code, "malformed intent code");
            return Err(IntentError::UnknownIntentCode(code).into_response());
        }
        let definition = match self.definitions.resolve(&code, request.actor.tenant_id()) {
            Ok(Some(definition)) => definition,
            Ok(None) => {
                tracing::info!(target: "intent::dispatch", intent_code = %code, "unknown intent code");
                return Err(IntentError::UnknownIntentCode(code).into_response());
            }
            Err(err) => return Err(err.into_response()),
        };

        if !self.policy.permits(&request.actor, &definition) {
            return Err(forbidden(&definition, &request.actor));
        }

        let mut ctx = ExecutionContext::new(request, definition);
        if self.dispatcher.supports_semantics(&ctx.definition.category) {
            let semantics = self.extract(&ctx.request, &ctx.definition).await;
            ctx = ctx.with_semantics(semantics);
        }
        Ok(ctx)
    }

    async fn extract(&self, request: &ExecutionRequest, definition: &IntentDefinition) -> Semantics {
        let Some(parser) = &self.semantics_parser else {
            return Semantics::from_request(request);
        };
        match parser.parse(request, definition).await {
            Ok(semantics) => semantics,
            Err(err) => {
                tracing::warn!(
                    target: "intent::semantics",
                    intent_code = %definition.intent_code,
                    error = %err,
                    "semantic extraction failed; using raw context"
                );
                Semantics::from_request(request)
            }
        }
    }

    async fn charge(&self, ctx: &ExecutionContext, response: &ExecutionResponse) {
        let Some(quota) = &self.quota else { return };
        if response.status != ExecutionStatus::Completed || ctx.definition.quota_cost == 0 {
            return;
        }
        if let Err(err) = quota
            .record(ctx.factory_id(), ctx.intent_code(), ctx.definition.quota_cost)
            .await
        {
            tracing::warn!(
                target: "intent::dispatch",
                intent_code = ctx.intent_code(),
                error = %err,
                "quota recording failed"
            );
        }
    }
}

fn forbidden(definition: &IntentDefinition, actor: &Actor) -> ExecutionResponse {
    tracing::warn!(
        target: "intent::dispatch",
        intent_code = %definition.intent_code,
        user_id = actor.user_id,
        role = %actor.role,
        "actor lacks a required role"
    );
    let mut response = IntentError::Forbidden(format!(
        "role {} may not run {}",
        actor.role, definition.intent_code
    ))
    .into_response();
    response.stamp(definition);
    response
}
