//! MATERIAL category: batch lookups and stock adjustments.

use crate::collaborators::{MaterialBatch, MaterialService};
use crate::require_factory;
use intent_core::{
    AffectedEntity, ConfirmableAction, ContextBag, ContextValue, ExecutionContext,
    ExecutionResponse, FieldChange, IntentCategory, IntentError, IntentHandler, IntentResult,
    Semantics, SuggestedAction,
};
use std::sync::Arc;

pub const MATERIAL_CATEGORY: &str = "MATERIAL";
pub const MATERIAL_BATCH_QUERY: &str = "MATERIAL_BATCH_QUERY";
pub const MATERIAL_BATCH_ADJUST: &str = "MATERIAL_BATCH_ADJUST";

pub struct MaterialHandler {
    materials: Arc<dyn MaterialService>,
}

/// A validated adjustment, ready to preview or apply.
struct Adjustment {
    batch: MaterialBatch,
    delta: f64,
    reason: String,
}

impl MaterialHandler {
    pub fn new(materials: Arc<dyn MaterialService>) -> Self {
        Self { materials }
    }

    /// Batch by explicit id, then extracted object id, then batch number. `None` when
    /// the request names no batch at all.
    async fn find_batch(&self, factory_id: &str, fields: &Semantics) -> IntentResult<Option<MaterialBatch>> {
        if let Some(id) = fields.long("batch_id").or_else(|| fields.object_id()) {
            return self
                .materials
                .find_by_id(factory_id, id)
                .await?
                .map(Some)
                .ok_or_else(|| IntentError::invalid("batch_id", format!("No material batch #{} was found", id)));
        }
        let number = fields
            .string("batch_number")
            .or_else(|| fields.object_identifier().map(str::to_string));
        match number {
            Some(number) => self
                .materials
                .find_by_number(factory_id, &number)
                .await?
                .map(Some)
                .ok_or_else(|| {
                    IntentError::invalid("batch_number", format!("No material batch {} was found", number))
                }),
            None => Ok(None),
        }
    }

    async fn plan_adjustment(&self, ctx: &ExecutionContext) -> IntentResult<Adjustment> {
        let fields = ctx.fields();
        let factory_id = require_factory(ctx, &fields)?;
        let batch = self
            .find_batch(&factory_id, &fields)
            .await?
            .ok_or_else(|| IntentError::missing("batch_id"))?;
        let delta = fields.require_double("delta")?;
        if delta == 0.0 {
            return Err(IntentError::invalid("delta", "Please provide a non-zero quantity change"));
        }
        let reason = fields.require_string("reason")?;
        if batch.quantity + delta < 0.0 {
            return Err(IntentError::invalid(
                "delta",
                format!(
                    "Batch {} holds {} {}; it cannot drop by {}",
                    batch.batch_number,
                    batch.quantity,
                    batch.unit,
                    -delta
                ),
            ));
        }
        Ok(Adjustment { batch, delta, reason })
    }

    async fn query(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let fields = ctx.fields();
        let factory_id = require_factory(ctx, &fields)?;
        if let Some(batch) = self.find_batch(&factory_id, &fields).await? {
            return Ok(ExecutionResponse::completed(format!(
                "Batch {} ({}) holds {} {}",
                batch.batch_number, batch.material_name, batch.quantity, batch.unit
            ))
            .with_data(serde_json::json!({ "batches": [batch] }))
            .with_suggestion(
                SuggestedAction::new(MATERIAL_BATCH_ADJUST, "Adjust this batch")
                    .with_parameters(serde_json::json!({ "batch_id": batch.id })),
            ));
        }
        let material = fields.string("material");
        let batches = self.materials.list(&factory_id, material.as_deref()).await?;
        let total: f64 = batches.iter().map(|b| b.quantity).sum();
        Ok(ExecutionResponse::completed(format!("Found {} batch(es)", batches.len()))
            .with_data(serde_json::json!({ "batches": batches, "total_quantity": total })))
    }

    async fn adjust(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        let plan = self.plan_adjustment(ctx).await?;
        let updated = self
            .materials
            .adjust(
                &plan.batch.factory_id,
                plan.batch.id,
                plan.delta,
                &plan.reason,
                ctx.actor().user_id,
            )
            .await?;
        tracing::info!(
            target: "intent::dispatch",
            batch_id = updated.id,
            delta = plan.delta,
            user_id = ctx.actor().user_id,
            "material batch adjusted"
        );
        Ok(ExecutionResponse::completed(format!(
            "Batch {} adjusted by {} {} (now {} {})",
            updated.batch_number, plan.delta, updated.unit, updated.quantity, updated.unit
        ))
        .with_affected(
            AffectedEntity::new("material_batch", updated.id, "UPDATED")
                .named(&updated.batch_number)
                .with_change(FieldChange::new("quantity", plan.batch.quantity, updated.quantity)),
        ))
    }
}

#[async_trait::async_trait]
impl IntentHandler for MaterialHandler {
    fn supported_category(&self) -> IntentCategory {
        IntentCategory::new(MATERIAL_CATEGORY)
    }

    async fn handle(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        match ctx.intent_code() {
            MATERIAL_BATCH_QUERY => self.query(ctx).await,
            MATERIAL_BATCH_ADJUST => self.adjust(ctx).await,
            other => Err(IntentError::UnknownIntentCode(other.to_string())),
        }
    }

    async fn preview(&self, ctx: &ExecutionContext) -> IntentResult<ExecutionResponse> {
        if ctx.intent_code() != MATERIAL_BATCH_ADJUST {
            return self.handle(ctx).await;
        }
        let plan = self.plan_adjustment(ctx).await?;
        let mut data = ContextBag::new();
        data.insert("batch_id".into(), ContextValue::Integer(plan.batch.id));
        data.insert("factory_id".into(), plan.batch.factory_id.as_str().into());
        data.insert("delta".into(), ContextValue::Float(plan.delta));
        data.insert("reason".into(), plan.reason.as_str().into());
        let description = format!(
            "Adjust batch {} ({}) by {} {}: {} -> {} {}. Reason: {}",
            plan.batch.batch_number,
            plan.batch.material_name,
            plan.delta,
            plan.batch.unit,
            plan.batch.quantity,
            plan.batch.quantity + plan.delta,
            plan.batch.unit,
            plan.reason
        );
        Ok(ExecutionResponse::preview(
            description.clone(),
            ConfirmableAction::pending(&description, data),
        ))
    }
}
