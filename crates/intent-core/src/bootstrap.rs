//! Startup wiring: storage backend, meta handler, seed definitions, executor.

use crate::clock::{Clock, SystemClock};
use crate::config::{load_seed_file, IntentConfig, StorageBackend};
use crate::confirmation::{
    ConfirmationStore, ConfirmationWorkflow, InMemoryConfirmationStore, SledConfirmationStore,
};
use crate::definition::{is_valid_intent_code, IntentDraft, IntentScope};
use crate::dispatcher::{Dispatcher, HandlerRegistry};
use crate::error::{BootstrapError, IntentError};
use crate::executor::IntentExecutor;
use crate::meta::{builtin_definitions, AccessPolicy, MetaExtension, MetaIntentHandler};
use crate::store::{DefinitionStore, InMemoryDefinitionStore, SledDefinitionStore};
use std::sync::Arc;

/// Counts from seeding. Definitions already active in their scope are skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Inserts `drafts`; a draft without a scope goes to Platform. Invalid codes abort
/// startup, existing active definitions are left untouched.
pub fn seed_definitions(
    store: &dyn DefinitionStore,
    drafts: Vec<IntentDraft>,
    clock: &dyn Clock,
) -> Result<SeedReport, BootstrapError> {
    let mut report = SeedReport::default();
    for draft in drafts {
        let code = draft.normalized_code();
        if !is_valid_intent_code(&code) {
            return Err(IntentError::invalid(
                "intent_code",
                format!("seed definition has invalid intent code {:?}", draft.intent_code),
            )
            .into());
        }
        let scope = draft.scope.clone().unwrap_or(IntentScope::Platform);
        match store.insert_new(draft.into_definition(scope, clock.now())) {
            Ok(_) => report.inserted += 1,
            Err(IntentError::Conflict(_)) => {
                tracing::debug!(target: "intent::bootstrap", intent_code = %code, "already defined; skipping");
                report.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(report)
}

pub fn bootstrap(
    config: &IntentConfig,
    registry: HandlerRegistry,
    extra_drafts: Vec<IntentDraft>,
) -> Result<IntentExecutor, BootstrapError> {
    bootstrap_with_clock(config, registry, extra_drafts, Arc::new(SystemClock))
}

pub fn bootstrap_with_clock(
    config: &IntentConfig,
    mut registry: HandlerRegistry,
    extra_drafts: Vec<IntentDraft>,
    clock: Arc<dyn Clock>,
) -> Result<IntentExecutor, BootstrapError> {
    let (definitions, confirmations): (Arc<dyn DefinitionStore>, Arc<dyn ConfirmationStore>) =
        match config.storage_backend {
            StorageBackend::Memory => (
                Arc::new(InMemoryDefinitionStore::new()) as Arc<dyn DefinitionStore>,
                Arc::new(InMemoryConfirmationStore::new()) as Arc<dyn ConfirmationStore>,
            ),
            StorageBackend::Sled => {
                if let Some(parent) = config.storage_path.parent() {
                    std::fs::create_dir_all(parent).map_err(sled::Error::Io)?;
                }
                let db = sled::open(&config.storage_path)?;
                (
                    Arc::new(SledDefinitionStore::from_db(&db)?) as Arc<dyn DefinitionStore>,
                    Arc::new(SledConfirmationStore::from_db(&db)?) as Arc<dyn ConfirmationStore>,
                )
            }
        };
    tracing::info!(
        target: "intent::bootstrap",
        backend = ?config.storage_backend,
        path = %config.storage_path.display(),
        "intent storage opened"
    );

    let policy = AccessPolicy::new(&config.platform_roles);
    let meta = Arc::new(MetaExtension::new(
        Arc::clone(&definitions),
        policy.clone(),
        Arc::clone(&clock),
    ));
    registry.register(Arc::new(MetaIntentHandler::new(meta)))?;

    let mut drafts = builtin_definitions();
    drafts.extend(extra_drafts);
    if let Some(seed_path) = &config.seed_path {
        let seed = load_seed_file(seed_path)?;
        tracing::info!(
            target: "intent::bootstrap",
            path = %seed_path.display(),
            count = seed.intent.len(),
            "seed file loaded"
        );
        drafts.extend(seed.intent);
    }
    let report = seed_definitions(definitions.as_ref(), drafts, clock.as_ref())?;
    tracing::info!(
        target: "intent::bootstrap",
        inserted = report.inserted,
        skipped = report.skipped,
        categories = ?registry.categories(),
        "intent registry ready"
    );

    let workflow = ConfirmationWorkflow::new(confirmations, clock, config.confirmation_ttl_secs);
    Ok(IntentExecutor::new(
        definitions,
        Dispatcher::new(registry),
        workflow,
        policy,
    ))
}
