//! intent-core: intent execution framework.
//!
//! Category dispatch to pluggable handlers, a two-phase preview/confirm workflow,
//! lenient semantic field access and a scope-aware definition registry that can be
//! extended while the process runs. Domain behavior lives in handler crates.

mod bootstrap;
mod clock;
mod config;
mod dispatcher;
mod error;
mod executor;
mod handler;
mod request;
mod response;
mod sanitize;

pub mod confirmation;
pub mod definition;
pub mod fanout;
pub mod meta;
pub mod semantics;
pub mod store;
pub mod value;

pub use bootstrap::{bootstrap, bootstrap_with_clock, seed_definitions, SeedReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use self::config::{load_seed_file, IntentConfig, SeedFile, StorageBackend};
pub use confirmation::{
    ConfirmationStore, ConfirmationWorkflow, InMemoryConfirmationStore, PendingConfirmation,
    SledConfirmationStore,
};
pub use definition::{
    DefinitionPatch, IntentCategory, IntentDefinition, IntentDraft, IntentScope, SensitivityLevel,
};
pub use dispatcher::{Dispatcher, HandlerRegistry};
pub use error::{BootstrapError, IntentError, IntentResult, RegistryError};
pub use executor::{IntentExecutor, QuotaRecorder};
pub use fanout::{fan_out, FanoutFailure, FanoutReport};
pub use handler::{DispatchMode, ExecutionContext, IntentHandler};
pub use meta::{AccessPolicy, DefinitionUpdate, MetaExtension, MetaIntentHandler};
pub use request::{Actor, ExecutionRequest};
pub use response::{
    AffectedEntity, ConfirmableAction, ExecutionResponse, ExecutionStatus, FieldChange,
    SuggestedAction, DEFAULT_CONFIRM_TTL_SECS,
};
pub use sanitize::sanitize_message;
pub use semantics::{Semantics, SemanticsParser};
pub use store::{DefinitionStore, InMemoryDefinitionStore, KeywordMatch, SledDefinitionStore};
pub use value::{ContextBag, ContextValue};
