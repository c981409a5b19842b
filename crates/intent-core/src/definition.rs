//! Intent definitions: scoped, data-only records describing an executable intent.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

static INTENT_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*$").expect("static intent code pattern"));

/// Coarse handler-selection tag. Stored upper-cased so `"alert"` and `"ALERT"` select
/// the same handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct IntentCategory(String);

impl IntentCategory {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for IntentCategory {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for IntentCategory {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<IntentCategory> for String {
    fn from(c: IntentCategory) -> Self {
        c.0
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Visibility boundary of a definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tenant_id", rename_all = "snake_case")]
pub enum IntentScope {
    Platform,
    Factory(String),
}

impl IntentScope {
    pub fn tenant_id(&self) -> Option<&str> {
        match self {
            IntentScope::Platform => None,
            IntentScope::Factory(t) => Some(t),
        }
    }

    /// Storage key prefix for this scope. Also the uniqueness boundary for intent codes.
    /// The tenant segment is escaped so it never contains `/`.
    pub fn key_prefix(&self) -> String {
        match self {
            IntentScope::Platform => "platform/".to_string(),
            IntentScope::Factory(t) => format!("factory/{}/", escape_key_segment(t)),
        }
    }

    /// Parses `"platform"` / `"factory"` (case-insensitive). Factory needs a tenant.
    pub fn parse(kind: &str, tenant_id: Option<&str>) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "platform" => Some(IntentScope::Platform),
            "factory" | "tenant" => tenant_id
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| IntentScope::Factory(t.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for IntentScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentScope::Platform => f.write_str("platform"),
            IntentScope::Factory(t) => write!(f, "factory:{}", t),
        }
    }
}

fn escape_key_segment(raw: &str) -> String {
    raw.replace('%', "%25").replace('/', "%2F")
}

/// Full storage key of a definition: effective scope + intent code.
pub fn definition_key(code: &str, scope: &IntentScope) -> String {
    format!("{}{}", scope.key_prefix(), code)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

/// A scoped intent record. Pure data interpreted by the handler registered for
/// `category`; creating one never loads code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDefinition {
    pub intent_code: String,
    pub name: String,
    pub category: IntentCategory,
    pub scope: IntentScope,
    #[serde(default)]
    pub sensitivity: SensitivityLevel,
    #[serde(default)]
    pub quota_cost: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub required_roles: BTreeSet<String>,
    #[serde(default)]
    pub requires_approval: bool,
    pub active: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntentDefinition {
    pub fn key(&self) -> String {
        definition_key(&self.intent_code, &self.scope)
    }

    pub fn has_keyword(&self, keyword: &str) -> bool {
        let needle = keyword.trim();
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(needle))
    }

    /// Adds a keyword unless an equal one (case-insensitive) is present. Returns whether it changed.
    pub fn add_keyword(&mut self, keyword: &str) -> bool {
        let keyword = keyword.trim();
        if keyword.is_empty() || self.has_keyword(keyword) {
            return false;
        }
        self.keywords.push(keyword.to_string());
        true
    }

    /// Removes a keyword (case-insensitive). Absent keywords are a no-op.
    pub fn remove_keyword(&mut self, keyword: &str) -> bool {
        let needle = keyword.trim();
        let before = self.keywords.len();
        self.keywords.retain(|k| !k.eq_ignore_ascii_case(needle));
        before != self.keywords.len()
    }
}

/// Creation payload for a definition (seed files, meta-extension requests).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntentDraft {
    pub intent_code: String,
    #[serde(default)]
    pub name: Option<String>,
    pub category: String,
    /// Explicit target scope. When absent the meta layer derives it from the actor.
    #[serde(default)]
    pub scope: Option<IntentScope>,
    #[serde(default)]
    pub sensitivity: SensitivityLevel,
    #[serde(default)]
    pub quota_cost: u32,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub required_roles: Vec<String>,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl IntentDraft {
    pub fn new(intent_code: &str, category: &str) -> Self {
        Self {
            intent_code: intent_code.to_string(),
            category: category.to_string(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: IntentScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords = keywords.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_quota_cost(mut self, cost: u32) -> Self {
        self.quota_cost = cost;
        self
    }

    pub fn with_sensitivity(mut self, sensitivity: SensitivityLevel) -> Self {
        self.sensitivity = sensitivity;
        self
    }

    pub fn with_required_roles(mut self, roles: &[&str]) -> Self {
        self.required_roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Normalized intent code (trimmed, upper-cased).
    pub fn normalized_code(&self) -> String {
        normalize_intent_code(&self.intent_code)
    }

    /// Builds an active definition in `scope`. Validation happens in the meta layer.
    pub fn into_definition(self, scope: IntentScope, now: DateTime<Utc>) -> IntentDefinition {
        let intent_code = self.normalized_code();
        let mut definition = IntentDefinition {
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| intent_code.clone()),
            intent_code,
            category: IntentCategory::new(&self.category),
            scope,
            sensitivity: self.sensitivity,
            quota_cost: self.quota_cost,
            priority: self.priority,
            required_roles: self
                .required_roles
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            requires_approval: self.requires_approval,
            active: true,
            keywords: Vec::new(),
            description: self.description,
            created_at: now,
            updated_at: now,
        };
        for keyword in &self.keywords {
            definition.add_keyword(keyword);
        }
        definition
    }
}

pub fn normalize_intent_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub fn is_valid_intent_code(code: &str) -> bool {
    INTENT_CODE_PATTERN.is_match(code)
}

/// Partial update applied by the meta-extension layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionPatch {
    #[serde(default)]
    pub add_keywords: Vec<String>,
    #[serde(default)]
    pub remove_keywords: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub active: Option<bool>,
}

impl DefinitionPatch {
    pub fn is_empty(&self) -> bool {
        self.add_keywords.is_empty()
            && self.remove_keywords.is_empty()
            && self.description.is_none()
            && self.priority.is_none()
            && self.active.is_none()
    }

    /// Applies the patch in place. Deterministic, so it can be re-run on a fresh copy
    /// when a compare-and-swap retry is needed.
    pub fn apply(&self, definition: &mut IntentDefinition, now: DateTime<Utc>) {
        for keyword in &self.add_keywords {
            definition.add_keyword(keyword);
        }
        for keyword in &self.remove_keywords {
            definition.remove_keyword(keyword);
        }
        if let Some(description) = &self.description {
            definition.description = description.clone();
        }
        if let Some(priority) = self.priority {
            definition.priority = priority;
        }
        if let Some(active) = self.active {
            definition.active = active;
        }
        definition.updated_at = now;
    }
}
