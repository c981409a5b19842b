//! Lenient, typed field access over NLU output.
//!
//! Lookups consult the structured constraints first and the raw request context
//! second. Coercion is best-effort; a value that cannot be coerced logs a warning
//! and reads as absent so the handler asks for more information instead of failing.

use crate::definition::IntentDefinition;
use crate::error::{IntentError, IntentResult};
use crate::request::ExecutionRequest;
use crate::value::{ContextBag, ContextValue};
use serde::{Deserialize, Serialize};

const TRUE_WORDS: [&str; 5] = ["true", "1", "yes", "y", "on"];
const FALSE_WORDS: [&str; 5] = ["false", "0", "no", "n", "off"];

/// Structured extraction of a request plus its raw fallback context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Semantics {
    /// Named constraint values produced by the extractor.
    #[serde(default)]
    pub constraints: ContextBag,
    /// Primary resolved object id (usually a numeric database id).
    #[serde(default)]
    pub object_id: Option<i64>,
    /// Secondary identifier (usually a human-readable code such as a batch number).
    #[serde(default)]
    pub object_identifier: Option<String>,
    /// Raw context consulted when a field is absent from `constraints`.
    #[serde(default)]
    pub fallback: ContextBag,
}

impl Semantics {
    pub fn new(constraints: ContextBag, fallback: ContextBag) -> Self {
        Self {
            constraints,
            fallback,
            ..Default::default()
        }
    }

    /// Raw-only semantics: no constraints, the request context as fallback and the
    /// entity hint as object id (numeric) or identifier (anything else).
    pub fn from_request(request: &ExecutionRequest) -> Self {
        let mut semantics = Self::new(ContextBag::new(), request.context.clone());
        if let Some(entity_id) = request.entity_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match entity_id.parse::<i64>() {
                Ok(id) => semantics.object_id = Some(id),
                Err(_) => semantics.object_identifier = Some(entity_id.to_string()),
            }
        }
        semantics
    }

    pub fn with_object_id(mut self, id: i64) -> Self {
        self.object_id = Some(id);
        self
    }

    pub fn with_object_identifier(mut self, identifier: &str) -> Self {
        self.object_identifier = Some(identifier.to_string());
        self
    }

    pub fn with_constraint(mut self, field: &str, value: impl Into<ContextValue>) -> Self {
        self.constraints.insert(field.to_string(), value.into());
        self
    }

    pub fn object_id(&self) -> Option<i64> {
        self.object_id
    }

    pub fn object_identifier(&self) -> Option<&str> {
        self.object_identifier.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// First non-null value for `field`: constraints, then fallback context.
    pub fn raw(&self, field: &str) -> Option<&ContextValue> {
        self.constraints
            .get(field)
            .filter(|v| !v.is_null())
            .or_else(|| self.fallback.get(field).filter(|v| !v.is_null()))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.raw(field).map(|v| !v.is_blank()).unwrap_or(false)
    }

    pub fn string(&self, field: &str) -> Option<String> {
        let value = self.raw(field)?;
        let coerced = match value {
            ContextValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                Some(trimmed.to_string())
            }
            ContextValue::Integer(i) => Some(i.to_string()),
            ContextValue::Float(f) => Some(f.to_string()),
            ContextValue::Bool(b) => Some(b.to_string()),
            _ => None,
        };
        warn_on_miss(field, value, "string", coerced)
    }

    pub fn long(&self, field: &str) -> Option<i64> {
        let value = self.raw(field)?;
        let coerced = match value {
            ContextValue::Integer(i) => Some(*i),
            ContextValue::Float(f) => integral(*f),
            ContextValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed
                    .parse::<i64>()
                    .ok()
                    .or_else(|| trimmed.parse::<f64>().ok().and_then(integral))
            }
            _ => None,
        };
        warn_on_miss(field, value, "long", coerced)
    }

    pub fn int(&self, field: &str) -> Option<i32> {
        let wide = self.long(field)?;
        match i32::try_from(wide) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(
                    target: "intent::semantics",
                    field,
                    value = wide,
                    "value out of int range; treating as absent"
                );
                None
            }
        }
    }

    pub fn double(&self, field: &str) -> Option<f64> {
        let value = self.raw(field)?;
        let coerced = match value {
            ContextValue::Integer(i) => Some(*i as f64),
            ContextValue::Float(f) => Some(*f).filter(|f| f.is_finite()),
            ContextValue::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
            _ => None,
        };
        warn_on_miss(field, value, "double", coerced)
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        let value = self.raw(field)?;
        let coerced = match value {
            ContextValue::Bool(b) => Some(*b),
            ContextValue::Integer(1) => Some(true),
            ContextValue::Integer(0) => Some(false),
            ContextValue::String(s) => {
                let lowered = s.trim().to_lowercase();
                if lowered.is_empty() {
                    return None;
                }
                if TRUE_WORDS.contains(&lowered.as_str()) {
                    Some(true)
                } else if FALSE_WORDS.contains(&lowered.as_str()) {
                    Some(false)
                } else {
                    None
                }
            }
            _ => None,
        };
        warn_on_miss(field, value, "boolean", coerced)
    }

    /// String list: a list value (scalars rendered as strings) or a comma-separated string.
    pub fn string_list(&self, field: &str) -> Option<Vec<String>> {
        let value = self.raw(field)?;
        let coerced = match value {
            ContextValue::List(items) => Some(
                items
                    .iter()
                    .filter_map(|item| match item {
                        ContextValue::String(s) => Some(s.trim().to_string()),
                        ContextValue::Integer(i) => Some(i.to_string()),
                        ContextValue::Float(f) => Some(f.to_string()),
                        ContextValue::Bool(b) => Some(b.to_string()),
                        _ => None,
                    })
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            ContextValue::String(s) => Some(
                s.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            _ => None,
        };
        warn_on_miss(field, value, "string list", coerced)
    }

    /// Integer list: list of numbers/numeric strings, or a comma-separated string.
    pub fn long_list(&self, field: &str) -> Option<Vec<i64>> {
        let parts = self.string_list(field)?;
        let parsed: Option<Vec<i64>> = parts
            .iter()
            .map(|p| p.parse::<i64>().ok().or_else(|| p.parse::<f64>().ok().and_then(integral)))
            .collect();
        if parsed.is_none() {
            tracing::warn!(
                target: "intent::semantics",
                field,
                "list contains non-integer entries; treating as absent"
            );
        }
        parsed
    }

    pub fn require_string(&self, field: &str) -> IntentResult<String> {
        self.string(field).ok_or_else(|| IntentError::missing(field))
    }

    pub fn require_long(&self, field: &str) -> IntentResult<i64> {
        self.long(field).ok_or_else(|| IntentError::missing(field))
    }

    pub fn require_double(&self, field: &str) -> IntentResult<f64> {
        self.double(field).ok_or_else(|| IntentError::missing(field))
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn warn_on_miss<T>(field: &str, value: &ContextValue, target_type: &str, coerced: Option<T>) -> Option<T> {
    if coerced.is_none() {
        tracing::warn!(
            target: "intent::semantics",
            field,
            found = value.kind(),
            expected = target_type,
            "field could not be coerced; treating as absent"
        );
    }
    coerced
}

/// External NLU / field-extraction collaborator. Output is best-effort and may be wrong.
#[async_trait::async_trait]
pub trait SemanticsParser: Send + Sync {
    async fn parse(
        &self,
        request: &ExecutionRequest,
        definition: &IntentDefinition,
    ) -> IntentResult<Semantics>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Actor;

    fn semantics() -> Semantics {
        let mut fallback = ContextBag::new();
        fallback.insert("quantity".into(), ContextValue::from("12"));
        fallback.insert("note".into(), ContextValue::from("from raw"));
        fallback.insert("urgent".into(), ContextValue::from("yes"));
        fallback.insert("ratio".into(), ContextValue::from("abc"));
        Semantics::new(ContextBag::new(), fallback)
            .with_constraint("note", "from constraints")
            .with_constraint("batch_id", 42.0)
            .with_constraint("blank", "   ")
            .with_constraint("nested", ContextValue::List(vec![ContextValue::List(vec![])]))
    }

    #[test]
    fn constraints_win_over_fallback() {
        assert_eq!(semantics().string("note").as_deref(), Some("from constraints"));
    }

    #[test]
    fn fallback_only_fields_are_retrievable() {
        let s = semantics();
        assert_eq!(s.long("quantity"), Some(12));
        assert_eq!(s.int("quantity"), Some(12));
        assert_eq!(s.double("quantity"), Some(12.0));
        assert_eq!(s.boolean("urgent"), Some(true));
    }

    #[test]
    fn integral_floats_coerce_to_integers() {
        assert_eq!(semantics().long("batch_id"), Some(42));
        let fractional = Semantics::default().with_constraint("qty", 2.5);
        assert_eq!(fractional.long("qty"), None);
        assert_eq!(fractional.double("qty"), Some(2.5));
    }

    #[test]
    fn unparsable_values_read_as_absent() {
        let s = semantics();
        assert_eq!(s.double("ratio"), None);
        assert_eq!(s.boolean("ratio"), None);
        assert_eq!(s.string("nested"), None);
        assert_eq!(s.string("blank"), None);
        assert_eq!(s.long("missing"), None);
    }

    #[test]
    fn int_range_is_checked() {
        let s = Semantics::default().with_constraint("big", i64::MAX);
        assert_eq!(s.long("big"), Some(i64::MAX));
        assert_eq!(s.int("big"), None);
    }

    #[test]
    fn boolean_words() {
        for (raw, expected) in [("TRUE", true), ("1", true), ("on", true), ("No", false), ("0", false)] {
            let s = Semantics::default().with_constraint("flag", raw);
            assert_eq!(s.boolean("flag"), Some(expected), "{}", raw);
        }
        assert_eq!(Semantics::default().with_constraint("flag", 1i64).boolean("flag"), Some(true));
        assert_eq!(Semantics::default().with_constraint("flag", 7i64).boolean("flag"), None);
    }

    #[test]
    fn lists_accept_csv_and_arrays() {
        let s = Semantics::default()
            .with_constraint("ids", vec![3i64, 4])
            .with_constraint("csv", "5, 6 ,")
            .with_constraint("bad", vec!["x"]);
        assert_eq!(s.long_list("ids"), Some(vec![3, 4]));
        assert_eq!(s.long_list("csv"), Some(vec![5, 6]));
        assert_eq!(s.long_list("bad"), None);
    }

    #[test]
    fn repeated_reads_are_identical() {
        let s = semantics();
        for field in ["quantity", "ratio", "note", "batch_id", "missing"] {
            assert_eq!(s.string(field), s.string(field));
            assert_eq!(s.long(field), s.long(field));
            assert_eq!(s.boolean(field), s.boolean(field));
        }
    }

    #[test]
    fn require_reports_validation_error() {
        let err = semantics().require_long("ratio").unwrap_err();
        assert!(matches!(err, IntentError::Validation { ref field, .. } if field == "ratio"));
    }

    #[test]
    fn entity_hint_becomes_object_id_or_identifier() {
        let actor = Actor::tenant(1, "operator", "F1");
        let numeric = ExecutionRequest::new("", actor.clone()).with_entity("alert", "17");
        assert_eq!(Semantics::from_request(&numeric).object_id(), Some(17));

        let code = ExecutionRequest::new("", actor).with_entity("batch", "MB-2024-001");
        let s = Semantics::from_request(&code);
        assert_eq!(s.object_id(), None);
        assert_eq!(s.object_identifier(), Some("MB-2024-001"));
    }
}
