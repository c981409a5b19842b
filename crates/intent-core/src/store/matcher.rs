//! Keyword fallback for free text when no intent code was recognized upstream.

use crate::definition::IntentDefinition;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct KeywordMatch {
    pub intent_code: String,
    pub priority: i32,
    pub matched_keyword: String,
}

/// Definitions whose keywords occur in `text` (case-insensitive), best first:
/// higher priority, then longer matched keyword, then intent code.
pub fn match_keywords(text: &str, candidates: &[IntentDefinition]) -> Vec<KeywordMatch> {
    let haystack = text.to_lowercase();
    let mut matches: Vec<KeywordMatch> = candidates
        .iter()
        .filter(|d| d.active)
        .filter_map(|definition| {
            definition
                .keywords
                .iter()
                .filter(|k| !k.trim().is_empty() && haystack.contains(&k.trim().to_lowercase()))
                .max_by_key(|k| k.trim().chars().count())
                .map(|keyword| KeywordMatch {
                    intent_code: definition.intent_code.clone(),
                    priority: definition.priority,
                    matched_keyword: keyword.trim().to_string(),
                })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| {
                b.matched_keyword
                    .chars()
                    .count()
                    .cmp(&a.matched_keyword.chars().count())
            })
            .then_with(|| a.intent_code.cmp(&b.intent_code))
    });
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{IntentDraft, IntentScope};

    fn def(code: &str, priority: i32, keywords: &[&str]) -> IntentDefinition {
        IntentDraft::new(code, "MATERIAL")
            .with_priority(priority)
            .with_keywords(keywords)
            .into_definition(IntentScope::Platform, chrono::Utc::now())
    }

    #[test]
    fn higher_priority_wins() {
        let candidates = vec![
            def("MATERIAL_BATCH_QUERY", 10, &["batch"]),
            def("MATERIAL_BATCH_ADJUST", 50, &["adjust batch", "batch"]),
        ];
        let matches = match_keywords("Please ADJUST BATCH MB-1 by 5kg", &candidates);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].intent_code, "MATERIAL_BATCH_ADJUST");
        assert_eq!(matches[0].matched_keyword, "adjust batch");
    }

    #[test]
    fn equal_priority_prefers_longer_keyword() {
        let candidates = vec![def("A_SHORT", 1, &["stock"]), def("B_LONG", 1, &["stock level"])];
        let matches = match_keywords("what is the stock level", &candidates);
        assert_eq!(matches[0].intent_code, "B_LONG");
    }

    #[test]
    fn inactive_and_unmatched_are_skipped() {
        let mut inactive = def("OFF", 99, &["stock"]);
        inactive.active = false;
        let matches = match_keywords("stock", &[inactive, def("OTHER", 1, &["alert"])]);
        assert!(matches.is_empty());
    }
}
