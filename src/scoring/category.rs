// src/scoring/category.rs

use std::collections::HashMap;

use crate::config::{Config, DEFAULT_LEGACY_KEYWORDS};

use super::conversion::ConversionLookup;

/// Maps a free-text section label onto a category key of a conversion table.
///
/// Resolution order:
/// 1. the label itself, compared case-insensitively;
/// 2. the explicit per-deployment map (`SCORING_CATEGORY_MAP`);
/// 3. the ordered legacy keywords: the first keyword contained in the label
///    that the table also carries.
#[derive(Debug, Clone)]
pub struct CategoryResolver {
    mapping: HashMap<String, String>,
    legacy_keywords: Vec<String>,
}

impl Default for CategoryResolver {
    fn default() -> Self {
        Self::new(
            HashMap::new(),
            DEFAULT_LEGACY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        )
    }
}

impl CategoryResolver {
    pub fn new(mapping: HashMap<String, String>, legacy_keywords: Vec<String>) -> Self {
        let mapping = mapping
            .into_iter()
            .map(|(label, key)| (label.trim().to_lowercase(), key.trim().to_lowercase()))
            .collect();
        let legacy_keywords = legacy_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            mapping,
            legacy_keywords,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.category_map.clone(), config.legacy_keywords.clone())
    }

    pub fn resolve(&self, label: &str, table: &ConversionLookup) -> Option<String> {
        let label = label.trim().to_lowercase();

        if table.has_category(&label) {
            return Some(label);
        }

        if let Some(key) = self.mapping.get(&label) {
            // An explicit entry wins even when the table lacks the key.
            return table.has_category(key).then(|| key.clone());
        }

        self.legacy_keywords
            .iter()
            .find(|keyword| label.contains(keyword.as_str()) && table.has_category(keyword))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::conversion::ConversionDetail;

    fn lookup(categories: &[&str]) -> ConversionLookup {
        let details: Vec<ConversionDetail> = categories
            .iter()
            .map(|c| ConversionDetail {
                id: 0,
                table_id: 1,
                section_category: c.to_string(),
                correct_count: 1,
                converted_score: 10,
            })
            .collect();
        ConversionLookup::new(&details)
    }

    #[test]
    fn test_exact_label_match() {
        let resolver = CategoryResolver::default();
        let table = lookup(&["Listening Comprehension", "listening"]);
        assert_eq!(
            resolver.resolve("listening comprehension", &table),
            Some("listening comprehension".to_string())
        );
    }

    #[test]
    fn test_explicit_mapping() {
        let mut mapping = HashMap::new();
        mapping.insert("Written Expression".to_string(), "structure".to_string());
        let resolver = CategoryResolver::new(mapping, vec![]);
        let table = lookup(&["structure"]);
        assert_eq!(
            resolver.resolve("WRITTEN EXPRESSION", &table),
            Some("structure".to_string())
        );
    }

    #[test]
    fn test_explicit_mapping_to_missing_key_does_not_fall_back() {
        let mut mapping = HashMap::new();
        mapping.insert("reading comprehension".to_string(), "vocab".to_string());
        let resolver = CategoryResolver::new(mapping, vec!["reading".to_string()]);
        let table = lookup(&["reading"]);
        assert_eq!(resolver.resolve("Reading Comprehension", &table), None);
    }

    #[test]
    fn test_legacy_keyword_fallback() {
        let resolver = CategoryResolver::default();
        let table = lookup(&["listening", "structure", "reading"]);
        assert_eq!(
            resolver.resolve("Listening Comprehension", &table),
            Some("listening".to_string())
        );
        assert_eq!(
            resolver.resolve("Structure & Written Expression", &table),
            Some("structure".to_string())
        );
    }

    #[test]
    fn test_keyword_order_is_deterministic() {
        let resolver =
            CategoryResolver::new(HashMap::new(), vec!["reading".into(), "listening".into()]);
        let table = lookup(&["listening", "reading"]);
        assert_eq!(
            resolver.resolve("Listening and Reading", &table),
            Some("reading".to_string())
        );
    }

    #[test]
    fn test_no_match() {
        let resolver = CategoryResolver::new(HashMap::new(), vec![]);
        let table = lookup(&["listening"]);
        assert_eq!(resolver.resolve("Listening Comprehension", &table), None);
    }
}
