// src/scoring/conversion.rs

use std::collections::{BTreeMap, HashMap};

use crate::models::conversion::ConversionDetail;

/// Rows of one conversion table indexed by lowercase category, then correct count.
#[derive(Debug, Clone, Default)]
pub struct ConversionLookup {
    rows: HashMap<String, BTreeMap<i64, i64>>,
}

impl ConversionLookup {
    pub fn new(details: &[ConversionDetail]) -> Self {
        let mut rows: HashMap<String, BTreeMap<i64, i64>> = HashMap::new();
        for detail in details {
            rows.entry(detail.section_category.trim().to_lowercase())
                .or_default()
                .insert(detail.correct_count, detail.converted_score);
        }
        Self { rows }
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.rows.contains_key(category)
    }

    /// Converted score for `correct` answers in `category` (lowercase key).
    ///
    /// Above the tabulated range the category's highest score is used, below it
    /// the lowest. Inside the range a missing count falls back to the closest
    /// tabulated count under it. `None` only when the category has no rows.
    pub fn convert(&self, category: &str, correct: i64) -> Option<i64> {
        let rows = self.rows.get(category)?;
        if let Some(score) = rows.get(&correct) {
            return Some(*score);
        }

        let (min_count, _) = rows.first_key_value()?;
        let (max_count, _) = rows.last_key_value()?;

        if correct > *max_count {
            rows.values().copied().max()
        } else if correct < *min_count {
            rows.values().copied().min()
        } else {
            rows.range(..correct).next_back().map(|(_, score)| *score)
        }
    }
}
