// src/models/conversion.rs

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::error::AppError;

/// Represents the 'conversion_tables' table in the database.
/// A named lookup from (section category, correct count) to a converted score.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConversionTable {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,

    /// At most one table carries this flag at a time.
    pub is_default: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Represents the 'conversion_details' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ConversionDetail {
    pub id: i64,
    pub table_id: i64,
    pub section_category: String,
    pub correct_count: i64,
    pub converted_score: i64,
}

/// DTO for creating a conversion table together with its rows.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewConversionTable {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[validate(nested)]
    pub details: Vec<NewConversionDetail>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewConversionDetail {
    #[validate(length(min = 1, max = 100))]
    pub section_category: String,
    #[validate(range(min = 0))]
    pub correct_count: i64,
    pub converted_score: i64,
}

impl NewConversionDetail {
    pub fn new(section_category: &str, correct_count: i64, converted_score: i64) -> Self {
        Self {
            section_category: section_category.to_string(),
            correct_count,
            converted_score,
        }
    }
}

impl NewConversionTable {
    /// Field validation plus the lookup-table invariant: every
    /// (category, correct count) pair appears once, categories compared case-insensitively.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;

        let mut seen = HashSet::new();
        for detail in &self.details {
            let key = (detail.section_category.trim().to_lowercase(), detail.correct_count);
            if !seen.insert(key) {
                return Err(AppError::Conflict(format!(
                    "duplicate conversion row for category '{}' with {} correct",
                    detail.section_category, detail.correct_count
                )));
            }
        }
        Ok(())
    }
}
