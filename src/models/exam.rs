// src/models/exam.rs
//
// Read-only view of exam content owned by the exam editing component.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// How an exam instance turns correct answers into a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "scoring_type", rename_all = "lowercase")]
pub enum ScoringType {
    /// score = initial score + correct count
    Raw,
    /// score = round(mean converted section score * 10)
    Scale,
}

/// Stored as JSONB in `exam_instances.scoring_config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default, alias = "initialScore")]
    pub initial_score: Option<InitialScore>,
}

/// Authoring tools write the initial score either as a number or as a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialScore {
    Number(f64),
    Text(String),
}

impl InitialScore {
    /// Coerces to an integer. Fractional, non-numeric or out-of-range values are
    /// configuration errors.
    pub fn value(&self) -> Result<i64, AppError> {
        let number = match self {
            InitialScore::Number(n) => *n,
            InitialScore::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(0);
                }
                // Integer strings keep full i64 precision
                if let Ok(exact) = trimmed.parse::<i64>() {
                    return Ok(exact);
                }
                trimmed.parse::<f64>().map_err(|_| {
                    AppError::ConfigurationError(format!("initial score '{}' is not a number", s))
                })?
            }
        };

        if !number.is_finite() || number.fract() != 0.0 {
            return Err(AppError::ConfigurationError(format!(
                "initial score {} is not an integer",
                number
            )));
        }
        // i64::MAX as f64 rounds up to 2^63, which is already out of range
        if number < i64::MIN as f64 || number >= i64::MAX as f64 {
            return Err(AppError::ConfigurationError(format!(
                "initial score {} is out of range",
                number
            )));
        }
        Ok(number as i64)
    }
}

impl ScoringConfig {
    /// Decodes the raw JSONB column. NULL means no configuration; a document that
    /// does not fit the shape is a configuration error, not a storage error.
    pub fn from_column(value: Option<serde_json::Value>) -> Result<Self, AppError> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(document) => Ok(serde_json::from_value(document)?),
        }
    }

    /// Initial score for RAW scoring, 0 when absent.
    pub fn initial_score(&self) -> Result<i64, AppError> {
        self.initial_score.as_ref().map_or(Ok(0), InitialScore::value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringPolicy {
    #[serde(rename = "type")]
    pub scoring_type: ScoringType,
    #[serde(default)]
    pub config: ScoringConfig,
}

impl ScoringPolicy {
    pub fn raw(initial_score: Option<InitialScore>) -> Self {
        Self {
            scoring_type: ScoringType::Raw,
            config: ScoringConfig { initial_score },
        }
    }

    pub fn scale() -> Self {
        Self {
            scoring_type: ScoringType::Scale,
            config: ScoringConfig::default(),
        }
    }
}

/// A section of an exam instance.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Section {
    pub id: i64,

    /// Free text label, e.g. "Listening Comprehension".
    pub category: String,

    /// Section specific conversion table; the default table applies when unset.
    pub conversion_table_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamInstance {
    pub id: i64,
    pub policy: ScoringPolicy,
    pub sections: Vec<Section>,
}

impl ExamInstance {
    pub fn section(&self, section_id: i64) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == section_id)
    }
}

/// One answered question, joined to the correctness flag of the chosen option.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmittedAnswer {
    pub question_id: i64,
    pub section_id: i64,
    pub is_correct: bool,
}
