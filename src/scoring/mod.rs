// src/scoring/mod.rs
//
// Score computation. The pure helpers below do the arithmetic; `calculator`
// loads the inputs and persists the outcome.

pub mod calculator;
pub mod category;
pub mod conversion;

pub use calculator::ScoreCalculator;
pub use category::CategoryResolver;
pub use conversion::ConversionLookup;

use crate::{error::AppError, models::exam::SubmittedAnswer};

/// Returns (total_questions, correct_count, wrong_count).
pub fn tally(answers: &[SubmittedAnswer]) -> (i64, i64, i64) {
    let total = answers.len() as i64;
    let correct = answers.iter().filter(|a| a.is_correct).count() as i64;
    (total, correct, total - correct)
}

/// RAW policy: the initial score plus one point per correct answer.
/// A sum outside the i64 range is a configuration error.
pub fn raw_score(initial_score: i64, correct_count: i64) -> Result<i64, AppError> {
    initial_score.checked_add(correct_count).ok_or_else(|| {
        AppError::ConfigurationError(format!(
            "initial score {} plus {} correct answers overflows the score",
            initial_score, correct_count
        ))
    })
}

/// SCALE policy: mean of the converted section scores times ten, rounded.
/// No sections means no score.
pub fn scale_score(converted: &[i64]) -> i64 {
    if converted.is_empty() {
        return 0;
    }
    let mean = converted.iter().sum::<i64>() as f64 / converted.len() as f64;
    (mean * 10.0).round() as i64
}
