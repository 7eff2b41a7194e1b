// src/config.rs

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::error::AppError;

/// Worker slots used when `SCORING_CONCURRENCY` is not set.
pub const DEFAULT_SCORING_CONCURRENCY: usize = 2;

/// Keyword fallback used when `SCORING_LEGACY_KEYWORDS` is not set.
pub const DEFAULT_LEGACY_KEYWORDS: [&str; 3] = ["listening", "structure", "reading"];

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub db_max_connections: u32,

    /// Number of scoring jobs allowed in flight at once.
    pub scoring_concurrency: usize,

    /// Optional upper bound for a single scoring job.
    pub scoring_job_timeout: Option<Duration>,

    /// Section label (lowercase) -> conversion-table category key.
    pub category_map: HashMap<String, String>,

    /// Ordered keyword fallback for section labels.
    pub legacy_keywords: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::ConfigurationError("DATABASE_URL must be set".to_string()))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let db_max_connections = parse_var("DB_MAX_CONNECTIONS")?.unwrap_or(5);

        let scoring_concurrency =
            parse_var("SCORING_CONCURRENCY")?.unwrap_or(DEFAULT_SCORING_CONCURRENCY);
        if scoring_concurrency == 0 {
            return Err(AppError::ConfigurationError(
                "SCORING_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        let scoring_job_timeout = parse_var::<u64>("SCORING_JOB_TIMEOUT_SECS")?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let category_map = match env::var("SCORING_CATEGORY_MAP") {
            Ok(raw) => parse_category_map(&raw)?,
            Err(_) => HashMap::new(),
        };

        let legacy_keywords = match env::var("SCORING_LEGACY_KEYWORDS") {
            Ok(raw) => parse_keywords(&raw),
            Err(_) => DEFAULT_LEGACY_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        Ok(Self {
            database_url,
            rust_log,
            db_max_connections,
            scoring_concurrency,
            scoring_job_timeout,
            category_map,
            legacy_keywords,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::ConfigurationError(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

/// Parses `Label One=key;Label Two=key2`. Labels are matched case-insensitively.
pub fn parse_category_map(raw: &str) -> Result<HashMap<String, String>, AppError> {
    let mut map = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (label, key) = entry.split_once('=').ok_or_else(|| {
            AppError::ConfigurationError(format!("category map entry '{}' is missing '='", entry))
        })?;
        let (label, key) = (label.trim(), key.trim());
        if label.is_empty() || key.is_empty() {
            return Err(AppError::ConfigurationError(format!(
                "category map entry '{}' has an empty side",
                entry
            )));
        }
        map.insert(label.to_lowercase(), key.to_lowercase());
    }
    Ok(map)
}

/// Comma separated, order preserved. An empty string disables the fallback.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}
