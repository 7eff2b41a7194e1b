// src/lib.rs

pub mod config;
pub mod error;
pub mod models;
pub mod queue;
pub mod reconciler;
pub mod scoring;
pub mod service;
pub mod state;
pub mod store;
pub mod utils;

// Re-export specific items for convenience
pub use error::AppError;
pub use state::AppState;
