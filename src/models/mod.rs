// src/models/mod.rs

pub mod conversion;
pub mod exam;
pub mod result_record;
