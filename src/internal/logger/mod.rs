// src/internal/logger/mod.rs

#[allow(clippy::module_inception)]
pub mod logger;

pub use logger::init_logger;
