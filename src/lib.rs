// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod cbs;
pub mod config;
pub mod error;
pub mod news_flash;
pub mod telemetry;

pub use crate::error::{IngestError, Result};
