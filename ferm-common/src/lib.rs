//! # Fermentation Lab Notebook Common Library
//!
//! Shared code for the notebook engine and its tools:
//! - Error taxonomy
//! - Configuration loading and root folder resolution
//! - Database initialization and schema migrations
//! - Timestamp and identifier helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;
pub mod uuid_utils;

pub use config::Thresholds;
pub use error::{Error, Result};
