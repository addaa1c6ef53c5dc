//! # Shutter Common Library
//!
//! Shared code for the Shutter analysis services:
//! - Error type shared by configuration loading and service bootstrap
//! - TOML configuration with environment overrides
//! - Tracing subscriber initialization

pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
