//! HTTP API handlers for shutter-ai

pub mod analyze;
pub mod health;

pub use analyze::analysis_routes;
pub use health::health_routes;
