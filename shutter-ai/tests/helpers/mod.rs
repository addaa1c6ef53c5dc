//! Test Helper Utilities
//!
//! Shared utilities for testing shutter-ai

#![allow(dead_code)]

pub mod doubles;
pub mod image_server;

pub use doubles::{
    test_orchestrator, CatalogBehavior, FixedImages, PromptKind, Reply, ScriptedCatalog,
    ScriptedModel,
};
pub use image_server::{jpeg_bytes, png_bytes, spawn_image_server, test_fetcher};
