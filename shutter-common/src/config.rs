//! Configuration loading and resolution
//!
//! Configuration file location priority:
//! 1. Command-line argument (highest priority)
//! 2. `SHUTTER_CONFIG` environment variable
//! 3. OS-dependent default (`<config_dir>/shutter/shutter-ai.toml`)
//!
//! A missing file is not an error: every table has working defaults, so a
//! fresh install only needs `SHUTTER_MODEL_API_KEY` in the environment.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "SHUTTER_CONFIG";

/// Environment variable holding the model API key
pub const MODEL_API_KEY_ENV_VAR: &str = "SHUTTER_MODEL_API_KEY";

/// Default public proxy used when a direct image fetch fails at the transport level
pub const DEFAULT_CORS_PROXY: &str = "https://corsproxy.io/";

/// Hard ceiling on decoded image size (4 MiB)
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Top-level TOML configuration for shutter-ai
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub model: ModelConfig,
    pub image: ImageConfig,
    pub catalog: CatalogConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// `[model]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// API key for the generative model (ENV takes priority, see [`resolve_model_api_key`])
    pub api_key: Option<String>,
    /// Model identifier, e.g. "gemini-1.5-flash"
    pub model: String,
    /// Base URL of the generative language API
    pub endpoint: String,
    /// Total request timeout (seconds)
    pub timeout_secs: u64,
    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Check model availability once before the first analysis
    pub check_on_start: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 45,
            connect_timeout_secs: 5,
            check_on_start: true,
        }
    }
}

/// `[image]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Proxy base URL; the target URL is appended as the `url` query parameter
    pub cors_proxy: Option<String>,
    /// Maximum decoded image size in bytes
    pub max_bytes: usize,
    /// Total fetch timeout (seconds)
    pub timeout_secs: u64,
    /// Connection timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            cors_proxy: Some(DEFAULT_CORS_PROXY.to_string()),
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
            timeout_secs: 20,
            connect_timeout_secs: 5,
        }
    }
}

/// Rate limiter flavour for catalog searches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimiterKind {
    /// Fixed minimum spacing between calls
    #[default]
    Fixed,
    /// Token bucket (one permit per interval)
    TokenBucket,
}

/// `[catalog]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Minimum spacing between catalog searches (milliseconds)
    pub min_interval_ms: u64,
    pub limiter: LimiterKind,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 1000,
            limiter: LimiterKind::Fixed,
        }
    }
}

/// `[pipeline]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on a single stage, fallback included
    pub stage_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: 60,
        }
    }
}

/// `[logging]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when RUST_LOG is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "shutter_ai=info,shutter_common=info".to_string(),
        }
    }
}

/// Resolve the configuration file path
///
/// Returns `None` only when no CLI path, no env var, and no platform config
/// directory are available.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir().map(|d| d.join("shutter").join("shutter-ai.toml"))
}

/// Load TOML configuration from `path`
///
/// A missing file yields defaults; an unreadable or malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        info!("Config file not found, using defaults: {}", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Configuration loaded from {}", path.display());
    Ok(config)
}

/// Resolve the model API key from ENV and TOML
///
/// **Priority:** ENV → TOML
pub fn resolve_model_api_key(toml_config: &TomlConfig) -> Result<String> {
    let env_key = std::env::var(MODEL_API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .model
        .api_key
        .as_ref()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "Model API key found in both environment and TOML. Using environment (highest priority)."
        );
    }

    if let Some(key) = env_key {
        info!("Model API key loaded from environment variable");
        return Ok(key);
    }

    if let Some(key) = toml_key {
        info!("Model API key loaded from TOML config");
        return Ok(key.clone());
    }

    Err(Error::Config(format!(
        "Model API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: [model] api_key = \"your-key\"",
        MODEL_API_KEY_ENV_VAR
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
