//! Orchestrator configuration loader.
//!
//! Reads `agentry.toml` into [`OrchestratorConfig`]. The two HMAC secrets
//! are mandatory, so there is no default fallback: a missing or malformed
//! config file is an error the binary surfaces at startup.

use std::path::Path;

use thiserror::Error;

use agentry_types::config::OrchestratorConfig;

/// Errors loading the orchestrator config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(String),

    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Load the orchestrator configuration from a TOML file.
pub async fn load_config(path: &Path) -> Result<OrchestratorConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;

    let config: OrchestratorConfig =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    tracing::info!(
        path = %path.display(),
        budgets = config.budgets.len(),
        max_skew_seconds = config.signature.max_skew_seconds,
        "orchestrator config loaded"
    );
    Ok(config)
}
