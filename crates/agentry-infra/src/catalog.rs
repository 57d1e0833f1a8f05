//! Agent catalog loader.
//!
//! Reads `agents.toml`, deserializes, and validates eagerly. Unlike the
//! orchestrator config there is no fallback: a missing or invalid catalog
//! is fatal, and the process is expected to exit.

use std::path::Path;

use agentry_types::agent::AgentCatalog;
use agentry_types::error::CatalogError;

/// Load and validate the agent catalog from a TOML file.
pub async fn load_catalog(path: &Path) -> Result<AgentCatalog, CatalogError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CatalogError::Io(format!("{}: {e}", path.display())))?;

    let catalog: AgentCatalog =
        toml::from_str(&content).map_err(|e| CatalogError::Parse(e.to_string()))?;
    catalog.validate()?;

    tracing::info!(
        path = %path.display(),
        agents = catalog.len(),
        departments = catalog.departments().len(),
        "agent catalog loaded"
    );
    Ok(catalog)
}
