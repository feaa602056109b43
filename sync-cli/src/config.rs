//! Configuration loading for codesync.

use anyhow::{Context, Result};
use codesync_client::ClientConfig;
use std::path::Path;

/// Load the client configuration.
///
/// An explicit path must exist. Without one, `default_path` is read when it
/// exists and built-in defaults are used otherwise.
pub fn load(explicit: Option<&Path>, default_path: &str) -> Result<ClientConfig> {
    let path = match explicit {
        Some(path) => path,
        None => {
            let path = Path::new(default_path);
            if !path.exists() {
                tracing::debug!("No {} found, using defaults", default_path);
                return Ok(ClientConfig::default());
            }
            path
        }
    };

    let config = ClientConfig::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::debug!("Loaded configuration from {}", path.display());
    Ok(config)
}
