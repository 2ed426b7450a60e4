//! YAML config-file loading for the CLI.
//!
//! The file holds the keys of [`ConfigPatch`]; unknown keys are rejected so
//! typos surface instead of being silently ignored. Secrets may live in the
//! file or in the environment (`ATTACHMENTS_API_KEY`, loaded from `.env` by
//! `main`); the environment layer is applied by the core.
//!
//! ```yaml
//! prefer: local-only
//! service_url: https://api.attachments.dev/v1
//! concurrency: 8
//! max_download_bytes: 10485760
//! ```

use std::fs;
use std::path::Path;

use anyhow::Result;
use attachments_core::ConfigPatch;
use tracing::{error, info};

/// Read and parse `path` into a [`ConfigPatch`].
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ConfigPatch> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    // An empty file is a valid, empty layer.
    if content.trim().is_empty() {
        return Ok(ConfigPatch::default());
    }

    match serde_yaml::from_str::<ConfigPatch>(&content) {
        Ok(patch) => {
            info!(
                config_path = ?path_ref,
                prefer = ?patch.prefer,
                has_api_key = patch.api_key.is_some(),
                "Parsed config YAML successfully"
            );
            Ok(patch)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
