//! Runtime configuration, resolved per call from layered [`ConfigPatch`]es.
//!
//! Priority, highest first: call-site patch, process-wide patch (see
//! [`Attachments::configure`](crate::pipeline::Attachments::configure)),
//! environment variables, built-in defaults.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;

pub const DEFAULT_SERVICE_URL: &str = "https://api.attachments.dev/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 256 * 1024 * 1024;
pub const DEFAULT_USER_AGENT: &str =
    "attachments-unpack/1.0 (+https://github.com/MaximeRivest/att)";
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Fixed timeout for plain HTTP(S) downloads.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

pub const ENV_API_KEY: &str = "ATTACHMENTS_API_KEY";
pub const ENV_PREFER: &str = "ATTACHMENTS_PREFER";
pub const ENV_SERVICE_URL: &str = "ATTACHMENTS_SERVICE_URL";
pub const ENV_TIMEOUT: &str = "ATTACHMENTS_TIMEOUT";
pub const ENV_MAX_DOWNLOAD_BYTES: &str = "ATT_MAX_DOWNLOAD_BYTES";
pub const ENV_USER_AGENT: &str = "ATT_USER_AGENT";
pub const ENV_CONCURRENCY: &str = "ATTACHMENTS_CONCURRENCY";

/// Local-versus-remote processing policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreferMode {
    #[default]
    Local,
    Service,
    LocalOnly,
    ServiceOnly,
}

impl PreferMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PreferMode::Local => "local",
            PreferMode::Service => "service",
            PreferMode::LocalOnly => "local-only",
            PreferMode::ServiceOnly => "service-only",
        }
    }
}

impl fmt::Display for PreferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PreferMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "local" => Ok(PreferMode::Local),
            "service" => Ok(PreferMode::Service),
            "local-only" => Ok(PreferMode::LocalOnly),
            "service-only" => Ok(PreferMode::ServiceOnly),
            _ => Err(ConfigError::InvalidPrefer(s.to_string())),
        }
    }
}

/// A partial configuration layer. Unset fields defer to the next layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigPatch {
    pub api_key: Option<String>,
    pub prefer: Option<PreferMode>,
    pub service_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_download_bytes: Option<u64>,
    pub user_agent: Option<String>,
    pub concurrency: Option<usize>,
}

impl ConfigPatch {
    /// Fields set in `self` win over `lower`.
    pub fn or(self, lower: ConfigPatch) -> ConfigPatch {
        ConfigPatch {
            api_key: self.api_key.or(lower.api_key),
            prefer: self.prefer.or(lower.prefer),
            service_url: self.service_url.or(lower.service_url),
            timeout_secs: self.timeout_secs.or(lower.timeout_secs),
            max_download_bytes: self.max_download_bytes.or(lower.max_download_bytes),
            user_agent: self.user_agent.or(lower.user_agent),
            concurrency: self.concurrency.or(lower.concurrency),
        }
    }

    /// Read the environment layer. Invalid values are logged and ignored.
    pub fn from_env() -> ConfigPatch {
        ConfigPatch {
            api_key: env_string(ENV_API_KEY),
            prefer: env_parsed(ENV_PREFER),
            service_url: env_string(ENV_SERVICE_URL),
            timeout_secs: env_parsed(ENV_TIMEOUT),
            max_download_bytes: env_parsed(ENV_MAX_DOWNLOAD_BYTES),
            user_agent: env_string(ENV_USER_AGENT),
            concurrency: env_parsed(ENV_CONCURRENCY),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T>(key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw = env_string(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(env = key, value = %raw, error = %e, "Ignoring invalid environment value");
            None
        }
    }
}

/// Fully resolved configuration for one call.
#[derive(Clone, PartialEq, Serialize)]
pub struct Config {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub prefer: PreferMode,
    pub service_url: String,
    pub timeout_secs: u64,
    pub max_download_bytes: u64,
    pub user_agent: String,
    pub concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config::from_patch(ConfigPatch::default())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("prefer", &self.prefer)
            .field("service_url", &self.service_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_download_bytes", &self.max_download_bytes)
            .field("user_agent", &self.user_agent)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Config {
    /// Fill every unset field of `patch` with its default.
    pub fn from_patch(patch: ConfigPatch) -> Config {
        Config {
            api_key: patch.api_key.filter(|k| !k.is_empty()),
            prefer: patch.prefer.unwrap_or_default(),
            service_url: patch
                .service_url
                .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout_secs: patch.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            max_download_bytes: patch
                .max_download_bytes
                .unwrap_or(DEFAULT_MAX_DOWNLOAD_BYTES),
            user_agent: patch
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            concurrency: patch.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1),
        }
    }

    /// Resolve `call` over `process_wide` over the environment.
    pub fn resolve(call: &ConfigPatch, process_wide: &ConfigPatch) -> Config {
        let merged = call
            .clone()
            .or(process_wide.clone())
            .or(ConfigPatch::from_env());
        Config::from_patch(merged)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            prefer = %self.prefer,
            service_url = %self.service_url,
            has_api_key = self.has_api_key(),
            concurrency = self.concurrency,
            "Resolved Config"
        );
        debug!(?self, "Config resolved (full debug)");
    }
}
