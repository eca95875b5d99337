//! Client configuration resolution.
//!
//! Every client resolves its credential and base URL through the same
//! three-step precedence: explicit parameter, then environment variable,
//! then the on-disk config file. Keeping this in one place avoids the
//! divergent-precedence bugs that creep in when each client re-implements
//! the lookup.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Result, SandboxError};

/// Default API endpoint when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "https://api.sandkit.dev";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "SANDKIT_API_KEY";
/// Environment variable overriding the base URL.
pub const BASE_URL_ENV: &str = "SANDKIT_BASE_URL";
/// Environment variable overriding the team scope.
pub const TEAM_ID_ENV: &str = "SANDKIT_TEAM_ID";

/// On-disk config file layout (`~/.sandkit/config.json`).
///
/// Written by external tooling (the CLI's login flow); this crate only reads
/// it.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
}

/// Resolved client configuration.
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer credential sent with every request.
    pub api_key: SecretString,
    /// Service root, without the `/api/v1` prefix.
    pub base_url: String,
    /// Optional team scope attached to create/list calls.
    pub team_id: Option<String>,
    /// Per-request deadline override; the transport default applies when
    /// unset. Command execution always derives its own deadline.
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("team_id", &self.team_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Resolve configuration from explicit parameters, the environment, and
    /// the config file, in that order.
    ///
    /// Fails with [`SandboxError::Auth`] if no API key resolves anywhere.
    pub fn resolve(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let file = Self::load_file().unwrap_or_default();

        let api_key = api_key
            .or_else(|| non_empty_env(API_KEY_ENV))
            .or_else(|| file.api_key.clone().filter(|k| !k.is_empty()))
            .ok_or_else(|| SandboxError::Auth {
                reason: format!(
                    "set {} or add api_key to {}",
                    API_KEY_ENV,
                    Self::config_file_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "~/.sandkit/config.json".to_string())
                ),
            })?;

        let base_url = base_url
            .or_else(|| non_empty_env(BASE_URL_ENV))
            .or_else(|| file.base_url.clone().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = normalize_base_url(&base_url)?;

        let team_id = non_empty_env(TEAM_ID_ENV).or_else(|| file.team_id.filter(|t| !t.is_empty()));

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url,
            team_id,
            request_timeout: None,
        })
    }

    /// Build a config directly, skipping env/file lookup. Intended for tests
    /// and for callers that manage credentials themselves.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            api_key: SecretString::from(api_key.into()),
            base_url: normalize_base_url(&base_url.into())?,
            team_id: None,
            request_timeout: None,
        })
    }

    /// Attach a team scope.
    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Override the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Path of the on-disk config file, if a home directory exists.
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".sandkit").join("config.json"))
    }

    fn load_file() -> Option<FileConfig> {
        let path = Self::config_file_path()?;
        let contents = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
                None
            }
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Normalize a base URL: require an http(s) scheme and a host, strip any
/// trailing slash and a trailing `/api/v1` (requests always re-add the
/// version prefix).
fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw).map_err(|e| SandboxError::Validation {
        field: "base_url",
        reason: format!("'{raw}' is not a valid URL: {e}"),
    })?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(SandboxError::Validation {
            field: "base_url",
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none() {
        return Err(SandboxError::Validation {
            field: "base_url",
            reason: "URL has no host".to_string(),
        });
    }

    let mut trimmed = raw.trim_end_matches('/').to_string();
    if trimmed.ends_with("/api/v1") {
        trimmed.truncate(trimmed.len() - "/api/v1".len());
    }
    Ok(trimmed)
}
