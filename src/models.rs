//! Typed request and response models for the sandbox API.
//!
//! The wire format is JSON. Responses may use either camelCase or snake_case
//! field names depending on the endpoint generation, so descriptor fields
//! accept both via serde aliases. Requests are always sent snake_case.
//! Deserialization is the single boundary where untyped JSON enters the
//! crate; unrecognized status strings fail closed into
//! [`SandboxStatus::Unknown`] instead of erroring or being coerced.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Lifecycle status of a sandbox.
///
/// Transitions only move forward: `Pending`/`Provisioning` → `Running` →
/// `Terminated`, with `Error` reachable from any non-terminal state.
/// `Terminated`, `Error`, and `Timeout` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SandboxStatus {
    /// Accepted by the service, not yet scheduled.
    Pending,
    /// Container is being placed and started.
    Provisioning,
    /// Ready for commands and transfers.
    Running,
    /// Stopped by the user; may be restarted server-side.
    Stopped,
    /// Failed; see the descriptor's error fields.
    Error,
    /// Deleted or shut down for good.
    Terminated,
    /// Exceeded its maximum runtime and was shut down.
    Timeout,
    /// A status string this client version does not recognize.
    #[serde(other)]
    Unknown,
}

impl SandboxStatus {
    /// True for absorbing states: no further transitions happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Terminated | Self::Timeout)
    }

    /// True for states that indicate the sandbox died rather than stopped
    /// cleanly.
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Error | Self::Terminated | Self::Timeout)
    }
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Provisioning => "PROVISIONING",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Error => "ERROR",
            Self::Terminated => "TERMINATED",
            Self::Timeout => "TIMEOUT",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// The client's typed view of a sandbox.
///
/// Owned by the remote service; every read re-fetches. Secrets supplied at
/// creation come back with masked values only.
#[derive(Debug, Clone, Deserialize)]
pub struct Sandbox {
    /// Server-assigned opaque identifier. Never changes once assigned.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(alias = "dockerImage")]
    pub docker_image: String,
    #[serde(default, alias = "startCommand")]
    pub start_command: Option<String>,
    #[serde(alias = "cpuCores")]
    pub cpu_cores: f64,
    #[serde(alias = "memoryGB")]
    pub memory_gb: f64,
    #[serde(default, alias = "diskSizeGB")]
    pub disk_size_gb: f64,
    #[serde(default, alias = "gpuCount")]
    pub gpu_count: u32,
    #[serde(default, alias = "gpuType")]
    pub gpu_type: Option<String>,
    #[serde(default = "default_true", alias = "networkAccess")]
    pub network_access: bool,
    pub status: SandboxStatus,
    #[serde(default, alias = "timeoutMinutes")]
    pub timeout_minutes: u32,
    #[serde(default, alias = "environmentVars")]
    pub environment_vars: Option<HashMap<String, String>>,
    /// Secret names with masked values; plaintext is never echoed back.
    #[serde(default)]
    pub secrets: Option<HashMap<String, String>>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(alias = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, alias = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "terminatedAt")]
    pub terminated_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "exitCode")]
    pub exit_code: Option<i32>,
    /// Failure classification string when status is ERROR (e.g. OOM_KILLED).
    #[serde(default, alias = "errorType")]
    pub error_type: Option<String>,
    #[serde(default, alias = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(default, alias = "teamId")]
    pub team_id: Option<String>,
}

fn default_true() -> bool {
    true
}

/// One page of a sandbox listing.
///
/// The client never auto-follows pagination; request further pages
/// explicitly while `has_next` is true.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxListResponse {
    pub sandboxes: Vec<Sandbox>,
    pub total: u64,
    pub page: u32,
    #[serde(alias = "perPage")]
    pub per_page: u32,
    #[serde(alias = "hasNext")]
    pub has_next: bool,
}

/// Specification for a new sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSandboxRequest {
    pub name: String,
    pub docker_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    pub cpu_cores: f64,
    pub memory_gb: f64,
    pub disk_size_gb: f64,
    pub gpu_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<String>,
    pub network_access: bool,
    pub timeout_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_vars: Option<HashMap<String, String>>,
    /// Write-only: sent at creation, never echoed back in plaintext.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

impl CreateSandboxRequest {
    /// A request with the service defaults, ready to customize.
    pub fn new(name: impl Into<String>, docker_image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docker_image: docker_image.into(),
            start_command: Some("tail -f /dev/null".to_string()),
            cpu_cores: 1.0,
            memory_gb: 2.0,
            disk_size_gb: 5.0,
            gpu_count: 0,
            gpu_type: None,
            network_access: true,
            timeout_minutes: 60,
            environment_vars: None,
            secrets: None,
            labels: Vec::new(),
            team_id: None,
        }
    }

    /// Client-side validation, run before any network call.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SandboxError::Validation {
                field: "name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.docker_image.trim().is_empty() {
            return Err(SandboxError::Validation {
                field: "docker_image",
                reason: "must not be empty".to_string(),
            });
        }
        if self.cpu_cores <= 0.0 {
            return Err(SandboxError::Validation {
                field: "cpu_cores",
                reason: "must be positive".to_string(),
            });
        }
        if self.memory_gb <= 0.0 {
            return Err(SandboxError::Validation {
                field: "memory_gb",
                reason: "must be positive".to_string(),
            });
        }
        if self.gpu_count > 0 && self.gpu_type.as_deref().is_none_or(|t| t.trim().is_empty()) {
            return Err(SandboxError::Validation {
                field: "gpu_type",
                reason: "required when gpu_count > 0".to_string(),
            });
        }
        if let Some(env) = &self.environment_vars {
            for key in env.keys() {
                validate_env_key(key)?;
            }
        }
        if let Some(secrets) = &self.secrets {
            for key in secrets.keys() {
                validate_env_key(key)?;
            }
        }
        Ok(())
    }
}

/// Partial update for an existing sandbox. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdateSandboxRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_vars: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_access: Option<bool>,
}

/// Result of a finished command. Immutable once returned.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    #[serde(alias = "exitCode")]
    pub exit_code: i32,
}

impl CommandOutput {
    /// True when the command exited zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Server acknowledgment of an uploaded file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileUploadResponse {
    pub success: bool,
    pub path: String,
    pub size: u64,
}

/// Sandbox log output.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxLogs {
    pub logs: String,
}

/// Opaque handle correlating a background job to its sandbox.
///
/// Holds only identifiers and the remote paths the job writes to; all state
/// lives server-side and is re-fetched on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: String,
    pub sandbox_id: String,
    pub(crate) stdout_path: String,
    pub(crate) stderr_path: String,
    pub(crate) exit_path: String,
}

/// Point-in-time status of a background job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub job_id: String,
    pub completed: bool,
    /// Set once completed.
    pub exit_code: Option<i32>,
    /// Captured stdout, set once completed.
    pub stdout: Option<String>,
    /// Captured stderr, set once completed.
    pub stderr: Option<String>,
}

/// Ensure an environment variable key is a valid shell identifier, so it can
/// be embedded in the background-job wrapper without quoting surprises.
pub(crate) fn validate_env_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(SandboxError::Validation {
            field: "environment_vars",
            reason: format!("'{key}' is not a valid environment variable name"),
        })
    }
}
