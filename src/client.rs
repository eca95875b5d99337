//! Async sandbox client: lifecycle CRUD, command execution, and
//! background jobs.
//!
//! [`SandboxClient`] is the crate's async entry point. It is cheap to clone
//! and safe to share across tasks; all state lives server-side and every
//! read re-fetches.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{Result, SandboxError};
use crate::models::{
    CommandOutput, CreateSandboxRequest, JobHandle, JobStatus, Sandbox, SandboxListResponse,
    SandboxLogs, UpdateSandboxRequest,
};
use crate::poll::{self, WaitOptions};
use crate::transport::Transport;

/// Default server-side deadline for a synchronous command, in seconds.
const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
/// Extra client-side slack on top of the command deadline, so the server
/// gets a chance to report its own timeout before the socket gives up.
const COMMAND_TIMEOUT_SLACK: Duration = Duration::from_secs(30);

/// Filters for listing sandboxes. Unset fields are omitted from the query.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListSandboxesParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    command: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    env: Option<&'a HashMap<String, String>>,
}

/// Asynchronous client for the sandbox service.
#[derive(Debug, Clone)]
pub struct SandboxClient {
    transport: Transport,
}

impl SandboxClient {
    /// Build a client, resolving credentials from the parameter, the
    /// environment, and the config file, in that order.
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let config = ClientConfig::resolve(api_key, base_url)?;
        Self::with_config(config)
    }

    /// Build a client from an already-resolved configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            transport: Transport::new(config)?,
        })
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Create a sandbox. Returns as soon as the service accepts the
    /// request; the sandbox is usually still `PENDING`. Follow up with
    /// [`wait_for_creation`](Self::wait_for_creation) to block until it
    /// is running.
    pub async fn create(&self, mut request: CreateSandboxRequest) -> Result<Sandbox> {
        request.validate()?;
        if request.team_id.is_none() {
            request.team_id = self.transport.config().team_id.clone();
        }
        let sandbox: Sandbox = self.transport.post("/sandboxes", &request).await?;
        info!(id = %sandbox.id, name = %sandbox.name, "sandbox created");
        Ok(sandbox)
    }

    /// Fetch the current descriptor for a sandbox.
    pub async fn get(&self, sandbox_id: &str) -> Result<Sandbox> {
        self.transport
            .get(&format!("/sandboxes/{sandbox_id}"))
            .await
    }

    /// List sandboxes, one page at a time.
    pub async fn list(&self, params: &ListSandboxesParams) -> Result<SandboxListResponse> {
        let mut params = params.clone();
        if params.team_id.is_none() {
            params.team_id = self.transport.config().team_id.clone();
        }
        self.transport.get_with_query("/sandboxes", &params).await
    }

    /// Apply a partial update. Fields left unset are unchanged.
    pub async fn update(
        &self,
        sandbox_id: &str,
        request: &UpdateSandboxRequest,
    ) -> Result<Sandbox> {
        self.transport
            .patch(&format!("/sandboxes/{sandbox_id}"), request)
            .await
    }

    /// Terminate and delete a sandbox. Idempotent from the caller's view;
    /// deleting an already-gone sandbox surfaces as [`SandboxError::NotFound`].
    pub async fn delete(&self, sandbox_id: &str) -> Result<()> {
        self.transport
            .delete(&format!("/sandboxes/{sandbox_id}"))
            .await?;
        info!(id = %sandbox_id, "sandbox deleted");
        Ok(())
    }

    /// Fetch the sandbox's captured log output.
    pub async fn logs(&self, sandbox_id: &str) -> Result<String> {
        let response: SandboxLogs = self
            .transport
            .get(&format!("/sandboxes/{sandbox_id}/logs"))
            .await?;
        Ok(response.logs)
    }

    /// Run a command in the sandbox and wait for it to finish.
    ///
    /// `timeout` bounds the server-side execution; the HTTP request itself
    /// is given extra slack so a server-reported timeout arrives as a typed
    /// error rather than a dropped socket. A non-zero exit code is not an
    /// error: inspect [`CommandOutput::exit_code`].
    pub async fn execute_command(
        &self,
        sandbox_id: &str,
        command: &str,
        timeout: Option<Duration>,
        working_dir: Option<&str>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<CommandOutput> {
        if command.trim().is_empty() {
            return Err(SandboxError::Validation {
                field: "command",
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(env) = env {
            for key in env.keys() {
                crate::models::validate_env_key(key)?;
            }
        }
        let timeout_secs = timeout
            .map(|t| t.as_secs().max(1))
            .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
        let request = ExecuteRequest {
            command,
            timeout: Some(timeout_secs),
            working_dir,
            env,
        };
        let http_timeout = Duration::from_secs(timeout_secs) + COMMAND_TIMEOUT_SLACK;
        debug!(id = %sandbox_id, timeout_secs, "executing command");
        self.transport
            .post_with_timeout(
                &format!("/sandboxes/{sandbox_id}/execute"),
                &request,
                http_timeout,
            )
            .await
    }

    /// Start a command in the background and return immediately.
    ///
    /// The command keeps running after this call returns, detached from any
    /// session, with its output captured to files inside the sandbox. Poll
    /// the returned handle with [`get_background_job`](Self::get_background_job).
    pub async fn start_background_job(
        &self,
        sandbox_id: &str,
        command: &str,
    ) -> Result<JobHandle> {
        if command.trim().is_empty() {
            return Err(SandboxError::Validation {
                field: "command",
                reason: "must not be empty".to_string(),
            });
        }
        let job_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        let stdout_path = format!("/tmp/job_{job_id}.stdout.log");
        let stderr_path = format!("/tmp/job_{job_id}.stderr.log");
        let exit_path = format!("/tmp/job_{job_id}.exit");

        // The inner subshell captures output and records the exit code; the
        // outer nohup detaches it so the wrapper survives this request.
        let inner = format!("({command}) > {stdout_path} 2> {stderr_path}; echo $? > {exit_path}");
        let wrapper = format!(
            "nohup sh -c {} < /dev/null > /dev/null 2>&1 &",
            shell_quote(&inner)
        );

        self.execute_command(sandbox_id, &wrapper, Some(Duration::from_secs(30)), None, None)
            .await?;
        info!(id = %sandbox_id, job_id = %job_id, "background job started");
        Ok(JobHandle {
            job_id,
            sandbox_id: sandbox_id.to_string(),
            stdout_path,
            stderr_path,
            exit_path,
        })
    }

    /// Poll a background job. Output is only fetched once the job has
    /// written its exit code, so a running job costs one cheap command.
    pub async fn get_background_job(&self, handle: &JobHandle) -> Result<JobStatus> {
        let probe = self
            .execute_command(
                &handle.sandbox_id,
                &format!("cat {} 2>/dev/null", handle.exit_path),
                Some(Duration::from_secs(30)),
                None,
                None,
            )
            .await?;

        let exit_code = match probe.stdout.trim().parse::<i32>() {
            Ok(code) => code,
            // Missing or empty exit file: still running.
            Err(_) => {
                return Ok(JobStatus {
                    job_id: handle.job_id.clone(),
                    completed: false,
                    exit_code: None,
                    stdout: None,
                    stderr: None,
                });
            }
        };

        let stdout = self
            .execute_command(
                &handle.sandbox_id,
                &format!("cat {} 2>/dev/null", handle.stdout_path),
                Some(Duration::from_secs(30)),
                None,
                None,
            )
            .await?;
        let stderr = self
            .execute_command(
                &handle.sandbox_id,
                &format!("cat {} 2>/dev/null", handle.stderr_path),
                Some(Duration::from_secs(30)),
                None,
                None,
            )
            .await?;

        Ok(JobStatus {
            job_id: handle.job_id.clone(),
            completed: true,
            exit_code: Some(exit_code),
            stdout: Some(stdout.stdout),
            stderr: Some(stderr.stdout),
        })
    }

    /// Block until a background job completes, polling its exit file.
    pub async fn wait_for_job(
        &self,
        handle: &JobHandle,
        options: WaitOptions,
    ) -> Result<JobStatus> {
        poll::wait_for_job(self, handle, options).await
    }

    /// Block until the sandbox reaches `RUNNING`, or fail with a typed
    /// error if it dies or the deadline passes.
    pub async fn wait_for_creation(&self, sandbox_id: &str, timeout: Duration) -> Result<Sandbox> {
        poll::wait_until(
            self,
            sandbox_id,
            |s| s.status == crate::models::SandboxStatus::Running,
            WaitOptions::new(timeout),
        )
        .await
    }

    /// Block until `predicate` holds for the sandbox's descriptor.
    pub async fn wait_until<P>(
        &self,
        sandbox_id: &str,
        predicate: P,
        options: WaitOptions,
    ) -> Result<Sandbox>
    where
        P: Fn(&Sandbox) -> bool,
    {
        poll::wait_until(self, sandbox_id, predicate, options).await
    }
}

/// Single-quote a string for POSIX `sh`, making embedded quotes inert.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn shell_quote_wraps_in_single_quotes() {
        assert_eq!(shell_quote("echo hi"), "'echo hi'");
    }

    #[test]
    fn shell_quote_neutralizes_embedded_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        // Round-trip check: the quoted form contains no bare single quote
        // that would terminate the wrapper early.
        let quoted = shell_quote("x'; rm -rf / #");
        assert!(quoted.starts_with('\''));
        assert!(quoted.ends_with('\''));
    }

    #[test]
    fn list_params_serialize_only_set_fields() {
        let params = ListSandboxesParams {
            status: Some("RUNNING".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 1);
    }
}
