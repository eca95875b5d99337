//! Blocking facade over the async client.
//!
//! Owns a private current-thread runtime and drives the async
//! [`crate::SandboxClient`] with `block_on`, so request building, retry, and
//! error mapping never diverge between the two surfaces. Must not be used
//! from inside an async runtime; call the async client there instead.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::bulk::BulkResult;
use crate::client::ListSandboxesParams;
use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::{
    CommandOutput, CreateSandboxRequest, JobHandle, JobStatus, Sandbox, SandboxListResponse,
    UpdateSandboxRequest,
};
use crate::poll::WaitOptions;

/// Synchronous client for the sandbox service.
///
/// Not `Clone`: the embedded runtime is single-owner. Wrap in an `Arc` to
/// share across threads.
#[derive(Debug)]
pub struct SandboxClient {
    inner: crate::SandboxClient,
    runtime: Runtime,
}

impl SandboxClient {
    /// Build a client, resolving credentials the same way as the async
    /// client.
    pub fn new(api_key: Option<String>, base_url: Option<String>) -> Result<Self> {
        let inner = crate::SandboxClient::new(api_key, base_url)?;
        Self::wrap(inner)
    }

    /// Build a client from an already-resolved configuration.
    pub fn with_config(config: ClientConfig) -> Result<Self> {
        let inner = crate::SandboxClient::with_config(config)?;
        Self::wrap(inner)
    }

    fn wrap(inner: crate::SandboxClient) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn create(&self, request: CreateSandboxRequest) -> Result<Sandbox> {
        self.runtime.block_on(self.inner.create(request))
    }

    pub fn get(&self, sandbox_id: &str) -> Result<Sandbox> {
        self.runtime.block_on(self.inner.get(sandbox_id))
    }

    pub fn list(&self, params: &ListSandboxesParams) -> Result<SandboxListResponse> {
        self.runtime.block_on(self.inner.list(params))
    }

    pub fn update(&self, sandbox_id: &str, request: &UpdateSandboxRequest) -> Result<Sandbox> {
        self.runtime.block_on(self.inner.update(sandbox_id, request))
    }

    pub fn delete(&self, sandbox_id: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete(sandbox_id))
    }

    pub fn logs(&self, sandbox_id: &str) -> Result<String> {
        self.runtime.block_on(self.inner.logs(sandbox_id))
    }

    pub fn execute_command(
        &self,
        sandbox_id: &str,
        command: &str,
        timeout: Option<Duration>,
        working_dir: Option<&str>,
        env: Option<&HashMap<String, String>>,
    ) -> Result<CommandOutput> {
        self.runtime.block_on(self.inner.execute_command(
            sandbox_id,
            command,
            timeout,
            working_dir,
            env,
        ))
    }

    pub fn start_background_job(&self, sandbox_id: &str, command: &str) -> Result<JobHandle> {
        self.runtime
            .block_on(self.inner.start_background_job(sandbox_id, command))
    }

    pub fn get_background_job(&self, handle: &JobHandle) -> Result<JobStatus> {
        self.runtime.block_on(self.inner.get_background_job(handle))
    }

    pub fn wait_for_job(&self, handle: &JobHandle, options: WaitOptions) -> Result<JobStatus> {
        self.runtime.block_on(self.inner.wait_for_job(handle, options))
    }

    pub fn wait_for_creation(&self, sandbox_id: &str, timeout: Duration) -> Result<Sandbox> {
        self.runtime
            .block_on(self.inner.wait_for_creation(sandbox_id, timeout))
    }

    pub fn wait_until<P>(
        &self,
        sandbox_id: &str,
        predicate: P,
        options: WaitOptions,
    ) -> Result<Sandbox>
    where
        P: Fn(&Sandbox) -> bool,
    {
        self.runtime
            .block_on(self.inner.wait_until(sandbox_id, predicate, options))
    }

    pub fn upload(
        &self,
        sandbox_id: &str,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<()> {
        self.runtime
            .block_on(self.inner.upload(sandbox_id, local_path, remote_path))
    }

    pub fn download(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<()> {
        self.runtime
            .block_on(self.inner.download(sandbox_id, remote_path, local_path))
    }

    pub fn bulk_create(
        &self,
        requests: Vec<CreateSandboxRequest>,
        concurrency: usize,
    ) -> BulkResult<Sandbox> {
        self.runtime
            .block_on(self.inner.bulk_create(requests, concurrency))
    }

    pub fn bulk_delete(&self, sandbox_ids: &[String], concurrency: usize) -> BulkResult<()> {
        self.runtime
            .block_on(self.inner.bulk_delete(sandbox_ids, concurrency))
    }

    pub fn bulk_execute(
        &self,
        sandbox_ids: &[String],
        command: &str,
        timeout: Option<Duration>,
        concurrency: usize,
    ) -> BulkResult<CommandOutput> {
        self.runtime.block_on(self.inner.bulk_execute(
            sandbox_ids,
            command,
            timeout,
            concurrency,
        ))
    }

    pub fn bulk_wait_for_creation(
        &self,
        sandbox_ids: &[String],
        timeout: Duration,
        concurrency: usize,
    ) -> BulkResult<Sandbox> {
        self.runtime.block_on(self.inner.bulk_wait_for_creation(
            sandbox_ids,
            timeout,
            concurrency,
        ))
    }

    /// Access the underlying async client, for callers mixing both styles.
    pub fn as_async(&self) -> &crate::SandboxClient {
        &self.inner
    }
}
