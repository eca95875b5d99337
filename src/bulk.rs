//! Bulk operations over many sandboxes with bounded concurrency.
//!
//! Each item runs independently: one sandbox failing never aborts the
//! batch, and the caller gets a per-id outcome map to inspect. Concurrency
//! is capped so a large batch does not stampede the service.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tracing::{debug, warn};

use crate::client::SandboxClient;
use crate::error::{Result, SandboxError};
use crate::models::{CommandOutput, Sandbox};
use crate::poll::WaitOptions;

/// In-flight request cap used when the caller does not pick one.
pub const DEFAULT_BULK_CONCURRENCY: usize = 16;

/// Per-id outcomes of a bulk operation.
///
/// Every distinct input id appears exactly once, successful or not.
#[derive(Debug)]
pub struct BulkResult<T> {
    outcomes: HashMap<String, Result<T>>,
}

impl<T> BulkResult<T> {
    /// Ids that succeeded, with their values.
    pub fn successes(&self) -> impl Iterator<Item = (&str, &T)> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| r.as_ref().ok().map(|v| (id.as_str(), v)))
    }

    /// Ids that failed, with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &SandboxError)> {
        self.outcomes
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
    }

    pub fn is_all_ok(&self) -> bool {
        self.outcomes.values().all(|r| r.is_ok())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Take the outcome for a single id, consuming it.
    pub fn remove(&mut self, id: &str) -> Option<Result<T>> {
        self.outcomes.remove(id)
    }

    /// Consume into the raw outcome map.
    pub fn into_outcomes(self) -> HashMap<String, Result<T>> {
        self.outcomes
    }
}

/// Run `op` for every distinct id with at most `concurrency` in flight.
///
/// Duplicate ids are attempted once: outcomes are keyed by id, so a repeat
/// could only overwrite the first attempt's result.
async fn run_bulk<T, F, Fut>(ids: &[String], concurrency: usize, op: F) -> BulkResult<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let concurrency = concurrency.max(1);
    let mut seen = std::collections::HashSet::new();
    let unique: Vec<String> = ids
        .iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect();
    debug!(count = unique.len(), concurrency, "starting bulk operation");
    let outcomes: HashMap<String, Result<T>> = stream::iter(unique)
        .map(|id| {
            let fut = op(id.clone());
            async move { (id, fut.await) }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let failed = outcomes.values().filter(|r| r.is_err()).count();
    if failed > 0 {
        warn!(failed, total = outcomes.len(), "bulk operation had failures");
    }
    BulkResult { outcomes }
}

impl SandboxClient {
    /// Create many sandboxes from independent specifications.
    ///
    /// Successes are keyed by the server-assigned sandbox id; failures are
    /// keyed by the request's name, since no id was ever assigned.
    pub async fn bulk_create(
        &self,
        requests: Vec<crate::models::CreateSandboxRequest>,
        concurrency: usize,
    ) -> BulkResult<Sandbox> {
        let concurrency = concurrency.max(1);
        debug!(count = requests.len(), concurrency, "starting bulk create");
        let outcomes: HashMap<String, Result<Sandbox>> = stream::iter(requests)
            .map(|request| async move {
                let name = request.name.clone();
                match self.create(request).await {
                    Ok(sandbox) => (sandbox.id.clone(), Ok(sandbox)),
                    Err(err) => (name, Err(err)),
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let failed = outcomes.values().filter(|r| r.is_err()).count();
        if failed > 0 {
            warn!(failed, total = outcomes.len(), "bulk create had failures");
        }
        BulkResult { outcomes }
    }

    /// Delete many sandboxes. Failures are isolated per id.
    pub async fn bulk_delete(
        &self,
        sandbox_ids: &[String],
        concurrency: usize,
    ) -> BulkResult<()> {
        run_bulk(sandbox_ids, concurrency, |id| async move {
            self.delete(&id).await
        })
        .await
    }

    /// Run the same command across many sandboxes.
    pub async fn bulk_execute(
        &self,
        sandbox_ids: &[String],
        command: &str,
        timeout: Option<Duration>,
        concurrency: usize,
    ) -> BulkResult<CommandOutput> {
        run_bulk(sandbox_ids, concurrency, |id| async move {
            self.execute_command(&id, command, timeout, None, None).await
        })
        .await
    }

    /// Wait for many sandboxes to reach `RUNNING`.
    pub async fn bulk_wait_for_creation(
        &self,
        sandbox_ids: &[String],
        timeout: Duration,
        concurrency: usize,
    ) -> BulkResult<Sandbox> {
        let options = WaitOptions::new(timeout);
        run_bulk(sandbox_ids, concurrency, |id| {
            let options = options.clone();
            async move {
                self.wait_until(
                    &id,
                    |s| s.status == crate::models::SandboxStatus::Running,
                    options,
                )
                .await
            }
        })
        .await
    }
}
