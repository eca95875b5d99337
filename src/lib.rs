//! sandkit - client SDK for remote sandbox environments.
//!
//! Create isolated container sandboxes, wait for them to come up, run
//! commands in them (foreground or detached), move files in and out, and
//! tear them down, individually or in bulk.
//!
//! The async [`SandboxClient`] is the primary surface; [`blocking`] wraps it
//! for synchronous callers. Credentials resolve from an explicit parameter,
//! then `SANDKIT_API_KEY`, then `~/.sandkit/config.json`.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use sandkit::{CreateSandboxRequest, SandboxClient};
//!
//! # async fn demo() -> sandkit::Result<()> {
//! let client = SandboxClient::new(None, None)?;
//! let sandbox = client
//!     .create(CreateSandboxRequest::new("demo", "python:3.11-slim"))
//!     .await?;
//! let sandbox = client
//!     .wait_for_creation(&sandbox.id, Duration::from_secs(300))
//!     .await?;
//! let output = client
//!     .execute_command(&sandbox.id, "python --version", None, None, None)
//!     .await?;
//! println!("{}", output.stdout);
//! client.delete(&sandbox.id).await?;
//! # Ok(())
//! # }
//! ```

pub mod blocking;
mod bulk;
mod client;
mod config;
mod error;
mod models;
mod poll;
mod retry;
mod transfer;
mod transport;

pub use bulk::{BulkResult, DEFAULT_BULK_CONCURRENCY};
pub use client::{ListSandboxesParams, SandboxClient};
pub use config::ClientConfig;
pub use error::{FailureKind, Result, SandboxError};
pub use models::{
    CommandOutput, CreateSandboxRequest, JobHandle, JobStatus, Sandbox, SandboxListResponse,
    SandboxStatus, UpdateSandboxRequest,
};
pub use poll::WaitOptions;
