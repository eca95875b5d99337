//! File and directory transfer between the local host and a sandbox.
//!
//! Single files move as raw bytes. Directories move as gzipped tarballs,
//! packed on whichever side the data starts on and unpacked on the other.
//! The destination kind is inferred from the source: a source directory
//! always produces a destination directory.
//!
//! Extraction on the local side is hardened: entry paths are validated
//! before anything is written (absolute paths and `..` components are
//! rejected), archive ownership and permission bits are discarded, and
//! each entry's decompressed size is capped.

use std::io::Read;
use std::path::{Component, Path};
use std::time::Duration;

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::{SandboxClient, shell_quote};
use crate::error::{Result, SandboxError};
use crate::models::FileUploadResponse;

/// Transfers at or above this size log a warning; they still proceed.
const LARGE_TRANSFER_BYTES: u64 = 100 * 1024 * 1024;

/// Decompressed-size cap for a single archive entry. A tarball claiming a
/// larger entry is treated as hostile.
const MAX_ENTRY_SIZE: u64 = 100 * 1024 * 1024;

const TRANSFER_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

impl SandboxClient {
    /// Upload a local file or directory into the sandbox at `remote_path`.
    ///
    /// Files are sent directly. Directories are packed into a tarball,
    /// uploaded to a scratch path, and unpacked into `remote_path` inside
    /// the sandbox.
    pub async fn upload(
        &self,
        sandbox_id: &str,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<()> {
        let local_path = local_path.as_ref();
        let meta = tokio::fs::metadata(local_path).await.map_err(|e| {
            SandboxError::Transfer {
                path: local_path.display().to_string(),
                reason: format!("cannot read source: {e}"),
            }
        })?;

        if meta.is_dir() {
            self.upload_dir(sandbox_id, local_path, remote_path).await
        } else {
            let bytes = tokio::fs::read(local_path).await?;
            warn_if_large(local_path, bytes.len() as u64);
            self.upload_bytes(sandbox_id, Bytes::from(bytes), file_name_of(local_path), remote_path)
                .await?;
            Ok(())
        }
    }

    /// Download a file or directory from the sandbox to `local_path`.
    ///
    /// The remote side is probed first; a remote directory is packed into
    /// a tarball in the sandbox, downloaded, and extracted under
    /// `local_path` with path-traversal checks.
    pub async fn download(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: impl AsRef<Path>,
    ) -> Result<()> {
        let local_path = local_path.as_ref();
        match self.probe_remote(sandbox_id, remote_path).await? {
            RemoteKind::File => self.download_file(sandbox_id, remote_path, local_path).await,
            RemoteKind::Dir => self.download_dir(sandbox_id, remote_path, local_path).await,
            RemoteKind::Missing => Err(SandboxError::NotFound {
                message: format!("no file or directory at {remote_path} in sandbox {sandbox_id}"),
            }),
        }
    }

    async fn upload_bytes(
        &self,
        sandbox_id: &str,
        bytes: Bytes,
        file_name: String,
        remote_path: &str,
    ) -> Result<FileUploadResponse> {
        debug!(id = %sandbox_id, remote = %remote_path, size = bytes.len(), "uploading file");
        self.transport()
            .post_file(
                &format!("/sandboxes/{sandbox_id}/files/upload"),
                &[("path", remote_path)],
                file_name,
                bytes,
            )
            .await
    }

    async fn upload_dir(
        &self,
        sandbox_id: &str,
        local_dir: &Path,
        remote_path: &str,
    ) -> Result<()> {
        let dir = local_dir.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || pack_dir(&dir))
            .await
            .map_err(|e| SandboxError::Transfer {
                path: local_dir.display().to_string(),
                reason: format!("archiving task failed: {e}"),
            })??;
        warn_if_large(local_dir, archive.len() as u64);

        let scratch = format!("/tmp/upload_{}.tar.gz", short_id());
        self.upload_bytes(
            sandbox_id,
            Bytes::from(archive),
            "upload.tar.gz".to_string(),
            &scratch,
        )
        .await?;

        let unpack = format!(
            "mkdir -p {dest} && tar xzf {archive} -C {dest} && rm -f {archive}",
            dest = shell_quote(remote_path),
            archive = shell_quote(&scratch),
        );
        let output = self
            .execute_command(sandbox_id, &unpack, Some(TRANSFER_COMMAND_TIMEOUT), None, None)
            .await?;
        if !output.success() {
            return Err(SandboxError::Transfer {
                path: remote_path.to_string(),
                reason: format!("remote unpack failed: {}", output.stderr.trim()),
            });
        }
        info!(id = %sandbox_id, local = %local_dir.display(), remote = %remote_path, "directory uploaded");
        Ok(())
    }

    async fn download_file(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let bytes = self
            .transport()
            .get_bytes(
                &format!("/sandboxes/{sandbox_id}/files/download"),
                &[("path", remote_path)],
            )
            .await?;
        warn_if_large(local_path, bytes.len() as u64);
        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(local_path, &bytes).await?;
        debug!(id = %sandbox_id, remote = %remote_path, local = %local_path.display(), size = bytes.len(), "file downloaded");
        Ok(())
    }

    async fn download_dir(
        &self,
        sandbox_id: &str,
        remote_path: &str,
        local_path: &Path,
    ) -> Result<()> {
        let scratch = format!("/tmp/download_{}.tar.gz", short_id());
        let pack = format!(
            "tar czf {archive} -C {dir} .",
            archive = shell_quote(&scratch),
            dir = shell_quote(remote_path),
        );
        let output = self
            .execute_command(sandbox_id, &pack, Some(TRANSFER_COMMAND_TIMEOUT), None, None)
            .await?;
        if !output.success() {
            return Err(SandboxError::Transfer {
                path: remote_path.to_string(),
                reason: format!("remote pack failed: {}", output.stderr.trim()),
            });
        }

        let bytes = self
            .transport()
            .get_bytes(
                &format!("/sandboxes/{sandbox_id}/files/download"),
                &[("path", scratch.as_str())],
            )
            .await?;
        warn_if_large(local_path, bytes.len() as u64);

        // Scratch cleanup is best-effort; the sandbox's /tmp is ephemeral.
        let _ = self
            .execute_command(
                sandbox_id,
                &format!("rm -f {}", shell_quote(&scratch)),
                Some(Duration::from_secs(30)),
                None,
                None,
            )
            .await;

        let dest = local_path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_archive(&bytes, &dest))
            .await
            .map_err(|e| SandboxError::Transfer {
                path: local_path.display().to_string(),
                reason: format!("extraction task failed: {e}"),
            })??;
        info!(id = %sandbox_id, remote = %remote_path, local = %local_path.display(), "directory downloaded");
        Ok(())
    }

    /// Classify the remote path as file, directory, or missing.
    async fn probe_remote(&self, sandbox_id: &str, remote_path: &str) -> Result<RemoteKind> {
        let probe = format!(
            "if [ -d {p} ]; then echo dir; elif [ -f {p} ]; then echo file; else echo missing; fi",
            p = shell_quote(remote_path),
        );
        let output = self
            .execute_command(sandbox_id, &probe, Some(Duration::from_secs(30)), None, None)
            .await?;
        match output.stdout.trim() {
            "dir" => Ok(RemoteKind::Dir),
            "file" => Ok(RemoteKind::File),
            _ => Ok(RemoteKind::Missing),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteKind {
    File,
    Dir,
    Missing,
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.bin".to_string())
}

fn warn_if_large(path: &Path, size: u64) {
    if size >= LARGE_TRANSFER_BYTES {
        warn!(
            path = %path.display(),
            size_mb = size / (1024 * 1024),
            "large transfer, this may take a while"
        );
    }
}

/// Pack a directory into a gzipped tarball held in memory. Entry paths are
/// relative to the directory root.
pub(crate) fn pack_dir(dir: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    builder.append_dir_all(".", dir)?;
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Extract a gzipped tarball into `dest`, validating every entry path
/// before writing.
pub(crate) fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive.set_preserve_permissions(false);
    archive.set_preserve_mtime(false);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        if !is_safe_entry_path(&entry_path) {
            return Err(SandboxError::Transfer {
                path: entry_path.display().to_string(),
                reason: "archive entry escapes the destination directory".to_string(),
            });
        }

        let size = entry.header().size()?;
        if size > MAX_ENTRY_SIZE {
            return Err(SandboxError::Transfer {
                path: entry_path.display().to_string(),
                reason: format!("archive entry exceeds {MAX_ENTRY_SIZE} bytes"),
            });
        }

        let target = dest.join(&entry_path);
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        // Skip symlinks and device nodes; only plain files are materialized.
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        // Read through a cap so a forged size header cannot bypass the limit.
        std::io::copy(&mut entry.by_ref().take(MAX_ENTRY_SIZE + 1), &mut out)?;
        if out.metadata()?.len() > MAX_ENTRY_SIZE {
            std::fs::remove_file(&target)?;
            return Err(SandboxError::Transfer {
                path: entry_path.display().to_string(),
                reason: format!("archive entry exceeds {MAX_ENTRY_SIZE} bytes"),
            });
        }
    }
    Ok(())
}

/// Reject absolute paths and any `..` component.
pub(crate) fn is_safe_entry_path(path: &Path) -> bool {
    if path.is_absolute() {
        return false;
    }
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
