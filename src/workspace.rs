//! Per-process scratch space: staged uploads and longer-lived outputs.
//!
//! ```text
//! <tmp>/docbridge_XXXXXX/
//!  ├─ uploads/   one file per in-flight request, removed when the request ends
//!  └─ outputs/   converted Markdown, reclaimed by sweep()
//! ```
//!
//! The root is a fresh [`TempDir`] per [`Workspace`], so a directory left
//! behind by a crashed instance is never reused and several workspaces can
//! live side by side in one test binary. Every name written here carries a
//! fresh random token; concurrent requests never touch the same file and no
//! locking is needed.
//!
//! Staged inputs are released through [`StagedFile`]'s `Drop`, which runs on
//! every exit path of the orchestrator including early returns, timeouts and
//! panics unwinding through the request task.

use crate::error::GatewayError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

const UPLOADS: &str = "uploads";
const OUTPUTS: &str = "outputs";

/// Longest sanitised basename kept in a staged or output name.
const MAX_NAME_LEN: usize = 120;

/// Attempts at finding an unused name before giving up.
const NAME_ATTEMPTS: usize = 3;

/// The per-process directory tree.
#[derive(Debug)]
pub struct Workspace {
    root: TempDir,
    uploads: PathBuf,
    outputs: PathBuf,
}

impl Workspace {
    /// Create a fresh workspace under the system temp directory.
    pub fn create(prefix: &str) -> Result<Self, GatewayError> {
        let root = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| GatewayError::Internal(format!("Failed to create workspace: {e}")))?;
        Self::with_root(root)
    }

    /// Create a fresh workspace under `parent`.
    pub fn create_in(parent: &Path, prefix: &str) -> Result<Self, GatewayError> {
        std::fs::create_dir_all(parent)
            .map_err(|e| GatewayError::Internal(format!("Failed to create workspace: {e}")))?;
        let root = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| GatewayError::Internal(format!("Failed to create workspace: {e}")))?;
        Self::with_root(root)
    }

    fn with_root(root: TempDir) -> Result<Self, GatewayError> {
        let uploads = root.path().join(UPLOADS);
        let outputs = root.path().join(OUTPUTS);
        for dir in [&uploads, &outputs] {
            std::fs::create_dir_all(dir).map_err(|e| {
                GatewayError::Internal(format!("Failed to create {}: {e}", dir.display()))
            })?;
        }
        info!(root = %root.path().display(), "Workspace created");
        Ok(Self {
            root,
            uploads,
            outputs,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs
    }

    /// Write `bytes` under a unique name derived from `filename`.
    ///
    /// Only the sanitised basename of `filename` is used, prefixed with a
    /// random token; the caller's name never decides where the bytes land.
    pub async fn stage(&self, filename: &str, bytes: &[u8]) -> Result<StagedFile, GatewayError> {
        let base = sanitize_component(basename(filename), "upload");

        let mut attempt = 0;
        let (path, name, mut file) = loop {
            attempt += 1;
            let name = format!("{}_{}", unique_token(), base);
            let path = self.uploads.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, name, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < NAME_ATTEMPTS => {
                    debug!(name = %name, "Staging name taken, retrying");
                }
                Err(source) => return Err(GatewayError::StagingFailed { source }),
            }
        };

        // From here on the guard owns the file and removes it on any failure.
        let staged = StagedFile {
            path,
            name,
            released: false,
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(source) = written {
            return Err(GatewayError::StagingFailed { source });
        }

        debug!(staged = %staged.name, size = bytes.len(), "Input staged");
        Ok(staged)
    }

    /// Persist converted text to the output area as `<stem>_<token>.md`.
    ///
    /// The artifact is written to a temporary name and renamed into place so
    /// a concurrent sweep or reader never sees a partial file. It is not
    /// released with the request; only [`Workspace::sweep`] reclaims it.
    pub async fn materialize_output(
        &self,
        stem_hint: &str,
        text: &str,
    ) -> Result<OutputArtifact, GatewayError> {
        let stem = sanitize_component(stem_hint, "output");
        let name = format!("{}_{}.md", stem, unique_token());
        let path = self.outputs.join(&name);
        let tmp_path = self.outputs.join(format!(".{name}.tmp"));

        let write = async {
            tokio::fs::write(&tmp_path, text).await?;
            tokio::fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(source) = write {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(GatewayError::OutputWriteFailed { path, source });
        }

        debug!(output = %name, size = text.len(), "Output artifact written");
        Ok(OutputArtifact {
            path,
            name,
            size: text.len() as u64,
        })
    }

    /// Remove output artifacts older than `retention`. Returns the count removed.
    pub fn sweep(&self, retention: Duration) -> Result<usize, GatewayError> {
        self.sweep_at(retention, SystemTime::now())
    }

    /// [`Workspace::sweep`] against an explicit clock.
    ///
    /// Only files whose modification time is strictly before
    /// `now - retention` are removed. A file that disappears between listing
    /// and removal (consumed by someone else) is skipped silently.
    pub fn sweep_at(&self, retention: Duration, now: SystemTime) -> Result<usize, GatewayError> {
        let mut removed = 0;
        let mut pending = vec![self.outputs.clone()];
        let mut top_level = true;

        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(source) if top_level => return Err(GatewayError::SweepFailed { source }),
                Err(e) => {
                    warn!(dir = %dir.display(), "Skipping unreadable directory: {e}");
                    continue;
                }
            };
            top_level = false;

            for entry in entries.flatten() {
                let path = entry.path();
                let meta = match entry.metadata() {
                    Ok(meta) => meta,
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(e) => {
                        warn!(path = %path.display(), "Cannot stat during sweep: {e}");
                        continue;
                    }
                };

                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }

                let age = match meta.modified().map(|m| now.duration_since(m)) {
                    Ok(Ok(age)) => age,
                    // Timestamp in the future relative to `now`: not old.
                    Ok(Err(_)) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), "No modification time: {e}");
                        continue;
                    }
                };

                if age <= retention {
                    continue;
                }

                match std::fs::remove_file(&path) {
                    Ok(()) => {
                        debug!(path = %path.display(), age_secs = age.as_secs(), "Swept");
                        removed += 1;
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => warn!(path = %path.display(), "Failed to remove old output: {e}"),
                }
            }
        }

        info!(removed, "Output sweep complete");
        Ok(removed)
    }

    /// Recursively remove the whole workspace.
    ///
    /// Failure is logged, never returned: shutdown must not be blocked by a
    /// stubborn temp directory.
    pub fn close(self) {
        let root = self.root.path().to_path_buf();
        match self.root.close() {
            Ok(()) => info!(root = %root.display(), "Workspace removed"),
            Err(e) => warn!(root = %root.display(), "Failed to remove workspace: {e}"),
        }
    }
}

/// An input file staged for exactly one request.
///
/// Removed when [`StagedFile::release`] is called or, failing that, when the
/// value is dropped. Removal happens at most once.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    name: String,
    released: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The unique on-disk name (`<token>_<basename>`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Remove the staged file now.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(staged = %self.name, "Staged input released"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(staged = %self.name, "Failed to release staged input: {e}"),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// A converted file in the output area.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Eight hex characters from a v4 UUID.
fn unique_token() -> String {
    let mut token = Uuid::new_v4().simple().to_string();
    token.truncate(8);
    token
}

/// Last path component, treating both `/` and `\` as separators.
fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Reduce `raw` to `[A-Za-z0-9._-]`, without leading dots, at most
/// [`MAX_NAME_LEN`] bytes (keeping the tail so the extension survives).
fn sanitize_component(raw: &str, fallback: &str) -> String {
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let tail = if mapped.len() > MAX_NAME_LEN {
        &mapped[mapped.len() - MAX_NAME_LEN..]
    } else {
        &mapped[..]
    };

    let trimmed = tail.trim_start_matches('.');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}
