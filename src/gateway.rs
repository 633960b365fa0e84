//! Conversion orchestrator: the five operations the service exposes.
//!
//! ```text
//!  Inline ─► decode ─┐
//!                    ├─► validate ─► stage ─► select ─► backend (timeout) ─► normalise ─► [persist]
//!  Path ─► access ───┘                 │                                                  │
//!                                      └──────────── StagedFile dropped / released ◄──────┘
//! ```
//!
//! A [`Gateway`] is cheap to clone; clones share the workspace, policy and
//! backends. Each conversion is independent: staged names never collide, so
//! any number may run concurrently without locking.

use crate::backend::{self, BackendKind, Backends};
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::policy::ValidationPolicy;
use crate::workspace::{OutputArtifact, Workspace};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Service name reported by [`Gateway::service_info`].
pub const SERVICE_NAME: &str = "docbridge";

// ── Requests ─────────────────────────────────────────────────────────────────

/// How an inline payload is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadEncoding {
    /// Standard base64 alphabet; embedded whitespace is ignored.
    #[default]
    Base64,
    /// UTF-8 text used as-is.
    PlainText,
}

/// A file sent with the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineContent {
    /// Original filename; its extension drives validation and routing.
    pub filename: String,
    pub payload: String,
    #[serde(default)]
    pub encoding: PayloadEncoding,
    /// When set, the result is also written to the output area.
    #[serde(default)]
    pub output_name: Option<String>,
}

/// A file already on the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerPathRequest {
    pub path: PathBuf,
    /// Stem for the output artifact; defaults to the input's stem.
    #[serde(default)]
    pub output_name: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ConversionRequest {
    Inline(InlineContent),
    ServerPath(ServerPathRequest),
}

// ── Results ──────────────────────────────────────────────────────────────────

/// A completed conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSuccess {
    /// Filename as the caller knows it.
    pub filename: String,
    /// Normalised Markdown.
    pub text: String,
    pub backend: BackendKind,
    /// Name the input was staged under (already removed).
    pub staged_name: String,
    /// Persisted copy of `text`, if one was written.
    pub output: Option<OutputArtifact>,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

/// Accepted extensions, flat and grouped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedFormats {
    pub extensions: Vec<String>,
    pub categories: BTreeMap<String, Vec<String>>,
}

/// Static facts about a running gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub supported_formats: Vec<String>,
    pub max_file_size_bytes: u64,
    pub max_file_size_mb: u64,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_retention_secs: u64,
    pub allowed_roots: Vec<PathBuf>,
    pub backend_timeout_secs: u64,
    pub pdf_ocr: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub removed: usize,
    pub retention_secs: u64,
}

// ── Gateway ──────────────────────────────────────────────────────────────────

/// The conversion service.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Arc<GatewayConfig>,
    policy: Arc<ValidationPolicy>,
    workspace: Arc<Workspace>,
    backends: Backends,
    /// Canonical forms of `config.allowed_roots`.
    roots: Arc<Vec<PathBuf>>,
}

impl Gateway {
    /// Create a gateway with the production backends and a fresh workspace.
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let backends = Backends::from_config(&config);
        Self::with_backends(config, backends)
    }

    /// Create a gateway with caller-supplied backends.
    pub fn with_backends(config: GatewayConfig, backends: Backends) -> Result<Self, GatewayError> {
        let workspace = match &config.workspace_parent {
            Some(parent) => Workspace::create_in(parent, &config.workspace_prefix)?,
            None => Workspace::create(&config.workspace_prefix)?,
        };
        let roots = canonical_roots(&config.allowed_roots);
        info!(
            extensions = config.allowed_extensions.len(),
            max_file_size = config.max_file_size,
            "Gateway ready"
        );

        Ok(Self {
            policy: Arc::new(ValidationPolicy::from_config(&config)),
            config: Arc::new(config),
            workspace: Arc::new(workspace),
            backends,
            roots: Arc::new(roots),
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Run one conversion request to completion.
    pub async fn convert(
        &self,
        request: ConversionRequest,
    ) -> Result<ConversionSuccess, GatewayError> {
        match request {
            ConversionRequest::Inline(content) => self.convert_inline(content).await,
            ConversionRequest::ServerPath(req) => self.convert_server_path(req).await,
        }
    }

    /// Convert a file that already lives under one of the allowed roots.
    pub async fn convert_from_path(
        &self,
        path: impl Into<PathBuf>,
        output_name: Option<String>,
    ) -> Result<ConversionSuccess, GatewayError> {
        self.convert(ConversionRequest::ServerPath(ServerPathRequest {
            path: path.into(),
            output_name,
        }))
        .await
    }

    /// Convert an encoded payload sent with the request.
    pub async fn convert_from_content(
        &self,
        filename: impl Into<String>,
        payload: impl Into<String>,
        encoding: PayloadEncoding,
        output_name: Option<String>,
    ) -> Result<ConversionSuccess, GatewayError> {
        self.convert(ConversionRequest::Inline(InlineContent {
            filename: filename.into(),
            payload: payload.into(),
            encoding,
            output_name,
        }))
        .await
    }

    /// The accepted extensions, sorted and grouped.
    pub fn list_supported_formats(&self) -> SupportedFormats {
        let extensions: Vec<String> = self.policy.extensions().map(str::to_string).collect();
        let mut categories: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for ext in &extensions {
            categories
                .entry(category_of(ext).to_string())
                .or_default()
                .push(ext.clone());
        }
        SupportedFormats {
            extensions,
            categories,
        }
    }

    pub fn service_info(&self) -> ServiceInfo {
        let c = &self.config;
        ServiceInfo {
            name: SERVICE_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            supported_formats: self.policy.extensions().map(str::to_string).collect(),
            max_file_size_bytes: c.max_file_size,
            max_file_size_mb: c.max_file_size / (1024 * 1024),
            upload_dir: self.workspace.uploads_dir().to_path_buf(),
            output_dir: self.workspace.outputs_dir().to_path_buf(),
            output_retention_secs: c.output_retention.as_secs(),
            allowed_roots: c.allowed_roots.clone(),
            backend_timeout_secs: c.backend_timeout.as_secs(),
            pdf_ocr: c.pdf_ocr,
        }
    }

    /// Remove output artifacts older than the configured retention.
    pub async fn sweep_old_artifacts(&self) -> Result<SweepReport, GatewayError> {
        let workspace = Arc::clone(&self.workspace);
        let retention = self.config.output_retention;
        let removed = tokio::task::spawn_blocking(move || workspace.sweep(retention))
            .await
            .map_err(|e| GatewayError::Internal(format!("Sweep task panicked: {}", e)))??;
        Ok(SweepReport {
            removed,
            retention_secs: retention.as_secs(),
        })
    }

    /// Remove the workspace if this is the last handle to it.
    ///
    /// With other clones still alive the directory stays until the last one
    /// is dropped.
    pub fn shutdown(self) {
        match Arc::try_unwrap(self.workspace) {
            Ok(workspace) => workspace.close(),
            Err(_) => debug!("Workspace still shared; removed when the last handle drops"),
        }
    }

    // ── Flows ────────────────────────────────────────────────────────────────

    async fn convert_inline(
        &self,
        content: InlineContent,
    ) -> Result<ConversionSuccess, GatewayError> {
        let started = Instant::now();
        let bytes = decode_payload(&content.payload, content.encoding)?;
        self.convert_decoded(&content.filename, bytes, content.output_name, started)
            .await
    }

    /// Convert raw bytes the caller already holds, as an inline payload
    /// without the encoding step.
    pub async fn convert_bytes(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        output_name: Option<String>,
    ) -> Result<ConversionSuccess, GatewayError> {
        self.convert_decoded(filename, bytes, output_name, Instant::now())
            .await
    }

    async fn convert_decoded(
        &self,
        filename: &str,
        bytes: Vec<u8>,
        output_name: Option<String>,
        started: Instant,
    ) -> Result<ConversionSuccess, GatewayError> {
        let ext = self.policy.validate(filename, bytes.len() as u64)?;
        self.run(
            filename,
            &ext,
            bytes,
            output_name.as_deref().map(output_stem),
            started,
        )
        .await
    }

    async fn convert_server_path(
        &self,
        req: ServerPathRequest,
    ) -> Result<ConversionSuccess, GatewayError> {
        let started = Instant::now();
        let (canonical, size) = self.check_access(&req.path).await?;

        let filename = canonical
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = self.policy.validate(&filename, size)?;

        let bytes = tokio::fs::read(&canonical).await.map_err(|e| {
            debug!(path = %canonical.display(), "Read failed: {e}");
            GatewayError::NotAccessible {
                path: req.path.clone(),
            }
        })?;
        // The file may have grown since it was measured.
        if bytes.len() as u64 > self.policy.max_file_size() {
            return Err(GatewayError::TooLarge {
                size: bytes.len() as u64,
                limit: self.policy.max_file_size(),
            });
        }

        let stem = match req.output_name.as_deref() {
            Some(name) => output_stem(name),
            None => output_stem(&filename),
        };
        self.run(&filename, &ext, bytes, Some(stem), started).await
    }

    /// Resolve `path` and confirm it is a readable regular file inside an
    /// allowed root. Returns the canonical path and its size.
    async fn check_access(&self, path: &Path) -> Result<(PathBuf, u64), GatewayError> {
        let denied = || GatewayError::AccessDenied {
            path: path.to_path_buf(),
            roots: self.roots_display(),
        };
        let not_accessible = || GatewayError::NotAccessible {
            path: path.to_path_buf(),
        };

        if !path.is_absolute() {
            return Err(denied());
        }

        let canonical = match tokio::fs::canonicalize(path).await {
            Ok(p) => p,
            Err(_) => {
                // Nothing to resolve; decide on the lexical path so a missing
                // file outside the roots is still reported as denied.
                let lexical = lexical_normalize(path);
                return Err(if self.is_inside_roots(&lexical) {
                    not_accessible()
                } else {
                    denied()
                });
            }
        };

        if !self.is_inside_roots(&canonical) {
            warn!(path = %path.display(), "Path outside allowed roots");
            return Err(denied());
        }

        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|_| not_accessible())?;
        if !meta.is_file() {
            return Err(not_accessible());
        }

        Ok((canonical, meta.len()))
    }

    fn is_inside_roots(&self, path: &Path) -> bool {
        self.roots.iter().any(|root| path.starts_with(root))
    }

    fn roots_display(&self) -> String {
        self.config
            .allowed_roots
            .iter()
            .map(|r| r.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Stage, convert and optionally persist. The staged file is
    /// gone when this returns, whatever the outcome.
    async fn run(
        &self,
        filename: &str,
        ext: &str,
        bytes: Vec<u8>,
        persist_as: Option<String>,
        started: Instant,
    ) -> Result<ConversionSuccess, GatewayError> {
        let size_bytes = bytes.len() as u64;
        let staged = self.workspace.stage(filename, &bytes).await?;
        drop(bytes);

        let kind = backend::select(ext);
        let backend = self.backends.get(kind);
        info!(
            filename = %filename,
            staged = %staged.name(),
            backend = backend.name(),
            size = size_bytes,
            "Converting"
        );

        let call = AssertUnwindSafe(backend.convert(staged.path())).catch_unwind();
        let text = match tokio::time::timeout(self.config.backend_timeout, call).await {
            Ok(Ok(Ok(text))) => text,
            Ok(Ok(Err(e))) => {
                warn!(filename = %filename, "Conversion failed: {e}");
                return Err(GatewayError::ConversionFailed {
                    filename: filename.to_string(),
                    detail: e.to_string(),
                });
            }
            Ok(Err(_panic)) => {
                warn!(filename = %filename, backend = backend.name(), "Backend panicked");
                return Err(GatewayError::ConversionFailed {
                    filename: filename.to_string(),
                    detail: "backend crashed".to_string(),
                });
            }
            Err(_) => {
                let secs = self.config.backend_timeout.as_secs();
                warn!(filename = %filename, secs, "Conversion timed out");
                return Err(GatewayError::Timeout {
                    filename: filename.to_string(),
                    secs,
                });
            }
        };

        let output = match persist_as {
            Some(stem) => Some(self.workspace.materialize_output(&stem, &text).await?),
            None => None,
        };

        let staged_name = staged.name().to_string();
        staged.release();

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            filename = %filename,
            chars = text.len(),
            duration_ms,
            "Conversion complete"
        );

        Ok(ConversionSuccess {
            filename: filename.to_string(),
            text,
            backend: kind,
            staged_name,
            output,
            size_bytes,
            duration_ms,
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Decode an inline payload.
pub fn decode_payload(payload: &str, encoding: PayloadEncoding) -> Result<Vec<u8>, GatewayError> {
    match encoding {
        PayloadEncoding::PlainText => Ok(payload.as_bytes().to_vec()),
        PayloadEncoding::Base64 => {
            let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| GatewayError::InvalidEncoding {
                    reason: e.to_string(),
                })
        }
    }
}

/// Output stem from a caller hint or an input filename: basename without a
/// trailing extension.
fn output_stem(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    Path::new(base)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| base.to_string())
}

/// Resolve `.` and `..` without touching the file system.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn canonical_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    roots
        .iter()
        .map(|root| match std::fs::canonicalize(root) {
            Ok(canonical) => canonical,
            Err(e) => {
                debug!(root = %root.display(), "Allowed root not resolvable: {e}");
                lexical_normalize(root)
            }
        })
        .collect()
}

/// Category used by [`Gateway::list_supported_formats`].
fn category_of(ext: &str) -> &'static str {
    match ext {
        "pdf" | "docx" | "doc" | "odt" | "rtf" => "documents",
        "xlsx" | "xls" | "csv" | "tsv" | "ods" => "spreadsheets",
        "pptx" | "ppt" | "odp" => "presentations",
        "html" | "htm" | "xhtml" | "xml" => "web",
        "txt" | "md" | "markdown" | "rst" | "log" => "text",
        "json" | "yaml" | "yml" | "toml" | "ini" => "data",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_decoding_tolerates_whitespace() {
        let bytes = decode_payload("aGVs\nbG8g\r\nd29y bGQ=", PayloadEncoding::Base64).unwrap();
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn invalid_base64_is_a_decoding_error() {
        let err = decode_payload("not*base64!", PayloadEncoding::Base64).unwrap_err();
        assert!(matches!(err, GatewayError::InvalidEncoding { .. }));
        assert!(err.to_string().starts_with("Invalid base64 content"));
    }

    #[test]
    fn plain_text_is_never_guessed_as_base64() {
        let bytes = decode_payload("aGVsbG8=", PayloadEncoding::PlainText).unwrap();
        assert_eq!(bytes, b"aGVsbG8=");
    }

    #[test]
    fn encoding_deserialises_snake_case() {
        let enc: PayloadEncoding = serde_json::from_str("\"plain_text\"").unwrap();
        assert_eq!(enc, PayloadEncoding::PlainText);
        assert_eq!(PayloadEncoding::default(), PayloadEncoding::Base64);
    }

    #[test]
    fn output_stem_drops_directories_and_extension() {
        assert_eq!(output_stem("report.pdf"), "report");
        assert_eq!(output_stem("dir/summary.final.md"), "summary.final");
        assert_eq!(output_stem("notes"), "notes");
    }

    #[test]
    fn output_stem_handles_non_ascii_and_padded_hints() {
        assert_eq!(output_stem("a.b\u{3000}"), "a");
        assert_eq!(output_stem("résumé.pdf "), "résumé");
        assert_eq!(output_stem("日本語.docx"), "日本語");
        assert_eq!(output_stem("数据"), "数据");
    }

    #[test]
    fn lexical_normalize_resolves_parents() {
        assert_eq!(
            lexical_normalize(Path::new("/tmp/a/../../etc/passwd")),
            PathBuf::from("/etc/passwd")
        );
        assert_eq!(
            lexical_normalize(Path::new("/tmp/./x.txt")),
            PathBuf::from("/tmp/x.txt")
        );
    }

    #[test]
    fn categories() {
        assert_eq!(category_of("pdf"), "documents");
        assert_eq!(category_of("xlsx"), "spreadsheets");
        assert_eq!(category_of("pptx"), "presentations");
        assert_eq!(category_of("html"), "web");
        assert_eq!(category_of("txt"), "text");
        assert_eq!(category_of("json"), "data");
        assert_eq!(category_of("eml"), "other");
    }
}
