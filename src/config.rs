//! Configuration for the conversion gateway.
//!
//! Everything the gateway decides at startup lives in [`GatewayConfig`],
//! built via [`GatewayConfigBuilder`]. The config is fixed for the lifetime of
//! a [`crate::gateway::Gateway`]; nothing in it is mutable at runtime.

use crate::error::GatewayError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Extensions accepted when none are configured.
pub const DEFAULT_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt", "html", "xlsx", "pptx"];

/// 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Roots a server-resident path may live under when none are configured.
pub const DEFAULT_ALLOWED_ROOTS: &[&str] = &["/tmp", "/shared"];

/// Configuration for a [`crate::gateway::Gateway`].
///
/// # Example
/// ```rust
/// use docbridge::GatewayConfig;
/// use std::time::Duration;
///
/// let config = GatewayConfig::builder()
///     .allowed_extensions(["pdf", "md"])
///     .max_file_size(10 * 1024 * 1024)
///     .output_retention(Duration::from_secs(1800))
///     .build()
///     .unwrap();
/// assert!(config.allowed_extensions.contains("md"));
/// ```
#[derive(Clone)]
pub struct GatewayConfig {
    /// Accepted file extensions, lower-case without the leading dot.
    pub allowed_extensions: BTreeSet<String>,

    /// Maximum payload size in bytes. Default: 50 MiB.
    pub max_file_size: u64,

    /// Directories a server-resident path must resolve inside.
    /// Default: `/tmp` and `/shared`.
    pub allowed_roots: Vec<PathBuf>,

    /// Output artifacts strictly older than this are removed by a sweep.
    /// Default: one hour.
    pub output_retention: Duration,

    /// Upper bound on a single backend call. Default: 300 s.
    ///
    /// On expiry the caller gets a timeout failure and the staged input is
    /// still released.
    pub backend_timeout: Duration,

    /// Prefix for the per-process workspace directory. Default: `docbridge_`.
    pub workspace_prefix: String,

    /// Directory under which the workspace is created. Default: system temp dir.
    pub workspace_parent: Option<PathBuf>,

    /// Run vision OCR on PDF pages without a usable text layer. Default: false.
    pub pdf_ocr: bool,

    /// Non-whitespace characters below which a PDF page counts as scanned.
    /// Default: 100.
    pub ocr_min_chars: usize,

    /// Concurrent OCR calls per document. Default: 4.
    pub ocr_concurrency: usize,

    /// Longest edge in pixels of a page rendered for OCR. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Vision model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed vision provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for OCR transcription. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries on a failed OCR call. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call OCR timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Separator between PDF pages in the extracted text. Default: blank line.
    pub page_separator: PageSeparator,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_roots: DEFAULT_ALLOWED_ROOTS.iter().map(PathBuf::from).collect(),
            output_retention: Duration::from_secs(3600),
            backend_timeout: Duration::from_secs(300),
            workspace_prefix: "docbridge_".to_string(),
            workspace_parent: None,
            pdf_ocr: false,
            ocr_min_chars: 100,
            ocr_concurrency: 4,
            max_rendered_pixels: 2000,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            page_separator: PageSeparator::default(),
        }
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("allowed_extensions", &self.allowed_extensions)
            .field("max_file_size", &self.max_file_size)
            .field("allowed_roots", &self.allowed_roots)
            .field("output_retention", &self.output_retention)
            .field("backend_timeout", &self.backend_timeout)
            .field("workspace_prefix", &self.workspace_prefix)
            .field("workspace_parent", &self.workspace_parent)
            .field("pdf_ocr", &self.pdf_ocr)
            .field("ocr_min_chars", &self.ocr_min_chars)
            .field("ocr_concurrency", &self.ocr_concurrency)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_retries", &self.max_retries)
            .field("page_separator", &self.page_separator)
            .finish()
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Lower-case an extension and drop a leading dot: `".PDF"` → `"pdf"`.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn allowed_roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.config.allowed_roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn output_retention(mut self, d: Duration) -> Self {
        self.config.output_retention = d;
        self
    }

    pub fn backend_timeout(mut self, d: Duration) -> Self {
        self.config.backend_timeout = d;
        self
    }

    pub fn workspace_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.workspace_prefix = prefix.into();
        self
    }

    pub fn workspace_parent(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workspace_parent = Some(dir.into());
        self
    }

    pub fn pdf_ocr(mut self, v: bool) -> Self {
        self.config.pdf_ocr = v;
        self
    }

    pub fn ocr_min_chars(mut self, n: usize) -> Self {
        self.config.ocr_min_chars = n;
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr_concurrency = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GatewayConfig, GatewayError> {
        let c = &self.config;
        if c.allowed_extensions.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "At least one accepted extension is required".into(),
            ));
        }
        if c.max_file_size == 0 {
            return Err(GatewayError::InvalidConfig(
                "Maximum file size must be > 0".into(),
            ));
        }
        if c.backend_timeout.is_zero() {
            return Err(GatewayError::InvalidConfig(
                "Backend timeout must be > 0".into(),
            ));
        }
        if let Some(root) = c.allowed_roots.iter().find(|r| !r.is_absolute()) {
            return Err(GatewayError::InvalidConfig(format!(
                "Allowed root must be absolute, got {}",
                root.display()
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How to separate pages in text extracted from a PDF.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
