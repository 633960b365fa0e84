//! Conversion backends and the policy that picks one.
//!
//! ```text
//! ext ──select()──► BackendKind ──Backends::get()──► Arc<dyn ConversionBackend>
//!   pdf                StructuredDocument              PdfBackend
//!   anything else      GeneralPurpose                  GeneralBackend
//! ```
//!
//! Selection is a pure function of the extension. The orchestrator only
//! talks to the [`ConversionBackend`] trait, so tests can swap in fakes via
//! [`Backends::new`].

pub mod general;
pub mod html;
pub mod normalize;
pub mod office;
pub mod pdf;
pub mod vision;

use crate::config::GatewayConfig;
use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use general::GeneralBackend;
pub use pdf::PdfBackend;

/// Which family of backend handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Layout-aware extraction for paginated documents (PDF).
    StructuredDocument,
    /// Everything else.
    GeneralPurpose,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::StructuredDocument => "structured_document",
            BackendKind::GeneralPurpose => "general_purpose",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the backend family for a normalised extension.
pub fn select(ext: &str) -> BackendKind {
    if ext.eq_ignore_ascii_case("pdf") {
        BackendKind::StructuredDocument
    } else {
        BackendKind::GeneralPurpose
    }
}

/// Turns a staged file into text.
///
/// Implementations must not retain or move the file; the orchestrator owns
/// its lifetime and removes it once `convert` returns (or is cancelled).
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Final text for the staged file. The gateway returns it unchanged, so
    /// implementations normalise their own output.
    async fn convert(&self, path: &Path) -> Result<String, BackendError>;
}

/// One backend per [`BackendKind`].
#[derive(Clone)]
pub struct Backends {
    structured: Arc<dyn ConversionBackend>,
    general: Arc<dyn ConversionBackend>,
}

impl Backends {
    pub fn new(
        structured: Arc<dyn ConversionBackend>,
        general: Arc<dyn ConversionBackend>,
    ) -> Self {
        Self {
            structured,
            general,
        }
    }

    /// The production backends.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            Arc::new(PdfBackend::from_config(config)),
            Arc::new(GeneralBackend::new()),
        )
    }

    pub fn get(&self, kind: BackendKind) -> &Arc<dyn ConversionBackend> {
        match kind {
            BackendKind::StructuredDocument => &self.structured,
            BackendKind::GeneralPurpose => &self.general,
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("structured", &self.structured.name())
            .field("general", &self.general.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_goes_to_structured_backend() {
        assert_eq!(select("pdf"), BackendKind::StructuredDocument);
        assert_eq!(select("PDF"), BackendKind::StructuredDocument);
    }

    #[test]
    fn everything_else_is_general() {
        for ext in ["docx", "doc", "txt", "html", "xlsx", "pptx", "md", ""] {
            assert_eq!(select(ext), BackendKind::GeneralPurpose, "{ext}");
        }
    }

    #[test]
    fn kind_serialises_snake_case() {
        let json = serde_json::to_string(&BackendKind::StructuredDocument).unwrap();
        assert_eq!(json, "\"structured_document\"");
        assert_eq!(BackendKind::GeneralPurpose.to_string(), "general_purpose");
    }

    #[test]
    fn production_backends_are_wired_by_kind() {
        let backends = Backends::from_config(&GatewayConfig::default());
        assert_eq!(backends.get(BackendKind::StructuredDocument).name(), "pdf");
        assert_eq!(backends.get(BackendKind::GeneralPurpose).name(), "general");
    }
}
