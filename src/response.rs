//! Uniform response contract for every conversion operation.
//!
//! Whatever happened inside the gateway, a caller receives exactly one
//! [`ToolResponse`]: `ok` plus a human-readable `message`, and on success the
//! converted text and where it was saved. Failures carry only
//! [`GatewayError::user_message`], never debug output or staging paths.

use crate::backend::BackendKind;
use crate::error::{ErrorKind, GatewayError};
use crate::gateway::ConversionSuccess;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const SUCCESS_MESSAGE: &str = "Conversion successful!";
const CONTENT_MARKER: &str = "--- MARKDOWN CONTENT ---";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub backend: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error_kind: Option<ErrorKind>,
}

impl ToolResponse {
    pub fn from_conversion(success: &ConversionSuccess) -> Self {
        Self {
            ok: true,
            message: SUCCESS_MESSAGE.to_string(),
            filename: Some(success.filename.clone()),
            content: Some(success.text.clone()),
            output_path: success.output.as_ref().map(|o| o.path.clone()),
            backend: Some(success.backend),
            error_kind: None,
        }
    }

    pub fn from_error(err: &GatewayError) -> Self {
        Self {
            ok: false,
            message: err.user_message(),
            filename: None,
            content: None,
            output_path: None,
            backend: None,
            error_kind: Some(err.kind()),
        }
    }

    pub fn from_result(result: &Result<ConversionSuccess, GatewayError>) -> Self {
        match result {
            Ok(success) => Self::from_conversion(success),
            Err(err) => Self::from_error(err),
        }
    }

    /// Status-text rendering.
    ///
    /// ```text
    /// Conversion successful!
    /// Output saved to: /tmp/docbridge_x/outputs/report_1a2b3c4d.md
    ///
    /// --- MARKDOWN CONTENT ---
    /// # Report
    /// ```
    pub fn render_text(&self) -> String {
        if !self.ok {
            return format!("Error: {}", self.message);
        }

        let mut out = self.message.clone();
        if let Some(path) = &self.output_path {
            out.push_str(&format!("\nOutput saved to: {}", path.display()));
        }
        if let Some(content) = &self.content {
            out.push_str("\n\n");
            out.push_str(CONTENT_MARKER);
            out.push('\n');
            out.push_str(content);
        }
        out
    }
}
