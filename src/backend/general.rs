//! General-purpose backend: everything that is not a PDF.
//!
//! Dispatch is on the staged file's extension. Reading and parsing are
//! blocking, so the whole conversion runs in `spawn_blocking`.

use crate::backend::normalize::normalize_markdown;
use crate::backend::{html, office, ConversionBackend};
use crate::error::BackendError;
use crate::policy::extension_of;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Extensions returned as text without interpretation.
pub const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "log", "csv", "tsv", "json", "yaml", "yml", "toml", "xml",
    "ini",
];

/// How a given extension is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reader {
    PlainText,
    Html,
    Docx,
    Xlsx,
    Pptx,
    /// Legacy binary Word; recognised but not readable.
    LegacyWord,
    /// Unknown extension: accepted only if the bytes are UTF-8.
    Sniff,
}

impl Reader {
    pub fn for_extension(ext: &str) -> Self {
        match ext {
            e if PLAIN_TEXT_EXTENSIONS.contains(&e) => Reader::PlainText,
            "html" | "htm" | "xhtml" => Reader::Html,
            "docx" => Reader::Docx,
            "xlsx" => Reader::Xlsx,
            "pptx" => Reader::Pptx,
            "doc" => Reader::LegacyWord,
            _ => Reader::Sniff,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GeneralBackend;

impl GeneralBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversionBackend for GeneralBackend {
    fn name(&self) -> &str {
        "general"
    }

    async fn convert(&self, path: &Path) -> Result<String, BackendError> {
        let path = path.to_path_buf();
        let raw = tokio::task::spawn_blocking(move || convert_file(&path))
            .await
            .map_err(|e| BackendError::Engine(format!("Conversion task panicked: {}", e)))??;
        Ok(normalize_markdown(&raw))
    }
}

/// Convert a file on disk, choosing the reader by extension.
pub fn convert_file(path: &Path) -> Result<String, BackendError> {
    let name = path.to_string_lossy();
    let ext = extension_of(&name).unwrap_or_default();
    let reader = Reader::for_extension(&ext);
    debug!(reader = ?reader, "Reading {}", path.display());

    let bytes = std::fs::read(path)?;
    convert_bytes(reader, &ext, &bytes)
}

/// Convert raw bytes with an explicit reader.
pub fn convert_bytes(reader: Reader, ext: &str, bytes: &[u8]) -> Result<String, BackendError> {
    match reader {
        Reader::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Reader::Html => Ok(html::html_to_markdown(&String::from_utf8_lossy(bytes))),
        Reader::Docx => office::docx_to_markdown(bytes),
        Reader::Xlsx => office::xlsx_to_markdown(bytes),
        Reader::Pptx => office::pptx_to_markdown(bytes),
        Reader::LegacyWord => Err(BackendError::Unsupported(
            "legacy .doc (binary Word) files cannot be read; save as .docx".into(),
        )),
        Reader::Sniff => match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => Err(BackendError::Unsupported(if ext.is_empty() {
                "binary file without extension".to_string()
            } else {
                format!("no reader for binary .{ext} files")
            })),
        },
    }
}
