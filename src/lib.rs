//! # docbridge
//!
//! A document-conversion gateway: accepts a file by server-resident path or
//! as an encoded payload, routes it to a text-extraction backend chosen by
//! file type, and returns normalised Markdown through one uniform response
//! contract.
//!
//! ## Request Flow
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Decode    inline payloads only (base64 or plain text, explicit)
//!  ├─ 2. Access    path requests: absolute, canonical, inside allowed roots
//!  ├─ 3. Validate  extension allow-list + size ceiling, before any write
//!  ├─ 4. Stage     unique `<token>_<basename>` under the workspace uploads/
//!  ├─ 5. Convert   PDF → pdfium text layer (+ optional vision OCR)
//!  │               other → text / HTML / DOCX / XLSX / PPTX readers
//!  ├─ 6. Polish    deterministic Markdown normalisation
//!  ├─ 7. Persist   path requests (or when an output name is given)
//!  └─ 8. Release   staged input removed on every exit path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docbridge::{Gateway, GatewayConfig, PayloadEncoding, ToolResponse};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::new(GatewayConfig::default())?;
//!
//!     let result = gateway
//!         .convert_from_content("notes.txt", "aGVsbG8=", PayloadEncoding::Base64, None)
//!         .await;
//!     println!("{}", ToolResponse::from_result(&result).render_text());
//!
//!     gateway.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP endpoints ([`server`]) |
//! | `cli`    | on      | the `docbridge` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable both when embedding the gateway as a library:
//! ```toml
//! docbridge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod response;
#[cfg(feature = "server")]
pub mod server;
pub mod workspace;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendKind, Backends, ConversionBackend};
pub use config::{GatewayConfig, GatewayConfigBuilder, PageSeparator};
pub use error::{BackendError, ErrorKind, GatewayError};
pub use gateway::{
    ConversionRequest, ConversionSuccess, Gateway, InlineContent, PayloadEncoding,
    ServerPathRequest, ServiceInfo, SupportedFormats, SweepReport,
};
pub use policy::ValidationPolicy;
pub use response::ToolResponse;
pub use workspace::{OutputArtifact, StagedFile, Workspace};
