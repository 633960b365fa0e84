//! Integration tests for the conversion gateway.
//!
//! Most tests swap in fake backends so they exercise staging, validation
//! and cleanup without PDFium. The real general-purpose backend is used for
//! text and HTML. PDF tests need the PDFium library and are gated behind
//! `DOCBRIDGE_PDFIUM_TESTS`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use docbridge::{
    BackendError, BackendKind, Backends, ConversionBackend, ErrorKind, Gateway, GatewayConfig,
    GatewayError, PayloadEncoding, ToolResponse,
};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// ── Fake backends ────────────────────────────────────────────────────────────

/// Returns the staged file's contents and remembers where it was staged.
#[derive(Default)]
struct EchoBackend {
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl ConversionBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    async fn convert(&self, path: &Path) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(path.to_path_buf());
        let bytes = tokio::fs::read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

struct FailingBackend;

#[async_trait]
impl ConversionBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn convert(&self, _path: &Path) -> Result<String, BackendError> {
        Err(BackendError::Corrupt("bad header".into()))
    }
}

struct HangingBackend;

#[async_trait]
impl ConversionBackend for HangingBackend {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn convert(&self, _path: &Path) -> Result<String, BackendError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

struct PanickingBackend;

#[async_trait]
impl ConversionBackend for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn convert(&self, _path: &Path) -> Result<String, BackendError> {
        panic!("parser blew up");
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config_in(dir: &TempDir) -> docbridge::GatewayConfigBuilder {
    let root = dir.path().canonicalize().unwrap();
    GatewayConfig::builder()
        .workspace_parent(&root)
        .allowed_roots([root])
        .allowed_extensions(["pdf", "txt", "md", "html", "docx"])
}

fn gateway_with(dir: &TempDir, general: Arc<dyn ConversionBackend>) -> Gateway {
    let structured: Arc<dyn ConversionBackend> = Arc::new(FailingBackend);
    Gateway::with_backends(
        config_in(dir).build().unwrap(),
        Backends::new(structured, general),
    )
    .unwrap()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

// ── Validation ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsupported_extension_is_rejected_before_any_write() {
    let dir = TempDir::new().unwrap();
    let echo = Arc::new(EchoBackend::default());
    let gw = gateway_with(&dir, echo.clone());

    let err = gw
        .convert_from_content("malware.exe", b64(b"MZ"), PayloadEncoding::Base64, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::UnsupportedType { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(err.to_string().to_lowercase().contains("unsupported"));
    assert!(err.to_string().contains("malware.exe"));
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
    assert!(entries(gw.workspace().outputs_dir()).is_empty());
}

#[tokio::test]
async fn oversize_payload_is_rejected_before_staging() {
    let dir = TempDir::new().unwrap();
    let echo = Arc::new(EchoBackend::default());
    let structured: Arc<dyn ConversionBackend> = Arc::new(FailingBackend);
    let gw = Gateway::with_backends(
        config_in(&dir).max_file_size(16).build().unwrap(),
        Backends::new(structured, echo.clone()),
    )
    .unwrap();

    let err = gw
        .convert_from_content("big.txt", "x".repeat(17), PayloadEncoding::PlainText, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::TooLarge { size: 17, limit: 16 }));
    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());

    // Exactly at the limit is fine.
    let ok = gw
        .convert_from_content("fits.txt", "x".repeat(16), PayloadEncoding::PlainText, None)
        .await
        .unwrap();
    assert_eq!(ok.size_bytes, 16);
}

#[tokio::test]
async fn malformed_base64_is_a_decoding_error() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let err = gw
        .convert_from_content("a.txt", "%%%not base64%%%", PayloadEncoding::Base64, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::InvalidEncoding { .. }));
    assert_eq!(err.kind(), ErrorKind::Decoding);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

// ── Staging lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn staged_input_is_removed_after_success() {
    let dir = TempDir::new().unwrap();
    let echo = Arc::new(EchoBackend::default());
    let gw = gateway_with(&dir, echo.clone());

    let out = gw
        .convert_from_content("notes.txt", b64(b"hello"), PayloadEncoding::Base64, None)
        .await
        .unwrap();

    assert_eq!(out.text, "hello");
    assert_eq!(out.backend, BackendKind::GeneralPurpose);
    assert!(out.output.is_none());

    let seen = echo.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with(gw.workspace().uploads_dir()));
    assert!(!seen[0].exists());
    assert!(out.staged_name.ends_with("_notes.txt"));
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

#[tokio::test]
async fn staged_input_is_removed_after_backend_failure() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(FailingBackend));

    let err = gw
        .convert_from_content("notes.txt", "hi", PayloadEncoding::PlainText, None)
        .await
        .unwrap_err();

    match &err {
        GatewayError::ConversionFailed { filename, detail } => {
            assert_eq!(filename, "notes.txt");
            assert!(detail.contains("bad header"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::Conversion);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

#[tokio::test]
async fn backend_timeout_releases_staged_input() {
    let dir = TempDir::new().unwrap();
    let structured: Arc<dyn ConversionBackend> = Arc::new(FailingBackend);
    let gw = Gateway::with_backends(
        config_in(&dir)
            .backend_timeout(Duration::from_millis(150))
            .build()
            .unwrap(),
        Backends::new(structured, Arc::new(HangingBackend)),
    )
    .unwrap();

    let err = gw
        .convert_from_content("slow.txt", "zzz", PayloadEncoding::PlainText, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::Timeout { .. }));
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

#[tokio::test]
async fn backend_panic_becomes_conversion_failure() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(PanickingBackend));

    let err = gw
        .convert_from_content("boom.txt", "x", PayloadEncoding::PlainText, None)
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        GatewayError::ConversionFailed { detail, .. } if detail == "backend crashed"
    ));
    assert!(entries(gw.workspace().uploads_dir()).is_empty());

    // The gateway keeps serving.
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));
    assert!(gw
        .convert_from_content("ok.txt", "fine", PayloadEncoding::PlainText, None)
        .await
        .is_ok());
}

#[tokio::test]
async fn identical_uploads_get_distinct_staged_names() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let a = gw
        .convert_from_content("same.txt", "payload", PayloadEncoding::PlainText, None)
        .await
        .unwrap();
    let b = gw
        .convert_from_content("same.txt", "payload", PayloadEncoding::PlainText, None)
        .await
        .unwrap();

    assert_eq!(a.text, b.text);
    assert_ne!(a.staged_name, b.staged_name);
}

#[tokio::test]
async fn concurrent_conversions_do_not_interfere() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let tasks = (0..16).map(|i| {
        let gw = gw.clone();
        tokio::spawn(async move {
            gw.convert_from_content(
                "doc.txt",
                format!("body {i}"),
                PayloadEncoding::PlainText,
                None,
            )
            .await
        })
    });
    let results = futures::future::join_all(tasks).await;

    let mut texts: Vec<String> = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().text)
        .collect();
    texts.sort();
    texts.dedup();
    assert_eq!(texts.len(), 16);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

// ── Server-resident paths ────────────────────────────────────────────────────

#[tokio::test]
async fn path_conversion_persists_output_and_leaves_source() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));
    let src = dir.path().canonicalize().unwrap().join("report.txt");
    std::fs::write(&src, "Quarterly numbers\n\nDone").unwrap();

    let out = gw.convert_from_path(&src, None).await.unwrap();

    assert_eq!(out.filename, "report.txt");
    assert_eq!(out.text, "Quarterly numbers\n\nDone");
    let artifact = out.output.expect("path conversions persist");
    assert!(artifact.path.starts_with(gw.workspace().outputs_dir()));
    assert!(artifact.name.starts_with("report_") && artifact.name.ends_with(".md"));
    assert_eq!(std::fs::read_to_string(&artifact.path).unwrap(), out.text);
    assert!(src.exists());

    let named = gw
        .convert_from_path(&src, Some("summary".into()))
        .await
        .unwrap();
    assert!(named.output.unwrap().name.starts_with("summary_"));
}

#[tokio::test]
async fn paths_outside_roots_are_denied() {
    let dir = TempDir::new().unwrap();
    let echo = Arc::new(EchoBackend::default());
    let gw = gateway_with(&dir, echo.clone());

    let err = gw.convert_from_path("/etc/passwd", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied { .. }));
    assert_eq!(err.kind(), ErrorKind::Access);

    // Traversal out of the root.
    let root = dir.path().canonicalize().unwrap();
    let sneaky = root.join("..").join("..").join("etc").join("passwd");
    let err = gw.convert_from_path(&sneaky, None).await.unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied { .. }));

    // Relative paths are never resolved against the working directory.
    let err = gw.convert_from_path("notes.txt", None).await.unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied { .. }));

    assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_escaping_root_is_denied() {
    let dir = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let target = outside.path().join("secret.txt");
    std::fs::write(&target, "secret").unwrap();

    let root = dir.path().canonicalize().unwrap();
    let link = root.join("link.txt");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));
    let err = gw.convert_from_path(&link, None).await.unwrap_err();
    assert!(matches!(err, GatewayError::AccessDenied { .. }));
}

#[tokio::test]
async fn missing_file_or_directory_inside_root_is_not_accessible() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));
    let root = dir.path().canonicalize().unwrap();

    let err = gw
        .convert_from_path(root.join("missing.txt"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotAccessible { .. }));

    let sub = root.join("folder.txt");
    std::fs::create_dir(&sub).unwrap();
    let err = gw.convert_from_path(&sub, None).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotAccessible { .. }));
}

#[tokio::test]
async fn path_with_disallowed_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));
    let src = dir.path().canonicalize().unwrap().join("tool.sh");
    std::fs::write(&src, "#!/bin/sh").unwrap();

    let err = gw.convert_from_path(&src, None).await.unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedType { .. }));
}

// ── Inline persistence ───────────────────────────────────────────────────────

#[tokio::test]
async fn inline_output_name_persists_result() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let out = gw
        .convert_from_content(
            "page.txt",
            "persist me",
            PayloadEncoding::PlainText,
            Some("kept.md".into()),
        )
        .await
        .unwrap();

    let artifact = out.output.unwrap();
    assert!(artifact.name.starts_with("kept_"));
    assert_eq!(
        std::fs::read_to_string(&artifact.path).unwrap(),
        "persist me"
    );

    let unnamed = gw
        .convert_from_content("page.txt", "x", PayloadEncoding::PlainText, None)
        .await
        .unwrap();
    let resp = ToolResponse::from_conversion(&unnamed);
    assert!(resp.output_path.is_none());
    assert!(!resp.render_text().contains("Output saved to"));
}

#[tokio::test]
async fn raw_bytes_take_the_inline_flow() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let out = gw
        .convert_bytes("raw.md", b"# Raw".to_vec(), None)
        .await
        .unwrap();
    assert_eq!(out.text, "# Raw");
    assert!(out.output.is_none());

    let err = gw
        .convert_bytes("raw.bin", vec![0; 4], None)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedType { .. }));
}

#[tokio::test]
async fn empty_files_reach_the_backend() {
    let dir = TempDir::new().unwrap();
    let echo = Arc::new(EchoBackend::default());
    let gw = gateway_with(&dir, echo.clone());

    let inline = gw
        .convert_from_content("empty.txt", "", PayloadEncoding::Base64, None)
        .await
        .unwrap();
    assert_eq!(inline.text, "");
    assert_eq!(inline.size_bytes, 0);
    assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());

    let src = dir.path().canonicalize().unwrap().join("blank.txt");
    File::create(&src).unwrap();
    let from_path = gw.convert_from_path(&src, None).await.unwrap();
    assert_eq!(from_path.text, "");
    assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

#[tokio::test]
async fn non_ascii_output_name_does_not_crash_the_request() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let task = {
        let gw = gw.clone();
        tokio::spawn(async move {
            gw.convert_from_content(
                "a.txt",
                b64(b"hi"),
                PayloadEncoding::Base64,
                Some("a.b\u{3000}".into()),
            )
            .await
        })
    };
    let out = task.await.expect("request task must not panic").unwrap();
    assert_eq!(out.text, "hi");
    assert!(out.output.unwrap().name.starts_with("a_"));

    let src = dir.path().canonicalize().unwrap().join("notes.txt");
    std::fs::write(&src, "x").unwrap();
    let named = gw
        .convert_from_path(&src, Some(" résumé.md ".into()))
        .await
        .unwrap();
    assert!(named.output.is_some());
}

// ── Real general-purpose backend ─────────────────────────────────────────────

#[tokio::test]
async fn base64_text_matches_direct_backend_conversion() {
    let dir = TempDir::new().unwrap();
    let gw = Gateway::new(config_in(&dir).build().unwrap()).unwrap();
    let body = b"0123456789";

    let out = gw
        .convert_from_content("ten.txt", b64(body), PayloadEncoding::Base64, None)
        .await
        .unwrap();

    let direct_path = dir.path().join("direct.txt");
    std::fs::write(&direct_path, body).unwrap();
    let direct = docbridge::backend::GeneralBackend::new()
        .convert(&direct_path)
        .await
        .unwrap();

    assert_eq!(out.text, direct);
    assert_eq!(out.text, "0123456789\n");
    assert_eq!(out.size_bytes, 10);
}

#[tokio::test]
async fn html_payload_becomes_markdown() {
    let dir = TempDir::new().unwrap();
    let gw = Gateway::new(config_in(&dir).build().unwrap()).unwrap();
    let html = "<html><body><h1>Title</h1><p>Some <strong>bold</strong> text.</p>\
                <ul><li>one</li><li>two</li></ul></body></html>";

    let out = gw
        .convert_from_content("page.html", b64(html.as_bytes()), PayloadEncoding::Base64, None)
        .await
        .unwrap();

    assert!(out.text.starts_with("# Title\n"));
    assert!(out.text.contains("**bold**"));
    assert!(out.text.contains("- one\n- two"));
}

#[tokio::test]
async fn corrupt_docx_is_a_conversion_failure() {
    let dir = TempDir::new().unwrap();
    let gw = Gateway::new(config_in(&dir).build().unwrap()).unwrap();

    let err = gw
        .convert_from_content("memo.docx", b64(b"not a zip"), PayloadEncoding::Base64, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::ConversionFailed { .. }));
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}

// ── Formats, info, sweep ─────────────────────────────────────────────────────

#[tokio::test]
async fn supported_formats_are_sorted_and_grouped() {
    let dir = TempDir::new().unwrap();
    let gw = Gateway::with_backends(
        config_in(&dir)
            .allowed_extensions([".TXT", "pdf", "docx"])
            .build()
            .unwrap(),
        Backends::new(Arc::new(FailingBackend), Arc::new(FailingBackend)),
    )
    .unwrap();

    let formats = gw.list_supported_formats();
    assert_eq!(formats.extensions, vec!["docx", "pdf", "txt"]);
    assert_eq!(formats.categories["documents"], vec!["docx", "pdf"]);
    assert_eq!(formats.categories["text"], vec!["txt"]);
}

#[tokio::test]
async fn service_info_reports_configuration() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));

    let info = gw.service_info();
    assert_eq!(info.name, "docbridge");
    assert_eq!(info.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(info.max_file_size_mb, 50);
    assert_eq!(info.output_retention_secs, 3600);
    assert_eq!(info.upload_dir, gw.workspace().uploads_dir());
    assert_eq!(info.output_dir, gw.workspace().outputs_dir());
    assert!(info.supported_formats.contains(&"pdf".to_string()));
}

#[tokio::test]
async fn sweep_removes_only_expired_outputs() {
    let dir = TempDir::new().unwrap();
    let structured: Arc<dyn ConversionBackend> = Arc::new(FailingBackend);
    let gw = Gateway::with_backends(
        config_in(&dir)
            .output_retention(Duration::from_secs(60 * 60))
            .build()
            .unwrap(),
        Backends::new(structured, Arc::new(EchoBackend::default())),
    )
    .unwrap();

    let now = SystemTime::now();
    for (stem, age_mins) in [("fresh", 30), ("stale", 61), ("ancient", 120)] {
        let artifact = gw
            .workspace()
            .materialize_output(stem, "x")
            .await
            .unwrap();
        File::options()
            .write(true)
            .open(&artifact.path)
            .unwrap()
            .set_modified(now - Duration::from_secs(age_mins * 60))
            .unwrap();
    }

    let report = gw.sweep_old_artifacts().await.unwrap();
    assert_eq!(report.removed, 2);
    assert_eq!(report.retention_secs, 3600);

    let left = entries(gw.workspace().outputs_dir());
    assert_eq!(left.len(), 1);
    assert!(left[0].starts_with("fresh_"));

    // Nothing further to remove.
    assert_eq!(gw.sweep_old_artifacts().await.unwrap().removed, 0);
}

#[tokio::test]
async fn shutdown_removes_workspace() {
    let dir = TempDir::new().unwrap();
    let gw = gateway_with(&dir, Arc::new(EchoBackend::default()));
    let root = gw.workspace().root().to_path_buf();
    assert!(root.is_dir());

    gw.shutdown();
    assert!(!root.exists());
}

// ── PDF (requires PDFium) ────────────────────────────────────────────────────

/// Skip unless `DOCBRIDGE_PDFIUM_TESTS` is set.
macro_rules! pdfium_skip_unless_enabled {
    () => {
        if std::env::var("DOCBRIDGE_PDFIUM_TESTS").is_err() {
            println!("SKIP — set DOCBRIDGE_PDFIUM_TESTS=1 to run PDF tests");
            return;
        }
    };
}

/// A one-page PDF showing `text` in Helvetica.
fn tiny_pdf(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        out.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn pdf_text_layer_is_extracted() {
    pdfium_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let gw = Gateway::new(config_in(&dir).build().unwrap()).unwrap();

    let out = gw
        .convert_from_content(
            "hello.pdf",
            b64(&tiny_pdf("Hello PDF")),
            PayloadEncoding::Base64,
            None,
        )
        .await
        .unwrap();

    assert_eq!(out.backend, BackendKind::StructuredDocument);
    assert!(out.text.contains("Hello PDF"), "got: {:?}", out.text);
}

#[tokio::test(flavor = "multi_thread")]
async fn corrupt_pdf_is_a_conversion_failure() {
    pdfium_skip_unless_enabled!();
    let dir = TempDir::new().unwrap();
    let gw = Gateway::new(config_in(&dir).build().unwrap()).unwrap();

    let err = gw
        .convert_from_content("broken.pdf", b64(b"%PDF-garbage"), PayloadEncoding::Base64, None)
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::ConversionFailed { .. }));
    assert!(entries(gw.workspace().uploads_dir()).is_empty());
}
