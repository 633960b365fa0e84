//! Structured-document backend: PDF text layer via pdfium.
//!
//! pdfium is a C++ library with thread-local state, so every call runs inside
//! `spawn_blocking` with its own binding. Each page's text layer is read in
//! order; with OCR enabled, pages whose layer is too sparse to be real text
//! (scans, image-only slides) are rendered in the same pass and handed to
//! [`VisionOcr`] afterwards.
//!
//! Rendering is capped by `max_rendered_pixels` on the longest edge rather
//! than by DPI, so an A0 poster costs the same memory as a letter page.

use crate::backend::normalize::normalize_markdown;
use crate::backend::vision::VisionOcr;
use crate::backend::ConversionBackend;
use crate::config::{GatewayConfig, PageSeparator};
use crate::error::BackendError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// PDF backend.
pub struct PdfBackend {
    ocr: Option<VisionOcr>,
    ocr_min_chars: usize,
    max_rendered_pixels: u32,
    separator: PageSeparator,
}

impl PdfBackend {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            ocr: config.pdf_ocr.then(|| VisionOcr::from_config(config)),
            ocr_min_chars: config.ocr_min_chars,
            max_rendered_pixels: config.max_rendered_pixels,
            separator: config.page_separator.clone(),
        }
    }

    /// Text layer only, no OCR.
    pub fn text_only() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// One page as read from the text layer.
struct PageText {
    index: usize,
    text: String,
    /// Present only when OCR is on and the text layer was sparse.
    render: Option<DynamicImage>,
}

#[async_trait]
impl ConversionBackend for PdfBackend {
    fn name(&self) -> &str {
        "pdf"
    }

    async fn convert(&self, path: &Path) -> Result<String, BackendError> {
        let path = path.to_path_buf();
        let render_below = self.ocr.as_ref().map(|_| self.ocr_min_chars);
        let max_px = self.max_rendered_pixels;

        let mut pages = tokio::task::spawn_blocking(move || {
            extract_pages_blocking(&path, render_below, max_px)
        })
        .await
        .map_err(|e| BackendError::Engine(format!("PDF task panicked: {}", e)))??;

        if let Some(ocr) = &self.ocr {
            let rendered: Vec<(usize, DynamicImage)> = pages
                .iter_mut()
                .filter_map(|p| p.render.take().map(|img| (p.index, img)))
                .collect();

            if !rendered.is_empty() {
                info!("Running OCR on {} sparse page(s)", rendered.len());
                for (idx, result) in ocr.transcribe_pages(rendered).await {
                    match result {
                        Ok(text) if !text.trim().is_empty() => pages[idx].text = text,
                        Ok(_) => debug!("Page {}: OCR returned nothing", idx + 1),
                        Err(e) => warn!("Page {}: keeping text layer, {}", idx + 1, e),
                    }
                }
            }
        }

        Ok(normalize_markdown(&join_pages(&pages, &self.separator)))
    }
}

fn join_pages(pages: &[PageText], separator: &PageSeparator) -> String {
    let mut out = String::new();
    for page in pages {
        let text = page.text.trim();
        if page.index > 0 {
            out.push_str(&separator.render(page.index + 1));
        }
        out.push_str(text);
    }
    out
}

fn non_whitespace_chars(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

/// Read every page's text layer; render the sparse ones when asked.
///
/// `render_below`: render pages with fewer non-whitespace characters than
/// this. `None` disables rendering.
fn extract_pages_blocking(
    path: &Path,
    render_below: Option<usize>,
    max_px: u32,
) -> Result<Vec<PageText>, BackendError> {
    let pdfium = pdfium_auto::bind_pdfium_silent()
        .map_err(|e| BackendError::Engine(format!("PDFium unavailable: {e}")))?;

    let document = pdfium.load_pdf_from_file(path, None).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.contains("Password") || detail.contains("password") {
            BackendError::PasswordRequired
        } else {
            BackendError::Corrupt(detail)
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_px as i32)
        .set_maximum_height(max_px as i32);

    let mut out = Vec::with_capacity(total);
    for idx in 0..total {
        let page = pages
            .get(idx as u16)
            .map_err(|e| BackendError::Corrupt(format!("page {}: {:?}", idx + 1, e)))?;

        let text = match page.text() {
            Ok(t) => t.all(),
            Err(e) => {
                warn!("Page {}: no text layer ({:?})", idx + 1, e);
                String::new()
            }
        };

        let render = match render_below {
            Some(min) if non_whitespace_chars(&text) < min => {
                match page.render_with_config(&render_config) {
                    Ok(bitmap) => {
                        let image = bitmap.as_image();
                        debug!(
                            "Rendered page {} → {}x{} px",
                            idx + 1,
                            image.width(),
                            image.height()
                        );
                        Some(image)
                    }
                    Err(e) => {
                        warn!("Page {}: render failed, OCR skipped ({:?})", idx + 1, e);
                        None
                    }
                }
            }
            _ => None,
        };

        out.push(PageText {
            index: idx,
            text,
            render,
        });
    }

    Ok(out)
}
