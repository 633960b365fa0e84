//! Vision OCR for PDF pages that have no usable text layer.
//!
//! A scanned page renders to an image; the image is sent as a base64 PNG to
//! a vision-capable model through `edgequake-llm`, and the reply is cleaned
//! with [`clean_transcription`]. Calls are retried with exponential backoff
//! (`retry_backoff_ms * 2^(attempt-1)`), each bounded by `api_timeout_secs`.
//!
//! The provider is resolved on first use, not at startup: a gateway with OCR
//! enabled but no credentials still converts text-layer PDFs, and only logs
//! a warning the first time a scanned page shows up.

use crate::backend::normalize::clean_transcription;
use crate::config::GatewayConfig;
use crate::error::BackendError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, info, warn};

/// Model used when a provider is named without one.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-nano";

/// System prompt for transcribing one scanned page.
pub const OCR_SYSTEM_PROMPT: &str = r#"You transcribe a scanned document page into clean Markdown.

Rules:
- Preserve ALL text exactly, in natural reading order.
- Use # / ## / ### for headings that are visually headings.
- Use - for bullet lists and 1. 2. 3. for numbered lists.
- Convert tables to GFM pipe tables.
- Skip page numbers and running headers/footers.
- Output ONLY the Markdown. No commentary, no ```markdown fences."#;

/// Per-call settings copied out of [`GatewayConfig`].
#[derive(Clone)]
struct VisionSettings {
    provider: Option<Arc<dyn LLMProvider>>,
    provider_name: Option<String>,
    model: Option<String>,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
    concurrency: usize,
}

/// Lazily-connected vision transcriber.
pub struct VisionOcr {
    settings: VisionSettings,
    resolved: OnceCell<Option<Arc<dyn LLMProvider>>>,
}

impl VisionOcr {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            settings: VisionSettings {
                provider: config.provider.clone(),
                provider_name: config.provider_name.clone(),
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                max_retries: config.max_retries,
                retry_backoff_ms: config.retry_backoff_ms,
                api_timeout: Duration::from_secs(config.api_timeout_secs.max(1)),
                concurrency: config.ocr_concurrency.max(1),
            },
            resolved: OnceCell::new(),
        }
    }

    /// The provider, resolving it on first call. `None` if none is configured.
    async fn provider(&self) -> Option<Arc<dyn LLMProvider>> {
        self.resolved
            .get_or_init(|| async {
                match resolve_provider(&self.settings) {
                    Ok(p) => {
                        info!("Vision provider resolved");
                        Some(p)
                    }
                    Err(e) => {
                        warn!("Vision OCR disabled: {e}");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Transcribe rendered pages, `concurrency` at a time.
    ///
    /// Results come back in arbitrary order, one per input page, keyed by the
    /// 0-based page index.
    pub async fn transcribe_pages(
        &self,
        pages: Vec<(usize, DynamicImage)>,
    ) -> Vec<(usize, Result<String, BackendError>)> {
        let Some(provider) = self.provider().await else {
            return pages
                .into_iter()
                .map(|(idx, _)| {
                    (
                        idx,
                        Err(BackendError::Engine("no vision provider available".into())),
                    )
                })
                .collect();
        };

        let settings = &self.settings;
        stream::iter(pages.into_iter().map(|(idx, img)| {
            let provider = Arc::clone(&provider);
            async move {
                let page_num = idx + 1;
                let result = match encode_page(&img) {
                    Ok(data) => transcribe_page(&provider, page_num, data, settings).await,
                    Err(e) => Err(BackendError::Engine(format!(
                        "page {page_num}: PNG encoding failed: {e}"
                    ))),
                };
                (idx, result)
            }
        }))
        .buffer_unordered(settings.concurrency)
        .collect()
        .await
    }
}

/// Encode a rendered page as a base64 PNG `ImageData`.
///
/// PNG keeps rendered glyph edges crisp; `detail: "high"` lets the model see
/// fine print.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

async fn transcribe_page(
    provider: &Arc<dyn LLMProvider>,
    page_num: usize,
    image: ImageData,
    settings: &VisionSettings,
) -> Result<String, BackendError> {
    let messages = vec![
        ChatMessage::system(OCR_SYSTEM_PROMPT),
        ChatMessage::user_with_images("", vec![image]),
    ];
    let options = build_options(settings);

    let mut last_err = String::from("unknown error");

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = settings.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "Page {}: OCR retry {}/{} after {}ms",
                page_num, attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match timeout(settings.api_timeout, provider.chat(&messages, Some(&options))).await {
            Ok(Ok(response)) => {
                debug!(
                    "Page {}: OCR {} input tokens, {} output tokens",
                    page_num, response.prompt_tokens, response.completion_tokens
                );
                return Ok(clean_transcription(&response.content));
            }
            Ok(Err(e)) => last_err = e.to_string(),
            Err(_) => {
                last_err = format!("no reply within {}s", settings.api_timeout.as_secs())
            }
        }
        warn!("Page {}: OCR attempt {} failed: {}", page_num, attempt + 1, last_err);
    }

    Err(BackendError::Engine(format!(
        "page {page_num}: OCR failed after {} retries: {last_err}",
        settings.max_retries
    )))
}

fn build_options(settings: &VisionSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

/// Resolve the provider, most specific source first:
///
/// 1. A pre-built provider from the config
/// 2. `provider_name` + `model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 4. `OPENAI_API_KEY` → OpenAI
/// 5. `ProviderFactory::from_env` auto-detection
fn resolve_provider(settings: &VisionSettings) -> Result<Arc<dyn LLMProvider>, BackendError> {
    if let Some(ref provider) = settings.provider {
        return Ok(Arc::clone(provider));
    }

    let model = settings.model.as_deref().unwrap_or(DEFAULT_VISION_MODEL);

    if let Some(ref name) = settings.provider_name {
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_vision_provider(&prov, &env_model);
        }
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        return create_vision_provider("openai", model);
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
        BackendError::Engine(format!(
            "no vision provider could be auto-detected (set OPENAI_API_KEY or \
             EDGEQUAKE_LLM_PROVIDER): {e}"
        ))
    })?;
    Ok(llm)
}

fn create_vision_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, BackendError> {
    ProviderFactory::create_llm_provider(name, model)
        .map_err(|e| BackendError::Engine(format!("vision provider '{name}': {e}")))
}
