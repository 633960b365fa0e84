//! CLI binary for docbridge.
//!
//! `docbridge serve` runs the HTTP gateway; `docbridge convert` runs one
//! conversion through the same pipeline and prints the status text.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docbridge::server;
use docbridge::{Gateway, GatewayConfig, PageSeparator, ToolResponse};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the gateway on port 8001
  docbridge serve

  # Accept server paths under /data only, keep outputs for 30 minutes
  docbridge --allowed-root /data --retention-secs 1800 serve --port 9000

  # One-shot conversion, status text on stdout
  docbridge convert report.docx

  # Write the Markdown to a file
  docbridge convert slides.pptx -o slides.md

  # OCR scanned PDF pages with a vision model
  docbridge --pdf-ocr --model gpt-4.1-mini convert scan.pdf

HTTP ENDPOINTS:
  GET  /                  health check
  POST /convert/path      {"path": "/shared/a.pdf", "output_name": "a"}
  POST /convert/content   {"filename": "a.txt", "content": "<base64>", "encoding": "base64"}
  GET  /formats           accepted extensions
  GET  /info              service configuration
  POST /admin/sweep       remove expired output files

ENVIRONMENT VARIABLES:
  DOCBRIDGE_ALLOWED_EXTENSIONS  Comma-separated accepted extensions
  DOCBRIDGE_MAX_FILE_SIZE_MB    Size ceiling in MiB
  DOCBRIDGE_ALLOWED_ROOTS       Comma-separated roots for server paths
  OPENAI_API_KEY                Vision provider key (with --pdf-ocr)
  EDGEQUAKE_MODEL               Vision model ID
  EDGEQUAKE_PROVIDER            Vision provider (openai, anthropic, gemini, ollama)
  PDFIUM_LIB_PATH               Path to an existing libpdfium; skips auto-download
"#;

/// Document-to-Markdown conversion gateway.
#[derive(Parser, Debug)]
#[command(
    name = "docbridge",
    version,
    about = "Document-to-Markdown conversion gateway",
    long_about = "Convert PDF, Word, Excel, PowerPoint, HTML and text files to Markdown. \
Files arrive by server path or as an encoded payload, are validated against an extension \
allow-list and size ceiling, staged under a private workspace and routed to a backend by type.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    gateway: GatewayArgs,

    /// Verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GatewayArgs {
    /// Accepted extensions (comma-separated).
    #[arg(
        long = "allowed-ext",
        env = "DOCBRIDGE_ALLOWED_EXTENSIONS",
        value_delimiter = ',',
        default_value = "pdf,docx,doc,txt,html,xlsx,pptx",
        global = true
    )]
    allowed_extensions: Vec<String>,

    /// Maximum input size in MiB.
    #[arg(long, env = "DOCBRIDGE_MAX_FILE_SIZE_MB", default_value_t = 50, global = true)]
    max_file_size_mb: u64,

    /// Directories a server path must resolve inside (comma-separated).
    #[arg(
        long = "allowed-root",
        env = "DOCBRIDGE_ALLOWED_ROOTS",
        value_delimiter = ',',
        default_value = "/tmp,/shared",
        global = true
    )]
    allowed_roots: Vec<PathBuf>,

    /// Output files older than this many seconds are swept.
    #[arg(long, env = "DOCBRIDGE_RETENTION_SECS", default_value_t = 3600, global = true)]
    retention_secs: u64,

    /// Upper bound on one backend call, in seconds.
    #[arg(long, env = "DOCBRIDGE_BACKEND_TIMEOUT_SECS", default_value_t = 300, global = true)]
    backend_timeout_secs: u64,

    /// Create the workspace under this directory instead of the system temp dir.
    #[arg(long, env = "DOCBRIDGE_WORKSPACE_DIR", global = true)]
    workspace_dir: Option<PathBuf>,

    /// OCR PDF pages without a text layer using a vision model.
    #[arg(long, env = "DOCBRIDGE_PDF_OCR", global = true)]
    pdf_ocr: bool,

    /// Non-whitespace characters below which a PDF page is OCR'd.
    #[arg(long, env = "DOCBRIDGE_OCR_MIN_CHARS", default_value_t = 100, global = true)]
    ocr_min_chars: usize,

    /// Vision model ID (e.g. gpt-4.1-nano).
    #[arg(long, env = "EDGEQUAKE_MODEL", global = true)]
    model: Option<String>,

    /// Vision provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER", global = true)]
    provider: Option<String>,

    /// PDF page separator: none, hr, comment, or a custom string.
    #[arg(long, env = "DOCBRIDGE_SEPARATOR", default_value = "none", global = true)]
    separator: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        #[arg(long, env = "DOCBRIDGE_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        #[arg(long, env = "DOCBRIDGE_PORT", default_value_t = 8001)]
        port: u16,

        /// Sweep expired outputs every N seconds (0 disables).
        #[arg(long, env = "DOCBRIDGE_SWEEP_INTERVAL_SECS", default_value_t = 0)]
        sweep_interval_secs: u64,
    },

    /// Convert one local file and print the result.
    Convert {
        /// File to convert.
        input: PathBuf,

        /// Write the Markdown to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the JSON response instead of status text.
        #[arg(long)]
        json: bool,

        /// Disable the spinner.
        #[arg(long)]
        no_progress: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let interactive = matches!(
        cli.command,
        Command::Convert { json: false, no_progress: false, .. }
    );
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else if interactive {
        // The spinner owns stderr.
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli.gateway)?;
    let pdf_enabled = config.allowed_extensions.contains("pdf");

    match cli.command {
        Command::Serve {
            host,
            port,
            sweep_interval_secs,
        } => {
            if pdf_enabled {
                // A missing engine fails PDF requests individually; the
                // gateway still serves everything else.
                if let Err(e) = ensure_pdf_engine(true) {
                    warn!("PDF engine unavailable: {e:#}");
                }
            }
            serve(config, SocketAddr::new(host, port), sweep_interval_secs).await
        }
        Command::Convert {
            input,
            output,
            json,
            no_progress,
        } => {
            let is_pdf = input
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
            if is_pdf && pdf_enabled {
                ensure_pdf_engine(cli.quiet || json)?;
            }
            let show_progress = !cli.quiet && !json && !no_progress;
            convert_once(config, input, output, json, show_progress).await
        }
    }
}

/// Map CLI args to `GatewayConfig`.
fn build_config(args: &GatewayArgs) -> Result<GatewayConfig> {
    let mut builder = GatewayConfig::builder()
        .allowed_extensions(&args.allowed_extensions)
        .max_file_size(args.max_file_size_mb.saturating_mul(1024 * 1024))
        .allowed_roots(args.allowed_roots.clone())
        .output_retention(Duration::from_secs(args.retention_secs))
        .backend_timeout(Duration::from_secs(args.backend_timeout_secs))
        .pdf_ocr(args.pdf_ocr)
        .ocr_min_chars(args.ocr_min_chars)
        .page_separator(parse_separator(&args.separator));

    if let Some(dir) = &args.workspace_dir {
        builder = builder.workspace_parent(dir);
    }
    if let Some(model) = &args.model {
        builder = builder.model(model);
    }
    if let Some(provider) = &args.provider {
        builder = builder.provider_name(provider);
    }

    builder.build().context("Invalid configuration")
}

fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

/// Download PDFium on first use. Later runs only check the cache.
fn ensure_pdf_engine(quiet: bool) -> Result<()> {
    if pdfium_auto::is_pdfium_cached() {
        return Ok(());
    }

    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.set_message("Connecting…");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    let result = tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    });

    match result {
        Ok(_) => {
            dl_bar.finish_with_message("ready ✓");
            Ok(())
        }
        Err(e) => {
            dl_bar.abandon_with_message("failed");
            Err(e).context("Failed to download PDFium engine")
        }
    }
}

async fn serve(config: GatewayConfig, addr: SocketAddr, sweep_interval_secs: u64) -> Result<()> {
    let gateway = Gateway::new(config).context("Failed to start gateway")?;
    info!(
        workspace = %gateway.workspace().root().display(),
        "docbridge {} listening on http://{}",
        env!("CARGO_PKG_VERSION"),
        addr
    );

    let sweeper = (sweep_interval_secs > 0).then(|| {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(sweep_interval_secs));
            tick.tick().await;
            loop {
                tick.tick().await;
                match gateway.sweep_old_artifacts().await {
                    Ok(report) if report.removed > 0 => {
                        info!(removed = report.removed, "Swept expired outputs")
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Sweep failed: {e}"),
                }
            }
        })
    });

    let result = server::serve(gateway.clone(), addr, shutdown_signal()).await;

    if let Some(handle) = sweeper {
        handle.abort();
        let _ = handle.await;
    }
    gateway.shutdown();
    info!("Gateway stopped");

    result.context("Server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Ctrl-C handler unavailable: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

async fn convert_once(
    config: GatewayConfig,
    input: PathBuf,
    output: Option<PathBuf>,
    json: bool,
    show_progress: bool,
) -> Result<()> {
    let bytes = tokio::fs::read(&input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Converting");
        bar.set_message(filename.clone());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let gateway = Gateway::new(config).context("Failed to start gateway")?;
    let result = gateway.convert_bytes(&filename, bytes, None).await;
    gateway.shutdown();

    if let Some(bar) = spinner {
        bar.finish_and_clear();
        match &result {
            Ok(s) => eprintln!(
                "{} {}  {}",
                green("✔"),
                bold(&s.filename),
                dim(&format!("{} chars via {}  {}ms", s.text.len(), s.backend, s.duration_ms)),
            ),
            Err(e) => eprintln!("{} {}", red("✘"), bold(&e.user_message())),
        }
    }

    let response = ToolResponse::from_result(&result);

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialize response")?
        );
    } else if let (Some(path), Ok(success)) = (&output, &result) {
        tokio::fs::write(path, &success.text)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{}\nOutput saved to: {}", response.message, path.display());
    } else if response.ok {
        let text = response.render_text();
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !response.ok {
        bail!("{}", response.message);
    }
    Ok(())
}
