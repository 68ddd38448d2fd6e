//! CLI binary for docgen-client.
//!
//! A thin shim over the library crate that maps CLI flags to `ClientConfig`,
//! drives the `UploadController` and renders its state in the terminal.

use anyhow::{Context, Result};
use clap::Parser;
use docgen_client::{
    fetch_artifact, save_artifact, ClientConfig, HttpTransport, SelectedFile, UploadController,
    UploadObserver, UploadState,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Terminal view driven by the controller ───────────────────────────────────

/// Spinner while Loading, one line per failed attempt, cleared on the
/// terminal state.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Uploading...");
        Arc::new(Self { bar })
    }
}

impl UploadObserver for CliObserver {
    fn on_state_change(&self, state: &UploadState) {
        match state {
            UploadState::Loading {
                attempt,
                max_attempts,
            } => {
                if *attempt == 1 {
                    self.bar.enable_steady_tick(Duration::from_millis(80));
                }
                self.bar
                    .set_message(format!("attempt {attempt}/{max_attempts}"));
            }
            UploadState::Succeeded { .. } | UploadState::Failed { .. } => {
                self.bar.finish_and_clear();
            }
            UploadState::Idle => {}
        }
    }

    fn on_attempt_failed(&self, attempt: u32, max_attempts: u32, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Attempt {}/{}  {}",
            red("✗"),
            attempt,
            max_attempts,
            dim(&msg)
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Generate a PDF and print where it lives
  docgen brief.docx

  # Generate and download
  docgen brief.docx -o brief.pdf

  # Download into a directory, keeping the service's file name
  docgen brief.docx -o out/

  # Also render page 1 as a PNG preview
  docgen brief.docx -o brief.pdf --preview brief.png

  # Another service, five attempts one second apart
  docgen --endpoint https://docgen.internal/generate_document \
         --attempts 5 --retry-delay-ms 1000 brief.docx

  # Is the service up?
  docgen --check

  # Machine-readable final state
  docgen --json brief.docx

ENVIRONMENT VARIABLES:
  DOCGEN_ENDPOINT         Conversion endpoint
  DOCGEN_ATTEMPTS         Total attempts per upload
  DOCGEN_RETRY_DELAY_MS   Pause between attempts
  PDFIUM_LIB_PATH         pdfium library (or its directory) used for --preview
  RUST_LOG                Overrides the log filter
"#;

/// Upload a .docx document and fetch the PDF generated from it.
#[derive(Parser, Debug)]
#[command(
    name = "docgen",
    version,
    about = "Upload a .docx document and fetch the PDF generated from it",
    long_about = "Upload a Word document (.docx) to a PDF generation service, retrying \
transient failures, then download the generated PDF and optionally render a preview of its \
first page.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// The .docx file to upload.
    #[arg(required_unless_present = "check")]
    input: Option<PathBuf>,

    /// Download the generated PDF to this file or directory.
    #[arg(short, long, env = "DOCGEN_OUTPUT")]
    output: Option<PathBuf>,

    /// Render the first page of the generated PDF to this PNG.
    #[cfg(feature = "preview")]
    #[arg(long, env = "DOCGEN_PREVIEW")]
    preview: Option<PathBuf>,

    /// Longest edge of the preview in pixels.
    #[cfg(feature = "preview")]
    #[arg(long, env = "DOCGEN_PREVIEW_PIXELS", default_value_t = 1600)]
    preview_pixels: u32,

    /// Conversion endpoint (multipart POST).
    #[arg(long, env = "DOCGEN_ENDPOINT", default_value = docgen_client::DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Total upload attempts before giving up.
    #[arg(long, env = "DOCGEN_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=20))]
    attempts: u32,

    /// Fixed pause between attempts, in milliseconds.
    #[arg(long, env = "DOCGEN_RETRY_DELAY_MS", default_value_t = 0)]
    retry_delay_ms: u64,

    /// Per-attempt request timeout in seconds (default: none).
    #[arg(long, env = "DOCGEN_TIMEOUT")]
    timeout: Option<u64>,

    /// Download timeout in seconds.
    #[arg(long, env = "DOCGEN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Multipart field carrying the document.
    #[arg(long, env = "DOCGEN_FIELD", default_value = "file")]
    field: String,

    /// JSON response field holding the result reference.
    #[arg(long, env = "DOCGEN_RESULT_FIELD", default_value = "pdf_url")]
    result_field: String,

    /// Only check that the service answers, then exit.
    #[arg(long)]
    check: bool,

    /// Print the final state as JSON.
    #[arg(long, env = "DOCGEN_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, env = "DOCGEN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCGEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCGEN_QUIET")]
    quiet: bool,
}

#[derive(Serialize)]
struct Report {
    #[serde(flatten)]
    state: UploadState,
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_to: Option<PathBuf>,
    #[cfg(feature = "preview")]
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<docgen_client::Preview>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the feedback that matters; keep library logs
    // down to errors while it is visible.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let observer = show_progress.then(CliObserver::new);
    let config = build_config(&cli, observer)?;

    // ── Health check ─────────────────────────────────────────────────────
    if cli.check {
        let transport = HttpTransport::new(&config).context("Invalid endpoint")?;
        let message = transport
            .health()
            .await
            .context("Health check failed")?;
        if !cli.quiet {
            println!("{} {}  {}", green("✔"), transport.endpoint(), dim(&message));
        }
        return Ok(());
    }

    let input = cli
        .input
        .as_ref()
        .context("An input .docx file is required")?;

    // ── Select ───────────────────────────────────────────────────────────
    let file = SelectedFile::from_path(input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let controller = UploadController::new(config).context("Invalid configuration")?;

    let selected = controller.select_file(file);
    if selected.error().is_some() {
        return finish(&cli, Report::from_state(selected));
    }

    // ── Submit ───────────────────────────────────────────────────────────
    let state = controller.submit().await;
    let Some(result) = state.result().cloned() else {
        return finish(&cli, Report::from_state(state));
    };

    let mut report = Report::from_state(state);

    // ── Download / preview ───────────────────────────────────────────────
    #[cfg(feature = "preview")]
    let wants_bytes = cli.output.is_some() || cli.preview.is_some();
    #[cfg(not(feature = "preview"))]
    let wants_bytes = cli.output.is_some();

    if wants_bytes {
        let config = controller.config();
        let artifact = fetch_artifact(&result, config.download_timeout_secs)
            .await
            .context("Failed to fetch the generated PDF")?;

        if let Some(ref dest) = cli.output {
            let path = save_artifact(&artifact, dest)
                .await
                .context("Failed to save the generated PDF")?;
            report.saved_to = Some(path);
        }

        #[cfg(feature = "preview")]
        if let Some(ref png) = cli.preview {
            let preview =
                docgen_client::write_preview(&artifact.bytes, config.preview_max_pixels, png)
                    .await
                    .context("Failed to render preview")?;
            report.preview = Some(preview);
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise state")?
        );
        return Ok(());
    }

    if !cli.quiet {
        if let UploadState::Succeeded { attempts, .. } = &report.state {
            let tries = if *attempts == 1 {
                String::new()
            } else {
                format!("  {}", dim(&format!("after {attempts} attempts")))
            };
            eprintln!("{} {}{}", green("✔"), bold("PDF generated"), tries);
        }
    }
    // The result reference is the one thing scripts want on stdout.
    println!("{result}");

    if !cli.quiet {
        if let Some(ref path) = report.saved_to {
            eprintln!("  {} {}", cyan("↓"), bold(&path.display().to_string()));
        }
        #[cfg(feature = "preview")]
        if let (Some(preview), Some(png)) = (&report.preview, &cli.preview) {
            eprintln!(
                "  {} {}  {}",
                cyan("◆"),
                bold(&png.display().to_string()),
                dim(&format!(
                    "page 1 of {}, {}x{} px",
                    preview.page_count, preview.width, preview.height
                ))
            );
        }
    }

    Ok(())
}

impl Report {
    fn from_state(state: UploadState) -> Self {
        Self {
            state,
            saved_to: None,
            #[cfg(feature = "preview")]
            preview: None,
        }
    }
}

/// Print a failed state and turn it into a non-zero exit.
fn finish(cli: &Cli, report: Report) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise state")?
        );
    }
    report.state.into_result()?;
    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .endpoint(cli.endpoint.clone())
        .file_field(cli.field.clone())
        .result_field(cli.result_field.clone())
        .max_attempts(cli.attempts)
        .retry_delay_ms(cli.retry_delay_ms)
        .download_timeout_secs(cli.download_timeout);

    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    #[cfg(feature = "preview")]
    {
        builder = builder.preview_max_pixels(cli.preview_pixels);
    }
    if let Some(o) = observer {
        builder = builder.observer(o);
    }

    builder.build().context("Invalid configuration")
}
