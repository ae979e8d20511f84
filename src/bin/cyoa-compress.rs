//! CLI binary for cyoa-compressor.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `CompressionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use cyoa_compressor::{
    format_size, inspect, CompressionConfig, CompressionProgressCallback, CompressionStats,
    Compressor, ProgressCallback, SegmentOutcome, SegmentReport, DEFAULT_QUALITY,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per image.
/// Images complete out of order, so lines are keyed by segment index.
struct CliProgressCallback {
    bar: ProgressBar,
    failed: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_run_start` tells us how many images there are.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading story file…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failed: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Compressing");
        self.bar.reset_eta();
    }
}

impl CompressionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_candidates: usize) {
        self.activate_bar(total_candidates);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_candidates} embedded images…"))
        ));
    }

    fn on_segment_complete(&self, done: usize, total: usize, report: &SegmentReport) {
        let took = dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0));
        let line = match report.outcome {
            SegmentOutcome::Replaced => format!(
                "  {} Image {:>4}  {} → {}  {}",
                green("✓"),
                report.index / 2 + 1,
                dim(&format_size(report.original_len as u64)),
                format_size(report.output_len as u64),
                took,
            ),
            SegmentOutcome::NotSmaller | SegmentOutcome::PassThrough => format!(
                "  {} Image {:>4}  {}  {}",
                dim("="),
                report.index / 2 + 1,
                dim("kept original"),
                took,
            ),
            SegmentOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                let msg = report
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_default();
                // Keep the log tidy on very long codec messages.
                let msg = match msg.char_indices().nth(79) {
                    Some((cut, _)) => format!("{}\u{2026}", &msg[..cut]),
                    None => msg,
                };
                format!(
                    "  {} Image {:>4}  {}  {}",
                    red("✗"),
                    report.index / 2 + 1,
                    red(&msg),
                    took,
                )
            }
        };
        self.bar.println(line);
        self.bar.set_position(done as u64);
        if done == total {
            self.bar.set_message("reassembling");
        }
    }

    fn on_run_complete(&self, stats: &CompressionStats) {
        self.bar.finish_and_clear();
        let failed = self.failed.load(Ordering::SeqCst);
        if failed == 0 {
            eprintln!(
                "{} {} of {} images re-encoded",
                green("✔"),
                bold(&stats.replaced.to_string()),
                stats.candidates
            );
        } else {
            eprintln!(
                "{} {} of {} images re-encoded  ({} failed, originals kept)",
                cyan("⚠"),
                bold(&stats.replaced.to_string()),
                stats.candidates,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Compress to stdout
  cyoa-compress project.json > project.min.json

  # Compress to a file
  cyoa-compress project.json -o project.min.json

  # Higher quality, fewer workers
  cyoa-compress --quality 60 -w 2 project.json -o out.json

  # Compress a hosted story file
  cyoa-compress https://example.com/cyoa/project.json -o project.json

  # List embedded images without encoding anything
  cyoa-compress --inspect-only project.json

  # JSON report (per-image outcomes and totals)
  cyoa-compress --json project.json > report.json

WHAT GETS RE-ENCODED:
  Quoted data URLs of type image/png, image/jpeg, image/webp and image/gif.
  Still images become AVIF; animated GIF/WebP become a quantised looping GIF.
  APNG and AVIF sequences are left alone. An image is only replaced when the
  new encoding is strictly smaller; everything else is copied byte for byte.

ENVIRONMENT VARIABLES:
  CYOA_QUALITY            Codec quality (default 33)
  CYOA_SPEED              AVIF encoder speed 1-10 (default 6)
  CYOA_WORKERS            Worker threads (default: CPU count)
  CYOA_JOB_TIMEOUT        Per-image timeout in seconds
  RUST_LOG                Override the log filter
"#;

/// Shrink interactive story files by re-encoding their embedded images.
#[derive(Parser, Debug)]
#[command(
    name = "cyoa-compress",
    version,
    about = "Shrink interactive story files by re-encoding their embedded images",
    long_about = "Re-encode the base64 images embedded in an interactive story file (local path \
or URL) as AVIF, keeping every other byte of the document intact. Images are processed in \
parallel on a fixed pool of worker threads.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local story file path or HTTP/HTTPS URL.
    input: String,

    /// Write the compressed document to this file instead of stdout.
    #[arg(short, long, env = "CYOA_OUTPUT")]
    output: Option<PathBuf>,

    /// Codec quality, passed to the encoder as-is. 0 is rejected by the
    /// AVIF encoder, so every still image would keep its original bytes.
    #[arg(long, env = "CYOA_QUALITY", default_value_t = DEFAULT_QUALITY)]
    quality: u8,

    /// AVIF encoder speed, 1 (slowest, smallest) to 10.
    #[arg(long, env = "CYOA_SPEED", default_value_t = 6,
          value_parser = clap::value_parser!(u8).range(1..=10))]
    speed: u8,

    /// Number of worker threads (default: CPU count).
    #[arg(short, long, env = "CYOA_WORKERS")]
    workers: Option<usize>,

    /// Per-image timeout in seconds; the original is kept on expiry.
    #[arg(long, env = "CYOA_JOB_TIMEOUT")]
    job_timeout: Option<u64>,

    /// Output a structured JSON report instead of the document.
    #[arg(long, env = "CYOA_JSON")]
    json: bool,

    /// List embedded images only, no encoding.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "CYOA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CYOA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CYOA_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "CYOA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let summary = inspect(&cli.input, cli.download_timeout)
            .await
            .context("Failed to inspect story file")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("Failed to serialize summary")?
            );
        } else {
            println!("File:         {}", summary.file_name);
            println!("Size:         {}", format_size(summary.input_bytes));
            println!("Segments:     {}", summary.total_segments);
            println!("Images:       {}", summary.candidates.len());
            for c in &summary.candidates {
                println!(
                    "  #{:<5} {:<11} {:<5} {:<26} {}",
                    c.index,
                    c.declared_mime,
                    format!("{:?}", c.family).to_lowercase(),
                    format!("{:?}", c.kind),
                    format_size(c.encoded_len as u64),
                );
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn CompressionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let session = Compressor::new(config).context("Failed to start worker pool")?;

    // ── Run compression ──────────────────────────────────────────────────
    let output = session
        .compress(&cli.input)
        .await
        .context("Compression failed")?;
    let stats = &output.stats;

    if let Some(ref output_path) = cli.output {
        session
            .persist_artifact(output_path)
            .await
            .context("Failed to save output")?;
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.document.as_bytes())
            .context("Failed to write to stdout")?;
        handle.flush().context("Failed to write to stdout")?;
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        let target = cli
            .output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".to_string());
        eprintln!(
            "{}  {} → {}  ({:.1}%)  {}  →  {}",
            if stats.failed == 0 {
                green("✔")
            } else {
                cyan("⚠")
            },
            stats.input_size(),
            bold(&stats.output_size()),
            stats.ratio_percent(),
            dim(&stats.elapsed()),
            bold(&target),
        );
        if !show_progress && stats.failed > 0 {
            eprintln!("  {} images failed, originals kept", stats.failed);
        }
    }

    Ok(())
}

/// Map CLI args to `CompressionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<CompressionConfig> {
    let mut builder = CompressionConfig::builder()
        .quality(cli.quality)
        .speed(cli.speed)
        .download_timeout_secs(cli.download_timeout);

    if let Some(n) = cli.workers {
        builder = builder.workers(n);
    }
    if let Some(secs) = cli.job_timeout {
        builder = builder.job_timeout_secs(secs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
