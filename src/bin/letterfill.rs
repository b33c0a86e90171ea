//! CLI binary for letterfill.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `GeneratorConfig` / `FillRequest` and writes the resulting files.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use letterfill::naming::{docx_file_name, pdf_file_name};
use letterfill::{
    fill_to_file, generate_batch, generate_to_file, FillRequest, GenerationProgressCallback,
    GeneratorConfig, ProgressCallback, SofficeConverter, TemplateRegistry,
};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

/// Terminal progress callback for batches: a bar at the bottom of the
/// terminal plus one log line per finished letter. Letters complete out of
/// order, so start times are keyed by request index.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} letters  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Generating");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl GenerationProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Generating {total} letters…"))
        ));
    }

    fn on_request_start(&self, index: usize, client: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(client.to_string());
    }

    fn on_request_complete(&self, index: usize, file_name: &str, bytes: u64) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} #{:<3} {:<40}  {}  {}",
            green("✓"),
            index + 1,
            file_name,
            dim(&format!("{bytes:>7} bytes")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_request_error(&self, index: usize, error: &str) {
        let secs = self.elapsed_secs(index);
        self.errors.fetch_add(1, Ordering::SeqCst);

        // First line only; keep the log tidy.
        let msg = error.lines().next().unwrap_or(error);
        let msg: String = if msg.chars().count() > 80 {
            format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
        } else {
            msg.to_string()
        };

        self.bar.println(format!(
            "  {} #{:<3} {}  {}",
            red("✗"),
            index + 1,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} letters generated",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} letters generated  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix("Generating");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One letter, PDF named after the client (./Jane Doe.pdf)
  letterfill --template "UR Recruitment LTD" --client "Jane Doe" --date 2025-04-28

  # Explicit output path, today's date
  letterfill -t "SMALL WORLD RECRUITMENT LTD" -c "ACME Ltd" -o out/acme.pdf

  # Filled DOCX only (no LibreOffice needed)
  letterfill --docx-only -t "UR Recruitment LTD" -c "Jane Doe" -o filled.docx

  # Batch from a JSON array of {template_id, client_name, date}
  letterfill --registry templates.json --batch requests.json --out-dir pdfs/

  # What templates are configured?
  letterfill --list-templates

  # JSON report (fill placements, warnings, timings)
  letterfill --json -t "UR Recruitment LTD" -c "Jane Doe"

DATES:
  today, 2025-04-28, 28.04.2025, 28/04/2025, 2025/04/28, 28 April 2025,
  28th April 2025, April 28, 2025. Anything else is written verbatim.

ENVIRONMENT VARIABLES:
  LETTERFILL_SOFFICE        Path to the soffice binary (skips PATH search)
  LETTERFILL_PROFILE_DIR    Shared LibreOffice profile (with --shared-profile)
  LETTERFILL_REGISTRY       Template registry JSON file
  LETTERFILL_TEMPLATES_DIR  Directory of the built-in templates
  LETTERFILL_TIMEZONE       Time zone for "today" (default Europe/London)
  RUST_LOG                  Log filter, e.g. letterfill=debug

SETUP:
  1. Install LibreOffice (apt install libreoffice-writer / brew install --cask libreoffice)
  2. Put the templates in ./templates or point --registry at a JSON file
"#;

/// Fill DOCX letter templates and render them to PDF.
#[derive(Parser, Debug)]
#[command(
    name = "letterfill",
    version,
    about = "Fill DOCX letter templates with a client name and date, and render them to PDF",
    long_about = "Fill the Client: and Date: fields of a DOCX letter template, keeping run \
formatting and embedded images intact, and convert the result to PDF with headless LibreOffice.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Template id (see --list-templates).
    #[arg(short, long, required_unless_present_any = ["batch", "list_templates"])]
    template: Option<String>,

    /// Client name written into the letter and used for the file name.
    #[arg(short, long, required_unless_present_any = ["batch", "list_templates"])]
    client: Option<String>,

    /// Letter date (any common spelling, or "today").
    #[arg(short, long, default_value = "today")]
    date: String,

    /// Output file. Default: "<client>.pdf" in --out-dir.
    #[arg(short, long, conflicts_with = "batch")]
    output: Option<PathBuf>,

    /// JSON file with an array of requests to generate.
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Directory for generated files.
    #[arg(long, env = "LETTERFILL_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Template registry JSON file. Default: the built-in templates.
    #[arg(long, env = "LETTERFILL_REGISTRY")]
    registry: Option<PathBuf>,

    /// Directory holding the built-in templates.
    #[arg(long, env = "LETTERFILL_TEMPLATES_DIR", default_value = "templates")]
    templates_dir: PathBuf,

    /// List configured templates and exit.
    #[arg(long)]
    list_templates: bool,

    /// Write the filled DOCX and skip PDF conversion.
    #[arg(long)]
    docx_only: bool,

    /// soffice binary to run.
    #[arg(long, env = "LETTERFILL_SOFFICE")]
    soffice: Option<PathBuf>,

    /// Reuse one persistent LibreOffice profile instead of one per letter.
    #[arg(long, env = "LETTERFILL_SHARED_PROFILE")]
    shared_profile: bool,

    /// Converter timeout per letter, in seconds (1–600).
    #[arg(long, env = "LETTERFILL_TIMEOUT", default_value_t = 60,
          value_parser = clap::value_parser!(u64).range(1..=600))]
    timeout: u64,

    /// chrono format for the date written into letters.
    #[arg(long, env = "LETTERFILL_DATE_FORMAT", default_value = "%Y-%m-%d")]
    date_format: String,

    /// IANA time zone used to resolve "today".
    #[arg(long, env = "LETTERFILL_TIMEZONE", default_value = "Europe/London",
          value_parser = parse_timezone)]
    timezone: Tz,

    /// Letters converted at once in batch mode.
    #[arg(short = 'j', long, env = "LETTERFILL_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Parent directory for per-letter scratch directories.
    #[arg(long, env = "LETTERFILL_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Print a JSON report on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress output.
    #[arg(long, env = "LETTERFILL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Progress output replaces INFO logs; -v brings everything back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let registry = load_registry(&cli)?;

    // ── List mode ────────────────────────────────────────────────────────
    if cli.list_templates {
        return list_templates(&registry, cli.json);
    }

    let progress_cb: Option<ProgressCallback> = if show_progress && cli.batch.is_some() {
        Some(CliProgressCallback::new() as Arc<dyn GenerationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    if let Some(ref batch) = cli.batch {
        run_batch(&cli, &registry, &config, batch, show_progress).await
    } else {
        run_single(&cli, &registry, &config, show_progress).await
    }
}

fn load_registry(cli: &Cli) -> Result<TemplateRegistry> {
    match cli.registry {
        Some(ref path) => TemplateRegistry::load(path).context("Failed to load template registry"),
        None => Ok(TemplateRegistry::builtin(&cli.templates_dir)),
    }
}

fn list_templates(registry: &TemplateRegistry, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(registry).context("Failed to serialise registry")?
        );
        return Ok(());
    }
    for (id, spec) in registry.iter() {
        let status = if spec.path.is_file() {
            green("✓")
        } else {
            red("✗ missing")
        };
        println!("{}  {}  {}", bold(id), dim(&spec.path.display().to_string()), status);
    }
    Ok(())
}

fn parse_timezone(s: &str) -> Result<Tz, String> {
    s.parse::<Tz>().map_err(|e| e.to_string())
}

/// Map CLI args to `GeneratorConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GeneratorConfig> {
    let mut soffice = match cli.soffice {
        Some(ref p) => SofficeConverter::with_program(p),
        None => SofficeConverter::default(),
    };
    if cli.shared_profile {
        soffice = soffice.shared_profile();
    }

    let mut builder = GeneratorConfig::builder()
        .converter(Arc::new(soffice))
        .timeout_secs(cli.timeout)
        .date_format(cli.date_format.clone())
        .timezone(cli.timezone)
        .concurrency(cli.concurrency);

    if let Some(ref dir) = cli.scratch_dir {
        builder = builder.scratch_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn run_single(
    cli: &Cli,
    registry: &TemplateRegistry,
    config: &GeneratorConfig,
    show_progress: bool,
) -> Result<()> {
    // clap guarantees both are present outside batch/list mode.
    let (Some(template), Some(client)) = (cli.template.as_deref(), cli.client.as_deref()) else {
        anyhow::bail!("--template and --client are required");
    };
    let request = FillRequest::new(template, client, cli.date.as_str())?;

    let bar = show_progress.then(|| spinner(client));

    if cli.docx_only {
        let output = cli
            .output
            .clone()
            .unwrap_or_else(|| cli.out_dir.join(docx_file_name(client)));
        let result = fill_to_file(registry, &request, &output, config).await;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        let report = result.context("Fill failed")?;

        if cli.json {
            let json = serde_json::json!({ "output": output, "report": report });
            println!("{}", serde_json::to_string_pretty(&json)?);
        } else if !cli.quiet {
            print_warnings(&report.warnings);
            eprintln!("{}  {}", green("✔"), bold(&output.display().to_string()));
        }
        return Ok(());
    }

    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.out_dir.join(pdf_file_name(client)));
    let result = generate_to_file(registry, &request, &output, config).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let artifact = result.context("Generation failed")?;

    if cli.json {
        let json = serde_json::json!({ "output": output, "artifact": artifact });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else if !cli.quiet {
        print_warnings(&artifact.report.warnings);
        eprintln!(
            "{}  {}  {}",
            if artifact.report.warnings.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&output.display().to_string()),
            dim(&format!(
                "{} bytes, {}ms",
                artifact.stats.output_bytes, artifact.stats.total_duration_ms
            )),
        );
    }
    Ok(())
}

async fn run_batch(
    cli: &Cli,
    registry: &TemplateRegistry,
    config: &GeneratorConfig,
    batch: &Path,
    show_progress: bool,
) -> Result<()> {
    let json = tokio::fs::read_to_string(batch)
        .await
        .with_context(|| format!("Failed to read batch file {:?}", batch))?;
    let requests: Vec<FillRequest> =
        serde_json::from_str(&json).with_context(|| format!("Invalid batch file {:?}", batch))?;
    let total = requests.len();

    tokio::fs::create_dir_all(&cli.out_dir)
        .await
        .with_context(|| format!("Failed to create {:?}", cli.out_dir))?;

    let mut used = HashSet::new();
    let mut failed = 0usize;
    let mut report = Vec::with_capacity(total);

    if cli.docx_only {
        for (index, request) in requests.iter().enumerate() {
            let path = unique_path(&cli.out_dir, &docx_file_name(request.client()), &mut used);
            match fill_to_file(registry, request, &path, config).await {
                Ok(r) => {
                    if !cli.quiet && !cli.json {
                        eprintln!("  {} #{:<3} {}", green("✓"), index + 1, path.display());
                    }
                    report.push(serde_json::json!({ "index": index, "output": path, "report": r }));
                }
                Err(e) => {
                    failed += 1;
                    if !cli.quiet && !cli.json {
                        eprintln!("  {} #{:<3} {}", red("✗"), index + 1, red(&e.to_string()));
                    }
                    report.push(serde_json::json!({ "index": index, "error": e.to_string(), "code": e.code() }));
                }
            }
        }
    } else {
        for item in generate_batch(registry, requests, config).await {
            match item.result {
                Ok(artifact) => {
                    let path = unique_path(&cli.out_dir, &artifact.file_name, &mut used);
                    tokio::fs::write(&path, &artifact.bytes)
                        .await
                        .with_context(|| format!("Failed to write {:?}", path))?;
                    if !show_progress && !cli.quiet && !cli.json {
                        eprintln!("  {} #{:<3} {}", green("✓"), item.index + 1, path.display());
                    }
                    report.push(serde_json::json!({
                        "index": item.index,
                        "output": path,
                        "artifact": artifact,
                    }));
                }
                Err(e) => {
                    failed += 1;
                    if !show_progress && !cli.quiet && !cli.json {
                        eprintln!("  {} #{:<3} {}", red("✗"), item.index + 1, red(&e.to_string()));
                    }
                    report.push(serde_json::json!({
                        "index": item.index,
                        "error": e.to_string(),
                        "code": e.code(),
                        "kind": e.kind(),
                    }));
                }
            }
        }
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {total} letters failed");
    }
    Ok(())
}

/// `dir/name`, or `dir/<stem>-2.<ext>`, `-3`, … if already used in this run.
fn unique_path(dir: &Path, file_name: &str, used: &mut HashSet<String>) -> PathBuf {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((s, e)) => (s.to_string(), format!(".{e}")),
        None => (file_name.to_string(), String::new()),
    };
    let mut candidate = file_name.to_string();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{stem}-{n}{ext}");
        n += 1;
    }
    dir.join(candidate)
}

fn print_warnings(warnings: &[letterfill::FieldWarning]) {
    for w in warnings {
        eprintln!("{} {}", cyan("⚠"), w);
    }
}
