//! Eager (single-letter) generation entry points.
//!
//! ## Why eager vs. streaming?
//!
//! A chat front-end asks for one letter and waits for it; this module is
//! that API. [`generate`] resolves the template, fills it, converts it and
//! hands back the PDF bytes with the scratch space already cleaned up. Use
//! [`crate::stream::generate_stream`] to run many requests concurrently.

use crate::config::GeneratorConfig;
use crate::dates;
use crate::error::LetterError;
use crate::naming;
use crate::output::{Artifact, BatchItem, FillReport, GenerationStats};
use crate::pipeline::{convert, fill, scratch::Scratch};
use crate::registry::TemplateRegistry;
use crate::request::FillRequest;
use crate::stream::generate_stream;
use futures::StreamExt;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Fill a template and convert it to PDF.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(Artifact)` whenever a PDF was produced, even if a field was missing
/// (check `artifact.report.warnings`).
///
/// # Errors
/// Returns `Err(LetterError)` only when no PDF could be produced:
/// - unknown template id, empty client name or date
/// - template missing or not a DOCX
/// - converter missing, failed, timed out or produced nothing
pub async fn generate(
    registry: &TemplateRegistry,
    request: &FillRequest,
    config: &GeneratorConfig,
) -> Result<Artifact, LetterError> {
    let total_start = Instant::now();
    request.validate()?;
    info!(
        template = %request.template_id,
        client = %request.client(),
        "Generating letter"
    );

    // ── Step 1: Resolve template and date ────────────────────────────────
    let spec = registry.resolve(&request.template_id)?;
    let date = dates::canonical_date(&request.date, &config.date_format, config.timezone)?;
    debug!("Canonical date: {}", date);

    // ── Step 2: Fill into scratch space ──────────────────────────────────
    let scratch = Scratch::create(config.scratch_dir.as_deref())?;
    let fill_start = Instant::now();
    let filled = fill::fill_template(
        &request.template_id,
        spec,
        request.client(),
        &date,
        &scratch.unique_file("letter", "docx"),
    )
    .await?;
    let fill_duration_ms = fill_start.elapsed().as_millis() as u64;

    // ── Step 3: Convert ──────────────────────────────────────────────────
    let stem = naming::sanitize_file_stem(request.client());
    let convert_start = Instant::now();
    let pdf_path = convert::convert(
        config.converter.as_ref(),
        &filled.path,
        &stem,
        Duration::from_secs(config.timeout_secs),
    )
    .await?;
    let convert_duration_ms = convert_start.elapsed().as_millis() as u64;

    let bytes = tokio::fs::read(&pdf_path)
        .await
        .map_err(|e| LetterError::Internal(format!("Failed to read converted PDF: {e}")))?;

    // ── Step 4: Clean up ─────────────────────────────────────────────────
    let mut report = filled.report;
    if let Some(warning) = scratch.close() {
        report.warnings.push(warning);
    }

    let stats = GenerationStats {
        fill_duration_ms,
        convert_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
        output_bytes: bytes.len() as u64,
    };
    info!(
        "Letter ready: {}.pdf ({} bytes, {}ms total)",
        stem, stats.output_bytes, stats.total_duration_ms
    );

    Ok(Artifact {
        file_name: format!("{stem}.pdf"),
        bytes,
        report,
        stats,
    })
}

/// Generate a letter and write the PDF directly to a file.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn generate_to_file(
    registry: &TemplateRegistry,
    request: &FillRequest,
    output_path: impl AsRef<Path>,
    config: &GeneratorConfig,
) -> Result<Artifact, LetterError> {
    let artifact = generate(registry, request, config).await?;
    write_atomic(output_path.as_ref(), &artifact.bytes, "pdf.tmp").await?;
    Ok(artifact)
}

/// Fill a template without converting it, writing the DOCX to `output_path`.
///
/// Needs no office suite. The date is canonicalised exactly as in
/// [`generate`].
pub async fn fill_to_file(
    registry: &TemplateRegistry,
    request: &FillRequest,
    output_path: impl AsRef<Path>,
    config: &GeneratorConfig,
) -> Result<FillReport, LetterError> {
    let total_start = Instant::now();
    request.validate()?;
    let spec = registry.resolve(&request.template_id)?;
    let date = dates::canonical_date(&request.date, &config.date_format, config.timezone)?;

    let scratch = Scratch::create(config.scratch_dir.as_deref())?;
    let filled = fill::fill_template(
        &request.template_id,
        spec,
        request.client(),
        &date,
        &scratch.unique_file("letter", "docx"),
    )
    .await?;

    let bytes = tokio::fs::read(&filled.path)
        .await
        .map_err(|e| LetterError::Internal(format!("Failed to read filled document: {e}")))?;
    write_atomic(output_path.as_ref(), &bytes, "docx.tmp").await?;

    let mut report = filled.report;
    if let Some(warning) = scratch.close() {
        report.warnings.push(warning);
    }
    info!(
        "Filled document written to {} in {}ms",
        output_path.as_ref().display(),
        total_start.elapsed().as_millis()
    );
    Ok(report)
}

/// Synchronous wrapper around [`generate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    registry: &TemplateRegistry,
    request: &FillRequest,
    config: &GeneratorConfig,
) -> Result<Artifact, LetterError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LetterError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate(registry, request, config))
}

/// Generate many letters concurrently and return every outcome, in request
/// order.
///
/// One failing request never affects the others. Fires
/// `on_batch_complete` on the configured progress callback at the end.
pub async fn generate_batch(
    registry: &TemplateRegistry,
    requests: Vec<FillRequest>,
    config: &GeneratorConfig,
) -> Vec<BatchItem> {
    let total = requests.len();
    let mut items: Vec<BatchItem> = generate_stream(registry, requests, config)
        .collect()
        .await;
    items.sort_by_key(|item| item.index);

    let ok = items.iter().filter(|i| i.is_ok()).count();
    info!("Batch complete: {}/{} letters generated", ok, total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(total, ok);
    }
    items
}

async fn write_atomic(path: &Path, bytes: &[u8], tmp_extension: &str) -> Result<(), LetterError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LetterError::OutputWriteFailed {
                    path: path.to_path_buf(),
                    source: e,
                })?;
        }
    }

    let tmp_path = path.with_extension(tmp_extension);
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| LetterError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| LetterError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}
