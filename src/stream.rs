//! Streaming batch API: emit letters as they complete.
//!
//! ## Why stream?
//!
//! A batch of letters is bounded by converter start-up time, not CPU: each
//! LibreOffice run spends seconds starting before it converts anything.
//! Running `concurrency` requests at once overlaps those start-ups, and
//! yielding each outcome as soon as it is ready lets a front-end deliver the
//! first letters while the rest are still converting.
//!
//! Outcomes arrive in completion order. Each carries its request's index;
//! [`crate::generate::generate_batch`] sorts them back into input order.

use crate::config::GeneratorConfig;
use crate::generate::generate;
use crate::output::BatchItem;
use crate::registry::TemplateRegistry;
use crate::request::FillRequest;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::{info, warn};

/// A boxed stream of per-request outcomes.
pub type ArtifactStream = Pin<Box<dyn Stream<Item = BatchItem> + Send>>;

/// Generate letters for `requests` concurrently, yielding each outcome as it
/// completes.
///
/// At most `config.concurrency` requests (and therefore converter processes)
/// are in flight. Fires `on_batch_start` immediately and the per-request
/// events of the configured progress callback as work proceeds.
///
/// # Example
/// ```rust,no_run
/// use letterfill::{generate_stream, FillRequest, GeneratorConfig, TemplateRegistry};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registry = TemplateRegistry::builtin("templates");
/// let requests = vec![
///     FillRequest::new("UR Recruitment LTD", "ACME Ltd", "today")?,
///     FillRequest::new("UR Recruitment LTD", "Globex", "today")?,
/// ];
/// let mut stream = generate_stream(&registry, requests, &GeneratorConfig::default());
/// while let Some(item) = stream.next().await {
///     match item.result {
///         Ok(a) => println!("#{}: {} ({} bytes)", item.index, a.file_name, a.bytes.len()),
///         Err(e) => eprintln!("#{}: {e}", item.index),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn generate_stream(
    registry: &TemplateRegistry,
    requests: Vec<FillRequest>,
    config: &GeneratorConfig,
) -> ArtifactStream {
    let total = requests.len();
    info!(
        "Starting batch of {} letters (concurrency {})",
        total, config.concurrency
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let registry = Arc::new(registry.clone());
    let concurrency = config.concurrency;
    let config = config.clone();

    let s = stream::iter(requests.into_iter().enumerate().map(move |(index, request)| {
        let registry = Arc::clone(&registry);
        let cfg = config.clone();
        async move {
            if let Some(ref cb) = cfg.progress_callback {
                cb.on_request_start(index, request.client());
            }
            let result = generate(&registry, &request, &cfg).await;
            match &result {
                Ok(artifact) => {
                    if let Some(ref cb) = cfg.progress_callback {
                        cb.on_request_complete(index, &artifact.file_name, artifact.stats.output_bytes);
                    }
                }
                Err(e) => {
                    warn!("Request #{} ({}) failed: {}", index, request.client(), e);
                    if let Some(ref cb) = cfg.progress_callback {
                        cb.on_request_error(index, &e.to_string());
                    }
                }
            }
            BatchItem {
                index,
                request,
                result,
            }
        }
    }))
    .buffer_unordered(concurrency);

    Box::pin(s)
}
