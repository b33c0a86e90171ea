//! # letterfill
//!
//! Fill DOCX letter templates with a client name and a date, then render
//! them to PDF through headless LibreOffice.
//!
//! ## Why this crate?
//!
//! Recruitment letters are drafted in Word by people who will keep editing
//! them in Word. Placeholders like `Client:` and `Date:` end up split across
//! runs, sitting next to a scanned signature, or inside a table cell. This
//! crate edits the WordprocessingML directly, keeping run formatting and
//! embedded images intact, and leaves layout to a real office suite.
//!
//! ## Pipeline Overview
//!
//! ```text
//! FillRequest { template_id, client_name, date }
//!  │
//!  ├─ 1. Resolve  template id → DOCX path (TemplateRegistry)
//!  ├─ 2. Date     "28th April 2025" / "today" → canonical string (chrono)
//!  ├─ 3. Fill     Client:/Date: substitution in a scratch copy (spawn_blocking)
//!  ├─ 4. Convert  soffice --headless --convert-to pdf, bounded by a timeout
//!  └─ 5. Output   PDF bytes + file name + fill report; scratch removed
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use letterfill::{generate, FillRequest, GeneratorConfig, TemplateRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = TemplateRegistry::builtin("templates");
//!     let request = FillRequest::new("UR Recruitment LTD", "Jane Doe", "2025-04-28")?;
//!     let artifact = generate(&registry, &request, &GeneratorConfig::default()).await?;
//!     std::fs::write(&artifact.file_name, &artifact.bytes)?;
//!     for w in &artifact.report.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `letterfill` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! letterfill = { version = "0.3", default-features = false }
//! ```
//!
//! ## Finding LibreOffice
//!
//! The default converter looks for `soffice` via `LETTERFILL_SOFFICE`, then
//! `PATH`, then the usual install locations (see the `soffice-locate`
//! crate). Each conversion gets its own LibreOffice profile so concurrent
//! requests do not block on each other.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dates;
pub mod error;
pub mod generate;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod request;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DateMarker, GeneratorConfig, GeneratorConfigBuilder, SignatureStamp};
pub use error::{ErrorKind, FieldWarning, LetterError};
pub use generate::{fill_to_file, generate, generate_batch, generate_sync, generate_to_file};
pub use output::{Artifact, BatchItem, FillReport, GenerationStats};
pub use pipeline::convert::{CommandConverter, Converter, SofficeConverter};
pub use pipeline::fields::Placement;
pub use progress::{GenerationProgressCallback, NoopProgressCallback, ProgressCallback};
pub use registry::{TemplateRegistry, TemplateSpec};
pub use request::FillRequest;
pub use stream::{generate_stream, ArtifactStream};
