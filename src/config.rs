//! Configuration types for letter generation.
//!
//! Request-independent behaviour is controlled through [`GeneratorConfig`],
//! built via its [`GeneratorConfigBuilder`]. One config is shared by every
//! request a front-end submits; it holds no per-request state, so it can be
//! cloned into concurrent tasks freely.
//!
//! Per-template conventions (marker spelling, number of date fields,
//! signature stamp) live in [`crate::registry::TemplateSpec`] instead.

use crate::error::LetterError;
use crate::pipeline::convert::{Converter, SofficeConverter};
use crate::progress::ProgressCallback;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration shared by all generation requests.
///
/// # Example
/// ```rust
/// use letterfill::GeneratorConfig;
///
/// let config = GeneratorConfig::builder()
///     .timeout_secs(45)
///     .concurrency(8)
///     .date_format("%d.%m.%Y")
///     .build()
///     .unwrap();
/// assert_eq!(config.timeout_secs, 45);
/// ```
#[derive(Clone)]
pub struct GeneratorConfig {
    /// The external DOCX → PDF converter. Default: headless LibreOffice.
    pub converter: Arc<dyn Converter>,

    /// Wall-clock bound for one converter run, in seconds. Range: 1–600. Default: 60.
    ///
    /// A cold LibreOffice start takes several seconds; a letter converts in
    /// well under one. Past the bound the converter process is killed and the
    /// request fails with [`LetterError::ConversionTimeout`].
    pub timeout_secs: u64,

    /// Parent directory for per-request scratch directories.
    /// If None, uses the system temp directory.
    pub scratch_dir: Option<PathBuf>,

    /// `chrono` format used to render the canonical date. Default: `%Y-%m-%d`.
    pub date_format: String,

    /// Time zone whose wall clock resolves `today`. Default: `Europe/London`.
    pub timezone: Tz,

    /// Maximum concurrent requests for batch/stream generation. Default: 4.
    ///
    /// Each in-flight request owns one converter process, so this is also
    /// the number of office processes alive at once.
    pub concurrency: usize,

    /// Optional per-request progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            converter: Arc::new(SofficeConverter::default()),
            timeout_secs: 60,
            scratch_dir: None,
            date_format: "%Y-%m-%d".to_string(),
            timezone: chrono_tz::Europe::London,
            concurrency: 4,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for GeneratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfig")
            .field("converter", &self.converter.program())
            .field("timeout_secs", &self.timeout_secs)
            .field("scratch_dir", &self.scratch_dir)
            .field("date_format", &self.date_format)
            .field("timezone", &self.timezone.name())
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn GenerationProgressCallback>"),
            )
            .finish()
    }
}

impl GeneratorConfig {
    /// Create a new builder for `GeneratorConfig`.
    pub fn builder() -> GeneratorConfigBuilder {
        GeneratorConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`GeneratorConfig`].
pub struct GeneratorConfigBuilder {
    config: GeneratorConfig,
}

impl fmt::Debug for GeneratorConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl GeneratorConfigBuilder {
    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.config.converter = converter;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.clamp(1, 600);
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = Some(dir.into());
        self
    }

    pub fn date_format(mut self, format: impl Into<String>) -> Self {
        self.config.date_format = format.into();
        self
    }

    pub fn timezone(mut self, tz: Tz) -> Self {
        self.config.timezone = tz;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GeneratorConfig, LetterError> {
        let c = &self.config;
        if c.date_format.trim().is_empty() {
            return Err(LetterError::InvalidConfig(
                "Date format must not be empty".into(),
            ));
        }
        if !crate::dates::is_valid_format(&c.date_format) {
            return Err(LetterError::InvalidConfig(format!(
                "Invalid date format '{}'",
                c.date_format
            )));
        }
        if c.concurrency == 0 {
            return Err(LetterError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if let Some(ref dir) = c.scratch_dir {
            if !dir.is_dir() {
                return Err(LetterError::InvalidConfig(format!(
                    "Scratch directory '{}' does not exist",
                    dir.display()
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which spelling of the date placeholder a template uses.
///
/// Matching is case-sensitive; the filled line is always written as
/// `Date: …` whichever spelling matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateMarker {
    /// `Date:` only.
    Title,
    /// `DATE:` only.
    Upper,
    /// Either spelling. (default)
    #[default]
    Either,
}

impl DateMarker {
    /// The literal markers this variant matches.
    pub fn markers(&self) -> &'static [&'static str] {
        match self {
            DateMarker::Title => &["Date:"],
            DateMarker::Upper => &["DATE:"],
            DateMarker::Either => &["Date:", "DATE:"],
        }
    }
}

/// A signature image appended next to the last filled date field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureStamp {
    /// PNG or JPEG file.
    pub image: PathBuf,
    /// Rendered width in millimetres; height keeps the aspect ratio.
    #[serde(default = "default_stamp_width_mm")]
    pub width_mm: f32,
}

fn default_stamp_width_mm() -> f32 {
    40.0
}

impl SignatureStamp {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            width_mm: default_stamp_width_mm(),
        }
    }
}
