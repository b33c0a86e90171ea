//! Error types for the letterfill library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`LetterError`] (**fatal**): the letter cannot be produced at all
//!   (unknown template, corrupt DOCX, converter crashed or timed out).
//!   Returned as `Err(LetterError)` from the top-level `generate*` functions.
//!
//! * [`FieldWarning`] (**non-fatal**): a placeholder field was missing or a
//!   scratch file could not be removed, but a letter was still produced.
//!   Stored inside [`crate::output::FillReport`] so callers can review an
//!   imperfect document instead of receiving nothing.
//!
//! [`LetterError::kind`] buckets fatal errors into "fix your input",
//! "try again later" and "environment problem" so a chat front-end can pick
//! the right reply without matching every variant.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the letterfill library.
#[derive(Debug, Error)]
pub enum LetterError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The template id is not present in the registry.
    #[error("Unknown template '{id}'. Available: {available}")]
    UnknownTemplate { id: String, available: String },

    /// The registry points at a template file that does not exist.
    #[error("Template file not found: '{path}'\nCheck the registry entry and that the file is readable.")]
    TemplateNotFound { path: PathBuf },

    /// The request itself is unusable (empty client name, empty date …).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ── Document errors ───────────────────────────────────────────────────
    /// The template exists but is not a readable DOCX package.
    #[error("Cannot load document '{path}': {detail}")]
    DocumentLoad { path: PathBuf, detail: String },

    /// The filled document could not be written to scratch space.
    #[error("Cannot write filled document '{path}': {detail}")]
    DocumentWrite { path: PathBuf, detail: String },

    // ── Converter errors ──────────────────────────────────────────────────
    /// The converter executable could not be started.
    #[error(
        "Converter '{program}' could not be started: {detail}\n\n\
Install LibreOffice or point LETTERFILL_SOFFICE at the soffice binary."
    )]
    ConverterNotFound { program: String, detail: String },

    /// The converter exited with a non-zero status.
    #[error("Conversion failed ({status}): {stderr}")]
    ConversionFailed { status: String, stderr: String },

    /// The converter did not finish within the configured bound.
    #[error("Conversion timed out after {secs}s")]
    ConversionTimeout { secs: u64 },

    /// The converter reported success but produced no (or an empty) PDF.
    #[error("Converter reported success but produced no PDF at '{path}'")]
    ConversionOutputMissing { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the caller-visible output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The template registry file could not be read or parsed.
    #[error("Cannot load template registry '{path}': {detail}")]
    RegistryLoad { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`LetterError`] for reply selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The caller sent something wrong; resubmitting unchanged will fail again.
    Input,
    /// Transient; the same request may succeed later.
    Retryable,
    /// The host is misconfigured (converter missing, unwritable scratch dir).
    Environment,
    /// A bug or an unexpected state.
    Internal,
}

impl LetterError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LetterError::UnknownTemplate { .. } | LetterError::InvalidRequest(_) => {
                ErrorKind::Input
            }
            LetterError::ConversionTimeout { .. } => ErrorKind::Retryable,
            LetterError::TemplateNotFound { .. }
            | LetterError::DocumentLoad { .. }
            | LetterError::DocumentWrite { .. }
            | LetterError::ConverterNotFound { .. }
            | LetterError::ConversionFailed { .. }
            | LetterError::ConversionOutputMissing { .. }
            | LetterError::OutputWriteFailed { .. }
            | LetterError::InvalidConfig(_)
            | LetterError::RegistryLoad { .. } => ErrorKind::Environment,
            LetterError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code, e.g. for a bot reply or a JSON report.
    pub fn code(&self) -> &'static str {
        match self {
            LetterError::UnknownTemplate { .. } => "unknown_template",
            LetterError::TemplateNotFound { .. } => "template_not_found",
            LetterError::InvalidRequest(_) => "invalid_request",
            LetterError::DocumentLoad { .. } => "document_load_error",
            LetterError::DocumentWrite { .. } => "document_write_error",
            LetterError::ConverterNotFound { .. } => "converter_not_found",
            LetterError::ConversionFailed { .. } => "conversion_failed",
            LetterError::ConversionTimeout { .. } => "conversion_timeout",
            LetterError::ConversionOutputMissing { .. } => "conversion_output_missing",
            LetterError::OutputWriteFailed { .. } => "output_write_failed",
            LetterError::InvalidConfig(_) => "invalid_config",
            LetterError::RegistryLoad { .. } => "registry_load_error",
            LetterError::Internal(_) => "internal",
        }
    }
}

/// A non-fatal problem noticed while producing a letter.
///
/// Logged at `warn` level where it happens and collected into
/// [`crate::output::FillReport::warnings`].
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldWarning {
    /// No paragraph contained the `Client:` marker.
    #[error("No 'Client:' field found; client name was not inserted")]
    ClientFieldMissing,

    /// Fewer date markers were found than the template declares.
    #[error("Only {found} of {expected} date fields found")]
    DateFieldsIncomplete { found: usize, expected: usize },

    /// A scratch file or directory survived the request.
    #[error("Failed to clean up '{path}': {detail}")]
    FilesystemCleanupFailed { path: PathBuf, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_template_is_input_error() {
        let e = LetterError::UnknownTemplate {
            id: "ACME".into(),
            available: "UR Recruitment LTD".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Input);
        assert!(e.to_string().contains("ACME"));
        assert_eq!(e.code(), "unknown_template");
    }

    #[test]
    fn timeout_is_retryable() {
        let e = LetterError::ConversionTimeout { secs: 45 };
        assert_eq!(e.kind(), ErrorKind::Retryable);
        assert!(e.to_string().contains("45s"));
    }

    #[test]
    fn missing_converter_is_environment_error() {
        let e = LetterError::ConverterNotFound {
            program: "soffice".into(),
            detail: "No such file or directory".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Environment);
        assert!(e.to_string().contains("LETTERFILL_SOFFICE"));
    }

    #[test]
    fn conversion_failed_carries_stderr() {
        let e = LetterError::ConversionFailed {
            status: "exit status: 1".into(),
            stderr: "Error: source file could not be loaded".into(),
        };
        assert!(e.to_string().contains("could not be loaded"));
        assert_eq!(e.code(), "conversion_failed");
    }

    #[test]
    fn warning_display() {
        let w = FieldWarning::DateFieldsIncomplete {
            found: 1,
            expected: 2,
        };
        assert_eq!(w.to_string(), "Only 1 of 2 date fields found");
    }

    #[test]
    fn warning_serializes_with_tag() {
        let json = serde_json::to_string(&FieldWarning::ClientFieldMissing).unwrap();
        assert_eq!(json, r#"{"type":"client_field_missing"}"#);
    }
}
