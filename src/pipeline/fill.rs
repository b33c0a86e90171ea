//! The fill engine: template DOCX in, filled DOCX (in scratch space) out.
//!
//! Runs inside `spawn_blocking`: unzipping, parsing and re-deflating a
//! package is CPU-bound, and the zip reader is synchronous. The template
//! file is only ever read; the filled copy is written to `out_path`, which
//! the caller places inside the request's scratch directory.

use crate::error::{FieldWarning, LetterError};
use crate::output::FillReport;
use crate::pipeline::fields::{substitute, FieldValues};
use crate::pipeline::input::resolve_template;
use crate::pipeline::package::{DocxPackage, PackageError, DOCUMENT_PART};
use crate::pipeline::signature::prepare_stamp;
use crate::registry::TemplateSpec;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A filled copy of a template.
#[derive(Debug, Clone)]
pub struct FilledDocument {
    pub path: PathBuf,
    pub report: FillReport,
}

/// Fill `spec`'s template with `client` and `date`, writing the result to
/// `out_path`.
///
/// Missing fields are not errors: they are logged and recorded in the
/// returned report's warnings.
pub async fn fill_template(
    template_id: &str,
    spec: &TemplateSpec,
    client: &str,
    date: &str,
    out_path: &Path,
) -> Result<FilledDocument, LetterError> {
    let template_id = template_id.to_string();
    let spec = spec.clone();
    let client = client.to_string();
    let date = date.to_string();
    let out_path = out_path.to_path_buf();

    tokio::task::spawn_blocking(move || {
        fill_blocking(&template_id, &spec, &client, &date, &out_path)
    })
    .await
    .map_err(|e| LetterError::Internal(format!("Fill task panicked: {}", e)))?
}

/// Blocking implementation of [`fill_template`].
pub(crate) fn fill_blocking(
    template_id: &str,
    spec: &TemplateSpec,
    client: &str,
    date: &str,
    out_path: &Path,
) -> Result<FilledDocument, LetterError> {
    let template = resolve_template(&spec.path)?;

    let mut package = DocxPackage::open(&template).map_err(|e| load_error(&template, e))?;
    let mut document = package
        .xml_part(DOCUMENT_PART)
        .map_err(|e| load_error(&template, e))?;

    let stamp = match &spec.signature {
        Some(sig) => Some(
            prepare_stamp(&mut package, &document.root, sig).map_err(|e| {
                LetterError::DocumentLoad {
                    path: sig.image.clone(),
                    detail: e.to_string(),
                }
            })?,
        ),
        None => None,
    };

    let values = FieldValues { client, date };
    let substitution = substitute(&mut document.root, &values, &spec.rules(), stamp);

    let mut warnings = Vec::new();
    if substitution.client.is_none() {
        warn!(template = %template_id, "No 'Client:' field in template; client name not inserted");
        warnings.push(FieldWarning::ClientFieldMissing);
    }
    if substitution.dates.len() < spec.date_fields {
        warn!(
            template = %template_id,
            "Only {} of {} date fields found",
            substitution.dates.len(),
            spec.date_fields
        );
        warnings.push(FieldWarning::DateFieldsIncomplete {
            found: substitution.dates.len(),
            expected: spec.date_fields,
        });
    }

    package
        .set_xml_part(DOCUMENT_PART, &document)
        .map_err(|e| write_error(out_path, e))?;
    package.save(out_path).map_err(|e| write_error(out_path, e))?;

    debug!(
        "Filled {} → {} (client: {:?}, dates: {:?})",
        template.display(),
        out_path.display(),
        substitution.client,
        substitution.dates
    );

    Ok(FilledDocument {
        path: out_path.to_path_buf(),
        report: FillReport {
            template_id: template_id.to_string(),
            client: substitution.client,
            dates: substitution.dates,
            expected_dates: spec.date_fields,
            images_carried: substitution.images_carried,
            signature_stamped: substitution.stamped,
            warnings,
        },
    })
}

fn load_error(path: &Path, e: PackageError) -> LetterError {
    LetterError::DocumentLoad {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

fn write_error(path: &Path, e: PackageError) -> LetterError {
    LetterError::DocumentWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}
