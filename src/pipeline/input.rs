//! Template resolution: validate a registry path before anything opens it.
//!
//! ## Why check magic bytes?
//!
//! A registry entry pointing at a `.doc`, a PDF or a half-copied file would
//! otherwise surface as an opaque zip error deep inside the package reader.
//! A DOCX is a zip archive, so the first four bytes must be the local-file
//! header signature `PK\x03\x04`. Checking that up front turns a typo in the
//! registry into a one-line, actionable error.

use crate::error::LetterError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Zip local-file header signature.
const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// Check that `path` names a readable file that looks like a DOCX package.
pub fn resolve_template(path: &Path) -> Result<PathBuf, LetterError> {
    if !path.is_file() {
        return Err(LetterError::TemplateNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(LetterError::DocumentLoad {
                path: path.to_path_buf(),
                detail: "permission denied".into(),
            });
        }
        Err(_) => {
            return Err(LetterError::TemplateNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || magic != ZIP_MAGIC {
        return Err(LetterError::DocumentLoad {
            path: path.to_path_buf(),
            detail: format!(
                "not a DOCX (zip) file; starts with {:02x?}",
                &magic[..]
            ),
        });
    }

    debug!("Resolved template: {}", path.display());
    Ok(path.to_path_buf())
}
