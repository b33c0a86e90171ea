//! Per-request scratch space.
//!
//! Every request gets its own directory for the filled DOCX, the converter's
//! PDF and (optionally) an isolated office profile. Concurrent requests never
//! share a path, so two letters for the same client cannot overwrite each
//! other mid-conversion.
//!
//! The directory is removed when the [`Scratch`] is dropped, which covers
//! every early `?` return; a failed removal there is logged. The success
//! path calls [`Scratch::close`] instead so the failure also lands in the
//! request's report.

use crate::error::{FieldWarning, LetterError};
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir};
use tracing::{debug, warn};
use uuid::Uuid;

/// A uniquely named temporary directory owned by one request.
#[derive(Debug)]
pub struct Scratch {
    /// `None` once removed.
    dir: Option<TempDir>,
    path: PathBuf,
    token: String,
}

impl Scratch {
    /// Create a scratch directory under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self, LetterError> {
        let token = Uuid::new_v4().simple().to_string();
        let mut builder = Builder::new();
        builder.prefix("letterfill-");
        let dir = match parent {
            Some(p) => builder.tempdir_in(p),
            None => builder.tempdir(),
        }
        .map_err(|e| LetterError::DocumentWrite {
            path: parent.map(Path::to_path_buf).unwrap_or_else(std::env::temp_dir),
            detail: format!("cannot create scratch directory: {e}"),
        })?;

        debug!("Created scratch dir {}", dir.path().display());
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            token,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Random token unique to this request.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// A path inside the scratch directory tagged with this request's token,
    /// e.g. `letter-<token>.docx`.
    pub fn unique_file(&self, stem: &str, extension: &str) -> PathBuf {
        self.path
            .join(format!("{stem}-{}.{extension}", self.token))
    }

    /// Remove the directory, reporting a failure as a warning.
    pub fn close(mut self) -> Option<FieldWarning> {
        self.remove()
    }

    fn remove(&mut self) -> Option<FieldWarning> {
        let dir = self.dir.take()?;
        match dir.close() {
            Ok(()) => {
                debug!("Removed scratch dir {}", self.path.display());
                None
            }
            Err(e) => {
                warn!("Failed to remove scratch dir {}: {}", self.path.display(), e);
                Some(FieldWarning::FilesystemCleanupFailed {
                    path: self.path.clone(),
                    detail: e.to_string(),
                })
            }
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        // `remove` logs the failure.
        let _ = self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn scratch_dirs_are_distinct_and_removed() {
        let parent = tempfile::tempdir().unwrap();
        let a = Scratch::create(Some(parent.path())).unwrap();
        let b = Scratch::create(Some(parent.path())).unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.token(), b.token());

        let a_path = a.path().to_path_buf();
        std::fs::write(a.unique_file("letter", "docx"), b"x").unwrap();
        assert!(a.close().is_none());
        assert!(!a_path.exists());

        let b_path = b.path().to_path_buf();
        drop(b);
        assert!(!b_path.exists());
    }

    #[test]
    fn unique_file_carries_token() {
        let s = Scratch::create(None).unwrap();
        let p = s.unique_file("letter", "docx");
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("letter-"));
        assert!(name.ends_with(".docx"));
        assert!(name.contains(s.token()));
        assert_eq!(p.parent(), Some(s.path()));
    }

    /// Swap the scratch directory for a plain file so removal fails.
    fn sabotage(s: &Scratch) {
        std::fs::remove_dir_all(s.path()).unwrap();
        std::fs::write(s.path(), b"in the way").unwrap();
    }

    #[test]
    fn failed_close_is_reported() {
        let parent = tempfile::tempdir().unwrap();
        let s = Scratch::create(Some(parent.path())).unwrap();
        let path = s.path().to_path_buf();
        sabotage(&s);

        match s.close() {
            Some(FieldWarning::FilesystemCleanupFailed { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected cleanup warning, got {other:?}"),
        }
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_cleanup_on_drop_is_logged() {
        let parent = tempfile::tempdir().unwrap();
        let s = Scratch::create(Some(parent.path())).unwrap();
        let path = s.path().display().to_string();
        sabotage(&s);

        let logs = Captured::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || drop(s));

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("WARN"), "{text}");
        assert!(text.contains("Failed to remove scratch dir"), "{text}");
        assert!(text.contains(&path), "{text}");
    }

    #[test]
    fn missing_parent_is_write_error() {
        let err = Scratch::create(Some(Path::new("/no/such/parent"))).unwrap_err();
        assert!(matches!(err, LetterError::DocumentWrite { .. }));
    }
}
