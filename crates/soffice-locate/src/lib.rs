//! # soffice-locate
//!
//! Find a LibreOffice `soffice` executable so that callers converting
//! documents headlessly do not need to hard-code install paths.
//!
//! ## How it works
//!
//! On first call to [`find_soffice`]:
//!
//! 1. Uses `LETTERFILL_SOFFICE` if it names an existing file.
//! 2. Searches every directory on `PATH` for `soffice` / `libreoffice`.
//! 3. Checks the platform's usual install locations
//!    (`/Applications/LibreOffice.app/…`, `C:\Program Files\LibreOffice\…`,
//!    `/opt/libreoffice*/program`, snap and flatpak exports).
//!
//! The result is cached for the life of the process.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use soffice_locate::{find_soffice, profile_root};
//!
//! let soffice = find_soffice().expect("LibreOffice not installed");
//! println!("converting with {} (profile {})", soffice.display(), profile_root().display());
//! ```
//!
//! ## Environment variable overrides
//!
//! - `LETTERFILL_SOFFICE` — path to the `soffice` binary; skips the search.
//! - `LETTERFILL_PROFILE_DIR` — override the shared user-profile directory.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable naming an explicit `soffice` binary.
pub const ENV_SOFFICE: &str = "LETTERFILL_SOFFICE";

/// Environment variable overriding [`profile_root`].
pub const ENV_PROFILE_DIR: &str = "LETTERFILL_PROFILE_DIR";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by soffice-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// `LETTERFILL_SOFFICE` is set but does not name a file.
    #[error("{ENV_SOFFICE} points at '{path}', which does not exist")]
    EnvPathMissing { path: PathBuf },

    /// No executable was found on `PATH` or in any known install location.
    #[error("LibreOffice not found (searched PATH and {} install locations)", searched.len())]
    NotFound { searched: Vec<PathBuf> },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Executable names to look for on `PATH`, most specific first.
    exe_names: &'static [&'static str],
    /// Well-known install locations of the executable.
    install_paths: Vec<PathBuf>,
}

fn detect_platform() -> PlatformInfo {
    match std::env::consts::OS {
        "macos" => PlatformInfo {
            exe_names: &["soffice", "libreoffice"],
            install_paths: vec![
                PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS/soffice"),
                PathBuf::from("/opt/homebrew/bin/soffice"),
            ],
        },
        "windows" => {
            let mut install_paths = Vec::new();
            for var in ["ProgramFiles", "ProgramFiles(x86)"] {
                if let Some(base) = std::env::var_os(var) {
                    install_paths.push(
                        PathBuf::from(base)
                            .join("LibreOffice")
                            .join("program")
                            .join("soffice.exe"),
                    );
                }
            }
            PlatformInfo {
                exe_names: &["soffice.exe", "soffice.com"],
                install_paths,
            }
        }
        _ => PlatformInfo {
            exe_names: &["soffice", "libreoffice"],
            install_paths: unix_install_paths(),
        },
    }
}

fn unix_install_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/usr/lib/libreoffice/program/soffice"),
        PathBuf::from("/usr/lib64/libreoffice/program/soffice"),
        PathBuf::from("/snap/bin/libreoffice"),
        PathBuf::from("/var/lib/flatpak/exports/bin/org.libreoffice.LibreOffice"),
    ];
    // Upstream .deb/.rpm bundles install into /opt/libreofficeX.Y.
    if let Ok(entries) = std::fs::read_dir("/opt") {
        let mut opt: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(OsStr::to_str)
                    .is_some_and(|n| n.starts_with("libreoffice"))
            })
            .map(|p| p.join("program").join("soffice"))
            .collect();
        // Newest version first.
        opt.sort();
        opt.reverse();
        paths.extend(opt);
    }
    paths
}

// ── Profile directory resolution ─────────────────────────────────────────────

/// Returns the shared LibreOffice user-profile directory.
///
/// Default locations:
/// - **macOS**: `~/Library/Caches/letterfill/soffice-profile/`
/// - **Linux**: `~/.cache/letterfill/soffice-profile/`
/// - **Windows**: `%LOCALAPPDATA%\letterfill\soffice-profile\`
///
/// Override by setting `LETTERFILL_PROFILE_DIR`.
pub fn profile_root() -> PathBuf {
    if let Some(override_dir) = std::env::var_os(ENV_PROFILE_DIR) {
        return PathBuf::from(override_dir);
    }

    let base = dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir);

    base.join("letterfill").join("soffice-profile")
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Locate the `soffice` executable, caching the answer for the process.
///
/// Failures are not cached, so installing LibreOffice while a long-running
/// service is up is picked up on the next call.
pub fn find_soffice() -> Result<PathBuf, LocateError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = locate_uncached()?;

    // Best-effort cache in the OnceLock (ignore race; both found the same file).
    let _ = RESOLVED_PATH.set(path.clone());

    Ok(path)
}

/// Run the full search without consulting or filling the cache.
pub fn locate_uncached() -> Result<PathBuf, LocateError> {
    // 1. Environment variable override.
    if let Some(env_path) = std::env::var_os(ENV_SOFFICE) {
        let p = PathBuf::from(env_path);
        if p.is_file() {
            return Ok(p);
        }
        return Err(LocateError::EnvPathMissing { path: p });
    }

    let info = detect_platform();

    // 2. PATH.
    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = search_path(info.exe_names, &path_var) {
            return Ok(found);
        }
    }

    // 3. Known install locations.
    if let Some(found) = info.install_paths.iter().find(|p| is_executable(p)) {
        return Ok(found.clone());
    }

    Err(LocateError::NotFound {
        searched: info.install_paths,
    })
}

/// Search a `PATH`-style variable for the first executable with one of `names`.
///
/// Names are tried in order across the whole path before moving on, so
/// `soffice` anywhere wins over `libreoffice` earlier on the path.
pub fn search_path(names: &[&str], path_var: &OsStr) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = std::env::split_paths(path_var).collect();
    names.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
