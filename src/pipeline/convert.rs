//! DOCX → PDF conversion through an external office suite.
//!
//! ## Why a subprocess?
//!
//! Laying out a Word document faithfully (fonts, tables, embedded images,
//! headers) is the office suite's job; no Rust crate reproduces it. The
//! library therefore treats the converter as an opaque program that reads a
//! DOCX and writes a PDF next to it, and bounds it three ways:
//!
//! * **Time**: the child is killed once `timeout` elapses.
//! * **Output**: success is only believed if a non-empty PDF exists,
//!   because `soffice` exits 0 even when it could not load the input.
//! * **Space**: it only ever writes into the request's scratch directory.
//!
//! ## Why an isolated profile?
//!
//! Two `soffice` processes sharing a user profile do not run side by side:
//! the second hands its job to the first over a pipe and exits, or fails on
//! the profile lock. Pointing each run at a profile inside its own scratch
//! directory makes concurrent conversions independent, at the cost of a
//! slower cold start.

use crate::error::LetterError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Longest stderr excerpt carried inside [`LetterError::ConversionFailed`].
const STDERR_LIMIT: usize = 2_000;

/// Name of the per-run profile directory inside the scratch directory.
const PROFILE_DIR: &str = "soffice-profile";

/// An external program that turns `input` (a DOCX) into a PDF in `out_dir`.
///
/// Implementations only describe the command; spawning, timing out and
/// verifying output is done by [`convert`].
pub trait Converter: Send + Sync {
    /// Program name for logs and error messages.
    fn program(&self) -> String;

    /// Build the command converting `input` into `out_dir`.
    fn command(&self, input: &Path, out_dir: &Path) -> Command;

    /// Where the command leaves its PDF. Default: `<out_dir>/<input stem>.pdf`.
    fn output_path(&self, input: &Path, out_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        out_dir.join(format!("{stem}.pdf"))
    }
}

// ── LibreOffice ──────────────────────────────────────────────────────────────

/// Headless LibreOffice (`soffice --headless --convert-to pdf`).
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    /// Explicit binary. If None, located via [`soffice_locate::find_soffice`].
    pub program: Option<PathBuf>,
    /// Give every run its own profile directory. Default: true.
    pub isolated_profile: bool,
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self {
            program: None,
            isolated_profile: true,
        }
    }
}

impl SofficeConverter {
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(program.into()),
            ..Self::default()
        }
    }

    /// Share one persistent profile between runs (faster, but serialises
    /// conversions inside the office suite).
    pub fn shared_profile(mut self) -> Self {
        self.isolated_profile = false;
        self
    }

    fn resolve_program(&self) -> PathBuf {
        if let Some(p) = &self.program {
            return p.clone();
        }
        match soffice_locate::find_soffice() {
            Ok(p) => p,
            Err(e) => {
                // Spawning the bare name yields ConverterNotFound with a clear message.
                debug!("soffice lookup failed ({}); falling back to PATH lookup", e);
                PathBuf::from("soffice")
            }
        }
    }
}

impl Converter for SofficeConverter {
    fn program(&self) -> String {
        self.resolve_program().display().to_string()
    }

    fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let profile = if self.isolated_profile {
            out_dir.join(PROFILE_DIR)
        } else {
            soffice_locate::profile_root()
        };

        let mut cmd = Command::new(self.resolve_program());
        cmd.arg(format!("-env:UserInstallation={}", file_url(&profile)))
            .args([
                "--headless",
                "--norestore",
                "--nolockcheck",
                "--convert-to",
                "pdf",
                "--outdir",
            ])
            .arg(out_dir)
            .arg(input);
        cmd
    }
}

// ── Generic command ──────────────────────────────────────────────────────────

/// Any program taking the input and output directory as arguments.
///
/// Arguments are templates: `{input}` and `{outdir}` are replaced by the
/// DOCX path and the scratch directory.
///
/// ```rust
/// use letterfill::CommandConverter;
///
/// let c = CommandConverter::new("docx2pdf", ["{input}", "{outdir}"]);
/// assert_eq!(c.args.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CommandConverter {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandConverter {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Converter for CommandConverter {
    fn program(&self) -> String {
        self.program.display().to_string()
    }

    fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let input = input.to_string_lossy();
        let out_dir = out_dir.to_string_lossy();
        let mut cmd = Command::new(&self.program);
        for arg in &self.args {
            cmd.arg(arg.replace("{input}", &input).replace("{outdir}", &out_dir));
        }
        cmd
    }
}

// ── Running ──────────────────────────────────────────────────────────────────

/// Convert `input` to `<out_dir>/<file_stem>.pdf`, where `out_dir` is the
/// directory containing `input`.
///
/// The converter's whole process group is killed if `timeout` elapses; its
/// partial output is left for the caller's scratch cleanup.
pub async fn convert(
    converter: &dyn Converter,
    input: &Path,
    file_stem: &str,
    timeout: Duration,
) -> Result<PathBuf, LetterError> {
    let out_dir = input
        .parent()
        .ok_or_else(|| LetterError::Internal(format!("'{}' has no parent", input.display())))?;
    let produced = converter.output_path(input, out_dir);
    let program = converter.program();

    let mut cmd = converter.command(input, out_dir);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    // soffice is a launcher that forks the real office process; a group of
    // its own lets a timeout take down every descendant.
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("Running converter: {:?}", cmd);
    let started = std::time::Instant::now();

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LetterError::ConverterNotFound {
                program: program.clone(),
                detail: e.to_string(),
            }
        } else {
            LetterError::ConversionFailed {
                status: "spawn failed".into(),
                stderr: e.to_string(),
            }
        }
    })?;
    // Declared after `child` so it drops first, while the leader is unreaped.
    let mut group = ProcessGroup::new(child.id());

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let waited = tokio::time::timeout(timeout, async {
        tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr))
    })
    .await;

    let (status, stdout, stderr) = match waited {
        Ok((status, stdout, stderr)) => {
            group.disarm();
            let status = status.map_err(|e| LetterError::ConversionFailed {
                status: "wait failed".into(),
                stderr: e.to_string(),
            })?;
            (status, stdout, stderr)
        }
        Err(_) => {
            group.kill();
            if let Err(e) = child.kill().await {
                debug!("Reaping timed-out converter failed: {}", e);
            }
            warn!(
                "Converter '{}' exceeded {}s; killed",
                program,
                timeout.as_secs()
            );
            return Err(LetterError::ConversionTimeout {
                secs: timeout.as_secs(),
            });
        }
    };

    if !status.success() {
        let stderr = summarize_output(&stderr, &stdout);
        warn!("Converter '{}' failed ({}): {}", program, status, stderr);
        return Err(LetterError::ConversionFailed {
            status: status.to_string(),
            stderr,
        });
    }

    match tokio::fs::metadata(&produced).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        _ => {
            warn!(
                "Converter '{}' exited 0 but left no PDF; output: {}",
                program,
                summarize_output(&stderr, &stdout)
            );
            return Err(LetterError::ConversionOutputMissing { path: produced });
        }
    }

    let target = out_dir.join(format!("{file_stem}.pdf"));
    if target != produced {
        tokio::fs::rename(&produced, &target)
            .await
            .map_err(|e| LetterError::Internal(format!("Failed to rename converter output: {e}")))?;
    }

    info!(
        "Converted {} → {} in {}ms",
        input.display(),
        target.display(),
        started.elapsed().as_millis()
    );
    Ok(target)
}

/// Drain a child's pipe; read errors just end the capture.
async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!("Converter pipe read failed: {}", e);
        }
    }
    buf
}

/// The converter's process group. Killed on drop unless disarmed, so a
/// cancelled request does not leave office processes behind either.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(leader: Option<u32>) -> Self {
        Self { pgid: leader }
    }

    /// The leader has been reaped; its id may be reused from here on.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    #[cfg(unix)]
    fn kill(&mut self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => debug!("Killed converter process group {}", pgid),
            Err(e) => warn!("Failed to kill converter process group {}: {}", pgid, e),
        }
    }

    #[cfg(not(unix))]
    fn kill(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Trimmed stderr (or stdout, if stderr is empty), capped at [`STDERR_LIMIT`].
fn summarize_output(stderr: &[u8], stdout: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = if text.trim().is_empty() {
        String::from_utf8_lossy(stdout)
    } else {
        text
    };
    let text = text.trim();
    match text.char_indices().nth(STDERR_LIMIT) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// `file://` URL for a local path, as soffice's `-env:` switch expects.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/").replace(' ', "%20");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn soffice_command_line() {
        let c = SofficeConverter::with_program("/usr/bin/soffice");
        let cmd = c.command(Path::new("/tmp/s/letter.docx"), Path::new("/tmp/s"));
        assert_eq!(cmd.as_std().get_program(), "/usr/bin/soffice");
        let args = args_of(&cmd);
        assert_eq!(args[0], "-env:UserInstallation=file:///tmp/s/soffice-profile");
        assert!(args.contains(&"--headless".to_string()));
        let i = args.iter().position(|a| a == "--convert-to").unwrap();
        assert_eq!(args[i + 1], "pdf");
        assert_eq!(args[args.len() - 2], "/tmp/s");
        assert_eq!(args[args.len() - 1], "/tmp/s/letter.docx");
    }

    #[test]
    fn shared_profile_points_outside_scratch() {
        let c = SofficeConverter::with_program("soffice").shared_profile();
        let cmd = c.command(Path::new("/tmp/s/letter.docx"), Path::new("/tmp/s"));
        let args = args_of(&cmd);
        assert!(!args[0].contains("/tmp/s/"));
    }

    #[test]
    fn default_output_path_uses_input_stem() {
        let c = SofficeConverter::default();
        assert_eq!(
            c.output_path(Path::new("/x/letter-ab.docx"), Path::new("/x")),
            PathBuf::from("/x/letter-ab.pdf")
        );
    }

    #[test]
    fn command_converter_substitutes_placeholders() {
        let c = CommandConverter::new("conv", ["--in={input}", "{outdir}"]);
        let cmd = c.command(Path::new("/a/b.docx"), Path::new("/a"));
        assert_eq!(args_of(&cmd), vec!["--in=/a/b.docx", "/a"]);
    }

    #[test]
    fn file_url_forms() {
        assert_eq!(file_url(Path::new("/tmp/a b")), "file:///tmp/a%20b");
        assert_eq!(file_url(Path::new("C:\\x\\y")), "file:///C:/x/y");
    }

    #[test]
    fn summarize_prefers_stderr_and_truncates() {
        assert_eq!(summarize_output(b"  boom \n", b"ignored"), "boom");
        assert_eq!(summarize_output(b"", b"from stdout"), "from stdout");
        let long = "é".repeat(STDERR_LIMIT + 10);
        let s = summarize_output(long.as_bytes(), b"");
        assert_eq!(s.chars().count(), STDERR_LIMIT + 1);
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;

        fn sh(script: &str) -> CommandConverter {
            CommandConverter::new("sh", ["-c", script, "sh", "{input}", "{outdir}"])
        }

        fn input_in(dir: &Path) -> PathBuf {
            let p = dir.join("letter-x.docx");
            std::fs::write(&p, b"PK\x03\x04").unwrap();
            p
        }

        #[tokio::test]
        async fn success_renames_to_requested_stem() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let c = sh(r#"printf '%%PDF-1.4 fake' > "$2/$(basename "$1" .docx).pdf""#);
            let out = convert(&c, &input, "ACME Ltd", Duration::from_secs(10))
                .await
                .unwrap();
            assert_eq!(out, dir.path().join("ACME Ltd.pdf"));
            assert!(std::fs::read(&out).unwrap().starts_with(b"%PDF"));
            assert!(!dir.path().join("letter-x.pdf").exists());
        }

        #[tokio::test]
        async fn nonzero_exit_carries_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let c = sh("echo 'source file could not be loaded' >&2; exit 3");
            let err = convert(&c, &input, "x", Duration::from_secs(10))
                .await
                .unwrap_err();
            match err {
                LetterError::ConversionFailed { stderr, .. } => {
                    assert!(stderr.contains("could not be loaded"))
                }
                other => panic!("unexpected: {other}"),
            }
        }

        #[tokio::test]
        async fn zero_exit_without_pdf_is_output_missing() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let err = convert(&sh("exit 0"), &input, "x", Duration::from_secs(10))
                .await
                .unwrap_err();
            assert!(matches!(err, LetterError::ConversionOutputMissing { .. }));
        }

        #[tokio::test]
        async fn empty_pdf_is_output_missing() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let c = sh(r#": > "$2/$(basename "$1" .docx).pdf""#);
            let err = convert(&c, &input, "x", Duration::from_secs(10))
                .await
                .unwrap_err();
            assert!(matches!(err, LetterError::ConversionOutputMissing { .. }));
        }

        #[tokio::test]
        async fn slow_converter_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let started = std::time::Instant::now();
            let err = convert(&sh("exec sleep 30"), &input, "x", Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, LetterError::ConversionTimeout { secs: 1 }));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn timeout_kills_forked_worker() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let marker = dir.path().join("worker-alive");
            // A launcher that forks the real worker and waits for it.
            let launcher = CommandConverter::new(
                "sh",
                [
                    "-c",
                    r#"(sleep 2; touch "$1") & wait"#,
                    "sh",
                    marker.to_str().unwrap(),
                ],
            );

            let err = convert(&launcher, &input, "x", Duration::from_secs(1))
                .await
                .unwrap_err();
            assert!(matches!(err, LetterError::ConversionTimeout { secs: 1 }));

            tokio::time::sleep(Duration::from_secs(3)).await;
            assert!(!marker.exists(), "worker outlived the timeout");
        }

        #[tokio::test]
        async fn missing_program_is_converter_not_found() {
            let dir = tempfile::tempdir().unwrap();
            let input = input_in(dir.path());
            let c = CommandConverter::new("/definitely/not/soffice", ["{input}"]);
            let err = convert(&c, &input, "x", Duration::from_secs(5))
                .await
                .unwrap_err();
            assert!(matches!(err, LetterError::ConverterNotFound { .. }));
        }
    }
}
