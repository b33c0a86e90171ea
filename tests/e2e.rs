//! End-to-end tests for letterfill.
//!
//! Most tests drive the full pipeline with a stand-in converter: a shell
//! one-liner that copies the filled DOCX to `<stem>.pdf`. The "PDF" handed
//! back is then the filled document itself, so its text can be checked.
//!
//! The test against a real LibreOffice is gated behind `E2E_ENABLED`:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use letterfill::pipeline::fields::paragraph_texts;
use letterfill::pipeline::package::{DocxPackage, DOCUMENT_PART};
use letterfill::{
    generate, generate_batch, generate_to_file, CommandConverter, ErrorKind, FieldWarning,
    FillRequest, GeneratorConfig, LetterError, TemplateRegistry, TemplateSpec,
};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

// ── Test helpers ─────────────────────────────────────────────────────────────

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// A letter shaped like the production templates: the client marker split
/// across runs, a title-case date near the top and an upper-case one above
/// the signature.
const LETTER_BODY: &str = r#"
<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>UR Recruitment LTD</w:t></w:r></w:p>
<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Cli</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>ent:</w:t></w:r></w:p>
<w:p><w:r><w:t>Date:</w:t></w:r></w:p>
<w:p><w:r><w:t xml:space="preserve">Dear Sir or Madam, please find our terms below.</w:t></w:r></w:p>
<w:p><w:r><w:t>DATE:</w:t></w:r></w:p>
"#;

fn docx(body: &str) -> Vec<u8> {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    );
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in [
        ("[Content_Types].xml", CONTENT_TYPES),
        ("_rels/.rels", ROOT_RELS),
        ("word/document.xml", document.as_str()),
    ] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Registry with one template, "UR Recruitment LTD", written into `dir`.
fn registry_in(dir: &Path, body: &str) -> TemplateRegistry {
    let path = dir.join("template_ur.docx");
    std::fs::write(&path, docx(body)).unwrap();
    let mut registry = TemplateRegistry::new();
    registry.insert("UR Recruitment LTD", TemplateSpec::new(path));
    registry
}

fn config_with(converter: CommandConverter, scratch: &Path) -> GeneratorConfig {
    GeneratorConfig::builder()
        .converter(Arc::new(converter))
        .scratch_dir(scratch)
        .timeout_secs(10)
        .build()
        .unwrap()
}

/// Paragraph texts of the document carried in `bytes`.
fn texts_of(bytes: &[u8]) -> Vec<String> {
    let pkg = DocxPackage::from_bytes(bytes.to_vec()).unwrap();
    paragraph_texts(&pkg.xml_part(DOCUMENT_PART).unwrap().root)
}

fn count(texts: &[String], line: &str) -> usize {
    texts.iter().filter(|t| t.as_str() == line).count()
}

fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[cfg(unix)]
fn copying_converter() -> CommandConverter {
    CommandConverter::new(
        "sh",
        [
            "-c",
            r#"cp "$1" "$2/$(basename "$1" .docx).pdf""#,
            "sh",
            "{input}",
            "{outdir}",
        ],
    )
}

// ── Stand-in converter ───────────────────────────────────────────────────────

#[cfg(unix)]
#[tokio::test]
async fn jane_doe_letter_has_one_client_line_and_two_dates() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = config_with(copying_converter(), scratch.path());

    let request = FillRequest::new("UR Recruitment LTD", "Jane Doe", "2025-04-28").unwrap();
    let artifact = generate(&registry, &request, &config).await.unwrap();

    assert_eq!(artifact.file_name, "Jane Doe.pdf");
    assert!(artifact.report.warnings.is_empty(), "{:?}", artifact.report.warnings);
    assert!(artifact.report.is_complete());

    let texts = texts_of(&artifact.bytes);
    assert_eq!(count(&texts, "Client: Jane Doe"), 1, "{texts:?}");
    assert_eq!(count(&texts, "Date: 2025-04-28"), 2, "{texts:?}");
    assert!(texts.iter().all(|t| t != "DATE:" && t != "Client:"));
    assert!(texts.contains(&"Dear Sir or Madam, please find our terms below.".to_string()));

    assert_eq!(entries(scratch.path()), 0, "scratch directory left behind");
}

#[cfg(unix)]
#[tokio::test]
async fn template_file_is_never_modified() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let template = dir.path().join("template_ur.docx");
    let before = std::fs::read(&template).unwrap();

    let config = config_with(copying_converter(), scratch.path());
    for client in ["ACME Ltd", "Globex"] {
        let request = FillRequest::new("UR Recruitment LTD", client, "28 April 2025").unwrap();
        generate(&registry, &request, &config).await.unwrap();
    }

    assert_eq!(std::fs::read(&template).unwrap(), before);
}

#[cfg(unix)]
#[tokio::test]
async fn missing_client_field_still_produces_a_letter() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(
        dir.path(),
        r#"<w:p><w:r><w:t>Date:</w:t></w:r></w:p><w:p><w:r><w:t>Date:</w:t></w:r></w:p>"#,
    );
    let config = config_with(copying_converter(), scratch.path());

    let request = FillRequest::new("UR Recruitment LTD", "ACME", "28.04.2025").unwrap();
    let artifact = generate(&registry, &request, &config).await.unwrap();

    assert_eq!(artifact.report.warnings, vec![FieldWarning::ClientFieldMissing]);
    assert_eq!(count(&texts_of(&artifact.bytes), "Date: 2025-04-28"), 2);
}

#[cfg(unix)]
#[tokio::test]
async fn generate_to_file_writes_the_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = config_with(copying_converter(), scratch.path());
    let out = dir.path().join("letters").join("jane.pdf");

    let request = FillRequest::new("UR Recruitment LTD", "Jane Doe", "2025-04-28").unwrap();
    let artifact = generate_to_file(&registry, &request, &out, &config)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&out).unwrap(), artifact.bytes);
    assert!(!out.with_extension("pdf.tmp").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn concurrent_requests_produce_distinct_letters() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = GeneratorConfig::builder()
        .converter(Arc::new(copying_converter()))
        .scratch_dir(scratch.path())
        .concurrency(10)
        .build()
        .unwrap();

    let requests: Vec<FillRequest> = (0..10)
        .map(|i| FillRequest::new("UR Recruitment LTD", format!("Client {i}"), "2025-04-28").unwrap())
        .collect();
    let items = generate_batch(&registry, requests, &config).await;

    assert_eq!(items.len(), 10);
    let mut names = std::collections::HashSet::new();
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.index, i);
        let artifact = item.result.as_ref().unwrap();
        assert!(names.insert(artifact.file_name.clone()));
        let texts = texts_of(&artifact.bytes);
        assert_eq!(count(&texts, &format!("Client: Client {i}")), 1);
    }
    assert_eq!(entries(scratch.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn batch_failures_stay_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = config_with(copying_converter(), scratch.path());

    let requests = vec![
        FillRequest::new("UR Recruitment LTD", "ACME", "today").unwrap(),
        FillRequest::new("No Such Company", "Globex", "today").unwrap(),
        FillRequest::new("UR Recruitment LTD", "Initech", "today").unwrap(),
    ];
    let items = generate_batch(&registry, requests, &config).await;

    assert!(items[0].is_ok());
    assert!(matches!(
        items[1].result,
        Err(LetterError::UnknownTemplate { .. })
    ));
    assert!(items[2].is_ok());
}

#[cfg(unix)]
#[tokio::test]
async fn hung_converter_is_killed_and_scratch_removed() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = GeneratorConfig::builder()
        .converter(Arc::new(CommandConverter::new("sh", ["-c", "exec sleep 30"])))
        .scratch_dir(scratch.path())
        .timeout_secs(1)
        .build()
        .unwrap();

    let started = std::time::Instant::now();
    let request = FillRequest::new("UR Recruitment LTD", "ACME", "today").unwrap();
    let err = generate(&registry, &request, &config).await.unwrap_err();

    assert!(matches!(err, LetterError::ConversionTimeout { secs: 1 }), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::Retryable);
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
    assert_eq!(entries(scratch.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn timed_out_launcher_takes_its_worker_down() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let witness = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let marker = witness.path().join("worker-alive");
    // Like soffice: the launcher forks the process doing the work.
    let launcher = CommandConverter::new(
        "sh",
        [
            "-c",
            r#"(sleep 2; touch "$1") & wait"#,
            "sh",
            marker.to_str().unwrap(),
        ],
    );
    let config = GeneratorConfig::builder()
        .converter(Arc::new(launcher))
        .scratch_dir(scratch.path())
        .timeout_secs(1)
        .build()
        .unwrap();

    let request = FillRequest::new("UR Recruitment LTD", "ACME", "today").unwrap();
    let err = generate(&registry, &request, &config).await.unwrap_err();
    assert!(matches!(err, LetterError::ConversionTimeout { .. }), "got: {err}");

    tokio::time::sleep(std::time::Duration::from_secs(3)).await;
    assert!(!marker.exists(), "worker kept running after the timeout");
    assert_eq!(entries(scratch.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn failing_converter_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = config_with(
        CommandConverter::new("sh", ["-c", "echo 'source file could not be loaded' >&2; exit 3"]),
        scratch.path(),
    );

    let request = FillRequest::new("UR Recruitment LTD", "ACME", "today").unwrap();
    match generate(&registry, &request, &config).await.unwrap_err() {
        LetterError::ConversionFailed { stderr, .. } => {
            assert_eq!(stderr, "source file could not be loaded")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(entries(scratch.path()), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn silent_converter_is_not_trusted() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = config_with(CommandConverter::new("sh", ["-c", "exit 0"]), scratch.path());

    let request = FillRequest::new("UR Recruitment LTD", "ACME", "today").unwrap();
    let err = generate(&registry, &request, &config).await.unwrap_err();
    assert!(matches!(err, LetterError::ConversionOutputMissing { .. }), "got: {err}");
}

#[tokio::test]
async fn missing_converter_binary_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = config_with(
        CommandConverter::new("/nonexistent/letterfill-soffice", ["{input}"]),
        scratch.path(),
    );

    let request = FillRequest::new("UR Recruitment LTD", "ACME", "today").unwrap();
    let err = generate(&registry, &request, &config).await.unwrap_err();
    assert!(matches!(err, LetterError::ConverterNotFound { .. }), "got: {err}");
    assert_eq!(entries(scratch.path()), 0);
}

#[tokio::test]
async fn corrupt_template_is_a_load_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.docx");
    std::fs::write(&path, b"PK\x03\x04 truncated").unwrap();
    let mut registry = TemplateRegistry::new();
    registry.insert("Broken", TemplateSpec::new(path));

    let request = FillRequest::new("Broken", "ACME", "today").unwrap();
    let err = generate(&registry, &request, &GeneratorConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LetterError::DocumentLoad { .. }), "got: {err}");
}

// ── Real LibreOffice ─────────────────────────────────────────────────────────

/// Skip unless E2E_ENABLED is set and soffice can be found.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match soffice_locate::find_soffice() {
            Ok(p) => p,
            Err(e) => {
                println!("SKIP — {e}");
                return;
            }
        }
    }};
}

#[tokio::test]
async fn test_soffice_renders_pdf() {
    let soffice: PathBuf = e2e_skip_unless_ready!();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("letterfill=debug"))
        .with_test_writer()
        .try_init();
    println!("Using {}", soffice.display());

    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path(), LETTER_BODY);
    let config = GeneratorConfig::builder()
        .converter(Arc::new(letterfill::SofficeConverter::with_program(&soffice)))
        .timeout_secs(120)
        .build()
        .unwrap();

    let request = FillRequest::new("UR Recruitment LTD", "Jane Doe", "2025-04-28").unwrap();
    let artifact = generate(&registry, &request, &config).await.unwrap();

    assert!(artifact.bytes.starts_with(b"%PDF-"), "not a PDF");
    assert!(artifact.report.is_complete());
    println!(
        "{}: {} bytes in {}ms",
        artifact.file_name, artifact.stats.output_bytes, artifact.stats.total_duration_ms
    );
}
