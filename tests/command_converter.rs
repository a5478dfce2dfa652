#![cfg(unix)]

use pdfify::converter::{CommandConverter, DocumentConverter};
use pdfify::report::FileStatus;
use pdfify::{Config, ConvertError, Dispatcher};
use std::path::Path;
use std::time::{Duration, Instant};

fn sh(script: &str) -> CommandConverter {
    sh_with_timeout(script, Duration::from_secs(10))
}

fn sh_with_timeout(script: &str, timeout: Duration) -> CommandConverter {
    CommandConverter::from_parts(
        "sh",
        vec![
            "-c".into(),
            script.into(),
            "sh".into(),
            "{input}".into(),
            "{output}".into(),
        ],
        timeout,
    )
}

fn fixture(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("report.docx");
    std::fs::write(&input, b"%PDF-1.4\n% pretend\n").unwrap();
    input
}

#[test]
fn successful_conversion_returns_expected_path() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();

    let produced = sh(r#"cp "$1" "$2""#).convert_document(&input, &out).unwrap();
    assert_eq!(produced, out.canonicalize().unwrap().join("report.pdf"));
    assert!(produced.is_file());
}

#[test]
fn nonzero_exit_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());

    let err = sh("echo 'cannot parse document' >&2; exit 3")
        .convert_document(&input, dir.path())
        .unwrap_err();
    assert!(matches!(err, ConvertError::ExternalTool(_)));
    assert!(err.to_string().contains("cannot parse document"), "{err}");
}

#[test]
fn missing_output_is_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    // Stale output from an earlier run must not count as success.
    std::fs::write(out.join("report.pdf"), b"old").unwrap();

    let err = sh("exit 0").convert_document(&input, &out).unwrap_err();
    assert!(err.to_string().contains("produced no"), "{err}");
    assert!(!out.join("report.pdf").exists());
}

#[test]
fn hung_converter_is_killed() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let conv = CommandConverter::from_parts("sleep", vec!["30".into()], Duration::from_secs(1));

    let started = Instant::now();
    let err = conv.convert_document(&input, dir.path()).unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(started.elapsed() < Duration::from_secs(20));
}

#[test]
fn timeout_also_kills_forked_helpers() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    // `sh` forks `sleep`, which inherits the output pipes.
    let conv = sh_with_timeout("sleep 8; true", Duration::from_secs(1));

    let started = Instant::now();
    let err = conv.convert_document(&input, dir.path()).unwrap_err();
    assert!(err.to_string().contains("timed out after 1s"), "{err}");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "took {:?}",
        started.elapsed()
    );
}

#[test]
fn helper_left_running_after_exit_does_not_block() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let out = dir.path().join("out");
    std::fs::create_dir(&out).unwrap();
    let conv = sh(r#"sleep 8 & cp "$1" "$2""#);

    let started = Instant::now();
    let produced = conv.convert_document(&input, &out).unwrap();
    assert!(produced.is_file());
    assert!(
        started.elapsed() < Duration::from_secs(6),
        "took {:?}",
        started.elapsed()
    );
}

#[test]
fn document_sharing_a_stem_replaces_earlier_render() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("report.csv"), "a,b\n1,2\n").unwrap();
    std::fs::write(dir.path().join("report.docx"), b"x").unwrap();
    let out = dir.path().join("pdf_output");
    // Exits cleanly without writing anything.
    let dispatcher = Dispatcher::new(&Config::default(), dir.path(), &out, sh("true"));

    let report = dispatcher.run().unwrap();
    assert_eq!((report.succeeded, report.failed, report.skipped), (1, 1, 0));
    assert_eq!(report.files[0].file, "report.csv");
    assert_eq!(report.files[0].status, FileStatus::Succeeded);
    let reason = report.files[1].reason.as_deref().unwrap();
    assert!(reason.contains("produced no"), "{reason}");
    // The csv render was removed first, so it could not pass for converter output.
    assert!(!out.join("report.pdf").exists());
}

#[test]
fn unknown_program_without_args_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = fixture(dir.path());
    let conv = CommandConverter::from_parts("sh", Vec::new(), Duration::from_secs(1));

    let err = conv.convert_document(&input, dir.path()).unwrap_err();
    assert!(err.to_string().contains("document.args"), "{err}");
}

#[test]
fn absent_executable_fails_each_document_but_not_the_batch() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.docx"), b"x").unwrap();
    std::fs::write(dir.path().join("b.doc"), b"x").unwrap();
    std::fs::write(dir.path().join("c.txt"), "text").unwrap();

    let mut cfg = Config::default();
    cfg.document.program = "pdfify-missing-converter".into();
    let out = dir.path().join("pdf_output");
    let dispatcher = Dispatcher::new(&cfg, dir.path(), &out, CommandConverter::new(&cfg));

    let report = dispatcher.run().unwrap();
    assert_eq!((report.succeeded, report.failed, report.skipped), (1, 2, 0));
    for f in report.files.iter().filter(|f| f.status == FileStatus::Failed) {
        assert!(f.reason.as_deref().unwrap().contains("not found on PATH"));
    }
    assert!(out.join("c.pdf").is_file());
    assert!(!dispatcher.converter().diagnose().ok);
}

#[test]
fn diagnose_finds_installed_program() {
    let diag = CommandConverter::from_parts("sh", Vec::new(), Duration::from_secs(1)).diagnose();
    assert!(diag.ok);
    assert!(diag.resolved_path.is_some());
}
