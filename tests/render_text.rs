use pdfify::config::{Config, Overflow};
use pdfify::render::render_text;
use std::path::Path;

fn page_count(bytes: &[u8]) -> usize {
    lopdf::Document::load_mem(bytes)
        .expect("valid pdf")
        .get_pages()
        .len()
}

fn render_lines(dir: &Path, cfg: &Config, lines: usize) -> usize {
    let path = dir.join(format!("lines_{lines}.txt"));
    let body: String = (0..lines).map(|i| format!("line {i}\n")).collect();
    std::fs::write(&path, body).unwrap();
    let rendered = render_text(&path, cfg).unwrap();
    assert_eq!(rendered.pages, page_count(&rendered.bytes));
    rendered.pages
}

#[test]
fn empty_file_yields_one_page() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.txt");
    std::fs::write(&path, b"").unwrap();

    let rendered = render_text(&path, &Config::default()).unwrap();
    assert_eq!(rendered.pages, 1);
    assert_eq!(page_count(&rendered.bytes), 1);
}

#[test]
fn page_count_grows_with_line_count() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Config::default();

    let mut previous = 0;
    for lines in [0, 1, 3, 54, 55, 56, 110, 111, 400] {
        let pages = render_lines(dir.path(), &cfg, lines);
        assert!(pages >= previous, "{lines} lines gave {pages} < {previous}");
        previous = pages;
    }
    // 55 rows fit on a default A4 page.
    assert_eq!(render_lines(dir.path(), &cfg, 55), 1);
    assert_eq!(render_lines(dir.path(), &cfg, 56), 2);
    assert_eq!(render_lines(dir.path(), &cfg, 400), 8);
}

#[test]
fn wrapping_adds_rows_but_clipping_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long.txt");
    // 55 lines, each far wider than a row.
    let body = format!("{}\n", "word ".repeat(60)).repeat(55);
    std::fs::write(&path, body).unwrap();

    let mut cfg = Config::default();
    cfg.text.overflow = Overflow::Clip;
    assert_eq!(render_text(&path, &cfg).unwrap().pages, 1);

    cfg.text.overflow = Overflow::Wrap;
    assert!(render_text(&path, &cfg).unwrap().pages > 1);
}

#[test]
fn invalid_utf8_and_exotic_text_still_render() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.md");
    let mut body = "# Überschrift — “quoted” ∑ 日本語\n".as_bytes().to_vec();
    body.extend_from_slice(&[0xff, 0xfe, b'\n', b'(', b')', b'\\', b'\n']);
    std::fs::write(&path, body).unwrap();

    let rendered = render_text(&path, &Config::default()).unwrap();
    assert_eq!(page_count(&rendered.bytes), 1);
}

#[test]
fn rendering_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.csv");
    std::fs::write(&path, "a,b,c\n1,2,3\n").unwrap();

    let cfg = Config::default();
    let first = render_text(&path, &cfg).unwrap();
    let second = render_text(&path, &cfg).unwrap();
    assert_eq!(first.bytes, second.bytes);
}

#[test]
fn missing_file_is_a_read_error() {
    let err = render_text(Path::new("/definitely/not/here.txt"), &Config::default()).unwrap_err();
    assert!(matches!(err, pdfify::ConvertError::Read { .. }));
}
