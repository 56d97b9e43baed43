use pdf2word::{config::Config, postprocess::LineCleaner};

#[test]
fn blank_lines_never_become_paragraphs() {
    let cfg = Config::default();
    let cleaner = LineCleaner::new(&cfg).unwrap();
    let lines = cleaner.page_lines("First line\r\n\r\n   \nSecond line   \n\u{000C}");
    assert_eq!(lines, vec!["First line", "Second line"]);
}

#[test]
fn sanitizes_control_chars() {
    let cfg = Config::default();
    let cleaner = LineCleaner::new(&cfg).unwrap();
    let lines = cleaner.page_lines("Alpha\u{0002}Beta\u{0084}\nLine\tTabbed");

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "AlphaBeta");
    assert!(lines[1].contains('\t'));
}

#[test]
fn normalizes_ligatures() {
    let cfg = Config::default();
    let cleaner = LineCleaner::new(&cfg).unwrap();
    assert_eq!(cleaner.page_lines("\u{FB01}nal"), vec!["final"]);
}

#[test]
fn drops_configured_patterns() {
    let mut cfg = Config::default();
    cfg.postprocess.drop_line_patterns = vec![r"^(?i)page\s+\d+$".into()];
    let cleaner = LineCleaner::new(&cfg).unwrap();
    let lines = cleaner.page_lines("Body text\nPage 4\n");
    assert_eq!(lines, vec!["Body text"]);
}

#[test]
fn invalid_pattern_is_an_error() {
    let mut cfg = Config::default();
    cfg.postprocess.drop_line_patterns = vec!["(".into()];
    assert!(LineCleaner::new(&cfg).is_err());
}
