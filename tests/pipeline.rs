mod common;

use common::{Layout, MockEngine, TableScript, table, test_config, write_pdf};
use pdf2word::docx;
use pdf2word::engine::TableMode;
use pdf2word::error::ConversionError;
use pdf2word::pipeline::Pipeline;
use pdf2word::ocr::OcrStrategy;
use pdf2word::report::{Extractor, JobState, JobReport};
use std::sync::Mutex;
use std::time::Duration;

#[test]
fn digital_pdf_converts_without_touching_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "report.pdf");
    let output = dir.path().join("out").join("report.docx");

    let pipeline = Pipeline::new(&cfg, MockEngine::digital(4));
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert!(std::fs::metadata(&output).unwrap().len() >= 1024);
    let engine = pipeline.engine();
    assert_eq!(engine.count("convert_layout"), 1);
    assert_eq!(engine.count("rasterize"), 0);
    assert_eq!(engine.count("recognize_text"), 0);
    // Only the sampled pages are read.
    assert_eq!(engine.count("page_text:4"), 0);

    let attempts = &outcome.report.attempts;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].extractor, Extractor::Digital);
    assert!(attempts[0].ok);

    let report_path = JobReport::path_for(&output, ".report.json");
    let raw = std::fs::read_to_string(report_path).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["state"], "succeeded");
    assert_eq!(json["decision"]["route"], "Digital");
}

#[test]
fn failed_digital_attempt_falls_back_to_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "broken.pdf");
    let output = dir.path().join("broken.docx");

    let engine = MockEngine::digital(2)
        .with_layout(Layout::Fail)
        .with_ocr(vec![Some("First page"), Some("Second page")]);
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    let summary = docx::inspect(&output).unwrap();
    assert_eq!(summary.paragraphs, vec!["First page", "Second page"]);
    assert_eq!(summary.page_breaks, 1);

    let attempts = &outcome.report.attempts;
    assert_eq!(attempts.len(), 2);
    assert!(!attempts[0].ok);
    assert!(attempts[0].reason.as_deref().unwrap().contains("crashed"));
    assert_eq!(attempts[1].extractor, Extractor::Ocr);
    assert!(attempts[1].ok);
}

#[test]
fn undersized_digital_output_counts_as_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "tiny.pdf");
    let output = dir.path().join("tiny.docx");

    let engine = MockEngine::digital(1)
        .with_layout(Layout::Tiny)
        .with_ocr(vec![Some("Recovered by OCR")]);
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(pipeline.engine().count("recognize_text"), 1);
    let summary = docx::inspect(&output).unwrap();
    assert_eq!(summary.paragraphs, vec!["Recovered by OCR"]);
}

#[test]
fn scanned_pages_keep_order_with_breaks_between() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.ocr.workers = 3;
    cfg.ocr.pages_per_batch = 2;
    cfg.ocr.min_pages_per_batch = 1;
    let input = write_pdf(dir.path(), "scan.pdf");
    let output = dir.path().join("scan.docx");

    let engine = MockEngine::scanned(vec![
        Some("Alpha\n\n  \nBeta  "),
        Some("Gamma"),
        Some(""),
        Some("Delta\r\nEpsilon"),
    ]);
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(pipeline.engine().count("convert_layout"), 0);
    assert_eq!(pipeline.engine().count("rasterize"), 2);

    let summary = docx::inspect(&output).unwrap();
    assert_eq!(summary.paragraphs, vec!["Alpha", "Beta", "Gamma", "Delta", "Epsilon"]);
    assert_eq!(summary.page_breaks, 3);

    let ocr = outcome.report.ocr.as_ref().unwrap();
    assert_eq!(ocr.pages_total, 4);
    assert_eq!(ocr.pages_empty, 1);
}

#[test]
fn failed_pages_are_skipped_but_keep_their_break() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "scan.pdf");
    let output = dir.path().join("scan.docx");

    let engine = MockEngine::scanned(vec![Some("one"), None, Some("three")]);
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    let summary = docx::inspect(&output).unwrap();
    assert_eq!(summary.paragraphs, vec!["one", "three"]);
    assert_eq!(summary.page_breaks, 2);
    assert_eq!(outcome.report.ocr.as_ref().unwrap().pages_failed, 1);
}

#[test]
fn raster_files_do_not_outlive_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "scan.pdf");
    let output = dir.path().join("scan.docx");

    let pipeline = Pipeline::new(&cfg, MockEngine::scanned(vec![Some("a"), Some("b")]));
    assert!(pipeline.convert(&input, &output).succeeded());

    let leftovers: Vec<_> = walk(&dir.path().join("work"))
        .into_iter()
        .filter(|p| p.extension().is_some_and(|e| e == "png"))
        .collect();
    assert!(leftovers.is_empty(), "{leftovers:?}");
}

#[test]
fn total_extraction_failure_fails_without_augmentation() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "doomed.pdf");
    let output = dir.path().join("doomed.docx");

    let mut engine = MockEngine::digital(2).with_layout(Layout::Fail);
    engine.rasterize_fails = true;
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(!outcome.succeeded());
    assert_eq!(outcome.state, JobState::Failed);
    match outcome.failure.as_ref().unwrap() {
        ConversionError::Extraction { digital, ocr } => {
            assert!(digital.contains("crashed"));
            assert!(ocr.contains("no page could be recognized"));
        }
        other => panic!("unexpected failure {other:?}"),
    }
    assert!(!output.exists());
    let calls = pipeline.engine().calls();
    assert!(!calls.iter().any(|c| c.starts_with("extract_tables")));
}

#[test]
fn scanned_ocr_failure_is_reported_as_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "scan.pdf");
    let output = dir.path().join("scan.docx");

    let pipeline = Pipeline::new(&cfg, MockEngine::scanned(vec![None, None]));
    let outcome = pipeline.convert(&input, &output);

    assert!(matches!(outcome.failure, Some(ConversionError::Ocr(_))));
    assert_eq!(pipeline.engine().count("convert_layout"), 0);
}

#[test]
fn lattice_tables_are_appended_after_the_base_content() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "tables.pdf");
    let output = dir.path().join("tables.docx");

    let grid = table(&[&["Item", "Qty"], &["Bolt", "4"], &["Nut", "8"]]);
    let engine = MockEngine::digital(1)
        .with_tables(TableMode::Lattice, TableScript::Found(vec![grid]))
        .with_tables(TableMode::Stream, TableScript::Found(vec![table(&[&["x"]])]));
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(pipeline.engine().count("extract_tables:stream"), 0);

    let summary = docx::inspect(&output).unwrap();
    assert_eq!(
        summary.paragraphs,
        vec!["Quarterly report", "Body text from the layout converter.", "Extracted Table 1"]
    );
    assert_eq!(summary.bold_paragraphs, vec!["Extracted Table 1"]);
    assert_eq!(summary.page_breaks, 1);
    assert_eq!(summary.tables, vec![(3, 2)]);

    let tables = outcome.report.tables.as_ref().unwrap();
    assert_eq!(tables.strategy, Some(TableMode::Lattice));
    assert_eq!(tables.tables_appended, 1);
}

#[test]
fn empty_lattice_result_moves_on_to_stream() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "tables.pdf");
    let output = dir.path().join("tables.docx");

    let engine = MockEngine::digital(1)
        .with_tables(TableMode::Lattice, TableScript::Found(Vec::new()))
        .with_tables(
            TableMode::Stream,
            TableScript::Found(vec![
                table(&[&["a", "b", "c"], &["1", "2", "3"]]),
                table(&[&["k", "v"], &["x", "y"], &["z", "w"], &["p", "q"]]),
            ]),
        );
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    let summary = docx::inspect(&output).unwrap();
    assert_eq!(summary.bold_paragraphs, vec!["Extracted Table 1", "Extracted Table 2"]);
    assert_eq!(summary.tables, vec![(2, 3), (4, 2)]);
    assert_eq!(summary.page_breaks, 2);
    assert_eq!(pipeline.engine().count("extract_tables:text_layout"), 0);
}

#[test]
fn failing_table_strategies_leave_the_document_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "plain.pdf");
    let output = dir.path().join("plain.docx");

    let engine = MockEngine::digital(1)
        .with_tables(TableMode::Lattice, TableScript::Fail)
        .with_tables(TableMode::Stream, TableScript::Fail)
        .with_tables(TableMode::TextLayout, TableScript::Fail);
    let base = engine.base_docx.clone();
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(std::fs::read(&output).unwrap(), base);
    let tables = outcome.report.tables.as_ref().unwrap();
    assert!(!tables.appended());
    assert_eq!(tables.attempts.len(), 3);
    assert!(tables.attempts.iter().all(|a| a.error.is_some()));
}

#[test]
fn disabled_tables_are_never_queried() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.tables.enabled = false;
    let input = write_pdf(dir.path(), "plain.pdf");
    let output = dir.path().join("plain.docx");

    let engine = MockEngine::digital(1)
        .with_tables(TableMode::Lattice, TableScript::Found(vec![table(&[&["a"]])]));
    let pipeline = Pipeline::new(&cfg, engine);
    assert!(pipeline.convert(&input, &output).succeeded());
    assert!(!pipeline.engine().calls().iter().any(|c| c.starts_with("extract_tables")));
}

#[test]
fn repeated_runs_produce_the_same_document() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "again.pdf");
    let output = dir.path().join("again.docx");

    let engine = MockEngine::digital(1).with_tables(
        TableMode::Lattice,
        TableScript::Found(vec![table(&[&["h1", "h2"], &["v1", "v2"]])]),
    );
    let pipeline = Pipeline::new(&cfg, engine);

    assert!(pipeline.convert(&input, &output).succeeded());
    let first = docx::inspect(&output).unwrap();
    assert!(pipeline.convert(&input, &output).succeeded());
    let second = docx::inspect(&output).unwrap();
    assert_eq!(first, second);
    assert_eq!(second.tables.len(), 1);
}

#[test]
fn output_below_the_size_floor_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.limits.min_output_bytes = 10 * 1024 * 1024;
    let input = write_pdf(dir.path(), "scan.pdf");
    let output = dir.path().join("scan.docx");

    let pipeline = Pipeline::new(&cfg, MockEngine::scanned(vec![Some("short")]));
    let outcome = pipeline.convert(&input, &output);

    match outcome.failure.as_ref().unwrap() {
        ConversionError::Validation(reason) => assert!(reason.contains("output too small")),
        other => panic!("unexpected failure {other:?}"),
    }
    assert!(
        outcome
            .failure
            .as_ref()
            .unwrap()
            .to_string()
            .starts_with("conversion failed or output corrupted")
    );
    assert!(!output.exists());
}

#[test]
fn digital_failure_without_fallback_stops_there() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.digital.fallback_to_ocr = false;
    let input = write_pdf(dir.path(), "a.pdf");
    let output = dir.path().join("a.docx");

    let engine = MockEngine::digital(1)
        .with_layout(Layout::Fail)
        .with_ocr(vec![Some("never used")]);
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(matches!(outcome.failure, Some(ConversionError::Digital(_))));
    assert_eq!(pipeline.engine().count("rasterize"), 0);
    assert!(!output.exists());
}

#[test]
fn observer_sees_every_state_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "a.pdf");
    let output = dir.path().join("a.docx");

    let seen = Mutex::new(Vec::new());
    let pipeline = Pipeline::new(&cfg, MockEngine::digital(1));
    pipeline.convert_observed(&input, &output, &|s| seen.lock().unwrap().push(s));

    assert_eq!(
        seen.into_inner().unwrap(),
        vec![
            JobState::Start,
            JobState::Classified,
            JobState::Extracted,
            JobState::Augmented,
            JobState::Validated,
            JobState::Succeeded,
        ]
    );
}

#[test]
fn engine_panic_becomes_an_internal_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.digital.fallback_to_ocr = false;
    let input = write_pdf(dir.path(), "a.pdf");
    let output = dir.path().join("a.docx");

    let pipeline = Pipeline::new(&cfg, MockEngine::digital(1).with_layout(Layout::Panic));
    let outcome = pipeline.convert(&input, &output);

    match outcome.failure.as_ref().unwrap() {
        ConversionError::Internal(msg) => assert!(msg.contains("panicked")),
        other => panic!("unexpected failure {other:?}"),
    }
}

#[test]
fn invalid_input_never_reaches_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = dir.path().join("notes.pdf");
    std::fs::write(&input, b"just text").unwrap();
    let output = dir.path().join("notes.docx");

    let pipeline = Pipeline::new(&cfg, MockEngine::digital(1));
    let outcome = pipeline.convert(&input, &output);

    assert!(matches!(outcome.failure, Some(ConversionError::Input(_))));
    assert!(pipeline.engine().calls().is_empty());
}

#[test]
fn rejected_input_leaves_an_existing_output_alone() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, b"%PDF-1.4 but the wrong extension").unwrap();
    let output = dir.path().join("precious.docx");
    std::fs::write(&output, vec![7u8; 4096]).unwrap();

    let pipeline = Pipeline::new(&cfg, MockEngine::digital(1));
    let outcome = pipeline.convert(&input, &output);

    assert!(matches!(outcome.failure, Some(ConversionError::Input(_))));
    assert_eq!(std::fs::read(&output).unwrap(), vec![7u8; 4096]);
}

#[test]
fn page_limit_rejection_leaves_an_existing_output_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.limits.max_input_pages = 2;
    let input = write_pdf(dir.path(), "long.pdf");
    let output = dir.path().join("long.docx");
    std::fs::write(&output, b"older conversion").unwrap();

    let pipeline = Pipeline::new(&cfg, MockEngine::digital(5));
    let outcome = pipeline.convert(&input, &output);

    assert!(matches!(outcome.failure, Some(ConversionError::Input(_))));
    assert_eq!(std::fs::read(&output).unwrap(), b"older conversion");
    assert_eq!(pipeline.engine().count("convert_layout"), 0);
}

#[test]
fn searchable_strategy_runs_the_layout_converter_on_the_rewrite() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.ocr.strategy = "searchable_pdf".into();
    let input = write_pdf(dir.path(), "scan.pdf");
    let output = dir.path().join("scan.docx");

    let engine = MockEngine::scanned(vec![None, None]);
    let base = engine.base_docx.clone();
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    assert_eq!(std::fs::read(&output).unwrap(), base);
    let engine = pipeline.engine();
    assert_eq!(engine.count("make_searchable"), 1);
    assert_eq!(engine.count("convert_layout"), 1);
    assert_eq!(engine.count("rasterize"), 0);
    assert_eq!(engine.count("recognize_text"), 0);
    let calls = engine.calls();
    let rewrite = calls.iter().position(|c| c == "make_searchable").unwrap();
    let layout = calls.iter().position(|c| c == "convert_layout").unwrap();
    assert!(rewrite < layout);
    assert_eq!(outcome.report.ocr.as_ref().unwrap().strategy, OcrStrategy::SearchablePdf);
    // The intermediate PDF lives in a scratch dir that is gone afterwards.
    assert!(walk(&dir.path().join("work")).is_empty());
}

#[test]
fn failed_or_undersized_searchable_rewrite_is_an_ocr_failure() {
    for behaviour in [Layout::Fail, Layout::Tiny] {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.ocr.strategy = "searchable".into();
        let input = write_pdf(dir.path(), "scan.pdf");
        let output = dir.path().join("scan.docx");

        let engine = MockEngine::scanned(vec![None]).with_searchable(behaviour);
        let pipeline = Pipeline::new(&cfg, engine);
        let outcome = pipeline.convert(&input, &output);

        match outcome.failure.as_ref() {
            Some(ConversionError::Ocr(reason)) => {
                assert!(reason.contains("searchable PDF rewrite"), "{reason}")
            }
            other => panic!("{behaviour:?}: unexpected failure {other:?}"),
        }
        assert_eq!(pipeline.engine().count("convert_layout"), 0);
        assert!(!output.exists());
    }
}

#[test]
fn text_layout_detector_is_the_last_resort() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = test_config(dir.path());
    let input = write_pdf(dir.path(), "ledger.pdf");
    let output = dir.path().join("ledger.docx");

    let engine = MockEngine::digital(1)
        .with_tables(TableMode::Lattice, TableScript::Found(Vec::new()))
        .with_tables(TableMode::Stream, TableScript::Fail)
        .with_tables(
            TableMode::TextLayout,
            TableScript::Found(vec![table(&[
                &["Item", "Qty"],
                &["Bolt", "4"],
                &["Nut", "9"],
            ])]),
        );
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert!(outcome.succeeded(), "{:?}", outcome.failure);
    let tables = outcome.report.tables.as_ref().unwrap();
    assert_eq!(tables.strategy, Some(TableMode::TextLayout));
    assert_eq!(tables.tables_appended, 1);
    assert_eq!(tables.attempts.len(), 3);
    let summary = docx::inspect(&output).unwrap();
    assert_eq!(summary.bold_paragraphs, vec!["Extracted Table 1"]);
    assert_eq!(summary.tables, vec![(3, 2)]);
}

#[test]
fn job_past_its_deadline_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.limits.job_timeout_seconds = 1;
    let input = write_pdf(dir.path(), "slow.pdf");
    let output = dir.path().join("slow.docx");

    let engine = MockEngine::digital(1).with_layout_delay(Duration::from_millis(1100));
    let pipeline = Pipeline::new(&cfg, engine);
    let outcome = pipeline.convert(&input, &output);

    assert_eq!(outcome.state, JobState::Failed);
    assert!(matches!(outcome.failure, Some(ConversionError::Timeout(1))));
    assert_eq!(pipeline.engine().count("extract_tables:lattice"), 0);
    assert!(!output.exists());
}

fn walk(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk(&path));
        } else {
            out.push(path);
        }
    }
    out
}
