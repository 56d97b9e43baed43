//! Column-alignment table detection over layout-preserving page text.
//!
//! A table is a run of consecutive non-blank lines that split into the same
//! number of cells (at least `min_cols`) on gaps of `min_gap` or more spaces,
//! lasting at least `min_rows` lines.

use crate::config::TextLayoutDetector;
use crate::engine::ExtractedTable;
use regex::Regex;

pub fn detect_tables(page_text: &str, cfg: &TextLayoutDetector) -> Vec<ExtractedTable> {
    let gap = match Regex::new(&format!(r"\s{{{},}}", cfg.min_gap.max(2))) {
        Ok(r) => r,
        Err(_) => return Vec::new(),
    };
    let min_cols = cfg.min_cols.max(2);

    let mut tables = Vec::new();
    let mut run: Vec<Vec<Option<String>>> = Vec::new();

    let mut flush = |run: &mut Vec<Vec<Option<String>>>| {
        if run.len() >= cfg.min_rows.max(1) {
            if let Ok(t) = ExtractedTable::from_rows(std::mem::take(run)) {
                tables.push(t);
            }
        }
        run.clear();
    };

    for line in page_text.lines() {
        let line = line.trim();
        if line.is_empty() {
            flush(&mut run);
            continue;
        }
        let cells: Vec<Option<String>> = gap
            .split(line)
            .map(|c| Some(c.trim().to_string()))
            .collect();
        if cells.len() < min_cols {
            flush(&mut run);
            continue;
        }
        if run.first().is_some_and(|first| first.len() != cells.len()) {
            flush(&mut run);
        }
        run.push(cells);
    }
    flush(&mut run);

    tables
}
