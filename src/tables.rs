use crate::{
    config::Config,
    docx::OutputDocument,
    engine::{Engine, ExtractedTable, TableMode},
};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct StrategyAttempt {
    pub mode: TableMode,
    pub tables: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AugmentOutcome {
    /// The strategy whose tables were appended, if any.
    pub strategy: Option<TableMode>,
    pub tables_appended: usize,
    pub attempts: Vec<StrategyAttempt>,
    pub error: Option<String>,
}

impl AugmentOutcome {
    pub fn appended(&self) -> bool {
        self.tables_appended > 0
    }
}

/// Configured strategy order; unknown names are skipped with a warning.
pub fn strategy_order(cfg: &Config) -> Vec<TableMode> {
    let mut order = Vec::new();
    for raw in &cfg.tables.strategies {
        match TableMode::parse(raw) {
            Some(mode) if !order.contains(&mode) => order.push(mode),
            Some(_) => {}
            None => warn!("ignoring unknown table strategy: {raw}"),
        }
    }
    order
}

/// Appends the tables found by the first productive strategy to the document
/// at `output`. Best-effort: strategy failures mean "nothing found", and
/// when nothing is found the document is not touched.
pub fn augment_with_tables(
    cfg: &Config,
    engine: &dyn Engine,
    input: &Path,
    output: &Path,
) -> AugmentOutcome {
    let mut outcome = AugmentOutcome::default();
    if !cfg.tables.enabled {
        return outcome;
    }

    let mut found: Option<(TableMode, Vec<ExtractedTable>)> = None;
    for mode in strategy_order(cfg) {
        let attempt = attempt(engine, input, mode);
        let tables = match attempt {
            Ok(tables) => {
                outcome.attempts.push(StrategyAttempt {
                    mode,
                    tables: tables.len(),
                    error: None,
                });
                tables
            }
            Err(err) => {
                warn!("table strategy {mode} failed: {err:#}");
                outcome.attempts.push(StrategyAttempt {
                    mode,
                    tables: 0,
                    error: Some(format!("{err:#}")),
                });
                continue;
            }
        };
        if !tables.is_empty() {
            found = Some((mode, tables));
            break;
        }
    }

    let Some((mode, tables)) = found else {
        info!("no tables detected in {}", input.display());
        return outcome;
    };

    let count = tables.len();
    match append_tables(cfg, output, tables) {
        Ok(()) => {
            info!("appended {count} tables from {mode} strategy");
            outcome.strategy = Some(mode);
            outcome.tables_appended = count;
        }
        Err(err) => {
            warn!("appending tables failed, document left as it was: {err:#}");
            outcome.error = Some(format!("{err:#}"));
        }
    }
    outcome
}

fn attempt(engine: &dyn Engine, input: &Path, mode: TableMode) -> Result<Vec<ExtractedTable>> {
    let tables = engine.extract_tables(input, mode)?;
    Ok(tables.into_iter().filter(|t| !t.is_empty()).collect())
}

fn append_tables(cfg: &Config, output: &Path, tables: Vec<ExtractedTable>) -> Result<()> {
    let mut doc = OutputDocument::new();
    for (i, table) in tables.into_iter().enumerate() {
        doc.push_page_break();
        doc.push_bold_paragraph(format!("{} {}", cfg.tables.label, i + 1));
        doc.push_table(table);
    }
    doc.append_to(output)
}
