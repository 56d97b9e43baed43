use crate::{
    docx::DocxSummary,
    error::ConversionError,
    ocr::OcrSummary,
    policy::RouteDecision,
    probe::ProbeResult,
    tables::AugmentOutcome,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Start,
    Classified,
    Extracted,
    Augmented,
    Validated,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Extractor {
    Digital,
    Ocr,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionAttempt {
    pub extractor: Extractor,
    pub ok: bool,
    pub reason: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputInfo {
    pub path: String,
    pub bytes: u64,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub input: InputInfo,
    pub output_path: String,
    pub probe: Option<ProbeResult>,
    pub decision: Option<RouteDecision>,
    pub attempts: Vec<ExtractionAttempt>,
    pub ocr: Option<OcrSummary>,
    pub tables: Option<AugmentOutcome>,
    pub output_bytes: Option<u64>,
    pub document: Option<DocxSummary>,
    pub state: JobState,
    pub failure: Option<ConversionError>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl JobReport {
    pub fn new(input: InputInfo, output: &Path, started_at: String) -> Self {
        Self {
            input,
            output_path: output.display().to_string(),
            probe: None,
            decision: None,
            attempts: Vec::new(),
            ocr: None,
            tables: None,
            output_bytes: None,
            document: None,
            state: JobState::Start,
            failure: None,
            started_at,
            finished_at: None,
        }
    }

    /// `<output>.report.json` style sibling path.
    pub fn path_for(output: &Path, suffix: &str) -> PathBuf {
        let mut name = output.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write report {}", path.display()))
    }
}
