use crate::{config::Config, engine::Engine};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub path: String,
    pub file_bytes: u64,
    pub page_count: Option<u32>,
    pub sampled_pages: u32,
    pub sampled_chars: usize,
    pub has_text: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Decides whether the leading pages carry a usable text layer. Never fails:
/// anything that goes wrong while reading counts as "no text".
pub fn probe_pdf(cfg: &Config, engine: &dyn Engine, input: &Path) -> ProbeResult {
    let file_bytes = std::fs::metadata(input).map(|m| m.len()).unwrap_or(0);
    let mut res = ProbeResult {
        path: input.display().to_string(),
        file_bytes,
        page_count: None,
        sampled_pages: 0,
        sampled_chars: 0,
        has_text: false,
        error: None,
    };

    match sample_text(cfg, engine, input, &mut res) {
        Ok(text) => {
            res.sampled_chars = text.chars().count();
            res.has_text = res.sampled_chars > cfg.classification.min_text_chars;
        }
        Err(err) => {
            warn!("text probe failed, treating as scanned: {err:#}");
            res.error = Some(format!("{err:#}"));
        }
    }
    debug!(?res, "probe");
    res
}

/// Convenience wrapper returning just the classification.
pub fn has_embedded_text(cfg: &Config, engine: &dyn Engine, input: &Path) -> bool {
    probe_pdf(cfg, engine, input).has_text
}

fn sample_text(
    cfg: &Config,
    engine: &dyn Engine,
    input: &Path,
    res: &mut ProbeResult,
) -> Result<String> {
    let sample = engine.sample_text(input, cfg.classification.sample_pages)?;
    res.page_count = Some(sample.page_count);
    res.sampled_pages = sample.pages.len() as u32;
    Ok(sample.pages.concat().trim().to_string())
}
