use crate::{config::Config, engine::Engine, util::checked_output_size};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

/// Layout-preserving conversion of a PDF that already has a text layer.
/// Success means the converter returned cleanly and left an output of at
/// least `limits.min_output_bytes`; an undersized file is a silent failure.
pub fn convert_digital(cfg: &Config, engine: &dyn Engine, input: &Path, output: &Path) -> Result<u64> {
    engine
        .convert_layout(input, output, None)
        .with_context(|| format!("layout conversion of {}", input.display()))?;

    let bytes = checked_output_size(output, cfg.limits.min_output_bytes)?;
    info!("digital conversion wrote {} bytes to {}", bytes, output.display());
    Ok(bytes)
}

/// Removes whatever a failed attempt left behind so the next extractor
/// starts from nothing.
pub fn discard_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => warn!("removed partial output {}", output.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("could not remove partial output {}: {err}", output.display()),
    }
}
