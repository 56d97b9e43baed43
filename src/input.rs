use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Rejects anything that should never reach an extractor.
pub fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    let meta = std::fs::metadata(input)
        .map_err(|_| anyhow!("input does not exist: {}", input.display()))?;
    if !meta.is_file() {
        return Err(anyhow!("input is not a file: {}", input.display()));
    }

    let is_pdf = input
        .extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if !is_pdf {
        return Err(anyhow!("input is not a PDF: {}", input.display()));
    }

    let max = cfg.limits.max_input_file_bytes;
    if max > 0 && meta.len() > max {
        return Err(anyhow!(
            "input is {} bytes, above the {} byte limit: {}",
            meta.len(),
            max,
            input.display()
        ));
    }

    if cfg.security.require_pdf_signature {
        let mut head = [0u8; 4];
        let mut f = File::open(input).with_context(|| format!("open {}", input.display()))?;
        let n = f.read(&mut head)?;
        if n < head.len() || &head != PDF_MAGIC {
            return Err(anyhow!("missing %PDF signature: {}", input.display()));
        }
    }

    Ok(())
}

pub fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}
