use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub tools: Tools,
    #[serde(default)]
    pub hashing: Hashing,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub digital: Digital,
    #[serde(default)]
    pub ocr: Ocr,
    #[serde(default)]
    pub tables: Tables,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub keep_intermediates: bool,
    pub max_parallel_jobs: usize,
    pub print_summary: bool,
    pub poll_interval_ms: u64,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            keep_intermediates: false,
            max_parallel_jobs: 2,
            print_summary: true,
            poll_interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
    pub work_dir: String,
    pub tools_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "output".into(),
            work_dir: ".pdf2word-work".into(),
            tools_dir: "tools".into(),
        }
    }
}

/// Tool locations. Empty or "auto" means: environment override, then the
/// tools directory, then the bare program name on PATH.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tools {
    pub pdf2docx: String,
    pub ocrmypdf: String,
    pub tesseract: String,
    pub tessdata_prefix: String,
    pub poppler_bin: String,
    pub java: String,
    pub tabula_jar: String,
    pub doctor_timeout_seconds: u64,
}
impl Default for Tools {
    fn default() -> Self {
        Self {
            pdf2docx: "auto".into(),
            ocrmypdf: "auto".into(),
            tesseract: "auto".into(),
            tessdata_prefix: "auto".into(),
            poppler_bin: "auto".into(),
            java: "auto".into(),
            tabula_jar: "auto".into(),
            doctor_timeout_seconds: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Hashing {
    pub mode: String,
    pub fast_window_bytes: u64,
}
impl Default for Hashing {
    fn default() -> Self {
        Self {
            mode: "fast_2x16mb".into(),
            fast_window_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_input_file_bytes: u64,
    pub max_input_pages: u32,
    pub min_output_bytes: u64,
    pub job_timeout_seconds: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_file_bytes: 50 * 1024 * 1024,
            max_input_pages: 2000,
            min_output_bytes: 1024,
            job_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Classification {
    pub sample_pages: u32,
    /// Aggregate trimmed text across the sample must be longer than this.
    pub min_text_chars: usize,
    pub forced_route: String,
}
impl Default for Classification {
    fn default() -> Self {
        Self {
            sample_pages: 3,
            min_text_chars: 50,
            forced_route: "AUTO".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Digital {
    pub timeout_seconds: u64,
    pub fallback_to_ocr: bool,
}
impl Default for Digital {
    fn default() -> Self {
        Self {
            timeout_seconds: 600,
            fallback_to_ocr: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ocr {
    pub strategy: String,
    pub lang: String,
    pub dpi: u32,
    pub grayscale: bool,
    pub psm: u32,
    pub workers: usize,
    pub pages_per_batch: u32,
    pub min_pages_per_batch: u32,
    pub rasterize_timeout_seconds: u64,
    pub page_timeout_seconds: u64,
    #[serde(default)]
    pub searchable: Searchable,
}
impl Default for Ocr {
    fn default() -> Self {
        Self {
            strategy: "per_page".into(),
            lang: "eng".into(),
            dpi: 300,
            grayscale: true,
            psm: 3,
            workers: 1,
            pages_per_batch: 10,
            min_pages_per_batch: 3,
            rasterize_timeout_seconds: 300,
            page_timeout_seconds: 120,
            searchable: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Searchable {
    pub skip_text: bool,
    pub rotate_pages: bool,
    pub deskew: bool,
    pub clean: bool,
    pub remove_background: bool,
    pub optimize: u8,
    pub timeout_seconds: u64,
}
impl Default for Searchable {
    fn default() -> Self {
        Self {
            skip_text: true,
            rotate_pages: true,
            deskew: true,
            clean: true,
            remove_background: true,
            optimize: 1,
            timeout_seconds: 1800,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub enabled: bool,
    pub strategies: Vec<String>,
    pub timeout_seconds: u64,
    pub label: String,
    #[serde(default)]
    pub text_layout: TextLayoutDetector,
}
impl Default for Tables {
    fn default() -> Self {
        Self {
            enabled: true,
            strategies: vec!["lattice".into(), "stream".into(), "text_layout".into()],
            timeout_seconds: 120,
            label: "Extracted Table".into(),
            text_layout: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextLayoutDetector {
    pub min_rows: usize,
    pub min_cols: usize,
    pub min_gap: usize,
}
impl Default for TextLayoutDetector {
    fn default() -> Self {
        Self {
            min_rows: 3,
            min_cols: 2,
            min_gap: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Postprocess {
    pub normalize_unicode: bool,
    pub trim_trailing_whitespace: bool,
    pub strip_control_chars: bool,
    pub drop_line_patterns: Vec<String>,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_unicode: true,
            trim_trailing_whitespace: true,
            strip_control_chars: true,
            drop_line_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub write_report_json: bool,
    pub report_suffix: String,
    pub remove_invalid_output: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_report_json: true,
            report_suffix: ".report.json".into(),
            remove_invalid_output: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Security {
    pub reject_url_inputs: bool,
    pub require_pdf_signature: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
            require_pdf_signature: true,
        }
    }
}
