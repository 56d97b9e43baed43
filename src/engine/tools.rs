use crate::config::Config;
use serde::Serialize;
use std::env::consts::EXE_SUFFIX;
use std::path::PathBuf;

/// Resolved locations of every external tool. Built once at startup and
/// passed by reference from then on.
#[derive(Debug, Clone, Serialize)]
pub struct ToolPaths {
    pub pdf2docx: PathBuf,
    pub ocrmypdf: PathBuf,
    pub tesseract: PathBuf,
    pub tessdata_prefix: Option<PathBuf>,
    pub pdftoppm: PathBuf,
    pub pdftotext: PathBuf,
    pub java: PathBuf,
    pub tabula_jar: PathBuf,
}

impl ToolPaths {
    pub fn resolve(cfg: &Config) -> Self {
        Self::resolve_with(cfg, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(cfg: &Config, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let tools_dir = PathBuf::from(&cfg.paths.tools_dir);
        let t = &cfg.tools;

        let poppler_bin = resolve(
            &t.poppler_bin,
            env("POPPLER_PATH"),
            tools_dir.join("poppler").join("bin"),
        );
        let poppler = |name: &str| match &poppler_bin {
            Some(dir) => dir.join(exe(name)),
            None => PathBuf::from(name),
        };

        Self {
            pdf2docx: resolve(
                &t.pdf2docx,
                env("PDF2DOCX_PATH"),
                tools_dir.join("pdf2docx").join(exe("pdf2docx")),
            )
            .unwrap_or_else(|| PathBuf::from("pdf2docx")),
            ocrmypdf: resolve(
                &t.ocrmypdf,
                env("OCRMYPDF_PATH"),
                tools_dir.join("ocrmypdf").join(exe("ocrmypdf")),
            )
            .unwrap_or_else(|| PathBuf::from("ocrmypdf")),
            tesseract: resolve(
                &t.tesseract,
                env("TESSERACT_PATH"),
                tools_dir.join("tesseract").join(exe("tesseract")),
            )
            .unwrap_or_else(|| PathBuf::from("tesseract")),
            tessdata_prefix: resolve(
                &t.tessdata_prefix,
                env("TESSDATA_PREFIX"),
                tools_dir.join("tesseract").join("tessdata"),
            ),
            pdftoppm: poppler("pdftoppm"),
            pdftotext: poppler("pdftotext"),
            java: resolve(
                &t.java,
                env("JAVA_PATH"),
                tools_dir.join("java").join("bin").join(exe("java")),
            )
            .unwrap_or_else(|| PathBuf::from("java")),
            tabula_jar: resolve(
                &t.tabula_jar,
                env("TABULA_JAR"),
                tools_dir.join("tabula").join("tabula.jar"),
            )
            .unwrap_or_else(|| PathBuf::from("tabula.jar")),
        }
    }
}

/// Explicit config value, then the environment, then the tools directory.
fn resolve(raw: &str, env_val: Option<String>, bundled: PathBuf) -> Option<PathBuf> {
    let raw = raw.trim();
    if !raw.is_empty() && !raw.eq_ignore_ascii_case("auto") {
        return Some(expand_tilde(raw));
    }
    if let Some(v) = env_val.filter(|v| !v.trim().is_empty()) {
        return Some(expand_tilde(v.trim()));
    }
    if bundled.exists() {
        return Some(bundled);
    }
    None
}

fn exe(name: &str) -> String {
    format!("{name}{EXE_SUFFIX}")
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
