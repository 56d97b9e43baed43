use super::process::ToolCommand;
use super::tools::ToolPaths;
use super::{Engine, types::*};
use crate::config::Config;
use crate::page_plan::PageRange;
use crate::table_detect;
use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Engine backed by lopdf in-process and command-line tools for the rest.
pub struct SystemEngine {
    cfg: Config,
    tools: ToolPaths,
}

impl SystemEngine {
    pub fn new(cfg: &Config) -> Self {
        Self::with_tools(cfg, ToolPaths::resolve(cfg))
    }

    pub fn with_tools(cfg: &Config, tools: ToolPaths) -> Self {
        debug!(?tools, "resolved tool paths");
        Self {
            cfg: cfg.clone(),
            tools,
        }
    }

    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    fn load(&self, input: &Path) -> Result<lopdf::Document> {
        lopdf::Document::load(input).with_context(|| format!("loading PDF: {}", input.display()))
    }

    fn tesseract(&self) -> ToolCommand {
        let cmd = ToolCommand::new("tesseract", &self.tools.tesseract);
        match &self.tools.tessdata_prefix {
            Some(prefix) => cmd.env("TESSDATA_PREFIX", prefix),
            None => cmd,
        }
    }

    fn tabula(&self, input: &Path, mode: TableMode) -> Result<Vec<ExtractedTable>> {
        let mode_flag = match mode {
            TableMode::Lattice => "--lattice",
            TableMode::Stream => "--stream",
            TableMode::TextLayout => return Err(anyhow!("tabula has no text_layout mode")),
        };
        let stdout = ToolCommand::new("tabula", &self.tools.java)
            .arg("-Djava.awt.headless=true")
            .arg("-jar")
            .arg(&self.tools.tabula_jar)
            .args(["--pages", "all", "--format", "JSON", mode_flag])
            .arg(input)
            .timeout_secs(self.cfg.tables.timeout_seconds)
            .run()?;
        parse_tabula_json(&stdout)
    }

    fn text_layout_tables(&self, input: &Path) -> Result<Vec<ExtractedTable>> {
        let stdout = ToolCommand::new("pdftotext", &self.tools.pdftotext)
            .args(["-layout", "-enc", "UTF-8"])
            .arg(input)
            .arg("-")
            .timeout_secs(self.cfg.tables.timeout_seconds)
            .run()?;
        let text = String::from_utf8_lossy(&stdout);
        let detector = &self.cfg.tables.text_layout;
        let mut tables = Vec::new();
        // pdftotext separates pages with form feeds.
        for page in text.split('\u{000C}') {
            tables.extend(table_detect::detect_tables(page, detector));
        }
        Ok(tables)
    }
}

impl Engine for SystemEngine {
    fn doctor(&self) -> Result<Vec<ToolDiag>> {
        let timeout = self.cfg.tools.doctor_timeout_seconds;
        let checks: [(&str, &Path, &str); 6] = [
            ("pdf2docx", self.tools.pdf2docx.as_path(), "--help"),
            ("ocrmypdf", self.tools.ocrmypdf.as_path(), "--version"),
            ("tesseract", self.tools.tesseract.as_path(), "--version"),
            ("pdftoppm", self.tools.pdftoppm.as_path(), "-v"),
            ("pdftotext", self.tools.pdftotext.as_path(), "-v"),
            ("java", self.tools.java.as_path(), "-version"),
        ];

        let mut out = Vec::new();
        for (tool, path, flag) in checks {
            let res = ToolCommand::new(tool, path)
                .arg(flag)
                .timeout_secs(timeout)
                .output();
            let diag = match res {
                Ok(o) => {
                    // Several of these print their banner on stderr.
                    let banner = if o.stdout.is_empty() { &o.stderr } else { &o.stdout };
                    ToolDiag {
                        tool: tool.to_string(),
                        path: path.display().to_string(),
                        available: true,
                        version: String::from_utf8_lossy(banner)
                            .lines()
                            .next()
                            .map(|l| l.trim().to_string()),
                        error: None,
                    }
                }
                Err(err) => ToolDiag {
                    tool: tool.to_string(),
                    path: path.display().to_string(),
                    available: false,
                    version: None,
                    error: Some(format!("{err:#}")),
                },
            };
            out.push(diag);
        }

        out.push(ToolDiag {
            tool: "tabula".to_string(),
            path: self.tools.tabula_jar.display().to_string(),
            available: self.tools.tabula_jar.exists(),
            version: None,
            error: (!self.tools.tabula_jar.exists()).then(|| "jar not found".to_string()),
        });
        Ok(out)
    }

    fn page_count(&self, input: &Path) -> Result<u32> {
        let doc = self.load(input)?;
        Ok(doc.get_pages().len() as u32)
    }

    fn page_text(&self, input: &Path, page: u32) -> Result<String> {
        let doc = self.load(input)?;
        doc.extract_text(&[page])
            .with_context(|| format!("extracting text of page {page}"))
    }

    fn sample_text(&self, input: &Path, max_pages: u32) -> Result<TextSample> {
        let doc = self.load(input)?;
        let page_count = doc.get_pages().len() as u32;
        let pages = (1..=max_pages.min(page_count))
            .map(|page| {
                doc.extract_text(&[page])
                    .with_context(|| format!("extracting text of page {page}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TextSample { page_count, pages })
    }

    fn convert_layout(
        &self,
        input: &Path,
        output: &Path,
        range: Option<&PageRange>,
    ) -> Result<()> {
        let mut cmd = ToolCommand::new("pdf2docx", &self.tools.pdf2docx)
            .arg("convert")
            .arg(input)
            .arg(output);
        if let Some(r) = range {
            // pdf2docx takes a zero-based start and an exclusive end.
            cmd = cmd
                .arg(format!("--start={}", r.start_page.saturating_sub(1)))
                .arg(format!("--end={}", r.end_page));
        }
        cmd.timeout_secs(self.cfg.digital.timeout_seconds).run()?;
        Ok(())
    }

    fn make_searchable(
        &self,
        input: &Path,
        output: &Path,
        opts: &SearchableOptions,
    ) -> Result<()> {
        let mut cmd = ToolCommand::new("ocrmypdf", &self.tools.ocrmypdf)
            .args(opts.to_args())
            .arg(input)
            .arg(output)
            .timeout_secs(self.cfg.ocr.searchable.timeout_seconds);
        if let Some(prefix) = &self.tools.tessdata_prefix {
            cmd = cmd.env("TESSDATA_PREFIX", prefix);
        }
        cmd.run()?;
        Ok(())
    }

    fn rasterize(&self, input: &Path, req: &RasterRequest) -> Result<Vec<RasterPage>> {
        let prefix = req.out_dir.join("page");
        let mut cmd = ToolCommand::new("pdftoppm", &self.tools.pdftoppm)
            .args(["-png", "-r"])
            .arg(req.dpi.to_string());
        if req.grayscale {
            cmd = cmd.arg("-gray");
        }
        if let Some(r) = &req.range {
            cmd = cmd
                .arg("-f")
                .arg(r.start_page.to_string())
                .arg("-l")
                .arg(r.end_page.to_string());
        }
        cmd.arg(input)
            .arg(&prefix)
            .timeout_secs(self.cfg.ocr.rasterize_timeout_seconds)
            .run()?;

        let pages = collect_rasters(&req.out_dir)?;
        if pages.is_empty() {
            return Err(anyhow!("pdftoppm produced no images"));
        }
        Ok(pages)
    }

    fn recognize_text(&self, page: &RasterPage, lang: &str, psm: u32) -> Result<String> {
        let stdout = self
            .tesseract()
            .arg(&page.path)
            .arg("stdout")
            .args(["-l", lang, "--psm"])
            .arg(psm.to_string())
            .timeout_secs(self.cfg.ocr.page_timeout_seconds)
            .run()
            .with_context(|| format!("tesseract on page {}", page.page))?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn extract_tables(&self, input: &Path, mode: TableMode) -> Result<Vec<ExtractedTable>> {
        match mode {
            TableMode::Lattice | TableMode::Stream => self.tabula(input, mode),
            TableMode::TextLayout => self.text_layout_tables(input),
        }
    }
}

/// Picks up `page-N.png` files written by pdftoppm, sorted by page number.
/// pdftoppm zero-pads N to the width of the document's last page number.
fn collect_rasters(dir: &Path) -> Result<Vec<RasterPage>> {
    let mut found: Vec<(u32, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let page = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.rsplit('-').next())
            .and_then(|n| n.parse::<u32>().ok());
        match page {
            Some(n) => found.push((n, path)),
            None => warn!("ignoring unexpected raster file {}", path.display()),
        }
    }
    found.sort_by_key(|(n, _)| *n);
    Ok(found
        .into_iter()
        .map(|(n, p)| RasterPage::new(n, p))
        .collect())
}

#[derive(Debug, Deserialize)]
struct TabulaTable {
    #[serde(default)]
    data: Vec<Vec<TabulaCell>>,
}

#[derive(Debug, Deserialize)]
struct TabulaCell {
    #[serde(default)]
    text: Option<String>,
}

fn parse_tabula_json(raw: &[u8]) -> Result<Vec<ExtractedTable>> {
    if raw.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(Vec::new());
    }
    let tables: Vec<TabulaTable> =
        serde_json::from_slice(raw).with_context(|| "parsing tabula JSON output")?;

    let mut out = Vec::new();
    for (i, t) in tables.into_iter().enumerate() {
        let rows = t
            .data
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|c| c.text.filter(|s| !s.is_empty()))
                    .collect()
            })
            .collect();
        match ExtractedTable::from_rows(rows) {
            Ok(table) if !table.is_empty() => out.push(table),
            Ok(_) => {}
            Err(err) => warn!("dropping tabula table {i}: {err}"),
        }
    }
    Ok(out)
}
