#![allow(dead_code)]

use anyhow::{Result, anyhow};
use pdf2word::config::Config;
use pdf2word::docx::OutputDocument;
use pdf2word::engine::{
    Engine, ExtractedTable, RasterPage, RasterRequest, SearchableOptions, TableMode, ToolDiag,
};
use pdf2word::page_plan::PageRange;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// What the layout converter does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// Writes the prepared base document.
    Write,
    /// Leaves a partial file behind and errors.
    Fail,
    /// Returns cleanly but writes a file below the size floor.
    Tiny,
    Panic,
}

#[derive(Debug, Clone)]
pub enum TableScript {
    Found(Vec<ExtractedTable>),
    Fail,
}

/// Scripted engine. Page texts drive classification, `ocr_text` drives
/// recognition, and every call is recorded.
pub struct MockEngine {
    pub page_texts: Vec<String>,
    pub page_text_fails: bool,
    pub layout: Layout,
    /// What the searchable-PDF rewrite does; `Write` produces a 4 KiB PDF.
    pub searchable: Layout,
    /// Slows the layout converter down, for deadline tests.
    pub layout_delay: Option<Duration>,
    pub rasterize_fails: bool,
    /// Recognized text per page, 1-based via index + 1. `None` fails that page.
    pub ocr_text: Vec<Option<String>>,
    pub tables: HashMap<TableMode, TableScript>,
    pub base_docx: Vec<u8>,
    calls: Mutex<Vec<String>>,
}

impl MockEngine {
    pub fn new(page_texts: Vec<&str>) -> Self {
        Self {
            page_texts: page_texts.into_iter().map(String::from).collect(),
            page_text_fails: false,
            layout: Layout::Write,
            searchable: Layout::Write,
            layout_delay: None,
            rasterize_fails: false,
            ocr_text: Vec::new(),
            tables: HashMap::new(),
            base_docx: base_docx(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A text-bearing document of `pages` pages.
    pub fn digital(pages: usize) -> Self {
        let text = "This page carries a proper text layer with plenty of characters.";
        Self::new(vec![text; pages])
    }

    /// An image-only document whose pages recognize as `ocr`.
    pub fn scanned(ocr: Vec<Option<&str>>) -> Self {
        let mut engine = Self::new(vec![""; ocr.len()]);
        engine.ocr_text = ocr.into_iter().map(|t| t.map(String::from)).collect();
        engine
    }

    pub fn with_ocr(mut self, ocr: Vec<Option<&str>>) -> Self {
        self.ocr_text = ocr.into_iter().map(|t| t.map(String::from)).collect();
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_searchable(mut self, searchable: Layout) -> Self {
        self.searchable = searchable;
        self
    }

    pub fn with_layout_delay(mut self, delay: Duration) -> Self {
        self.layout_delay = Some(delay);
        self
    }

    pub fn with_tables(mut self, mode: TableMode, script: TableScript) -> Self {
        self.tables.insert(mode, script);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    fn record(&self, name: impl Into<String>) {
        self.calls.lock().unwrap().push(name.into());
    }
}

impl Engine for MockEngine {
    fn doctor(&self) -> Result<Vec<ToolDiag>> {
        Ok(Vec::new())
    }

    fn page_count(&self, _input: &Path) -> Result<u32> {
        self.record("page_count");
        if self.page_text_fails {
            return Err(anyhow!("unreadable pdf"));
        }
        Ok(self.page_texts.len() as u32)
    }

    fn page_text(&self, _input: &Path, page: u32) -> Result<String> {
        self.record(format!("page_text:{page}"));
        if self.page_text_fails {
            return Err(anyhow!("unreadable pdf"));
        }
        self.page_texts
            .get(page as usize - 1)
            .cloned()
            .ok_or_else(|| anyhow!("no page {page}"))
    }

    fn convert_layout(&self, _input: &Path, output: &Path, _range: Option<&PageRange>) -> Result<()> {
        self.record("convert_layout");
        if let Some(delay) = self.layout_delay {
            std::thread::sleep(delay);
        }
        match self.layout {
            Layout::Write => {
                std::fs::write(output, &self.base_docx)?;
                Ok(())
            }
            Layout::Fail => {
                std::fs::write(output, b"partial")?;
                Err(anyhow!("layout converter crashed"))
            }
            Layout::Tiny => {
                std::fs::write(output, b"tiny")?;
                Ok(())
            }
            Layout::Panic => panic!("layout converter panicked"),
        }
    }

    fn make_searchable(&self, _input: &Path, output: &Path, _opts: &SearchableOptions) -> Result<()> {
        self.record("make_searchable");
        match self.searchable {
            Layout::Write => {
                let mut bytes = b"%PDF-1.7\n".to_vec();
                bytes.resize(4096, b' ');
                std::fs::write(output, bytes)?;
                Ok(())
            }
            Layout::Fail => Err(anyhow!("ocrmypdf exited with status 6")),
            Layout::Tiny => {
                std::fs::write(output, b"%PDF")?;
                Ok(())
            }
            Layout::Panic => panic!("searchable rewrite panicked"),
        }
    }

    fn rasterize(&self, _input: &Path, req: &RasterRequest) -> Result<Vec<RasterPage>> {
        self.record("rasterize");
        if self.rasterize_fails {
            return Err(anyhow!("rasterizer missing"));
        }
        let pages: Vec<u32> = match &req.range {
            Some(r) => r.pages().collect(),
            None => (1..=self.ocr_text.len() as u32).collect(),
        };
        let mut out = Vec::new();
        for page in pages {
            let path = req.out_dir.join(format!("page-{page}.png"));
            std::fs::write(&path, b"png")?;
            out.push(RasterPage::new(page, path));
        }
        Ok(out)
    }

    fn recognize_text(&self, page: &RasterPage, _lang: &str, _psm: u32) -> Result<String> {
        self.record("recognize_text");
        if !page.path.exists() {
            return Err(anyhow!("raster for page {} is gone", page.page));
        }
        self.ocr_text
            .get(page.page as usize - 1)
            .cloned()
            .flatten()
            .ok_or_else(|| anyhow!("tesseract failed on page {}", page.page))
    }

    fn extract_tables(&self, _input: &Path, mode: TableMode) -> Result<Vec<ExtractedTable>> {
        self.record(format!("extract_tables:{mode}"));
        match self.tables.get(&mode) {
            Some(TableScript::Found(tables)) => Ok(tables.clone()),
            Some(TableScript::Fail) => Err(anyhow!("{mode} extractor failed")),
            None => Ok(Vec::new()),
        }
    }
}

/// Bytes of a small, valid package the mock layout converter writes.
pub fn base_docx() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("base.docx");
    let mut doc = OutputDocument::new();
    doc.push_paragraph("Quarterly report");
    doc.push_paragraph("Body text from the layout converter.");
    doc.save(&path).unwrap();
    std::fs::read(&path).unwrap()
}

pub fn table(rows: &[&[&str]]) -> ExtractedTable {
    ExtractedTable::from_rows(
        rows.iter()
            .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
            .collect(),
    )
    .unwrap()
}

/// Config rooted in a scratch directory.
pub fn test_config(root: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.paths.out_dir = root.join("out").display().to_string();
    cfg.paths.work_dir = root.join("work").display().to_string();
    cfg.paths.tools_dir = root.join("tools").display().to_string();
    cfg
}

pub fn write_pdf(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"%PDF-1.4\n% test fixture\n%%EOF\n").unwrap();
    path
}
