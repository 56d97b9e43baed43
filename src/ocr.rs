use crate::{
    config::Config,
    digital,
    docx::OutputDocument,
    engine::{Engine, RasterPage, RasterRequest, SearchableOptions},
    page_plan::{PagePlan, PageRange},
    postprocess::LineCleaner,
    util::{checked_output_size, ensure_dir},
};
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrStrategy {
    /// Rasterize, recognize page by page, write paragraphs.
    PerPage,
    /// Rewrite as a searchable PDF, then run the layout converter on it.
    SearchablePdf,
}

impl OcrStrategy {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "per_page" => Ok(Self::PerPage),
            "searchable_pdf" | "searchable" => Ok(Self::SearchablePdf),
            other => Err(anyhow!("unknown ocr.strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OcrSummary {
    pub strategy: OcrStrategy,
    pub pages_total: usize,
    pub pages_recognized: usize,
    pub pages_failed: usize,
    pub pages_empty: usize,
    pub paragraphs: usize,
    pub warnings: Vec<String>,
}

impl OcrSummary {
    fn new(strategy: OcrStrategy) -> Self {
        Self {
            strategy,
            pages_total: 0,
            pages_recognized: 0,
            pages_failed: 0,
            pages_empty: 0,
            paragraphs: 0,
            warnings: Vec::new(),
        }
    }
}

/// Recognized text for one source page. `lines` is None when rasterizing or
/// recognizing that page failed.
#[derive(Debug)]
struct PageOutcome {
    page: u32,
    lines: Option<Vec<String>>,
}

pub fn convert_via_ocr(
    cfg: &Config,
    engine: &dyn Engine,
    input: &Path,
    output: &Path,
) -> Result<OcrSummary> {
    let strategy = OcrStrategy::parse(&cfg.ocr.strategy)?;
    let mut summary = OcrSummary::new(strategy);
    info!("ocr strategy={:?} lang={} input={}", strategy, cfg.ocr.lang, input.display());

    match strategy {
        OcrStrategy::PerPage => per_page(cfg, engine, input, output, &mut summary)?,
        OcrStrategy::SearchablePdf => searchable(cfg, engine, input, output)?,
    }
    Ok(summary)
}

fn scratch_dir(cfg: &Config, prefix: &str) -> Result<TempDir> {
    let work = Path::new(&cfg.paths.work_dir);
    ensure_dir(work)?;
    tempfile::Builder::new()
        .prefix(prefix)
        .disable_cleanup(cfg.global.keep_intermediates)
        .tempdir_in(work)
        .with_context(|| format!("creating scratch dir in {}", work.display()))
}

fn searchable(cfg: &Config, engine: &dyn Engine, input: &Path, output: &Path) -> Result<()> {
    let scratch = scratch_dir(cfg, "searchable-")?;
    let searchable_pdf = scratch.path().join("searchable.pdf");
    let s = &cfg.ocr.searchable;
    let opts = SearchableOptions {
        lang: cfg.ocr.lang.clone(),
        skip_text: s.skip_text,
        rotate_pages: s.rotate_pages,
        deskew: s.deskew,
        clean: s.clean,
        remove_background: s.remove_background,
        optimize: s.optimize,
    };

    engine
        .make_searchable(input, &searchable_pdf, &opts)
        .with_context(|| "searchable PDF rewrite")?;
    checked_output_size(&searchable_pdf, cfg.limits.min_output_bytes)
        .with_context(|| "searchable PDF rewrite left no usable output")?;

    digital::convert_digital(cfg, engine, &searchable_pdf, output)
        .with_context(|| "layout conversion of the searchable PDF")?;
    Ok(())
}

fn per_page(
    cfg: &Config,
    engine: &dyn Engine,
    input: &Path,
    output: &Path,
    summary: &mut OcrSummary,
) -> Result<()> {
    let cleaner = LineCleaner::new(cfg)?;
    let scratch = scratch_dir(cfg, "ocr-")?;

    let batches: Vec<Option<PageRange>> = match engine.page_count(input) {
        Ok(0) => return Err(anyhow!("document has no pages")),
        Ok(n) => PagePlan::from_page_count(n, cfg.ocr.pages_per_batch, cfg.ocr.min_pages_per_batch)
            .batches
            .into_iter()
            .map(Some)
            .collect(),
        Err(err) => {
            warn!("page count unavailable, rasterizing in one pass: {err:#}");
            vec![None]
        }
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.ocr.workers.max(1))
        .build()
        .with_context(|| "building OCR thread pool")?;

    let lang = cfg.ocr.lang.as_str();
    let psm = cfg.ocr.psm;
    let mut pages: Vec<PageOutcome> = Vec::new();

    for (i, batch) in batches.iter().enumerate() {
        let dir = scratch.path().join(format!("batch-{i:04}"));
        ensure_dir(&dir)?;
        let req = RasterRequest {
            dpi: cfg.ocr.dpi,
            grayscale: cfg.ocr.grayscale,
            range: *batch,
            out_dir: dir,
        };

        let rasters = match engine.rasterize(input, &req) {
            Ok(r) => r,
            Err(err) => {
                let msg = format!("rasterizing batch {i} failed: {err:#}");
                warn!("{msg}");
                summary.warnings.push(msg);
                if let Some(range) = batch {
                    pages.extend(range.pages().map(|page| PageOutcome { page, lines: None }));
                }
                continue;
            }
        };
        debug!("batch {i}: {} pages rasterized", rasters.len());

        // Indexed collect keeps page order however the pool schedules work.
        let recognized: Vec<PageOutcome> = pool.install(|| {
            rasters
                .into_par_iter()
                .map(|raster| recognize_page(engine, &cleaner, raster, lang, psm))
                .collect()
        });
        pages.extend(recognized);
    }

    pages.sort_by_key(|p| p.page);
    for p in &pages {
        match &p.lines {
            None => summary.pages_failed += 1,
            Some(lines) if lines.is_empty() => {
                summary.pages_recognized += 1;
                summary.pages_empty += 1;
            }
            Some(_) => summary.pages_recognized += 1,
        }
    }
    summary.pages_total = pages.len();

    if summary.pages_recognized == 0 {
        return Err(anyhow!(
            "no page could be recognized ({} attempted)",
            summary.pages_total
        ));
    }

    let mut doc = OutputDocument::new();
    let last = pages.len() - 1;
    for (i, p) in pages.into_iter().enumerate() {
        for line in p.lines.unwrap_or_default() {
            doc.push_paragraph(line);
            summary.paragraphs += 1;
        }
        if i != last {
            doc.push_page_break();
        }
    }
    doc.save(output)?;

    info!(
        "ocr recognized {}/{} pages ({} empty), {} paragraphs",
        summary.pages_recognized, summary.pages_total, summary.pages_empty, summary.paragraphs
    );
    Ok(())
}

fn recognize_page(
    engine: &dyn Engine,
    cleaner: &LineCleaner,
    raster: RasterPage,
    lang: &str,
    psm: u32,
) -> PageOutcome {
    let page = raster.page;
    let res = engine.recognize_text(&raster, lang, psm);
    // Release the image before the next page is picked up.
    drop(raster);
    match res {
        Ok(text) => PageOutcome {
            page,
            lines: Some(cleaner.page_lines(&text)),
        },
        Err(err) => {
            warn!("ocr failed on page {page}: {err:#}");
            PageOutcome { page, lines: None }
        }
    }
}
