pub mod process;
pub mod system;
pub mod tools;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

use crate::page_plan::PageRange;

pub use types::{
    ExtractedTable, RasterPage, RasterRequest, SearchableOptions, TableMode, TableShapeError,
    TextSample, ToolDiag,
};

/// Everything the pipeline needs from the outside world. Implementations must
/// bound every external call and report failure as `Err`, never by panicking.
pub trait Engine: Send + Sync {
    fn doctor(&self) -> Result<Vec<ToolDiag>>;
    fn page_count(&self, input: &Path) -> Result<u32>;
    /// Text of one page, 1-based.
    fn page_text(&self, input: &Path, page: u32) -> Result<String>;
    /// Page count and the text of the first `max_pages` pages. Engines that
    /// parse the whole file should override this to parse it once.
    fn sample_text(&self, input: &Path, max_pages: u32) -> Result<TextSample> {
        let page_count = self.page_count(input).with_context(|| "engine page_count failed")?;
        let mut pages = Vec::new();
        for page in 1..=max_pages.min(page_count) {
            let text = self
                .page_text(input, page)
                .with_context(|| format!("engine page_text failed on page {page}"))?;
            pages.push(text);
        }
        Ok(TextSample { page_count, pages })
    }
    fn convert_layout(&self, input: &Path, output: &Path, range: Option<&PageRange>)
        -> Result<()>;
    fn make_searchable(&self, input: &Path, output: &Path, opts: &SearchableOptions)
        -> Result<()>;
    /// Pages come back in ascending page order.
    fn rasterize(&self, input: &Path, req: &RasterRequest) -> Result<Vec<RasterPage>>;
    fn recognize_text(&self, page: &RasterPage, lang: &str, psm: u32) -> Result<String>;
    fn extract_tables(&self, input: &Path, mode: TableMode) -> Result<Vec<ExtractedTable>>;
}
