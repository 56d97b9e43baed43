use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

use crate::page_plan::PageRange;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDiag {
    pub tool: String,
    pub path: String,
    pub available: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Leading-page text gathered for classification.
#[derive(Debug, Clone, Default)]
pub struct TextSample {
    pub page_count: u32,
    /// Text of pages `1..=pages.len()`.
    pub pages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RasterRequest {
    pub dpi: u32,
    pub grayscale: bool,
    /// None rasterizes every page.
    pub range: Option<PageRange>,
    pub out_dir: PathBuf,
}

/// One rasterized page on disk. The image file is removed when this value is
/// dropped, so a page never outlives its recognition.
#[derive(Debug)]
pub struct RasterPage {
    pub page: u32,
    pub path: PathBuf,
}

impl RasterPage {
    pub fn new(page: u32, path: PathBuf) -> Self {
        Self { page, path }
    }
}

impl Drop for RasterPage {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                debug!("removing raster {}: {err}", self.path.display());
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableMode {
    /// Ruling lines delimit cells.
    Lattice,
    /// Whitespace alignment delimits columns.
    Stream,
    /// Column detection over the layout-preserving text dump.
    TextLayout,
}

impl TableMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lattice" => Some(Self::Lattice),
            "stream" => Some(Self::Stream),
            "text_layout" | "text" => Some(Self::TextLayout),
            _ => None,
        }
    }
}

impl fmt::Display for TableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Lattice => "lattice",
            Self::Stream => "stream",
            Self::TextLayout => "text_layout",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ragged table: row {row} has {found} cells, expected {expected}")]
pub struct TableShapeError {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// Rectangular, row-major grid of optional cell texts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedTable {
    rows: Vec<Vec<Option<String>>>,
    cols: usize,
}

impl ExtractedTable {
    pub fn from_rows(rows: Vec<Vec<Option<String>>>) -> Result<Self, TableShapeError> {
        let cols = rows.first().map(|r| r.len()).unwrap_or(0);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(TableShapeError {
                    row: i,
                    expected: cols,
                    found: row.len(),
                });
            }
        }
        Ok(Self { rows, cols })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols == 0
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchableOptions {
    pub lang: String,
    pub skip_text: bool,
    pub rotate_pages: bool,
    pub deskew: bool,
    pub clean: bool,
    pub remove_background: bool,
    pub optimize: u8,
}

impl SearchableOptions {
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.skip_text {
            args.push("--skip-text".to_string());
        }
        if self.rotate_pages {
            args.push("--rotate-pages".to_string());
        }
        if self.deskew {
            args.push("--deskew".to_string());
        }
        if self.clean {
            args.push("--clean".to_string());
        }
        if self.remove_background {
            args.push("--remove-background".to_string());
        }
        args.push("--optimize".to_string());
        args.push(self.optimize.to_string());
        args.push("--language".to_string());
        args.push(self.lang.clone());
        args
    }
}
