use serde::Serialize;
use thiserror::Error;

/// Why a conversion ended in the failed state. Display strings are what
/// users see in job status.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ConversionError {
    #[error("input rejected: {0}")]
    Input(String),

    #[error("digital conversion failed: {0}")]
    Digital(String),

    #[error("OCR conversion failed: {0}")]
    Ocr(String),

    #[error("conversion failed: digital attempt ({digital}); OCR attempt ({ocr})")]
    Extraction { digital: String, ocr: String },

    #[error("conversion failed or output corrupted: {0}")]
    Validation(String),

    #[error("job exceeded {0}s")]
    Timeout(u64),

    #[error("internal error: {0}")]
    Internal(String),
}
