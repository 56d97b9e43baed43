pub mod cli;
pub mod config;
pub mod digital;
pub mod docx;
pub mod engine;
pub mod error;
pub mod input;
pub mod jobs;
pub mod ocr;
pub mod page_plan;
pub mod pipeline;
pub mod policy;
pub mod postprocess;
pub mod probe;
pub mod report;
pub mod table_detect;
pub mod tables;
pub mod util;
