use crate::config::Config;
use anyhow::{Context, Result};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Compiled line filters, built once per conversion.
pub struct LineCleaner {
    normalize_unicode: bool,
    trim_trailing_whitespace: bool,
    strip_control_chars: bool,
    drop: Vec<Regex>,
}

impl LineCleaner {
    pub fn new(cfg: &Config) -> Result<Self> {
        let drop = cfg
            .postprocess
            .drop_line_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid drop_line_patterns entry: {p}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            normalize_unicode: cfg.postprocess.normalize_unicode,
            trim_trailing_whitespace: cfg.postprocess.trim_trailing_whitespace,
            strip_control_chars: cfg.postprocess.strip_control_chars,
            drop,
        })
    }

    /// Splits recognized page text into the non-empty lines that become
    /// paragraphs.
    pub fn page_lines(&self, text: &str) -> Vec<String> {
        let mut s = text.replace("\r\n", "\n");

        if self.normalize_unicode {
            s = s.nfkc().collect::<String>();
        }

        if self.strip_control_chars {
            s = strip_control_chars(&s);
        }

        s.lines()
            .map(|l| {
                if self.trim_trailing_whitespace {
                    l.trim_end()
                } else {
                    l
                }
            })
            .filter(|l| !l.trim().is_empty())
            .filter(|l| !self.drop.iter().any(|r| r.is_match(l.trim())))
            .map(str::to_string)
            .collect()
    }
}

fn strip_control_chars(s: &str) -> String {
    s.chars()
        .filter(|&ch| {
            // Keep line structure and tabs.
            if ch == '\n' || ch == '\t' {
                return true;
            }
            !ch.is_control()
        })
        .collect()
}
