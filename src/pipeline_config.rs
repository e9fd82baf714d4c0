//! Pipeline configuration.
//!
//! Defaults reproduce the tuned extraction behaviour. Environment variables
//! (prefix `RATINGSCAN_`) override individual values for deployment; the
//! tuned image and scoring constants are not configurable.

use serde::{Deserialize, Serialize};
use tracing::warn;

// ═══════════════════════════════════════════════════════════
// Defaults
// ═══════════════════════════════════════════════════════════

/// Upload size limit: 10 MiB.
pub const DEFAULT_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Pages OCR'd per document. Rating decisions front-load the condition list.
pub const DEFAULT_MAX_OCR_PAGES: usize = 10;

/// Render scale relative to PDF points.
pub const DEFAULT_RENDER_SCALE: f32 = 6.0;

/// Longest rendered or upscaled edge in pixels.
pub const DEFAULT_MAX_RENDER_DIMENSION: u32 = 6000;

pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Larger uploads are rejected before any processing.
    pub max_file_bytes: u64,
    pub max_ocr_pages: usize,
    pub render_scale: f32,
    pub max_render_dimension: u32,
    /// Pages OCR'd concurrently. 1 = sequential.
    pub page_workers: usize,
    /// Run the five OCR strategies of a page concurrently.
    pub parallel_strategies: bool,
    /// Tesseract language data passed with every recognition call.
    pub ocr_language: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_ocr_pages: DEFAULT_MAX_OCR_PAGES,
            render_scale: DEFAULT_RENDER_SCALE,
            max_render_dimension: DEFAULT_MAX_RENDER_DIMENSION,
            page_workers: 1,
            parallel_strategies: false,
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`. Unparseable values are logged and
    /// ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parsed(&lookup, "RATINGSCAN_MAX_FILE_BYTES") {
            config.max_file_bytes = v;
        }
        if let Some(v) = parsed(&lookup, "RATINGSCAN_MAX_OCR_PAGES") {
            config.max_ocr_pages = v;
        }
        if let Some(v) = parsed::<f32, _>(&lookup, "RATINGSCAN_RENDER_SCALE") {
            if v.is_finite() && v > 0.0 {
                config.render_scale = v;
            } else {
                warn!(value = v, "RATINGSCAN_RENDER_SCALE must be positive, ignoring");
            }
        }
        if let Some(v) = parsed(&lookup, "RATINGSCAN_MAX_RENDER_DIMENSION") {
            config.max_render_dimension = v;
        }
        if let Some(v) = parsed::<usize, _>(&lookup, "RATINGSCAN_PAGE_WORKERS") {
            config.page_workers = v.max(1);
        }
        if let Some(raw) = lookup("RATINGSCAN_PARALLEL_STRATEGIES") {
            match parse_flag(&raw) {
                Some(flag) => config.parallel_strategies = flag,
                None => warn!(value = %raw, "RATINGSCAN_PARALLEL_STRATEGIES is not a boolean, ignoring"),
            }
        }
        if let Some(lang) = lookup("TESSERACT_LANG") {
            if !lang.trim().is_empty() {
                config.ocr_language = lang.trim().to_string();
            }
        }

        config
    }

    pub fn with_page_workers(mut self, workers: usize) -> Self {
        self.page_workers = workers.max(1);
        self
    }

    pub fn with_parallel_strategies(mut self, parallel: bool) -> Self {
        self.parallel_strategies = parallel;
        self
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "Invalid configuration value, using default");
            None
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_tuned_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_file_bytes, 10_485_760);
        assert_eq!(config.max_ocr_pages, 10);
        assert_eq!(config.render_scale, 6.0);
        assert_eq!(config.max_render_dimension, 6000);
        assert_eq!(config.page_workers, 1);
        assert!(!config.parallel_strategies);
        assert_eq!(config.ocr_language, "eng");
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = PipelineConfig::from_lookup(|_| None);
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn environment_overrides() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("RATINGSCAN_MAX_FILE_BYTES", "2048"),
            ("RATINGSCAN_MAX_OCR_PAGES", "3"),
            ("RATINGSCAN_RENDER_SCALE", "4.5"),
            ("RATINGSCAN_MAX_RENDER_DIMENSION", "3000"),
            ("RATINGSCAN_PAGE_WORKERS", "4"),
            ("RATINGSCAN_PARALLEL_STRATEGIES", "yes"),
            ("TESSERACT_LANG", "eng+spa"),
        ]));
        assert_eq!(config.max_file_bytes, 2048);
        assert_eq!(config.max_ocr_pages, 3);
        assert_eq!(config.render_scale, 4.5);
        assert_eq!(config.max_render_dimension, 3000);
        assert_eq!(config.page_workers, 4);
        assert!(config.parallel_strategies);
        assert_eq!(config.ocr_language, "eng+spa");
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = PipelineConfig::from_lookup(lookup_from(&[
            ("RATINGSCAN_MAX_OCR_PAGES", "ten"),
            ("RATINGSCAN_RENDER_SCALE", "-2"),
            ("RATINGSCAN_PARALLEL_STRATEGIES", "maybe"),
            ("TESSERACT_LANG", "   "),
        ]));
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn zero_workers_clamped_to_one() {
        let config = PipelineConfig::from_lookup(lookup_from(&[("RATINGSCAN_PAGE_WORKERS", "0")]));
        assert_eq!(config.page_workers, 1);
        assert_eq!(PipelineConfig::default().with_page_workers(0).page_workers, 1);
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("off"), Some(false));
        assert_eq!(parse_flag(""), None);
    }
}
