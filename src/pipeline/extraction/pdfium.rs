//! PDF text layer and page rendering via Google PDFium.
//!
//! Both types are stateless (`Send + Sync`). Each operation creates a fresh
//! `Pdfium` instance because the upstream type is `!Send`. The OS caches
//! `dlopen`/`LoadLibrary` calls, so repeat loads are near-free.

use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::{PageImage, PdfPageRenderer, PdfTextLayer};
use super::ExtractionError;

/// Load the PDFium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_DYNAMIC_LIB_PATH` env var (explicit path)
/// 2. Alongside the running executable
/// 3. System library search paths
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
            ExtractionError::PdfRendering {
                page: 0,
                reason: format!("Failed to load PDFium from {path}: {e}"),
            }
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings =
        Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!(
                "PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH or install PDFium: {e}"
            ),
        })?;
    Ok(Pdfium::new(bindings))
}

/// Map PDF load errors. Password-protected files get their own variant; any
/// other load failure means the container itself is unreadable.
fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = format!("{e}");
    let lower = msg.to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::DocumentUnreadable(format!("Failed to load PDF: {e}"))
    }
}

/// Pixel dimensions for a page of `width_points x height_points` rendered at
/// `scale`, with the longest edge capped at `max_dimension`.
///
/// Both results are clamped to [1, max_dimension]; aspect ratio is preserved
/// when capping.
pub fn compute_render_dimensions(
    width_points: f32,
    height_points: f32,
    scale: f32,
    max_dimension: u32,
) -> (u32, u32) {
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);
    let cap = max_dimension.max(1);

    let longest = raw_w.max(raw_h);
    let ratio = if longest > cap as f32 {
        cap as f32 / longest
    } else {
        1.0
    };
    let w = ((raw_w * ratio).round() as u32).clamp(1, cap);
    let h = ((raw_h * ratio).round() as u32).clamp(1, cap);
    (w, h)
}

/// Native text layer reader.
pub struct PdfiumTextLayer;

impl PdfTextLayer for PdfiumTextLayer {
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let mut texts = Vec::with_capacity(document.pages().len() as usize);
        for (index, page) in document.pages().iter().enumerate() {
            let text = page.text().map(|t| t.all()).map_err(|e| {
                ExtractionError::DocumentUnreadable(format!(
                    "Text layer unreadable on page {}: {e}",
                    index + 1
                ))
            })?;
            texts.push(text);
        }

        debug!(pages = texts.len(), "Read PDF text layer");
        Ok(texts)
    }
}

/// Renders PDF pages to RGB rasters.
pub struct PdfiumRenderer {
    max_dimension: u32,
}

impl PdfiumRenderer {
    /// Create a renderer, verifying the PDFium library is loadable.
    pub fn new(max_dimension: u32) -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self { max_dimension })
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        Ok(document.pages().len() as usize)
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        scale: f32,
    ) -> Result<PageImage, ExtractionError> {
        let page_number = page_index + 1;
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;
        let pages = document.pages();

        let index = u16::try_from(page_index).map_err(|_| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!("Page index {page_index} exceeds u16 maximum"),
        })?;
        let page = pages.get(index).map_err(|_| ExtractionError::PdfRendering {
            page: page_number,
            reason: format!(
                "Page {page_number} out of range (document has {} pages)",
                pages.len()
            ),
        })?;

        let width_points = page.width().value;
        let height_points = page.height().value;
        let (target_w, target_h) =
            compute_render_dimensions(width_points, height_points, scale, self.max_dimension);

        let uncapped_w = (width_points * scale).round() as u32;
        let uncapped_h = (height_points * scale).round() as u32;
        if target_w < uncapped_w || target_h < uncapped_h {
            warn!(
                page = page_number,
                raw_width = uncapped_w,
                raw_height = uncapped_h,
                capped_width = target_w,
                capped_height = target_h,
                "Page dimensions capped to {}px",
                self.max_dimension
            );
        }

        let config = PdfRenderConfig::new()
            .set_target_width(target_w as i32)
            .set_maximum_height(target_h as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Rendering failed: {e}"),
            })?;
        let rgb = bitmap.as_image().to_rgb8();

        debug!(
            page = page_number,
            width = rgb.width(),
            height = rgb.height(),
            "Rendered PDF page"
        );

        Ok(PageImage::new(page_number, rgb))
    }
}

// ── Mocks for testing ─────────────────────────────────────

/// Mock renderer producing a small white page per index.
pub struct MockPdfPageRenderer {
    page_count: usize,
    failing_pages: Vec<usize>,
    unreadable: bool,
    renders: AtomicUsize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            failing_pages: Vec::new(),
            unreadable: false,
            renders: AtomicUsize::new(0),
        }
    }

    /// Render fails on these 0-based page indices.
    pub fn with_failing_pages(mut self, pages: &[usize]) -> Self {
        self.failing_pages = pages.to_vec();
        self
    }

    /// The document cannot be opened at all.
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Self::new(0)
        }
    }

    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        if self.unreadable {
            return Err(ExtractionError::DocumentUnreadable("Mock corrupt PDF".into()));
        }
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_index: usize,
        _scale: f32,
    ) -> Result<PageImage, ExtractionError> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        if page_index >= self.page_count || self.failing_pages.contains(&page_index) {
            return Err(ExtractionError::PdfRendering {
                page: page_index + 1,
                reason: format!("Mock cannot render page index {page_index}"),
            });
        }
        Ok(PageImage::new(
            page_index + 1,
            RgbImage::from_pixel(16, 16, Rgb([255, 255, 255])),
        ))
    }
}

/// Mock text layer returning fixed per-page text.
pub struct MockTextLayer {
    pages: Vec<String>,
    fail: bool,
}

impl MockTextLayer {
    pub fn new(pages: &[&str]) -> Self {
        Self {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: Vec::new(),
            fail: true,
        }
    }
}

impl PdfTextLayer for MockTextLayer {
    fn page_texts(&self, _pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        if self.fail {
            return Err(ExtractionError::DocumentUnreadable("Mock text layer failure".into()));
        }
        Ok(self.pages.clone())
    }
}
