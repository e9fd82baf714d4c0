use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Media types accepted by the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
}

impl MediaType {
    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_ascii_lowercase().as_str() {
            "application/pdf" => Some(Self::Pdf),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn is_raster(&self) -> bool {
        matches!(self, Self::Jpeg | Self::Png)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_mime())
    }
}

/// An uploaded document for the duration of one extraction call.
/// Never written anywhere; dropped when the call returns.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
}

/// One rasterized page. Owned by whichever step rendered it.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    /// 1-based page number within the source document.
    pub page_number: usize,
    pub image: RgbImage,
}

impl PageImage {
    pub fn new(page_number: usize, image: RgbImage) -> Self {
        Self { page_number, image }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Tesseract page segmentation modes used by the strategy catalogue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PageSegMode {
    /// PSM 3: fully automatic page segmentation.
    Auto,
    /// PSM 4: a single column of text of variable sizes.
    SingleColumn,
    /// PSM 6: a single uniform block of text.
    SingleBlock,
    /// PSM 11: sparse text, as much as possible in no particular order.
    SparseText,
}

impl PageSegMode {
    pub fn tesseract_value(&self) -> u8 {
        match self {
            Self::Auto => 3,
            Self::SingleColumn => 4,
            Self::SingleBlock => 6,
            Self::SparseText => 11,
        }
    }
}

/// Characters the recognizer may emit: alphanumerics plus the punctuation that
/// shows up in rating decisions (dates, percentages, diagnostic codes).
pub const OCR_CHAR_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,:;%/-()'\"&#";

/// Full parameter set for one recognition call.
///
/// Every call carries the complete set; engines must not fall back to settings
/// left over from a previous call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrParams {
    pub page_seg_mode: PageSegMode,
    pub char_whitelist: String,
    pub preserve_interword_spaces: bool,
    pub invert_detection: bool,
    pub language: String,
}

impl OcrParams {
    /// Parameters used by every catalogue strategy, differing only in PSM.
    pub fn for_strategy(page_seg_mode: PageSegMode, language: &str) -> Self {
        Self {
            page_seg_mode,
            char_whitelist: OCR_CHAR_WHITELIST.to_string(),
            preserve_interword_spaces: true,
            invert_detection: true,
            language: language.to_string(),
        }
    }
}

/// Raw OCR result from the engine.
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    /// Mean word confidence as reported by the engine, 0-100.
    pub confidence: f32,
    pub word_confidences: Vec<OcrWordResult>,
}

/// Per-word OCR result with optional bounding box.
#[derive(Debug, Clone)]
pub struct OcrWordResult {
    pub text: String,
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
}

/// Bounding box for a recognized word, in page pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Recoverable problems met while routing a document to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtractionWarning {
    /// A page contributed no text (render or recognition failed).
    PageSkipped { page: usize, reason: String },
    /// The document is longer than the OCR page cap.
    PagesNotScanned { scanned: usize, total: usize },
}

impl std::fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PageSkipped { page, reason } => {
                write!(f, "Page {page} was skipped: {reason}")
            }
            Self::PagesNotScanned { scanned, total } => write!(
                f,
                "Only the first {scanned} of {total} pages were scanned; {} pages were not read",
                total - scanned
            ),
        }
    }
}

/// Cooperative cancellation flag shared between the caller and the pipeline.
///
/// Cloning shares the flag. The pipeline checks it before each page and each
/// OCR strategy; work already in flight finishes and is discarded.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// OCR engine abstraction (allows mocking for tests).
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, page: &PageImage, params: &OcrParams)
        -> Result<OcrPageResult, ExtractionError>;
}

/// Native PDF text-layer extraction.
pub trait PdfTextLayer: Send + Sync {
    /// Text of every page in order, one entry per page.
    fn page_texts(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError>;
}

/// PDF page rasterization.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// Render a page (0-based index) at `scale` times its size in PDF points.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_index: usize,
        scale: f32,
    ) -> Result<PageImage, ExtractionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_type_from_mime() {
        assert_eq!(MediaType::from_mime("application/pdf"), Some(MediaType::Pdf));
        assert_eq!(MediaType::from_mime("IMAGE/JPEG"), Some(MediaType::Jpeg));
        assert_eq!(MediaType::from_mime(" image/png "), Some(MediaType::Png));
        assert_eq!(MediaType::from_mime("image/tiff"), None);
        assert_eq!(MediaType::from_mime(""), None);
    }

    #[test]
    fn raster_classification() {
        assert!(MediaType::Jpeg.is_raster());
        assert!(MediaType::Png.is_raster());
        assert!(!MediaType::Pdf.is_raster());
    }

    #[test]
    fn psm_values_match_tesseract() {
        assert_eq!(PageSegMode::Auto.tesseract_value(), 3);
        assert_eq!(PageSegMode::SingleColumn.tesseract_value(), 4);
        assert_eq!(PageSegMode::SingleBlock.tesseract_value(), 6);
        assert_eq!(PageSegMode::SparseText.tesseract_value(), 11);
    }

    #[test]
    fn strategy_params_are_complete() {
        let params = OcrParams::for_strategy(PageSegMode::SparseText, "eng");
        assert_eq!(params.page_seg_mode, PageSegMode::SparseText);
        assert!(params.preserve_interword_spaces);
        assert!(params.invert_detection);
        assert!(params.char_whitelist.contains('%'));
        assert!(params.char_whitelist.contains('/'));
        assert_eq!(params.language, "eng");
    }

    #[test]
    fn warning_messages_name_pages() {
        let skipped = ExtractionWarning::PageSkipped {
            page: 4,
            reason: "engine crashed".into(),
        };
        assert_eq!(skipped.to_string(), "Page 4 was skipped: engine crashed");

        let capped = ExtractionWarning::PagesNotScanned { scanned: 10, total: 14 };
        assert!(capped.to_string().contains("4 pages were not read"));
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
