pub mod types;
pub mod format;
pub mod preprocess;
pub mod ocr;
pub mod ensemble;
pub mod pdfium;
pub mod router;

pub use types::*;
pub use format::*;
pub use preprocess::*;
pub use ocr::*;
pub use ensemble::*;
pub use router::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document unreadable: {0}")]
    DocumentUnreadable(String),

    #[error("File is {size_bytes} bytes, exceeding the {limit_bytes}-byte upload limit")]
    FileTooLarge { size_bytes: u64, limit_bytes: u64 },

    #[error("Unsupported media type: {0}")]
    UnsupportedFormat(String),

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("OCR engine initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR engine failure: {0}")]
    OcrEngineFailure(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// True for errors that end the whole request. Everything else is recovered
    /// page-locally by the router.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DocumentUnreadable(_)
                | Self::FileTooLarge { .. }
                | Self::UnsupportedFormat(_)
                | Self::Io(_)
        )
    }
}
