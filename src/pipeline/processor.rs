//! Extraction request orchestrator.
//!
//! Single entry point that drives one document through the pipeline:
//! admit (size, magic bytes) → route to text → parse → validate.
//!
//! Engines are injected as trait objects so the orchestrator stays fully
//! testable with mock implementations. Nothing is persisted: the document
//! bytes are dropped when the call returns.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::extraction::format::{admit_document, read_document};
use crate::pipeline::extraction::ocr::TesseractCli;
use crate::pipeline::extraction::pdfium::{PdfiumRenderer, PdfiumTextLayer};
use crate::pipeline::extraction::router::{
    has_structural_signals, DocumentTextRouter, ExtractionEvent, RouteOutcome, RoutedText,
};
use crate::pipeline::extraction::types::{
    CancellationToken, ExtractionWarning, OcrEngine, PdfPageRenderer, PdfTextLayer,
    SourceDocument,
};
use crate::pipeline::extraction::ExtractionError;
use crate::pipeline::structuring::parser::{detect_stated_combined_rating, parse_decision_text};
use crate::pipeline::structuring::types::{
    ExtractedCondition, ExtractedDeniedCondition, ValidationWarning, WarningCode,
};
use crate::pipeline::structuring::validation::validate_conditions;
use crate::pipeline_config::PipelineConfig;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Everything read from one decision letter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub conditions: Vec<ExtractedCondition>,
    pub denied_conditions: Vec<ExtractedDeniedCondition>,
    pub warnings: Vec<ValidationWarning>,
    pub used_ocr: bool,
    /// Combined rating printed in the letter itself, if found.
    pub stated_combined_rating: Option<u8>,
}

impl ExtractionResult {
    fn empty(used_ocr: bool) -> Self {
        Self {
            conditions: Vec::new(),
            denied_conditions: Vec::new(),
            warnings: Vec::new(),
            used_ocr,
            stated_combined_rating: None,
        }
    }

    /// The combined rating may be applied without asking the user only when
    /// nothing at all was flagged.
    pub fn can_auto_apply_combined(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Complete(ExtractionResult),
    /// The caller cancelled. Text from finished pages is discarded.
    Cancelled {
        pages_completed: usize,
        pages_planned: usize,
    },
}

/// Per-request inputs besides the document itself.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// MIME type the uploader claimed. `None` lets the magic bytes decide.
    pub declared_media_type: Option<String>,
    /// Combined rating entered independently by the user.
    pub combined_rating: Option<u8>,
    pub cancel: CancellationToken,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Owns the engines and configuration; builds a router per request.
pub struct DocumentProcessor {
    engine: Box<dyn OcrEngine>,
    text_layer: Box<dyn PdfTextLayer>,
    renderer: Box<dyn PdfPageRenderer>,
    config: PipelineConfig,
}

impl DocumentProcessor {
    pub fn new(
        engine: Box<dyn OcrEngine>,
        text_layer: Box<dyn PdfTextLayer>,
        renderer: Box<dyn PdfPageRenderer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            engine,
            text_layer,
            renderer,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Full pipeline from a file on disk.
    pub fn process_file(
        &self,
        path: &Path,
        options: &ExtractionOptions,
        progress: Option<&dyn Fn(ExtractionEvent)>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let document = read_document(
            path,
            options.declared_media_type.as_deref(),
            self.config.max_file_bytes,
        )?;
        self.process_document(&document, options, progress)
    }

    /// Full pipeline from uploaded bytes.
    pub fn process_bytes(
        &self,
        bytes: Vec<u8>,
        options: &ExtractionOptions,
        progress: Option<&dyn Fn(ExtractionEvent)>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let document = admit_document(
            bytes,
            options.declared_media_type.as_deref(),
            self.config.max_file_bytes,
        )?;
        self.process_document(&document, options, progress)
    }

    /// Route an admitted document to text, then parse and validate it.
    ///
    /// Only document-level failures are returned as errors. Page failures,
    /// the page cap and empty content all surface as warnings.
    pub fn process_document(
        &self,
        document: &SourceDocument,
        options: &ExtractionOptions,
        progress: Option<&dyn Fn(ExtractionEvent)>,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let extraction_id = Uuid::new_v4();
        let span = tracing::info_span!("extraction", extraction_id = %extraction_id);
        let _guard = span.enter();
        let start = Instant::now();

        tracing::info!(
            media_type = %document.media_type,
            size_bytes = document.bytes.len(),
            "Processing: starting extraction"
        );

        let router = DocumentTextRouter::new(
            self.text_layer.as_ref(),
            self.renderer.as_ref(),
            self.engine.as_ref(),
            &self.config,
        );

        let routed = match router.route(document, &options.cancel, progress).map_err(|e| {
            if e.is_fatal() {
                tracing::error!(error = %e, "Processing failed");
            } else {
                tracing::warn!(error = %e, "Processing stopped by a recoverable error");
            }
            e
        })? {
            RouteOutcome::Complete(routed) => routed,
            RouteOutcome::Cancelled {
                pages_completed,
                pages_planned,
            } => {
                tracing::info!(pages_completed, pages_planned, "Processing cancelled");
                return Ok(ExtractionOutcome::Cancelled {
                    pages_completed,
                    pages_planned,
                });
            }
        };

        let result = build_result(routed, options.combined_rating);

        tracing::info!(
            used_ocr = result.used_ocr,
            conditions = result.conditions.len(),
            denied = result.denied_conditions.len(),
            warnings = result.warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Processing complete"
        );

        Ok(ExtractionOutcome::Complete(result))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse and validate routed text. Page warnings come first, in page order.
fn build_result(routed: RoutedText, combined_rating: Option<u8>) -> ExtractionResult {
    let RoutedText {
        text,
        used_ocr,
        warnings: page_warnings,
    } = routed;

    let mut result = ExtractionResult::empty(used_ocr);
    result.warnings = page_warnings.iter().map(page_warning).collect();

    if !has_structural_signals(&text) {
        tracing::warn!(
            chars = text.chars().count(),
            "No decision content found in extracted text"
        );
        result.warnings.push(ValidationWarning::info(
            WarningCode::NoMeaningfulContent,
            "No rating decision content was found in this document",
        ));
        return result;
    }

    let parsed = parse_decision_text(&text);
    result.stated_combined_rating = detect_stated_combined_rating(&text);

    if parsed.is_empty() {
        result.warnings.push(ValidationWarning::info(
            WarningCode::NoMeaningfulContent,
            "No conditions could be read from this document",
        ));
    }

    let combined = combined_rating.or(result.stated_combined_rating);
    result
        .warnings
        .extend(validate_conditions(&parsed.conditions, combined));

    result.conditions = parsed.conditions;
    result.denied_conditions = parsed.denied;
    result
}

fn page_warning(warning: &ExtractionWarning) -> ValidationWarning {
    let code = match warning {
        ExtractionWarning::PageSkipped { .. } => WarningCode::PageSkipped,
        ExtractionWarning::PagesNotScanned { .. } => WarningCode::PageCap,
    };
    ValidationWarning::info(code, warning.to_string())
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a `DocumentProcessor` with production implementations:
/// the Tesseract command line for OCR and PDFium for text layers and
/// rendering.
///
/// Fails if the PDFium library cannot be loaded.
pub fn build_processor(config: PipelineConfig) -> Result<DocumentProcessor, ExtractionError> {
    let engine = TesseractCli::from_env();
    tracing::info!(
        command = %engine.config().command,
        language = %config.ocr_language,
        "Document processor using Tesseract"
    );
    let renderer = PdfiumRenderer::new(config.max_render_dimension)?;

    Ok(DocumentProcessor::new(
        Box::new(engine),
        Box::new(PdfiumTextLayer),
        Box::new(renderer),
        config,
    ))
}
