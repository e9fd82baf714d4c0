//! Document-to-text routing.
//!
//! PDFs with a meaningful native text layer skip OCR entirely. Everything
//! else (scanned PDFs, photos, screenshots) goes through the OCR ensemble
//! page by page, under the page cap.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use super::ensemble::OcrEnsemble;
use super::preprocess::decode_raster;
use super::types::{
    CancellationToken, ExtractionWarning, OcrEngine, PageImage, PdfPageRenderer,
    PdfTextLayer, SourceDocument,
};
use super::ExtractionError;
use crate::pipeline_config::PipelineConfig;

/// A text layer must be strictly longer than this to count as meaningful.
pub const MEANINGFUL_MIN_CHARS: usize = 100;

const SIGNAL_KEYWORDS: [&str; 3] = ["service connected", "rating", "disability"];

static PERCENTAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{1,3}%").expect("Invalid percentage regex pattern"));

/// True when the text carries anything that looks like decision content:
/// a percentage or one of the decision keywords (case-insensitive).
pub fn has_structural_signals(text: &str) -> bool {
    if PERCENTAGE.is_match(text) {
        return true;
    }
    let lower = text.to_lowercase();
    SIGNAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Whether a PDF text layer is good enough to skip OCR.
///
/// Length is counted on the trimmed text so whitespace-only layers from
/// image-only PDFs never qualify.
pub fn is_meaningful_text(text: &str) -> bool {
    text.trim().chars().count() > MEANINGFUL_MIN_CHARS && has_structural_signals(text)
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Progress reported while a document is routed to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExtractionEvent {
    TextLayerChecked {
        meaningful: bool,
        chars: usize,
    },
    OcrStarted {
        pages_planned: usize,
        pages_total: usize,
    },
    PageCompleted {
        page: usize,
        strategy: String,
        score: f64,
    },
    PageSkipped {
        page: usize,
        reason: String,
    },
    Cancelled {
        pages_completed: usize,
        pages_planned: usize,
    },
}

/// Full document text and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedText {
    /// Page texts joined by newlines, in page order.
    pub text: String,
    pub used_ocr: bool,
    pub warnings: Vec<ExtractionWarning>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Complete(RoutedText),
    /// Cancelled before all planned pages finished. No partial text.
    Cancelled {
        pages_completed: usize,
        pages_planned: usize,
    },
}

#[derive(Debug, Clone)]
enum PageOutcome {
    Recognized {
        text: String,
        strategy: String,
        score: f64,
    },
    Skipped(String),
    Cancelled,
}

type Progress<'p> = Option<&'p dyn Fn(ExtractionEvent)>;

fn emit(progress: Progress<'_>, event: ExtractionEvent) {
    if let Some(callback) = progress {
        callback(event);
    }
}

// ═══════════════════════════════════════════════════════════
// Router
// ═══════════════════════════════════════════════════════════

/// Routes one document to text using borrowed engines.
pub struct DocumentTextRouter<'a> {
    text_layer: &'a dyn PdfTextLayer,
    renderer: &'a dyn PdfPageRenderer,
    engine: &'a dyn OcrEngine,
    config: &'a PipelineConfig,
}

impl<'a> DocumentTextRouter<'a> {
    pub fn new(
        text_layer: &'a dyn PdfTextLayer,
        renderer: &'a dyn PdfPageRenderer,
        engine: &'a dyn OcrEngine,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            text_layer,
            renderer,
            engine,
            config,
        }
    }

    /// Produce the document's full text.
    ///
    /// Page-level failures become `PageSkipped` warnings with an empty page.
    /// Errors are returned only when the document as a whole cannot be read.
    pub fn route(
        &self,
        document: &SourceDocument,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<RouteOutcome, ExtractionError> {
        let span = info_span!(
            "route_document",
            media_type = %document.media_type,
            size_bytes = document.bytes.len()
        );
        let _guard = span.enter();
        let start = Instant::now();

        let outcome = if document.media_type.is_raster() {
            self.route_raster(&document.bytes, cancel, progress)?
        } else {
            self.route_pdf(&document.bytes, cancel, progress)?
        };

        if let RouteOutcome::Complete(routed) = &outcome {
            info!(
                used_ocr = routed.used_ocr,
                chars = routed.text.chars().count(),
                warnings = routed.warnings.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Document routed to text"
            );
        }
        Ok(outcome)
    }

    fn route_raster(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<RouteOutcome, ExtractionError> {
        let page = decode_raster(bytes, self.config.render_scale, self.config.max_render_dimension)?;

        emit(
            progress,
            ExtractionEvent::OcrStarted {
                pages_planned: 1,
                pages_total: 1,
            },
        );

        let outcome = if cancel.is_cancelled() {
            PageOutcome::Cancelled
        } else {
            self.recognize(&page, cancel)
        };
        report_page(progress, 0, &outcome);

        Ok(assemble(vec![outcome], 1, Vec::new(), progress))
    }

    fn route_pdf(
        &self,
        bytes: &[u8],
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<RouteOutcome, ExtractionError> {
        match self.text_layer.page_texts(bytes) {
            Ok(pages) => {
                let text = pages.join("\n");
                let meaningful = is_meaningful_text(&text);
                let chars = text.trim().chars().count();
                emit(progress, ExtractionEvent::TextLayerChecked { meaningful, chars });
                if meaningful {
                    debug!(chars, "Native text layer is meaningful, skipping OCR");
                    return Ok(RouteOutcome::Complete(RoutedText {
                        text,
                        used_ocr: false,
                        warnings: Vec::new(),
                    }));
                }
                debug!(chars, "Native text layer lacks decision content, falling back to OCR");
            }
            Err(e) => {
                warn!(error = %e, "Text layer extraction failed, falling back to OCR");
            }
        }

        let total = self.renderer.page_count(bytes).map_err(|e| match e {
            ExtractionError::PdfEncrypted => {
                ExtractionError::DocumentUnreadable("PDF is password-protected".into())
            }
            ExtractionError::DocumentUnreadable(reason) => {
                ExtractionError::DocumentUnreadable(reason)
            }
            other => ExtractionError::DocumentUnreadable(other.to_string()),
        })?;

        let planned = total.min(self.config.max_ocr_pages);
        let mut warnings = Vec::new();
        if planned < total {
            info!(
                scanned = planned,
                total, "Document exceeds the OCR page cap, trailing pages not read"
            );
            warnings.push(ExtractionWarning::PagesNotScanned {
                scanned: planned,
                total,
            });
        }

        emit(
            progress,
            ExtractionEvent::OcrStarted {
                pages_planned: planned,
                pages_total: total,
            },
        );

        let outcomes = if self.config.page_workers > 1 && planned > 1 {
            let outcomes = self.ocr_pages_parallel(bytes, planned, cancel);
            for (index, outcome) in outcomes.iter().enumerate() {
                report_page(progress, index, outcome);
            }
            outcomes
        } else {
            self.ocr_pages_sequential(bytes, planned, cancel, progress)
        };

        Ok(assemble(outcomes, planned, warnings, progress))
    }

    fn ocr_pages_sequential(
        &self,
        bytes: &[u8],
        planned: usize,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Vec<PageOutcome> {
        let mut outcomes = Vec::with_capacity(planned);
        for index in 0..planned {
            let outcome = self.ocr_page(bytes, index, cancel);
            if matches!(outcome, PageOutcome::Cancelled) {
                break;
            }
            report_page(progress, index, &outcome);
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Pages are claimed from a shared counter by `page_workers` scoped
    /// threads, then merged back into page order.
    fn ocr_pages_parallel(
        &self,
        bytes: &[u8],
        planned: usize,
        cancel: &CancellationToken,
    ) -> Vec<PageOutcome> {
        let counter = AtomicUsize::new(0);
        let next = &counter;
        let workers = self.config.page_workers.min(planned);
        debug!(workers, planned, "OCR pages in parallel");

        let finished: Vec<(usize, PageOutcome)> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let index = next.fetch_add(1, Ordering::SeqCst);
                            if index >= planned {
                                break;
                            }
                            done.push((index, self.ocr_page(bytes, index, cancel)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| handle.join().unwrap_or_default())
                .collect()
        });

        let mut slots: Vec<Option<PageOutcome>> = vec![None; planned];
        for (index, outcome) in finished {
            slots[index] = Some(outcome);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| PageOutcome::Skipped("page worker panicked".into()))
            })
            .collect()
    }

    fn ocr_page(&self, bytes: &[u8], index: usize, cancel: &CancellationToken) -> PageOutcome {
        if cancel.is_cancelled() {
            return PageOutcome::Cancelled;
        }
        match self.renderer.render_page(bytes, index, self.config.render_scale) {
            Ok(page) => self.recognize(&page, cancel),
            Err(e) => {
                warn!(page = index + 1, error = %e, "Page render failed, skipping page");
                PageOutcome::Skipped(e.to_string())
            }
        }
    }

    fn recognize(&self, page: &PageImage, cancel: &CancellationToken) -> PageOutcome {
        let ensemble = OcrEnsemble::new(self.engine, &self.config.ocr_language)
            .with_parallel_strategies(self.config.parallel_strategies);
        match ensemble.recognize_page(page, cancel) {
            Ok(best) => PageOutcome::Recognized {
                text: best.text,
                strategy: best.strategy.to_string(),
                score: best.score,
            },
            Err(ExtractionError::Cancelled) => PageOutcome::Cancelled,
            Err(e) => {
                warn!(page = page.page_number, error = %e, "Page OCR failed, skipping page");
                PageOutcome::Skipped(e.to_string())
            }
        }
    }
}

fn report_page(progress: Progress<'_>, index: usize, outcome: &PageOutcome) {
    match outcome {
        PageOutcome::Recognized { strategy, score, .. } => emit(
            progress,
            ExtractionEvent::PageCompleted {
                page: index + 1,
                strategy: strategy.clone(),
                score: *score,
            },
        ),
        PageOutcome::Skipped(reason) => emit(
            progress,
            ExtractionEvent::PageSkipped {
                page: index + 1,
                reason: reason.clone(),
            },
        ),
        PageOutcome::Cancelled => {}
    }
}

/// Join page outcomes in order. Any missing or cancelled page turns the
/// whole document into a cancellation.
fn assemble(
    outcomes: Vec<PageOutcome>,
    planned: usize,
    mut warnings: Vec<ExtractionWarning>,
    progress: Progress<'_>,
) -> RouteOutcome {
    let interrupted = outcomes.len() < planned
        || outcomes.iter().any(|o| matches!(o, PageOutcome::Cancelled));
    if interrupted {
        let pages_completed = outcomes
            .iter()
            .filter(|o| !matches!(o, PageOutcome::Cancelled))
            .count();
        info!(pages_completed, pages_planned = planned, "Extraction cancelled");
        emit(
            progress,
            ExtractionEvent::Cancelled {
                pages_completed,
                pages_planned: planned,
            },
        );
        return RouteOutcome::Cancelled {
            pages_completed,
            pages_planned: planned,
        };
    }

    let mut texts = Vec::with_capacity(outcomes.len());
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            PageOutcome::Recognized { text, .. } => texts.push(text),
            PageOutcome::Skipped(reason) => {
                warnings.push(ExtractionWarning::PageSkipped {
                    page: index + 1,
                    reason,
                });
                texts.push(String::new());
            }
            PageOutcome::Cancelled => texts.push(String::new()),
        }
    }

    RouteOutcome::Complete(RoutedText {
        text: texts.join("\n"),
        used_ocr: true,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ocr::{result_from_text, MockOcrEngine, ScriptedOcrEngine};
    use crate::pipeline::extraction::pdfium::{MockPdfPageRenderer, MockTextLayer};
    use crate::pipeline::extraction::preprocess::encode_png;
    use crate::pipeline::extraction::types::MediaType;
    use image::{Rgb, RgbImage};
    use std::cell::RefCell;
    use std::time::Duration;

    const DECISION_PAGE: &str = "Rating Decision. Service Connected: PTSD 50% effective March 3, 2021. \
        The evidence of record supports the evaluation assigned.";

    fn pdf() -> SourceDocument {
        SourceDocument {
            bytes: b"%PDF-1.7 mock".to_vec(),
            media_type: MediaType::Pdf,
        }
    }

    fn page_text_engine() -> ScriptedOcrEngine {
        ScriptedOcrEngine::new(|page, _| Ok(result_from_text(&format!("page{}text", page.page_number), 90.0)))
    }

    fn complete(outcome: RouteOutcome) -> RoutedText {
        match outcome {
            RouteOutcome::Complete(routed) => routed,
            other => panic!("expected complete outcome, got {other:?}"),
        }
    }

    // ── Meaningful-text predicate ──

    #[test]
    fn decision_text_is_meaningful() {
        assert!(DECISION_PAGE.len() > MEANINGFUL_MIN_CHARS);
        assert!(is_meaningful_text(DECISION_PAGE));
    }

    #[test]
    fn short_text_is_not_meaningful() {
        assert!(!is_meaningful_text("Combined rating 70%"));
    }

    #[test]
    fn long_text_without_signals_is_not_meaningful() {
        let text = "lorem ipsum dolor sit amet ".repeat(10);
        assert!(!is_meaningful_text(&text));
    }

    #[test]
    fn whitespace_does_not_count_toward_length() {
        let text = format!("{}70%", " ".repeat(200));
        assert!(!is_meaningful_text(&text));
    }

    #[test]
    fn structural_signals() {
        assert!(has_structural_signals("evaluated at 10%"));
        assert!(has_structural_signals("SERVICE CONNECTED"));
        assert!(has_structural_signals("Disability compensation"));
        assert!(has_structural_signals("Rating Decision"));
        assert!(!has_structural_signals("percent without the sign"));
    }

    // ── PDF routing ──

    #[test]
    fn meaningful_text_layer_skips_ocr() {
        let layer = MockTextLayer::new(&[DECISION_PAGE, "Page two"]);
        let renderer = MockPdfPageRenderer::new(2);
        let engine = MockOcrEngine::new("should not be used", 90.0);
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());

        assert!(!routed.used_ocr);
        assert_eq!(routed.text, format!("{DECISION_PAGE}\nPage two"));
        assert!(routed.warnings.is_empty());
        assert_eq!(engine.call_count(), 0);
        assert_eq!(renderer.render_count(), 0);
    }

    #[test]
    fn thin_text_layer_falls_back_to_ocr_in_page_order() {
        let layer = MockTextLayer::new(&["", "  ", ""]);
        let renderer = MockPdfPageRenderer::new(3);
        let engine = page_text_engine();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());

        assert!(routed.used_ocr);
        assert_eq!(routed.text, "page1text\npage2text\npage3text");
        assert_eq!(renderer.render_count(), 3);
        assert_eq!(engine.seen_params().len(), 15);
    }

    #[test]
    fn text_layer_failure_falls_back_to_ocr() {
        let layer = MockTextLayer::failing();
        let renderer = MockPdfPageRenderer::new(1);
        let engine = page_text_engine();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());
        assert!(routed.used_ocr);
        assert_eq!(routed.text, "page1text");
    }

    #[test]
    fn unreadable_pdf_is_fatal() {
        let layer = MockTextLayer::failing();
        let renderer = MockPdfPageRenderer::unreadable();
        let engine = MockOcrEngine::new("x", 90.0);
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let err = router
            .route(&pdf(), &CancellationToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::DocumentUnreadable(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn page_cap_limits_ocr_and_warns() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(14);
        let engine = page_text_engine();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());

        assert_eq!(renderer.render_count(), 10);
        assert_eq!(routed.text.lines().count(), 10);
        assert!(routed.text.ends_with("page10text"));
        assert_eq!(
            routed.warnings,
            vec![ExtractionWarning::PagesNotScanned {
                scanned: 10,
                total: 14
            }]
        );
    }

    #[test]
    fn failed_render_skips_page_with_warning() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(3).with_failing_pages(&[1]);
        let engine = page_text_engine();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());

        assert_eq!(routed.text, "page1text\n\npage3text");
        assert_eq!(routed.warnings.len(), 1);
        assert!(matches!(
            routed.warnings[0],
            ExtractionWarning::PageSkipped { page: 2, .. }
        ));
    }

    #[test]
    fn engine_failure_on_every_page_still_completes() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(2);
        let engine = MockOcrEngine::failing();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());

        assert_eq!(routed.text, "\n");
        assert_eq!(routed.warnings.len(), 2);
        assert_eq!(engine.call_count(), 10);
    }

    #[test]
    fn zero_page_pdf_completes_empty() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(0);
        let engine = MockOcrEngine::new("x", 90.0);
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());
        assert_eq!(routed.text, "");
        assert!(routed.warnings.is_empty());
        assert_eq!(engine.call_count(), 0);
    }

    // ── Parallel pages ──

    #[test]
    fn parallel_pages_merge_in_page_order() {
        // Later pages finish first.
        let engine = ScriptedOcrEngine::new(|page, _| {
            let delay = (4 - page.page_number.min(3)) as u64 * 15;
            std::thread::sleep(Duration::from_millis(delay));
            Ok(result_from_text(&format!("page{}text", page.page_number), 90.0))
        });
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(3);
        let config = PipelineConfig::default().with_page_workers(3);
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&pdf(), &CancellationToken::new(), None).unwrap());
        assert_eq!(routed.text, "page1text\npage2text\npage3text");
    }

    #[test]
    fn parallel_and_sequential_agree() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(5).with_failing_pages(&[3]);
        let engine = page_text_engine();

        let sequential = PipelineConfig::default();
        let parallel = PipelineConfig::default()
            .with_page_workers(4)
            .with_parallel_strategies(true);

        let a = complete(
            DocumentTextRouter::new(&layer, &renderer, &engine, &sequential)
                .route(&pdf(), &CancellationToken::new(), None)
                .unwrap(),
        );
        let b = complete(
            DocumentTextRouter::new(&layer, &renderer, &engine, &parallel)
                .route(&pdf(), &CancellationToken::new(), None)
                .unwrap(),
        );
        assert_eq!(a, b);
    }

    // ── Raster routing ──

    #[test]
    fn raster_goes_straight_to_ocr() {
        let png = encode_png(&RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]))).unwrap();
        let document = SourceDocument {
            bytes: png,
            media_type: MediaType::Png,
        };
        let layer = MockTextLayer::failing();
        let renderer = MockPdfPageRenderer::unreadable();
        let engine = MockOcrEngine::new("Combined rating 70%", 88.0);
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let routed = complete(router.route(&document, &CancellationToken::new(), None).unwrap());

        assert!(routed.used_ocr);
        assert_eq!(routed.text, "Combined rating 70%");
        assert_eq!(engine.call_count(), 5);
        assert_eq!(renderer.render_count(), 0);
    }

    #[test]
    fn corrupt_raster_is_unreadable() {
        let document = SourceDocument {
            bytes: b"\x89PNG\r\n\x1a\nnot really".to_vec(),
            media_type: MediaType::Png,
        };
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(0);
        let engine = MockOcrEngine::new("x", 90.0);
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let err = router
            .route(&document, &CancellationToken::new(), None)
            .unwrap_err();
        assert!(matches!(err, ExtractionError::DocumentUnreadable(_)));
    }

    // ── Cancellation ──

    #[test]
    fn cancelled_before_start_returns_no_text() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(3);
        let engine = page_text_engine();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = router.route(&pdf(), &token, None).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Cancelled {
                pages_completed: 0,
                pages_planned: 3
            }
        );
        assert_eq!(renderer.render_count(), 0);
    }

    #[test]
    fn cancel_mid_document_discards_partial_text() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let engine = ScriptedOcrEngine::new(move |page, _| {
            if page.page_number == 2 {
                trigger.cancel();
            }
            Ok(result_from_text("partial", 90.0))
        });
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(3);
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let outcome = router.route(&pdf(), &token, None).unwrap();
        assert_eq!(
            outcome,
            RouteOutcome::Cancelled {
                pages_completed: 1,
                pages_planned: 3
            }
        );
        assert_eq!(renderer.render_count(), 2);
    }

    #[test]
    fn cancelled_parallel_run_returns_no_text() {
        let layer = MockTextLayer::new(&[]);
        let renderer = MockPdfPageRenderer::new(4);
        let engine = page_text_engine();
        let config = PipelineConfig::default().with_page_workers(2);
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);
        let token = CancellationToken::new();
        token.cancel();

        let outcome = router.route(&pdf(), &token, None).unwrap();
        assert!(matches!(outcome, RouteOutcome::Cancelled { pages_planned: 4, .. }));
    }

    // ── Progress ──

    #[test]
    fn progress_events_in_order() {
        let layer = MockTextLayer::new(&["scan"]);
        let renderer = MockPdfPageRenderer::new(2).with_failing_pages(&[1]);
        let engine = page_text_engine();
        let config = PipelineConfig::default();
        let router = DocumentTextRouter::new(&layer, &renderer, &engine, &config);

        let events = RefCell::new(Vec::new());
        let record: &dyn Fn(ExtractionEvent) = &|event| events.borrow_mut().push(event);
        router
            .route(&pdf(), &CancellationToken::new(), Some(record))
            .unwrap();

        let events = events.into_inner();
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[0],
            ExtractionEvent::TextLayerChecked {
                meaningful: false,
                chars: 4
            }
        );
        assert_eq!(
            events[1],
            ExtractionEvent::OcrStarted {
                pages_planned: 2,
                pages_total: 2
            }
        );
        assert!(matches!(
            &events[2],
            ExtractionEvent::PageCompleted { page: 1, strategy, .. } if strategy == "high-contrast/psm6"
        ));
        assert!(matches!(events[3], ExtractionEvent::PageSkipped { page: 2, .. }));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(ExtractionEvent::OcrStarted {
            pages_planned: 10,
            pages_total: 14,
        })
        .unwrap();
        assert_eq!(json["type"], "OcrStarted");
        assert_eq!(json["pages_planned"], 10);
    }
}
