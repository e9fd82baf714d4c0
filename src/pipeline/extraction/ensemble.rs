//! Race-and-select OCR over a fixed catalogue of strategies.
//!
//! Each page is recognized once per catalogue entry and the single best
//! transcript wins whole. Transcripts are never merged: a recognized line is
//! right or wrong as a unit, so mixing characters across strategies corrupts
//! lines that one strategy got right.

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

use super::preprocess::{apply_strategy, PreprocessingStrategy};
use super::types::{CancellationToken, OcrEngine, OcrParams, PageImage, PageSegMode};
use super::ExtractionError;

/// One catalogue entry: how to preprocess, then how to segment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct StrategyCombo {
    pub preprocessing: PreprocessingStrategy,
    pub page_seg_mode: PageSegMode,
}

impl std::fmt::Display for StrategyCombo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/psm{}",
            self.preprocessing.name(),
            self.page_seg_mode.tesseract_value()
        )
    }
}

/// Fixed strategy order. Ties in score go to the earlier entry.
pub const STRATEGY_CATALOGUE: [StrategyCombo; 5] = [
    StrategyCombo {
        preprocessing: PreprocessingStrategy::HighContrast,
        page_seg_mode: PageSegMode::SingleBlock,
    },
    StrategyCombo {
        preprocessing: PreprocessingStrategy::Adaptive,
        page_seg_mode: PageSegMode::SingleBlock,
    },
    StrategyCombo {
        preprocessing: PreprocessingStrategy::Denoise,
        page_seg_mode: PageSegMode::Auto,
    },
    StrategyCombo {
        preprocessing: PreprocessingStrategy::HighContrast,
        page_seg_mode: PageSegMode::SparseText,
    },
    StrategyCombo {
        preprocessing: PreprocessingStrategy::Adaptive,
        page_seg_mode: PageSegMode::SingleColumn,
    },
];

/// Tokens must be longer than this to count as words in the score.
const REAL_WORD_MIN_CHARS: usize = 2;
const CHAR_DIVISOR: f64 = 100.0;
const WORD_DIVISOR: f64 = 10.0;

/// One strategy's transcript of one page, with its quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrCandidate {
    /// Position in `STRATEGY_CATALOGUE`.
    pub strategy_index: usize,
    pub strategy: StrategyCombo,
    pub text: String,
    /// Engine confidence, 0-100.
    pub confidence: f32,
    pub char_len: usize,
    pub word_count: usize,
    pub score: f64,
}

impl OcrCandidate {
    pub fn new(strategy_index: usize, strategy: StrategyCombo, text: String, confidence: f32) -> Self {
        let char_len = text.chars().count();
        let word_count = count_real_words(&text);
        let score = score_candidate(confidence, char_len, word_count);
        Self {
            strategy_index,
            strategy,
            text,
            confidence,
            char_len,
            word_count,
            score,
        }
    }
}

/// Whitespace-separated tokens longer than two characters.
pub fn count_real_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|t| t.chars().count() > REAL_WORD_MIN_CHARS)
        .count()
}

/// `confidence × (chars / 100) × (words / 10)`.
///
/// Penalizes both near-empty confident output (the engine gave up) and long
/// low-confidence noise. Non-finite inputs score zero.
pub fn score_candidate(confidence: f32, char_len: usize, word_count: usize) -> f64 {
    let score =
        confidence as f64 * (char_len as f64 / CHAR_DIVISOR) * (word_count as f64 / WORD_DIVISOR);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Highest score wins; equal scores go to the lower catalogue index,
/// whatever order the candidates arrive in.
pub fn select_best(candidates: &[OcrCandidate]) -> Option<&OcrCandidate> {
    let mut best: Option<&OcrCandidate> = None;
    for candidate in candidates {
        best = match best {
            None => Some(candidate),
            Some(current)
                if candidate.score > current.score
                    || (candidate.score == current.score
                        && candidate.strategy_index < current.strategy_index) =>
            {
                Some(candidate)
            }
            keep => keep,
        };
    }
    best
}

/// Runs the strategy catalogue against one engine.
pub struct OcrEnsemble<'e> {
    engine: &'e dyn OcrEngine,
    language: String,
    parallel_strategies: bool,
}

impl<'e> OcrEnsemble<'e> {
    pub fn new(engine: &'e dyn OcrEngine, language: &str) -> Self {
        Self {
            engine,
            language: language.to_string(),
            parallel_strategies: false,
        }
    }

    /// Evaluate strategies on scoped threads. Selection is unchanged.
    pub fn with_parallel_strategies(mut self, parallel: bool) -> Self {
        self.parallel_strategies = parallel;
        self
    }

    /// Recognize a page with every catalogue strategy and return the winner.
    ///
    /// Failed strategies are dropped from the candidate set. If none succeed
    /// the page fails with `OcrEngineFailure`. Cancellation is checked before
    /// each strategy.
    pub fn recognize_page(
        &self,
        page: &PageImage,
        cancel: &CancellationToken,
    ) -> Result<OcrCandidate, ExtractionError> {
        let outcomes = if self.parallel_strategies {
            self.run_parallel(page, cancel)
        } else {
            self.run_sequential(page, cancel)
        };

        if cancel.is_cancelled() {
            return Err(ExtractionError::Cancelled);
        }

        let mut candidates = Vec::with_capacity(outcomes.len());
        let mut last_error = None;
        for (index, outcome) in outcomes {
            match outcome {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    warn!(
                        page = page.page_number,
                        strategy = %STRATEGY_CATALOGUE[index],
                        error = %e,
                        "OCR strategy failed, dropping candidate"
                    );
                    last_error = Some(e);
                }
            }
        }

        let best = select_best(&candidates).cloned().ok_or_else(|| {
            ExtractionError::OcrEngineFailure(format!(
                "all {} strategies failed on page {}: {}",
                STRATEGY_CATALOGUE.len(),
                page.page_number,
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ))
        })?;

        debug!(
            page = page.page_number,
            strategy = %best.strategy,
            score = best.score,
            candidates = candidates.len(),
            "OCR strategy selected"
        );

        Ok(best)
    }

    fn run_sequential(
        &self,
        page: &PageImage,
        cancel: &CancellationToken,
    ) -> Vec<(usize, Result<OcrCandidate, ExtractionError>)> {
        let mut outcomes = Vec::with_capacity(STRATEGY_CATALOGUE.len());
        for (index, combo) in STRATEGY_CATALOGUE.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            outcomes.push((index, self.run_strategy(index, *combo, page)));
        }
        outcomes
    }

    fn run_parallel(
        &self,
        page: &PageImage,
        cancel: &CancellationToken,
    ) -> Vec<(usize, Result<OcrCandidate, ExtractionError>)> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = STRATEGY_CATALOGUE
                .iter()
                .enumerate()
                .map(|(index, combo)| {
                    let combo = *combo;
                    scope.spawn(move || {
                        if cancel.is_cancelled() {
                            return Err(ExtractionError::Cancelled);
                        }
                        self.run_strategy(index, combo, page)
                    })
                })
                .collect();

            handles
                .into_iter()
                .enumerate()
                .map(|(index, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        Err(ExtractionError::OcrEngineFailure(
                            "strategy worker panicked".into(),
                        ))
                    });
                    (index, outcome)
                })
                .collect()
        })
    }

    fn run_strategy(
        &self,
        index: usize,
        combo: StrategyCombo,
        page: &PageImage,
    ) -> Result<OcrCandidate, ExtractionError> {
        let span = info_span!(
            "ocr_strategy",
            page = page.page_number,
            strategy = %combo,
        );
        let _guard = span.enter();

        let prepared = apply_strategy(page, combo.preprocessing);
        let params = OcrParams::for_strategy(combo.page_seg_mode, &self.language);
        let result = self.engine.recognize(&prepared, &params)?;
        let candidate = OcrCandidate::new(index, combo, result.text, result.confidence);

        debug!(
            score = candidate.score,
            confidence = candidate.confidence,
            chars = candidate.char_len,
            words = candidate.word_count,
            "Strategy scored"
        );
        Ok(candidate)
    }
}
