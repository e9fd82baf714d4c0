use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tempfile::TempDir;

use super::preprocess::encode_png;
use super::types::{BoundingBox, OcrEngine, OcrPageResult, OcrParams, OcrWordResult, PageImage};
use super::ExtractionError;

/// Where to find the Tesseract binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TesseractConfig {
    pub command: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            command: "tesseract".to_string(),
        }
    }
}

impl TesseractConfig {
    /// Defaults overridden by `TESSERACT_CMD`.
    pub fn from_env() -> Self {
        match std::env::var("TESSERACT_CMD") {
            Ok(cmd) if !cmd.trim().is_empty() => Self {
                command: cmd.trim().to_string(),
            },
            _ => Self::default(),
        }
    }
}

/// Tesseract driven through its command-line interface.
///
/// Each call writes the page to a scratch PNG, passes the full `OcrParams` as
/// arguments and parses TSV output. Nothing is kept between calls.
pub struct TesseractCli {
    config: TesseractConfig,
}

impl TesseractCli {
    pub fn new(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn from_env() -> Self {
        Self::new(TesseractConfig::from_env())
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    fn run(&self, image_path: &Path, params: &OcrParams) -> Result<String, ExtractionError> {
        let output = Command::new(&self.config.command)
            .args(build_tesseract_args(image_path, params))
            .output();

        match output {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).to_string())
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(ExtractionError::OcrEngineFailure(format!(
                    "tesseract exited with {}: {}",
                    output.status,
                    stderr.trim()
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ExtractionError::OcrInit(
                format!("{} not found (install tesseract-ocr)", self.config.command),
            )),
            Err(e) => Err(ExtractionError::OcrEngineFailure(e.to_string())),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(
        &self,
        page: &PageImage,
        params: &OcrParams,
    ) -> Result<OcrPageResult, ExtractionError> {
        let start = Instant::now();

        let png = encode_png(&page.image)?;
        let scratch = TempDir::new()?;
        let image_path = scratch.path().join("page.png");
        std::fs::write(&image_path, png)?;

        let tsv = self.run(&image_path, params)?;
        let result = parse_tsv_page(&tsv);

        tracing::debug!(
            page = page.page_number,
            psm = params.page_seg_mode.tesseract_value(),
            words = result.word_confidences.len(),
            confidence = result.confidence,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Tesseract pass complete"
        );

        Ok(result)
    }
}

/// Full argument list for one invocation. Every parameter is passed explicitly.
pub fn build_tesseract_args(image_path: &Path, params: &OcrParams) -> Vec<String> {
    vec![
        image_path.display().to_string(),
        "stdout".to_string(),
        "-l".to_string(),
        params.language.clone(),
        "--psm".to_string(),
        params.page_seg_mode.tesseract_value().to_string(),
        "-c".to_string(),
        format!("tessedit_char_whitelist={}", params.char_whitelist),
        "-c".to_string(),
        format!(
            "preserve_interword_spaces={}",
            u8::from(params.preserve_interword_spaces)
        ),
        "-c".to_string(),
        format!("tessedit_do_invert={}", u8::from(params.invert_detection)),
        "tsv".to_string(),
    ]
}

/// Rebuild page text and mean confidence from Tesseract TSV output.
///
/// Words are grouped into lines by (block, paragraph, line) and lines are
/// joined with `\n`. Confidence is the mean over words with a non-negative
/// confidence, on the engine's 0-100 scale.
pub fn parse_tsv_page(tsv: &str) -> OcrPageResult {
    let mut lines: BTreeMap<(u32, u32, u32, u32), Vec<String>> = BTreeMap::new();
    let mut words = Vec::new();
    let mut conf_sum = 0.0f32;
    let mut conf_count = 0usize;

    for line in tsv.lines().skip(1) {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        // Level 5 = word
        if fields[0].trim() != "5" {
            continue;
        }
        let key = match (
            fields[1].parse::<u32>(),
            fields[2].parse::<u32>(),
            fields[3].parse::<u32>(),
            fields[4].parse::<u32>(),
        ) {
            (Ok(p), Ok(b), Ok(par), Ok(l)) => (p, b, par, l),
            _ => continue,
        };
        // Tesseract reports float confidences in TSV (e.g. "91.532")
        let conf: f32 = match fields[10].trim().parse() {
            Ok(c) => c,
            Err(_) => continue,
        };
        let word = fields[11].trim();
        if word.is_empty() {
            continue;
        }

        let confidence = conf.max(0.0);
        if conf >= 0.0 {
            conf_sum += conf;
            conf_count += 1;
        }

        lines.entry(key).or_default().push(word.to_string());
        words.push(OcrWordResult {
            text: word.to_string(),
            confidence,
            bounding_box: parse_bounding_box(fields[6], fields[7], fields[8], fields[9]),
        });
    }

    let text = lines
        .into_values()
        .map(|w| w.join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let confidence = if conf_count == 0 {
        0.0
    } else {
        conf_sum / conf_count as f32
    };

    OcrPageResult {
        text,
        confidence,
        word_confidences: words,
    }
}

/// Parse bounding box coordinates from TSV string fields.
/// Returns None if any field fails to parse.
fn parse_bounding_box(left: &str, top: &str, width: &str, height: &str) -> Option<BoundingBox> {
    Some(BoundingBox {
        x: left.parse().ok()?,
        y: top.parse().ok()?,
        width: width.parse().ok()?,
        height: height.parse().ok()?,
    })
}

// ═══════════════════════════════════════════════════════════
// Mock engines (testing)
// ═══════════════════════════════════════════════════════════

/// Mock OCR engine returning the same text for every call.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
    fail: bool,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("", 0.0)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(
        &self,
        _page: &PageImage,
        _params: &OcrParams,
    ) -> Result<OcrPageResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ExtractionError::OcrEngineFailure("Mock engine crash".into()));
        }
        Ok(result_from_text(&self.text, self.confidence))
    }
}

type Script = dyn Fn(&PageImage, &OcrParams) -> Result<OcrPageResult, ExtractionError> + Send + Sync;

/// Engine whose answer is computed from the page and parameters it receives.
/// Records every parameter set it was called with.
pub struct ScriptedOcrEngine {
    script: Box<Script>,
    seen: Mutex<Vec<OcrParams>>,
}

impl ScriptedOcrEngine {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&PageImage, &OcrParams) -> Result<OcrPageResult, ExtractionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            script: Box::new(script),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn seen_params(&self) -> Vec<OcrParams> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn recognize(
        &self,
        page: &PageImage,
        params: &OcrParams,
    ) -> Result<OcrPageResult, ExtractionError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(params.clone());
        }
        (self.script)(page, params)
    }
}

/// Build an engine result from plain text with a uniform confidence.
pub fn result_from_text(text: &str, confidence: f32) -> OcrPageResult {
    let word_confidences = text
        .split_whitespace()
        .map(|w| OcrWordResult {
            text: w.to_string(),
            confidence,
            bounding_box: None,
        })
        .collect();
    OcrPageResult {
        text: text.to_string(),
        confidence,
        word_confidences,
    }
}
