//! Image preprocessing for OCR.
//!
//! Every strategy reduces a page to a bilevel (pure black/white) raster before
//! recognition. Printed-form text recognizes measurably better on bilevel input
//! than on greyscale or colour.
//!
//! All transforms take `&PageImage` and return a new page; the caller's raster
//! is never touched.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageOutputFormat, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::PageImage;
use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Tuned constants
// ═══════════════════════════════════════════════════════════

/// Contrast factor for the high-contrast strategy.
pub const HIGH_CONTRAST_FACTOR: f32 = 2.5;
/// Luminance above which a stretched high-contrast pixel is white.
pub const HIGH_CONTRAST_THRESHOLD: f32 = 140.0;

/// Half-width of the adaptive threshold neighbourhood (window is 31x31).
pub const ADAPTIVE_HALF_WINDOW: u32 = 15;
/// Bias subtracted from the local mean before comparison.
pub const ADAPTIVE_BIAS: f64 = 10.0;

/// Contrast factor applied after the median filter.
pub const DENOISE_CONTRAST_FACTOR: f32 = 1.8;
/// Luminance above which a denoised pixel is white.
pub const DENOISE_THRESHOLD: f32 = 135.0;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

// ═══════════════════════════════════════════════════════════
// Strategy
// ═══════════════════════════════════════════════════════════

/// Named preprocessing strategies used by the OCR catalogue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum PreprocessingStrategy {
    /// Global contrast stretch then fixed threshold.
    HighContrast,
    /// Local-mean threshold, robust to uneven scan lighting.
    Adaptive,
    /// Median filter for speckle, then a milder stretch and threshold.
    Denoise,
}

impl PreprocessingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HighContrast => "high-contrast",
            Self::Adaptive => "adaptive",
            Self::Denoise => "denoise",
        }
    }
}

impl std::fmt::Display for PreprocessingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Apply a preprocessing strategy to a copy of `page`.
pub fn apply_strategy(page: &PageImage, strategy: PreprocessingStrategy) -> PageImage {
    let gray = rgb_to_gray(&page.image);
    let binary = match strategy {
        PreprocessingStrategy::HighContrast => {
            stretch_and_threshold(&gray, HIGH_CONTRAST_FACTOR, HIGH_CONTRAST_THRESHOLD)
        }
        PreprocessingStrategy::Adaptive => adaptive_threshold(&gray),
        PreprocessingStrategy::Denoise => {
            let filtered = median_filter_3x3(&gray);
            stretch_and_threshold(&filtered, DENOISE_CONTRAST_FACTOR, DENOISE_THRESHOLD)
        }
    };

    debug!(
        page = page.page_number,
        strategy = strategy.name(),
        width = binary.width(),
        height = binary.height(),
        "Page preprocessed"
    );

    PageImage::new(page.page_number, binary)
}

// ═══════════════════════════════════════════════════════════
// Pixel operations
// ═══════════════════════════════════════════════════════════

/// ITU-R BT.601 luminance of one RGB pixel, rounded so pure white stays 255.
pub fn luminance(p: &Rgb<u8>) -> u8 {
    let l = 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32;
    l.round().clamp(0.0, 255.0) as u8
}

/// Convert RGB image to grayscale using ITU-R BT.601 luminance.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let mut gray = GrayImage::new(w, h);
    for (x, y, p) in rgb.enumerate_pixels() {
        gray.put_pixel(x, y, Luma([luminance(p)]));
    }
    gray
}

/// Contrast stretch around mid-grey: `(v - 128) * factor + 128`, clamped.
pub fn contrast_stretch(value: u8, factor: f32) -> f32 {
    ((value as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0)
}

fn stretch_and_threshold(gray: &GrayImage, factor: f32, threshold: f32) -> RgbImage {
    let (w, h) = gray.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, p) in gray.enumerate_pixels() {
        let v = contrast_stretch(p.0[0], factor);
        out.put_pixel(x, y, if v > threshold { WHITE } else { BLACK });
    }
    out
}

/// Local-mean threshold over a (2·15+1)² window clipped to the image.
///
/// Window sums come from an integral image, so cost is O(pixels) regardless
/// of window size.
pub fn adaptive_threshold(gray: &GrayImage) -> RgbImage {
    let (w, h) = gray.dimensions();
    let mut out = RgbImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let integral = integral_image(gray);
    let stride = w as usize + 1;
    let r = ADAPTIVE_HALF_WINDOW;

    for y in 0..h {
        let y0 = y.saturating_sub(r) as usize;
        let y1 = (y + r + 1).min(h) as usize;
        for x in 0..w {
            let x0 = x.saturating_sub(r) as usize;
            let x1 = (x + r + 1).min(w) as usize;

            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((x1 - x0) * (y1 - y0)) as f64;
            let mean = sum as f64 / count;

            let lum = gray.get_pixel(x, y).0[0] as f64;
            out.put_pixel(x, y, if lum < mean - ADAPTIVE_BIAS { BLACK } else { WHITE });
        }
    }
    out
}

/// Summed-area table with a zero row and column, `(w+1) x (h+1)`.
fn integral_image(gray: &GrayImage) -> Vec<u64> {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let stride = w + 1;
    let mut table = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += gray.get_pixel(x as u32, y as u32).0[0] as u64;
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row_sum;
        }
    }
    table
}

/// 3x3 median with edge replication.
pub fn median_filter_3x3(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let mut window = [0u8; 9];
    for y in 0..h {
        for x in 0..w {
            let mut i = 0;
            for dy in [-1i64, 0, 1] {
                let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                for dx in [-1i64, 0, 1] {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    window[i] = gray.get_pixel(sx, sy).0[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// True when every pixel is pure black or pure white.
pub fn is_bilevel(img: &RgbImage) -> bool {
    img.pixels().all(|p| *p == WHITE || *p == BLACK)
}

// ═══════════════════════════════════════════════════════════
// Raster input
// ═══════════════════════════════════════════════════════════

/// Dimensions after scaling by `scale`, capped so the longest edge does not
/// exceed `max_dimension`. Aspect ratio is preserved; never returns zero.
pub fn compute_scaled_dimensions(
    width: u32,
    height: u32,
    scale: f32,
    max_dimension: u32,
) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let longest = width.max(height) as f32;
    let factor = scale.min(max_dimension as f32 / longest);
    let w = ((width as f32 * factor).round() as u32).clamp(1, max_dimension.max(1));
    let h = ((height as f32 * factor).round() as u32).clamp(1, max_dimension.max(1));
    (w, h)
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform to a `DynamicImage`.
///
/// 1 = normal, 2 = mirrored, 3 = 180°, 4 = flipped vertically,
/// 5 = mirrored + 90° CW, 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Decode an uploaded JPEG/PNG into page 1.
///
/// Orientation is corrected from EXIF, then the image is upscaled by `scale`
/// under the `max_dimension` cap. Images already at or above the cap are
/// left at their native size.
pub fn decode_raster(
    bytes: &[u8],
    scale: f32,
    max_dimension: u32,
) -> Result<PageImage, ExtractionError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ExtractionError::DocumentUnreadable(format!("Failed to decode image: {e}")))?;

    let orientation = read_exif_orientation(bytes);
    let rgb = apply_orientation(img, orientation).to_rgb8();
    let (w, h) = rgb.dimensions();

    let (target_w, target_h) = compute_scaled_dimensions(w, h, scale, max_dimension);
    let rgb = if target_w > w && target_h > h {
        debug!(
            from = format!("{w}x{h}"),
            to = format!("{target_w}x{target_h}"),
            orientation,
            "Upscaling raster input"
        );
        image::imageops::resize(&rgb, target_w, target_h, FilterType::CatmullRom)
    } else {
        rgb
    };

    Ok(PageImage::new(1, rgb))
}

/// Encode an RGB image as PNG bytes.
/// Uses default compression (fast); images are transient, not archived.
pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
    let dynamic = DynamicImage::ImageRgb8(img.clone());
    let mut cursor = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}
