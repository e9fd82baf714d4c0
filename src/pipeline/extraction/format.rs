use std::path::Path;

use super::types::{MediaType, SourceDocument};
use super::ExtractionError;

/// Detect a supported media type from magic bytes (NOT the declared type).
pub fn sniff_media_type(bytes: &[u8]) -> Option<MediaType> {
    match bytes {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => Some(MediaType::Pdf),
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(MediaType::Jpeg),
        // PNG: starts with 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(MediaType::Png),
        _ => None,
    }
}

/// Admit an upload into the pipeline.
///
/// Size is checked first so an oversized file is rejected without touching its
/// contents. The declared type must be one we handle, and the bytes must agree
/// with it. When nothing is declared the magic bytes decide.
pub fn admit_document(
    bytes: Vec<u8>,
    declared_mime: Option<&str>,
    max_bytes: u64,
) -> Result<SourceDocument, ExtractionError> {
    let size = bytes.len() as u64;
    if size > max_bytes {
        return Err(ExtractionError::FileTooLarge {
            size_bytes: size,
            limit_bytes: max_bytes,
        });
    }

    let declared = match declared_mime {
        Some(mime) => Some(
            MediaType::from_mime(mime)
                .ok_or_else(|| ExtractionError::UnsupportedFormat(mime.to_string()))?,
        ),
        None => None,
    };

    let sniffed = sniff_media_type(&bytes);

    let media_type = match (declared, sniffed) {
        (Some(d), Some(s)) if d == s => d,
        (Some(d), Some(s)) => {
            return Err(ExtractionError::DocumentUnreadable(format!(
                "declared as {d} but content is {s}"
            )));
        }
        (Some(d), None) => {
            return Err(ExtractionError::DocumentUnreadable(format!(
                "content is not a valid {d} file"
            )));
        }
        (None, Some(s)) => s,
        (None, None) => {
            return Err(ExtractionError::DocumentUnreadable(
                "content is not a PDF, JPEG or PNG file".into(),
            ));
        }
    };

    Ok(SourceDocument { bytes, media_type })
}

/// Read and admit a document from disk. The size limit is enforced from file
/// metadata before any bytes are read.
pub fn read_document(
    path: &Path,
    declared_mime: Option<&str>,
    max_bytes: u64,
) -> Result<SourceDocument, ExtractionError> {
    let file_size = std::fs::metadata(path)?.len();
    if file_size > max_bytes {
        return Err(ExtractionError::FileTooLarge {
            size_bytes: file_size,
            limit_bytes: max_bytes,
        });
    }
    let bytes = std::fs::read(path)?;
    admit_document(bytes, declared_mime, max_bytes)
}
