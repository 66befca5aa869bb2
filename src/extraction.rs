//! Turning uploaded bytes into raw text.
//!
//! Extraction backends are pluggable through [`TextExtractor`]. [`DocumentExtractor`] is the
//! default: it routes `.pdf` uploads to [`PdfTextExtractor`] (the embedded text layer, read with
//! `pdf-extract`), refuses raster images, and decodes everything else as UTF-8 with
//! [`PlainTextExtractor`]. Scanned PDFs without a text layer and image uploads need an OCR
//! backend, which plugs in through the same trait.

use crate::processing::PipelineError;
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Produces raw text for an uploaded file.
pub trait TextExtractor: Send + Sync {
    /// Extract text from `bytes`; `filename` is the client-supplied name.
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, PipelineError>;
}

/// Upload formats distinguished by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadFormat {
    Pdf,
    Image,
    Text,
}

impl UploadFormat {
    fn from_filename(filename: &str) -> Self {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("pdf") => Self::Pdf,
            Some("png" | "jpg" | "jpeg") => Self::Image,
            _ => Self::Text,
        }
    }
}

/// Default extractor dispatching on the upload's extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor {
    pdf: PdfTextExtractor,
    text: PlainTextExtractor,
}

impl TextExtractor for DocumentExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, PipelineError> {
        let format = UploadFormat::from_filename(filename);
        tracing::debug!(filename, ?format, bytes = bytes.len(), "Extracting upload");
        match format {
            UploadFormat::Pdf => self.pdf.extract(bytes, filename),
            UploadFormat::Image => Err(PipelineError::Extraction(format!(
                "'{filename}' is an image and requires an OCR backend, none is configured"
            ))),
            UploadFormat::Text => self.text.extract(bytes, filename),
        }
    }
}

/// UTF-8 decoder for plain-text uploads.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, PipelineError> {
        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        String::from_utf8(bytes.to_vec()).map_err(|error| {
            PipelineError::Extraction(format!("Text decoding failed for '{filename}': {error}"))
        })
    }
}

/// Reads the embedded text layer of a PDF.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, PipelineError> {
        // pdf-extract panics on some malformed inputs instead of returning an error.
        let text = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
            .map_err(|_| {
                PipelineError::Extraction(format!("PDF parser aborted on '{filename}'"))
            })?
            .map_err(|error| {
                PipelineError::Extraction(format!("Failed to read PDF '{filename}': {error}"))
            })?;

        if text.trim().is_empty() {
            return Err(PipelineError::Extraction(format!(
                "'{filename}' has no text layer and requires an OCR backend, none is configured"
            )));
        }
        tracing::debug!(filename, chars = text.chars().count(), "Read PDF text layer");
        Ok(text)
    }
}
