//! Source file → extracted text → [`DocumentRecord`].

use crate::{tree, DocumentRecord, Error, Pipeline, Result, SourceDocument, TextExtractor};
use serde::Serialize;

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tif", "tiff",
];
const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md"];

/// Pick a pipeline from the mimetype, falling back to the filename extension.
pub fn detect(original_name: &str, mimetype: Option<&str>) -> Result<Pipeline> {
    if let Some(ct) = mimetype.map(|s| s.trim().to_ascii_lowercase()) {
        if ct == "application/pdf" {
            return Ok(Pipeline::PdfText);
        }
        if ct.starts_with("image/") {
            return Ok(Pipeline::Ocr);
        }
        if ct.starts_with("text/plain") {
            return Ok(Pipeline::PlainText);
        }
        if !ct.is_empty() && ct != "application/octet-stream" {
            return Err(Error::NotSupported(format!("mimetype {ct}")));
        }
    }

    let ext = std::path::Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext == "pdf" {
        Ok(Pipeline::PdfText)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Pipeline::Ocr)
    } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
        Ok(Pipeline::PlainText)
    } else {
        Err(Error::NotSupported(format!("file type of {original_name}")))
    }
}

/// A record plus what the extractor reported along the way.
#[derive(Debug, Clone, Serialize)]
pub struct Processed {
    pub record: DocumentRecord,
    pub page_count: Option<usize>,
    pub warnings: Vec<&'static str>,
}

/// Extract text and build its tree, titled with the original filename.
pub fn process(
    extractor: &dyn TextExtractor,
    source: &SourceDocument,
    uploaded_at_epoch_s: u64,
) -> Result<Processed> {
    if source.original_name.trim().is_empty() {
        return Err(Error::InvalidInput("original name is empty".to_string()));
    }
    let extraction = extractor.extract(source)?;
    tracing::debug!(
        name = %source.original_name,
        extractor = extractor.name(),
        pipeline = extraction.pipeline.as_str(),
        chars = extraction.text.chars().count(),
        "extracted text"
    );
    let structure = tree::build_titled(&extraction.text, &source.original_name);
    let record = DocumentRecord {
        original_name: source.original_name.clone(),
        mimetype: source.mimetype.clone(),
        pipeline: extraction.pipeline,
        extracted_text: extraction.text,
        structure,
        uploaded_at_epoch_s,
    };
    Ok(Processed {
        record,
        page_count: extraction.page_count,
        warnings: extraction.warnings,
    })
}
