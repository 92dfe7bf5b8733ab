use pagetree_core::{
    pipeline, tree, DocumentRecord, Error, Extraction, Pipeline, Result, SourceDocument,
    TextExtractor, TreeStore,
};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod extract;
pub mod shellout;

pub use shellout::OcrConfig;

const STORE_SCHEMA_VERSION: u64 = 1;

/// Filesystem [`TreeStore`]: one JSON file per original filename.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn key_for_name(original_name: &str) -> String {
        // Names can hold anything (spaces, slashes, unicode); hash them into a
        // fixed-width, filesystem-safe key.
        let mut h = Sha256::new();
        h.update(b"original_name:");
        h.update(original_name.as_bytes());
        hex::encode(h.finalize())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root
            .join(&key[0..2])
            .join(&key[2..4])
            .join(format!("{key}.json"))
    }

    pub fn path_for_name(&self, original_name: &str) -> PathBuf {
        self.path(&Self::key_for_name(original_name))
    }
}

impl TreeStore for FsStore {
    fn put(&self, record: &DocumentRecord) -> Result<()> {
        let p = self.path_for_name(&record.original_name);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Store(e.to_string()))?;
        }
        let now_s = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs();
        let doc = serde_json::json!({
            "schema_version": STORE_SCHEMA_VERSION,
            "stored_at_epoch_s": now_s,
            "record": record,
        });
        let bytes = serde_json::to_vec(&doc).map_err(|e| Error::Store(e.to_string()))?;

        // Write-then-rename so readers never see a half-written record.
        let tmp = p.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| Error::Store(e.to_string()))?;
        fs::rename(&tmp, &p).map_err(|e| Error::Store(e.to_string()))?;
        tracing::debug!(name = %record.original_name, path = %p.display(), "stored record");
        Ok(())
    }

    fn get(&self, original_name: &str) -> Result<Option<DocumentRecord>> {
        let p = self.path_for_name(original_name);
        if !p.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&p).map_err(|e| Error::Store(e.to_string()))?;
        let mut doc: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|e| Error::Store(e.to_string()))?;
        let version = doc.get("schema_version").and_then(|v| v.as_u64());
        if version != Some(STORE_SCHEMA_VERSION) {
            return Err(Error::Store(format!(
                "unsupported schema_version {version:?} in {}",
                p.display()
            )));
        }
        let record = doc
            .get_mut("record")
            .map(serde_json::Value::take)
            .ok_or_else(|| Error::Store(format!("missing record in {}", p.display())))?;
        let record: DocumentRecord =
            serde_json::from_value(record).map_err(|e| Error::Store(e.to_string()))?;
        Ok(Some(record))
    }
}

/// [`TextExtractor`] backed by `pdf-extract` (PDF text layers), the local
/// `tesseract` binary (images) and plain UTF-8 decoding (text).
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalExtractor {
    ocr: OcrConfig,
}

impl LocalExtractor {
    /// OCR settings from `PAGETREE_OCR*`.
    pub fn from_env() -> Self {
        Self::with_ocr(OcrConfig::from_env())
    }

    pub fn with_ocr(ocr: OcrConfig) -> Self {
        Self { ocr }
    }

    fn resolve_pipeline(doc: &SourceDocument) -> Result<Pipeline> {
        match pipeline::detect(&doc.original_name, doc.mimetype.as_deref()) {
            Ok(p) => Ok(p),
            // Unhelpful names/mimetypes: trust magic bytes when they are clear.
            Err(e) => extract::sniff_pipeline(&doc.bytes).ok_or(e),
        }
    }
}

impl TextExtractor for LocalExtractor {
    fn name(&self) -> &'static str {
        "local"
    }

    fn extract(&self, doc: &SourceDocument) -> Result<Extraction> {
        let pipeline = Self::resolve_pipeline(doc)?;
        match pipeline {
            Pipeline::PdfText => {
                let pt = extract::pdf_to_marked_text(&doc.bytes).map_err(Error::Extract)?;
                Ok(Extraction {
                    pipeline,
                    text: pt.text,
                    page_count: Some(pt.pages),
                    warnings: pt.warnings,
                })
            }
            Pipeline::Ocr => {
                let pt = extract::image_to_marked_text(
                    &doc.bytes,
                    doc.mimetype.as_deref(),
                    &doc.original_name,
                    &self.ocr,
                )
                .map_err(|code| Error::Extract(code.to_string()))?;
                Ok(Extraction {
                    pipeline,
                    text: pt.text,
                    page_count: Some(pt.pages),
                    warnings: pt.warnings,
                })
            }
            Pipeline::PlainText => {
                let mut warnings = Vec::new();
                let text = match std::str::from_utf8(&doc.bytes) {
                    Ok(s) => s.to_string(),
                    Err(_) => {
                        warnings.push("invalid_utf8_replaced");
                        String::from_utf8_lossy(&doc.bytes).into_owned()
                    }
                };
                let page_count = Some(tree::split_pages(&text).len());
                Ok(Extraction {
                    pipeline,
                    text,
                    page_count,
                    warnings,
                })
            }
        }
    }
}
