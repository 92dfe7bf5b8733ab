use serde::Serialize;

pub(crate) fn warning_hint(code: &'static str) -> Option<&'static str> {
    match code {
        "pdf_text_layer_empty" => Some(
            "This PDF has no text layer (likely scanned). Rasterize its pages and ingest them as images so they go through OCR.",
        ),
        "tesseract_used" => Some("Text was recovered by the local `tesseract` OCR engine."),
        "ocr_empty_output" => Some(
            "OCR ran but produced no text. The image may be blank, too small, or too noisy; try a higher-resolution scan.",
        ),
        "invalid_utf8_replaced" => Some(
            "The input was not valid UTF-8; invalid bytes were replaced with U+FFFD before building the tree.",
        ),
        "no_pages" => Some(
            "No non-blank text was found, so the tree has no pages. Check the extraction pipeline for this file.",
        ),
        _ => None,
    }
}

pub(crate) fn warning_hints_from(codes: &[&'static str]) -> serde_json::Value {
    let mut m = serde_json::Map::new();
    for c in codes {
        if let Some(h) = warning_hint(c) {
            m.insert((*c).to_string(), serde_json::json!(h));
        }
    }
    serde_json::Value::Object(m)
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum ErrorCode {
    InvalidParams,
    NotSupported,
    NotFound,
    ExtractFailed,
    StoreError,
    UnexpectedError,
}

impl ErrorCode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::InvalidParams => "invalid_params",
            Self::NotSupported => "not_supported",
            Self::NotFound => "not_found",
            Self::ExtractFailed => "extract_failed",
            Self::StoreError => "store_error",
            Self::UnexpectedError => "unexpected_error",
        }
    }

    pub(crate) fn retryable(self) -> bool {
        match self {
            Self::StoreError | Self::UnexpectedError => true,
            // Input/type problems and engine failures repeat until something changes.
            Self::InvalidParams | Self::NotSupported | Self::NotFound | Self::ExtractFailed => {
                false
            }
        }
    }

    pub(crate) fn hint(self) -> &'static str {
        match self {
            Self::InvalidParams => "Check the file path and flags.",
            Self::NotSupported => {
                "Supported inputs: PDF (text layer), images (OCR via tesseract), and plain text. Pass --mimetype if the extension is misleading."
            }
            Self::NotFound => "Nothing is stored under that name. Run `pagetree ingest` first, or check --store-dir.",
            Self::ExtractFailed => {
                "Text extraction failed. For images, install `tesseract` and make sure PAGETREE_OCR is not `off`."
            }
            Self::StoreError => "The store directory could not be read or written. Check --store-dir permissions.",
            Self::UnexpectedError => "Unexpected failure; rerun with --verbose for details.",
        }
    }
}

impl From<&pagetree::Error> for ErrorCode {
    fn from(e: &pagetree::Error) -> Self {
        match e {
            pagetree::Error::Extract(_) => Self::ExtractFailed,
            pagetree::Error::NotSupported(_) => Self::NotSupported,
            pagetree::Error::Store(_) => Self::StoreError,
            pagetree::Error::InvalidInput(_) => Self::InvalidParams,
        }
    }
}

pub(crate) fn add_envelope_fields(payload: &mut serde_json::Value, kind: &str, elapsed_ms: u128) {
    payload["schema_version"] = serde_json::json!(crate::SCHEMA_VERSION);
    payload["kind"] = serde_json::json!(kind);
    payload["elapsed_ms"] = serde_json::json!(elapsed_ms);
    if payload.get("request").is_none() {
        payload["request"] = serde_json::Value::Null;
    }
}

pub(crate) fn error_obj(code: ErrorCode, message: impl ToString) -> serde_json::Value {
    #[derive(Serialize)]
    struct ErrorObject {
        code: &'static str,
        message: String,
        hint: &'static str,
        retryable: bool,
    }

    let e = ErrorObject {
        code: code.as_str(),
        message: message.to_string(),
        hint: code.hint(),
        retryable: code.retryable(),
    };
    match serde_json::to_value(e) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "code": code.as_str(),
            "message": message.to_string(),
            "hint": code.hint(),
            "retryable": code.retryable()
        }),
    }
}

/// `{ ok: false, error: {...} }` with the usual envelope keys.
pub(crate) fn error_envelope(
    kind: &str,
    code: ErrorCode,
    message: impl ToString,
    elapsed_ms: u128,
) -> serde_json::Value {
    let mut v = serde_json::json!({
        "ok": false,
        "error": error_obj(code, message),
    });
    add_envelope_fields(&mut v, kind, elapsed_ms);
    v
}
