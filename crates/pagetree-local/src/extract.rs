use crate::shellout::{self, OcrConfig};
use pagetree_core::tree::page_marker;
use pagetree_core::Pipeline;

pub fn bytes_look_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

pub fn bytes_look_like_image(bytes: &[u8]) -> bool {
    let is_webp = bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP";
    bytes.starts_with(b"\x89PNG\r\n\x1a\n")
        || bytes.starts_with(b"\xff\xd8\xff")
        || bytes.starts_with(b"GIF87a")
        || bytes.starts_with(b"GIF89a")
        || bytes.starts_with(b"II*\x00")
        || bytes.starts_with(b"MM\x00*")
        || is_webp
}

/// Pipeline implied by magic bytes alone, if any.
pub fn sniff_pipeline(bytes: &[u8]) -> Option<Pipeline> {
    if bytes_look_like_pdf(bytes) {
        Some(Pipeline::PdfText)
    } else if bytes_look_like_image(bytes) {
        Some(Pipeline::Ocr)
    } else {
        None
    }
}

/// Join per-page texts with `--- Page <n> ---` markers, the form the tree
/// builder splits on.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut out = String::new();
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&page_marker(i + 1));
        out.push('\n');
        out.push_str(page.as_ref().trim_end());
    }
    out
}

fn has_any_text(s: &str) -> bool {
    s.chars().any(|c| !c.is_whitespace())
}

/// Per-page text layer of a PDF (in-memory bytes).
///
/// Scanned PDFs come back as pages of whitespace; callers decide what to do.
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<String>, String> {
    pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())
}

#[derive(Debug, Clone)]
pub struct PageText {
    pub text: String,
    pub pages: usize,
    pub warnings: Vec<&'static str>,
}

/// PDF text layer with page markers. A blank text layer yields empty text and
/// the `pdf_text_layer_empty` warning.
pub fn pdf_to_marked_text(bytes: &[u8]) -> Result<PageText, String> {
    let pages = pdf_pages(bytes)?;
    let mut warnings = Vec::new();
    if !pages.iter().any(|p| has_any_text(p)) {
        tracing::warn!(pages = pages.len(), "pdf has no text layer");
        warnings.push("pdf_text_layer_empty");
        return Ok(PageText {
            text: String::new(),
            pages: pages.len(),
            warnings,
        });
    }
    Ok(PageText {
        text: join_pages(&pages),
        pages: pages.len(),
        warnings,
    })
}

/// Split raw OCR output into pages. Tesseract separates the pages of
/// multi-page images with form feeds; those become page markers.
pub fn ocr_output_to_marked_text(raw: &str) -> PageText {
    let pages: Vec<&str> = raw.split('\u{c}').filter(|p| has_any_text(p)).collect();
    let mut warnings = vec!["tesseract_used"];
    let text = match pages.len() {
        0 => {
            warnings.push("ocr_empty_output");
            String::new()
        }
        1 => pages[0].trim_end().to_string(),
        _ => join_pages(&pages),
    };
    PageText {
        text,
        pages: pages.len(),
        warnings,
    }
}

/// OCR an image with `tesseract`, then split its output into pages.
pub fn image_to_marked_text(
    bytes: &[u8],
    mimetype: Option<&str>,
    original_name: &str,
    ocr: &OcrConfig,
) -> Result<PageText, &'static str> {
    let raw = shellout::tesseract_ocr(bytes, mimetype, original_name, ocr)?;
    Ok(ocr_output_to_marked_text(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagetree_core::{tree, NodeKind};

    #[test]
    fn sniffs_pdf_and_image_magic() {
        assert_eq!(sniff_pipeline(b"%PDF-1.7\n%..."), Some(Pipeline::PdfText));
        assert_eq!(sniff_pipeline(b"\x89PNG\r\n\x1a\nrest"), Some(Pipeline::Ocr));
        assert_eq!(sniff_pipeline(b"\xff\xd8\xff\xe0"), Some(Pipeline::Ocr));
        assert_eq!(sniff_pipeline(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some(Pipeline::Ocr));
        assert_eq!(sniff_pipeline(b"plain words"), None);
        assert_eq!(sniff_pipeline(b""), None);
    }

    #[test]
    fn joined_pages_split_back_into_the_same_pages() {
        let pages = ["FIRST PAGE\nbody one\n", "second page body", "  \n"];
        let text = join_pages(&pages);
        assert!(text.starts_with("--- Page 1 ---\nFIRST PAGE"));

        // The blank third page is dropped by the builder.
        let root = tree::build(&text);
        assert_eq!(root.count(NodeKind::Page), 2);
        assert_eq!(
            root.children[0].children[0].title.as_deref(),
            Some("FIRST PAGE")
        );
        assert_eq!(
            root.children[1].children[0].title.as_deref(),
            Some("Page 2 Content")
        );
    }

    #[test]
    fn ocr_single_page_output_has_no_markers() {
        let pt = ocr_output_to_marked_text("INVOICE\nTotal due 42\n\n");
        assert_eq!(pt.pages, 1);
        assert_eq!(pt.text, "INVOICE\nTotal due 42");
        assert_eq!(pt.warnings, vec!["tesseract_used"]);
    }

    #[test]
    fn ocr_form_feeds_become_page_markers() {
        let pt = ocr_output_to_marked_text("FIRST\nbody one\n\u{c}second body\n\u{c}\n\u{c}THIRD\n");
        assert_eq!(pt.pages, 3, "blank form-feed segments are dropped");
        assert!(pt.text.contains("--- Page 2 ---\nsecond body"));

        let root = tree::build(&pt.text);
        assert_eq!(root.count(NodeKind::Page), 3);
        assert_eq!(root.children[0].children[0].title.as_deref(), Some("FIRST"));
        assert_eq!(root.children[2].children[0].title.as_deref(), Some("THIRD"));
    }

    #[test]
    fn blank_ocr_output_warns() {
        let pt = ocr_output_to_marked_text(" \n\u{c}\n \u{c}");
        assert_eq!(pt.pages, 0);
        assert!(pt.text.is_empty());
        assert_eq!(pt.warnings, vec!["tesseract_used", "ocr_empty_output"]);
    }

    /// A small, valid PDF: one Helvetica text line per entry of a page, or a
    /// bare path (no text layer) for an empty page.
    fn minimal_pdf(pages: &[&[&str]]) -> Vec<u8> {
        let mut objects: Vec<String> = Vec::new();
        let kids: Vec<String> = (0..pages.len())
            .map(|i| format!("{} 0 R", 4 + 2 * i))
            .collect();
        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            pages.len()
        ));
        objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());
        for (i, lines) in pages.iter().enumerate() {
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /Resources << /Font << /F1 3 0 R >> >> \
                 /MediaBox [0 0 612 792] /Contents {} 0 R >>",
                5 + 2 * i
            ));
            let stream = if lines.is_empty() {
                "72 72 m 200 200 l S".to_string()
            } else {
                let shown: Vec<String> = lines
                    .iter()
                    .map(|l| format!("({l}) Tj 0 -24 Td"))
                    .collect();
                format!("BT /F1 12 Tf 72 720 Td {} ET", shown.join(" "))
            };
            objects.push(format!(
                "<< /Length {} >>\nstream\n{stream}\nendstream",
                stream.len()
            ));
        }

        let mut out = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
        }
        let xref_at = out.len();
        let mut tail = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for off in offsets {
            tail.push_str(&format!("{off:010} 00000 n \n"));
        }
        tail.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_at}\n%%EOF\n",
            objects.len() + 1
        ));
        out.extend_from_slice(tail.as_bytes());
        out
    }

    #[test]
    fn pdf_text_layer_is_marked_per_page() {
        let pdf = minimal_pdf(&[&["HELLO WORLD", "first page body"], &["second page body"]]);
        assert!(bytes_look_like_pdf(&pdf));

        let pt = pdf_to_marked_text(&pdf).expect("pdf text");
        assert_eq!(pt.pages, 2);
        assert!(pt.warnings.is_empty());
        assert!(pt.text.starts_with("--- Page 1 ---\n"));
        assert!(pt.text.contains("--- Page 2 ---\n"));
        assert!(pt.text.contains("HELLO WORLD"));
        assert!(pt.text.contains("second page body"));

        let root = tree::build(&pt.text);
        assert_eq!(root.count(NodeKind::Page), 2);
    }

    #[test]
    fn pdf_without_text_layer_warns_and_yields_no_text() {
        let pdf = minimal_pdf(&[&[], &[]]);
        let pt = pdf_to_marked_text(&pdf).expect("pdf text");
        assert_eq!(pt.pages, 2);
        assert!(pt.text.is_empty());
        assert_eq!(pt.warnings, vec!["pdf_text_layer_empty"]);
    }

    #[test]
    fn join_pages_of_nothing_is_empty() {
        let none: [&str; 0] = [];
        assert_eq!(join_pages(&none), "");
    }
}
