use serde::{Deserialize, Serialize};

pub mod confidence;
pub mod pipeline;
pub mod tree;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("extraction failed: {0}")]
    Extract(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Qualitative band for a confidence score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConfidenceLabel {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl ConfidenceLabel {
    /// Band for a (rounded) score. Lower bounds are inclusive.
    pub fn from_score(score: u8) -> Self {
        match score {
            85.. => Self::Excellent,
            70..=84 => Self::Good,
            50..=69 => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent",
            Self::Good => "Good",
            Self::Fair => "Fair",
            Self::Poor => "Poor",
        }
    }

    /// Decorated label for human-facing output.
    pub fn badge(self) -> &'static str {
        match self {
            Self::Excellent => "🟢 Excellent",
            Self::Good => "🟡 Good",
            Self::Fair => "🟠 Fair",
            Self::Poor => "🔴 Poor",
        }
    }
}

impl std::fmt::Display for ConfidenceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality estimate for a span of extracted text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceResult {
    /// 0..=100.
    pub score: u8,
    pub label: ConfidenceLabel,
    pub total_words: usize,
    /// Real words plus technical terms.
    pub real_words: usize,
    pub junk_words: usize,
    pub technical_terms: usize,
    pub numeric_words: usize,
}

impl ConfidenceResult {
    /// Result for text with no tokens at all.
    pub fn empty() -> Self {
        Self {
            score: 0,
            label: ConfidenceLabel::Poor,
            total_words: 0,
            real_words: 0,
            junk_words: 0,
            technical_terms: 0,
            numeric_words: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Document,
    Page,
    Section,
    Paragraph,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Page => "page",
            Self::Section => "section",
            Self::Paragraph => "paragraph",
        }
    }
}

/// One node of a document tree (document → page → section → paragraph).
///
/// Serialized form: absent `title`/`content`/`confidence` are omitted.
/// Document, page and section nodes always carry `children` (possibly `[]`);
/// childless paragraphs omit it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TreeNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub title: Option<String>,
    /// Paragraph text (paragraph nodes only).
    #[serde(default)]
    pub content: Option<String>,
    /// Set on document and page nodes.
    #[serde(default)]
    pub confidence: Option<ConfidenceResult>,
    #[serde(default)]
    pub children: Vec<TreeNode>,
}

impl Serialize for TreeNode {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        fn opt_field<T: Serialize, M: SerializeStruct>(
            st: &mut M,
            key: &'static str,
            v: &Option<T>,
        ) -> std::result::Result<(), M::Error> {
            match v {
                Some(v) => st.serialize_field(key, v),
                None => st.skip_field(key),
            }
        }

        let mut st = serializer.serialize_struct("TreeNode", 6)?;
        st.serialize_field("id", &self.id)?;
        st.serialize_field("type", &self.kind)?;
        opt_field(&mut st, "title", &self.title)?;
        opt_field(&mut st, "content", &self.content)?;
        opt_field(&mut st, "confidence", &self.confidence)?;
        if self.kind == NodeKind::Paragraph && self.children.is_empty() {
            st.skip_field("children")?;
        } else {
            st.serialize_field("children", &self.children)?;
        }
        st.end()
    }
}

impl TreeNode {
    pub fn document(title: impl Into<String>, confidence: ConfidenceResult) -> Self {
        Self {
            id: "doc_root".to_string(),
            kind: NodeKind::Document,
            title: Some(title.into()),
            content: None,
            confidence: Some(confidence),
            children: Vec::new(),
        }
    }

    /// `page_index` is 0-based; ids and titles use the 1-based page number.
    pub fn page(page_index: usize, confidence: ConfidenceResult) -> Self {
        let n = page_index + 1;
        Self {
            id: format!("page_{n}"),
            kind: NodeKind::Page,
            title: Some(format!("Page {n}")),
            content: None,
            confidence: Some(confidence),
            children: Vec::new(),
        }
    }

    pub fn section(page_index: usize, line_index: usize, title: impl Into<String>) -> Self {
        Self {
            id: format!("section_{page_index}_{line_index}"),
            kind: NodeKind::Section,
            title: Some(title.into()),
            content: None,
            confidence: None,
            children: Vec::new(),
        }
    }

    pub fn paragraph(page_index: usize, line_index: usize, content: impl Into<String>) -> Self {
        Self {
            id: format!("paragraph_{page_index}_{line_index}"),
            kind: NodeKind::Paragraph,
            title: None,
            content: Some(content.into()),
            confidence: None,
            children: Vec::new(),
        }
    }

    /// Depth-first, pre-order walk starting at (and including) `self`.
    pub fn iter(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    pub fn pages(&self) -> impl Iterator<Item = &TreeNode> {
        self.iter().filter(|n| n.kind == NodeKind::Page)
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &TreeNode> {
        self.iter().filter(|n| n.kind == NodeKind::Paragraph)
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.iter().filter(|n| n.kind == kind).count()
    }
}

pub struct Walk<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a TreeNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// How text is recovered from a source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// Image → OCR engine.
    Ocr,
    /// PDF → embedded text layer.
    PdfText,
    /// Already-extracted text.
    PlainText,
}

impl Pipeline {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ocr => "ocr",
            Self::PdfText => "pdf_text",
            Self::PlainText => "plain_text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub original_name: String,
    pub mimetype: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub pipeline: Pipeline,
    /// Extracted text, with `--- Page <n> ---` markers between pages when known.
    pub text: String,
    /// Pages reported by the extractor, when it knows.
    pub page_count: Option<usize>,
    pub warnings: Vec<&'static str>,
}

pub trait TextExtractor: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, doc: &SourceDocument) -> Result<Extraction>;
}

/// A processed document, as persisted by a [`TreeStore`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub original_name: String,
    pub mimetype: Option<String>,
    pub pipeline: Pipeline,
    pub extracted_text: String,
    pub structure: TreeNode,
    pub uploaded_at_epoch_s: u64,
}

/// Persistence keyed by original filename. Re-putting a name replaces the record.
pub trait TreeStore: Send + Sync {
    fn put(&self, record: &DocumentRecord) -> Result<()>;
    fn get(&self, original_name: &str) -> Result<Option<DocumentRecord>>;
}
