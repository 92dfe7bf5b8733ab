//! Raw extracted text → document / page / section / paragraph tree.

use crate::{confidence, TreeNode};

/// Marker inserted by upstream extractors between pages: `--- Page <n> ---`.
pub const PAGE_MARKER_PREFIX: &str = "--- Page ";
pub const PAGE_MARKER_SUFFIX: &str = " ---";

pub const DEFAULT_DOCUMENT_TITLE: &str = "Document";

/// Heading length bounds, both exclusive, in chars of the trimmed line.
const HEADING_MIN_CHARS: usize = 3;
const HEADING_MAX_CHARS: usize = 60;

/// Format the marker for a 1-based page number.
pub fn page_marker(page_number: usize) -> String {
    format!("{PAGE_MARKER_PREFIX}{page_number}{PAGE_MARKER_SUFFIX}")
}

/// Byte range of the first complete page marker in `s`.
fn find_page_marker(s: &str) -> Option<(usize, usize)> {
    for (start, _) in s.match_indices(PAGE_MARKER_PREFIX) {
        let after = &s[start + PAGE_MARKER_PREFIX.len()..];
        let digits = after.bytes().take_while(|b| b.is_ascii_digit()).count();
        if digits > 0 && after[digits..].starts_with(PAGE_MARKER_SUFFIX) {
            let end = start + PAGE_MARKER_PREFIX.len() + digits + PAGE_MARKER_SUFFIX.len();
            return Some((start, end));
        }
    }
    None
}

/// Split on page markers, dropping the markers and any blank segment.
///
/// Text without markers comes back as a single segment (unless blank).
pub fn split_pages(raw: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut rest = raw;
    while let Some((start, end)) = find_page_marker(rest) {
        segments.push(&rest[..start]);
        rest = &rest[end..];
    }
    segments.push(rest);
    segments.retain(|s| !s.trim().is_empty());
    segments
}

/// Trimmed, non-empty lines of a page.
pub fn page_lines(page: &str) -> impl Iterator<Item = &str> {
    page.split('\n').map(str::trim).filter(|l| !l.is_empty())
}

/// A short line with no ASCII lowercase letters and no `_`. Every other
/// char, non-ASCII letters of either case included, counts as a non-word
/// symbol. Length bounds are strict on both ends.
pub fn is_heading(line: &str) -> bool {
    let line = line.trim();
    let n = line.chars().count();
    n > HEADING_MIN_CHARS
        && n < HEADING_MAX_CHARS
        && !line.chars().any(|c| c.is_ascii_lowercase() || c == '_')
}

/// Build a tree titled [`DEFAULT_DOCUMENT_TITLE`].
pub fn build(raw: &str) -> TreeNode {
    build_titled(raw, DEFAULT_DOCUMENT_TITLE)
}

pub fn build_titled(raw: &str, title: &str) -> TreeNode {
    let mut root = TreeNode::document(title, confidence::score(raw));
    for (page_index, page_text) in split_pages(raw).into_iter().enumerate() {
        let page = build_page(page_index, page_text);
        tracing::debug!(
            page = page_index + 1,
            sections = page.children.len(),
            "built page"
        );
        root.children.push(page);
    }
    root
}

/// Per-page accumulator: the page under construction plus the index of the
/// section that currently receives paragraphs.
struct PageBuilder {
    page_index: usize,
    page: TreeNode,
    current: Option<usize>,
}

impl PageBuilder {
    fn new(page_index: usize, page_text: &str) -> Self {
        Self {
            page_index,
            page: TreeNode::page(page_index, confidence::score(page_text)),
            current: None,
        }
    }

    fn open_section(&mut self, line_index: usize, title: String) -> usize {
        self.page
            .children
            .push(TreeNode::section(self.page_index, line_index, title));
        let idx = self.page.children.len() - 1;
        self.current = Some(idx);
        idx
    }

    fn push_line(&mut self, line_index: usize, line: &str) {
        if is_heading(line) {
            self.open_section(line_index, line.to_string());
            return;
        }
        let idx = match self.current {
            Some(idx) => idx,
            None => {
                let title = format!("Page {} Content", self.page_index + 1);
                self.open_section(line_index, title)
            }
        };
        self.page.children[idx]
            .children
            .push(TreeNode::paragraph(self.page_index, line_index, line));
    }

    fn finish(self) -> TreeNode {
        self.page
    }
}

fn build_page(page_index: usize, page_text: &str) -> TreeNode {
    let mut b = PageBuilder::new(page_index, page_text);
    for (line_index, line) in page_lines(page_text).enumerate() {
        b.push_line(line_index, line);
    }
    b.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfidenceLabel, NodeKind};
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn titles(node: &TreeNode) -> Vec<&str> {
        node.children
            .iter()
            .filter_map(|c| c.title.as_deref())
            .collect()
    }

    #[test]
    fn heading_followed_by_body_line() {
        let root = build("--- Page 1 ---\nHELLO WORLD\nThis is a test line.");
        assert_eq!(root.kind, NodeKind::Document);
        assert!(root.confidence.is_some());
        assert_eq!(root.children.len(), 1);

        let page = &root.children[0];
        assert_eq!(page.id, "page_1");
        assert_eq!(page.title.as_deref(), Some("Page 1"));
        assert!(page.confidence.is_some());
        assert_eq!(titles(page), vec!["HELLO WORLD"]);

        let section = &page.children[0];
        assert_eq!(section.id, "section_0_0");
        assert_eq!(section.children.len(), 1);
        let para = &section.children[0];
        assert_eq!(para.kind, NodeKind::Paragraph);
        assert_eq!(para.id, "paragraph_0_1");
        assert_eq!(para.content.as_deref(), Some("This is a test line."));
    }

    #[test]
    fn body_without_heading_gets_synthesized_section() {
        let root = build("just one lowercase line");
        assert_eq!(root.children.len(), 1);
        let page = &root.children[0];
        assert_eq!(titles(page), vec!["Page 1 Content"]);
        let section = &page.children[0];
        assert_eq!(section.id, "section_0_0");
        assert_eq!(section.children.len(), 1);
        assert_eq!(
            section.children[0].content.as_deref(),
            Some("just one lowercase line")
        );
    }

    #[test]
    fn heading_bounds_are_strict() {
        assert!(!is_heading("ABC"), "3 chars is too short");
        assert!(is_heading("ABCD"));
        assert!(is_heading(&"A".repeat(59)));
        assert!(!is_heading(&"A".repeat(60)), "60 chars is too long");
        assert!(is_heading("  1.2 SCOPE  "), "measured after trimming");
    }

    #[test]
    fn heading_rejects_lowercase_and_underscore() {
        assert!(is_heading("CHAPTER 1: OVERVIEW"));
        assert!(is_heading("2024-01-15"));
        assert!(is_heading("RÉSUMÉ"));
        assert!(is_heading("*** !!! ***"));
        assert!(!is_heading("Chapter One"));
        assert!(!is_heading("SNAKE_CASE"));
        assert!(!is_heading("ÉTÉ ete"));
    }

    #[test]
    fn heading_treats_non_ascii_letters_as_symbols() {
        assert!(is_heading("ÉTÉ été"));
        assert!(is_heading("ΑΒΓ αβγ"));
        assert!(is_heading("STRASSE ß"));
        assert!(is_heading("ÇA VA é"));

        let root = build("ÇA VA é\nbody line");
        let section = &root.children[0].children[0];
        assert_eq!(section.title.as_deref(), Some("ÇA VA é"));
        assert_eq!(section.children[0].content.as_deref(), Some("body line"));
    }

    #[test]
    fn split_pages_drops_markers_and_blank_segments() {
        let raw = "intro\n--- Page 1 ---\nfirst\n--- Page 2 ---\n \n--- Page 3 ---\nthird\n";
        let pages = split_pages(raw);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].trim(), "intro");
        assert_eq!(pages[1].trim(), "first");
        assert_eq!(pages[2].trim(), "third");
    }

    #[test]
    fn split_pages_requires_digits_and_full_suffix() {
        assert_eq!(split_pages("--- Page X ---\nbody").len(), 1);
        assert_eq!(split_pages("--- Page 1 --\nbody").len(), 1);
        assert_eq!(
            split_pages("--- Page --- Page 12 ---body"),
            vec!["--- Page ", "body"]
        );
        assert!(split_pages("").is_empty());
        assert!(split_pages("--- Page 1 ---\n\n--- Page 2 ---").is_empty());
    }

    #[test]
    fn page_numbers_come_from_position_not_marker() {
        let root = build("--- Page 7 ---\nalpha\n--- Page 3 ---\nbeta");
        let ids: Vec<&str> = root.children.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["page_1", "page_2"]);
        assert_eq!(titles(&root), vec!["Page 1", "Page 2"]);
        assert_eq!(titles(&root.children[1]), vec!["Page 2 Content"]);
    }

    #[test]
    fn blank_lines_do_not_consume_line_indices() {
        let root = build("TITLE ONE\n\n\n   \nbody text here");
        let section = &root.children[0].children[0];
        assert_eq!(section.id, "section_0_0");
        assert_eq!(section.children[0].id, "paragraph_0_1");
    }

    #[test]
    fn consecutive_headings_open_separate_sections() {
        let raw = "intro line\nPART ONE\nPART TWO\nbody of two\nmore body";
        let page = &build(raw).children[0];
        assert_eq!(titles(page), vec!["Page 1 Content", "PART ONE", "PART TWO"]);
        assert_eq!(page.children[1].children.len(), 0);
        let two = &page.children[2];
        assert_eq!(two.id, "section_0_2");
        let contents: Vec<&str> = two
            .children
            .iter()
            .filter_map(|p| p.content.as_deref())
            .collect();
        assert_eq!(contents, vec!["body of two", "more body"]);
    }

    #[test]
    fn crlf_lines_are_trimmed() {
        let root = build("SUMMARY\r\nfirst line\r\nsecond line\r\n");
        let section = &root.children[0].children[0];
        assert_eq!(section.title.as_deref(), Some("SUMMARY"));
        assert_eq!(section.children.len(), 2);
        assert_eq!(section.children[1].content.as_deref(), Some("second line"));
    }

    #[test]
    fn empty_input_yields_root_without_pages() {
        let root = build("");
        assert_eq!(root.kind, NodeKind::Document);
        assert!(root.children.is_empty());
        let c = root.confidence.expect("root confidence");
        assert_eq!(c.score, 0);
        assert_eq!(c.label, ConfidenceLabel::Poor);
    }

    #[test]
    fn page_confidence_scores_only_that_page() {
        let root = build("--- Page 1 ---\nclean readable words here\n--- Page 2 ---\n§§§ ¶¶¶ ±±±");
        let p1 = root.children[0].confidence.expect("p1");
        let p2 = root.children[1].confidence.expect("p2");
        assert_eq!(p1.label, ConfidenceLabel::Excellent);
        assert_eq!(p2.label, ConfidenceLabel::Poor);
        let doc = root.confidence.expect("doc");
        assert!(doc.score < p1.score && doc.score > p2.score);
    }

    #[test]
    fn titled_build_sets_document_title() {
        let root = build_titled("text", "scan-001.png");
        assert_eq!(root.id, "doc_root");
        assert_eq!(root.title.as_deref(), Some("scan-001.png"));
        assert_eq!(build("text").title.as_deref(), Some(DEFAULT_DOCUMENT_TITLE));
    }

    #[test]
    fn page_marker_round_trips_through_split() {
        let raw = format!("{}\none\n{}\ntwo", page_marker(1), page_marker(2));
        assert_eq!(build(&raw).count(NodeKind::Page), 2);
    }

    fn line_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-Z ]{4,20}",
            "[a-z ]{1,30}",
            "[A-Za-z0-9.,%/+ ]{0,40}",
            Just(String::new()),
        ]
    }

    fn document_strategy() -> impl Strategy<Value = String> {
        prop::collection::vec(prop::collection::vec(line_strategy(), 0..8), 0..5).prop_map(
            |pages| {
                pages
                    .iter()
                    .enumerate()
                    .map(|(i, lines)| format!("{}\n{}", page_marker(i + 1), lines.join("\n")))
                    .collect::<Vec<_>>()
                    .join("\n")
            },
        )
    }

    proptest! {
        #[test]
        fn build_is_deterministic(s in any::<String>()) {
            prop_assert_eq!(build(&s), build(&s));
        }

        #[test]
        fn ids_are_unique(s in document_strategy()) {
            let root = build(&s);
            let mut seen = HashSet::new();
            for n in root.iter() {
                prop_assert!(seen.insert(n.id.clone()), "duplicate id {}", n.id);
            }
        }

        #[test]
        fn page_count_matches_non_blank_segments(s in document_strategy()) {
            let root = build(&s);
            prop_assert_eq!(root.count(NodeKind::Page), split_pages(&s).len());
        }

        #[test]
        fn paragraphs_preserve_non_heading_lines_in_order(s in document_strategy()) {
            let root = build(&s);
            let expected: Vec<&str> = split_pages(&s)
                .into_iter()
                .flat_map(page_lines)
                .filter(|l| !is_heading(l))
                .collect();
            let got: Vec<&str> = root
                .paragraphs()
                .filter_map(|p| p.content.as_deref())
                .collect();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn every_section_holds_content_or_came_from_a_heading(s in document_strategy()) {
            let root = build(&s);
            for page in root.pages() {
                for section in &page.children {
                    prop_assert_eq!(section.kind, NodeKind::Section);
                    let title = section.title.as_deref().unwrap_or_default();
                    prop_assert!(!section.children.is_empty() || is_heading(title));
                }
            }
        }
    }
}
