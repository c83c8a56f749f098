//! Plain-text exchange format for translation tools that cannot read layout
//! JSON: one paragraph per line, each page closed by a line of dashes.

use regex::Regex;
use std::sync::LazyLock;

use super::LayoutDocument;
use crate::error::PipelineError;

pub const PAGE_SEPARATOR: &str = "------------------------------";

static PAGE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^-{8,}[ \t]*(?:\r?\n|\z)").expect("page separator regex")
});
static LINE_SPLIT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\r?\n").expect("line regex"));

pub fn to_text(doc: &LayoutDocument) -> String {
    let mut out = String::new();
    for page in doc.pages() {
        for paragraph in page.paragraphs() {
            out.push_str(&single_line(paragraph.text()));
            out.push('\n');
        }
        out.push_str(PAGE_SEPARATOR);
        out.push('\n');
    }
    out
}

/// Splits exchange text into per-page paragraph lists.
///
/// Only the line ending closing a page's last paragraph is dropped, so empty
/// paragraphs keep their position.
pub fn parse_text(text: &str) -> Vec<Vec<String>> {
    let mut chunks: Vec<&str> = PAGE_SPLIT.split(text).collect();
    if chunks.last().is_some_and(|chunk| chunk.trim().is_empty()) {
        chunks.pop();
    }
    chunks
        .into_iter()
        .map(|chunk| {
            if chunk.is_empty() {
                return Vec::new();
            }
            let body = chunk
                .strip_suffix('\n')
                .map(|rest| rest.strip_suffix('\r').unwrap_or(rest))
                .unwrap_or(chunk);
            LINE_SPLIT.split(body).map(str::to_string).collect()
        })
        .collect()
}

/// Replaces paragraph texts from exchange text, positionally.
pub fn from_text(text: &str, doc: LayoutDocument) -> Result<LayoutDocument, PipelineError> {
    doc.with_page_texts(parse_text(text))
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BBox, Page, ParagraphBlock, PointSize, RasterSize, RegionLabel};

    fn page(index: usize, texts: &[&str]) -> Page {
        let paragraphs = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                let y = 10.0 + idx as f32 * 60.0;
                ParagraphBlock::new(BBox::new(10.0, y, 300.0, y + 50.0), RegionLabel::Text, *text, 0.9)
            })
            .collect();
        Page::new(
            index,
            RasterSize {
                width: 612,
                height: 792,
            },
            PointSize {
                width: 612.0,
                height: 792.0,
            },
            paragraphs,
        )
    }

    fn document() -> LayoutDocument {
        LayoutDocument::new(vec![
            page(0, &["First paragraph.", "Second\nparagraph  wraps."]),
            page(1, &[]),
            page(2, &["Last page."]),
        ])
    }

    #[test]
    fn text_layout() {
        let text = to_text(&document());
        insta::assert_snapshot!(text.trim_end(), @r"
        First paragraph.
        Second paragraph wraps.
        ------------------------------
        ------------------------------
        Last page.
        ------------------------------
        ");
    }

    #[test]
    fn round_trip_through_text_keeps_positions() {
        let text = "Erster Absatz.\r\nZweiter Absatz.\r\n----------\r\n--------\nLetzte Seite.\n------------------------------\n";
        let doc = from_text(text, document()).expect("from text");
        let texts: Vec<Vec<&str>> = doc
            .pages()
            .iter()
            .map(|page| page.paragraphs().iter().map(|p| p.text()).collect())
            .collect();
        assert_eq!(
            texts,
            vec![
                vec!["Erster Absatz.", "Zweiter Absatz."],
                vec![],
                vec!["Letzte Seite."],
            ]
        );
    }

    #[test]
    fn missing_line_is_a_mismatch() {
        let text = "only one\n--------\n--------\nLast\n--------\n";
        let err = from_text(text, document()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MismatchedParagraphCount {
                page: 0,
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn missing_page_is_a_mismatch() {
        let text = "a\nb\n--------\n";
        let err = from_text(text, document()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MismatchedPageCount {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn empty_paragraphs_keep_their_position() {
        let text = "\nsecond\n--------\n--------\n\n--------\n";
        assert_eq!(
            parse_text(text),
            vec![vec!["", "second"], vec![], vec![""]]
        );
        let text = "first\n\n--------\n";
        assert_eq!(parse_text(text), vec![vec!["first", ""]]);
    }

    #[test]
    fn separator_may_end_the_input() {
        assert_eq!(
            parse_text("a\nb\n--------\nc\n--------"),
            vec![vec!["a", "b"], vec!["c"]]
        );
    }

    #[test]
    fn dashes_inside_a_line_do_not_split_pages() {
        assert_eq!(parse_text("a--------\nb\n"), vec![vec!["a--------", "b"]]);
    }

    #[test]
    fn short_dash_runs_are_not_separators() {
        assert_eq!(parse_text("a\n-------\nb\n"), vec![vec!["a", "-------", "b"]]);
    }
}
