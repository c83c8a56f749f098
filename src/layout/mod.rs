mod assemble;
pub mod exchange;
pub mod geom;
mod store;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub use assemble::{AssembleOptions, WordAggregator, assemble, coalesce_words};
pub use geom::BBox;
pub use store::{load, load_file, save, save_file};

/// Labels emitted by the region detector (PubLayNet classes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionLabel {
    Text,
    Title,
    List,
    Table,
    Figure,
}

impl RegionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionLabel::Text => "Text",
            RegionLabel::Title => "Title",
            RegionLabel::List => "List",
            RegionLabel::Table => "Table",
            RegionLabel::Figure => "Figure",
        }
    }

    /// Whether regions with this label carry translatable paragraphs.
    pub fn is_paragraph(&self) -> bool {
        matches!(self, RegionLabel::Text | RegionLabel::List)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "0" => Some(RegionLabel::Text),
            "title" | "1" => Some(RegionLabel::Title),
            "list" | "2" => Some(RegionLabel::List),
            "table" | "3" => Some(RegionLabel::Table),
            "figure" | "4" => Some(RegionLabel::Figure),
            _ => None,
        }
    }
}

/// A word or character fragment from the word extractor, in raster pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    bbox: BBox,
    text: String,
}

impl WordBox {
    pub fn new(bbox: BBox, text: impl Into<String>) -> Self {
        Self {
            bbox,
            text: text.into(),
        }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The same word placed at `bbox`.
    pub fn moved_to(self, bbox: BBox) -> Self {
        Self { bbox, ..self }
    }
}

/// A region detection, in raster pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionBox {
    bbox: BBox,
    label: RegionLabel,
    score: f32,
}

impl RegionBox {
    pub fn new(bbox: BBox, label: RegionLabel, score: f32) -> Self {
        Self { bbox, label, score }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn label(&self) -> RegionLabel {
        self.label
    }

    pub fn score(&self) -> f32 {
        self.score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParagraphBlock {
    bbox: BBox,
    label: RegionLabel,
    text: String,
    score: f32,
}

impl ParagraphBlock {
    pub fn new(bbox: BBox, label: RegionLabel, text: impl Into<String>, score: f32) -> Self {
        Self {
            bbox,
            label,
            text: text.into(),
            score,
        }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn label(&self) -> RegionLabel {
        self.label
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Confidence of the detection this paragraph was built from.
    pub fn source_region_score(&self) -> f32 {
        self.score
    }

    /// Returns the same paragraph carrying `text` instead of its current text.
    pub fn with_text(self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RasterSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointSize {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    index: usize,
    raster: RasterSize,
    pdf: PointSize,
    paragraphs: Vec<ParagraphBlock>,
}

impl Page {
    pub fn new(
        index: usize,
        raster: RasterSize,
        pdf: PointSize,
        paragraphs: Vec<ParagraphBlock>,
    ) -> Self {
        Self {
            index,
            raster,
            pdf,
            paragraphs,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn raster(&self) -> RasterSize {
        self.raster
    }

    pub fn pdf(&self) -> PointSize {
        self.pdf
    }

    /// Paragraphs in reading order.
    pub fn paragraphs(&self) -> &[ParagraphBlock] {
        &self.paragraphs
    }

    /// Raster-to-point scale factors per axis.
    pub fn scale_factors(&self) -> (f32, f32) {
        (
            self.pdf.width / self.raster.width.max(1) as f32,
            self.pdf.height / self.raster.height.max(1) as f32,
        )
    }

    /// Replaces every paragraph text positionally.
    ///
    /// `texts` must hold exactly one entry per paragraph; anything else would
    /// attach translations to the wrong regions.
    pub fn with_texts(self, texts: Vec<String>) -> Result<Self, PipelineError> {
        if texts.len() != self.paragraphs.len() {
            return Err(PipelineError::MismatchedParagraphCount {
                page: self.index,
                expected: self.paragraphs.len(),
                actual: texts.len(),
            });
        }
        let paragraphs = self
            .paragraphs
            .into_iter()
            .zip(texts)
            .map(|(paragraph, text)| paragraph.with_text(text))
            .collect();
        Ok(Self { paragraphs, ..self })
    }
}

/// The persisted intermediate representation shared by all stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutDocument {
    pages: Vec<Page>,
}

impl LayoutDocument {
    pub fn new(pages: Vec<Page>) -> Self {
        Self { pages }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.pages
    }

    pub fn paragraph_count(&self) -> usize {
        self.pages.iter().map(|page| page.paragraphs.len()).sum()
    }

    pub fn char_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|page| page.paragraphs.iter())
            .map(|paragraph| paragraph.text.chars().count())
            .sum()
    }

    /// Applies per-page text lists, failing on any count mismatch.
    pub fn with_page_texts(self, page_texts: Vec<Vec<String>>) -> Result<Self, PipelineError> {
        if page_texts.len() != self.pages.len() {
            return Err(PipelineError::MismatchedPageCount {
                expected: self.pages.len(),
                actual: page_texts.len(),
            });
        }
        let pages = self
            .pages
            .into_iter()
            .zip(page_texts)
            .map(|(page, texts)| page.with_texts(texts))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { pages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_with(texts: &[&str]) -> Page {
        let paragraphs = texts
            .iter()
            .enumerate()
            .map(|(idx, text)| {
                let y = idx as f32 * 50.0;
                ParagraphBlock::new(BBox::new(10.0, y, 200.0, y + 40.0), RegionLabel::Text, *text, 0.9)
            })
            .collect();
        Page::new(
            3,
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

    #[test]
    fn with_texts_replaces_in_order() {
        let page = page_with(&["one", "two"]);
        let page = page
            .with_texts(vec!["uno".to_string(), "dos".to_string()])
            .expect("texts");
        let texts: Vec<_> = page.paragraphs().iter().map(|p| p.text()).collect();
        assert_eq!(texts, vec!["uno", "dos"]);
        assert_eq!(page.paragraphs()[1].bbox(), BBox::new(10.0, 50.0, 200.0, 90.0));
    }

    #[test]
    fn with_texts_rejects_count_mismatch() {
        let page = page_with(&["one", "two"]);
        let err = page.with_texts(vec!["uno".to_string()]).unwrap_err();
        match err {
            PipelineError::MismatchedParagraphCount {
                page,
                expected,
                actual,
            } => {
                assert_eq!((page, expected, actual), (3, 2, 1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn label_parse_accepts_names_and_ids() {
        assert_eq!(RegionLabel::parse("text"), Some(RegionLabel::Text));
        assert_eq!(RegionLabel::parse(" List "), Some(RegionLabel::List));
        assert_eq!(RegionLabel::parse("4"), Some(RegionLabel::Figure));
        assert_eq!(RegionLabel::parse("caption"), None);
        assert!(!RegionLabel::Title.is_paragraph());
    }

    #[test]
    fn char_count_sums_paragraphs() {
        let doc = LayoutDocument::new(vec![page_with(&["abc", "日本語"])]);
        assert_eq!(doc.char_count(), 6);
        assert_eq!(doc.paragraph_count(), 2);
    }

    #[test]
    fn moving_a_word_keeps_its_text() {
        let word = WordBox::new(BBox::new(1.0, 2.0, 3.0, 4.0), "word");
        let moved = word.clone().moved_to(BBox::new(2.0, 4.0, 6.0, 8.0));
        assert_eq!(moved.text(), "word");
        assert_eq!(moved.bbox(), BBox::new(2.0, 4.0, 6.0, 8.0));
        assert_eq!(word.bbox(), BBox::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn region_exposes_its_detection() {
        let region = RegionBox::new(BBox::new(0.0, 0.0, 10.0, 10.0), RegionLabel::List, 0.8);
        assert_eq!(region.label(), RegionLabel::List);
        assert_eq!(region.score(), 0.8);
        assert!(region.bbox().is_valid());
    }
}
