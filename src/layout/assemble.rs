use std::cmp::Ordering;

use tracing::debug;

use super::geom::{BBox, center_inside, overlaps, same_line};
use super::{ParagraphBlock, RegionBox, WordBox};

#[derive(Debug, Clone, Copy)]
pub struct AssembleOptions {
    /// Number of vertical tiles the page width is cut into for reading order.
    pub column_divisor: u32,
    /// Largest horizontal gap (pixels) that still joins two fragments into one word.
    pub coalesce_threshold: f32,
    /// Regions with this many words or fewer are treated as captions and dropped.
    pub min_words: usize,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            column_divisor: 4,
            coalesce_threshold: 1.0,
            min_words: 10,
        }
    }
}

/// Builds the reading-ordered paragraph list for one page.
pub fn assemble(
    regions: &[RegionBox],
    words: &[WordBox],
    raster_width: u32,
    raster_height: u32,
    options: &AssembleOptions,
) -> Vec<ParagraphBlock> {
    let candidates: Vec<&RegionBox> = regions
        .iter()
        .filter(|region| region.label().is_paragraph())
        .collect();
    let kept = suppress_overlaps(candidates);

    let mut paragraphs = Vec::with_capacity(kept.len());
    for region in kept {
        let mut aggregator = WordAggregator::new(options.coalesce_threshold);
        aggregator.extend(
            words
                .iter()
                .filter(|word| center_inside(&region.bbox(), &word.bbox())),
        );
        if aggregator.word_count() <= options.min_words {
            debug!(
                "dropping {:?} region at {:?}: {} words",
                region.label(),
                region.bbox(),
                aggregator.word_count()
            );
            continue;
        }
        paragraphs.push(ParagraphBlock::new(
            region.bbox(),
            region.label(),
            aggregator.text(),
            region.score(),
        ));
    }

    sort_reading_order(&mut paragraphs, raster_width, options.column_divisor);
    debug!(
        "assembled {} paragraphs on {}x{} page",
        paragraphs.len(),
        raster_width,
        raster_height
    );
    paragraphs
}

/// Greedy non-maximum suppression: the best scoring region wins and any
/// overlapping lower scored region is dropped.
fn suppress_overlaps(mut regions: Vec<&RegionBox>) -> Vec<&RegionBox> {
    regions.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
    let mut kept: Vec<&RegionBox> = Vec::new();
    for region in regions {
        if kept
            .iter()
            .any(|existing| overlaps(&existing.bbox(), &region.bbox()))
        {
            continue;
        }
        kept.push(region);
    }
    kept
}

fn sort_reading_order(paragraphs: &mut [ParagraphBlock], raster_width: u32, divisor: u32) {
    let tile = raster_width.max(1) as f32 / divisor.max(1) as f32;
    paragraphs.sort_by(|a, b| {
        let column_a = (a.bbox().x1 / tile).floor();
        let column_b = (b.bbox().x1 / tile).floor();
        column_a
            .partial_cmp(&column_b)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.bbox()
                    .y1
                    .partial_cmp(&b.bbox().y1)
                    .unwrap_or(Ordering::Equal)
            })
    });
}

/// Rebuilds words from fragments delivered in extraction order.
///
/// A fragment continues the current word when it sits on the same line and
/// starts no more than `threshold` pixels after the previous fragment ends.
#[derive(Debug, Clone)]
pub struct WordAggregator {
    threshold: f32,
    words: Vec<String>,
    last: Option<BBox>,
}

impl WordAggregator {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            words: Vec::new(),
            last: None,
        }
    }

    /// Continues from text produced by an earlier aggregation.
    pub fn resume(text: &str, threshold: f32) -> Self {
        Self {
            threshold,
            words: text.split_whitespace().map(str::to_string).collect(),
            last: None,
        }
    }

    pub fn push(&mut self, word: &WordBox) {
        let text = word.text().trim();
        if text.is_empty() {
            return;
        }
        let joins = match (&self.last, self.words.last_mut()) {
            (Some(prev), Some(current)) => {
                let gap = word.bbox().x1 - prev.x2;
                if same_line(prev, &word.bbox()) && gap <= self.threshold {
                    current.push_str(text);
                    true
                } else {
                    false
                }
            }
            _ => false,
        };
        if !joins {
            self.words.push(text.to_string());
        }
        self.last = Some(word.bbox());
    }

    pub fn extend<'a>(&mut self, words: impl IntoIterator<Item = &'a WordBox>) {
        for word in words {
            self.push(word);
        }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn text(&self) -> String {
        self.words.join(" ")
    }

    pub fn into_words(self) -> Vec<String> {
        self.words
    }
}

pub fn coalesce_words(words: &[WordBox], threshold: f32) -> Vec<String> {
    let mut aggregator = WordAggregator::new(threshold);
    aggregator.extend(words);
    aggregator.into_words()
}
