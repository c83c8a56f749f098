//! Page overlays: opaque masks over each paragraph with the translated text
//! flowed on top, as PDF content operations.

use anyhow::{Result, anyhow};
use lopdf::Object;
use lopdf::content::{Content, Operation};
use std::collections::BTreeSet;

use crate::layout::geom::scale;
use crate::layout::{BBox, Page, PointSize};
use crate::settings::Settings;

mod flow;
mod font;

pub use flow::{FitOptions, FlowedText, fit_text};
pub use font::{BUILTIN_FONT_NAME, OverlayFont, TrueTypeFont, resolve_overlay_font};

/// Resource name the overlay's text operators refer to.
pub const FONT_RESOURCE: &str = "FTrans";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    /// Parses `#rgb` or `#rrggbb`.
    pub fn parse_hex(raw: &str) -> Result<Self> {
        let hex = raw.trim().trim_start_matches('#');
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|ch| [ch, ch]).collect(),
            6 => hex.to_string(),
            _ => return Err(anyhow!("invalid color '{}' (expected #rgb or #rrggbb)", raw)),
        };
        let channel = |idx: usize| {
            u8::from_str_radix(&expanded[idx..idx + 2], 16)
                .map(|value| value as f32 / 255.0)
                .map_err(|_| anyhow!("invalid color '{}'", raw))
        };
        Ok(Rgb {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    fn operands(&self) -> Vec<Object> {
        vec![self.r.into(), self.g.into(), self.b.into()]
    }
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub font_size: f32,
    pub min_font_size: f32,
    /// Padding added to each side of a paragraph box, in points.
    pub padding_x: f32,
    pub padding_y: f32,
    /// Factor applied to both box dimensions to get the frame text is
    /// flowed into before the font shrinks.
    pub overflow_scale: f32,
    pub first_line_indent: bool,
    pub fill: Rgb,
    pub text: Rgb,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: 20.0,
            min_font_size: 4.0,
            padding_x: 5.0,
            padding_y: 0.0,
            overflow_scale: 1.5,
            first_line_indent: true,
            fill: Rgb::WHITE,
            text: Rgb::BLACK,
        }
    }
}

impl OverlayStyle {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            font_size: settings.overlay_font_size,
            min_font_size: settings.overlay_min_font_size,
            padding_x: settings.overlay_padding_x,
            padding_y: settings.overlay_padding_y,
            overflow_scale: settings.overlay_overflow_scale,
            first_line_indent: settings.overlay_first_line_indent,
            fill: Rgb::parse_hex(&settings.overlay_fill_color)?,
            text: Rgb::parse_hex(&settings.overlay_text_color)?,
        })
    }
}

/// Drawing operations for one page, in points with a bottom-left origin at
/// the page's lower-left corner. Transparent everywhere except masks and text.
#[derive(Debug, Clone)]
pub struct OverlayLayer {
    page_index: usize,
    size: PointSize,
    masks: Vec<BBox>,
    operations: Vec<Operation>,
    codes: BTreeSet<u16>,
}

impl OverlayLayer {
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    pub fn size(&self) -> PointSize {
        self.size
    }

    /// Masked rectangles as `[x, y, x + w, y + h]` in bottom-up points.
    pub fn masks(&self) -> &[BBox] {
        &self.masks
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// UTF-16 code units drawn on this layer.
    pub fn codes(&self) -> &BTreeSet<u16> {
        &self.codes
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Content {
            operations: self.operations.clone(),
        }
        .encode()
        .map_err(|err| anyhow!("failed to encode overlay for page {}: {}", self.page_index + 1, err))
    }
}

/// Builds the overlay for one page: every paragraph box is scaled to points,
/// padded and masked, then its text is flowed into the masked area.
///
/// All masks are drawn before any text; text overflowing its box stays on top
/// of neighbouring masks.
pub fn render_overlay(page: &Page, style: &OverlayStyle, font: &OverlayFont) -> OverlayLayer {
    let size = page.pdf();
    let (sx, sy) = page.scale_factors();
    let mut masks = Vec::with_capacity(page.paragraphs().len());
    let mut blocks = Vec::with_capacity(page.paragraphs().len());

    for paragraph in page.paragraphs() {
        let rect = scale(&paragraph.bbox(), sx, sy).pad(style.padding_x, style.padding_y);
        let bottom = size.height - rect.y2;
        masks.push(BBox::new(rect.x1, bottom, rect.x2, bottom + rect.height()));
        let flowed = fit_text(
            paragraph.text(),
            font,
            FitOptions {
                font_size: style.font_size,
                min_font_size: style.min_font_size,
                width: rect.width() * style.overflow_scale,
                max_height: rect.height() * style.overflow_scale,
                first_line_indent: style.first_line_indent,
            },
        );
        blocks.push((rect, flowed));
    }

    let mut operations = Vec::new();
    let mut codes = BTreeSet::new();
    if !masks.is_empty() {
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new("rg", style.fill.operands()));
        for mask in &masks {
            operations.push(Operation::new(
                "re",
                vec![
                    mask.x1.into(),
                    mask.y1.into(),
                    mask.width().into(),
                    mask.height().into(),
                ],
            ));
            operations.push(Operation::new("f", vec![]));
        }
        operations.push(Operation::new("rg", style.text.operands()));
        for (rect, flowed) in &blocks {
            let top = size.height - rect.y1;
            for (idx, line) in flowed.lines.iter().enumerate() {
                let x = if idx == 0 {
                    rect.x1 + flowed.indent
                } else {
                    rect.x1
                };
                let baseline = top - flowed.font_size - idx as f32 * flowed.leading;
                codes.extend(font::text_codes(line));
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), flowed.font_size.into()],
                ));
                operations.push(Operation::new("Td", vec![x.into(), baseline.into()]));
                operations.push(Operation::new("Tj", vec![font::hex_string(font.encode(line))]));
                operations.push(Operation::new("ET", vec![]));
            }
        }
        operations.push(Operation::new("Q", vec![]));
    }

    OverlayLayer {
        page_index: page.index(),
        size,
        masks,
        operations,
        codes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ParagraphBlock, RasterSize, RegionLabel};

    fn page(paragraphs: Vec<ParagraphBlock>) -> Page {
        Page::new(
            0,
            RasterSize {
                width: 1224,
                height: 1584,
            },
            PointSize {
                width: 612.0,
                height: 792.0,
            },
            paragraphs,
        )
    }

    fn numbers(layer: &OverlayLayer, name: &str) -> Vec<Vec<f32>> {
        layer
            .operations()
            .iter()
            .filter(|op| op.operator == name)
            .map(|op| {
                op.operands
                    .iter()
                    .filter_map(|operand| match operand {
                        Object::Real(value) => Some(*value),
                        Object::Integer(value) => Some(*value as f32),
                        _ => None,
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn masks_are_scaled_padded_and_flipped() {
        let paragraph = ParagraphBlock::new(
            BBox::new(200.0, 100.0, 600.0, 300.0),
            RegionLabel::Text,
            "訳文",
            0.9,
        );
        let layer = render_overlay(&page(vec![paragraph]), &OverlayStyle::default(), &OverlayFont::Builtin);
        // Scale 0.5: (100, 50, 300, 150) in points, padded 5pt horizontally.
        assert_eq!(layer.masks(), &[BBox::new(95.0, 642.0, 305.0, 742.0)]);
        assert_eq!(numbers(&layer, "re"), vec![vec![95.0, 642.0, 210.0, 100.0]]);
    }

    #[test]
    fn text_starts_below_top_with_indent() {
        let paragraph = ParagraphBlock::new(
            BBox::new(200.0, 100.0, 600.0, 300.0),
            RegionLabel::Text,
            "訳文",
            0.9,
        );
        let layer = render_overlay(&page(vec![paragraph]), &OverlayStyle::default(), &OverlayFont::Builtin);
        assert_eq!(numbers(&layer, "Td"), vec![vec![115.0, 722.0]]);
        let tj: Vec<_> = layer
            .operations()
            .iter()
            .filter(|op| op.operator == "Tj")
            .collect();
        assert_eq!(tj.len(), 1);
        match &tj[0].operands[0] {
            Object::String(bytes, lopdf::StringFormat::Hexadecimal) => {
                assert_eq!(bytes, &vec![0x8A, 0x33, 0x65, 0x87]);
            }
            other => panic!("unexpected operand {:?}", other),
        }
        assert!(layer.codes().contains(&0x8A33));
    }

    #[test]
    fn text_fitting_the_enlarged_frame_keeps_base_size() {
        // 90x30pt box, 100x30pt padded: the frame is 150x45pt.
        let paragraph = ParagraphBlock::new(
            BBox::new(200.0, 100.0, 380.0, 160.0),
            RegionLabel::Text,
            "一二三四五六七八九十",
            0.9,
        );
        let layer = render_overlay(&page(vec![paragraph]), &OverlayStyle::default(), &OverlayFont::Builtin);
        let sizes: Vec<f32> = numbers(&layer, "Tf").into_iter().flatten().collect();
        assert_eq!(sizes, vec![20.0, 20.0]);
    }

    #[test]
    fn masks_precede_all_text() {
        let paragraphs = vec![
            ParagraphBlock::new(BBox::new(0.0, 0.0, 400.0, 100.0), RegionLabel::Text, "一", 0.9),
            ParagraphBlock::new(BBox::new(0.0, 200.0, 400.0, 300.0), RegionLabel::Text, "二", 0.9),
        ];
        let layer = render_overlay(&page(paragraphs), &OverlayStyle::default(), &OverlayFont::Builtin);
        let names: Vec<_> = layer
            .operations()
            .iter()
            .map(|op| op.operator.as_str())
            .collect();
        let last_fill = names.iter().rposition(|name| *name == "f").unwrap();
        let first_text = names.iter().position(|name| *name == "BT").unwrap();
        assert!(last_fill < first_text);
        assert_eq!(names.first(), Some(&"q"));
        assert_eq!(names.last(), Some(&"Q"));
    }

    #[test]
    fn empty_page_has_no_operations() {
        let layer = render_overlay(&page(vec![]), &OverlayStyle::default(), &OverlayFont::Builtin);
        assert!(layer.is_empty());
        assert!(layer.operations().is_empty());
    }

    #[test]
    fn parses_hex_colors() {
        assert_eq!(Rgb::parse_hex("#fff").unwrap(), Rgb::WHITE);
        assert_eq!(Rgb::parse_hex("000000").unwrap(), Rgb::BLACK);
        assert!(Rgb::parse_hex("#12345").is_err());
        assert!(Rgb::parse_hex("#gggggg").is_err());
    }
}
