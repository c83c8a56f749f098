use anyhow::Result;
use lopdf::{Document, Object, Stream, dictionary};
use std::path::Path;

use translatable::PipelineError;
use translatable::extract::{Detector, PageImage, PageWords, Rasterizer, WordExtractor};
use translatable::layout::{
    AssembleOptions, BBox, LayoutDocument, PointSize, RegionBox, RegionLabel, WordBox, exchange,
    load_file, save_file,
};
use translatable::overlay::{OverlayFont, OverlayStyle};
use translatable::pipeline::{OutputPaths, merge_with, parse_with, translate_layout};
use translatable::providers::{Provider, ProviderFuture};
use translatable::Translator;

struct TwoPageRasterizer;

impl Rasterizer for TwoPageRasterizer {
    fn rasterize(&self, _pdf: &Path, out_dir: &Path) -> Result<Vec<PageImage>> {
        Ok((0..2)
            .map(|index| PageImage {
                index,
                path: out_dir.join(format!("page-{}.png", index + 1)),
                width: 612,
                height: 792,
            })
            .collect())
    }
}

/// Two columns of twelve words each, at the same height.
struct ColumnWords;

impl WordExtractor for ColumnWords {
    fn extract(&self, _pdf: &Path) -> Result<Vec<PageWords>> {
        let mut words = Vec::new();
        for (column, x0) in [(0, 320.0f32), (1, 40.0f32)] {
            for idx in 0..12 {
                let x = x0 + (idx % 6) as f32 * 40.0;
                let y = 100.0 + (idx / 6) as f32 * 14.0;
                words.push(WordBox::new(
                    BBox::new(x, y, x + 30.0, y + 10.0),
                    format!("c{}w{}", column, idx),
                ));
            }
        }
        Ok((0..2)
            .map(|_| PageWords {
                size: PointSize {
                    width: 612.0,
                    height: 792.0,
                },
                words: words.clone(),
            })
            .collect())
    }
}

struct TwoColumnDetector;

impl Detector for TwoColumnDetector {
    fn detect(&self, _page: &PageImage) -> Result<Vec<RegionBox>, PipelineError> {
        Ok(vec![
            RegionBox::new(BBox::new(310.0, 90.0, 580.0, 130.0), RegionLabel::Text, 0.92),
            RegionBox::new(BBox::new(30.0, 90.0, 290.0, 130.0), RegionLabel::Text, 0.88),
            RegionBox::new(BBox::new(30.0, 400.0, 580.0, 700.0), RegionLabel::Figure, 0.99),
        ])
    }
}

struct Prefixing;

impl Provider for Prefixing {
    fn name(&self) -> &'static str {
        "Prefixing"
    }

    fn batch_limit(&self) -> Option<usize> {
        Some(3)
    }

    fn translate(&self, texts: Vec<String>) -> ProviderFuture<'_> {
        Box::pin(async move {
            Ok(texts
                .into_iter()
                .map(|text| format!("訳 {}", text))
                .collect())
        })
    }
}

fn parse_fixture() -> LayoutDocument {
    let dir = tempfile::tempdir().expect("tempdir");
    parse_with(
        Path::new("paper.pdf"),
        &TwoPageRasterizer,
        &ColumnWords,
        &TwoColumnDetector,
        &AssembleOptions::default(),
        dir.path(),
    )
    .expect("parse")
}

fn write_pdf(path: &Path, pages: usize) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font },
    });
    let kids: Vec<Object> = (0..pages)
        .map(|_| {
            let content = doc.add_object(Stream::new(
                dictionary! {},
                b"BT /F1 10 Tf 40 680 Td (source) Tj ET".to_vec(),
            ));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content,
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        }),
    );
    let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog);
    doc.save(path).expect("save pdf");
}

#[test]
fn columns_are_read_left_to_right() {
    let doc = parse_fixture();
    assert_eq!(doc.pages().len(), 2);
    let texts: Vec<&str> = doc.pages()[0]
        .paragraphs()
        .iter()
        .map(|paragraph| paragraph.text())
        .collect();
    assert_eq!(texts.len(), 2);
    assert!(texts[0].starts_with("c1w0 c1w1"));
    assert!(texts[1].starts_with("c0w0 c0w1"));
    assert_eq!(doc.paragraph_count(), 4);
}

#[test]
fn text_exchange_replaces_paragraphs_in_place() {
    let doc = parse_fixture();
    let edited = exchange::to_text(&doc).replace("c0w", "右").replace("c1w", "左");
    let updated = exchange::from_text(&edited, doc.clone()).expect("from text");
    assert!(updated.pages()[0].paragraphs()[0].text().starts_with("左0"));
    assert_eq!(
        updated.pages()[1].paragraphs()[1].bbox(),
        doc.pages()[1].paragraphs()[1].bbox()
    );

    let dropped_page = edited
        .splitn(2, exchange::PAGE_SEPARATOR)
        .next()
        .map(|first| format!("{}{}\n", first, exchange::PAGE_SEPARATOR))
        .expect("first page");
    let err = exchange::from_text(&dropped_page, doc).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MismatchedPageCount {
            expected: 2,
            actual: 1
        }
    ));
}

#[tokio::test]
async fn parse_translate_and_merge_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pdf = dir.path().join("paper.pdf");
    write_pdf(&pdf, 2);
    let paths = OutputPaths::for_input(&pdf, "ja");

    let source = parse_fixture();
    save_file(&source, &paths.layout_source).expect("save source layout");

    let translator = Translator::new(Prefixing);
    let translated = translate_layout(&translator, load_file(&paths.layout_source).expect("load"))
        .await
        .expect("translate");
    assert_eq!(translated.paragraph_count(), source.paragraph_count());
    for (before, after) in source.pages().iter().zip(translated.pages()) {
        for (a, b) in before.paragraphs().iter().zip(after.paragraphs()) {
            assert_eq!(b.text(), format!("訳 {}", a.text()));
            assert_eq!(a.bbox(), b.bbox());
        }
    }
    save_file(&translated, &paths.layout_translated).expect("save translated layout");

    merge_with(
        &pdf,
        &translated,
        &OverlayStyle::default(),
        &OverlayFont::Builtin,
        &paths,
    )
    .expect("merge");

    let output = Document::load(&paths.translated).expect("load translated");
    let pages = output.get_pages();
    assert_eq!(pages.len(), 2);
    let content = output.get_page_content(pages[&1]).expect("content");
    let content = String::from_utf8_lossy(&content);
    assert!(content.contains("/FTrans"));
    assert!(content.contains("source"));
    assert_eq!(Document::load(&paths.bilingual).unwrap().get_pages().len(), 4);
    assert_eq!(Document::load(&paths.print_ready).unwrap().get_pages().len(), 5);
}
