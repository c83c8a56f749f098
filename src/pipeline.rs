//! Stage orchestration: parse, translate, merge and the output file layout.

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::compose::{compose, load_document, save_document};
use crate::extract::{
    CommandDetector, Detector, PopplerRasterizer, PopplerWordExtractor, Rasterizer, WordExtractor,
};
use crate::layout::geom::scale;
use crate::layout::{
    AssembleOptions, LayoutDocument, Page, RasterSize, WordBox, assemble, save_file,
};
use crate::overlay::{OverlayFont, OverlayLayer, OverlayStyle, render_overlay, resolve_overlay_font};
use crate::providers::{
    DeepL, DeepLUsage, Provider, ProviderImpl, ProviderKind, TranslateOptions, build_provider,
    resolve_key,
};
use crate::settings::Settings;
use crate::translator::Translator;

/// Files written next to the input PDF.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub translated: PathBuf,
    pub bilingual: PathBuf,
    pub print_ready: PathBuf,
    pub layout_source: PathBuf,
    pub layout_translated: PathBuf,
}

impl OutputPaths {
    pub fn for_input(pdf: &Path, suffix: &str) -> Self {
        let stem = pdf
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let dir = pdf.parent().unwrap_or_else(|| Path::new(""));
        let named = |name: String| dir.join(name);
        Self {
            translated: named(format!("{}_{}.pdf", stem, suffix)),
            bilingual: named(format!("{}_al.pdf", stem)),
            print_ready: named(format!("{}_pr.pdf", stem)),
            layout_source: named(format!("{}_layout_en.json", stem)),
            layout_translated: named(format!("{}_layout_{}.json", stem, suffix)),
        }
    }
}

/// Builds the layout of `pdf` from its page images, words and detected regions.
///
/// Words arrive in PDF points and are scaled into raster pixels before
/// assembly, so every box in the result shares the raster's coordinate space.
pub fn parse_with(
    pdf: &Path,
    rasterizer: &dyn Rasterizer,
    extractor: &dyn WordExtractor,
    detector: &dyn Detector,
    options: &AssembleOptions,
    work_dir: &Path,
) -> Result<LayoutDocument> {
    let images = rasterizer
        .rasterize(pdf, work_dir)
        .with_context(|| format!("failed to rasterize {}", pdf.display()))?;
    let page_words = extractor
        .extract(pdf)
        .with_context(|| format!("failed to extract words from {}", pdf.display()))?;
    if images.len() != page_words.len() {
        return Err(anyhow!(
            "rasterizer produced {} pages but word extraction found {}",
            images.len(),
            page_words.len()
        ));
    }

    let mut pages = Vec::with_capacity(images.len());
    for (image, words) in images.iter().zip(page_words) {
        let sx = image.width as f32 / words.size.width;
        let sy = image.height as f32 / words.size.height;
        let scaled: Vec<WordBox> = words
            .words
            .into_iter()
            .map(|word| {
                let bbox = scale(&word.bbox(), sx, sy);
                word.moved_to(bbox)
            })
            .collect();
        let regions = detector
            .detect(image)
            .with_context(|| format!("detection stage failed on page {}", image.index + 1))?;
        let paragraphs = assemble(&regions, &scaled, image.width, image.height, options);
        info!(
            "page {}: {} regions, {} words, {} paragraphs",
            image.index + 1,
            regions.len(),
            scaled.len(),
            paragraphs.len()
        );
        pages.push(Page::new(
            image.index,
            RasterSize {
                width: image.width,
                height: image.height,
            },
            words.size,
            paragraphs,
        ));
    }
    Ok(LayoutDocument::new(pages))
}

/// Parses `pdf` with the poppler tools and the configured detector command.
pub fn parse(pdf: &Path, settings: &Settings) -> Result<LayoutDocument> {
    let detector = CommandDetector::new(&settings.detector_command, settings.detector_min_score)
        .ok_or_else(|| anyhow!("no layout detector configured (set [detector] command)"))?;
    let work_dir = tempfile::tempdir().with_context(|| "failed to create raster directory")?;
    parse_with(
        pdf,
        &PopplerRasterizer::new(settings.dpi),
        &PopplerWordExtractor,
        &detector,
        &settings.assemble_options(),
        work_dir.path(),
    )
}

pub fn translate_options(settings: &Settings) -> TranslateOptions {
    TranslateOptions {
        target_lang: settings.target_lang.clone(),
        source_lang: settings.source_lang.clone(),
        formality: settings.formality.clone(),
        model: settings.model.clone(),
    }
}

/// Builds the translator for `backend` (or the configured backend).
pub fn build_translator(
    settings: &Settings,
    backend: Option<&str>,
    key: Option<&str>,
) -> Result<Translator<ProviderImpl>> {
    let kind = ProviderKind::parse(backend.unwrap_or(&settings.translation_backend))?;
    let key = resolve_key(kind, key)?;
    Ok(Translator::new(build_provider(
        kind,
        key,
        translate_options(settings),
    )))
}

pub async fn translate_layout<P: Provider>(
    translator: &Translator<P>,
    doc: LayoutDocument,
) -> Result<LayoutDocument> {
    info!(
        "translating {} paragraphs ({} characters) with {}",
        doc.paragraph_count(),
        doc.char_count(),
        translator.provider().name()
    );
    translator
        .translate(doc)
        .await
        .with_context(|| "translation stage failed")
}

pub fn render_layers(
    doc: &LayoutDocument,
    style: &OverlayStyle,
    font: &OverlayFont,
) -> Vec<OverlayLayer> {
    doc.pages()
        .iter()
        .map(|page| render_overlay(page, style, font))
        .collect()
}

/// Outcome of a merge: the written files and the pages left untranslated.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub paths: OutputPaths,
    /// Zero-based indices of pages whose overlay could not be composited.
    pub failed_pages: Vec<usize>,
}

/// Overlays `doc` onto `pdf` and writes the three output PDFs.
///
/// Returns the pages that were passed through without their overlay.
pub fn merge_with(
    pdf: &Path,
    doc: &LayoutDocument,
    style: &OverlayStyle,
    font: &OverlayFont,
    paths: &OutputPaths,
) -> Result<Vec<usize>> {
    let source = load_document(pdf)?;
    let layers = render_layers(doc, style, font);
    let mut composed = compose(&source, &layers, font)
        .with_context(|| format!("composition stage failed for {}", pdf.display()))?;
    save_document(&mut composed.translated, &paths.translated)?;
    save_document(&mut composed.bilingual, &paths.bilingual)?;
    save_document(&mut composed.print_ready, &paths.print_ready)?;
    info!(
        "wrote {}, {} and {}",
        paths.translated.display(),
        paths.bilingual.display(),
        paths.print_ready.display()
    );
    Ok(composed.failed_pages)
}

pub fn resolve_font(settings: &Settings) -> Result<OverlayFont> {
    resolve_overlay_font(
        settings.overlay_font_path.as_deref().map(Path::new),
        settings.overlay_font_family.as_deref(),
        Some(Path::new(&settings.overlay_fonts_dir)),
    )
    .with_context(|| "failed to load overlay font")
}

pub fn merge(pdf: &Path, doc: &LayoutDocument, settings: &Settings) -> Result<MergeReport> {
    let style = OverlayStyle::from_settings(settings)?;
    let font = resolve_font(settings)?;
    let paths = OutputPaths::for_input(pdf, &settings.output_suffix);
    let failed_pages = merge_with(pdf, doc, &style, &font, &paths)?;
    Ok(MergeReport {
        paths,
        failed_pages,
    })
}

/// Parse, translate and merge in one go.
pub async fn run_all<P: Provider>(
    pdf: &Path,
    settings: &Settings,
    translator: &Translator<P>,
    keep_auxiliary: bool,
) -> Result<MergeReport> {
    let paths = OutputPaths::for_input(pdf, &settings.output_suffix);
    let source = parse(pdf, settings)?;
    if keep_auxiliary {
        save_file(&source, &paths.layout_source)?;
    }
    let translated = translate_layout(translator, source).await?;
    if keep_auxiliary {
        save_file(&translated, &paths.layout_translated)?;
    }
    let style = OverlayStyle::from_settings(settings)?;
    let font = resolve_font(settings)?;
    let failed_pages = merge_with(pdf, &translated, &style, &font, &paths)?;
    Ok(MergeReport {
        paths,
        failed_pages,
    })
}

/// Character usage of the DeepL account behind `key`.
pub async fn usage(settings: &Settings, key: Option<&str>) -> Result<DeepLUsage> {
    let key = resolve_key(ProviderKind::DeepL, key)?;
    DeepL::new(key, translate_options(settings)).usage().await
}
