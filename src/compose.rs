//! Composites overlay layers onto the source PDF and assembles the output
//! variants.

use anyhow::{Context, Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::overlay::{FONT_RESOURCE, OverlayFont, OverlayLayer};

const INHERITABLE_KEYS: [&str; 4] = ["Resources", "MediaBox", "CropBox", "Rotate"];
const MAX_TREE_DEPTH: usize = 32;
const LETTER: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// The three output variants built from one source document.
#[derive(Debug, Clone)]
pub struct ComposedDocuments {
    /// Every source page with its overlay on top.
    pub translated: Document,
    /// Source and translated pages alternating.
    pub bilingual: Document,
    /// `bilingual` behind one blank page sized like the first page.
    pub print_ready: Document,
    /// Zero-based indices of pages passed through without their overlay.
    pub failed_pages: Vec<usize>,
}

/// Overlays `layers[i]` onto page `i` of `source`.
///
/// A page that cannot be composited is logged and passed through unchanged;
/// only a layer count that differs from the page count aborts.
pub fn compose(
    source: &Document,
    layers: &[OverlayLayer],
    font: &OverlayFont,
) -> Result<ComposedDocuments> {
    let page_ids: Vec<ObjectId> = source.get_pages().into_values().collect();
    if page_ids.len() != layers.len() {
        return Err(PipelineError::MismatchedPageCount {
            expected: page_ids.len(),
            actual: layers.len(),
        }
        .into());
    }

    let mut pool = source.clone();
    let codes: BTreeSet<u16> = layers
        .iter()
        .flat_map(|layer| layer.codes().iter().copied())
        .collect();
    let font_id = font
        .install(&mut pool, &codes)
        .with_context(|| format!("failed to install font {}", font.name()))?;

    let mut originals = Vec::with_capacity(page_ids.len());
    let mut translated = Vec::with_capacity(page_ids.len());
    let mut failed_pages = Vec::new();
    for (index, (&page_id, layer)) in page_ids.iter().zip(layers).enumerate() {
        if let Err(err) = materialize_inherited(&mut pool, page_id) {
            debug!("page {}: inherited attributes unavailable: {:#}", index + 1, err);
        }
        let composed = match overlay_page(&mut pool, page_id, layer, font_id) {
            Ok(id) => id,
            Err(err) => {
                let failure = PipelineError::CompositionFailure {
                    page: index,
                    message: format!("{err:#}"),
                };
                warn!("{}; passing the original page through", failure);
                failed_pages.push(index);
                duplicate_page(&mut pool, page_id)
                    .with_context(|| format!("page {} is not a page dictionary", index + 1))?
            }
        };
        originals.push(page_id);
        translated.push(composed);
    }

    let first_media_box = originals
        .first()
        .and_then(|id| pool.get_dictionary(*id).ok())
        .and_then(|page| page.get(b"MediaBox").ok().cloned())
        .unwrap_or_else(|| number_array(&LETTER));
    let mut blank = Dictionary::new();
    blank.set("Type", Object::Name(b"Page".to_vec()));
    blank.set("MediaBox", first_media_box);
    blank.set("Resources", Dictionary::new());
    let blank_id = pool.add_object(blank);

    let bilingual: Vec<ObjectId> = originals
        .iter()
        .zip(&translated)
        .flat_map(|(original, composed)| [*original, *composed])
        .collect();
    let print_ready: Vec<ObjectId> = std::iter::once(blank_id)
        .chain(bilingual.iter().copied())
        .collect();

    info!("composed {} pages", translated.len());
    Ok(ComposedDocuments {
        translated: with_pages(&pool, &translated)?,
        bilingual: with_pages(&pool, &bilingual)?,
        print_ready: with_pages(&pool, &print_ready)?,
        failed_pages,
    })
}

pub fn save_document(doc: &mut Document, path: &Path) -> Result<()> {
    doc.compress();
    doc.save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn load_document(path: &Path) -> Result<Document> {
    Document::load(path).with_context(|| format!("failed to read pdf {}", path.display()))
}

/// Copies inheritable attributes from ancestor page-tree nodes onto the page,
/// so the page keeps them when re-parented.
fn materialize_inherited(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| anyhow!("page object unreadable: {}", err))?;
    let mut missing: Vec<&str> = INHERITABLE_KEYS
        .iter()
        .copied()
        .filter(|key| !page.has(key.as_bytes()))
        .collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;
    while let Some(node_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Ok(node) = doc.get_dictionary(node_id) else {
            break;
        };
        missing.retain(|key| match node.get(key.as_bytes()) {
            Ok(value) => {
                found.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    let page = doc
        .get_dictionary_mut(page_id)
        .map_err(|err| anyhow!("page object unreadable: {}", err))?;
    for (key, value) in found {
        page.set(key, value);
    }
    if !page.has(b"MediaBox") {
        page.set("MediaBox", number_array(&LETTER));
    }
    if !page.has(b"Resources") {
        page.set("Resources", Dictionary::new());
    }
    Ok(())
}

/// Adds a copy of `page_id` with the overlay drawn over its content.
///
/// The original content is wrapped in `q`/`Q` so its graphics state cannot
/// leak into the overlay.
fn overlay_page(
    doc: &mut Document,
    page_id: ObjectId,
    layer: &OverlayLayer,
    font_id: ObjectId,
) -> Result<ObjectId> {
    let mut page = doc
        .get_dictionary(page_id)
        .map_err(|err| anyhow!("page object unreadable: {}", err))?
        .clone();
    if layer.is_empty() {
        return Ok(doc.add_object(page));
    }

    let media_box = page
        .get(b"MediaBox")
        .map_err(|_| anyhow!("page has no MediaBox"))
        .and_then(|value| parse_rect(doc, value))?;
    let mut resources = resolved_dictionary(doc, page.get(b"Resources").ok())?;
    let mut fonts = resolved_dictionary(doc, resources.get(b"Font").ok())?;
    fonts.set(FONT_RESOURCE, Object::Reference(font_id));
    resources.set("Font", fonts);
    let existing = content_refs(doc, &page)?;

    let size = layer.size();
    let sx = (media_box[2] - media_box[0]) / size.width.max(1.0);
    let sy = (media_box[3] - media_box[1]) / size.height.max(1.0);
    let mut overlay = format!(
        "q\n{} 0 0 {} {} {} cm\n",
        sx, sy, media_box[0], media_box[1]
    )
    .into_bytes();
    overlay.extend(layer.encode()?);
    overlay.extend_from_slice(b"\nQ\n");

    let open_id = doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
    let close_id = doc.add_object(Stream::new(Dictionary::new(), b"\nQ\n".to_vec()));
    let overlay_id = doc.add_object(Stream::new(Dictionary::new(), overlay));

    let mut contents = Vec::with_capacity(existing.len() + 3);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(close_id));
    contents.push(Object::Reference(overlay_id));
    page.set("Contents", contents);
    page.set("Resources", resources);
    Ok(doc.add_object(page))
}

fn duplicate_page(doc: &mut Document, page_id: ObjectId) -> Result<ObjectId> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|err| anyhow!("{}", err))?
        .clone();
    Ok(doc.add_object(page))
}

/// A copy of `pool` whose page tree holds exactly `kids`, in order.
fn with_pages(pool: &Document, kids: &[ObjectId]) -> Result<Document> {
    let mut doc = pool.clone();
    let pages_id = doc
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|err| anyhow!("document has no page tree: {}", err))?;
    for kid in kids {
        doc.get_dictionary_mut(*kid)
            .map_err(|err| anyhow!("{}", err))?
            .set("Parent", Object::Reference(pages_id));
    }
    let root = doc
        .get_dictionary_mut(pages_id)
        .map_err(|err| anyhow!("page tree root unreadable: {}", err))?;
    root.set(
        "Kids",
        kids.iter()
            .map(|id| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    root.set("Count", kids.len() as i64);
    doc.prune_objects();
    Ok(doc)
}

fn resolve<'a>(doc: &'a Document, value: &'a Object) -> Result<&'a Object> {
    match value {
        Object::Reference(id) => doc
            .get_object(*id)
            .map_err(|err| anyhow!("dangling reference {:?}: {}", id, err)),
        other => Ok(other),
    }
}

fn resolved_dictionary(doc: &Document, value: Option<&Object>) -> Result<Dictionary> {
    match value {
        None => Ok(Dictionary::new()),
        Some(value) => match resolve(doc, value)? {
            Object::Dictionary(dict) => Ok(dict.clone()),
            other => Err(anyhow!("expected a dictionary, found {}", kind(other))),
        },
    }
}

fn content_refs(doc: &Document, page: &Dictionary) -> Result<Vec<Object>> {
    match page.get(b"Contents") {
        Err(_) => Ok(Vec::new()),
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => Ok(items.clone()),
            Ok(_) => Ok(vec![Object::Reference(*id)]),
            Err(err) => Err(anyhow!("page contents unreadable: {}", err)),
        },
        Ok(Object::Array(items)) => Ok(items.clone()),
        Ok(other) => Err(anyhow!("unsupported page contents entry: {}", kind(other))),
    }
}

fn parse_rect(doc: &Document, value: &Object) -> Result<[f32; 4]> {
    let Object::Array(items) = resolve(doc, value)? else {
        return Err(anyhow!("MediaBox is not an array"));
    };
    let numbers: Vec<f32> = items
        .iter()
        .filter_map(|item| match resolve(doc, item).ok()? {
            Object::Integer(value) => Some(*value as f32),
            Object::Real(value) => Some(*value),
            _ => None,
        })
        .collect();
    match numbers.as_slice() {
        [x1, y1, x2, y2] => Ok([x1.min(*x2), y1.min(*y2), x1.max(*x2), y1.max(*y2)]),
        _ => Err(anyhow!("MediaBox must hold four numbers")),
    }
}

fn kind(value: &Object) -> &'static str {
    match value {
        Object::Null => "null",
        Object::Boolean(_) => "boolean",
        Object::Integer(_) => "integer",
        Object::Real(_) => "real",
        Object::Name(_) => "name",
        Object::String(..) => "string",
        Object::Array(_) => "array",
        Object::Dictionary(_) => "dictionary",
        Object::Stream(_) => "stream",
        Object::Reference(_) => "reference",
    }
}

fn number_array(values: &[f32]) -> Object {
    Object::Array(values.iter().map(|value| Object::Real(*value)).collect())
}
