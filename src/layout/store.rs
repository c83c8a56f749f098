use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::LayoutDocument;
use crate::error::PipelineError;

/// Serializes the document as pretty JSON.
pub fn save(doc: &LayoutDocument) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec_pretty(doc).with_context(|| "failed to serialize layout")?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn load(bytes: &[u8]) -> Result<LayoutDocument, PipelineError> {
    let doc: LayoutDocument = serde_json::from_slice(bytes)
        .map_err(|err| PipelineError::MalformedLayoutFile(err.to_string()))?;
    validate(&doc)?;
    Ok(doc)
}

pub fn save_file(doc: &LayoutDocument, path: &Path) -> Result<()> {
    let bytes = save(doc)?;
    fs::write(path, bytes).with_context(|| format!("failed to write layout: {}", path.display()))
}

pub fn load_file(path: &Path) -> Result<LayoutDocument> {
    let bytes =
        fs::read(path).with_context(|| format!("failed to read layout: {}", path.display()))?;
    let doc = load(&bytes).with_context(|| format!("invalid layout: {}", path.display()))?;
    Ok(doc)
}

fn validate(doc: &LayoutDocument) -> Result<(), PipelineError> {
    for (position, page) in doc.pages().iter().enumerate() {
        if page.index() != position {
            return Err(malformed(format!(
                "page at position {} has index {}",
                position,
                page.index()
            )));
        }
        let raster = page.raster();
        if raster.width == 0 || raster.height == 0 {
            return Err(malformed(format!("page {} has an empty raster size", position)));
        }
        let pdf = page.pdf();
        if !(pdf.width.is_finite() && pdf.height.is_finite() && pdf.width > 0.0 && pdf.height > 0.0)
        {
            return Err(malformed(format!("page {} has an invalid point size", position)));
        }
        for (idx, paragraph) in page.paragraphs().iter().enumerate() {
            if !paragraph.bbox().is_valid() {
                return Err(malformed(format!(
                    "page {} paragraph {} has an inverted or non-finite bbox",
                    position, idx
                )));
            }
            let score = paragraph.source_region_score();
            if !(0.0..=1.0).contains(&score) {
                return Err(malformed(format!(
                    "page {} paragraph {} has score {} outside 0..1",
                    position, idx, score
                )));
            }
        }
    }
    Ok(())
}

fn malformed(message: String) -> PipelineError {
    PipelineError::MalformedLayoutFile(message)
}
