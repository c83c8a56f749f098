use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{PageImage, Rasterizer, command_exists, run_capture};

const PAGE_PREFIX: &str = "page";

/// Renders pages with poppler's `pdftoppm`, or `mutool draw` when poppler is
/// missing.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    dpi: u32,
}

impl PopplerRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi: dpi.max(1) }
    }

    pub fn dpi(&self) -> u32 {
        self.dpi
    }
}

impl Rasterizer for PopplerRasterizer {
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PageImage>> {
        let dpi = self.dpi.to_string();
        if command_exists("pdftoppm") {
            run_capture(
                Command::new("pdftoppm")
                    .arg("-png")
                    .arg("-r")
                    .arg(&dpi)
                    .arg(pdf)
                    .arg(out_dir.join(PAGE_PREFIX)),
                "pdftoppm",
            )?;
        } else if command_exists("mutool") {
            run_capture(
                Command::new("mutool")
                    .arg("draw")
                    .arg("-r")
                    .arg(&dpi)
                    .arg("-o")
                    .arg(out_dir.join(format!("{}-%d.png", PAGE_PREFIX)))
                    .arg(pdf),
                "mutool",
            )?;
        } else {
            return Err(anyhow!(
                "pdf rendering requires pdftoppm or mutool (install poppler or mupdf)"
            ));
        }

        let mut rendered: Vec<(usize, PathBuf)> = fs::read_dir(out_dir)
            .with_context(|| format!("failed to read {}", out_dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter_map(|path| page_number(&path).map(|number| (number, path)))
            .collect();
        rendered.sort_by_key(|(number, _)| *number);

        let mut pages = Vec::with_capacity(rendered.len());
        for (index, (_, path)) in rendered.into_iter().enumerate() {
            let (width, height) = image::image_dimensions(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            debug!("rendered page {} at {}x{}", index + 1, width, height);
            pages.push(PageImage {
                index,
                path,
                width,
                height,
            });
        }
        Ok(pages)
    }
}

/// One-based page number from `page-7.png` or zero-padded `page-007.png`.
fn page_number(path: &Path) -> Option<usize> {
    let ext = path.extension()?.to_str()?;
    if !ext.eq_ignore_ascii_case("png") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let digits = stem.strip_prefix(PAGE_PREFIX)?.strip_prefix('-')?;
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_numbers_sort_numerically() {
        assert_eq!(page_number(Path::new("/tmp/page-07.png")), Some(7));
        assert_eq!(page_number(Path::new("page-12.png")), Some(12));
        assert_eq!(page_number(Path::new("page-1.ppm")), None);
        assert_eq!(page_number(Path::new("cover-1.png")), None);
    }

    #[test]
    fn dpi_is_never_zero() {
        assert_eq!(PopplerRasterizer::new(0).dpi(), 1);
    }
}
