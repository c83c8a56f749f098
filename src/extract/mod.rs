//! Collaborators that turn a PDF into page images, positioned words and
//! detected layout regions.

use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PipelineError;
use crate::layout::{PointSize, RegionBox, WordBox};

mod detector;
mod raster;
mod words;

pub use detector::CommandDetector;
pub use raster::PopplerRasterizer;
pub use words::PopplerWordExtractor;

/// A rendered page on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct PageImage {
    pub index: usize,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Positioned words of one page, in PDF points with a top-left origin.
#[derive(Debug, Clone, PartialEq)]
pub struct PageWords {
    pub size: PointSize,
    pub words: Vec<WordBox>,
}

pub trait Rasterizer {
    /// Renders every page of `pdf` into `out_dir`, in page order.
    fn rasterize(&self, pdf: &Path, out_dir: &Path) -> Result<Vec<PageImage>>;
}

pub trait WordExtractor {
    fn extract(&self, pdf: &Path) -> Result<Vec<PageWords>>;
}

pub trait Detector {
    fn detect(&self, page: &PageImage) -> Result<Vec<RegionBox>, PipelineError>;
}

pub(crate) fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }
    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };
    env::split_paths(&path_var).any(|dir| is_executable(&dir.join(cmd)))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Runs `command` and returns its stdout, failing on a non-zero exit.
pub(crate) fn run_capture(command: &mut Command, name: &str) -> Result<Vec<u8>> {
    let output = command
        .output()
        .with_context(|| format!("failed to run {} (is it installed?)", name))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{} failed: {}", name, stderr.trim()));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_commands_are_reported() {
        assert!(!command_exists("definitely-not-a-real-command-xyz"));
        let err = run_capture(
            &mut Command::new("definitely-not-a-real-command-xyz"),
            "fake",
        )
        .unwrap_err();
        assert!(err.to_string().contains("failed to run fake"));
    }
}
