use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::layout::AssembleOptions;

#[derive(Debug, Clone)]
pub struct Settings {
    pub dpi: u32,
    pub column_divisor: u32,
    pub coalesce_threshold: f32,
    pub min_words: usize,
    pub detector_command: Vec<String>,
    pub detector_min_score: f32,
    pub overlay_font_size: f32,
    pub overlay_min_font_size: f32,
    pub overlay_padding_x: f32,
    pub overlay_padding_y: f32,
    pub overlay_overflow_scale: f32,
    pub overlay_first_line_indent: bool,
    pub overlay_font_path: Option<String>,
    pub overlay_font_family: Option<String>,
    pub overlay_fonts_dir: String,
    pub overlay_fill_color: String,
    pub overlay_text_color: String,
    pub translation_backend: String,
    pub target_lang: String,
    pub source_lang: Option<String>,
    pub formality: Option<String>,
    pub model: Option<String>,
    pub output_suffix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dpi: 72,
            column_divisor: 4,
            coalesce_threshold: 1.0,
            min_words: 10,
            detector_command: Vec::new(),
            detector_min_score: 0.7,
            overlay_font_size: 20.0,
            overlay_min_font_size: 4.0,
            overlay_padding_x: 5.0,
            overlay_padding_y: 0.0,
            overlay_overflow_scale: 1.5,
            overlay_first_line_indent: true,
            overlay_font_path: None,
            overlay_font_family: None,
            overlay_fonts_dir: "fonts".to_string(),
            overlay_fill_color: "#ffffff".to_string(),
            overlay_text_color: "#000000".to_string(),
            translation_backend: "deepl".to_string(),
            target_lang: "JA".to_string(),
            source_lang: None,
            formality: Some("more".to_string()),
            model: None,
            output_suffix: "ja".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    layout: Option<LayoutSettings>,
    detector: Option<DetectorSettings>,
    overlay: Option<OverlaySettings>,
    translation: Option<TranslationSettings>,
    output: Option<OutputSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSettings {
    dpi: Option<u32>,
    column_divisor: Option<u32>,
    coalesce_threshold: Option<f32>,
    min_words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorSettings {
    command: Option<Vec<String>>,
    min_score: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_size: Option<f32>,
    min_font_size: Option<f32>,
    padding_x: Option<f32>,
    padding_y: Option<f32>,
    overflow_scale: Option<f32>,
    first_line_indent: Option<bool>,
    font_path: Option<String>,
    font_family: Option<String>,
    fonts_dir: Option<String>,
    fill_color: Option<String>,
    text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslationSettings {
    backend: Option<String>,
    target_lang: Option<String>,
    source_lang: Option<String>,
    formality: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    suffix: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings.merge_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn assemble_options(&self) -> AssembleOptions {
        AssembleOptions {
            column_divisor: self.column_divisor,
            coalesce_threshold: self.coalesce_threshold,
            min_words: self.min_words,
        }
    }

    /// Overlays one TOML document on top of the current values.
    pub fn merge_str(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed);
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(layout) = incoming.layout {
            if let Some(dpi) = layout.dpi.filter(|dpi| *dpi > 0) {
                self.dpi = dpi;
            }
            if let Some(divisor) = layout.column_divisor.filter(|value| *value > 0) {
                self.column_divisor = divisor;
            }
            if let Some(threshold) = layout.coalesce_threshold.filter(|value| *value >= 0.0) {
                self.coalesce_threshold = threshold;
            }
            if let Some(min_words) = layout.min_words {
                self.min_words = min_words;
            }
        }
        if let Some(detector) = incoming.detector {
            if let Some(command) = detector.command {
                if command.first().is_some_and(|program| !program.trim().is_empty()) {
                    self.detector_command = command;
                }
            }
            if let Some(score) = detector.min_score.filter(|value| *value >= 0.0) {
                self.detector_min_score = score;
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(size) = overlay.font_size.filter(|value| *value > 0.0) {
                self.overlay_font_size = size;
            }
            if let Some(size) = overlay.min_font_size.filter(|value| *value > 0.0) {
                self.overlay_min_font_size = size;
            }
            if let Some(padding) = overlay.padding_x.filter(|value| *value >= 0.0) {
                self.overlay_padding_x = padding;
            }
            if let Some(padding) = overlay.padding_y.filter(|value| *value >= 0.0) {
                self.overlay_padding_y = padding;
            }
            if let Some(scale) = overlay.overflow_scale.filter(|value| *value >= 1.0) {
                self.overlay_overflow_scale = scale;
            }
            if let Some(indent) = overlay.first_line_indent {
                self.overlay_first_line_indent = indent;
            }
            if let Some(path) = non_blank(overlay.font_path) {
                self.overlay_font_path = Some(path);
            }
            if let Some(family) = non_blank(overlay.font_family) {
                self.overlay_font_family = Some(family);
            }
            if let Some(dir) = non_blank(overlay.fonts_dir) {
                self.overlay_fonts_dir = dir;
            }
            if let Some(color) = non_blank(overlay.fill_color) {
                self.overlay_fill_color = color;
            }
            if let Some(color) = non_blank(overlay.text_color) {
                self.overlay_text_color = color;
            }
        }
        if let Some(translation) = incoming.translation {
            if let Some(backend) = non_blank(translation.backend) {
                self.translation_backend = backend;
            }
            if let Some(lang) = non_blank(translation.target_lang) {
                self.target_lang = lang;
            }
            if let Some(lang) = non_blank(translation.source_lang) {
                self.source_lang = Some(lang);
            }
            if let Some(formality) = translation.formality {
                let formality = formality.trim();
                self.formality = if formality.is_empty() || formality == "default" {
                    None
                } else {
                    Some(formality.to_string())
                };
            }
            if let Some(model) = non_blank(translation.model) {
                self.model = Some(model);
            }
        }
        if let Some(output) = incoming.output {
            if let Some(suffix) = non_blank(output.suffix) {
                self.output_suffix = suffix;
            }
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".translatable"))
        }
    })
}
