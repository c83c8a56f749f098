use serde::Deserialize;
use std::process::Command;
use tracing::debug;

use super::{Detector, PageImage, run_capture};
use crate::error::PipelineError;
use crate::layout::{BBox, RegionBox, RegionLabel};

/// Runs an external layout detector once per page image.
///
/// The configured program receives the image path as its last argument and
/// prints a JSON array of `{"bbox": [x1, y1, x2, y2], "label": "Text",
/// "score": 0.93}` records in raster pixels.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    min_score: f32,
}

#[derive(Debug, Deserialize)]
struct Detection {
    bbox: [f32; 4],
    label: LabelValue,
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LabelValue {
    Name(String),
    Id(u32),
}

impl CommandDetector {
    pub fn new(command: &[String], min_score: f32) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            min_score,
        })
    }
}

impl Detector for CommandDetector {
    fn detect(&self, page: &PageImage) -> Result<Vec<RegionBox>, PipelineError> {
        let failure = |message: String| PipelineError::DetectionFailure {
            page: page.index,
            message,
        };
        let stdout = run_capture(
            Command::new(&self.program).args(&self.args).arg(&page.path),
            &self.program,
        )
        .map_err(|err| failure(format!("{err:#}")))?;
        let regions = parse_detections(&stdout, self.min_score).map_err(failure)?;
        debug!("page {}: {} regions detected", page.index + 1, regions.len());
        Ok(regions)
    }
}

/// Decodes detector output, dropping low-confidence and unknown-label regions.
pub(crate) fn parse_detections(raw: &[u8], min_score: f32) -> Result<Vec<RegionBox>, String> {
    let detections: Vec<Detection> = serde_json::from_slice(raw)
        .map_err(|err| format!("detector output is not a detection list: {}", err))?;
    let mut regions = Vec::with_capacity(detections.len());
    for detection in detections {
        let label = match &detection.label {
            LabelValue::Name(name) => RegionLabel::parse(name),
            LabelValue::Id(id) => RegionLabel::parse(&id.to_string()),
        };
        let Some(label) = label else {
            debug!("skipping region with unknown label {:?}", detection.label);
            continue;
        };
        let bbox = BBox::from(detection.bbox);
        if !bbox.is_valid() {
            return Err(format!("detector returned an invalid box {:?}", detection.bbox));
        }
        if !(0.0..=1.0).contains(&detection.score) {
            return Err(format!(
                "detector returned score {} outside 0..1",
                detection.score
            ));
        }
        if detection.score < min_score {
            continue;
        }
        regions.push(RegionBox::new(bbox, label, detection.score));
    }
    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_names_ids_and_filters_scores() {
        let raw = br#"[
            {"bbox": [10, 20, 300, 400], "label": "text", "score": 0.95},
            {"bbox": [10, 420, 300, 500], "label": 2, "score": 0.81},
            {"bbox": [0, 0, 50, 50], "label": "Figure", "score": 0.5},
            {"bbox": [0, 0, 50, 50], "label": "Caption", "score": 0.99}
        ]"#;
        let regions = parse_detections(raw, 0.7).expect("parse");
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].label(), RegionLabel::Text);
        assert_eq!(regions[1].label(), RegionLabel::List);
        assert_eq!(regions[1].bbox(), BBox::new(10.0, 420.0, 300.0, 500.0));
    }

    #[test]
    fn malformed_output_is_rejected() {
        assert!(parse_detections(b"not json", 0.0).is_err());
        assert!(parse_detections(br#"[{"bbox":[5,5,1,1],"label":"Text","score":1}]"#, 0.0).is_err());
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        let err = parse_detections(br#"[{"bbox":[0,0,10,10],"label":"Text","score":1.5}]"#, 0.0)
            .unwrap_err();
        assert!(err.contains("outside 0..1"));
        assert!(parse_detections(br#"[{"bbox":[0,0,10,10],"label":"Text","score":-0.1}]"#, 0.0).is_err());
        assert_eq!(
            parse_detections(br#"[{"bbox":[0,0,10,10],"label":"Text","score":1.0}]"#, 0.0)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn empty_command_builds_nothing() {
        assert!(CommandDetector::new(&[], 0.5).is_none());
        assert!(CommandDetector::new(&[" ".to_string()], 0.5).is_none());
    }

    #[test]
    fn failing_command_is_a_detection_failure() {
        let detector =
            CommandDetector::new(&["definitely-not-a-real-detector".to_string()], 0.5)
                .expect("detector");
        let page = PageImage {
            index: 1,
            path: PathBuf::from("page-2.png"),
            width: 10,
            height: 10,
        };
        let err = detector.detect(&page).unwrap_err();
        assert!(matches!(err, PipelineError::DetectionFailure { page: 1, .. }));
    }
}
