use anyhow::{Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::path::Path;
use std::process::Command;

use super::{PageWords, WordExtractor, run_capture};
use crate::layout::{BBox, PointSize, WordBox};

/// Reads positioned words from `pdftotext -bbox`.
#[derive(Debug, Clone, Default)]
pub struct PopplerWordExtractor;

impl PopplerWordExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl WordExtractor for PopplerWordExtractor {
    fn extract(&self, pdf: &Path) -> Result<Vec<PageWords>> {
        let stdout = run_capture(
            Command::new("pdftotext")
                .arg("-bbox")
                .arg("-enc")
                .arg("UTF-8")
                .arg(pdf)
                .arg("-"),
            "pdftotext",
        )?;
        parse_bbox_xhtml(&stdout)
    }
}

/// Parses the XHTML written by `pdftotext -bbox` into per-page word lists.
pub(crate) fn parse_bbox_xhtml(xml: &[u8]) -> Result<Vec<PageWords>> {
    let mut reader = Reader::from_reader(xml);
    reader.trim_text(false);
    let mut buf = Vec::new();
    let mut pages: Vec<PageWords> = Vec::new();
    let mut word: Option<(BBox, String)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"page" => pages.push(page_from(&e)?),
                b"word" => word = Some((bbox_from(&e)?, String::new())),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"page" {
                    pages.push(page_from(&e)?);
                }
            }
            Ok(Event::Text(e)) => {
                if let Some((_, text)) = word.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"word" {
                    let (bbox, text) = word
                        .take()
                        .ok_or_else(|| anyhow!("unbalanced </word> in pdftotext output"))?;
                    let page = pages
                        .last_mut()
                        .ok_or_else(|| anyhow!("word outside of a page in pdftotext output"))?;
                    let text = text.trim();
                    if !text.is_empty() {
                        page.words.push(WordBox::new(bbox, text));
                    }
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(anyhow!("failed to parse pdftotext output: {}", err)),
        }
        buf.clear();
    }
    Ok(pages)
}

fn page_from(e: &BytesStart<'_>) -> Result<PageWords> {
    Ok(PageWords {
        size: PointSize {
            width: float_attr(e, b"width")?,
            height: float_attr(e, b"height")?,
        },
        words: Vec::new(),
    })
}

fn bbox_from(e: &BytesStart<'_>) -> Result<BBox> {
    Ok(BBox::new(
        float_attr(e, b"xMin")?,
        float_attr(e, b"yMin")?,
        float_attr(e, b"xMax")?,
        float_attr(e, b"yMax")?,
    ))
}

fn float_attr(e: &BytesStart<'_>, name: &[u8]) -> Result<f32> {
    let label = String::from_utf8_lossy(name).into_owned();
    let attr = e
        .try_get_attribute(name)
        .map_err(|err| anyhow!("bad attribute {}: {}", label, err))?
        .ok_or_else(|| anyhow!("missing attribute {}", label))?;
    let value = attr
        .unescape_value()
        .map_err(|err| anyhow!("bad attribute {}: {}", label, err))?;
    value
        .trim()
        .parse::<f32>()
        .map_err(|err| anyhow!("attribute {}='{}' is not a number: {}", label, value, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title></title>
<meta name="Producer" content="pdfTeX"/>
</head>
<body>
<doc>
  <page width="612.000000" height="792.000000">
    <word xMin="72.000000" yMin="90.500000" xMax="101.250000" yMax="102.000000">Deep</word>
    <word xMin="104.000000" yMin="90.500000" xMax="150.000000" yMax="102.000000">R&amp;D</word>
  </page>
  <page width="595.000000" height="842.000000">
  </page>
</doc>
</body>
</html>
"#;

    #[test]
    fn parses_pages_and_words() {
        let pages = parse_bbox_xhtml(SAMPLE.as_bytes()).expect("parse");
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].size.width, 612.0);
        assert_eq!(pages[1].size.height, 842.0);
        assert!(pages[1].words.is_empty());
        assert_eq!(pages[0].words[1].text(), "R&D");
        assert_eq!(
            pages[0].words[0].bbox(),
            BBox::new(72.0, 90.5, 101.25, 102.0)
        );
    }

    #[test]
    fn missing_coordinates_are_errors() {
        let xml = r#"<doc><page width="1" height="1"><word xMin="1">x</word></page></doc>"#;
        assert!(parse_bbox_xhtml(xml.as_bytes()).is_err());
    }
}
