use anyhow::{Context, Result, anyhow};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use ttf_parser::{Face, name_id};
use usvg::fontdb;

/// Non-embedded Japanese CID font every conforming viewer can substitute.
pub const BUILTIN_FONT_NAME: &str = "HeiseiKakuGo-W5";
const BUILTIN_CMAP: &str = "UniJIS-UCS2-H";

/// Font used to draw translated text.
///
/// Text is always encoded as UTF-16BE code units; the builtin font reads them
/// through a Unicode CMap, embedded fonts through a CID-to-glyph map.
#[derive(Clone)]
pub enum OverlayFont {
    Builtin,
    TrueType(TrueTypeFont),
}

#[derive(Clone)]
pub struct TrueTypeFont {
    data: Arc<Vec<u8>>,
    postscript_name: String,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    cap_height: i16,
    bbox: [i16; 4],
}

impl std::fmt::Debug for OverlayFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OverlayFont({})", self.name())
    }
}

impl OverlayFont {
    pub fn name(&self) -> &str {
        match self {
            OverlayFont::Builtin => BUILTIN_FONT_NAME,
            OverlayFont::TrueType(font) => &font.postscript_name,
        }
    }

    /// Advance width of `text` at `font_size`, in points.
    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        match self {
            OverlayFont::Builtin => {
                text.chars().map(builtin_char_units).sum::<f32>() * font_size
            }
            OverlayFont::TrueType(font) => font.text_width(text, font_size),
        }
    }

    /// Encodes text for a `Tj` operand; characters outside the BMP become `?`.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        text_codes(text)
            .flat_map(|code| code.to_be_bytes())
            .collect()
    }

    /// Adds the font objects to `doc` and returns the Type0 font reference.
    ///
    /// `codes` lists the UTF-16 code units drawn with this font; embedded
    /// fonts publish widths for exactly those.
    pub fn install(&self, doc: &mut Document, codes: &BTreeSet<u16>) -> Result<ObjectId> {
        match self {
            OverlayFont::Builtin => Ok(install_builtin(doc)),
            OverlayFont::TrueType(font) => font.install(doc, codes),
        }
    }
}

pub(crate) fn text_codes(text: &str) -> impl Iterator<Item = u16> + '_ {
    text.chars().map(|ch| {
        let mut units = [0u16; 2];
        match ch.encode_utf16(&mut units) {
            [unit] => *unit,
            _ => u16::from(b'?'),
        }
    })
}

fn integers(values: &[i64]) -> Vec<Object> {
    values.iter().copied().map(Object::Integer).collect()
}

fn builtin_char_units(ch: char) -> f32 {
    match ch as u32 {
        0x20..=0x7E | 0xFF61..=0xFF9F => 0.5,
        _ => 1.0,
    }
}

fn install_builtin(doc: &mut Document) -> ObjectId {
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => BUILTIN_FONT_NAME,
        "Flags" => 4,
        "FontBBox" => integers(&[-92, -250, 1010, 922]),
        "ItalicAngle" => 0,
        "Ascent" => 752,
        "Descent" => -221,
        "CapHeight" => 737,
        "StemV" => 114,
    });
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType0",
        "BaseFont" => BUILTIN_FONT_NAME,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Japan1"),
            "Supplement" => 2,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => integers(&[1, 95, 500, 231, 632, 500]),
    });
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => format!("{}-{}", BUILTIN_FONT_NAME, BUILTIN_CMAP),
        "Encoding" => BUILTIN_CMAP,
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
    })
}

impl TrueTypeFont {
    pub fn from_data(data: Vec<u8>) -> Result<Self> {
        if ttf_parser::fonts_in_collection(&data).is_some() {
            return Err(anyhow!("font collections cannot be embedded; use a single .ttf file"));
        }
        let (postscript_name, units_per_em, space_advance, ascender, descender, cap_height, bbox) = {
            let face = Face::parse(&data, 0).map_err(|err| anyhow!("{}", err))?;
            if face.tables().glyf.is_none() {
                return Err(anyhow!("only TrueType-outline fonts can be embedded"));
            }
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            let rect = face.global_bounding_box();
            let name = face_name(&face, name_id::POST_SCRIPT_NAME)
                .or_else(|| face_name(&face, name_id::FAMILY))
                .unwrap_or_default();
            (
                sanitize_font_name(&name),
                units_per_em,
                space_advance,
                face.ascender(),
                face.descender(),
                face.capital_height().unwrap_or_else(|| face.ascender()),
                [rect.x_min, rect.y_min, rect.x_max, rect.y_max],
            )
        };
        Ok(Self {
            data: Arc::new(data),
            postscript_name,
            units_per_em,
            space_advance,
            ascender,
            descender,
            cap_height,
            bbox,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data =
            fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
        Self::from_data(data)
            .map_err(|err| anyhow!("failed to load font: {} ({})", path.display(), err))
    }

    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }

    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let Some(face) = self.face() else {
            return text.chars().map(builtin_char_units).sum::<f32>() * font_size;
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance as f32 * font_size / self.units_per_em as f32
    }

    fn to_pdf_units(&self, value: i32) -> i64 {
        (value as i64 * 1000) / self.units_per_em as i64
    }

    fn install(&self, doc: &mut Document, codes: &BTreeSet<u16>) -> Result<ObjectId> {
        let face = self
            .face()
            .ok_or_else(|| anyhow!("font data became unreadable: {}", self.postscript_name))?;

        let mut cid_to_gid = vec![0u8; 0x10000 * 2];
        let mut widths = Vec::with_capacity(codes.len() * 2);
        for &code in codes {
            let Some(ch) = char::from_u32(code as u32) else {
                continue;
            };
            let Some(glyph) = face.glyph_index(ch) else {
                continue;
            };
            let offset = code as usize * 2;
            cid_to_gid[offset..offset + 2].copy_from_slice(&glyph.0.to_be_bytes());
            let advance = face.glyph_hor_advance(glyph).unwrap_or(self.space_advance);
            widths.push(Object::Integer(code as i64));
            widths.push(Object::Array(vec![Object::Integer(
                self.to_pdf_units(advance as i32),
            )]));
        }

        let font_file_id = doc.add_object(Stream::new(
            dictionary! { "Length1" => self.data.len() as i64 },
            self.data.as_ref().clone(),
        ));
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => self.postscript_name.as_str(),
            "Flags" => 4,
            "FontBBox" => self.bbox.iter().map(|v| Object::Integer(self.to_pdf_units(*v as i32))).collect::<Vec<_>>(),
            "ItalicAngle" => 0,
            "Ascent" => self.to_pdf_units(self.ascender as i32),
            "Descent" => self.to_pdf_units(self.descender as i32),
            "CapHeight" => self.to_pdf_units(self.cap_height as i32),
            "StemV" => 80,
            "FontFile2" => font_file_id,
        });
        let cid_to_gid_id = doc.add_object(Stream::new(Dictionary::new(), cid_to_gid));
        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => self.postscript_name.as_str(),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => self.to_pdf_units(self.space_advance as i32),
            "W" => widths,
            "CIDToGIDMap" => cid_to_gid_id,
        });
        let to_unicode_id = doc.add_object(Stream::new(
            Dictionary::new(),
            IDENTITY_UCS_CMAP.as_bytes().to_vec(),
        ));
        debug!(
            "embedding {} with {} distinct code units",
            self.postscript_name,
            codes.len()
        );
        Ok(doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => self.postscript_name.as_str(),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        }))
    }
}

const IDENTITY_UCS_CMAP: &str = "/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
1 beginbfrange
<0000> <FFFF> <0000>
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

/// Hex operand for `Tj`.
pub(crate) fn hex_string(bytes: Vec<u8>) -> Object {
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Picks the overlay font: an explicit file, then a system family, then the
/// first `.ttf` in `fonts_dir`, then the builtin CID font.
pub fn resolve_overlay_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fonts_dir: Option<&Path>,
) -> Result<OverlayFont> {
    if let Some(path) = font_path {
        return Ok(OverlayFont::TrueType(TrueTypeFont::load(path)?));
    }
    if let Some(family) = font_family {
        return load_from_family(family).map(OverlayFont::TrueType);
    }
    if let Some(path) = fonts_dir.and_then(first_ttf) {
        debug!("using font {}", path.display());
        return Ok(OverlayFont::TrueType(TrueTypeFont::load(&path)?));
    }
    Ok(OverlayFont::Builtin)
}

fn first_ttf(dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut fonts: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf"))
        })
        .collect();
    fonts.sort();
    fonts.into_iter().next()
}

fn load_from_family(family: &str) -> Result<TrueTypeFont> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    TrueTypeFont::from_data(data).map_err(|err| anyhow!("font {}: {}", family, err))
}

fn face_name(face: &Face<'_>, id: u16) -> Option<String> {
    face.names()
        .into_iter()
        .filter(|name| name.name_id == id)
        .find_map(|name| name.to_string())
}

fn sanitize_font_name(raw: &str) -> String {
    let name: String = raw
        .chars()
        .filter_map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                Some(ch)
            } else if ch.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect();
    if name.is_empty() {
        "TranslatableFont".to_string()
    } else {
        name
    }
}
