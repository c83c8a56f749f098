use super::font::OverlayFont;

const MAX_SHRINK_STEPS: usize = 32;

/// Text broken into lines for a frame of fixed width.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowedText {
    pub font_size: f32,
    pub leading: f32,
    /// Horizontal offset of the first line.
    pub indent: f32,
    pub lines: Vec<String>,
}

impl FlowedText {
    pub fn height(&self) -> f32 {
        self.lines.len() as f32 * self.leading
    }
}

/// Parameters for [`fit_text`].
#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub font_size: f32,
    pub min_font_size: f32,
    pub width: f32,
    pub max_height: f32,
    pub first_line_indent: bool,
}

/// Wraps `text` at `width`, shrinking the font until the block is no taller
/// than `max_height`.
///
/// Once `min_font_size` is reached the text is returned as is, even if it
/// still overflows; nothing is ever cut.
pub fn fit_text(text: &str, font: &OverlayFont, options: FitOptions) -> FlowedText {
    let min_size = options.min_font_size.min(options.font_size).max(0.1);
    let width = options.width.max(1.0);
    let mut font_size = options.font_size.max(min_size);
    let mut flowed = flow_at(text, font, font_size, width, options.first_line_indent);

    for _ in 0..MAX_SHRINK_STEPS {
        let height = flowed.height();
        if height <= options.max_height || font_size <= min_size {
            break;
        }
        let shrink = (options.max_height.max(0.0) / height).sqrt().min(0.95);
        font_size = (font_size * shrink).max(min_size);
        flowed = flow_at(text, font, font_size, width, options.first_line_indent);
    }
    flowed
}

fn flow_at(
    text: &str,
    font: &OverlayFont,
    font_size: f32,
    width: f32,
    first_line_indent: bool,
) -> FlowedText {
    let indent = if first_line_indent {
        font_size.min(width * 0.5)
    } else {
        0.0
    };
    FlowedText {
        font_size,
        leading: font_size,
        indent,
        lines: wrap_text(text, font, font_size, width, indent),
    }
}

/// Greedy line breaking; the first line is `first_indent` narrower.
///
/// Words longer than a whole line are broken between characters.
pub(crate) fn wrap_text(
    text: &str,
    font: &OverlayFont,
    font_size: f32,
    width: f32,
    first_indent: f32,
) -> Vec<String> {
    let space_width = font.text_width(" ", font_size);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut used = 0.0f32;
    let mut pending_space = false;
    let limit = |lines: &Vec<String>| {
        if lines.is_empty() {
            width - first_indent
        } else {
            width
        }
    };

    for token in tokenize_text(text) {
        if token == "\n" {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            used = 0.0;
            pending_space = false;
            continue;
        }
        if token == " " {
            pending_space = !current.is_empty();
            continue;
        }

        let token_width = font.text_width(&token, font_size);
        let gap = if pending_space { space_width } else { 0.0 };
        if !current.is_empty() && used + gap + token_width > limit(&lines) {
            lines.push(std::mem::take(&mut current));
            used = 0.0;
        } else if pending_space {
            current.push(' ');
            used += space_width;
        }
        pending_space = false;

        if current.is_empty() && token_width > limit(&lines) {
            for ch in token.chars() {
                let mut buf = [0u8; 4];
                let ch_width = font.text_width(ch.encode_utf8(&mut buf), font_size);
                if !current.is_empty() && used + ch_width > limit(&lines) {
                    lines.push(std::mem::take(&mut current));
                    used = 0.0;
                }
                current.push(ch);
                used += ch_width;
            }
            continue;
        }
        current.push_str(&token);
        used += token_width;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn is_cjk(ch: char) -> bool {
    matches!(
        ch as u32,
        0x3000..=0x303F | 0x3040..=0x30FF | 0x31F0..=0x31FF | 0x4E00..=0x9FFF | 0xFF00..=0xFFEF
    )
}

/// Splits into words, single spaces, newlines and one token per CJK character.
fn tokenize_text(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        if ch == '\n' || ch.is_whitespace() || is_cjk(ch) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            let token = if ch == '\n' {
                "\n".to_string()
            } else if ch.is_whitespace() {
                " ".to_string()
            } else {
                ch.to_string()
            };
            tokens.push(token);
            continue;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
