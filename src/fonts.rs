//! Text measurement for the PDF base-14 fonts.
//!
//! Only the standard Helvetica, Courier and Times faces are used, so nothing
//! is embedded and widths come from per-face metric approximations good
//! enough for wrapping.

use serde::{Deserialize, Serialize};

/// One of the three standard PDF font families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontFace {
    #[default]
    Helvetica,
    Courier,
    Times,
}

/// Vertical metrics in 1/1000 em.
#[derive(Debug, Clone, Copy)]
pub struct FaceMetrics {
    pub ascender: f32,
    pub descender: f32,
}

impl FontFace {
    pub fn metrics(self) -> FaceMetrics {
        match self {
            FontFace::Helvetica => FaceMetrics {
                ascender: 718.0,
                descender: -207.0,
            },
            FontFace::Courier => FaceMetrics {
                ascender: 629.0,
                descender: -157.0,
            },
            FontFace::Times => FaceMetrics {
                ascender: 683.0,
                descender: -217.0,
            },
        }
    }
}

/// A face plus weight and slant, i.e. one concrete PDF font.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FontSpec {
    pub face: FontFace,
    pub bold: bool,
    pub italic: bool,
}

impl FontSpec {
    pub fn new(face: FontFace, bold: bool, italic: bool) -> Self {
        Self { face, bold, italic }
    }

    /// Advance of `ch` in 1/1000 em.
    fn advance(&self, ch: char) -> f32 {
        if self.face == FontFace::Courier {
            return 600.0;
        }
        let base = match ch {
            ' ' => 278.0,
            'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '!' | '|' | '\'' => 222.0,
            'f' | 't' | 'r' | 'I' | '(' | ')' | '[' | ']' | '-' | '/' => 333.0,
            'm' | 'w' => 833.0,
            'M' | 'W' => 889.0,
            '0'..='9' => 556.0,
            c if c.is_ascii_uppercase() => 667.0,
            c if c.is_ascii_lowercase() => 540.0,
            c if c.is_ascii() => 584.0,
            // Non-latin glyphs are not in WinAnsi and get replaced anyway.
            _ => 600.0,
        };
        let weight = if self.bold { 1.08 } else { 1.0 };
        let face = if self.face == FontFace::Times { 0.9 } else { 1.0 };
        base * weight * face
    }

    /// Width of `text` in px at `font_size` px.
    pub fn measure(&self, text: &str, font_size: f32) -> f32 {
        text.chars().map(|c| self.advance(c)).sum::<f32>() * font_size / 1000.0
    }

    /// Ascender in px.
    pub fn ascender(&self, font_size: f32) -> f32 {
        self.face.metrics().ascender * font_size / 1000.0
    }
}

/// Line box height in px.
pub fn line_height_px(font_size: f32, line_height_factor: f32) -> f32 {
    font_size * line_height_factor
}

/// Word-wrap text to fit within `max_width` px. Existing `\n` are kept as
/// hard breaks. Words wider than the line are split by character.
pub fn wrap_text(text: &str, font: FontSpec, font_size: f32, max_width: f32) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let mut current_line = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current_line.is_empty() {
                word.to_string()
            } else {
                format!("{current_line} {word}")
            };
            if font.measure(&candidate, font_size) <= max_width {
                current_line = candidate;
                continue;
            }
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            if font.measure(word, font_size) <= max_width {
                current_line = word.to_string();
            } else {
                let mut pieces = break_word(word, font, font_size, max_width);
                current_line = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        lines.push(current_line);
    }
    lines
}

/// Wrap preformatted text: whitespace is kept and lines only break where
/// they would overflow.
pub fn wrap_preformatted(text: &str, font: FontSpec, font_size: f32, max_width: f32) -> Vec<String> {
    let text = text.replace("\r\n", "\n").replace('\t', "    ");
    let text = text.strip_suffix('\n').unwrap_or(&text);
    text.split('\n')
        .flat_map(|line| {
            if max_width <= 0.0 || font.measure(line, font_size) <= max_width {
                vec![line.to_string()]
            } else {
                break_word(line, font, font_size, max_width)
            }
        })
        .collect()
}

/// Hard-break `word` into pieces no wider than `max_width` (at least one
/// character each).
fn break_word(word: &str, font: FontSpec, font_size: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut width = 0.0;
    for ch in word.chars() {
        let w = font.advance(ch) * font_size / 1000.0;
        if width + w > max_width && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            width = 0.0;
        }
        current.push(ch);
        width += w;
    }
    pieces.push(current);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELVETICA: FontSpec = FontSpec {
        face: FontFace::Helvetica,
        bold: false,
        italic: false,
    };

    #[test]
    fn courier_is_monospaced() {
        let mono = FontSpec::new(FontFace::Courier, false, false);
        assert_eq!(mono.measure("iiii", 10.0), mono.measure("MMMM", 10.0));
        assert!((mono.measure("Hello", 10.0) - 30.0).abs() < 0.01);
    }

    #[test]
    fn proportional_widths() {
        assert!(HELVETICA.measure("MMMM", 16.0) > HELVETICA.measure("iiii", 16.0));
        let bold = FontSpec::new(FontFace::Helvetica, true, false);
        assert!(bold.measure("Hello", 16.0) > HELVETICA.measure("Hello", 16.0));
    }

    #[test]
    fn word_wrap_basic() {
        let lines = wrap_text("Hello world foo bar", HELVETICA, 16.0, 60.0);
        assert!(lines.len() >= 2, "Expected wrapping, got {lines:?}");
        for line in &lines {
            assert!(HELVETICA.measure(line, 16.0) <= 60.0 || !line.contains(' '));
        }
    }

    #[test]
    fn wrap_keeps_hard_breaks() {
        let lines = wrap_text("one\ntwo", HELVETICA, 16.0, 500.0);
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn long_words_are_split() {
        let lines = wrap_text(&"x".repeat(100), HELVETICA, 16.0, 100.0);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat().len(), 100);
    }

    #[test]
    fn preformatted_keeps_indentation() {
        let mono = FontSpec::new(FontFace::Courier, false, false);
        let lines = wrap_preformatted("fn main() {\n\tprintln!();\n}\n", mono, 10.0, 1000.0);
        assert_eq!(lines, vec!["fn main() {", "    println!();", "}"]);
    }
}
