//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page.

use serde::{Deserialize, Serialize};

use crate::fonts::FontFace;
use crate::style::TextAlign;

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl From<TextAlign> for Alignment {
    fn from(align: TextAlign) -> Self {
        match align {
            TextAlign::Left => Alignment::Left,
            TextAlign::Center => Alignment::Center,
            TextAlign::Right => Alignment::Right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    #[serde(default)]
    pub font_face: FontFace,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    #[serde(default)]
    pub text_align: Alignment,
    #[serde(default)]
    pub underline: bool,
    #[serde(default)]
    pub strikethrough: bool,
    /// List bullet/number prefix (e.g. "• " or "1. ")
    pub list_marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
    /// Measured width, used for decorations.
    #[serde(default)]
    pub width: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    pub fn new(title: impl Into<String>, page_width_pt: f32, page_height_pt: f32) -> Self {
        Self {
            title: title.into(),
            page_width_pt,
            page_height_pt,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        "document".to_string()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Every text line on every page, in order.
    pub fn text_lines(&self) -> impl Iterator<Item = &str> + '_ {
        fn walk<'a>(boxes: &'a [LayoutBox], out: &mut Vec<&'a str>) {
            for b in boxes {
                if let Some(text) = &b.text {
                    out.extend(text.lines.iter().map(|l| l.text.as_str()));
                }
                walk(&b.children, out);
            }
        }
        let mut out = Vec::new();
        for page in &self.pages {
            walk(&page.boxes, &mut out);
        }
        out.into_iter()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults_fill_optional_fields() {
        let json = r#"{
            "page_width_pt": 612.0,
            "page_height_pt": 792.0,
            "pages": [{ "page_index": 0, "boxes": [{
                "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0,
                "background_color": null, "border": null, "image": null, "children": [],
                "text": {
                    "lines": [{ "text": "hi", "x_offset": 0.0, "y_offset": 0.0 }],
                    "font_size": 12.0, "bold": false, "italic": false,
                    "color": [0.0, 0.0, 0.0, 1.0], "line_height": 14.0, "list_marker": null
                }
            }]}]
        }"#;
        let config = LayoutConfig::from_json(json).unwrap();
        assert_eq!(config.title, "document");
        let text = config.pages[0].boxes[0].text.as_ref().unwrap();
        assert_eq!(text.font_face, FontFace::Helvetica);
        assert_eq!(text.text_align, Alignment::Left);
        assert!(!text.strikethrough);
        assert_eq!(config.text_lines().collect::<Vec<_>>(), vec!["hi"]);
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(LayoutConfig::from_json("{").is_err());
    }
}
