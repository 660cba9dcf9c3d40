//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API).

use std::collections::HashMap;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::codecs::png::PngEncoder;
use ::image::imageops::FilterType;
use ::image::{DynamicImage, Rgb as ImageRgb, RgbImage};
use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::error::RenderError;
use crate::fonts::{FontFace, FontSpec};
use crate::layout_config::*;
use crate::options::{CaptureSettings, ImageSettings, ImageType};

/// How embedded images are re-encoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageEncoding {
    pub format: ImageType,
    /// 0.0 – 1.0, JPEG only.
    pub quality: f32,
    /// Raster pixels per PDF point.
    pub scale: f32,
}

impl Default for ImageEncoding {
    fn default() -> Self {
        Self {
            format: ImageType::Jpeg,
            quality: 0.95,
            scale: 2.0,
        }
    }
}

impl ImageEncoding {
    pub fn from_settings(image: &ImageSettings, capture: &CaptureSettings) -> Self {
        let defaults = Self::default();
        Self {
            format: image.kind.unwrap_or(defaults.format),
            quality: image
                .quality
                .filter(|q| q.is_finite())
                .map_or(defaults.quality, |q| q.clamp(0.0, 1.0)),
            scale: capture
                .scale
                .filter(|s| s.is_finite() && *s > 0.0)
                .unwrap_or(defaults.scale),
        }
    }
}

/// A printpdf XObject together with the pixel dimensions of the embedded image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

fn builtin_font(face: FontFace, bold: bool, italic: bool) -> BuiltinFont {
    match (face, bold, italic) {
        (FontFace::Helvetica, false, false) => BuiltinFont::Helvetica,
        (FontFace::Helvetica, true, false) => BuiltinFont::HelveticaBold,
        (FontFace::Helvetica, false, true) => BuiltinFont::HelveticaOblique,
        (FontFace::Helvetica, true, true) => BuiltinFont::HelveticaBoldOblique,
        (FontFace::Courier, false, false) => BuiltinFont::Courier,
        (FontFace::Courier, true, false) => BuiltinFont::CourierBold,
        (FontFace::Courier, false, true) => BuiltinFont::CourierOblique,
        (FontFace::Courier, true, true) => BuiltinFont::CourierBoldOblique,
        (FontFace::Times, false, false) => BuiltinFont::TimesRoman,
        (FontFace::Times, true, false) => BuiltinFont::TimesBold,
        (FontFace::Times, false, true) => BuiltinFont::TimesItalic,
        (FontFace::Times, true, true) => BuiltinFont::TimesBoldItalic,
    }
}

/// Render a LayoutConfig into PDF bytes.
///
/// Images whose `src` is not a base64 data URI, or whose bytes cannot be
/// decoded, are skipped with a warning.
pub fn render_pdf(config: &LayoutConfig, encoding: &ImageEncoding) -> Result<Vec<u8>, RenderError> {
    let page_w = Mm(config.page_width_pt * 0.352778); // pt → mm
    let page_h = Mm(config.page_height_pt * 0.352778);

    let mut doc = PdfDocument::new(&config.title);

    // Largest box each image is drawn into, in points.
    let mut targets: HashMap<&str, (f32, f32)> = HashMap::new();
    for page_layout in &config.pages {
        for lbox in &page_layout.boxes {
            collect_image_targets(lbox, &mut targets);
        }
    }

    let mut images: HashMap<String, ImageResource> = HashMap::new();
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    for (src, (w, h)) in targets {
        let bytes = match parse_data_uri(src) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("Skipping image: {e}");
                continue;
            }
        };
        let (encoded, px_width, px_height) = match prepare_image(&bytes, w, h, encoding) {
            Ok(prepared) => prepared,
            Err(e) => {
                log::warn!("Skipping image: {e}");
                continue;
            }
        };
        let raw = match RawImage::decode_from_bytes(&encoded, &mut warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("Skipping image: PDF encode error: {e}");
                continue;
            }
        };
        let xobj_id = doc.add_image(&raw);
        images.insert(
            src.to_string(),
            ImageResource {
                xobj_id,
                px_width,
                px_height,
            },
        );
    }

    let mut pages: Vec<PdfPage> = config
        .pages
        .iter()
        .map(|page_layout| {
            let mut ops = Vec::new();
            for lbox in &page_layout.boxes {
                render_box(&mut ops, lbox, config.page_height_pt, &images);
            }
            PdfPage::new(page_w, page_h, ops)
        })
        .collect();
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    log::debug!(
        "rendered {} page(s), {} image(s), {} bytes",
        config.pages.len().max(1),
        images.len(),
        bytes.len()
    );
    Ok(bytes)
}

/// Decode, downsample to the drawn size × scale, and re-encode an image.
/// Returns the encoded bytes and their pixel size.
pub(crate) fn prepare_image(
    bytes: &[u8],
    width_pt: f32,
    height_pt: f32,
    encoding: &ImageEncoding,
) -> Result<(Vec<u8>, u32, u32), RenderError> {
    let img = ::image::load_from_memory(bytes).map_err(|e| RenderError::Image(e.to_string()))?;

    let target_w = (width_pt * encoding.scale).ceil().max(1.0) as u32;
    let target_h = (height_pt * encoding.scale).ceil().max(1.0) as u32;
    let img = if img.width() > target_w || img.height() > target_h {
        img.resize(target_w, target_h, FilterType::Triangle)
    } else {
        img
    };
    let (w, h) = (img.width(), img.height());

    let mut out = Vec::new();
    let written = match encoding.format {
        ImageType::Jpeg => {
            let quality = (encoding.quality * 100.0).round().clamp(1.0, 100.0) as u8;
            DynamicImage::ImageRgb8(flatten_on_white(&img))
                .write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        }
        ImageType::Png => img.write_with_encoder(PngEncoder::new(&mut out)),
    };
    written.map_err(|e| RenderError::Image(e.to_string()))?;
    Ok((out, w, h))
}

/// JPEG has no alpha channel; composite onto a white page.
fn flatten_on_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = f32::from(a) / 255.0;
        let blend = |c: u8| (f32::from(c) * a + 255.0 * (1.0 - a)).round() as u8;
        ImageRgb([blend(r), blend(g), blend(b)])
    })
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: the string is only ever handed to printpdf, which copies its
    // bytes into the content stream without inspecting them as UTF-8.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let Some(rest) = src.strip_prefix("data:") else {
        let preview: String = src.chars().take(80).collect();
        return Err(format!("only base64 data URIs can be embedded, got {preview:?}"));
    };
    let (header, data) = rest
        .split_once(',')
        .ok_or_else(|| "invalid data URI: missing `,`".to_string())?;
    if !header.contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(data.trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Bytes of a base64 data URI, or `None` for anything else.
pub fn decode_data_uri(src: &str) -> Option<Vec<u8>> {
    parse_data_uri(src).ok()
}

fn collect_image_targets<'a>(lbox: &'a LayoutBox, targets: &mut HashMap<&'a str, (f32, f32)>) {
    if let Some(img) = &lbox.image {
        let entry = targets.entry(img.src.as_str()).or_insert((0.0, 0.0));
        entry.0 = entry.0.max(img.width);
        entry.1 = entry.1.max(img.height);
    }
    for child in &lbox.children {
        collect_image_targets(child, targets);
    }
}

// ---------------------------------------------------------------------------
// Drawing helpers
// ---------------------------------------------------------------------------

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a rectangle given its top edge in PDF space.
fn rect_points(x: f32, top: f32, width: f32, height: f32) -> Vec<LinePoint> {
    vec![
        point(x, top),
        point(x + width, top),
        point(x + width, top - height),
        point(x, top - height),
    ]
}

fn stroke_line(ops: &mut Vec<Op>, from: (f32, f32), to: (f32, f32), thickness: f32, color: [f32; 4]) {
    ops.push(Op::SetOutlineThickness { pt: Pt(thickness) });
    ops.push(Op::SetOutlineColor { col: rgb(color) });
    ops.push(Op::DrawLine {
        line: Line {
            points: vec![point(from.0, from.1), point(to.0, to.1)],
            is_closed: false,
        },
    });
}

fn write_text(ops: &mut Vec<Op>, x: f32, baseline: f32, text: &str, font: BuiltinFont, size: f32, color: [f32; 4]) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point {
            x: Pt(x),
            y: Pt(baseline),
        },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(ops: &mut Vec<Op>, lbox: &LayoutBox, page_height: f32, images: &HashMap<String, ImageResource>) {
    // PDF origin is bottom-left; layout origin is top-left.
    let top = page_height - lbox.y;

    if let Some(bg) = lbox.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: rect_points(lbox.x, top, lbox.width, lbox.height),
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if let Some(border) = &lbox.border {
        ops.push(Op::SetOutlineColor { col: rgb(border.color) });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: rect_points(lbox.x, top, lbox.width, lbox.height),
                is_closed: true,
            },
        });
    }

    if let Some(text) = &lbox.text {
        let font = builtin_font(text.font_face, text.bold, text.italic);
        let spec = FontSpec::new(text.font_face, text.bold, text.italic);
        let half_leading = (text.line_height - text.font_size).max(0.0) / 2.0;
        let ascent = spec.ascender(text.font_size);

        for tline in text.lines.iter().filter(|l| !l.text.is_empty()) {
            let x = lbox.x + tline.x_offset;
            let baseline = top - tline.y_offset - half_leading - ascent;
            write_text(ops, x, baseline, &tline.text, font, text.font_size, text.color);

            let thickness = (text.font_size / 18.0).max(0.5);
            if text.underline {
                let y = baseline - text.font_size * 0.1;
                stroke_line(ops, (x, y), (x + tline.width, y), thickness, text.color);
            }
            if text.strikethrough {
                let y = baseline + text.font_size * 0.3;
                stroke_line(ops, (x, y), (x + tline.width, y), thickness, text.color);
            }
        }

        if let Some(marker) = &text.list_marker {
            let marker_spec = FontSpec::new(FontFace::Helvetica, text.bold, false);
            let marker_x = lbox.x - marker_spec.measure(marker, text.font_size);
            let baseline = top - half_leading - marker_spec.ascender(text.font_size);
            let font = builtin_font(FontFace::Helvetica, text.bold, false);
            write_text(ops, marker_x, baseline, marker, font, text.font_size, text.color);
        }
    }

    if let Some(img) = &lbox.image {
        if let Some(res) = images.get(&img.src) {
            // At dpi=72 printpdf renders 1 px = 1 pt, so scale = pt / px.
            let scale_x = img.width / res.px_width.max(1) as f32;
            let scale_y = img.height / res.px_height.max(1) as f32;
            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(lbox.x)),
                    translate_y: Some(Pt(top - img.height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale_x),
                    scale_y: Some(scale_y),
                    rotate: None,
                },
            });
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, images);
    }
}
