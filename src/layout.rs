//! Layout engine – uses Taffy to compute block / flex / table layout from a
//! styled DOM tree, then converts the result into a tree of positioned boxes.
//!
//! Layout happens in CSS px at the capture width; [`scale_boxes`] maps the
//! result onto the page afterwards.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::dom::Tag;
use crate::fonts::{line_height_px, wrap_preformatted, wrap_text};
use crate::style::{self, ComputedStyle, StyledNode, WhiteSpace};

/// Marks a `<br>` inside collected inline text until whitespace is collapsed.
const HARD_BREAK: char = '\u{2028}';

type LayoutResult<T> = Result<T, taffy::TaffyError>;

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxContent {
    None,
    /// A wrapped run of inline content.
    Text { lines: Vec<String> },
    Image { src: String },
    /// List item marker
    ListItem { marker: String },
}

impl PositionedBox {
    pub fn lines(&self) -> &[String] {
        match &self.content {
            BoxContent::Text { lines } => lines,
            _ => &[],
        }
    }

    /// Pre-order walk over this box and its descendants.
    pub fn walk(&self, f: &mut impl FnMut(&PositionedBox)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Bullet,
    Numbered(u32),
}

impl ListKind {
    fn next_marker(&mut self) -> String {
        match self {
            ListKind::Bullet => "\u{2022} ".to_string(),
            ListKind::Numbered(n) => {
                let marker = format!("{n}. ");
                *n += 1;
                marker
            }
        }
    }
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

/// Text, and inline elements whose content joins the surrounding run.
fn is_inline_content(node: &StyledNode) -> bool {
    match node {
        StyledNode::Text { .. } => true,
        StyledNode::Element { style, .. } => style.display.is_inline(),
    }
}

fn collect_run_text(node: &StyledNode, out: &mut String) {
    match node {
        StyledNode::Text { text, .. } => out.push_str(text),
        StyledNode::Element { tag: Tag::Br, .. } => out.push(HARD_BREAK),
        StyledNode::Element {
            tag: Tag::Input,
            attrs,
            ..
        } => {
            if attr(attrs, "type").is_some_and(|t| t.eq_ignore_ascii_case("checkbox")) {
                out.push_str(if attr(attrs, "checked").is_some() {
                    "[x] "
                } else {
                    "[ ] "
                });
            }
        }
        StyledNode::Element { children, .. } => {
            for child in children {
                collect_run_text(child, out);
            }
        }
    }
}

fn is_blank_text(node: &StyledNode) -> bool {
    matches!(node, StyledNode::Text { text, .. } if text.trim().is_empty())
}

/// When a run is a single inline element (plus whitespace), its innermost
/// such element's style is used for the whole run.
fn dominant_style<'a>(run: &[&'a StyledNode]) -> Option<&'a ComputedStyle> {
    let mut significant = run.iter().copied().filter(|n| !is_blank_text(n));
    let only = significant.next()?;
    if significant.next().is_some() {
        return None;
    }
    match only {
        StyledNode::Element {
            tag,
            style,
            children,
            ..
        } if !matches!(tag, Tag::Br | Tag::Input) => {
            let inner: Vec<&StyledNode> = children.iter().collect();
            Some(dominant_style(&inner).unwrap_or(style))
        }
        _ => None,
    }
}

/// Collapse whitespace unless preformatted; hard breaks become `\n`.
fn normalize_run(raw: &str, pre: bool) -> String {
    if pre {
        return raw.replace(HARD_BREAK, "\n");
    }
    raw.split(HARD_BREAK)
        .map(|segment| segment.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

fn starts_with_checkbox(children: &[StyledNode]) -> bool {
    children
        .iter()
        .find(|c| !is_blank_text(c))
        .is_some_and(|c| matches!(c, StyledNode::Element { tag: Tag::Input, .. }))
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder {
    taffy: TaffyTree<()>,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    available_width: f32,
}

impl LayoutBuilder {
    fn new(available_width: f32) -> Self {
        Self {
            taffy: TaffyTree::new(),
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            available_width,
        }
    }

    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> LayoutResult<NodeId> {
        match styled {
            StyledNode::Text { text, style } => {
                let text = normalize_run(text, style.white_space == WhiteSpace::Pre);
                self.build_text_node(&text, style, parent_width, true)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// Build the children of a block, merging consecutive inline content
    /// into wrapped text runs.
    fn build_children(
        &mut self,
        block_style: &ComputedStyle,
        children: &[StyledNode],
        child_width: f32,
        fill: bool,
        mut list: Option<ListKind>,
    ) -> LayoutResult<Vec<NodeId>> {
        let mut nodes = Vec::new();
        let mut run: Vec<&StyledNode> = Vec::new();

        for child in children {
            if is_inline_content(child) {
                run.push(child);
                continue;
            }
            self.flush_run(&mut run, block_style, child_width, fill, &mut nodes)?;

            let marker = match (child, list.as_mut()) {
                (
                    StyledNode::Element {
                        tag: Tag::Li,
                        children: item,
                        ..
                    },
                    Some(kind),
                ) => {
                    let marker = kind.next_marker();
                    (!starts_with_checkbox(item)).then_some(marker)
                }
                _ => None,
            };

            let id = self.build_node(child, child_width)?;
            if let Some(marker) = marker {
                self.node_content.insert(id, BoxContent::ListItem { marker });
            }
            nodes.push(id);
        }
        self.flush_run(&mut run, block_style, child_width, fill, &mut nodes)?;
        Ok(nodes)
    }

    fn flush_run(
        &mut self,
        run: &mut Vec<&StyledNode>,
        block_style: &ComputedStyle,
        max_width: f32,
        fill: bool,
        out: &mut Vec<NodeId>,
    ) -> LayoutResult<()> {
        if run.is_empty() {
            return Ok(());
        }
        let mut raw = String::new();
        for node in run.iter() {
            collect_run_text(node, &mut raw);
        }
        let style = dominant_style(run).map_or_else(|| block_style.for_text(), ComputedStyle::for_text);
        run.clear();

        let text = normalize_run(&raw, style.white_space == WhiteSpace::Pre);
        if text.trim().is_empty() {
            return Ok(());
        }
        out.push(self.build_text_node(&text, &style, max_width, fill)?);
        Ok(())
    }

    fn build_text_node(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        max_width: f32,
        fill: bool,
    ) -> LayoutResult<NodeId> {
        let font = style.font();
        let font_size = style.font_size;
        let line_height = line_height_px(font_size, style.line_height);

        let max_w = if max_width > 0.0 {
            max_width
        } else {
            self.available_width
        };
        let lines = if style.white_space == WhiteSpace::Pre {
            wrap_preformatted(text, font, font_size, max_w)
        } else {
            wrap_text(text, font, font_size, max_w)
        };

        let text_width = lines
            .iter()
            .map(|l| font.measure(l, font_size))
            .fold(0.0f32, f32::max)
            .min(max_w);
        let text_height = lines.len() as f32 * line_height;

        let taffy_style = Style {
            size: Size {
                width: if fill {
                    Dimension::Percent(1.0)
                } else {
                    Dimension::Length(text_width)
                },
                height: Dimension::Length(text_height),
            },
            min_size: Size {
                width: Dimension::Length(0.0),
                height: Dimension::Auto,
            },
            ..Default::default()
        };

        let node = self.taffy.new_leaf(taffy_style)?;
        self.node_styles.insert(node, style.clone());
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &[(String, String)],
        parent_width: f32,
    ) -> LayoutResult<NodeId> {
        if *tag == Tag::Img {
            return self.build_image_node(style, attrs, parent_width);
        }

        // Compute the width available for children
        let my_width = resolve_width(style.width, parent_width).unwrap_or(parent_width);
        let inner_width = (my_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width)
            .max(1.0);

        // Estimate per-child width for flex-row containers and table rows so
        // that text is word-wrapped to the right column width at build time.
        let is_row = style.display == style::Display::TableRow
            || (style.display == style::Display::Flex
                && style.flex_direction == style::FlexDirection::Row);

        let child_width = if is_row {
            let count = children.iter().filter(|c| !is_inline_content(c)).count().max(1);
            let gap_total = style.gap * count.saturating_sub(1) as f32;
            ((inner_width - gap_total) / count as f32).max(1.0)
        } else {
            inner_width
        };

        let list = match tag {
            Tag::Ul => Some(ListKind::Bullet),
            Tag::Ol => Some(ListKind::Numbered(
                attr(attrs, "start").and_then(|s| s.trim().parse().ok()).unwrap_or(1),
            )),
            _ => None,
        };

        let child_nodes = self.build_children(style, children, child_width, !is_row, list)?;
        let node = self
            .taffy
            .new_with_children(computed_to_taffy(style), &child_nodes)?;
        self.node_styles.insert(node, style.clone());
        Ok(node)
    }

    fn build_image_node(
        &mut self,
        style: &ComputedStyle,
        attrs: &[(String, String)],
        parent_width: f32,
    ) -> LayoutResult<NodeId> {
        let src = attr(attrs, "src").unwrap_or_default();
        let resolved = resolve_img_auto_dimensions(src, style, parent_width);
        let auto_sized = matches!(style.width, style::Dimension::Auto)
            || matches!(style.height, style::Dimension::Auto);
        if resolved.is_none() && auto_sized {
            let shown: String = src.chars().take(48).collect();
            log::warn!("image {shown:?} has no decodable intrinsic size; skipped");
        }

        let effective = resolved.as_ref().unwrap_or(style);
        let node = self.taffy.new_leaf(computed_to_taffy(effective))?;
        self.node_styles.insert(node, effective.clone());
        self.node_content.insert(
            node,
            BoxContent::Image {
                src: src.to_string(),
            },
        );
        Ok(node)
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> LayoutResult<PositionedBox> {
        let layout = self.taffy.layout(node)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<LayoutResult<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            page_break_inside_avoid: style.page_break_inside_avoid,
            style,
            content,
            children,
        })
    }
}

fn resolve_width(d: style::Dimension, parent_width: f32) -> Option<f32> {
    match d {
        style::Dimension::Px(w) => Some(w),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    }
}

fn dim_to_taffy(d: style::Dimension) -> Dimension {
    match d {
        style::Dimension::Auto => Dimension::Auto,
        style::Dimension::Px(v) => Dimension::Length(v),
        style::Dimension::Percent(v) => Dimension::Percent(v / 100.0),
    }
}

fn computed_to_taffy(s: &ComputedStyle) -> Style {
    let mut ts = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        ..Default::default()
    };

    match s.display {
        style::Display::Flex => {
            ts.flex_direction = match s.flex_direction {
                style::FlexDirection::Row => taffy::FlexDirection::Row,
                style::FlexDirection::Column => taffy::FlexDirection::Column,
            };
            ts.flex_wrap = match s.flex_wrap {
                style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
            };
            ts.justify_content = Some(match s.justify_content {
                style::JustifyContent::Start => taffy::JustifyContent::Start,
                style::JustifyContent::End => taffy::JustifyContent::End,
                style::JustifyContent::Center => taffy::JustifyContent::Center,
                style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                style::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
            });
            ts.align_items = Some(match s.align_items {
                style::AlignItems::Start => taffy::AlignItems::Start,
                style::AlignItems::End => taffy::AlignItems::End,
                style::AlignItems::Center => taffy::AlignItems::Center,
                style::AlignItems::Stretch => taffy::AlignItems::Stretch,
            });
        }
        style::Display::TableRow => {
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.align_items = Some(taffy::AlignItems::Stretch);
        }
        // Everything else stacks vertically.
        _ => {}
    }

    ts.size = Size {
        width: dim_to_taffy(s.width),
        height: dim_to_taffy(s.height),
    };
    // Allow flex/shrink items to compress below their natural content size
    ts.min_size = Size {
        width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
            Dimension::Length(0.0)
        } else {
            dim_to_taffy(s.min_width)
        },
        height: Dimension::Auto,
    };
    ts.max_size = Size {
        width: dim_to_taffy(s.max_width),
        height: Dimension::Auto,
    };
    ts.flex_grow = s.flex_grow;
    ts.flex_shrink = s.flex_shrink;

    ts.margin = Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    };
    ts.padding = Rect {
        top: LengthPercentage::Length(s.padding_top),
        right: LengthPercentage::Length(s.padding_right),
        bottom: LengthPercentage::Length(s.padding_bottom),
        left: LengthPercentage::Length(s.padding_left),
    };
    ts.border = Rect {
        top: LengthPercentage::Length(s.border_width),
        right: LengthPercentage::Length(s.border_width),
        bottom: LengthPercentage::Length(s.border_width),
        left: LengthPercentage::Length(s.border_width),
    };
    ts.gap = Size {
        width: LengthPercentage::Length(s.gap),
        height: LengthPercentage::Length(s.gap),
    };

    match s.display {
        style::Display::TableRowGroup | style::Display::TableRow => {
            if matches!(s.width, style::Dimension::Auto) {
                ts.size.width = Dimension::Percent(1.0);
            }
        }
        style::Display::TableCell => {
            // Equal columns.
            ts.flex_grow = 1.0;
            ts.flex_shrink = 1.0;
            ts.flex_basis = Dimension::Length(0.0);
            ts.min_size.width = Dimension::Length(0.0);
        }
        _ => {}
    }
    ts
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Decode a base64 `data:` image header and return the intrinsic pixel size.
pub fn data_uri_dimensions(src: &str) -> Option<(u32, u32)> {
    let bytes = crate::render::decode_data_uri(src)?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    (img.width() > 0 && img.height() > 0).then(|| (img.width(), img.height()))
}

/// Return a cloned [`ComputedStyle`] with any `Auto` width/height replaced by
/// concrete px values derived from the image's intrinsic size.
///
/// Unsized images wider than their container are scaled down to fit. Returns
/// `None` when the src is not a decodable data URI or both dimensions are
/// already specified.
fn resolve_img_auto_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    let known_w = resolve_width(style.width, parent_width);
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };
    if known_w.is_some() && known_h.is_some() {
        return None;
    }

    let (px_w, px_h) = data_uri_dimensions(src)?;
    let (px_w, px_h) = (px_w as f32, px_h as f32);
    let aspect = px_w / px_h;

    let mut s = style.clone();
    match (known_w, known_h) {
        (Some(w), None) => s.height = style::Dimension::Px((w / aspect).max(1.0)),
        (None, Some(h)) => s.width = style::Dimension::Px((h * aspect).max(1.0)),
        (None, None) => {
            let w = if parent_width > 0.0 {
                px_w.min(parent_width)
            } else {
                px_w
            };
            s.width = style::Dimension::Px(w);
            s.height = style::Dimension::Px((w / aspect).max(1.0));
        }
        (Some(_), Some(_)) => return None,
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out a styled tree `width` px wide, returning the top-level positioned
/// boxes in document coordinates (px, origin at the top-left).
pub fn compute_layout(styled_nodes: &[StyledNode], width: f32) -> LayoutResult<Vec<PositionedBox>> {
    let mut builder = LayoutBuilder::new(width);
    let child_ids = builder.build_children(&ComputedStyle::default(), styled_nodes, width, true, None)?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: Dimension::Length(width),
            height: Dimension::Auto,
        },
        ..Default::default()
    };
    let root = builder.taffy.new_with_children(root_style, &child_ids)?;

    builder.taffy.compute_layout(
        root,
        Size {
            width: AvailableSpace::Definite(width),
            height: AvailableSpace::MaxContent,
        },
    )?;

    Ok(builder.extract(root, 0.0, 0.0)?.children)
}

/// Scale px boxes by `k` (px → pt) and shift them right by `offset_x`.
pub fn scale_boxes(boxes: &mut [PositionedBox], k: f32, offset_x: f32) {
    for b in boxes {
        b.x = b.x * k + offset_x;
        b.y *= k;
        b.width *= k;
        b.height *= k;
        b.style.font_size *= k;
        b.style.border_width *= k;
        scale_boxes(&mut b.children, k, offset_x);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::{build_styled_tree, StyleContext};
    use base64::Engine as _;

    fn layout(html: &str, width: f32) -> Vec<PositionedBox> {
        let dom = parse_html(html);
        let styled = build_styled_tree(&dom, &StyleContext::default());
        compute_layout(&styled, width).unwrap()
    }

    fn text_boxes(boxes: &[PositionedBox]) -> Vec<PositionedBox> {
        let mut out = Vec::new();
        for b in boxes {
            b.walk(&mut |b| {
                if matches!(b.content, BoxContent::Text { .. }) {
                    out.push(b.clone());
                }
            });
        }
        out
    }

    fn png_data_uri(w: u32, h: u32) -> String {
        let img = ::image::RgbImage::new(w, h);
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, ::image::ImageFormat::Png).unwrap();
        let b64 = base64::engine::general_purpose::STANDARD.encode(bytes.into_inner());
        format!("data:image/png;base64,{b64}")
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = layout("<p>Hello world</p>", 515.0);
        assert_eq!(boxes.len(), 1);
        let first = &boxes[0];
        assert!(first.width > 0.0, "Box should have width");
        assert!(first.height > 0.0, "Box should have height");
        assert_eq!(first.children[0].lines(), ["Hello world"]);
    }

    #[test]
    fn inline_content_merges_into_one_run() {
        let boxes = layout("<p>Hello <strong>big</strong>\n <em>world</em></p>", 500.0);
        let texts = text_boxes(&boxes);
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].lines(), ["Hello big world"]);
    }

    #[test]
    fn single_inline_element_styles_the_run() {
        let boxes = layout("<p><strong>Bold</strong></p>", 500.0);
        assert!(text_boxes(&boxes)[0].style.is_bold());
    }

    #[test]
    fn line_breaks_and_checkboxes() {
        let boxes = layout(r#"<p>one<br>two</p><ul><li><input type="checkbox" checked disabled> done</li></ul>"#, 500.0);
        let texts = text_boxes(&boxes);
        assert_eq!(texts[0].lines(), ["one", "two"]);
        assert_eq!(texts[1].lines(), ["[x] done"]);
    }

    #[test]
    fn preformatted_text_keeps_whitespace() {
        let boxes = layout("<pre><code>a  b\n  c\n</code></pre>", 500.0);
        let texts = text_boxes(&boxes);
        assert_eq!(texts[0].lines(), ["a  b", "  c"]);
        assert_eq!(texts[0].style.font_family, crate::fonts::FontFace::Courier);
    }

    #[test]
    fn list_markers() {
        let boxes = layout(r#"<ol start="3"><li>a</li><li>b</li></ol><ul><li>c</li></ul>"#, 500.0);
        let markers: Vec<_> = boxes
            .iter()
            .flat_map(|list| list.children.iter())
            .filter_map(|li| match &li.content {
                BoxContent::ListItem { marker } => Some(marker.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(markers, ["3. ", "4. ", "\u{2022} "]);
    }

    #[test]
    fn table_cells_share_a_row() {
        let boxes = layout(
            "<table><thead><tr><th>A</th><th>B</th></tr></thead><tbody><tr><td>1</td><td>2</td></tr></tbody></table>",
            400.0,
        );
        let texts = text_boxes(&boxes);
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[0].y, texts[1].y);
        assert!(texts[1].x > texts[0].x);
        assert!(texts[2].y > texts[0].y);
    }

    #[test]
    fn images_use_intrinsic_size_and_fit() {
        let small = png_data_uri(4, 2);
        let boxes = layout(&format!(r#"<div><img src="{small}"></div>"#), 500.0);
        let img = &boxes[0].children[0];
        assert!(matches!(img.content, BoxContent::Image { .. }));
        assert_eq!((img.width, img.height), (4.0, 2.0));

        let wide = png_data_uri(1000, 10);
        let boxes = layout(&format!(r#"<div><img src="{wide}"></div>"#), 500.0);
        let img = &boxes[0].children[0];
        assert_eq!((img.width, img.height), (500.0, 5.0));
    }

    #[test]
    fn undecodable_auto_sized_image_keeps_its_box() {
        let boxes = layout(r#"<div><img src="missing.png"><p>after</p></div>"#, 500.0);
        let img = &boxes[0].children[0];
        assert!(matches!(&img.content, BoxContent::Image { src } if src == "missing.png"));
        assert_eq!(text_boxes(&boxes)[0].lines(), ["after"]);
    }

    #[test]
    fn scaling_maps_px_to_points() {
        let mut boxes = layout("<p>Hello</p>", 800.0);
        let before = boxes[0].clone();
        scale_boxes(&mut boxes, 0.5, 28.0);
        assert_eq!(boxes[0].x, before.x * 0.5 + 28.0);
        assert_eq!(boxes[0].width, before.width * 0.5);
        assert_eq!(boxes[0].children[0].style.font_size, 8.0);
    }
}
