//! Pagination – splits a tree of positioned boxes into pages.
//!
//! Handles:
//! - page boundaries for any paper size and margin
//! - forced breaks before / after an element (from the page-break policy)
//! - `avoid` boxes, which move to the next page whole
//! - table row splitting across pages, through row groups
//! - text runs taller than a page, split between lines

use std::borrow::Cow;

use crate::fonts::line_height_px;
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::style;

/// Page size and margin in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    pub fn content_width(&self) -> f32 {
        (self.width - 2.0 * self.margin).max(1.0)
    }

    pub fn content_height(&self) -> f32 {
        (self.height - 2.0 * self.margin).max(1.0)
    }
}

/// A box queued for placement, with break flags inherited from any
/// containers that were expanded around it.
struct Flat<'a> {
    pbox: Cow<'a, PositionedBox>,
    break_before: bool,
    break_after: bool,
}

fn has_forced_break_inside(pbox: &PositionedBox) -> bool {
    pbox.children
        .iter()
        .any(|c| c.page_break_before || c.page_break_after || has_forced_break_inside(c))
}

/// Expand containers that are taller than a page, or hold a forced break,
/// so their children can be placed individually.
fn flatten_for_pagination<'a>(boxes: &'a [PositionedBox], content_height: f32, out: &mut Vec<Flat<'a>>) {
    for pbox in boxes {
        let container = !pbox.children.is_empty()
            && matches!(pbox.content, BoxContent::None | BoxContent::ListItem { .. });
        let expand = container && (pbox.height > content_height || has_forced_break_inside(pbox));
        if !expand {
            out.push(Flat {
                pbox: Cow::Borrowed(pbox),
                break_before: pbox.page_break_before,
                break_after: pbox.page_break_after,
            });
            continue;
        }

        let start = out.len();
        if let BoxContent::ListItem { .. } = pbox.content {
            // Keep the marker as a zero-height shell.
            let mut shell = pbox.clone();
            shell.children.clear();
            shell.height = 0.0;
            shell.style.background_color = style::Color::TRANSPARENT;
            shell.style.border_width = 0.0;
            out.push(Flat {
                pbox: Cow::Owned(shell),
                break_before: false,
                break_after: false,
            });
        }
        flatten_for_pagination(&pbox.children, content_height, out);
        if let Some(first) = out.get_mut(start) {
            first.break_before |= pbox.page_break_before;
        }
        if out.len() > start {
            if let Some(last) = out.last_mut() {
                last.break_after |= pbox.page_break_after;
            }
        }
    }
}

struct Paginator {
    pages: Vec<PageLayout>,
    current: PageLayout,
    /// Document-space y at which the current page begins. `pbox.y -
    /// page_start` is the y-on-page of any box.
    page_start: f32,
    geometry: PageGeometry,
}

impl Paginator {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            pages: Vec::new(),
            current: PageLayout {
                page_index: 0,
                boxes: Vec::new(),
            },
            page_start: 0.0,
            geometry,
        }
    }

    fn y_on_page(&self, doc_y: f32) -> f32 {
        (doc_y - self.page_start).max(0.0)
    }

    fn fits(&self, pbox: &PositionedBox) -> bool {
        self.y_on_page(pbox.y) + pbox.height <= self.geometry.content_height()
    }

    /// Close the current page (if it has content) and start a new one at
    /// document position `doc_y`.
    fn new_page(&mut self, doc_y: f32) {
        if !self.current.boxes.is_empty() {
            let next = PageLayout {
                page_index: self.pages.len() + 1,
                boxes: Vec::new(),
            };
            self.pages.push(std::mem::replace(&mut self.current, next));
        }
        self.page_start = doc_y;
    }

    fn place(&mut self, pbox: &PositionedBox) {
        let abs_y = self.geometry.margin + self.y_on_page(pbox.y);
        self.current.boxes.push(build_layout_box(pbox, pbox.x, abs_y));
    }

    fn place_table(&mut self, table: &PositionedBox) {
        let rows = table.children.iter().flat_map(|child| {
            if child.style.display == style::Display::TableRowGroup {
                child.children.iter().collect::<Vec<_>>()
            } else {
                vec![child]
            }
        });
        for row in rows {
            if !self.fits(row) && !self.current.boxes.is_empty() {
                self.new_page(row.y);
            }
            self.place(row);
        }
    }

    /// Place a text run line by line, continuing on following pages.
    fn place_text_split(&mut self, pbox: &PositionedBox) {
        let lines = pbox.lines();
        let lh = line_height_px(pbox.style.font_size, pbox.style.line_height).max(0.1);
        let content_height = self.geometry.content_height();

        let mut start = 0;
        while start < lines.len() {
            let doc_y = pbox.y + start as f32 * lh;
            let mut fit = ((content_height - self.y_on_page(doc_y)) / lh).floor().max(0.0) as usize;
            if fit == 0 {
                if !self.current.boxes.is_empty() {
                    self.new_page(doc_y);
                    continue;
                }
                fit = 1;
            }
            let end = (start + fit).min(lines.len());

            let mut chunk = pbox.clone();
            chunk.content = BoxContent::Text {
                lines: lines[start..end].to_vec(),
            };
            chunk.y = doc_y;
            chunk.height = (end - start) as f32 * lh;
            self.place(&chunk);

            start = end;
            if start < lines.len() {
                self.new_page(pbox.y + start as f32 * lh);
            }
        }
    }

    fn finish(mut self) -> Vec<PageLayout> {
        if !self.current.boxes.is_empty() || self.pages.is_empty() {
            self.pages.push(self.current);
        }
        self.pages
    }
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    pbox.style.display == style::Display::Table && !pbox.children.is_empty()
}

fn is_text(pbox: &PositionedBox) -> bool {
    matches!(pbox.content, BoxContent::Text { .. })
}

/// Split positioned boxes (in points, document coordinates) into pages.
/// Always yields at least one page.
pub fn paginate(boxes: &[PositionedBox], geometry: PageGeometry) -> Vec<PageLayout> {
    let content_height = geometry.content_height();
    let mut flat = Vec::new();
    flatten_for_pagination(boxes, content_height, &mut flat);

    let mut pager = Paginator::new(geometry);
    for item in &flat {
        let pbox = item.pbox.as_ref();

        if item.break_before && !pager.current.boxes.is_empty() {
            pager.new_page(pbox.y);
        }

        if !pager.fits(pbox) {
            if is_text(pbox) && pbox.height > content_height {
                pager.place_text_split(pbox);
                if item.break_after {
                    pager.new_page(pbox.y + pbox.height);
                }
                continue;
            }
            if !pager.current.boxes.is_empty() {
                if is_table_like(pbox) && !pbox.page_break_inside_avoid {
                    pager.place_table(pbox);
                    if item.break_after {
                        pager.new_page(pbox.y + pbox.height);
                    }
                    continue;
                }
                pager.new_page(pbox.y);
            }
        }

        pager.place(pbox);

        if item.break_after {
            pager.new_page(pbox.y + pbox.height);
        }
    }
    pager.finish()
}

/// Recursively build a LayoutBox tree where every box carries *page-absolute*
/// x/y coordinates (origin = top-left of the physical page).
///
/// PositionedBox.y values are document-space absolutes, so `child.y − pbox.y`
/// is the child's offset within its parent.
fn build_layout_box(pbox: &PositionedBox, abs_x: f32, abs_y: f32) -> LayoutBox {
    let mut lb = LayoutBox::new(abs_x, abs_y, pbox.width, pbox.height);
    let s = &pbox.style;

    if !s.background_color.is_transparent() {
        lb.background_color = Some(s.background_color.to_array());
    }
    if s.border_width > 0.0 && !s.border_color.is_transparent() {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: s.border_color.to_array(),
        });
    }

    let line_height = line_height_px(s.font_size, s.line_height);
    match &pbox.content {
        BoxContent::Text { lines } => {
            let font = s.font();
            let text_lines = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let width = font.measure(line, s.font_size);
                    let slack = (pbox.width - width).max(0.0);
                    TextLine {
                        text: line.clone(),
                        x_offset: match s.text_align {
                            style::TextAlign::Left => 0.0,
                            style::TextAlign::Center => slack / 2.0,
                            style::TextAlign::Right => slack,
                        },
                        y_offset: i as f32 * line_height,
                        width,
                    }
                })
                .collect();
            lb.text = Some(text_content(pbox, text_lines, None));
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::ListItem { marker } => {
            // The marker is drawn in the left gutter; the item's text comes
            // from its child boxes.
            lb.text = Some(text_content(pbox, Vec::new(), Some(marker.clone())));
        }
        BoxContent::None => {}
    }

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children.push(build_layout_box(child, child.x, child_abs_y));
    }
    lb
}

fn text_content(pbox: &PositionedBox, lines: Vec<TextLine>, list_marker: Option<String>) -> TextContent {
    let s = &pbox.style;
    let is_marker = list_marker.is_some();
    TextContent {
        lines,
        font_face: s.font_family,
        font_size: s.font_size,
        bold: s.is_bold(),
        italic: s.is_italic() && !is_marker,
        color: s.color.to_array(),
        line_height: line_height_px(s.font_size, s.line_height),
        text_align: if is_marker {
            Alignment::Left
        } else {
            s.text_align.into()
        },
        underline: !is_marker && s.text_decoration == style::TextDecoration::Underline,
        strikethrough: !is_marker && s.text_decoration == style::TextDecoration::LineThrough,
        list_marker,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::layout::{compute_layout, scale_boxes};
    use crate::options::PageBreakSettings;
    use crate::style::{build_styled_tree, BreakPolicy, StyleContext, Stylesheet};

    const A4: PageGeometry = PageGeometry {
        width: 595.28,
        height: 841.89,
        margin: 28.35,
    };

    fn pages_for(html: &str, css: &str) -> Vec<PageLayout> {
        let dom = parse_html(html);
        let ctx = StyleContext {
            sheet: Stylesheet::parse(css),
            breaks: BreakPolicy::from_settings(&PageBreakSettings::default()),
        };
        let styled = build_styled_tree(&dom, &ctx);
        let mut boxes = compute_layout(&styled, 800.0).unwrap();
        scale_boxes(&mut boxes, A4.content_width() / 800.0, A4.margin);
        paginate(&boxes, A4)
    }

    fn page_text(page: &PageLayout) -> Vec<String> {
        fn walk(boxes: &[LayoutBox], out: &mut Vec<String>) {
            for b in boxes {
                if let Some(t) = &b.text {
                    out.extend(t.lines.iter().map(|l| l.text.clone()));
                }
                walk(&b.children, out);
            }
        }
        let mut out = Vec::new();
        walk(&page.boxes, &mut out);
        out
    }

    #[test]
    fn single_page() {
        let pages = pages_for("<p>Short text</p>", "");
        assert_eq!(pages.len(), 1);
        assert_eq!(page_text(&pages[0]), ["Short text"]);
    }

    #[test]
    fn empty_document_has_one_page() {
        assert_eq!(paginate(&[], A4).len(), 1);
    }

    #[test]
    fn multiple_pages() {
        let html: String = (0..120)
            .map(|i| format!("<p>Paragraph {i} with some text</p>"))
            .collect();
        let pages = pages_for(&format!("<div>{html}</div>"), "");
        assert!(pages.len() > 1, "Expected multiple pages, got {}", pages.len());
        for page in &pages {
            for b in &page.boxes {
                assert!(b.y + b.height <= A4.height - A4.margin + 0.5);
            }
        }
        let all: Vec<String> = pages.iter().flat_map(page_text).collect();
        assert_eq!(all.len(), 120);
        assert_eq!(all[119], "Paragraph 119 with some text");
    }

    #[test]
    fn forced_breaks_inside_short_documents() {
        let pages = pages_for(
            r#"<div><p>one</p><div class="page-break"></div><p>two</p><p class="html2pdf__page-break">three</p><p>four</p></div>"#,
            ".page-break { page-break-before: always; }",
        );
        let texts: Vec<Vec<String>> = pages.iter().map(page_text).collect();
        assert_eq!(texts, [vec!["one"], vec!["two", "three"], vec!["four"]]);
    }

    #[test]
    fn long_text_is_split_between_lines() {
        let long = "word ".repeat(6000);
        let pages = pages_for(&format!("<div><p>{long}</p></div>"), "");
        assert!(pages.len() > 1);
        let total: usize = pages.iter().map(|p| page_text(p).len()).sum();
        let dom = parse_html(&format!("<p>{long}</p>"));
        let styled = build_styled_tree(&dom, &StyleContext::default());
        let boxes = compute_layout(&styled, 800.0).unwrap();
        assert_eq!(total, boxes[0].children[0].lines().len());
    }

    #[test]
    fn tables_split_by_row() {
        let rows: String = (0..150)
            .map(|i| format!("<tr><td>r{i}</td><td>x</td></tr>"))
            .collect();
        let pages = pages_for(
            &format!("<div><p>intro</p><table><tbody>{rows}</tbody></table></div>"),
            "",
        );
        assert!(pages.len() > 1);
        assert_eq!(page_text(&pages[0])[0], "intro");
        let cells: usize = pages.iter().map(|p| page_text(p).len()).sum();
        assert_eq!(cells, 1 + 300);
    }

    #[test]
    fn alignment_offsets() {
        let pages = pages_for(r#"<p style="text-align: right">hi</p><p style="text-align: center">hi</p>"#, "");
        let offsets: Vec<f32> = pages[0]
            .boxes
            .iter()
            .map(|p| p.children[0].text.as_ref().unwrap().lines[0].x_offset)
            .collect();
        assert!(offsets[0] > 0.0);
        assert!((offsets[0] / 2.0 - offsets[1]).abs() < 0.01);
    }
}
