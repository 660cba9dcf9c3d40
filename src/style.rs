//! Style resolver – cascades tag defaults, `<style>` rules and inline styles
//! into a flat [`ComputedStyle`] per element.
//!
//! The CSS support is deliberately small: type, class, id and universal
//! selectors, compounds of those, descendant and child combinators, and the
//! properties a markdown document actually uses.

use crate::dom::{DomNode, ElementNode, Tag};
use crate::fonts::{FontFace, FontSpec};
use crate::options::{PageBreakMode, PageBreakSettings};

/// Class that forces a break after its element in `legacy` mode.
pub const LEGACY_BREAK_CLASS: &str = "html2pdf__page-break";

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,

    // Spacing (px)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: FontFace,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    pub white_space: WhiteSpace,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_family: FontFace::Helvetica,
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            white_space: WhiteSpace::Normal,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    /// Copy the inherited (text) properties of `parent`.
    fn inherit_from(&mut self, parent: &ComputedStyle) {
        self.font_size = parent.font_size;
        self.font_weight = parent.font_weight;
        self.font_family = parent.font_family;
        self.color = parent.color;
        self.text_align = parent.text_align;
        self.line_height = parent.line_height;
        self.font_style = parent.font_style;
        self.white_space = parent.white_space;
        // Not inherited in CSS, but a decoration visually covers descendants.
        self.text_decoration = parent.text_decoration;
    }

    /// Style for a run of text inside an element with this style.
    pub fn for_text(&self) -> ComputedStyle {
        let mut style = self.clone();
        style.display = Display::Inline;
        style.width = Dimension::Auto;
        style.height = Dimension::Auto;
        style.min_width = Dimension::Auto;
        style.max_width = Dimension::Auto;
        style.border_width = 0.0;
        style.background_color = Color::TRANSPARENT;
        style.margin_top = 0.0;
        style.margin_right = 0.0;
        style.margin_bottom = 0.0;
        style.margin_left = 0.0;
        style.padding_top = 0.0;
        style.padding_right = 0.0;
        style.padding_bottom = 0.0;
        style.padding_left = 0.0;
        style.flex_grow = 0.0;
        style.page_break_before = false;
        style.page_break_after = false;
        style.page_break_inside_avoid = false;
        style
    }

    pub fn is_bold(&self) -> bool {
        self.font_weight == FontWeight::Bold
    }

    pub fn is_italic(&self) -> bool {
        self.font_style == FontStyle::Italic
    }

    /// The concrete PDF font this style draws text with.
    pub fn font(&self) -> FontSpec {
        FontSpec::new(self.font_family, self.is_bold(), self.is_italic())
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Inline,
    InlineBlock,
    ListItem,
    Table,
    TableRowGroup,
    TableRow,
    TableCell,
    None,
}

impl Display {
    pub fn is_inline(self) -> bool {
        matches!(self, Display::Inline)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
    LineThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Normal,
    Pre,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: 1.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#')?;
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        let short = |i: usize| channel(&hex[i..i + 1].repeat(2));
        match hex.len() {
            6 | 8 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 | 4 => Some(Self::rgb(short(0)?, short(1)?, short(2)?)),
            _ => None,
        }
    }

    /// Parse `#hex`, `rgb()/rgba()` or a named colour.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        if value.starts_with('#') {
            return Self::from_hex(&value);
        }
        if let Some(args) = value
            .strip_prefix("rgba(")
            .or_else(|| value.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<&str> = args
                .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() < 3 {
                return None;
            }
            let channel = |p: &str| -> Option<f32> {
                match p.strip_suffix('%') {
                    Some(pct) => pct.parse::<f32>().ok().map(|v| v / 100.0),
                    None => p.parse::<f32>().ok().map(|v| v / 255.0),
                }
            };
            let alpha = match parts.get(3) {
                Some(a) => match a.strip_suffix('%') {
                    Some(pct) => pct.parse::<f32>().ok()? / 100.0,
                    None => a.parse::<f32>().ok()?,
                },
                None => 1.0,
            };
            return Some(Self {
                r: channel(parts[0])?.clamp(0.0, 1.0),
                g: channel(parts[1])?.clamp(0.0, 1.0),
                b: channel(parts[2])?.clamp(0.0, 1.0),
                a: alpha.clamp(0.0, 1.0),
            });
        }
        named_color(&value)
    }
}

fn named_color(name: &str) -> Option<Color> {
    Some(match name {
        "transparent" => Color::TRANSPARENT,
        "black" => Color::BLACK,
        "white" => Color::WHITE,
        "red" => Color::rgb(255, 0, 0),
        "green" => Color::rgb(0, 128, 0),
        "blue" => Color::rgb(0, 0, 255),
        "navy" => Color::rgb(0, 0, 128),
        "teal" => Color::rgb(0, 128, 128),
        "maroon" => Color::rgb(128, 0, 0),
        "purple" => Color::rgb(128, 0, 128),
        "olive" => Color::rgb(128, 128, 0),
        "orange" => Color::rgb(255, 165, 0),
        "yellow" => Color::rgb(255, 255, 0),
        "gray" | "grey" => Color::rgb(128, 128, 128),
        "silver" => Color::rgb(192, 192, 192),
        "lightgray" | "lightgrey" => Color::rgb(211, 211, 211),
        "darkgray" | "darkgrey" => Color::rgb(169, 169, 169),
        "dimgray" | "dimgrey" => Color::rgb(105, 105, 105),
        "whitesmoke" => Color::rgb(245, 245, 245),
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Selectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
}

fn ident_len(s: &str) -> usize {
    s.char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '-' || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl Compound {
    fn parse(text: &str) -> Option<Self> {
        let mut compound = Compound::default();
        let mut rest = text;
        if let Some(tail) = rest.strip_prefix('*') {
            rest = tail;
        } else {
            let n = ident_len(rest);
            if n > 0 {
                compound.tag = Some(rest[..n].to_ascii_lowercase());
                rest = &rest[n..];
            }
        }
        while let Some(kind) = rest.chars().next() {
            let tail = &rest[kind.len_utf8()..];
            let n = ident_len(tail);
            if n == 0 {
                return None;
            }
            let name = tail[..n].to_string();
            match kind {
                '.' => compound.classes.push(name),
                '#' => compound.id = Some(name),
                _ => return None,
            }
            rest = &tail[n..];
        }
        Some(compound)
    }

    fn matches(&self, element: &ElementNode) -> bool {
        self.tag.as_deref().map_or(true, |t| element.tag.as_str() == t)
            && self.id.as_deref().map_or(true, |id| element.id() == Some(id))
            && self.classes.iter().all(|c| element.has_class(c))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

/// A parsed selector such as `.mdpdf-content > h1.title`.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

/// `(ids, classes, types)`.
pub type Specificity = (u32, u32, u32);

impl Selector {
    /// Parse a single selector. Pseudo-classes, attribute selectors and
    /// sibling combinators are not supported and yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        let spaced = text.replace('>', " > ");
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();
        let mut pending: Option<Combinator> = None;

        for token in spaced.split_whitespace() {
            if token == ">" {
                if compounds.is_empty() || pending.is_some() {
                    return None;
                }
                pending = Some(Combinator::Child);
                continue;
            }
            let compound = Compound::parse(token)?;
            if !compounds.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }
            compounds.push(compound);
        }
        if compounds.is_empty() || pending.is_some() {
            return None;
        }
        Some(Self {
            compounds,
            combinators,
        })
    }

    pub fn specificity(&self) -> Specificity {
        self.compounds.iter().fold((0, 0, 0), |(a, b, c), part| {
            (
                a + u32::from(part.id.is_some()),
                b + part.classes.len() as u32,
                c + u32::from(part.tag.is_some()),
            )
        })
    }

    /// `ancestors` runs from the root down to the element's parent.
    pub fn matches(&self, element: &ElementNode, ancestors: &[&ElementNode]) -> bool {
        self.matches_at(self.compounds.len() - 1, element, ancestors)
    }

    fn matches_at(&self, idx: usize, element: &ElementNode, ancestors: &[&ElementNode]) -> bool {
        if !self.compounds[idx].matches(element) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match self.combinators[idx - 1] {
            Combinator::Child => match ancestors.split_last() {
                Some((parent, rest)) => self.matches_at(idx - 1, parent, rest),
                None => false,
            },
            Combinator::Descendant => (0..ancestors.len())
                .rev()
                .any(|i| self.matches_at(idx - 1, ancestors[i], &ancestors[..i])),
        }
    }
}

/// Parse a comma-separated selector list, skipping unsupported entries.
pub fn parse_selector_list(text: &str) -> Vec<Selector> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let parsed = Selector::parse(s);
            if parsed.is_none() {
                log::warn!("unsupported CSS selector {s:?} ignored");
            }
            parsed
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Stylesheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Rule {
    selector: Selector,
    specificity: Specificity,
    order: usize,
    declarations: Vec<(String, String)>,
}

/// Rules collected from `<style>` elements, in source order.
#[derive(Debug, Clone, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// `s` starts at a `{`; return what follows its matching `}`.
fn skip_block(s: &str) -> &str {
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &s[i + 1..];
                }
            }
            _ => {}
        }
    }
    ""
}

/// Split `prop: value; ...` into lower-case property names and values.
pub fn parse_declarations(block: &str) -> Vec<(String, String)> {
    block
        .split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let value = value.trim();
            let value = value
                .strip_suffix("!important")
                .map(str::trim_end)
                .unwrap_or(value);
            (!prop.is_empty() && !value.is_empty()).then(|| (prop, value.to_string()))
        })
        .collect()
}

impl Stylesheet {
    pub fn parse(css: &str) -> Self {
        let mut sheet = Self::default();
        sheet.add(css);
        sheet
    }

    /// Append the rules of `css`; later rules win ties.
    pub fn add(&mut self, css: &str) {
        let css = strip_comments(css);
        let mut rest = css.as_str();
        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }
            if rest.starts_with('@') {
                let semi = rest.find(';');
                let brace = rest.find('{');
                rest = match (semi, brace) {
                    (Some(s), b) if b.map_or(true, |b| s < b) => &rest[s + 1..],
                    (_, Some(b)) => skip_block(&rest[b..]),
                    _ => "",
                };
                log::warn!("CSS at-rule skipped");
                continue;
            }
            let Some(open) = rest.find('{') else {
                break;
            };
            let prelude = rest[..open].trim();
            let after = &rest[open + 1..];
            let close = after.find('}').unwrap_or(after.len());
            let declarations = parse_declarations(&after[..close]);
            rest = after.get(close + 1..).unwrap_or("");

            for selector in parse_selector_list(prelude) {
                self.rules.push(Rule {
                    specificity: selector.specificity(),
                    order: self.rules.len(),
                    selector,
                    declarations: declarations.clone(),
                });
            }
        }
    }

    /// Stylesheet made of every `<style>` element under `nodes`, in
    /// document order.
    pub fn from_document(nodes: &[DomNode]) -> Self {
        fn walk(nodes: &[DomNode], sheet: &mut Stylesheet) {
            for node in nodes {
                if let DomNode::Element(e) = node {
                    if e.tag == Tag::Style {
                        sheet.add(&e.text_content());
                    } else {
                        walk(&e.children, sheet);
                    }
                }
            }
        }
        let mut sheet = Self::default();
        walk(nodes, &mut sheet);
        sheet
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Declarations that apply to `element`, lowest priority first.
    fn matching<'s>(
        &'s self,
        element: &ElementNode,
        ancestors: &[&ElementNode],
    ) -> Vec<&'s (String, String)> {
        let mut rules: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.selector.matches(element, ancestors))
            .collect();
        rules.sort_by_key(|r| (r.specificity, r.order));
        rules.iter().flat_map(|r| r.declarations.iter()).collect()
    }
}

// ---------------------------------------------------------------------------
// Page-break policy
// ---------------------------------------------------------------------------

/// Page-break settings compiled for matching.
#[derive(Debug, Clone, Default)]
pub struct BreakPolicy {
    pub css: bool,
    pub legacy: bool,
    pub avoid_all: bool,
    pub before: Vec<Selector>,
    pub after: Vec<Selector>,
    pub avoid: Vec<Selector>,
}

impl BreakPolicy {
    pub fn from_settings(settings: &PageBreakSettings) -> Self {
        let compile = |list: &[String]| -> Vec<Selector> {
            list.iter().flat_map(|s| parse_selector_list(s)).collect()
        };
        Self {
            css: settings.has_mode(PageBreakMode::Css),
            legacy: settings.has_mode(PageBreakMode::Legacy),
            avoid_all: settings.has_mode(PageBreakMode::AvoidAll),
            before: compile(&settings.before),
            after: compile(&settings.after),
            avoid: compile(&settings.avoid),
        }
    }

    fn apply(&self, s: &mut ComputedStyle, element: &ElementNode, ancestors: &[&ElementNode]) {
        if !self.css {
            s.page_break_before = false;
            s.page_break_after = false;
            s.page_break_inside_avoid = false;
        }
        if self.legacy && element.has_class(LEGACY_BREAK_CLASS) {
            s.page_break_after = true;
        }
        if self.avoid_all {
            s.page_break_inside_avoid = true;
        }
        let hit = |list: &[Selector]| list.iter().any(|sel| sel.matches(element, ancestors));
        if hit(&self.before) {
            s.page_break_before = true;
        }
        if hit(&self.after) {
            s.page_break_after = true;
        }
        if hit(&self.avoid) {
            s.page_break_inside_avoid = true;
        }
    }
}

/// Everything style resolution needs besides the element itself.
#[derive(Debug, Clone, Default)]
pub struct StyleContext {
    pub sheet: Stylesheet,
    pub breaks: BreakPolicy,
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element.
///
/// Cascade: inherited text properties, tag defaults, presentational
/// attributes, stylesheet rules by specificity then source order, the inline
/// `style` attribute, and finally the page-break policy.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    ancestors: &[&ElementNode],
    ctx: &StyleContext,
) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    if let Some(p) = parent {
        style.inherit_from(p);
    }
    let parent_font = parent.map_or(16.0, |p| p.font_size);

    apply_tag_defaults(&mut style, &element.tag, parent_font);

    if matches!(element.tag, Tag::Td | Tag::Th) {
        if let Some(align) = element.attr("align") {
            apply_css_property(&mut style, "text-align", align, parent_font);
        }
    }

    for (prop, value) in ctx.sheet.matching(element, ancestors) {
        apply_css_property(&mut style, prop, value, parent_font);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline, parent_font);
    }

    ctx.breaks.apply(&mut style, element, ancestors);
    style
}

const INLINE_UNKNOWN: &[&str] = &[
    "abbr", "bdi", "bdo", "big", "cite", "dfn", "ins", "kbd", "mark", "q", "samp", "small",
    "time", "tt", "var", "label",
];

/// Default styles based on tag semantics.
fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag, parent_font: f32) {
    let heading = |s: &mut ComputedStyle, scale: f32| {
        s.font_size = 16.0 * scale;
        s.font_weight = FontWeight::Bold;
        s.margin_top = s.font_size * 0.5;
        s.margin_bottom = s.font_size * 0.4;
    };
    match tag {
        Tag::H1 => heading(s, 2.0),
        Tag::H2 => heading(s, 1.5),
        Tag::H3 => heading(s, 1.17),
        Tag::H4 => heading(s, 1.0),
        Tag::H5 => heading(s, 0.83),
        Tag::H6 => heading(s, 0.67),
        Tag::P => {
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 4.0;
        }
        Tag::Blockquote => {
            s.margin_bottom = 10.0;
            s.padding_left = 16.0;
            s.color = Color::rgb(85, 85, 85);
        }
        Tag::Pre => {
            s.white_space = WhiteSpace::Pre;
            s.font_family = FontFace::Courier;
            s.font_size = parent_font * 0.85;
            s.line_height = 1.35;
            s.background_color = Color::rgb(246, 248, 250);
            s.padding_top = 8.0;
            s.padding_right = 12.0;
            s.padding_bottom = 8.0;
            s.padding_left = 12.0;
            s.margin_bottom = 12.0;
        }
        Tag::Code => {
            s.display = Display::Inline;
            s.font_family = FontFace::Courier;
            // Inside <pre> the size is already reduced.
            if s.white_space != WhiteSpace::Pre {
                s.font_size = parent_font * 0.85;
            }
        }
        Tag::Hr => {
            s.height = Dimension::Px(1.0);
            s.background_color = Color::rgb(204, 204, 204);
            s.margin_top = 12.0;
            s.margin_bottom = 12.0;
        }
        Tag::Table => {
            s.display = Display::Table;
            s.margin_bottom = 12.0;
        }
        Tag::Thead | Tag::Tbody | Tag::Tfoot => {
            s.display = Display::TableRowGroup;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 4.0;
            s.padding_right = 8.0;
            s.padding_bottom = 4.0;
            s.padding_left = 8.0;
            s.border_width = 1.0;
            s.border_color = Color::rgb(170, 170, 170);
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
                s.background_color = Color::rgb(237, 237, 237);
            }
        }
        Tag::Strong | Tag::B => {
            s.display = Display::Inline;
            s.font_weight = FontWeight::Bold;
        }
        Tag::Em | Tag::I => {
            s.display = Display::Inline;
            s.font_style = FontStyle::Italic;
        }
        Tag::U => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Del | Tag::S => {
            s.display = Display::Inline;
            s.text_decoration = TextDecoration::LineThrough;
        }
        Tag::A => {
            s.display = Display::Inline;
            s.color = Color::rgb(6, 69, 173);
            s.text_decoration = TextDecoration::Underline;
        }
        Tag::Sup | Tag::Sub => {
            s.display = Display::Inline;
            s.font_size = parent_font * 0.75;
        }
        Tag::Span | Tag::Br | Tag::Input => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Style | Tag::Script | Tag::Head => {
            s.display = Display::None;
        }
        Tag::Div | Tag::Body | Tag::Html => {}
        Tag::Unknown(name) => {
            if INLINE_UNKNOWN.contains(&name.as_str()) {
                s.display = Display::Inline;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

fn apply_inline_style(s: &mut ComputedStyle, style_str: &str, parent_font: f32) {
    for (prop, value) in parse_declarations(style_str) {
        apply_css_property(s, &prop, &value, parent_font);
    }
}

fn breaks_page(val: &str) -> bool {
    matches!(val, "always" | "page" | "left" | "right")
}

fn font_face_for(family: &str) -> FontFace {
    for name in family.split(',') {
        let name = name
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_ascii_lowercase();
        if name.contains("mono") || name.contains("courier") || name == "consolas" || name == "menlo" {
            return FontFace::Courier;
        }
        if name == "serif" || name.contains("times") || name == "georgia" {
            return FontFace::Times;
        }
        if name == "sans-serif" || name.contains("helvetica") || name.contains("arial") {
            return FontFace::Helvetica;
        }
    }
    FontFace::Helvetica
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str, parent_font: f32) {
    let val = val.trim();
    let em = s.font_size;
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "list-item" => Display::ListItem,
                "table" => Display::Table,
                "table-row-group" | "table-header-group" | "table-footer-group" => {
                    Display::TableRowGroup
                }
                "table-row" => Display::TableRow,
                "table-cell" => Display::TableCell,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match val {
                "row" | "row-reverse" => FlexDirection::Row,
                "column" | "column-reverse" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "flex-wrap" => {
            s.flex_wrap = match val {
                "wrap" | "wrap-reverse" => FlexWrap::Wrap,
                _ => FlexWrap::NoWrap,
            }
        }
        "flex-grow" => {
            if let Ok(v) = val.parse() {
                s.flex_grow = v;
            }
        }
        "flex-shrink" => {
            if let Ok(v) = val.parse() {
                s.flex_shrink = v;
            }
        }
        "flex" => {
            if let Some(Ok(grow)) = val.split_whitespace().next().map(str::parse::<f32>) {
                s.flex_grow = grow;
            }
        }
        "justify-content" => {
            s.justify_content = match val {
                "flex-start" | "start" | "left" => JustifyContent::Start,
                "flex-end" | "end" | "right" => JustifyContent::End,
                "center" => JustifyContent::Center,
                "space-between" => JustifyContent::SpaceBetween,
                "space-around" => JustifyContent::SpaceAround,
                "space-evenly" => JustifyContent::SpaceEvenly,
                _ => s.justify_content,
            }
        }
        "align-items" => {
            s.align_items = match val {
                "flex-start" | "start" => AlignItems::Start,
                "flex-end" | "end" => AlignItems::End,
                "center" => AlignItems::Center,
                "stretch" => AlignItems::Stretch,
                _ => s.align_items,
            }
        }
        "gap" => {
            if let Some(px) = parse_length(val, em) {
                s.gap = px;
            }
        }
        "font-size" => {
            if let Some(px) = parse_font_size(val, parent_font) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => s.font_family = font_face_for(val),
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "background" => {
            if let Some(c) = val.split_whitespace().find_map(Color::parse) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val.to_ascii_lowercase().as_str() {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "text-decoration" | "text-decoration-line" => {
            s.text_decoration = if val.contains("line-through") {
                TextDecoration::LineThrough
            } else if val.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        "white-space" => {
            s.white_space = if val.starts_with("pre") {
                WhiteSpace::Pre
            } else {
                WhiteSpace::Normal
            }
        }
        "width" => s.width = parse_dimension(val, em),
        "height" => s.height = parse_dimension(val, em),
        "min-width" => s.min_width = parse_dimension(val, em),
        "max-width" => s.max_width = parse_dimension(val, em),
        "margin" => apply_shorthand_spacing(
            val,
            em,
            [
                &mut s.margin_top,
                &mut s.margin_right,
                &mut s.margin_bottom,
                &mut s.margin_left,
            ],
        ),
        "margin-top" => set_length(&mut s.margin_top, val, em),
        "margin-right" => set_length(&mut s.margin_right, val, em),
        "margin-bottom" => set_length(&mut s.margin_bottom, val, em),
        "margin-left" => set_length(&mut s.margin_left, val, em),
        "padding" => apply_shorthand_spacing(
            val,
            em,
            [
                &mut s.padding_top,
                &mut s.padding_right,
                &mut s.padding_bottom,
                &mut s.padding_left,
            ],
        ),
        "padding-top" => set_length(&mut s.padding_top, val, em),
        "padding-right" => set_length(&mut s.padding_right, val, em),
        "padding-bottom" => set_length(&mut s.padding_bottom, val, em),
        "padding-left" => set_length(&mut s.padding_left, val, em),
        "border" => {
            if val == "none" || val == "0" {
                s.border_width = 0.0;
                return;
            }
            for part in val.split_whitespace() {
                if let Some(px) = parse_length(part, em) {
                    s.border_width = px;
                } else if let Some(c) = Color::parse(part) {
                    s.border_color = c;
                } else if part == "none" || part == "hidden" {
                    s.border_width = 0.0;
                } else if s.border_width == 0.0 && matches!(part, "solid" | "dashed" | "dotted" | "double") {
                    s.border_width = 1.0;
                }
            }
        }
        "border-width" => set_length(&mut s.border_width, val, em),
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "border-style" => {
            if val == "none" || val == "hidden" {
                s.border_width = 0.0;
            }
        }
        "line-height" => {
            if val == "normal" {
                s.line_height = 1.2;
            } else if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(pct) = val.strip_suffix('%').and_then(|p| p.trim().parse::<f32>().ok()) {
                s.line_height = pct / 100.0;
            } else if let Some(px) = parse_length(val, em) {
                if s.font_size > 0.0 {
                    s.line_height = px / s.font_size;
                }
            }
        }
        "page-break-before" | "break-before" => s.page_break_before = breaks_page(val),
        "page-break-after" | "break-after" => s.page_break_after = breaks_page(val),
        "page-break-inside" | "break-inside" => {
            s.page_break_inside_avoid = val.starts_with("avoid");
        }
        _ => log::debug!("unsupported CSS property {prop:?} ignored"),
    }
}

fn set_length(slot: &mut f32, val: &str, em: f32) {
    if let Some(px) = parse_length(val, em) {
        *slot = px;
    }
}

/// Parse a CSS length to px. `em` is the font size `em` units refer to.
pub fn parse_length(s: &str, em: f32) -> Option<f32> {
    let s = s.trim().to_ascii_lowercase();
    let (number, factor) = if let Some(n) = s.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = s.strip_suffix("rem") {
        (n, 16.0)
    } else if let Some(n) = s.strip_suffix("em") {
        (n, em)
    } else if let Some(n) = s.strip_suffix("pt") {
        (n, 4.0 / 3.0)
    } else if let Some(n) = s.strip_suffix("mm") {
        (n, 96.0 / 25.4)
    } else if let Some(n) = s.strip_suffix("cm") {
        (n, 96.0 / 2.54)
    } else if let Some(n) = s.strip_suffix("in") {
        (n, 96.0)
    } else {
        // Bare numbers are only valid for zero, but be lenient.
        (s.as_str(), 1.0)
    };
    let v: f32 = number.trim().parse().ok()?;
    v.is_finite().then_some(v * factor)
}

fn parse_font_size(val: &str, parent_font: f32) -> Option<f32> {
    let keyword = match val {
        "xx-small" => Some(9.0),
        "x-small" => Some(10.0),
        "small" => Some(13.0),
        "medium" => Some(16.0),
        "large" => Some(18.0),
        "x-large" => Some(24.0),
        "xx-large" => Some(32.0),
        "smaller" => Some(parent_font / 1.2),
        "larger" => Some(parent_font * 1.2),
        _ => None,
    };
    keyword
        .or_else(|| {
            val.strip_suffix('%')
                .and_then(|p| p.trim().parse::<f32>().ok())
                .map(|p| parent_font * p / 100.0)
        })
        .or_else(|| parse_length(val, parent_font))
        .filter(|px| *px > 0.0)
}

fn parse_dimension(s: &str, em: f32) -> Dimension {
    let s = s.trim();
    if s == "auto" || s == "none" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_length(s, em).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

/// `[top, right, bottom, left]` from a 1–4 value shorthand. `auto` counts as 0.
fn apply_shorthand_spacing(val: &str, em: f32, [top, right, bottom, left]: [&mut f32; 4]) {
    let parts: Vec<f32> = val
        .split_whitespace()
        .map(|p| if p == "auto" { Some(0.0) } else { parse_length(p, em) })
        .collect::<Option<Vec<f32>>>()
        .unwrap_or_default();
    let (t, r, b, l) = match parts[..] {
        [a] => (a, a, a, a),
        [v, h] => (v, h, v, h),
        [t, h, b] => (t, h, b, h),
        [t, r, b, l] => (t, r, b, l),
        _ => return,
    };
    *top = t;
    *right = r;
    *bottom = b;
    *left = l;
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Original attributes (image src, checkbox state, ...)
        attrs: Vec<(String, String)>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

impl StyledNode {
    pub fn style(&self) -> &ComputedStyle {
        match self {
            StyledNode::Element { style, .. } | StyledNode::Text { style, .. } => style,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        match self {
            StyledNode::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            StyledNode::Text { .. } => None,
        }
    }
}

/// Build a styled tree from a DOM tree, resolving styles top-down.
/// Elements with `display: none` are dropped along with their subtree.
pub fn build_styled_tree(nodes: &[DomNode], ctx: &StyleContext) -> Vec<StyledNode> {
    let mut ancestors = Vec::new();
    build_nodes(nodes, None, &mut ancestors, ctx)
}

fn build_nodes<'a>(
    nodes: &'a [DomNode],
    parent_style: Option<&ComputedStyle>,
    ancestors: &mut Vec<&'a ElementNode>,
    ctx: &StyleContext,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style, ancestors, ctx);
                if style.display == Display::None {
                    continue;
                }
                ancestors.push(e);
                let children = build_nodes(&e.children, Some(&style), ancestors, ctx);
                ancestors.pop();
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if !text.is_empty() {
                    let style = parent_style.cloned().unwrap_or_default().for_text();
                    result.push(StyledNode::Text {
                        text: text.clone(),
                        style,
                    });
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    fn element(html: &str) -> ElementNode {
        parse_html(html)[0].as_element().unwrap().clone()
    }

    fn styled(html: &str, css: &str) -> Vec<StyledNode> {
        let ctx = StyleContext {
            sheet: Stylesheet::parse(css),
            breaks: BreakPolicy::from_settings(&PageBreakSettings::default()),
        };
        build_styled_tree(&parse_html(html), &ctx)
    }

    fn first_child_style(nodes: &[StyledNode]) -> &ComputedStyle {
        match &nodes[0] {
            StyledNode::Element { children, .. } => children[0].style(),
            StyledNode::Text { style, .. } => style,
        }
    }

    #[test]
    fn inline_style_font_size() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "font-size: 24px; color: #ff0000", 16.0);
        assert_eq!(s.font_size, 24.0);
        assert!((s.color.r - 1.0).abs() < 0.01);
    }

    #[test]
    fn color_parsing() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(Color::parse("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse("Gray"), Some(Color::rgb(128, 128, 128)));
        let rgba = Color::parse("rgba(255, 0, 0, 0.5)").unwrap();
        assert_eq!((rgba.r, rgba.a), (1.0, 0.5));
        assert_eq!(Color::parse("nonsense"), None);
    }

    #[test]
    fn selector_matching() {
        let root = element(r#"<div class="mdpdf"><div class="mdpdf-content"><h1 id="t" class="x y">T</h1></div></div>"#);
        let content = root.element_children().next().unwrap();
        let h1 = content.element_children().next().unwrap();
        let ancestors = [&root, content];

        let yes = [
            "h1",
            "*",
            ".x",
            "h1.x.y",
            "#t",
            ".mdpdf h1",
            ".mdpdf > .mdpdf-content > h1",
            "div h1#t",
        ];
        for s in yes {
            assert!(Selector::parse(s).unwrap().matches(h1, &ancestors), "{s}");
        }
        let no = ["h2", ".z", ".mdpdf > h1", "p h1", "#u"];
        for s in no {
            assert!(!Selector::parse(s).unwrap().matches(h1, &ancestors), "{s}");
        }
        assert!(Selector::parse("a:hover").is_none());
        assert!(Selector::parse("> a").is_none());
        assert!(Selector::parse("[href]").is_none());
    }

    #[test]
    fn specificity_orders_rules() {
        assert_eq!(Selector::parse("#a .b c").unwrap().specificity(), (1, 1, 1));
        let nodes = styled(
            r#"<div><p class="note" id="n">x</p></div>"#,
            "#n { color: blue } p.note { color: red } p { color: green }",
        );
        assert_eq!(first_child_style(&nodes).color, Color::rgb(0, 0, 255));

        // Equal specificity: later rule wins.
        let nodes = styled(r#"<div><p>x</p></div>"#, "p { color: red } p { color: green }");
        assert_eq!(first_child_style(&nodes).color, Color::rgb(0, 128, 0));
    }

    #[test]
    fn inline_style_beats_stylesheet() {
        let nodes = styled(
            r#"<div><p style="color: #000">x</p></div>"#,
            "#n, p { color: red !important }",
        );
        assert_eq!(first_child_style(&nodes).color, Color::BLACK);
    }

    #[test]
    fn comments_and_at_rules_are_skipped() {
        let sheet = Stylesheet::parse(
            "/* c */ @import url(x.css); @media print { p { color: red } } h1 { color: blue } @page { margin: 0 }",
        );
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn text_properties_inherit() {
        let nodes = styled(
            r#"<div style="color: red; font-family: 'Courier New', monospace"><p>x</p></div>"#,
            "",
        );
        let p = first_child_style(&nodes);
        assert_eq!(p.color, Color::rgb(255, 0, 0));
        assert_eq!(p.font_family, FontFace::Courier);
    }

    #[test]
    fn nested_heading_keeps_its_size() {
        let nodes = styled("<div><h1>x</h1></div>", "");
        assert_eq!(first_child_style(&nodes).font_size, 32.0);
    }

    #[test]
    fn style_and_script_are_dropped() {
        let nodes = styled("<div><style>p{}</style><script>x</script><p>y</p></div>", "");
        match &nodes[0] {
            StyledNode::Element { children, .. } => assert_eq!(children.len(), 1),
            StyledNode::Text { .. } => panic!("expected element"),
        }
    }

    #[test]
    fn stylesheet_from_style_elements() {
        let dom = parse_html("<div><style>p { color: red }</style><div><style>h1 { color: blue }</style></div></div>");
        assert_eq!(Stylesheet::from_document(&dom).len(), 2);
    }

    #[test]
    fn break_policy_modes() {
        let el = element(r#"<div class="page-break html2pdf__page-break chapter"></div>"#);
        let sheet = Stylesheet::parse(".page-break { page-break-before: always; }");

        let resolve = |settings: PageBreakSettings| {
            let ctx = StyleContext {
                sheet: sheet.clone(),
                breaks: BreakPolicy::from_settings(&settings),
            };
            resolve_style(&el, None, &[], &ctx)
        };

        let s = resolve(PageBreakSettings::default());
        assert!(s.page_break_before && s.page_break_after && !s.page_break_inside_avoid);

        let s = resolve(PageBreakSettings {
            mode: vec![PageBreakMode::AvoidAll],
            ..PageBreakSettings::default()
        });
        assert!(!s.page_break_before && !s.page_break_after && s.page_break_inside_avoid);

        let s = resolve(PageBreakSettings {
            mode: vec![PageBreakMode::Legacy],
            before: vec![".chapter".into()],
            ..PageBreakSettings::default()
        });
        assert!(s.page_break_before && s.page_break_after);
    }

    #[test]
    fn lengths_and_shorthands() {
        assert_eq!(parse_length("12pt", 16.0), Some(16.0));
        assert_eq!(parse_length("2em", 10.0), Some(20.0));
        assert_eq!(parse_length("wide", 10.0), None);
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "margin: 4px 8px; padding: 1px 2px 3px; border: 2px solid #333", 16.0);
        assert_eq!((s.margin_top, s.margin_right, s.margin_bottom, s.margin_left), (4.0, 8.0, 4.0, 8.0));
        assert_eq!((s.padding_top, s.padding_right, s.padding_bottom, s.padding_left), (1.0, 2.0, 3.0, 2.0));
        assert_eq!(s.border_width, 2.0);
        assert_eq!(s.border_color, Color::rgb(51, 51, 51));
    }

    #[test]
    fn table_cell_align_attribute() {
        let nodes = styled(r#"<tr><td align="right">1</td></tr>"#, "");
        assert_eq!(first_child_style(&nodes).text_align, TextAlign::Right);
    }
}
