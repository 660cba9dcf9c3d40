//! Pipeline – ties together styling, layout, pagination and rendering into
//! a single function call, and exposes it as the default [`PdfEngine`].

use std::path::Path;

use crate::dom::DomNode;
use crate::error::RenderError;
use crate::export::{CaptureJob, PdfEngine};
use crate::layout::{compute_layout, scale_boxes};
use crate::layout_config::LayoutConfig;
use crate::observer::measure;
use crate::options::{PageBreakSettings, PaperGeometry};
use crate::pagination::{paginate, PageGeometry};
use crate::render::{render_pdf, ImageEncoding};
use crate::style::{build_styled_tree, BreakPolicy, StyleContext, Stylesheet};

/// Points per millimetre.
pub const PT_PER_MM: f32 = 72.0 / 25.4;

/// Named paper sizes in points, portrait.
const PAPER_SIZES: &[(&str, f32, f32)] = &[
    ("a0", 2383.94, 3370.39),
    ("a1", 1683.78, 2383.94),
    ("a2", 1190.55, 1683.78),
    ("a3", 841.89, 1190.55),
    ("a4", 595.28, 841.89),
    ("a5", 419.53, 595.28),
    ("a6", 297.64, 419.53),
    ("b4", 708.66, 1000.63),
    ("b5", 498.9, 708.66),
    ("letter", 612.0, 792.0),
    ("legal", 612.0, 1008.0),
    ("tabloid", 792.0, 1224.0),
    ("ledger", 1224.0, 792.0),
];

/// Portrait size of a named paper format (case-insensitive).
pub fn paper_size_pt(format: &str) -> Option<(f32, f32)> {
    let format = format.trim();
    PAPER_SIZES
        .iter()
        .find(|(name, _, _)| name.eq_ignore_ascii_case(format))
        .map(|&(_, w, h)| (w, h))
}

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

impl PageOrientation {
    /// Anything starting with `l` is landscape.
    pub fn parse(value: &str) -> Self {
        if value.trim().to_ascii_lowercase().starts_with('l') {
            PageOrientation::Landscape
        } else {
            PageOrientation::Portrait
        }
    }
}

/// Configuration for the PDF generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Portrait page width in points (default: A4 = 595.28).
    pub page_width: f32,
    /// Portrait page height in points (default: A4 = 841.89).
    pub page_height: f32,
    /// Page margin in points on every side.
    pub page_margin: f32,
    /// Page orientation; swaps effective width/height when `Landscape`.
    pub orientation: PageOrientation,
    /// Width in CSS px the content is laid out at before scaling to the page.
    pub capture_width: f32,
    pub pagebreak: PageBreakSettings,
    pub image: ImageEncoding,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "document".to_string(),
            page_width: 595.28,
            page_height: 841.89,
            page_margin: 10.0 * PT_PER_MM,
            orientation: PageOrientation::Portrait,
            capture_width: 800.0,
            pagebreak: PageBreakSettings::default(),
            image: ImageEncoding::default(),
        }
    }
}

impl PipelineConfig {
    /// Resolve a paper geometry. Unknown formats are an error.
    pub fn with_paper(mut self, paper: &PaperGeometry) -> Result<Self, RenderError> {
        let (w, h) =
            paper_size_pt(&paper.format).ok_or_else(|| RenderError::UnknownFormat(paper.format.clone()))?;
        self.page_width = w;
        self.page_height = h;
        self.orientation = PageOrientation::parse(&paper.orientation);
        Ok(self)
    }

    /// Everything one capture job asks for.
    pub fn from_job(job: &CaptureJob) -> Result<Self, RenderError> {
        let title = Path::new(&job.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
            .to_string();
        let config = Self {
            title,
            page_margin: job.margin * PT_PER_MM,
            capture_width: job.capture_width,
            pagebreak: job.pagebreak.clone(),
            image: ImageEncoding::from_settings(&job.image, &job.capture),
            ..Self::default()
        };
        config.with_paper(&job.paper)
    }

    /// Effective page width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_width,
            PageOrientation::Landscape => self.page_height,
        }
    }

    /// Effective page height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_height,
            PageOrientation::Landscape => self.page_width,
        }
    }

    pub fn geometry(&self) -> PageGeometry {
        let (w, h) = (self.effective_width(), self.effective_height());
        // Margins that leave no room are ignored.
        let margin = if 2.0 * self.page_margin < w.min(h) {
            self.page_margin.max(0.0)
        } else {
            0.0
        };
        PageGeometry {
            width: w,
            height: h,
            margin,
        }
    }
}

/// Generate only the layout config (no PDF rendering).
///
/// `nodes` is laid out `capture_width` px wide, then scaled to the page's
/// content width and paginated.
pub fn compute_layout_config(nodes: &[DomNode], config: &PipelineConfig) -> Result<LayoutConfig, RenderError> {
    let ctx = StyleContext {
        sheet: Stylesheet::from_document(nodes),
        breaks: BreakPolicy::from_settings(&config.pagebreak),
    };
    let styled = measure("mdpdf:style", || build_styled_tree(nodes, &ctx));

    let width = if config.capture_width > 0.0 {
        config.capture_width
    } else {
        PipelineConfig::default().capture_width
    };
    let mut boxes = measure("mdpdf:layout", || compute_layout(&styled, width))?;

    let geometry = config.geometry();
    scale_boxes(&mut boxes, geometry.content_width() / width, geometry.margin);

    let mut layout = LayoutConfig::new(config.title.clone(), geometry.width, geometry.height);
    layout.pages = measure("mdpdf:paginate", || paginate(&boxes, geometry));
    Ok(layout)
}

/// Full pipeline: DOM → PDF bytes, plus the layout that was rendered.
pub fn generate_pdf(nodes: &[DomNode], config: &PipelineConfig) -> Result<(Vec<u8>, LayoutConfig), RenderError> {
    let layout = compute_layout_config(nodes, config)?;
    let bytes = measure("mdpdf:render", || render_pdf(&layout, &config.image))?;
    log::debug!("{}: {} page(s)", config.title, layout.page_count());
    Ok((bytes, layout))
}

/// The built-in engine: lays the element out with Taffy and writes the PDF
/// with printpdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForgeEngine;

impl PdfEngine for ForgeEngine {
    fn capture(&self, job: &CaptureJob) -> Result<Vec<u8>, RenderError> {
        let config = PipelineConfig::from_job(job)?;
        let nodes = [DomNode::Element(job.element.clone())];
        let (bytes, _) = generate_pdf(&nodes, &config)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::dom::{ElementNode, Tag};
    use crate::options::{normalize_options, Options};

    fn job(options: Options) -> CaptureJob {
        let mut element = ElementNode::new(Tag::Div);
        element.set_inner_html("<h1>Hello</h1><p>World</p>");
        CaptureJob::new(&element, &normalize_options(&options), 800.0)
    }

    #[test]
    fn pipeline_basic() {
        let nodes = parse_html("<h1>Hello</h1><p>World</p>");
        let (bytes, config) = generate_pdf(&nodes, &PipelineConfig::default()).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
        assert_eq!(config.page_count(), 1);
        assert_eq!(config.text_lines().collect::<Vec<_>>(), ["Hello", "World"]);
    }

    #[test]
    fn paper_sizes() {
        assert_eq!(paper_size_pt("A4"), Some((595.28, 841.89)));
        assert_eq!(paper_size_pt(" letter "), Some((612.0, 792.0)));
        assert_eq!(paper_size_pt("b9"), None);
    }

    #[test]
    fn config_from_job() {
        let config = PipelineConfig::from_job(&job(Options {
            filename: Some("reports/q3.pdf".into()),
            format: Some("letter".into()),
            orientation: Some("Landscape".into()),
            margin: Some(25.4f64.into()),
            ..Options::default()
        }))
        .unwrap();
        assert_eq!(config.title, "q3");
        assert_eq!((config.effective_width(), config.effective_height()), (792.0, 612.0));
        assert!((config.page_margin - 72.0).abs() < 0.01);
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = ForgeEngine
            .capture(&job(Options {
                format: Some("b9".into()),
                ..Options::default()
            }))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid format: b9");
    }

    #[test]
    fn oversized_margins_are_ignored() {
        let config = PipelineConfig {
            page_margin: 400.0,
            ..PipelineConfig::default()
        };
        assert_eq!(config.geometry().margin, 0.0);
    }

    #[test]
    fn content_is_scaled_into_the_margins() {
        let nodes = parse_html(r#"<p style="text-align: right">x</p>"#);
        let config = PipelineConfig::default();
        let layout = compute_layout_config(&nodes, &config).unwrap();
        let p = &layout.pages[0].boxes[0];
        assert!((p.x - config.page_margin).abs() < 0.01);
        assert!((p.width - (595.28 - 2.0 * config.page_margin)).abs() < 0.01);
        assert!((p.y - config.page_margin).abs() < 0.01);
    }

    #[test]
    fn document_stylesheets_apply() {
        let nodes = parse_html("<div><style>.big { font-size: 40px }</style><p class=\"big\">x</p></div>");
        let layout = compute_layout_config(&nodes, &PipelineConfig::default()).unwrap();
        let p = &layout.pages[0].boxes[0].children[0];
        let text = p.children[0].text.as_ref().unwrap();
        let k = (595.28 - 2.0 * PipelineConfig::default().page_margin) / 800.0;
        assert!((text.font_size - 40.0 * k).abs() < 0.01);
    }

    #[test]
    fn engine_produces_a_pdf() {
        let bytes = ForgeEngine.capture(&job(Options::default())).unwrap();
        assert_eq!(&bytes[0..5], b"%PDF-");
    }
}
