//! Document builder – wraps sanitized content in the `.mdpdf` shell.
//!
//! Header and footer HTML and the caller's CSS are inserted as given. They
//! are trusted input and never pass through the sanitizer.

use crate::dom::{DomNode, ElementNode, Tag};
use crate::options::NormalizedOptions;
use crate::template::{resolve_template, Template, TemplateContext};

pub const WRAPPER_CLASS: &str = "mdpdf";
pub const HEADER_CLASS: &str = "mdpdf-header";
pub const CONTENT_CLASS: &str = "mdpdf-content";
pub const FOOTER_CLASS: &str = "mdpdf-footer";

/// Rules every document carries.
pub const BASELINE_CSS: &str = "
    .page-break { page-break-before: always; }
    .avoid-break { page-break-inside: avoid; }
    .mdpdf-content { }
";

fn section(class: &str, html: &str) -> ElementNode {
    let mut div = ElementNode::new(Tag::Div).with_attribute("class", class);
    div.set_inner_html(html);
    div
}

fn template_section(template: Option<&Template>, class: &str) -> Option<ElementNode> {
    resolve_template(template, &TemplateContext::first_page())
        .filter(|html| !html.is_empty())
        .map(|html| section(class, &html))
}

fn style_block(css: &str) -> Option<ElementNode> {
    if css.is_empty() {
        return None;
    }
    let mut style = ElementNode::new(Tag::Style).with_attribute("type", "text/css");
    style.append_child(DomNode::Text(css.to_string()));
    Some(style)
}

/// Assemble the detached document element.
///
/// Children, in order: optional header, content, optional footer, the
/// baseline style block and (when non-empty) the caller's style block.
pub fn build_document_element(sanitized_html: &str, options: &NormalizedOptions) -> ElementNode {
    let mut wrapper = ElementNode::new(Tag::Div)
        .with_attribute("class", WRAPPER_CLASS)
        .with_attribute("data-format", options.format.as_str())
        .with_attribute("data-orientation", options.orientation.as_str());

    if let Some(header) = template_section(options.header.as_ref(), HEADER_CLASS) {
        wrapper.append_child(header);
    }
    wrapper.append_child(section(CONTENT_CLASS, sanitized_html));
    if let Some(footer) = template_section(options.footer.as_ref(), FOOTER_CLASS) {
        wrapper.append_child(footer);
    }

    wrapper.children.extend(
        [style_block(BASELINE_CSS), style_block(&options.css)]
            .into_iter()
            .flatten()
            .map(DomNode::Element),
    );
    wrapper
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{normalize_options, Options};

    fn child_classes(e: &ElementNode) -> Vec<String> {
        e.element_children()
            .map(|c| c.attr("class").unwrap_or(c.tag.as_str()).to_string())
            .collect()
    }

    #[test]
    fn minimal_document_shape() {
        let opts = normalize_options(&Options::default());
        let doc = build_document_element("<p>Hi</p>", &opts);
        assert_eq!(doc.attr("class"), Some("mdpdf"));
        assert_eq!(doc.attr("data-format"), Some("a4"));
        assert_eq!(doc.attr("data-orientation"), Some("portrait"));
        assert_eq!(child_classes(&doc), ["mdpdf-content", "style"]);

        let content = doc.find_by_class(CONTENT_CLASS).unwrap();
        assert_eq!(content.inner_html(), "<p>Hi</p>");
        let style = doc.element_children().last().unwrap();
        assert!(style.text_content().contains(".page-break { page-break-before: always; }"));
        assert!(style.text_content().contains(".avoid-break { page-break-inside: avoid; }"));
    }

    #[test]
    fn header_footer_and_css_in_order() {
        let opts = normalize_options(&Options {
            header: Some("<b>Page {{page}} of {{total}}</b>".into()),
            footer: Some(Template::computed(|ctx| format!("p{}", ctx.page))),
            css: Some("h1 { color: red }".into()),
            ..Options::default()
        });
        let doc = build_document_element("", &opts);
        assert_eq!(
            child_classes(&doc),
            ["mdpdf-header", "mdpdf-content", "mdpdf-footer", "style", "style"]
        );
        let header = doc.find_by_class(HEADER_CLASS).unwrap();
        assert_eq!(header.inner_html(), "<b>Page 1 of </b>");
        assert_eq!(doc.find_by_class(FOOTER_CLASS).unwrap().text_content(), "p1");
        let user_style = doc.element_children().last().unwrap();
        assert_eq!(user_style.text_content(), "h1 { color: red }");
    }

    #[test]
    fn empty_templates_are_omitted() {
        let opts = normalize_options(&Options {
            header: Some("".into()),
            footer: Some(Template::computed(|_| String::new())),
            ..Options::default()
        });
        let doc = build_document_element("<p>x</p>", &opts);
        assert_eq!(child_classes(&doc), ["mdpdf-content", "style"]);
    }

    #[test]
    fn header_html_is_not_sanitized() {
        let opts = normalize_options(&Options {
            header: Some(r#"<span onclick="x()">h</span>"#.into()),
            ..Options::default()
        });
        let doc = build_document_element("", &opts);
        let span = doc.find_all(|e| e.tag == Tag::Span);
        assert_eq!(span[0].attr("onclick"), Some("x()"));
    }
}
