//! In-page rendering entry point.

use crate::document::build_document_element;
use crate::dom::{DomNode, ElementNode};
use crate::error::{Error, Result};
use crate::markdown::{configure_once, markdown_to_html};
use crate::options::{normalize_options, Options};

/// Render `markdown` into a document element and append it to `container`.
///
/// Returns the appended element. Fails before touching anything when no
/// container is supplied.
pub fn render<'a>(
    markdown: Option<&str>,
    container: Option<&'a mut ElementNode>,
    options: &Options,
) -> Result<&'a ElementNode> {
    configure_once();
    let container = container.ok_or(Error::MissingArgument {
        argument: "Container element",
        operation: "render",
    })?;

    let options = normalize_options(options);
    let html = markdown_to_html(markdown);
    container.append_child(build_document_element(&html, &options));

    match container.children.last() {
        Some(DomNode::Element(element)) => Ok(element),
        _ => Err(Error::export("", "Failed to render document")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CONTENT_CLASS, WRAPPER_CLASS};
    use crate::dom::Tag;

    #[test]
    fn missing_container_is_rejected() {
        let err = render(Some("# hi"), None, &Options::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingArgument {
                argument: "Container element",
                operation: "render"
            }
        ));
    }

    #[test]
    fn appends_and_returns_document() {
        let mut container = ElementNode::new(Tag::Div);
        container.set_inner_html("<p>existing</p>");

        let doc = render(Some("# Title"), Some(&mut container), &Options::default()).unwrap();
        assert!(doc.has_class(WRAPPER_CLASS));
        let content = doc.find_by_class(CONTENT_CLASS).unwrap();
        assert!(content.inner_html().contains("Title"));

        assert_eq!(container.children.len(), 2);
    }

    #[test]
    fn none_markdown_renders_empty_content() {
        let mut container = ElementNode::new(Tag::Div);
        let doc = render(None, Some(&mut container), &Options::default()).unwrap();
        let content = doc.find_by_class(CONTENT_CLASS).unwrap();
        assert_eq!(content.text_content().trim(), "");
    }
}
