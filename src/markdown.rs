//! Markdown → sanitized HTML.
//!
//! Parsing is done by comrak under a process-wide rule set. The rule set is
//! applied lazily on first use and can be replaced with [`configure_marked`].
//! The parser output always goes through ammonia before it reaches a DOM.

use std::borrow::Cow;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Markdown rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserOptions {
    /// GitHub-flavoured extensions: tables, strikethrough, autolinks, task lists.
    pub gfm: bool,
    /// Turn single newlines inside a paragraph into `<br>`.
    pub breaks: bool,
    /// Typographic quotes, dashes and ellipses.
    pub smartypants: bool,
    /// Anchor ids on headings.
    pub header_ids: bool,
    /// E-mail obfuscation. Recorded only; comrak never mangles autolinks.
    pub mangle: bool,
}

impl ParserOptions {
    /// The fixed rule set every configuration starts from.
    pub const BASELINE: Self = Self {
        gfm: true,
        breaks: false,
        smartypants: true,
        header_ids: true,
        mangle: false,
    };

    /// `self` with every field present in `overrides` replaced.
    pub fn with_overrides(&self, overrides: &ParserOverrides) -> Self {
        Self {
            gfm: overrides.gfm.unwrap_or(self.gfm),
            breaks: overrides.breaks.unwrap_or(self.breaks),
            smartypants: overrides.smartypants.unwrap_or(self.smartypants),
            header_ids: overrides.header_ids.unwrap_or(self.header_ids),
            mangle: overrides.mangle.unwrap_or(self.mangle),
        }
    }

    fn to_comrak_options(self) -> comrak::Options {
        let mut options = comrak::Options::default();

        options.extension.strikethrough = self.gfm;
        options.extension.table = self.gfm;
        options.extension.autolink = self.gfm;
        options.extension.tasklist = self.gfm;
        options.extension.header_ids = self.header_ids.then(String::new);

        options.parse.smart = self.smartypants;
        options.render.hardbreaks = self.breaks;
        // Raw HTML is kept like any markdown parser would; the sanitizer is
        // the gate.
        options.render.unsafe_ = true;

        options
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self::BASELINE
    }
}

/// Partial rule set accepted by [`configure_marked`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserOverrides {
    pub gfm: Option<bool>,
    pub breaks: Option<bool>,
    pub smartypants: Option<bool>,
    pub header_ids: Option<bool>,
    pub mangle: Option<bool>,
}

// ---------------------------------------------------------------------------
// Process-wide parser state
// ---------------------------------------------------------------------------

struct Registry {
    options: ParserOptions,
    configured: bool,
}

static REGISTRY: RwLock<Registry> = RwLock::new(Registry {
    options: ParserOptions::BASELINE,
    configured: false,
});

/// Apply the baseline rule set unless something has configured the parser
/// already. Calling it repeatedly is harmless.
pub fn configure_once() {
    if REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .configured
    {
        return;
    }
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if !registry.configured {
        registry.options = ParserOptions::BASELINE;
        registry.configured = true;
        log::debug!("markdown parser configured with baseline rules");
    }
}

/// Replace the process-wide rule set with `overrides` applied to the
/// baseline. Earlier calls are not carried over.
pub fn configure_marked(overrides: &ParserOverrides) {
    let options = ParserOptions::BASELINE.with_overrides(overrides);
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.options = options;
    registry.configured = true;
    log::debug!("markdown parser reconfigured: {options:?}");
}

/// Return to the unconfigured baseline state.
pub fn reset_parser() {
    let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    registry.options = ParserOptions::BASELINE;
    registry.configured = false;
}

/// Rule set currently in effect.
pub fn parser_options() -> ParserOptions {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .options
}

pub fn is_configured() -> bool {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .configured
}

// ---------------------------------------------------------------------------
// Parse + sanitize
// ---------------------------------------------------------------------------

/// Parse markdown to raw (unsanitized) HTML.
pub fn parse_markdown(markdown: &str, options: &ParserOptions) -> String {
    comrak::markdown_to_html(markdown, &options.to_comrak_options())
}

fn is_data_url(value: &str) -> bool {
    value.trim_start().get(..5).is_some_and(|s| s.eq_ignore_ascii_case("data:"))
}

fn sanitizer() -> ammonia::Builder<'static> {
    let mut builder = ammonia::Builder::default();
    builder
        .add_generic_attributes(&["id", "class", "style"])
        .add_tags(&["input"])
        .add_tag_attributes("input", &["type", "checked", "disabled"])
        .add_url_schemes(&["data"])
        .attribute_filter(|element, attribute, value| {
            // data: URLs are for inline images only.
            let url_attribute = matches!(attribute, "href" | "src" | "cite");
            if url_attribute && is_data_url(value) && !(element == "img" && attribute == "src") {
                None
            } else {
                Some(Cow::Borrowed(value))
            }
        });
    builder
}

/// Strip scripts, event handlers and unsafe URLs.
pub fn sanitize_html(html: &str) -> String {
    sanitizer().clean(html).to_string()
}

/// Parse and sanitize with an explicit rule set.
pub fn render_markdown(markdown: &str, options: &ParserOptions) -> String {
    sanitize_html(&parse_markdown(markdown, options))
}

/// Parse and sanitize with the process-wide rule set. `None` is treated as
/// an empty document.
pub fn markdown_to_html(markdown: Option<&str>) -> String {
    configure_once();
    render_markdown(markdown.unwrap_or_default(), &parser_options())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(md: &str) -> String {
        render_markdown(md, &ParserOptions::BASELINE)
    }

    #[test]
    fn overrides_apply_onto_receiver() {
        let o = ParserOptions::BASELINE.with_overrides(&ParserOverrides {
            breaks: Some(true),
            gfm: Some(false),
            ..ParserOverrides::default()
        });
        assert!(o.breaks);
        assert!(!o.gfm);
        assert!(o.smartypants);
        assert!(o.header_ids);
        assert!(!o.mangle);
    }

    #[test]
    fn gfm_tables_and_strikethrough() {
        let html = baseline("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~");
        assert!(html.contains("<table>"), "{html}");
        assert!(html.contains("<del>gone</del>"), "{html}");

        let plain = ParserOptions {
            gfm: false,
            ..ParserOptions::BASELINE
        };
        let html = render_markdown("~~gone~~", &plain);
        assert!(!html.contains("<del>"), "{html}");
    }

    #[test]
    fn soft_breaks_only_with_breaks_enabled() {
        assert!(!baseline("line1\nline2").contains("<br"));
        let breaks = ParserOptions {
            breaks: true,
            ..ParserOptions::BASELINE
        };
        assert!(render_markdown("line1\nline2", &breaks).contains("<br"));
    }

    #[test]
    fn smart_punctuation() {
        assert!(baseline("say \"hi\"").contains('\u{201C}'));
        let dumb = ParserOptions {
            smartypants: false,
            ..ParserOptions::BASELINE
        };
        assert!(!render_markdown("say \"hi\"", &dumb).contains('\u{201C}'));
    }

    #[test]
    fn heading_ids_survive_sanitizing() {
        let html = baseline("# Hello World");
        assert!(html.contains(r#"id="hello-world""#), "{html}");
        let no_ids = ParserOptions {
            header_ids: false,
            ..ParserOptions::BASELINE
        };
        assert!(!render_markdown("# Hello World", &no_ids).contains("id="));
    }

    #[test]
    fn scripts_and_handlers_are_removed() {
        let html = baseline(
            "hi <script>alert(1)</script>\n\n<img src=\"x.png\" onerror=\"alert(2)\">\n\n[x](javascript:alert(3))",
        );
        assert!(!html.to_lowercase().contains("<script"), "{html}");
        assert!(!html.contains("onerror"), "{html}");
        assert!(!html.contains("javascript:"), "{html}");
    }

    #[test]
    fn data_urls_only_on_images() {
        let html = sanitize_html(
            r#"<img src="data:image/png;base64,AAAA"><a href="data:text/html;base64,AAAA">x</a>"#,
        );
        assert!(html.contains(r#"src="data:image/png;base64,AAAA""#), "{html}");
        assert!(!html.contains("data:text/html"), "{html}");
    }

    #[test]
    fn text_attributes_starting_with_data_are_kept() {
        let html = sanitize_html(
            r#"<img src="chart.png" alt="data: Q3 chart"><a href="https://example.com" title="Data: sources">x</a>"#,
        );
        assert!(html.contains(r#"alt="data: Q3 chart""#), "{html}");
        assert!(html.contains(r#"title="Data: sources""#), "{html}");
    }

    #[test]
    fn task_list_checkboxes_are_kept() {
        let html = baseline("- [x] done\n- [ ] todo");
        assert!(html.contains("<input"), "{html}");
        assert!(html.contains("checkbox"), "{html}");
    }

    #[test]
    fn malformed_markdown_still_produces_html() {
        let html = baseline("**unclosed _mixed [link](\n\n```\nno fence end");
        assert!(!html.is_empty());
    }
}
