//! Header / footer templates.
//!
//! A template is either static HTML with `{{page}}` / `{{total}}`
//! placeholders, or a function of the [`TemplateContext`].

use std::fmt;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Deserializer};

static PAGE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*page\s*\}\}").expect("valid page token pattern"));
static TOTAL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*total\s*\}\}").expect("valid total token pattern"));

/// Values available to a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TemplateContext {
    pub page: u32,
    /// Total page count, when known. The document builder never knows it.
    pub total: Option<u32>,
}

impl TemplateContext {
    /// The context the document builder resolves against: page 1, total unknown.
    pub const fn first_page() -> Self {
        Self {
            page: 1,
            total: None,
        }
    }
}

type ComputeFn = dyn Fn(&TemplateContext) -> String + Send + Sync;

/// Header or footer template.
#[derive(Clone)]
pub enum Template {
    Static(String),
    Computed(Arc<ComputeFn>),
}

impl Template {
    pub fn computed<F>(f: F) -> Self
    where
        F: Fn(&TemplateContext) -> String + Send + Sync + 'static,
    {
        Template::Computed(Arc::new(f))
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Template::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Template::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        Template::Static(s.to_string())
    }
}

impl From<String> for Template {
    fn from(s: String) -> Self {
        Template::Static(s)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Template::Static)
    }
}

/// Resolve a template to HTML text.
///
/// Returns `None` when there is no template or the static text is empty.
pub fn resolve_template(template: Option<&Template>, ctx: &TemplateContext) -> Option<String> {
    match template? {
        Template::Static(text) if text.is_empty() => None,
        Template::Static(text) => {
            let page = if ctx.page == 0 {
                String::new()
            } else {
                ctx.page.to_string()
            };
            let total = ctx.total.map(|t| t.to_string()).unwrap_or_default();
            let text = PAGE_TOKEN.replace_all(text, regex::NoExpand(&page));
            let text = TOTAL_TOKEN.replace_all(&text, regex::NoExpand(&total));
            Some(text.into_owned())
        }
        Template::Computed(f) => Some((**f)(ctx)),
    }
}
