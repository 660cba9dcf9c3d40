//! # markdown-pdf – Markdown → sanitized HTML → PDF
//!
//! The crate renders markdown into a styled document element and exports
//! that element as a paginated PDF. The stages are:
//!
//! 1. **Parse** – markdown → HTML with comrak, sanitized by ammonia ([`markdown`])
//! 2. **Build** – header / content / footer wrapper with styles ([`document`])
//! 3. **Style** – tag defaults, document stylesheets and inline styles ([`style`])
//! 4. **Layout** – flexbox layout with Taffy ([`layout`])
//! 5. **Paginate** – split onto pages of the requested paper size ([`pagination`])
//! 6. **Render** – emit PDF bytes via printpdf ([`render`](mod@render))
//!
//! [`render()`] appends the built document to a container element;
//! [`download`] and [`download_from_element`] run the export against a
//! [`Page`]. A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod api;
pub mod document;
pub mod dom;
pub mod error;
pub mod export;
pub mod ffi;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod markdown;
pub mod observer;
pub mod options;
pub mod page;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod style;
pub mod template;

// Re-exports for convenience
pub use api::render;
pub use dom::{DomNode, ElementNode, Tag};
pub use error::{Error, RenderError, Result};
pub use export::{download, download_from_element, CaptureJob, PdfEngine};
pub use markdown::{configure_marked, reset_parser, ParserOverrides};
pub use options::{normalize_options, Options};
pub use page::{DownloadTarget, Page};
pub use pipeline::{generate_pdf, ForgeEngine, PageOrientation, PipelineConfig};
pub use template::{Template, TemplateContext};
