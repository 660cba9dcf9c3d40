//! PDF export stage.
//!
//! Drives a [`PdfEngine`] against a [`Page`]: observer suppression, an
//! off-screen sandbox for markdown exports, scroll reset around the capture,
//! the engine call on tokio's blocking pool and the download write. Every
//! failure comes back as [`Error::Export`]; cleanup runs through scope guards
//! on every path.

use std::any::Any;
use std::future::Future;

use tokio::task::JoinError;

use crate::document::build_document_element;
use crate::dom::{ElementNode, Tag};
use crate::error::{Error, RenderError, Result};
use crate::markdown::markdown_to_html;
use crate::observer::ObserverSuppression;
use crate::options::{
    normalize_options, CaptureSettings, ImageSettings, NormalizedOptions, Options,
    PageBreakSettings, PaperGeometry,
};
use crate::page::{Page, SandboxId, SANDBOX_WIDTH};

pub const DOWNLOAD_FALLBACK: &str = "Failed to generate PDF";
pub const ELEMENT_FALLBACK: &str = "Failed to generate PDF from element";
const ENGINE_ERROR_FALLBACK: &str = "html2pdf threw synchronously";
const ENGINE_PANIC_FALLBACK: &str = "html2pdf failed";

/// An HTML → PDF converter.
///
/// `capture` runs on a blocking thread. Returning `Err` and panicking are
/// both reported to the caller as export failures.
pub trait PdfEngine: Send + Sync + 'static {
    fn capture(&self, job: &CaptureJob) -> Result<Vec<u8>, RenderError>;
}

/// Everything the engine is handed for one export.
#[derive(Debug, Clone)]
pub struct CaptureJob {
    /// Prepared copy of the element being exported.
    pub element: ElementNode,
    /// Page margin in mm.
    pub margin: f32,
    pub filename: String,
    pub image: ImageSettings,
    /// Caller capture settings with the scroll offsets pinned to zero and
    /// tainting disabled.
    pub capture: CaptureSettings,
    pub paper: PaperGeometry,
    pub pagebreak: PageBreakSettings,
    /// Width in CSS px the element is laid out at.
    pub capture_width: f32,
}

impl CaptureJob {
    pub fn new(element: &ElementNode, options: &NormalizedOptions, capture_width: f32) -> Self {
        let capture = CaptureSettings {
            scroll_x: Some(0.0),
            scroll_y: Some(0.0),
            allow_taint: Some(false),
            ..options.html2canvas.clone()
        };
        Self {
            element: prepare_clone(element),
            margin: options.margin,
            filename: options.filename.clone(),
            image: options.image.clone(),
            capture,
            paper: options.paper.clone(),
            pagebreak: options.pagebreak.clone(),
            capture_width,
        }
    }
}

/// Copy `element` for capture, marking every image for anonymous CORS.
/// The caller's tree is not touched.
pub fn prepare_clone(element: &ElementNode) -> ElementNode {
    let mut clone = element.clone();
    clone.visit_mut(&mut |e| {
        if e.tag == Tag::Img {
            e.set_attribute("crossorigin", "anonymous");
        }
    });
    clone
}

// ---------------------------------------------------------------------------
// Scope guards
// ---------------------------------------------------------------------------

struct ScrollGuard<'a> {
    page: &'a Page,
    saved: (f32, f32),
}

impl<'a> ScrollGuard<'a> {
    fn to_top(page: &'a Page) -> Self {
        let saved = page.scroll_position();
        page.scroll_to(0.0, 0.0);
        Self { page, saved }
    }
}

impl Drop for ScrollGuard<'_> {
    fn drop(&mut self) {
        let (x, y) = self.saved;
        self.page.scroll_to(x, y);
    }
}

struct SandboxGuard<'a> {
    page: &'a Page,
    id: SandboxId,
}

impl<'a> SandboxGuard<'a> {
    fn attach(page: &'a Page, element: ElementNode) -> Self {
        let id = page.attach_sandbox(element);
        Self { page, id }
    }
}

impl Drop for SandboxGuard<'_> {
    fn drop(&mut self) {
        self.page.remove_sandbox(self.id);
    }
}

/// Run `f` with the page scrolled to the origin.
///
/// Waits two animation frames after scrolling so the change is painted. The
/// previous scroll position is restored however `f` finishes.
pub async fn with_scroll_at_top<F, Fut, T>(page: &Page, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let _scroll = ScrollGuard::to_top(page);
    page.next_animation_frame().await;
    page.next_animation_frame().await;
    f().await
}

// ---------------------------------------------------------------------------
// Engine step
// ---------------------------------------------------------------------------

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        String::new()
    }
}

fn join_message(err: JoinError) -> String {
    if err.is_panic() {
        panic_message(err.into_panic())
    } else {
        err.to_string()
    }
}

fn or_fallback(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

/// Capture on the blocking pool and save the result. Errors carry a
/// non-empty message unless the save itself produced an empty one.
async fn capture_and_save(page: &Page, job: CaptureJob) -> std::result::Result<(), String> {
    let engine = page.engine();
    let filename = job.filename.clone();

    // The engine keeps running if this future is dropped, so it holds its
    // own suppression until it returns.
    let suppressed = ObserverSuppression::acquire();
    let capture = move || {
        let _suppressed = suppressed;
        engine.capture(&job)
    };
    let bytes = match tokio::task::spawn_blocking(capture).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return Err(or_fallback(e.to_string(), ENGINE_ERROR_FALLBACK)),
        Err(join) => return Err(or_fallback(join_message(join), ENGINE_PANIC_FALLBACK)),
    };

    page.save_download(&filename, bytes)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Render `markdown` into a document and export it as a PDF download.
///
/// The document is laid out in an off-screen sandbox 800px wide that is
/// removed again afterwards.
pub async fn download(page: &Page, markdown: Option<&str>, options: &Options) -> Result<()> {
    let _suppressed = ObserverSuppression::acquire();

    let options = normalize_options(options);
    let html = markdown_to_html(markdown);
    let element = build_document_element(&html, &options);

    let sandbox = SandboxGuard::attach(page, element);
    let Some(attached) = page.sandbox_content(sandbox.id) else {
        return Err(Error::export("", DOWNLOAD_FALLBACK));
    };
    let job = CaptureJob::new(&attached, &options, SANDBOX_WIDTH);

    with_scroll_at_top(page, || capture_and_save(page, job))
        .await
        .map_err(|message| Error::export(message, DOWNLOAD_FALLBACK))
}

/// Export an existing element, laid out at the page's viewport width.
pub async fn download_from_element(
    page: &Page,
    element: &ElementNode,
    options: &Options,
) -> Result<()> {
    let options = normalize_options(options);
    let _suppressed = ObserverSuppression::acquire();

    let job = CaptureJob::new(element, &options, page.viewport().width);

    with_scroll_at_top(page, || capture_and_save(page, job))
        .await
        .map_err(|message| Error::export(message, ELEMENT_FALLBACK))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Fixed(std::result::Result<Vec<u8>, &'static str>);

    impl PdfEngine for Fixed {
        fn capture(&self, _job: &CaptureJob) -> std::result::Result<Vec<u8>, RenderError> {
            self.0.clone().map_err(|m| RenderError::Engine(m.to_string()))
        }
    }

    struct Panics(&'static str);

    impl PdfEngine for Panics {
        fn capture(&self, _job: &CaptureJob) -> std::result::Result<Vec<u8>, RenderError> {
            panic!("{}", self.0)
        }
    }

    fn page_with(engine: impl PdfEngine) -> Page {
        Page::in_memory().with_engine(Arc::new(engine))
    }

    #[test]
    fn capture_job_pins_scroll_and_taint() {
        let opts = normalize_options(&Options {
            html2canvas: Some(CaptureSettings {
                scale: Some(3.0),
                scroll_y: Some(500.0),
                allow_taint: Some(true),
                ..CaptureSettings::default()
            }),
            margin: Some(4.0f64.into()),
            ..Options::default()
        });
        let job = CaptureJob::new(&ElementNode::new(Tag::Div), &opts, 640.0);
        assert_eq!(job.capture.scale, Some(3.0));
        assert_eq!(job.capture.scroll_x, Some(0.0));
        assert_eq!(job.capture.scroll_y, Some(0.0));
        assert_eq!(job.capture.allow_taint, Some(false));
        assert_eq!(job.margin, 4.0);
        assert_eq!(job.capture_width, 640.0);
    }

    #[test]
    fn clone_marks_images_only_in_copy() {
        let mut root = ElementNode::new(Tag::Div);
        root.set_inner_html(r#"<p><img src="a.png"></p><img src="b.png">"#);
        let clone = prepare_clone(&root);
        assert!(root.find_all(|e| e.has_attribute("crossorigin")).is_empty());
        let marked = clone.find_all(|e| e.attr("crossorigin") == Some("anonymous"));
        assert_eq!(marked.len(), 2);
    }

    #[tokio::test]
    async fn scroll_is_reset_then_restored() {
        let page = Page::in_memory();
        page.scroll_to(3.0, 900.0);
        let seen = with_scroll_at_top(&page, || async { page.scroll_position() }).await;
        assert_eq!(seen, (0.0, 0.0));
        assert_eq!(page.frame_count(), 2);
        assert_eq!(page.scroll_position(), (3.0, 900.0));
    }

    #[tokio::test]
    async fn download_saves_engine_output() {
        let page = page_with(Fixed(Ok(b"%PDF-fake".to_vec())));
        let opts = Options {
            filename: Some("notes.pdf".into()),
            ..Options::default()
        };
        download(&page, Some("# Notes"), &opts).await.unwrap();
        let saved = page.last_download().unwrap();
        assert_eq!(saved.filename, "notes.pdf");
        assert_eq!(saved.bytes, b"%PDF-fake");
        assert_eq!(page.sandbox_count(), 0);
    }

    #[tokio::test]
    async fn engine_errors_keep_their_message() {
        let page = page_with(Fixed(Err("boom")));
        let err = download(&page, Some("x"), &Options::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert_eq!(page.sandbox_count(), 0);
        assert!(page.downloads().is_empty());
    }

    #[tokio::test]
    async fn empty_engine_messages_use_fallbacks() {
        let page = page_with(Fixed(Err("")));
        let err = download(&page, None, &Options::default()).await.unwrap_err();
        assert_eq!(err.to_string(), ENGINE_ERROR_FALLBACK);

        let page = page_with(Panics(""));
        let err = download_from_element(&page, &ElementNode::new(Tag::Div), &Options::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), ENGINE_PANIC_FALLBACK);
    }

    #[tokio::test]
    async fn panics_surface_as_export_errors() {
        let page = page_with(Panics("engine exploded"));
        page.scroll_to(0.0, 42.0);
        let err = download_from_element(&page, &ElementNode::new(Tag::Div), &Options::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Export { ref message } if message == "engine exploded"));
        assert_eq!(page.scroll_position(), (0.0, 42.0));
    }

    #[test]
    fn blank_messages_fall_back() {
        assert_eq!(or_fallback("  ".into(), "fb"), "fb");
        assert_eq!(or_fallback("msg".into(), "fb"), "msg");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(7_u8)), "");
    }
}
