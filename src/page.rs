//! The page an export runs against.
//!
//! Stands in for the browser window: it owns the document body, the scroll
//! position, the animation-frame clock, the viewport and the place finished
//! PDFs are downloaded to. All methods take `&self`; state sits behind short
//! lived locks that are never held across an `.await`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::dom::{DomNode, ElementNode, Tag};
use crate::error::RenderError;
use crate::export::PdfEngine;
use crate::options::DEFAULT_FILENAME;
use crate::pipeline::ForgeEngine;

/// Width of the off-screen container markdown exports are laid out in.
pub const SANDBOX_WIDTH: f32 = 800.0;

/// Inline style of the off-screen container.
pub const SANDBOX_STYLE: &str =
    "position: fixed; left: -99999px; top: 0; width: 800px; pointer-events: none";

const SANDBOX_ATTR: &str = "data-mdpdf-sandbox";

/// Where saved PDFs go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Write `<dir>/<filename>`.
    Directory(PathBuf),
    /// Keep the bytes in [`Page::downloads`] only.
    Memory,
}

/// A completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub filename: String,
    pub bytes: Vec<u8>,
    /// File written for a [`DownloadTarget::Directory`] target.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SandboxId(u64);

pub struct Page {
    target: DownloadTarget,
    viewport: Viewport,
    engine: Arc<dyn PdfEngine>,
    scroll: Mutex<(f32, f32)>,
    frames: AtomicU64,
    body: Mutex<ElementNode>,
    next_sandbox: AtomicU64,
    downloads: Mutex<Vec<Download>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Page {
    pub fn new(target: DownloadTarget) -> Self {
        Self {
            target,
            viewport: Viewport::default(),
            engine: Arc::new(ForgeEngine),
            scroll: Mutex::new((0.0, 0.0)),
            frames: AtomicU64::new(0),
            body: Mutex::new(ElementNode::new(Tag::Body)),
            next_sandbox: AtomicU64::new(1),
            downloads: Mutex::new(Vec::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(DownloadTarget::Memory)
    }

    pub fn with_viewport(mut self, width: f32, height: f32) -> Self {
        self.viewport = Viewport { width, height };
        self
    }

    /// Replace the HTML→PDF engine.
    pub fn with_engine(mut self, engine: Arc<dyn PdfEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn engine(&self) -> Arc<dyn PdfEngine> {
        Arc::clone(&self.engine)
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn target(&self) -> &DownloadTarget {
        &self.target
    }

    // -- scrolling / frames -------------------------------------------------

    pub fn scroll_position(&self) -> (f32, f32) {
        *lock(&self.scroll)
    }

    pub fn scroll_to(&self, x: f32, y: f32) {
        *lock(&self.scroll) = (x, y);
    }

    /// Yield to the runtime once, as a paint would, and return the new frame
    /// number.
    pub async fn next_animation_frame(&self) -> u64 {
        tokio::task::yield_now().await;
        self.frames.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    // -- body / sandboxes ---------------------------------------------------

    /// Snapshot of the document body.
    pub fn body(&self) -> ElementNode {
        lock(&self.body).clone()
    }

    /// Append `element` to the body inside an off-screen container.
    pub fn attach_sandbox(&self, element: ElementNode) -> SandboxId {
        let id = SandboxId(self.next_sandbox.fetch_add(1, Ordering::SeqCst));
        let mut sandbox = ElementNode::new(Tag::Div)
            .with_attribute("style", SANDBOX_STYLE)
            .with_attribute(SANDBOX_ATTR, id.0.to_string());
        sandbox.append_child(element);
        lock(&self.body).append_child(sandbox);
        id
    }

    fn is_sandbox(node: &DomNode, id: SandboxId) -> bool {
        node.as_element()
            .and_then(|e| e.attr(SANDBOX_ATTR))
            .is_some_and(|v| v == id.0.to_string())
    }

    /// Copy of the element held by sandbox `id`.
    pub fn sandbox_content(&self, id: SandboxId) -> Option<ElementNode> {
        let body = lock(&self.body);
        body.children
            .iter()
            .find(|n| Self::is_sandbox(n, id))
            .and_then(DomNode::as_element)
            .and_then(|sandbox| sandbox.element_children().next().cloned())
    }

    /// Detach sandbox `id`, returning its element.
    pub fn remove_sandbox(&self, id: SandboxId) -> Option<ElementNode> {
        let mut body = lock(&self.body);
        let index = body.children.iter().position(|n| Self::is_sandbox(n, id))?;
        match body.children.remove(index) {
            DomNode::Element(sandbox) => sandbox.children.into_iter().find_map(|n| match n {
                DomNode::Element(e) => Some(e),
                DomNode::Text(_) => None,
            }),
            DomNode::Text(_) => None,
        }
    }

    pub fn sandbox_count(&self) -> usize {
        lock(&self.body)
            .element_children()
            .filter(|e| e.has_attribute(SANDBOX_ATTR))
            .count()
    }

    // -- downloads ----------------------------------------------------------

    /// Deliver a finished file to the download target.
    pub fn save_download(&self, filename: &str, bytes: Vec<u8>) -> Result<Download, RenderError> {
        // Like a browser, keep the last path component only.
        let name = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_FILENAME)
            .to_string();

        let path = match &self.target {
            DownloadTarget::Directory(dir) => {
                let path = dir.join(&name);
                std::fs::write(&path, &bytes).map_err(|source| RenderError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Some(path)
            }
            DownloadTarget::Memory => None,
        };

        log::info!("saved {name} ({} bytes)", bytes.len());
        let download = Download {
            filename: name,
            bytes,
            path,
        };
        lock(&self.downloads).push(download.clone());
        Ok(download)
    }

    pub fn downloads(&self) -> Vec<Download> {
        lock(&self.downloads).clone()
    }

    pub fn last_download(&self) -> Option<Download> {
        lock(&self.downloads).last().cloned()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("target", &self.target)
            .field("viewport", &self.viewport)
            .field("scroll", &self.scroll_position())
            .field("frames", &self.frame_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scroll_roundtrip() {
        let page = Page::in_memory();
        assert_eq!(page.scroll_position(), (0.0, 0.0));
        page.scroll_to(10.0, 250.0);
        assert_eq!(page.scroll_position(), (10.0, 250.0));
    }

    #[test]
    fn sandboxes_attach_and_detach() {
        let page = Page::in_memory();
        let mut doc = ElementNode::new(Tag::Div).with_attribute("class", "mdpdf");
        doc.append_child(DomNode::Text("x".into()));

        let a = page.attach_sandbox(doc.clone());
        let b = page.attach_sandbox(ElementNode::new(Tag::P));
        assert_ne!(a, b);
        assert_eq!(page.sandbox_count(), 2);

        let body = page.body();
        let sandbox = body.element_children().next().unwrap();
        assert_eq!(sandbox.attr("style"), Some(SANDBOX_STYLE));
        assert_eq!(page.sandbox_content(a), Some(doc.clone()));

        assert_eq!(page.remove_sandbox(a), Some(doc));
        assert_eq!(page.remove_sandbox(a), None);
        assert_eq!(page.sandbox_count(), 1);
        assert_eq!(page.sandbox_content(b).map(|e| e.tag), Some(Tag::P));
    }

    #[test]
    fn memory_downloads_are_recorded() {
        let page = Page::in_memory();
        let d = page.save_download("../nested/report.pdf", vec![1, 2, 3]).unwrap();
        assert_eq!(d.filename, "report.pdf");
        assert_eq!(d.path, None);
        assert_eq!(page.downloads().len(), 1);

        let d = page.save_download("", vec![]).unwrap();
        assert_eq!(d.filename, DEFAULT_FILENAME);
    }

    #[test]
    fn directory_downloads_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page::new(DownloadTarget::Directory(dir.path().to_path_buf()));
        let d = page.save_download("out.pdf", b"%PDF-1.7".to_vec()).unwrap();
        let path = d.path.unwrap();
        assert_eq!(path, dir.path().join("out.pdf"));
        assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let page = Page::new(DownloadTarget::Directory(dir.path().join("nope")));
        let err = page.save_download("out.pdf", vec![0]).unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
        assert!(page.downloads().is_empty());
    }

    #[tokio::test]
    async fn animation_frames_count_up() {
        let page = Page::in_memory();
        assert_eq!(page.next_animation_frame().await, 1);
        assert_eq!(page.next_animation_frame().await, 2);
        assert_eq!(page.frame_count(), 2);
    }
}
