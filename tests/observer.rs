//! The global performance observer around exports.
//!
//! The observer slot is global, so every test takes `LOCK` first.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use markdown_pdf::observer::{self, measure, PerformanceEntry, PerformanceObserver};
use markdown_pdf::{
    download, download_from_element, CaptureJob, ElementNode, Options, Page, PdfEngine, RenderError, Tag,
};

static LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn names(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl PerformanceObserver for Recorder {
    fn observe(&self, entry: &PerformanceEntry) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.name.clone());
    }
}

fn is_installed(recorder: &Arc<Recorder>) -> bool {
    let expected: Arc<dyn PerformanceObserver> = recorder.clone();
    observer::installed().is_some_and(|o| Arc::ptr_eq(&o, &expected))
}

#[tokio::test]
async fn export_entries_are_suppressed() {
    let _guard = LOCK.lock().await;
    let recorder = Arc::new(Recorder::default());
    observer::install(recorder.clone());

    measure("outside", || ());
    download(&Page::in_memory(), Some("# Title"), &Options::default())
        .await
        .unwrap();

    assert_eq!(recorder.names(), ["outside"]);
    assert!(!observer::is_suppressed());
    assert!(is_installed(&recorder));
    observer::uninstall();
}

#[tokio::test]
async fn concurrent_exports_restore_the_observer() {
    let _guard = LOCK.lock().await;
    let recorder = Arc::new(Recorder::default());
    observer::install(recorder.clone());

    let page = Page::in_memory();
    let element = ElementNode::new(Tag::Div);
    let options = Options::default();
    let (a, b) = tokio::join!(
        download(&page, Some("one"), &options),
        download_from_element(&page, &element, &options),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(page.downloads().len(), 2);
    assert!(recorder.names().is_empty());
    assert!(is_installed(&recorder));
    observer::uninstall();
}

#[tokio::test]
async fn failed_export_restores_the_observer() {
    let _guard = LOCK.lock().await;
    let recorder = Arc::new(Recorder::default());
    observer::install(recorder.clone());

    let options = Options {
        format: Some("b9".into()),
        ..Options::default()
    };
    let err = download(&Page::in_memory(), Some("x"), &options).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid format: b9");

    assert!(!observer::is_suppressed());
    assert!(is_installed(&recorder));
    observer::uninstall();
}

/// Sleeps, records a measurement, then reports completion.
struct SlowEngine {
    done: std::sync::mpsc::Sender<()>,
}

impl PdfEngine for SlowEngine {
    fn capture(&self, _job: &CaptureJob) -> Result<Vec<u8>, RenderError> {
        std::thread::sleep(Duration::from_millis(500));
        measure("engine", || ());
        let _ = self.done.send(());
        Ok(b"%PDF-1.4 stub".to_vec())
    }
}

#[tokio::test]
async fn cancelled_export_stays_suppressed_until_the_engine_returns() {
    let _guard = LOCK.lock().await;
    let recorder = Arc::new(Recorder::default());
    observer::install(recorder.clone());

    let (done, finished) = std::sync::mpsc::channel();
    let page = Page::in_memory().with_engine(Arc::new(SlowEngine { done }));
    let timed_out = tokio::time::timeout(
        Duration::from_millis(100),
        download(&page, Some("# Slow"), &Options::default()),
    )
    .await;
    assert!(timed_out.is_err());

    tokio::task::spawn_blocking(move || finished.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .unwrap();
    // The engine's guard drops just after it signals.
    for _ in 0..100 {
        if !observer::is_suppressed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(recorder.names().is_empty());
    assert!(!observer::is_suppressed());
    assert!(is_installed(&recorder));
    observer::uninstall();
}

#[test]
fn suppression_guards_nest() {
    let _guard = LOCK.blocking_lock();
    let recorder = Arc::new(Recorder::default());
    observer::install(recorder.clone());

    let outer = observer::ObserverSuppression::acquire();
    let inner = observer::ObserverSuppression::acquire();
    measure("hidden", || ());
    drop(outer);
    assert!(observer::is_suppressed());

    // Installed while suppressed: takes over once the last guard drops.
    let replacement = Arc::new(Recorder::default());
    observer::install(replacement.clone());
    drop(inner);

    measure("visible", || ());
    assert!(recorder.names().is_empty());
    assert_eq!(replacement.names(), ["visible"]);
    observer::uninstall();
}
