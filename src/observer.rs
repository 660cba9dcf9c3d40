//! Process-wide performance observer slot.
//!
//! The PDF engine reports one [`PerformanceEntry`] per pipeline stage. An
//! export holds an [`ObserverSuppression`] guard for its duration so those
//! entries never reach the installed observer. Guards are counted: with
//! several exports in flight the observer comes back only when the last one
//! finishes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A timing sample.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceEntry {
    pub name: String,
    pub duration: Duration,
}

pub trait PerformanceObserver: Send + Sync {
    fn observe(&self, entry: &PerformanceEntry);
}

/// Observer that drops everything. Installed while exports are running.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl PerformanceObserver for NoopObserver {
    fn observe(&self, _entry: &PerformanceEntry) {}
}

type SharedObserver = Arc<dyn PerformanceObserver>;

struct Slot {
    active: Option<SharedObserver>,
    /// The caller's observer while suppressed.
    parked: Option<SharedObserver>,
    depth: usize,
}

static SLOT: Mutex<Slot> = Mutex::new(Slot {
    active: None,
    parked: None,
    depth: 0,
});

fn slot() -> MutexGuard<'static, Slot> {
    SLOT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Install `observer`, returning the one it replaces.
///
/// While an export is suppressing observation the new observer is parked and
/// becomes active once the last export finishes.
pub fn install(observer: SharedObserver) -> Option<SharedObserver> {
    let mut slot = slot();
    if slot.depth > 0 {
        slot.parked.replace(observer)
    } else {
        slot.active.replace(observer)
    }
}

/// Remove the installed observer.
pub fn uninstall() -> Option<SharedObserver> {
    let mut slot = slot();
    if slot.depth > 0 {
        slot.parked.take()
    } else {
        slot.active.take()
    }
}

/// The caller-installed observer, whether or not it is currently suppressed.
pub fn installed() -> Option<SharedObserver> {
    let slot = slot();
    if slot.depth > 0 {
        slot.parked.clone()
    } else {
        slot.active.clone()
    }
}

pub fn is_suppressed() -> bool {
    slot().depth > 0
}

/// Deliver `entry` to the active observer, if any.
pub fn record(entry: PerformanceEntry) {
    // Clone out so the observer runs without the lock held.
    let active = slot().active.clone();
    if let Some(observer) = active {
        observer.observe(&entry);
    }
}

/// Time `f` and record it under `name`.
pub fn measure<R>(name: &str, f: impl FnOnce() -> R) -> R {
    let start = Instant::now();
    let out = f();
    let duration = start.elapsed();
    log::debug!("{name}: {duration:?}");
    record(PerformanceEntry {
        name: name.to_string(),
        duration,
    });
    out
}

/// Scope guard that keeps the installed observer switched off.
#[must_use = "observation resumes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ObserverSuppression {
    _private: (),
}

impl ObserverSuppression {
    pub fn acquire() -> Self {
        let mut slot = slot();
        if slot.depth == 0 {
            slot.parked = slot.active.take();
            slot.active = Some(Arc::new(NoopObserver));
        }
        slot.depth += 1;
        Self { _private: () }
    }
}

impl Drop for ObserverSuppression {
    fn drop(&mut self) {
        let mut slot = slot();
        slot.depth = slot.depth.saturating_sub(1);
        if slot.depth == 0 {
            slot.active = slot.parked.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measure_returns_closure_value() {
        assert_eq!(measure("unit", || 40 + 2), 42);
    }

    #[test]
    fn noop_observer_ignores_entries() {
        NoopObserver.observe(&PerformanceEntry {
            name: "x".into(),
            duration: Duration::from_millis(1),
        });
    }
}
