//! A deterministic [`Binding`] used by this crate's own unit tests. The
//! integration tests under `tests/` carry their own copy (a `Binding` impl
//! needs no crate-internal access), richer with a controllable clock; this
//! one is intentionally minimal — just enough to exercise `Chart::new`/
//! `pump` without a real event loop or timer thread.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::binding::{Binding, BindingErrorKind};

pub(crate) struct UnitTestBinding {
    wake: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
    now: Mutex<Instant>,
    errors: AtomicUsize,
}

impl UnitTestBinding {
    pub(crate) fn new() -> Self {
        Self {
            wake: Mutex::new(None),
            now: Mutex::new(Instant::now()),
            errors: AtomicUsize::new(0),
        }
    }

    pub(crate) fn advance(&self, dur: Duration) {
        *self.now.lock().unwrap() += dur;
    }

    pub(crate) fn error_count(&self) -> usize {
        self.errors.load(Ordering::Acquire)
    }
}

pub(crate) struct UnitTestTimer {
    armed_due: Option<Instant>,
    on_fire: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Binding for UnitTestBinding {
    type EventHandle = ();
    type Timer = UnitTestTimer;

    fn create_event(&self, wake: Arc<dyn Fn() + Send + Sync>) -> Self::EventHandle {
        *self.wake.lock().unwrap() = Some(wake);
    }

    fn trigger_event(&self, _handle: &Self::EventHandle) {
        if let Some(cb) = self.wake.lock().unwrap().clone() {
            cb();
        }
    }

    fn create_timer(&self) -> Self::Timer {
        UnitTestTimer {
            armed_due: None,
            on_fire: None,
        }
    }

    fn start_timer(&self, timer: &mut Self::Timer, dur: Duration, on_fire: Arc<dyn Fn() + Send + Sync>) {
        timer.armed_due = Some(*self.now.lock().unwrap() + dur);
        timer.on_fire = Some(on_fire);
    }

    fn stop_timer(&self, timer: &mut Self::Timer) {
        timer.armed_due = None;
    }

    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur);
    }

    fn error_hook(&self, _kind: BindingErrorKind) {
        self.errors.fetch_add(1, Ordering::AcqRel);
    }
}
