//! A deterministic `Binding` for the integration tests: a manually-advanced
//! clock and a manually-drained wake/trigger, so a test can assert on exact
//! entry/exit traces without racing a real event loop or timer thread.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vivid_hsm::{Binding, BindingErrorKind};

struct TimerSlot {
    due: Option<Instant>,
    on_fire: Option<Arc<dyn Fn() + Send + Sync>>,
}

struct Inner {
    now: Instant,
    wake: Option<Arc<dyn Fn() + Send + Sync>>,
    wake_count: usize,
    timers: Vec<TimerSlot>,
    errors: Vec<BindingErrorKind>,
}

pub struct TestBinding {
    inner: Mutex<Inner>,
}

pub struct TestTimer(usize);

impl TestBinding {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                now: Instant::now(),
                wake: None,
                wake_count: 0,
                timers: Vec::new(),
                errors: Vec::new(),
            }),
        }
    }

    /// Number of times a producer (queue push or timer firing) has woken
    /// the owner task since the last reset.
    pub fn take_wake_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.wake_count)
    }

    pub fn errors(&self) -> Vec<BindingErrorKind> {
        self.inner.lock().unwrap().errors.clone()
    }

    /// Moves the clock forward by `dur`, firing (in due-time order) every
    /// armed timer whose due time falls at or before the new clock reading.
    /// A timer that is fired is disarmed on the binding side; if the engine
    /// still considers it active it will be re-armed on the next entry.
    pub fn advance(&self, dur: Duration) {
        let target = {
            let mut inner = self.inner.lock().unwrap();
            inner.now += dur;
            inner.now
        };
        loop {
            let due_cb = {
                let mut inner = self.inner.lock().unwrap();
                let next = inner
                    .timers
                    .iter()
                    .enumerate()
                    .filter_map(|(i, t)| t.due.map(|d| (i, d)))
                    .filter(|&(_, d)| d <= target)
                    .min_by_key(|&(_, d)| d);
                match next {
                    Some((i, _)) => {
                        inner.timers[i].due = None;
                        inner.timers[i].on_fire.clone()
                    }
                    None => None,
                }
            };
            match due_cb {
                Some(cb) => cb(),
                None => break,
            }
        }
    }

    pub fn now_instant(&self) -> Instant {
        self.inner.lock().unwrap().now
    }
}

impl Default for TestBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl Binding for TestBinding {
    type EventHandle = ();
    type Timer = TestTimer;

    fn create_event(&self, wake: Arc<dyn Fn() + Send + Sync>) -> Self::EventHandle {
        self.inner.lock().unwrap().wake = Some(wake);
    }

    fn trigger_event(&self, _handle: &Self::EventHandle) {
        let cb = {
            let mut inner = self.inner.lock().unwrap();
            inner.wake_count += 1;
            inner.wake.clone()
        };
        if let Some(cb) = cb {
            cb();
        }
    }

    fn create_timer(&self) -> Self::Timer {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.timers.len();
        inner.timers.push(TimerSlot {
            due: None,
            on_fire: None,
        });
        TestTimer(id)
    }

    fn start_timer(&self, timer: &mut Self::Timer, dur: Duration, on_fire: Arc<dyn Fn() + Send + Sync>) {
        let mut inner = self.inner.lock().unwrap();
        let due = inner.now + dur;
        let slot = &mut inner.timers[timer.0];
        slot.due = Some(due);
        slot.on_fire = Some(on_fire);
    }

    fn stop_timer(&self, timer: &mut Self::Timer) {
        self.inner.lock().unwrap().timers[timer.0].due = None;
    }

    fn now(&self) -> Instant {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur);
    }

    fn error_hook(&self, kind: BindingErrorKind) {
        self.inner.lock().unwrap().errors.push(kind);
    }
}

/// Lets a `Chart` be built over `Arc<TestBinding>` instead of `TestBinding`
/// directly, so the test driving a chart can keep its own clone of the
/// binding around to call `advance`/`take_wake_count` after construction.
impl Binding for Arc<TestBinding> {
    type EventHandle = <TestBinding as Binding>::EventHandle;
    type Timer = <TestBinding as Binding>::Timer;

    fn create_event(&self, wake: Arc<dyn Fn() + Send + Sync>) -> Self::EventHandle {
        (**self).create_event(wake)
    }

    fn trigger_event(&self, handle: &Self::EventHandle) {
        (**self).trigger_event(handle)
    }

    fn create_timer(&self) -> Self::Timer {
        (**self).create_timer()
    }

    fn start_timer(&self, timer: &mut Self::Timer, dur: Duration, on_fire: Arc<dyn Fn() + Send + Sync>) {
        (**self).start_timer(timer, dur, on_fire)
    }

    fn stop_timer(&self, timer: &mut Self::Timer) {
        (**self).stop_timer(timer)
    }

    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, dur: Duration) {
        (**self).sleep(dur)
    }

    fn error_hook(&self, kind: BindingErrorKind) {
        (**self).error_hook(kind)
    }
}
