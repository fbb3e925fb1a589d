use std::time::{Duration, Instant};

use crate::binding::Binding;

/// A per-chart, per-name timer record.
///
/// Created once during the init walk (name uniqueness enforced there),
/// started on entry into the declaring state, stopped on exit, and re-armed
/// on every re-entry. Grounded on `vivid_sm.c`'s `vivid_sm_timer_t` and the
/// `vivid_on_timeout` entry/exit/timeout-event handling.
pub(crate) struct TimerState<B: Binding> {
    pub handle: B::Timer,
    pub due_time: Instant,
    pub active: bool,
    /// Pushes this timer's event into the chart's queue and wakes the
    /// owning task; fixed at construction since it closes over the chart's
    /// shared, thread-safe handles rather than anything owner-thread-only.
    on_fire: std::sync::Arc<dyn Fn() + Send + Sync>,
}

impl<B: Binding> TimerState<B> {
    pub(crate) fn new(handle: B::Timer, now: Instant, on_fire: std::sync::Arc<dyn Fn() + Send + Sync>) -> Self {
        Self {
            handle,
            due_time: now,
            active: false,
            on_fire,
        }
    }

    pub(crate) fn arm(&mut self, binding: &B, now: Instant, duration: Duration) {
        self.due_time = now + duration;
        binding.start_timer(&mut self.handle, duration, self.on_fire.clone());
        self.active = true;
    }

    pub(crate) fn disarm(&mut self, binding: &B) {
        binding.stop_timer(&mut self.handle);
        self.active = false;
    }

    /// `true` iff this firing should be honored rather than silently
    /// discarded as a late-arriving timeout.
    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.active && now >= self.due_time
    }
}
