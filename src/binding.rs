use std::sync::Arc;
use std::time::{Duration, Instant};

/// Fatal-error classes a binding may escalate through [`Binding::error_hook`],
/// mirroring `vivid_error_t` in `binding.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingErrorKind {
    Event,
    QueueEvent,
    TriggerEvent,
    Timer,
    StartTimer,
    StopTimer,
    GetTime,
    Sleep,
}

/// The host capability bundle the core consumes.
///
/// The C library's vtable-shaped `struct vivid_binding` becomes a trait
/// here. `calloc`/`free`/mutex create-destroy are dropped entirely: on a
/// hosted `std` target the global allocator and `std::sync::Mutex`/atomics
/// already provide them, so exposing them here would be ceremony with no
/// behavior a host could usefully override.
pub trait Binding: Send + Sync + 'static {
    /// Opaque handle to the binding's async wake-up primitive. Shared across
    /// threads: any producer calling [`Chart::queue_event`] triggers it.
    type EventHandle: Send + Sync;
    /// Opaque handle to one armed/disarmed timer.
    type Timer;

    /// Create the async event used to wake the owning task. `wake` may be
    /// called from any thread (including the same call stack, for tests)
    /// and must coalesce: at least one delivery follows every `trigger_event`
    /// call, however many times it was called meanwhile.
    fn create_event(&self, wake: Arc<dyn Fn() + Send + Sync>) -> Self::EventHandle;

    /// Wake the owning task. Safe to call from any thread or ISR-equivalent.
    fn trigger_event(&self, handle: &Self::EventHandle);

    /// Allocate a timer handle in the stopped state.
    fn create_timer(&self) -> Self::Timer;

    /// Arm `timer` to call `on_fire` once after `dur`. Re-arming an already
    /// armed timer restarts its countdown.
    fn start_timer(&self, timer: &mut Self::Timer, dur: Duration, on_fire: Arc<dyn Fn() + Send + Sync>);

    /// Disarm `timer`. A no-op if it is already stopped.
    fn stop_timer(&self, timer: &mut Self::Timer);

    /// Monotonic clock reading used for `due_time` bookkeeping.
    fn now(&self) -> Instant;

    /// Blocking delay, exposed for test harnesses only — never called by
    /// the engine itself.
    fn sleep(&self, dur: Duration);

    /// Escalation hook for transient runtime errors the engine logs but
    /// otherwise shrugs off. The default implementation does nothing; the
    /// engine proceeds either way.
    fn error_hook(&self, _kind: BindingErrorKind) {}
}
