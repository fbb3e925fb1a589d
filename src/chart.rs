use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::binding::{Binding, BindingErrorKind};
use crate::builder::{Builder, TreeBuilder};
use crate::error::{ChartError, QueueError};
use crate::node::{NodeBehavior, NodeId, NodeMeta};
use crate::param::{Param, STATIC_PARAM_INLINE};
use crate::queue::{Queue, QueueMode};
use crate::timer::TimerState;
use crate::transition::{apply_transition, walk_event, walk_jump, Walk};

const ROOT: NodeId = NodeId(0);

/// The thread-shareable half of a chart: everything a producer thread needs
/// to push events or query state safely from any thread.
///
/// The C library hands every caller the same `vivid_sm_t *`, guarded
/// ad hoc by the binding mutex. Rust's aliasing rules don't allow a live
/// `&mut Chart` on the owner thread to coexist with a `&Chart` used
/// concurrently from a producer thread, so this splits the chart into the
/// part producers may touch (behind `Arc`, internally synchronized) and the
/// part only the owner thread ever sees (`Chart` itself, below).
struct Shared<B: Binding> {
    binding: B,
    event_handle: B::EventHandle,
    meta: Vec<NodeMeta>,
    names: HashMap<&'static str, NodeId>,
    queue: Queue,
    woken: AtomicBool,
}

impl<B: Binding> Shared<B> {
    fn queue_event(&self, name: &'static str, param: Param) -> Result<(), QueueError> {
        if let Param::Bytes(ref b) = param {
            if b.len() > STATIC_PARAM_INLINE {
                let err = QueueError::ParamTooLarge {
                    got: b.len(),
                    max: STATIC_PARAM_INLINE,
                };
                tracing::error!(event = name, got = b.len(), max = STATIC_PARAM_INLINE, "param exceeds max inline capacity");
                self.binding.error_hook(BindingErrorKind::QueueEvent);
                return Err(err);
            }
        }
        if let Err(err) = self.queue.push(name, param) {
            self.binding.error_hook(BindingErrorKind::QueueEvent);
            return Err(err);
        }
        self.woken.store(true, Ordering::Release);
        self.binding.trigger_event(&self.event_handle);
        Ok(())
    }

    fn is_in(&self, name: &str) -> bool {
        let Some(&id) = self.names.get(name) else {
            return false;
        };
        match self.meta[id.index()].parent {
            None => true,
            Some(parent) => self.meta[parent.index()].current(Ordering::Acquire) == Some(id),
        }
    }

    fn state_of(&self, parent_name: &str) -> Option<&'static str> {
        let &id = self.names.get(parent_name)?;
        let current = self.meta[id.index()].current(Ordering::Acquire)?;
        Some(self.meta[current.index()].name)
    }
}

/// A cheap, `Clone`-able handle producers may hold to push events or query
/// state from any thread — the part of the `Chart` API
/// that is not owner-thread-exclusive.
pub struct ChartHandle<B: Binding> {
    shared: Arc<Shared<B>>,
}

impl<B: Binding> Clone for ChartHandle<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B: Binding> ChartHandle<B> {
    /// Enqueue `name`/`param`. May be called from any thread or ISR
    /// equivalent.
    pub fn queue_event(&self, name: &'static str, param: Param) -> Result<(), QueueError> {
        self.shared.queue_event(name, param)
    }

    /// `true` iff the node named `name` is currently active.
    pub fn is_in(&self, name: &str) -> bool {
        self.shared.is_in(name)
    }

    /// The declared name of `parent_name`'s currently active child, if any.
    pub fn state_of(&self, parent_name: &str) -> Option<&'static str> {
        self.shared.state_of(parent_name)
    }
}

/// An instantiated hierarchical state machine.
///
/// Owns the binding, the static node tree, the timer registry, the bounded
/// event queue, and the application context `C` threaded through every
/// entry/exit/event/jump action. All tree mutation, handler invocation, and
/// timer arm/disarm happen exclusively on whichever thread calls
/// [`Chart::pump`].
pub struct Chart<C, B: Binding> {
    shared: Arc<Shared<B>>,
    behavior: Vec<NodeBehavior<C>>,
    timers: HashMap<&'static str, TimerState<B>>,
    ctx: C,
    state_change_callback: Option<Box<dyn FnMut(&mut C)>>,
    init_pending: bool,
}

impl<C, B: Binding> Chart<C, B> {
    /// Builds the static tree by calling `root` once, then schedules the
    /// deferred "first entry" dispatch: the returned
    /// chart has not yet entered its initial configuration until the first
    /// [`Chart::pump`] call.
    pub fn new(binding: B, mode: QueueMode, capacity: usize, root: fn(&mut Builder<'_, C>), ctx: C) -> Result<Self, ChartError> {
        let mut tree = TreeBuilder::new();
        tree.build_root(root);
        tree.check_defaults();
        tree.check_targets();
        if let Some(err) = tree.error.take() {
            return Err(err);
        }

        // Timer names must be unique across the whole chart.
        let mut timer_names: Vec<&'static str> = Vec::new();
        for node in &tree.nodes {
            for t in &node.timeouts {
                if timer_names.contains(&t.timer_name) {
                    return Err(ChartError::DuplicateTimer(t.timer_name));
                }
                timer_names.push(t.timer_name);
            }
        }

        let names = tree.names.clone();
        let mut meta = Vec::with_capacity(tree.nodes.len());
        let mut behavior = Vec::with_capacity(tree.nodes.len());
        for spec in tree.nodes {
            let (m, b) = spec.split();
            meta.push(m);
            behavior.push(b);
        }

        let queue = Queue::new(mode, capacity);

        // `woken` starts true: the deferred first-entry dispatch must run
        // on the very first `pump()` even though no event has been pushed
        // yet.
        let shared = Arc::new_cyclic(|weak: &std::sync::Weak<Shared<B>>| {
            let weak_for_wake = weak.clone();
            let wake: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(shared) = weak_for_wake.upgrade() {
                    shared.woken.store(true, Ordering::Release);
                }
            });
            let event_handle = binding.create_event(wake);
            Shared {
                binding,
                event_handle,
                meta,
                names,
                queue,
                woken: AtomicBool::new(true),
            }
        });

        let mut timers = HashMap::new();
        for name in timer_names {
            let handle = shared.binding.create_timer();
            let weak = Arc::downgrade(&shared);
            let on_fire: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                if let Some(shared) = weak.upgrade() {
                    // A timer firing enqueues its own name as a user event;
                    // queue-full here is a transient error, logged by
                    // `Shared::queue_event` and otherwise ignored.
                    let _ = shared.queue_event(name, Param::None);
                }
            });
            let now = shared.binding.now();
            timers.insert(name, TimerState::new(handle, now, on_fire));
        }

        Ok(Self {
            shared,
            behavior,
            timers,
            ctx,
            state_change_callback: None,
            init_pending: true,
        })
    }

    /// A cloneable handle other threads can use to push events and query
    /// state without touching the owner-exclusive parts of the chart.
    pub fn handle(&self) -> ChartHandle<B> {
        ChartHandle {
            shared: self.shared.clone(),
        }
    }

    /// Enqueue `name`/`param`. May be called from any thread or ISR
    /// equivalent; equivalent to `self.handle().queue_event`.
    pub fn queue_event(&self, name: &'static str, param: Param) -> Result<(), QueueError> {
        self.shared.queue_event(name, param)
    }

    /// `true` iff the node named `name` is currently active.
    pub fn is_in(&self, name: &str) -> bool {
        self.shared.is_in(name)
    }

    /// The declared name of `parent_name`'s currently active child, if any.
    pub fn state_of(&self, parent_name: &str) -> Option<&'static str> {
        self.shared.state_of(parent_name)
    }

    /// Registers the callback invoked once per dispatch in which a
    /// transition's target resolved (after any jump chain) to a real state.
    pub fn set_state_change_callback(&mut self, cb: impl FnMut(&mut C) + 'static) {
        self.state_change_callback = Some(Box::new(cb));
    }

    /// Direct access to the application context, for host code driving the
    /// chart outside of handler bodies (e.g. seeding initial values before
    /// the first `pump`).
    pub fn context(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Runs one dispatch step. A no-op unless the binding's
    /// async event has fired since the last call. Processes the deferred
    /// initial entry (first call only), then at most one queued user event
    /// plus its full jump-phase chain, then re-signals the wake if the
    /// queue is still non-empty so the host's next turn drains it further.
    pub fn pump(&mut self) {
        if !self.shared.woken.swap(false, Ordering::AcqRel) {
            return;
        }

        if self.init_pending {
            self.init_pending = false;
            let shared = self.shared.clone();
            let mut walk = Walk {
                meta: &shared.meta,
                behavior: &mut self.behavior,
                ctx: &mut self.ctx,
                timers: &mut self.timers,
                binding: &shared.binding,
                now: shared.binding.now(),
                state_change: false,
            };
            walk.walk_entry_down(ROOT);
            drain_jump_phase(&mut walk, None, None);
            // The initial configuration is not a transition: `state_change_callback`
            // fires only for real dispatches (`vivid_sm.c`'s `event_callback` init
            // branch never reads `transition.state_change`), so `walk.state_change`
            // is deliberately discarded here.
        }

        if self.shared.queue.is_empty() {
            return;
        }

        let shared = self.shared.clone();
        let state_change = shared.queue.with_front(|front| {
            let Some((name, param)) = front else {
                return false;
            };
            let mut walk = Walk {
                meta: &shared.meta,
                behavior: &mut self.behavior,
                ctx: &mut self.ctx,
                timers: &mut self.timers,
                binding: &shared.binding,
                now: shared.binding.now(),
                state_change: false,
            };
            let result = walk_event(&mut walk, ROOT, name, param);
            if !result.handled {
                tracing::debug!(event = name, "unhandled event"); // dropped, not an error
            }
            if let Some(pending) = result.pending {
                apply_transition(&mut walk, pending);
            }
            drain_jump_phase(&mut walk, Some(name), Some(param));
            walk.state_change
        });

        self.notify(state_change);
        self.shared.queue.pop();

        if !self.shared.queue.is_empty() {
            self.shared.woken.store(true, Ordering::Release);
            self.shared.binding.trigger_event(&self.shared.event_handle);
        }
    }

    fn notify(&mut self, state_change: bool) {
        if state_change {
            if let Some(cb) = self.state_change_callback.as_mut() {
                cb(&mut self.ctx);
            }
        }
    }
}

/// Resolves chained pseudo-state transitions until none fire. `walk_jump`
/// itself is a no-op at any node without jump clauses, so this naturally
/// terminates as soon as the configuration settles on real states
/// throughout.
fn drain_jump_phase<C, B: Binding>(walk: &mut Walk<'_, C, B>, last_event_name: Option<&'static str>, last_event_param: Option<&Param>) {
    while let Some(pending) = walk_jump(walk, ROOT, last_event_name, last_event_param) {
        apply_transition(walk, pending);
    }
}

impl<C, B: Binding> Drop for Chart<C, B> {
    /// Stops every armed timer. The event queue and node arena free
    /// themselves through ordinary `Drop` — a `Param::Boxed` payload's
    /// destructor runs when its slot drops, so a dropped unprocessed event's
    /// boxed parameter is still destructed exactly once.
    fn drop(&mut self) {
        for timer in self.timers.values_mut() {
            if timer.active {
                timer.disarm(&self.shared.binding);
            }
        }
    }
}
