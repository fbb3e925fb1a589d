use std::sync::atomic::AtomicU32;

use crate::param::Param;

/// Sentinel stored in [`NodeMeta::current`] meaning "no active child".
pub(crate) const NONE: u32 = u32::MAX;

/// Arena index into the chart's node arrays.
///
/// Replaces the C library's use of a state function's address as its
/// identity with a plain arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn to_raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        if raw == NONE {
            None
        } else {
            Some(NodeId(raw))
        }
    }
}

/// A vertex of the statechart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    State,
    StateFinal,
    Parallel,
    Condition,
    Junction,
}

impl NodeKind {
    pub(crate) fn is_pseudo(self) -> bool {
        matches!(self, NodeKind::Condition | NodeKind::Junction)
    }

    pub(crate) fn is_real_state(self) -> bool {
        matches!(self, NodeKind::State | NodeKind::StateFinal)
    }
}

/// A single `on_event` clause attached to a node.
pub(crate) struct EventHandler<C> {
    pub name: &'static str,
    pub guard: Box<dyn Fn(&C, &Param) -> bool>,
    pub target: Option<&'static str>,
    pub action: Box<dyn FnMut(&mut C, &Param)>,
}

/// A single `on_timeout` clause attached to a node.
pub(crate) struct TimeoutHandler<C> {
    pub timer_name: &'static str,
    pub duration: std::time::Duration,
    pub guard: Box<dyn Fn(&C) -> bool>,
    pub target: Option<&'static str>,
    pub action: Box<dyn FnMut(&mut C)>,
}

/// A single `VIVID_JUMP`-style clause on a CONDITION/JUNCTION node.
pub(crate) struct JumpClause<C> {
    pub guard: Box<dyn Fn(&C, &Param) -> bool>,
    /// `Some(name)` if this clause additionally requires the last user event
    /// to equal `name` before its parameter may be read (see `jump_param`).
    pub param_event_name: Option<&'static str>,
    pub target: &'static str,
    pub action: Box<dyn FnMut(&mut C, &Param)>,
}

/// The structural, thread-shareable half of a node: everything `is_in` and
/// `state_of` need to walk the tree from a producer thread, plus the sole
/// mutable runtime field `current`, published with release/acquire
/// semantics.
///
/// The C library guards `current_state` with either atomics or the
/// binding mutex depending on build mode; on a hosted `std` target atomics
/// are always available, so `current` is unconditionally atomic here and the
/// mutex/lock-free distinction is left entirely to the event queue (see
/// `queue.rs`).
pub(crate) struct NodeMeta {
    pub name: &'static str,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub default_child: Option<NodeId>,
    pub depth: u32,
    /// `true` once this node has been given a [`NodeKind::Parallel`] child;
    /// used to reject mixing parallel and non-parallel siblings.
    pub parallel_children: bool,
    pub current: AtomicU32,
}

impl NodeMeta {
    pub(crate) fn current(&self, ordering: std::sync::atomic::Ordering) -> Option<NodeId> {
        NodeId::from_raw(self.current.load(ordering))
    }

    pub(crate) fn set_current(&self, value: Option<NodeId>, ordering: std::sync::atomic::Ordering) {
        self.current
            .store(value.map(NodeId::to_raw).unwrap_or(NONE), ordering);
    }
}

/// The owner-thread-only half of a node: its declared actions and
/// transition clauses. Never touched from a producer thread.
pub(crate) struct NodeBehavior<C> {
    pub entry: Option<Box<dyn FnMut(&mut C)>>,
    pub exit: Option<Box<dyn FnMut(&mut C)>>,
    pub events: Vec<EventHandler<C>>,
    pub timeouts: Vec<TimeoutHandler<C>>,
    pub jumps: Vec<JumpClause<C>>,
}

/// The declarative body produced once by a state's builder function:
/// interpreted data, not a callback re-invoked per phase. Split into
/// [`NodeMeta`]/[`NodeBehavior`] once the tree is fully built and validated
/// (see `chart::Chart::new`).
pub(crate) struct NodeSpec<C> {
    pub name: &'static str,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub default_child: Option<NodeId>,
    pub depth: u32,
    pub parallel_children: bool,
    pub entry: Option<Box<dyn FnMut(&mut C)>>,
    pub exit: Option<Box<dyn FnMut(&mut C)>>,
    pub events: Vec<EventHandler<C>>,
    pub timeouts: Vec<TimeoutHandler<C>>,
    pub jumps: Vec<JumpClause<C>>,
}

impl<C> NodeSpec<C> {
    pub(crate) fn new(name: &'static str, kind: NodeKind, parent: Option<NodeId>, depth: u32) -> Self {
        Self {
            name,
            kind,
            parent,
            children: Vec::new(),
            default_child: None,
            depth,
            parallel_children: false,
            entry: None,
            exit: None,
            events: Vec::new(),
            timeouts: Vec::new(),
            jumps: Vec::new(),
        }
    }

    pub(crate) fn split(self) -> (NodeMeta, NodeBehavior<C>) {
        (
            NodeMeta {
                name: self.name,
                kind: self.kind,
                parent: self.parent,
                children: self.children,
                default_child: self.default_child,
                depth: self.depth,
                parallel_children: self.parallel_children,
                current: AtomicU32::new(NONE),
            },
            NodeBehavior {
                entry: self.entry,
                exit: self.exit,
                events: self.events,
                timeouts: self.timeouts,
                jumps: self.jumps,
            },
        )
    }
}
