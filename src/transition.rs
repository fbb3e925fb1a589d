use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::Instant;

use crate::binding::Binding;
use crate::node::{NodeBehavior, NodeId, NodeMeta};
use crate::param::Param;
use crate::timer::TimerState;

/// Mutable working state threaded through one dispatch step (one user event,
/// one jump iteration, or the initial entry walk). Bundles what the source
/// passes as `vivid_sm_t *me` plus the `app` pointer, split so the tree
/// structure (`meta`) stays reachable without re-borrowing `behavior`.
pub(crate) struct Walk<'a, C, B: Binding> {
    pub meta: &'a [NodeMeta],
    pub behavior: &'a mut [NodeBehavior<C>],
    pub ctx: &'a mut C,
    pub timers: &'a mut HashMap<&'static str, TimerState<B>>,
    pub binding: &'a B,
    pub now: Instant,
    /// Set whenever a transition's exit/entry walk changes a real state's
    /// `current` pointer; read once after the walk to decide whether to
    /// invoke the state-change callback.
    pub state_change: bool,
}

/// A transition accepted by a node's clause, pending application by the
/// caller once the dispatching tree walk unwinds. Produced only when the
/// clause named a real target; action-only clauses fire without one (see
/// `Walk::fire`).
///
/// The C library stores this in `me->transition` and mutates it from inside
/// the state's callback; here a handler's evaluation simply returns it.
pub(crate) struct PendingTransition {
    pub target: NodeId,
    pub ancestor: NodeId,
    pub reenter_ancestor: bool,
}

impl<'a, C, B: Binding> Walk<'a, C, B> {
    fn run_entry(&mut self, node: NodeId) {
        if let Some(action) = self.behavior[node.index()].entry.as_mut() {
            action(self.ctx);
        }
        let now = self.now;
        let timer_names: Vec<(&'static str, std::time::Duration)> = self.behavior[node.index()]
            .timeouts
            .iter()
            .map(|t| (t.timer_name, t.duration))
            .collect();
        for (name, duration) in timer_names {
            if let Some(timer) = self.timers.get_mut(name) {
                timer.arm(self.binding, now, duration);
            }
        }
    }

    fn run_exit(&mut self, node: NodeId) {
        let timer_names: Vec<&'static str> = self.behavior[node.index()]
            .timeouts
            .iter()
            .map(|t| t.timer_name)
            .collect();
        for name in timer_names {
            if let Some(timer) = self.timers.get_mut(name) {
                timer.disarm(self.binding);
            }
        }
        if let Some(action) = self.behavior[node.index()].exit.as_mut() {
            action(self.ctx);
        }
    }

    fn set_current(&self, node: NodeId, value: Option<NodeId>) {
        self.meta[node.index()].set_current(value, Ordering::Release);
    }

    /// Marks `state_change` when `value` denotes entering/leaving a real
    /// (non-pseudo) state, mirroring the source's `set_state`.
    fn set_current_tracked(&mut self, node: NodeId, value: Option<NodeId>) {
        if let Some(v) = value {
            if self.meta[v.index()].kind.is_real_state() {
                self.state_change = true;
            }
        }
        self.set_current(node, value);
    }

    /// Enters `node` and everything below it down to its leaves: its own
    /// entry action, then its default child (single-active composites) or
    /// all of its children (parallel containers). Grounded on
    /// `vivid_sm.c::walk_entry_down`.
    pub(crate) fn walk_entry_down(&mut self, node: NodeId) {
        self.run_entry(node);
        if let Some(default_child) = self.meta[node.index()].default_child {
            self.set_current_tracked(node, Some(default_child));
            self.walk_entry_down(default_child);
        }
        if self.meta[node.index()].parallel_children {
            let children = self.meta[node.index()].children.clone();
            for child in children {
                self.walk_entry_down(child);
            }
        }
    }

    /// Enters every parallel sibling of `branch` under `parent`, leaving
    /// `branch` itself untouched (it is entered separately, along the LCA
    /// path). Grounded on the sibling-skip in `walk_entry_down`.
    fn enter_other_regions(&mut self, parent: NodeId, branch: NodeId) {
        let children = self.meta[parent.index()].children.clone();
        for child in children {
            if child != branch {
                self.walk_entry_down(child);
            }
        }
    }

    /// Enters the path from `ancestor` down to `target`, entering each
    /// intermediate ancestor's other parallel regions fresh along the way,
    /// then enters `target`'s own subtree. Grounded on
    /// `vivid_sm.c::walk_entry_up`.
    pub(crate) fn walk_entry_up(&mut self, target: NodeId, ancestor: NodeId, reenter_ancestor: bool) {
        let mut path = vec![target];
        let mut cur = target;
        while cur != ancestor {
            cur = self.meta[cur.index()].parent.expect("ancestor must be a strict ancestor of target");
            path.push(cur);
        }
        for i in (0..path.len()).rev() {
            let node = path[i];
            if i == 0 {
                self.walk_entry_down(node);
                continue;
            }
            let branch = path[i - 1];
            self.set_current_tracked(node, Some(branch));
            if node != ancestor || reenter_ancestor {
                self.run_entry(node);
            }
            if self.meta[node.index()].parallel_children {
                self.enter_other_regions(node, branch);
            }
        }
    }

    /// Exits `node` and everything below it: its active child chain and/or
    /// all parallel children, then its own exit action. Grounded on
    /// `vivid_sm.c::walk_exit_down`.
    pub(crate) fn walk_exit_down(&mut self, node: NodeId) {
        if let Some(active) = self.meta[node.index()].current(Ordering::Acquire) {
            self.walk_exit_down(active);
            self.set_current(node, None);
        }
        if self.meta[node.index()].parallel_children {
            let children = self.meta[node.index()].children.clone();
            for child in children {
                self.walk_exit_down(child);
            }
        }
        self.run_exit(node);
    }

    /// Exits from `node` up to (optionally including) `ancestor`, exiting
    /// each level's active descendant subtree and parallel children along
    /// the way. Grounded on `vivid_sm.c::walk_exit_up`.
    pub(crate) fn walk_exit_up(&mut self, node: NodeId, ancestor: NodeId, exit_ancestor: bool) {
        self.walk_exit_climb(node, ancestor, exit_ancestor, None);
    }

    /// `from_child` is the child of `node` the climb just came up through
    /// (already fully exited one frame down) and must not be visited again;
    /// `None` on the initial call, where `node` is the dispatch site itself
    /// and any live subtree under it still needs a first, full teardown.
    /// Without this exclusion the climb re-descends into the branch it just
    /// left (its `current`/parallel-child slot isn't cleared until this very
    /// frame), firing that branch's exit a second time.
    fn walk_exit_climb(&mut self, node: NodeId, ancestor: NodeId, exit_ancestor: bool, from_child: Option<NodeId>) {
        if let Some(active) = self.meta[node.index()].current(Ordering::Acquire) {
            if Some(active) != from_child {
                self.walk_exit_down(active);
            }
        }
        if self.meta[node.index()].parallel_children {
            let children = self.meta[node.index()].children.clone();
            for child in children {
                if Some(child) != from_child {
                    self.walk_exit_down(child);
                }
            }
        }
        self.set_current(node, None);
        if node != ancestor || exit_ancestor {
            self.run_exit(node);
        }
        if let Some(parent) = self.meta[node.index()].parent {
            if node != ancestor {
                self.walk_exit_climb(parent, ancestor, exit_ancestor, Some(node));
            }
        }
    }

    /// Applies a target named by a fired clause: computes the LCA, exits up
    /// to it, and reports the pending entry. `target == None` is an
    /// internal, action-only transition (nothing to exit or enter, and the
    /// global walk does not stop). Grounded on `vivid_sm.c::vivid_transit`.
    fn fire(&mut self, from: NodeId, target: Option<NodeId>) -> Option<PendingTransition> {
        let target = target?;
        let ancestor = lowest_common_ancestor(self.meta, from, target);
        let reenter_ancestor = from == ancestor || target == ancestor;
        self.walk_exit_up(from, ancestor, reenter_ancestor);
        Some(PendingTransition {
            target,
            ancestor,
            reenter_ancestor,
        })
    }
}

/// Depth-then-synchronous-ancestor-walk LCA computation, grounded verbatim
/// on `vivid_sm.c::vivid_transit`.
fn lowest_common_ancestor(meta: &[NodeMeta], a: NodeId, b: NodeId) -> NodeId {
    let mut x = a;
    let mut y = b;
    while meta[x.index()].depth > meta[y.index()].depth {
        x = meta[x.index()].parent.expect("non-root node has a parent");
    }
    while meta[y.index()].depth > meta[x.index()].depth {
        y = meta[y.index()].parent.expect("non-root node has a parent");
    }
    while x != y {
        x = meta[x.index()].parent.expect("disjoint trees share no ancestor");
        y = meta[y.index()].parent.expect("disjoint trees share no ancestor");
    }
    x
}

fn resolve(meta: &[NodeMeta], name: &'static str) -> Option<NodeId> {
    meta.iter().position(|n| n.name == name).map(|idx| NodeId(idx as u32))
}

/// Outcome of one full dispatch pass over the tree.
pub(crate) struct DispatchResult {
    /// `true` iff some clause anywhere in the walk matched this event's name,
    /// independent of whether its guard held — mirrors `vivid_on_event`'s
    /// unconditional `event_handled = true` on name match, used only to
    /// decide whether an "unhandled event" log line is worth emitting.
    pub handled: bool,
    pub pending: Option<PendingTransition>,
}

/// Tries `node`'s own `on_event`/`on_timeout` clauses, in declaration order.
/// A name match marks `handled`; if that clause's guard also holds, its
/// action runs and evaluation of this node's remaining clauses stops,
/// whether or not the clause named a target. Grounded on
/// `vivid_sm.c::vivid_on_event`/`vivid_on_timeout` and the generated
/// if-return clause chain they're called from.
fn dispatch_event_at<C, B: Binding>(w: &mut Walk<'_, C, B>, node: NodeId, event_name: &str, param: &Param) -> DispatchResult {
    let mut handled = false;

    let event_count = w.behavior[node.index()].events.len();
    for i in 0..event_count {
        if w.behavior[node.index()].events[i].name != event_name {
            continue;
        }
        handled = true;
        if !(w.behavior[node.index()].events[i].guard)(&*w.ctx, param) {
            continue;
        }
        (w.behavior[node.index()].events[i].action)(w.ctx, param);
        let target = w.behavior[node.index()].events[i].target.and_then(|name| resolve(w.meta, name));
        return DispatchResult {
            handled,
            pending: w.fire(node, target),
        };
    }

    let timeout_count = w.behavior[node.index()].timeouts.len();
    for i in 0..timeout_count {
        let timer_name = w.behavior[node.index()].timeouts[i].timer_name;
        if timer_name != event_name {
            continue;
        }
        let due = w.timers.get(timer_name).map(|t| t.is_due(w.now)).unwrap_or(false);
        if !due {
            continue; // late-arriving timeout: silently discarded
        }
        handled = true;
        if let Some(timer) = w.timers.get_mut(timer_name) {
            timer.active = false;
        }
        if !(w.behavior[node.index()].timeouts[i].guard)(&*w.ctx) {
            continue;
        }
        (w.behavior[node.index()].timeouts[i].action)(w.ctx);
        let target = w.behavior[node.index()].timeouts[i].target.and_then(|name| resolve(w.meta, name));
        return DispatchResult {
            handled,
            pending: w.fire(node, target),
        };
    }

    DispatchResult { handled, pending: None }
}

/// Tries every `jump` clause at `node`, in declaration order. Grounded on
/// `vivid_sm.c::vivid_jump`.
fn dispatch_jump_at<C, B: Binding>(
    w: &mut Walk<'_, C, B>,
    node: NodeId,
    last_event_name: Option<&'static str>,
    last_event_param: Option<&Param>,
) -> Option<PendingTransition> {
    let none = Param::None;
    let clause_count = w.behavior[node.index()].jumps.len();
    for i in 0..clause_count {
        let wants_param = w.behavior[node.index()].jumps[i].param_event_name;
        let param: &Param = match wants_param {
            None => &none,
            Some(want) => match last_event_name {
                Some(got) if got == want => last_event_param.unwrap_or(&none),
                _ => {
                    tracing::error!(owner = w.meta[node.index()].name, wanted = want, "no jump param available");
                    continue;
                }
            },
        };
        if !(w.behavior[node.index()].jumps[i].guard)(&*w.ctx, param) {
            continue;
        }
        (w.behavior[node.index()].jumps[i].action)(w.ctx, param);
        let target = resolve(w.meta, w.behavior[node.index()].jumps[i].target);
        return w.fire(node, target);
    }
    None
}

/// Preorder walk over `node`'s own clauses, then (if parallel) each region
/// fully, then its single active child — stopping as soon as a clause
/// anywhere names an actual target. Grounded on `vivid_sm.c::walk_event`.
pub(crate) fn walk_event<C, B: Binding>(w: &mut Walk<'_, C, B>, node: NodeId, event_name: &str, param: &Param) -> DispatchResult {
    let mut result = dispatch_event_at(w, node, event_name, param);
    if result.pending.is_some() {
        return result;
    }
    if w.meta[node.index()].parallel_children {
        let children = w.meta[node.index()].children.clone();
        for child in children {
            let child_result = walk_event(w, child, event_name, param);
            result.handled |= child_result.handled;
            if child_result.pending.is_some() {
                return DispatchResult {
                    handled: result.handled,
                    pending: child_result.pending,
                };
            }
        }
    }
    if let Some(active) = w.meta[node.index()].current(Ordering::Acquire) {
        let child_result = walk_event(w, active, event_name, param);
        result.handled |= child_result.handled;
        if child_result.pending.is_some() {
            return DispatchResult {
                handled: result.handled,
                pending: child_result.pending,
            };
        }
    }
    result
}

/// One jump-phase sweep from the root, per `vivid_sm.c::jump`'s inner loop
/// body. The caller re-invokes this until nothing fires, matching the
/// source's `while (me->jump)` drain.
pub(crate) fn walk_jump<C, B: Binding>(
    w: &mut Walk<'_, C, B>,
    node: NodeId,
    last_event_name: Option<&'static str>,
    last_event_param: Option<&Param>,
) -> Option<PendingTransition> {
    if let Some(pending) = dispatch_jump_at(w, node, last_event_name, last_event_param) {
        return Some(pending);
    }
    if w.meta[node.index()].parallel_children {
        let children = w.meta[node.index()].children.clone();
        for child in children {
            if let Some(pending) = walk_jump(w, child, last_event_name, last_event_param) {
                return Some(pending);
            }
        }
    }
    if let Some(active) = w.meta[node.index()].current(Ordering::Acquire) {
        if let Some(pending) = walk_jump(w, active, last_event_name, last_event_param) {
            return Some(pending);
        }
    }
    None
}

/// Applies a [`PendingTransition`] by entering from its ancestor down to its
/// target. Only called when a clause named a real target; action-only
/// clauses never produce one (see `Walk::fire`).
pub(crate) fn apply_transition<C, B: Binding>(w: &mut Walk<'_, C, B>, pending: PendingTransition) {
    w.walk_entry_up(pending.target, pending.ancestor, pending.reenter_ancestor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    // root(0)
    //  +- a(1)
    //  |   +- a1(3)
    //  |   +- a2(4)
    //  +- b(2)
    fn fixture() -> Vec<NodeMeta> {
        let leaf = |name, parent, depth| NodeMeta {
            name,
            kind: crate::node::NodeKind::State,
            parent: Some(NodeId(parent)),
            children: Vec::new(),
            default_child: None,
            depth,
            parallel_children: false,
            current: AtomicU32::new(crate::node::NONE),
        };
        vec![
            NodeMeta {
                name: "root",
                kind: crate::node::NodeKind::Root,
                parent: None,
                children: vec![NodeId(1), NodeId(2)],
                default_child: Some(NodeId(1)),
                depth: 0,
                parallel_children: false,
                current: AtomicU32::new(crate::node::NONE),
            },
            NodeMeta {
                name: "a",
                kind: crate::node::NodeKind::State,
                parent: Some(NodeId(0)),
                children: vec![NodeId(3), NodeId(4)],
                default_child: Some(NodeId(3)),
                depth: 1,
                parallel_children: false,
                current: AtomicU32::new(crate::node::NONE),
            },
            leaf("b", 0, 1),
            leaf("a1", 1, 2),
            leaf("a2", 1, 2),
        ]
    }

    #[test]
    fn lca_of_siblings_is_their_shared_parent() {
        let meta = fixture();
        assert_eq!(lowest_common_ancestor(&meta, NodeId(3), NodeId(4)), NodeId(1));
    }

    #[test]
    fn lca_of_cousins_is_the_root() {
        let meta = fixture();
        assert_eq!(lowest_common_ancestor(&meta, NodeId(3), NodeId(2)), NodeId(0));
    }

    #[test]
    fn lca_of_unequal_depths_climbs_the_deeper_side_first() {
        let meta = fixture();
        assert_eq!(lowest_common_ancestor(&meta, NodeId(3), NodeId(1)), NodeId(1));
        assert_eq!(lowest_common_ancestor(&meta, NodeId(1), NodeId(3)), NodeId(1));
    }

    #[test]
    fn lca_of_a_node_with_itself_is_itself() {
        let meta = fixture();
        assert_eq!(lowest_common_ancestor(&meta, NodeId(4), NodeId(4)), NodeId(4));
    }

    #[test]
    fn resolve_finds_declared_names_and_misses_unknown_ones() {
        let meta = fixture();
        assert_eq!(resolve(&meta, "a1"), Some(NodeId(3)));
        assert_eq!(resolve(&meta, "nope"), None);
    }
}
