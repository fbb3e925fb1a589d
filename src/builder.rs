use std::collections::HashMap;
use std::time::Duration;

use crate::error::ChartError;
use crate::node::{EventHandler, JumpClause, NodeId, NodeKind, NodeSpec, TimeoutHandler};
use crate::param::Param;

/// Owns the arena while the tree is under construction. Not exposed to
/// callers; [`Builder`] is the public-facing handle to one node within it.
pub(crate) struct TreeBuilder<C> {
    pub nodes: Vec<NodeSpec<C>>,
    pub names: HashMap<&'static str, NodeId>,
    pub error: Option<ChartError>,
}

impl<C> TreeBuilder<C> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            error: None,
        }
    }

    pub(crate) fn build_root(&mut self, root: fn(&mut Builder<'_, C>)) {
        let id = NodeId(0);
        self.nodes.push(NodeSpec::new("root", NodeKind::Root, None, 0));
        self.names.insert("root", id);
        let mut builder = Builder { tree: self, node: id };
        root(&mut builder);
    }

    /// Every composite, non-parallel node with children must have exactly
    /// one default child.
    pub(crate) fn check_defaults(&mut self) {
        if self.error.is_some() {
            return;
        }
        for node in &self.nodes {
            if node.kind.is_pseudo() {
                continue;
            }
            if !node.children.is_empty() && !node.parallel_children && node.default_child.is_none() {
                self.error = Some(ChartError::MissingDefault(node.name));
                return;
            }
        }
    }

    /// Every `target` named by an `on_event`/`on_timeout`/`jump` clause must
    /// resolve to a declared sub-state. Clause bodies only ever see the
    /// name, not the `NodeId`, so this has
    /// to wait until the whole tree (and its name table) is built.
    pub(crate) fn check_targets(&mut self) {
        if self.error.is_some() {
            return;
        }
        for node in &self.nodes {
            for ev in &node.events {
                if let Some(target) = ev.target {
                    if !self.names.contains_key(target) {
                        self.error = Some(ChartError::UnknownTarget(node.name, target));
                        return;
                    }
                }
            }
            for t in &node.timeouts {
                if let Some(target) = t.target {
                    if !self.names.contains_key(target) {
                        self.error = Some(ChartError::UnknownTarget(node.name, target));
                        return;
                    }
                }
            }
            for j in &node.jumps {
                if !self.names.contains_key(j.target) {
                    self.error = Some(ChartError::UnknownTarget(node.name, j.target));
                    return;
                }
            }
        }
    }
}

/// Declarative builder handed to a state's build function. Each method call
/// appends one operation to the node's [`NodeSpec`]; the engine interprets
/// that data at runtime instead of re-invoking the build function per phase,
/// replacing the C library's phase-multiplexed callback.
pub struct Builder<'a, C> {
    tree: &'a mut TreeBuilder<C>,
    node: NodeId,
}

impl<'a, C> Builder<'a, C> {
    fn spec(&mut self) -> &mut NodeSpec<C> {
        &mut self.tree.nodes[self.node.index()]
    }

    fn add_child(&mut self, name: &'static str, kind: NodeKind, body: fn(&mut Builder<'_, C>)) {
        if self.tree.error.is_some() {
            return;
        }
        if self.tree.names.contains_key(name) {
            self.tree.error = Some(ChartError::DuplicateState(name));
            return;
        }
        let parent = &self.tree.nodes[self.node.index()];
        let mixed = if kind == NodeKind::Parallel {
            !parent.children.is_empty() && !parent.parallel_children
        } else {
            parent.parallel_children
        };
        if mixed {
            self.tree.error = Some(ChartError::MixedParallel(parent.name));
            return;
        }
        let depth = parent.depth + 1;
        let child_id = NodeId(self.tree.nodes.len() as u32);
        self.tree.nodes.push(NodeSpec::new(name, kind, Some(self.node), depth));
        self.tree.names.insert(name, child_id);
        let parent = &mut self.tree.nodes[self.node.index()];
        parent.children.push(child_id);
        parent.parallel_children = kind == NodeKind::Parallel;

        let mut child_builder = Builder {
            tree: self.tree,
            node: child_id,
        };
        body(&mut child_builder);
    }

    /// Declare a composite child state.
    pub fn sub_state(&mut self, name: &'static str, body: fn(&mut Builder<'_, C>)) {
        self.add_child(name, NodeKind::State, body);
    }

    /// Declare a parallel (orthogonal) region root.
    pub fn sub_parallel(&mut self, name: &'static str, body: fn(&mut Builder<'_, C>)) {
        self.add_child(name, NodeKind::Parallel, body);
    }

    /// Declare a terminal child marking region completion.
    pub fn sub_final(&mut self, name: &'static str, body: fn(&mut Builder<'_, C>)) {
        self.add_child(name, NodeKind::StateFinal, body);
    }

    /// Declare a choice pseudo-state.
    pub fn sub_condition(&mut self, name: &'static str, body: fn(&mut Builder<'_, C>)) {
        self.add_child(name, NodeKind::Condition, body);
    }

    /// Declare a junction pseudo-state.
    pub fn sub_junction(&mut self, name: &'static str, body: fn(&mut Builder<'_, C>)) {
        self.add_child(name, NodeKind::Junction, body);
    }

    /// Name the default child entered when this composite is entered.
    pub fn default(&mut self, name: &'static str) {
        if self.tree.error.is_some() {
            return;
        }
        if !self.tree.names.contains_key(name) {
            self.tree.error = Some(ChartError::UnknownDefaultTarget(name));
            return;
        }
        let target = self.tree.names[name];
        let spec = self.spec();
        if spec.default_child.is_some() {
            let owner = spec.name;
            self.tree.error = Some(ChartError::DuplicateDefault(owner));
            return;
        }
        self.spec().default_child = Some(target);
    }

    /// Register an action run when this node is entered.
    pub fn on_entry(&mut self, action: impl FnMut(&mut C) + 'static) {
        self.spec().entry = Some(Box::new(action));
    }

    /// Register an action run when this node is exited.
    pub fn on_exit(&mut self, action: impl FnMut(&mut C) + 'static) {
        self.spec().exit = Some(Box::new(action));
    }

    /// Register a transition fired by a named, parameterless event.
    pub fn on_event(
        &mut self,
        name: &'static str,
        guard: impl Fn(&C) -> bool + 'static,
        target: Option<&'static str>,
        mut action: impl FnMut(&mut C) + 'static,
    ) {
        self.spec().events.push(EventHandler {
            name,
            guard: Box::new(move |ctx, _param| guard(ctx)),
            target,
            action: Box::new(move |ctx, _param| action(ctx)),
        });
    }

    /// Register a transition fired by a named event carrying a parameter.
    pub fn on_event_param(
        &mut self,
        name: &'static str,
        guard: impl Fn(&C, &Param) -> bool + 'static,
        target: Option<&'static str>,
        action: impl FnMut(&mut C, &Param) + 'static,
    ) {
        self.spec().events.push(EventHandler {
            name,
            guard: Box::new(guard),
            target,
            action: Box::new(action),
        });
    }

    /// Register a timer: started on entry, stopped on exit, firing this
    /// transition when it elapses.
    pub fn on_timeout(
        &mut self,
        timer_name: &'static str,
        duration: Duration,
        guard: impl Fn(&C) -> bool + 'static,
        target: Option<&'static str>,
        mut action: impl FnMut(&mut C) + 'static,
    ) {
        self.spec().timeouts.push(TimeoutHandler {
            timer_name,
            duration,
            guard: Box::new(guard),
            target,
            action: Box::new(move |ctx| action(ctx)),
        });
    }

    /// Register an ordered jump clause on a CONDITION/JUNCTION node; the
    /// first truthy guard wins.
    pub fn jump(&mut self, guard: impl Fn(&C) -> bool + 'static, target: &'static str, mut action: impl FnMut(&mut C) + 'static) {
        self.spec().jumps.push(JumpClause {
            guard: Box::new(move |ctx, _param| guard(ctx)),
            param_event_name: None,
            target,
            action: Box::new(move |ctx, _param| action(ctx)),
        });
    }

    /// Like [`Builder::jump`], but the clause also requests the parameter of
    /// the last user event, which is supplied only if that event's name
    /// matches `event_name`.
    pub fn jump_param(
        &mut self,
        event_name: &'static str,
        guard: impl Fn(&C, &Param) -> bool + 'static,
        target: &'static str,
        action: impl FnMut(&mut C, &Param) + 'static,
    ) {
        self.spec().jumps.push(JumpClause {
            guard: Box::new(guard),
            param_event_name: Some(event_name),
            target,
            action: Box::new(action),
        });
    }
}
