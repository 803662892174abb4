//! Graph topology: node creation, the connect/disconnect protocol, type
//! propagation and removal.
//!
//! Nodes live in a `Vec<Option<Node>>` indexed by [`NodeId`]; removal leaves
//! a tombstone so ids stay stable. Edges are stored twice, as input slots on
//! the destination and as refcounted `children` on the source, and every
//! mutation here keeps the two views in agreement.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::Datum;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::events::{EventSender, GraphEvent};
use crate::graph::id::{Link, NodeId};
use crate::graph::node::{Node, NodeState};
use crate::graph::node_type::{NodeKind, NodeType};
use crate::graph::registry::TypeRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Why a connect request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoSuchNode,
    BadInputIndex,
    BadOutputIndex,
    SelfLoop,
    Cycle,
}

/// Result of [`Graph::connect`]. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// Nothing changed.
    Rejected(RejectReason),
    /// The edge was made, then removed again because the types disagree.
    Severed,
}

impl ConnectOutcome {
    pub fn is_connected(self) -> bool {
        self == ConnectOutcome::Connected
    }
}

/// One row of [`Graph::summary`].
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSummary {
    pub name: String,
    pub type_name: String,
    pub state: NodeState,
    pub error: Option<String>,
    pub status: Option<String>,
}

impl fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16} {:<12} {:<9}", self.name, self.type_name, self.state)?;
        if let Some(err) = &self.error {
            write!(f, " {}", err)?;
        } else if let Some(status) = &self.status {
            write!(f, " {}", status)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    names: HashMap<String, NodeId>,
    /// Re-entrancy guard for execution.
    pub(crate) performing: bool,
    auto_perform: bool,
    events: Option<EventSender>,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            names: HashMap::new(),
            performing: false,
            auto_perform: true,
            events: None,
        }
    }

    /// Whether topology and control changes trigger a targeted perform.
    pub fn auto_perform(&self) -> bool {
        self.auto_perform
    }

    pub fn set_auto_perform(&mut self, on: bool) {
        self.auto_perform = on;
    }

    pub fn set_event_sink(&mut self, sink: Option<EventSender>) {
        self.events = sink;
    }

    pub(crate) fn event_sink(&self) -> Option<&EventSender> {
        self.events.as_ref()
    }

    pub(crate) fn emit(&self, event: GraphEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    // ── Access ──

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|n| n.as_ref())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|n| n.as_mut())
    }

    pub fn get(&self, id: NodeId) -> GraphResult<&Node> {
        self.node(id).ok_or(GraphError::NoSuchNode(id))
    }

    fn get_mut(&mut self, id: NodeId) -> GraphResult<&mut Node> {
        self.node_mut(id).ok_or(GraphError::NoSuchNode(id))
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> GraphResult<&Node> {
        self.find(name)
            .and_then(|id| self.node(id))
            .ok_or_else(|| GraphError::NoSuchName(name.to_string()))
    }

    /// Live node ids in creation order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes().map(|n| n.id).collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Every edge as `(source link, destination, input index)`.
    pub fn edges(&self) -> Vec<(Link, NodeId, usize)> {
        let mut out = Vec::new();
        for node in self.nodes() {
            for (i, link) in node.inputs.iter().enumerate() {
                if let Some(link) = link {
                    out.push((*link, node.id, i));
                }
            }
        }
        out
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.node_type.kind == kind)
            .map(|n| n.id)
            .collect()
    }

    /// First unused name of the form `{prefix}{k}`.
    pub fn fresh_name(&self, prefix: &str) -> String {
        let mut k = 0usize;
        loop {
            let candidate = format!("{}{}", prefix, k);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
            k += 1;
        }
    }

    /// Current output value feeding through `link`.
    pub(crate) fn value_at(&self, link: Link) -> Option<Datum> {
        self.node(link.node)
            .and_then(|n| n.output(link.output))
            .cloned()
    }

    pub(crate) fn set_external(&mut self, id: NodeId, value: Option<Datum>) {
        if let Some(node) = self.node_mut(id) {
            node.external = value;
        }
    }

    pub(crate) fn external(&self, id: NodeId) -> Option<&Datum> {
        self.node(id).and_then(|n| n.external.as_ref())
    }

    // ── Creation ──

    /// Create a node of a registered type under a fresh unique name.
    pub fn create(&mut self, registry: &TypeRegistry, type_name: &str) -> GraphResult<NodeId> {
        let node_type = registry.resolve(type_name)?;
        self.create_with_type(node_type)
    }

    pub fn create_with_type(&mut self, node_type: Arc<NodeType>) -> GraphResult<NodeId> {
        let name = self.fresh_name(&node_type.name);
        let id = self.insert_node(node_type, name)?;
        tracing::debug!("Created node {} ({:?})", self.nodes_name(id), id);
        self.input_changed(id);
        if self.auto_perform {
            self.perform(id);
        }
        Ok(id)
    }

    /// Allocate and initialise a node without touching any edges.
    pub(crate) fn insert_node(
        &mut self,
        node_type: Arc<NodeType>,
        name: String,
    ) -> GraphResult<NodeId> {
        let id = NodeId(self.nodes.len() as u32);
        let logic = Arc::clone(node_type.logic());
        let mut node = Node::new(id, node_type, name.clone());
        logic.init(&mut node)?;
        logic.recalculate(&mut node);
        self.nodes.push(Some(node));
        self.names.insert(name, id);
        Ok(id)
    }

    fn nodes_name(&self, id: NodeId) -> &str {
        self.node(id).map(|n| n.name.as_str()).unwrap_or("?")
    }

    pub fn set_display_name(&mut self, id: NodeId, display_name: &str) -> GraphResult<()> {
        self.get_mut(id)?.display_name = display_name.to_string();
        Ok(())
    }

    // ── Edges ──

    /// Is an edge `src:output -> dst:input` type-compatible right now?
    pub fn can_connect(&self, dst: NodeId, input: usize, src: NodeId, output: usize) -> bool {
        let (Some(d), Some(s)) = (self.node(dst), self.node(src)) else {
            return false;
        };
        match (s.output_type(output), d.input_type(input)) {
            (Some(o), Some(i)) => o.accepts(i) && dst != src && !self.would_create_cycle(src, dst),
            _ => false,
        }
    }

    /// Connect `src:output` to `dst:input`, replacing any previous occupant.
    ///
    /// Compatibility is not checked up front; type propagation runs right
    /// after linking and severs the new edge if the types disagree.
    pub fn connect(
        &mut self,
        dst: NodeId,
        input: usize,
        src: NodeId,
        output: usize,
    ) -> ConnectOutcome {
        let outcome = self.link(dst, input, src, output);
        if outcome != ConnectOutcome::Connected {
            tracing::debug!(
                "Rejected connect {:?}:{} -> {:?}:{} ({:?})",
                src,
                output,
                dst,
                input,
                outcome
            );
            return outcome;
        }

        self.input_changed(dst);
        let survived = self.node(dst).and_then(|n| n.input(input)) == Some(Link::new(src, output));
        if self.auto_perform {
            self.perform(dst);
        }
        if survived {
            tracing::info!(
                "Connected {}:{} -> {}:{}",
                self.nodes_name(src),
                output,
                self.nodes_name(dst),
                input
            );
            ConnectOutcome::Connected
        } else {
            ConnectOutcome::Severed
        }
    }

    /// Structural half of `connect`: validate and record the edge, nothing else.
    pub(crate) fn link(
        &mut self,
        dst: NodeId,
        input: usize,
        src: NodeId,
        output: usize,
    ) -> ConnectOutcome {
        let (Some(d), Some(s)) = (self.node(dst), self.node(src)) else {
            return ConnectOutcome::Rejected(RejectReason::NoSuchNode);
        };
        if input >= d.inputs.len() {
            return ConnectOutcome::Rejected(RejectReason::BadInputIndex);
        }
        if output >= s.node_type.outputs.len() {
            return ConnectOutcome::Rejected(RejectReason::BadOutputIndex);
        }
        if dst == src {
            return ConnectOutcome::Rejected(RejectReason::SelfLoop);
        }
        if self.would_create_cycle(src, dst) {
            return ConnectOutcome::Rejected(RejectReason::Cycle);
        }

        if d.inputs[input].is_some() {
            self.sever(dst, input);
        }
        if let Some(d) = self.node_mut(dst) {
            d.inputs[input] = Some(Link::new(src, output));
        }
        if let Some(s) = self.node_mut(src) {
            *s.children.entry(dst).or_insert(0) += 1;
        }
        self.emit(GraphEvent::Connected {
            src: Link::new(src, output),
            dst,
            input,
        });
        ConnectOutcome::Connected
    }

    /// Would an edge `src -> dst` close a loop? True if `src` is reachable
    /// from `dst`. Terminates on any input thanks to the visited set.
    pub fn would_create_cycle(&self, src: NodeId, dst: NodeId) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![dst];

        while let Some(current) = stack.pop() {
            if current == src {
                return true;
            }
            let idx = current.index();
            if idx >= visited.len() || visited[idx] {
                continue;
            }
            visited[idx] = true;
            if let Some(node) = self.node(current) {
                stack.extend(node.children.keys().copied());
            }
        }
        false
    }

    /// Clear an input slot and drop the source's refcount.
    ///
    /// # Panics
    ///
    /// If the source holds no refcount for `dst`: the reverse edges have
    /// drifted from the input slots.
    pub(crate) fn sever(&mut self, dst: NodeId, input: usize) -> Option<Link> {
        let link = self.node_mut(dst)?.inputs.get_mut(input)?.take()?;
        let Some(src) = self.node_mut(link.node) else {
            panic!("input {:?}:{} points at missing node {:?}", dst, input, link.node);
        };
        let count = src.children.get(&dst).copied().unwrap_or(0);
        if count == 0 {
            panic!("refcount underflow: {} has no edge to {:?}", src.name, dst);
        }
        if count == 1 {
            src.children.remove(&dst);
        } else {
            src.children.insert(dst, count - 1);
        }
        self.emit(GraphEvent::Disconnected { dst, input });
        Some(link)
    }

    /// Clear `dst:input`. Returns whether anything was connected there.
    pub fn disconnect(&mut self, dst: NodeId, input: usize) -> bool {
        let Some(link) = self.sever(dst, input) else {
            return false;
        };
        tracing::info!(
            "Disconnected {}:{} -> {}:{}",
            self.nodes_name(link.node),
            link.output,
            self.nodes_name(dst),
            input
        );
        self.input_changed(dst);
        if self.auto_perform {
            self.perform(dst);
        }
        true
    }

    // ── Type propagation ──

    /// Re-derive output types from `id` downstream and sever any edge that
    /// has become incompatible.
    ///
    /// Runs in topological order over everything reachable from `id`, so each
    /// node sees its parents' final types before resolving its own.
    pub fn input_changed(&mut self, id: NodeId) {
        let reachable = self.reachable_from(id);
        for n in self.topo_order_of(&reachable) {
            self.sever_incompatible_inputs(n);
            self.refresh_output_types(n);
        }
    }

    /// Run type propagation over the whole graph. Returns severed edges.
    pub(crate) fn refresh_all_types(&mut self) -> Vec<(NodeId, usize)> {
        let all: BTreeSet<NodeId> = self.ids().into_iter().collect();
        let mut severed = Vec::new();
        for n in self.topo_order_of(&all) {
            severed.extend(self.sever_incompatible_inputs(n).into_iter().map(|i| (n, i)));
            self.refresh_output_types(n);
        }
        severed
    }

    fn sever_incompatible_inputs(&mut self, id: NodeId) -> Vec<usize> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let doomed: Vec<usize> = node
            .inputs
            .iter()
            .enumerate()
            .filter_map(|(i, link)| {
                let link = (*link)?;
                let out_type = self.node(link.node).and_then(|s| s.output_type(link.output));
                let ok = match (out_type, node.input_type(i)) {
                    (Some(o), Some(t)) => o.accepts(t),
                    _ => false,
                };
                (!ok).then_some(i)
            })
            .collect();
        for &i in &doomed {
            tracing::debug!("Severing incompatible input {}:{}", self.nodes_name(id), i);
            self.sever(id, i);
        }
        doomed
    }

    fn refresh_output_types(&mut self, id: NodeId) {
        let Some(node) = self.node(id) else {
            return;
        };
        let input_types: Vec<Option<ConnType>> = node
            .inputs
            .iter()
            .map(|l| l.and_then(|l| self.node(l.node).and_then(|s| s.output_type(l.output))))
            .collect();
        let logic = Arc::clone(node.node_type.logic());
        let mut generated = logic.generate_output_types(node, &input_types);
        let n_out = node.node_type.outputs.len();
        generated.resize(n_out, None);

        let Some(node) = self.node_mut(id) else {
            return;
        };
        let before: Vec<Option<ConnType>> = (0..n_out).map(|i| node.output_type(i)).collect();
        node.output_types = generated;
        let changed: Vec<(usize, ConnType)> = (0..n_out)
            .filter_map(|i| {
                let now = node.output_type(i)?;
                (before[i] != Some(now)).then_some((i, now))
            })
            .collect();
        for (output, conn_type) in changed {
            self.emit(GraphEvent::OutputTypeChanged {
                node: id,
                output,
                conn_type,
            });
        }
    }

    /// `root` and everything downstream of it.
    pub(crate) fn reachable_from(&self, root: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if seen.insert(id) {
                stack.extend(node.children.keys().copied());
            }
        }
        seen
    }

    /// Kahn's algorithm restricted to `set`; edges from outside are ignored.
    ///
    /// Ties break by node id, so the order is deterministic.
    pub(crate) fn topo_order_of(&self, set: &BTreeSet<NodeId>) -> Vec<NodeId> {
        let mut in_degree: BTreeMap<NodeId, usize> = BTreeMap::new();
        for &id in set {
            let Some(node) = self.node(id) else {
                continue;
            };
            let degree = node
                .inputs
                .iter()
                .flatten()
                .filter(|l| set.contains(&l.node))
                .count();
            in_degree.insert(id, degree);
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(in_degree.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            let Some(node) = self.node(id) else {
                continue;
            };
            for (child, count) in &node.children {
                if let Some(d) = in_degree.get_mut(child) {
                    *d = d.saturating_sub(*count);
                    if *d == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if order.len() != in_degree.len() {
            tracing::warn!(
                "Graph has a cycle! Only {} of {} nodes ordered.",
                order.len(),
                in_degree.len()
            );
        }
        order
    }

    // ── Removal and controls ──

    /// Sever every edge touching `id`, then delete it.
    pub fn remove(&mut self, id: NodeId) -> GraphResult<()> {
        let node = self.get(id)?;
        let n_in = node.inputs.len();
        let children: Vec<NodeId> = node.children.keys().copied().collect();

        for i in 0..n_in {
            self.sever(id, i);
        }
        for &child in &children {
            let slots: Vec<usize> = self
                .node(child)
                .map(|c| {
                    c.inputs
                        .iter()
                        .enumerate()
                        .filter(|(_, l)| l.map(|l| l.node) == Some(id))
                        .map(|(i, _)| i)
                        .collect()
                })
                .unwrap_or_default();
            for slot in slots {
                self.sever(child, slot);
            }
        }

        if let Some(node) = self.nodes[id.index()].take() {
            self.names.remove(&node.name);
            tracing::info!("Removed node {} ({:?})", node.name, id);
        }

        for child in children {
            self.input_changed(child);
            if self.auto_perform {
                self.perform(child);
            }
        }
        Ok(())
    }

    /// Set a control field, let the type recalculate, then propagate.
    pub fn set_param(&mut self, id: NodeId, key: &str, value: impl Into<Value>) -> GraphResult<()> {
        let node = self.get_mut(id)?;
        node.params.insert(key.to_string(), value.into());
        let logic = Arc::clone(node.node_type.logic());
        logic.recalculate(node);
        tracing::debug!("Set {}.{}", node.name, key);

        self.input_changed(id);
        if self.auto_perform {
            self.perform(id);
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> GraphResult<()> {
        let node = self.get_mut(id)?;
        if node.enabled == enabled {
            return Ok(());
        }
        node.enabled = enabled;
        if enabled {
            node.state = NodeState::Dirty;
        } else {
            node.clear_outputs();
            node.state = NodeState::Disabled;
        }
        if self.auto_perform {
            self.perform(id);
        }
        Ok(())
    }

    /// Narrow (or with `None`, restore) the accepted type of an input slot.
    pub fn set_input_type(
        &mut self,
        id: NodeId,
        input: usize,
        conn_type: Option<ConnType>,
    ) -> GraphResult<()> {
        let node = self.get_mut(id)?;
        let Some(slot) = node.input_types.get_mut(input) else {
            return Ok(());
        };
        *slot = conn_type;
        self.input_changed(id);
        if self.auto_perform {
            self.perform(id);
        }
        Ok(())
    }

    /// Swap a node's type in place, keeping every edge that still fits the
    /// new connector lists. The node is re-initialised from scratch.
    pub(crate) fn replace_node_type(
        &mut self,
        id: NodeId,
        node_type: Arc<NodeType>,
    ) -> GraphResult<()> {
        let node = self.get(id)?;
        let n_in = node_type.inputs.len();
        let n_out = node_type.outputs.len();
        let old_in = node.inputs.len();
        let children: Vec<NodeId> = node.children.keys().copied().collect();

        for i in n_in..old_in {
            self.sever(id, i);
        }
        for child in children {
            let slots: Vec<usize> = self
                .node(child)
                .map(|c| {
                    c.inputs
                        .iter()
                        .enumerate()
                        .filter(|(_, l)| matches!(l, Some(l) if l.node == id && l.output >= n_out))
                        .map(|(i, _)| i)
                        .collect()
                })
                .unwrap_or_default();
            for slot in slots {
                self.sever(child, slot);
            }
        }

        let node = self.get_mut(id)?;
        let logic = Arc::clone(node_type.logic());
        node.node_type = node_type;
        node.fit_to_type();
        node.inner = None;
        node.clear_outputs();
        node.state = NodeState::Dirty;
        logic.init(node)?;
        logic.recalculate(node);

        self.input_changed(id);
        Ok(())
    }

    // ── Diagnostics ──

    /// Verify refcount/edge agreement, acyclicity, type compatibility and
    /// the name index.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut expected: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
        for node in self.nodes() {
            for (i, link) in node.inputs.iter().enumerate() {
                let Some(link) = link else {
                    continue;
                };
                let src = self
                    .node(link.node)
                    .ok_or_else(|| format!("{}:{} fed by missing node", node.name, i))?;
                *expected.entry((link.node, node.id)).or_insert(0) += 1;

                let out_type = src
                    .output_type(link.output)
                    .ok_or_else(|| format!("{}:{} fed by bad output index", node.name, i))?;
                let in_type = node.input_type(i).unwrap_or(ConnType::Any);
                if !out_type.accepts(in_type) {
                    return Err(format!(
                        "{}:{} ({}) fed by incompatible {}:{} ({})",
                        node.name, i, in_type, src.name, link.output, out_type
                    ));
                }
            }
        }

        let mut actual: BTreeMap<(NodeId, NodeId), usize> = BTreeMap::new();
        for node in self.nodes() {
            for (&child, &count) in &node.children {
                actual.insert((node.id, child), count);
            }
        }
        if expected != actual {
            return Err(format!(
                "refcounts disagree with input slots: edges {:?}, refcounts {:?}",
                expected, actual
            ));
        }

        let all: BTreeSet<NodeId> = self.ids().into_iter().collect();
        if self.topo_order_of(&all).len() != all.len() {
            return Err("graph contains a cycle".to_string());
        }

        for node in self.nodes() {
            if self.names.get(&node.name) != Some(&node.id) {
                return Err(format!("name index out of date for {}", node.name));
            }
        }
        if self.names.len() != all.len() {
            return Err("name index holds stale entries".to_string());
        }
        Ok(())
    }

    pub fn summary(&self) -> Vec<NodeSummary> {
        self.nodes()
            .map(|n| NodeSummary {
                name: n.name.clone(),
                type_name: n.type_name().to_string(),
                state: n.state,
                error: n.error.as_ref().map(|e| e.to_string()),
                status: n.status.clone(),
            })
            .collect()
    }

    /// Move every node of `other` into this graph. Names must not collide.
    pub(crate) fn absorb(&mut self, other: Graph) -> Vec<NodeId> {
        let base = self.nodes.len() as u32;
        let remap = |id: NodeId| NodeId(id.0 + base);
        let mut added = Vec::new();
        for slot in other.nodes {
            let Some(mut node) = slot else {
                self.nodes.push(None);
                continue;
            };
            node.id = remap(node.id);
            for link in node.inputs.iter_mut().flatten() {
                link.node = remap(link.node);
            }
            node.children = node
                .children
                .into_iter()
                .map(|(c, n)| (remap(c), n))
                .collect();
            self.names.insert(node.name.clone(), node.id);
            added.push(node.id);
            self.nodes.push(Some(node));
        }
        added
    }
}
