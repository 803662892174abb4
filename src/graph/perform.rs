//! Execution: targeted (after a single change) and bulk (after a load).
//!
//! Both modes share the same per-node step: prefetch the input values,
//! call the type's `compute`, and record success or failure on the node.
//! A compute failure never escapes this module; it becomes node state.

use crate::graph::datum::Datum;
use crate::graph::events::GraphEvent;
use crate::graph::graph::Graph;
use crate::graph::id::NodeId;
use crate::graph::node::{ComputeContext, NodeState};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tally of one execution pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerformReport {
    pub computed: usize,
    pub failed: usize,
    /// Nodes left in `Waiting` because an input never got a value.
    pub waiting: usize,
}

impl Graph {
    /// Re-execute `root` and everything downstream of it.
    ///
    /// Each node runs as soon as all of its connected inputs hold a value,
    /// recursing depth-first into its children. A request made while another
    /// pass is in progress is dropped.
    pub fn perform(&mut self, root: NodeId) -> PerformReport {
        if self.performing {
            tracing::debug!("Dropping nested perform of {:?}", root);
            return PerformReport::default();
        }
        if self.node(root).is_none() {
            return PerformReport::default();
        }
        self.performing = true;

        let reachable = self.reachable_from(root);
        for &id in &reachable {
            self.reset_for_pass(id);
        }
        let mut report = PerformReport::default();
        self.perform_node(root, &mut report);
        report.waiting = self.mark_waiting(reachable.iter().copied());

        self.performing = false;
        tracing::debug!(
            "Performed from {:?}: {} computed, {} failed, {} waiting",
            root,
            report.computed,
            report.failed,
            report.waiting
        );
        report
    }

    fn perform_node(&mut self, id: NodeId, report: &mut PerformReport) {
        if !self.ready_to_run(id) {
            return;
        }
        self.run_compute(id, report);
        let children: Vec<NodeId> = match self.node(id) {
            Some(node) => node.children.keys().copied().collect(),
            None => return,
        };
        for child in children {
            self.perform_node(child, report);
        }
    }

    /// Execute the whole graph once, breadth-first from the roots.
    ///
    /// A node is queued only after every predecessor has been visited, so
    /// each node is visited exactly once however many paths reach it.
    pub fn perform_all(&mut self) -> PerformReport {
        if self.performing {
            tracing::debug!("Dropping nested bulk perform");
            return PerformReport::default();
        }
        self.performing = true;

        let ids = self.ids();
        let mut in_degree: BTreeMap<NodeId, usize> = BTreeMap::new();
        for &id in &ids {
            self.reset_for_pass(id);
            let degree = self
                .node(id)
                .map(|n| n.inputs.iter().flatten().count())
                .unwrap_or(0);
            in_degree.insert(id, degree);
        }

        let mut queue: std::collections::VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, &d)| d == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut report = PerformReport::default();

        while let Some(id) = queue.pop_front() {
            if self.ready_to_run(id) {
                self.run_compute(id, &mut report);
            }
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
        report.waiting = self.mark_waiting(ids.into_iter());

        self.performing = false;
        tracing::debug!(
            "Bulk perform: {} computed, {} failed, {} waiting",
            report.computed,
            report.failed,
            report.waiting
        );
        report
    }

    /// Clear outputs and error ahead of a pass. Last good outputs survive.
    fn reset_for_pass(&mut self, id: NodeId) {
        if let Some(node) = self.node_mut(id) {
            node.clear_outputs();
            node.error = None;
            node.state = if node.enabled {
                NodeState::Dirty
            } else {
                NodeState::Disabled
            };
        }
    }

    /// Nodes still `Dirty` after a pass never ran: mark them `Waiting`.
    fn mark_waiting(&mut self, ids: impl Iterator<Item = NodeId>) -> usize {
        let mut waiting = 0;
        for id in ids {
            if let Some(node) = self.node_mut(id) {
                if node.state == NodeState::Dirty {
                    node.state = NodeState::Waiting;
                    waiting += 1;
                }
            }
        }
        waiting
    }

    /// Dirty, enabled, and every connected input holds a value.
    fn ready_to_run(&self, id: NodeId) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        node.state == NodeState::Dirty
            && node.enabled
            && node
                .inputs
                .iter()
                .flatten()
                .all(|link| self.value_at(*link).is_some())
    }

    /// Whether every connected input of `id` currently has a value.
    pub fn inputs_satisfied(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|node| {
            node.inputs
                .iter()
                .flatten()
                .all(|link| self.value_at(*link).is_some())
        })
    }

    fn run_compute(&mut self, id: NodeId, report: &mut PerformReport) {
        let inputs: Vec<Option<Datum>> = match self.node(id) {
            Some(node) => node
                .inputs
                .iter()
                .map(|l| l.and_then(|l| self.value_at(l)))
                .collect(),
            None => return,
        };
        let Some(node) = self.node_mut(id) else {
            return;
        };
        let logic = Arc::clone(node.node_type.logic());
        node.state = NodeState::Running;
        let result = {
            let mut ctx = ComputeContext::new(node, &inputs);
            logic.compute(&mut ctx)
        };

        let event = match result {
            Ok(()) => {
                node.state = NodeState::Clean;
                for (good, out) in node.last_good.iter_mut().zip(node.outputs.iter()) {
                    if out.is_some() {
                        *good = out.clone();
                    }
                }
                report.computed += 1;
                tracing::debug!("Computed {}", node.name);
                GraphEvent::NodeChanged {
                    node: id,
                    name: node.name.clone(),
                }
            }
            Err(error) => {
                tracing::debug!("Node {} failed: {}", node.name, error);
                node.state = NodeState::Error;
                node.error = Some(error.clone());
                report.failed += 1;
                GraphEvent::NodeErrored {
                    node: id,
                    name: node.name.clone(),
                    error,
                }
            }
        };
        self.emit(event);
    }
}
