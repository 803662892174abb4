//! Test data builders for creating graphs

use specgraph::graph::{builtin_registry, Graph, NodeId, TypeRegistry};
use serde_json::Value;
use std::collections::BTreeMap;

/// A graph plus the ids of its nodes by builder label
pub struct Built {
    pub graph: Graph,
    ids: BTreeMap<String, NodeId>,
}

impl Built {
    pub fn id(&self, label: &str) -> NodeId {
        *self
            .ids
            .get(label)
            .unwrap_or_else(|| panic!("no node labelled {}", label))
    }
}

/// Fluent builder for test graphs
///
/// Auto-perform is off while building. Unless `manual` was called, `build`
/// turns it back on and runs the whole graph once.
pub struct GraphBuilder<'r> {
    registry: &'r TypeRegistry,
    graph: Graph,
    ids: BTreeMap<String, NodeId>,
    auto_perform: bool,
}

impl GraphBuilder<'static> {
    pub fn new() -> Self {
        Self::with_registry(builtin_registry())
    }
}

impl<'r> GraphBuilder<'r> {
    pub fn with_registry(registry: &'r TypeRegistry) -> Self {
        let mut graph = Graph::new();
        graph.set_auto_perform(false);
        Self {
            registry,
            graph,
            ids: BTreeMap::new(),
            auto_perform: true,
        }
    }

    /// Leave auto-perform off on the built graph
    pub fn manual(mut self) -> Self {
        self.auto_perform = false;
        self
    }

    pub fn node(mut self, label: &str, type_name: &str) -> Self {
        let id = self
            .graph
            .create(self.registry, type_name)
            .unwrap_or_else(|e| panic!("creating {}: {}", label, e));
        self.ids.insert(label.to_string(), id);
        self
    }

    pub fn param(mut self, label: &str, key: &str, value: impl Into<Value>) -> Self {
        let id = self.id(label);
        self.graph.set_param(id, key, value).unwrap();
        self
    }

    /// Connect `src:output -> dst:input`, asserting the edge survives
    pub fn connect(mut self, src: &str, output: usize, dst: &str, input: usize) -> Self {
        let (s, d) = (self.id(src), self.id(dst));
        let outcome = self.graph.connect(d, input, s, output);
        assert!(
            outcome.is_connected(),
            "{}:{} -> {}:{} gave {:?}",
            src,
            output,
            dst,
            input,
            outcome
        );
        self
    }

    fn id(&self, label: &str) -> NodeId {
        *self
            .ids
            .get(label)
            .unwrap_or_else(|| panic!("no node labelled {}", label))
    }

    pub fn build(mut self) -> Built {
        self.graph.set_auto_perform(self.auto_perform);
        if self.auto_perform {
            self.graph.perform_all();
        }
        Built {
            graph: self.graph,
            ids: self.ids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_builder() {
        let built = GraphBuilder::new()
            .node("src", "gen")
            .node("out", "sink")
            .connect("src", 0, "out", 0)
            .build();

        assert_eq!(built.graph.len(), 2);
        assert!(built.graph.auto_perform());
        let sink = built.graph.get(built.id("out")).unwrap();
        assert_eq!(sink.input(0).map(|l| l.node), Some(built.id("src")));
    }
}
