//! The `Workspace`: one open document.
//!
//! Owns the macro library (and with it the type registry), the main graph
//! and the undo history. A UI shell drives the engine through this type;
//! the graph itself can still be reached for fine-grained edits.

use crate::graph::document::{LoadReport, LoadWarning, SavedDocument, SavedGraph};
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::events::{EventSender, GraphEvent};
use crate::graph::graph::Graph;
use crate::graph::id::NodeId;
use crate::graph::macros::{count_instances, Aliases, MacroLibrary};
use crate::graph::perform::PerformReport;
use crate::graph::registry::TypeRegistry;
use crate::graph::undo::{UndoStack, DEFAULT_UNDO_DEPTH};
use serde::{Deserialize, Serialize};

/// Engine behaviour knobs, read from the `[engine]` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Perform affected nodes after every edit.
    pub auto_perform: bool,
    /// Number of undo checkpoints kept.
    pub undo_depth: usize,
    /// Keep version drift in load reports and emit it as events.
    pub report_version_drift: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_perform: true,
            undo_depth: DEFAULT_UNDO_DEPTH,
            report_version_drift: true,
        }
    }
}

#[derive(Debug)]
pub struct Workspace {
    library: MacroLibrary,
    graph: Graph,
    undo: UndoStack,
    config: EngineConfig,
    events: Option<EventSender>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let mut graph = Graph::new();
        graph.set_auto_perform(config.auto_perform);
        Self {
            library: MacroLibrary::new(),
            graph,
            undo: UndoStack::new(config.undo_depth),
            config,
            events: None,
        }
    }

    pub fn set_event_sink(&mut self, sink: Option<EventSender>) {
        self.graph.set_event_sink(sink.clone());
        self.events = sink;
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn registry(&self) -> &TypeRegistry {
        self.library.registry()
    }

    pub fn library(&self) -> &MacroLibrary {
        &self.library
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a node of any registered type, macros included.
    pub fn create(&mut self, type_name: &str) -> GraphResult<NodeId> {
        self.graph.create(self.library.registry(), type_name)
    }

    pub fn copy(&self, ids: &[NodeId]) -> SavedGraph {
        self.graph.save_selection(ids)
    }

    pub fn paste(&mut self, saved: &SavedGraph) -> GraphResult<Vec<NodeId>> {
        self.graph.paste(saved, self.library.registry())
    }

    pub fn perform_all(&mut self) -> PerformReport {
        self.graph.perform_all()
    }

    // ── Documents ──

    pub fn save_document(&self) -> SavedDocument {
        SavedDocument {
            macros: self.library.to_saved(),
            graph: self.graph.save(),
            ..Default::default()
        }
    }

    /// Replace the whole workspace with `doc`, then run a bulk perform.
    ///
    /// Nothing is touched unless every macro and the main graph load.
    pub fn load_document(&mut self, doc: &SavedDocument) -> GraphResult<LoadReport> {
        let report = self.restore(doc)?;
        self.undo.clear();
        tracing::info!(
            "Loaded document: {} nodes, {} macros",
            self.graph.len(),
            self.library.names().len()
        );
        Ok(report)
    }

    fn restore(&mut self, doc: &SavedDocument) -> GraphResult<LoadReport> {
        let (library, mut report) = MacroLibrary::from_saved(&doc.macros)?;
        let (mut graph, graph_report) = Graph::load(&doc.graph, library.registry())?;
        report.merge(graph_report);

        if !self.config.report_version_drift {
            report
                .warnings
                .retain(|w| !matches!(w, LoadWarning::VersionDrift { .. }));
        }

        graph.set_auto_perform(self.config.auto_perform);
        graph.set_event_sink(self.events.clone());
        self.library = library;
        self.graph = graph;

        if let Some(tx) = &self.events {
            for warning in report.version_drift() {
                if let LoadWarning::VersionDrift {
                    node,
                    type_name,
                    saved,
                    current,
                } = warning
                {
                    let _ = tx.send(GraphEvent::VersionDrift {
                        node: node.clone(),
                        type_name: type_name.clone(),
                        saved: saved.clone(),
                        current: current.clone(),
                    });
                }
            }
        }

        self.graph.perform_all();
        Ok(report)
    }

    // ── Macros ──

    /// Define a macro from a prototype graph, e.g. a copied selection.
    pub fn define_macro(&mut self, name: &str, prototype: &SavedGraph) -> GraphResult<()> {
        self.library.define(name, prototype)?;
        Ok(())
    }

    /// Edit a prototype, then bring every instance in the main graph up to
    /// date and re-run it.
    pub fn edit_macro<F>(&mut self, name: &str, f: F) -> GraphResult<()>
    where
        F: FnOnce(&mut Graph, &TypeRegistry) -> GraphResult<()>,
    {
        self.library.edit(name, f)?;
        self.resync(&Aliases::new())
    }

    pub fn rename_macro(&mut self, old: &str, new: &str) -> GraphResult<()> {
        let aliases = self.library.rename(old, new)?;
        self.resync(&aliases)
    }

    /// Remove a macro. Refused while it is instantiated anywhere.
    pub fn remove_macro(&mut self, name: &str) -> GraphResult<()> {
        let count = self.instance_count(name);
        if count > 0 {
            return Err(GraphError::Macro(format!(
                "macro '{}' has {} instance(s) in the graph",
                name, count
            )));
        }
        self.library.remove(name)?;
        Ok(())
    }

    /// Instances of macro `name` in the main graph and in other prototypes.
    pub fn instance_count(&self, name: &str) -> usize {
        count_instances(&self.graph, name) + self.library.instances_in_prototypes(name)
    }

    fn resync(&mut self, aliases: &Aliases) -> GraphResult<()> {
        let touched = self.library.resync(&mut self.graph, aliases)?;
        if touched > 0 {
            tracing::debug!("Resynchronised {} macro instances", touched);
            self.graph.perform_all();
        }
        Ok(())
    }

    // ── Undo ──

    /// Record the current state as an undo point.
    pub fn checkpoint(&mut self) {
        let snapshot = self.save_document();
        self.undo.push(snapshot);
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    pub fn undo(&mut self) -> GraphResult<()> {
        let snapshot = self.undo.pop_undo().ok_or(GraphError::UndoEmpty)?;
        let current = self.save_document();
        match self.restore(&snapshot) {
            Ok(_) => {
                self.undo.push_redo(current);
                Ok(())
            }
            Err(e) => {
                self.undo.push_back_undo(snapshot);
                Err(e)
            }
        }
    }

    pub fn redo(&mut self) -> GraphResult<()> {
        let snapshot = self.undo.pop_redo().ok_or(GraphError::UndoEmpty)?;
        let current = self.save_document();
        match self.restore(&snapshot) {
            Ok(_) => {
                self.undo.push_undo_keep_redo(current);
                Ok(())
            }
            Err(e) => {
                self.undo.push_redo(snapshot);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::events::event_channel;
    use crate::graph::node::NodeState;
    use crate::graph::nodes::{MACRO_IN, MACRO_OUT};

    fn norm_proto(g: &mut Graph, reg: &TypeRegistry) -> GraphResult<()> {
        let min = g.create(reg, MACRO_IN)?;
        let s = g.create(reg, "stretch")?;
        let mout = g.create(reg, MACRO_OUT)?;
        g.connect(s, 0, min, 0);
        g.connect(mout, 0, s, 0);
        Ok(())
    }

    #[test]
    fn test_macro_instance_computes() {
        let mut ws = Workspace::new();
        ws.define_macro("norm", &SavedGraph::default()).unwrap();
        ws.edit_macro("norm", norm_proto).unwrap();

        let gen = ws.create("gen").unwrap();
        let inst = ws.create("norm").unwrap();
        assert!(ws.graph_mut().connect(inst, 0, gen, 0).is_connected());
        let node = ws.graph().get(inst).unwrap();
        assert_eq!(node.state(), NodeState::Clean);
        assert!(node.output(0).and_then(|d| d.as_image()).is_some());
        assert_eq!(ws.instance_count("norm"), 1);
    }

    #[test]
    fn test_edit_resyncs_instances() {
        let mut ws = Workspace::new();
        ws.define_macro("m", &SavedGraph::default()).unwrap();
        let inst = ws.create("m").unwrap();
        assert_eq!(ws.graph().get(inst).unwrap().inputs().len(), 0);

        ws.edit_macro("m", norm_proto).unwrap();
        let node = ws.graph().get(inst).unwrap();
        assert_eq!(node.inputs().len(), 1);
        assert_eq!(node.node_type().outputs.len(), 1);
        assert_eq!(node.inner_graph().map(|g| g.len()), Some(3));
    }

    #[test]
    fn test_rename_and_remove_macro() {
        let mut ws = Workspace::new();
        ws.define_macro("old", &SavedGraph::default()).unwrap();
        let inst = ws.create("old").unwrap();
        ws.rename_macro("old", "new").unwrap();
        assert_eq!(ws.graph().get(inst).unwrap().type_name(), "new");
        assert!(!ws.registry().contains("old"));

        assert!(ws.remove_macro("new").is_err());
        ws.graph_mut().remove(inst).unwrap();
        ws.remove_macro("new").unwrap();
        assert!(!ws.registry().contains("new"));
    }

    #[test]
    fn test_undo_redo() {
        let mut ws = Workspace::new();
        ws.checkpoint();
        ws.create("gen").unwrap();
        ws.checkpoint();
        ws.create("sink").unwrap();
        assert_eq!(ws.graph().len(), 2);

        ws.undo().unwrap();
        assert_eq!(ws.graph().len(), 1);
        ws.undo().unwrap();
        assert!(ws.graph().is_empty());
        assert!(matches!(ws.undo(), Err(GraphError::UndoEmpty)));

        ws.redo().unwrap();
        assert_eq!(ws.graph().len(), 1);
        ws.redo().unwrap();
        assert_eq!(ws.graph().len(), 2);
        assert!(!ws.can_redo());
    }

    #[test]
    fn test_load_document_emits_drift() {
        let mut ws = Workspace::new();
        ws.create("gen").unwrap();
        let mut doc = ws.save_document();
        if let Some(n) = doc.graph.0.get_mut("gen0") {
            n.checksum = "f".repeat(64);
        }

        let (tx, rx) = event_channel();
        let mut other = Workspace::new();
        other.set_event_sink(Some(tx));
        let report = other.load_document(&doc).unwrap();
        assert_eq!(report.version_drift().count(), 1);
        assert!(rx
            .try_iter()
            .any(|e| matches!(e, GraphEvent::VersionDrift { .. })));
        assert_eq!(
            other.graph().by_name("gen0").unwrap().state(),
            NodeState::Clean
        );
    }

    #[test]
    fn test_drift_reporting_can_be_disabled() {
        let mut ws = Workspace::new();
        ws.create("constant").unwrap();
        let mut doc = ws.save_document();
        if let Some(n) = doc.graph.0.get_mut("constant0") {
            n.checksum = "f".repeat(64);
        }
        let mut quiet = Workspace::with_config(EngineConfig {
            report_version_drift: false,
            ..Default::default()
        });
        assert!(quiet.load_document(&doc).unwrap().is_clean());
    }

    #[test]
    fn test_failed_load_keeps_workspace() {
        let mut ws = Workspace::new();
        ws.create("gen").unwrap();
        ws.create("sink").unwrap();
        let mut doc = ws.save_document();
        if let Some(n) = doc.graph.0.get_mut("sink0") {
            n.ins = vec![Some(("nowhere".to_string(), 0))];
        }
        assert!(ws.load_document(&doc).is_err());
        assert!(ws.graph().find("gen0").is_some());
    }
}
