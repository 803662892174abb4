//! Serialized graph format.
//!
//! Nodes are keyed by their unique name and connections refer to sources by
//! name, so node order in the file is irrelevant and a selection can be saved
//! on its own. Loading is two-pass (create every node, then wire them up)
//! and is all-or-nothing: a fresh `Graph` is built and only handed back once
//! every reference has resolved.

use crate::graph::conn_type::ConnType;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::graph::{ConnectOutcome, Graph};
use crate::graph::id::NodeId;
use crate::graph::node::{Node, NodeState};
use crate::graph::nodes::unknown::placeholder_type;
use crate::graph::registry::TypeRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Current document format revision.
pub const FORMAT_VERSION: u32 = 1;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    #[serde(rename = "type")]
    pub type_name: String,
    pub ver: String,
    pub checksum: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub xy: (f64, f64),
    #[serde(default)]
    pub comment: String,
    /// `(source name, output index)` per input, or null.
    pub ins: Vec<Option<(String, usize)>>,
    #[serde(rename = "outputTypes", default)]
    pub output_types: Vec<Option<ConnType>>,
    #[serde(rename = "inputTypes", default)]
    pub input_types: Vec<Option<ConnType>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Auto-serialised parameters and type-specific fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A graph or selection, keyed by node name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SavedGraph(pub BTreeMap<String, SavedNode>);

impl SavedGraph {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SavedNode> {
        self.0.get(name)
    }

    /// Node type names referenced by this graph.
    pub fn type_names(&self) -> BTreeSet<&str> {
        self.0.values().map(|n| n.type_name.as_str()).collect()
    }

    pub fn to_json_string(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> GraphResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub format: u32,
    #[serde(default)]
    pub generator: String,
}

impl Default for DocumentInfo {
    fn default() -> Self {
        Self {
            format: FORMAT_VERSION,
            generator: format!("specgraph {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// A whole document: macro prototypes plus the main graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedDocument {
    #[serde(rename = "INFO", default)]
    pub info: DocumentInfo,
    /// Prototype graphs, loaded before the main graph.
    #[serde(rename = "MACROS", default)]
    pub macros: BTreeMap<String, SavedGraph>,
    #[serde(rename = "GRAPH", default)]
    pub graph: SavedGraph,
}

impl SavedDocument {
    pub fn to_json_string(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(json: &str) -> GraphResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Non-fatal findings from a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    /// Stored type checksum differs from the registered type.
    VersionDrift {
        node: String,
        type_name: String,
        saved: String,
        current: String,
    },
    /// A stored connection no longer type-checks and was dropped.
    Severed { node: String, input: usize },
    /// The node's type is not registered; a placeholder was loaded instead.
    UnknownType { node: String, type_name: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn version_drift(&self) -> impl Iterator<Item = &LoadWarning> {
        self.warnings
            .iter()
            .filter(|w| matches!(w, LoadWarning::VersionDrift { .. }))
    }

    pub fn unknown_types(&self) -> impl Iterator<Item = &LoadWarning> {
        self.warnings
            .iter()
            .filter(|w| matches!(w, LoadWarning::UnknownType { .. }))
    }

    pub fn merge(&mut self, other: LoadReport) {
        self.warnings.extend(other.warnings);
    }
}

/// Output types for a placeholder standing in for `name`: the saved override
/// where there is one, else what the first consumer of that output expects.
fn placeholder_outputs(
    saved: &SavedGraph,
    name: &str,
    sn: &SavedNode,
    registry: &TypeRegistry,
) -> Vec<ConnType> {
    let mut expected: BTreeMap<usize, ConnType> = BTreeMap::new();
    for consumer in saved.0.values() {
        for (input, conn) in consumer.ins.iter().enumerate() {
            let Some((src, output)) = conn else {
                continue;
            };
            if src != name || expected.contains_key(output) {
                continue;
            }
            let wanted = consumer
                .input_types
                .get(input)
                .copied()
                .flatten()
                .or_else(|| {
                    registry
                        .lookup(&consumer.type_name)
                        .and_then(|t| t.inputs.get(input))
                        .map(|c| c.conn_type)
                })
                .filter(|&t| t != ConnType::Variant)
                .unwrap_or(ConnType::Any);
            expected.insert(*output, wanted);
        }
    }

    let count = expected
        .keys()
        .next_back()
        .map_or(0, |&last| last + 1)
        .max(sn.output_types.len());
    (0..count)
        .map(|i| {
            sn.output_types
                .get(i)
                .copied()
                .flatten()
                .or_else(|| expected.get(&i).copied())
                .unwrap_or(ConnType::Any)
        })
        .collect()
}

impl Graph {
    pub fn save(&self) -> SavedGraph {
        SavedGraph(
            self.nodes()
                .map(|n| (n.name.clone(), self.save_node(n, None)))
                .collect(),
        )
    }

    /// Save a subset. Only edges with both ends in the subset are kept.
    pub fn save_selection(&self, ids: &[NodeId]) -> SavedGraph {
        let subset: BTreeSet<NodeId> = ids.iter().copied().collect();
        SavedGraph(
            subset
                .iter()
                .filter_map(|&id| self.node(id))
                .map(|n| (n.name.clone(), self.save_node(n, Some(&subset))))
                .collect(),
        )
    }

    fn save_node(&self, node: &Node, subset: Option<&BTreeSet<NodeId>>) -> SavedNode {
        let ins = node
            .inputs
            .iter()
            .map(|link| {
                let link = (*link)?;
                if subset.is_some_and(|s| !s.contains(&link.node)) {
                    return None;
                }
                let src = self.node(link.node)?;
                Some((src.name.clone(), link.output))
            })
            .collect();

        let node_type = &node.node_type;
        let mut extra = Map::new();
        for key in &node_type.autoserialise {
            if let Some(v) = node.params.get(key) {
                extra.insert(key.clone(), v.clone());
            }
        }
        extra.extend(node_type.logic().serialize(node));

        SavedNode {
            type_name: node_type.name.clone(),
            ver: node_type.version.clone(),
            checksum: node_type.checksum().to_string(),
            display_name: node.display_name.clone(),
            xy: node.xy,
            comment: node.comment.clone(),
            ins,
            output_types: node.output_types.clone(),
            input_types: node.input_types.clone(),
            enabled: node.enabled,
            extra,
        }
    }

    /// Build a new graph from a saved one.
    ///
    /// Auto-perform is off on the returned graph's load path; nothing is
    /// computed. Callers run [`Graph::perform_all`] afterwards.
    pub fn load(saved: &SavedGraph, registry: &TypeRegistry) -> GraphResult<(Graph, LoadReport)> {
        let mut graph = Graph::new();
        graph.set_auto_perform(false);
        let mut report = LoadReport::default();

        // Pass 1: every node, under its saved name.
        for (name, sn) in &saved.0 {
            let node_type = match registry.resolve(&sn.type_name) {
                Ok(node_type) => node_type,
                Err(GraphError::UnknownType(type_name)) => {
                    tracing::warn!(
                        "Node {} has unregistered type '{}', loading a placeholder",
                        name,
                        type_name
                    );
                    report.warnings.push(LoadWarning::UnknownType {
                        node: name.clone(),
                        type_name,
                    });
                    let outputs = placeholder_outputs(saved, name, sn, registry);
                    Arc::new(placeholder_type(sn, &outputs))
                }
                Err(e) => return Err(e),
            };
            if sn.checksum != node_type.checksum() {
                tracing::warn!(
                    "Node {} was saved with a different version of '{}' ({} -> {})",
                    name,
                    sn.type_name,
                    sn.ver,
                    node_type.version
                );
                report.warnings.push(LoadWarning::VersionDrift {
                    node: name.clone(),
                    type_name: sn.type_name.clone(),
                    saved: sn.checksum.clone(),
                    current: node_type.checksum().to_string(),
                });
            }
            let logic = Arc::clone(node_type.logic());
            let autoserialise = node_type.autoserialise.clone();
            let id = graph.insert_node(node_type, name.clone())?;
            let node = graph
                .node_mut(id)
                .ok_or_else(|| GraphError::CorruptDocument(format!("lost node {}", name)))?;

            node.display_name = sn.display_name.clone();
            node.xy = sn.xy;
            node.comment = sn.comment.clone();
            node.output_types = sn.output_types.clone();
            node.input_types = sn.input_types.clone();
            node.fit_to_type();
            node.enabled = sn.enabled;
            if !sn.enabled {
                node.state = NodeState::Disabled;
            }
            for key in &autoserialise {
                if let Some(v) = sn.extra.get(key) {
                    node.params.insert(key.clone(), v.clone());
                }
            }
            logic.deserialize(node, &sn.extra)?;
            logic.recalculate(node);
        }

        // Pass 2: wire by name.
        for (name, sn) in &saved.0 {
            let dst = graph
                .find(name)
                .ok_or_else(|| GraphError::CorruptDocument(format!("lost node {}", name)))?;
            for (input, conn) in sn.ins.iter().enumerate() {
                let Some((src_name, output)) = conn else {
                    continue;
                };
                let src = graph.find(src_name).ok_or_else(|| {
                    GraphError::CorruptDocument(format!(
                        "{}:{} refers to missing node '{}'",
                        name, input, src_name
                    ))
                })?;
                let outcome = graph.link(dst, input, src, *output);
                if outcome != ConnectOutcome::Connected {
                    return Err(GraphError::CorruptDocument(format!(
                        "cannot connect {}:{} -> {}:{} ({:?})",
                        src_name, output, name, input, outcome
                    )));
                }
            }
        }

        // Resolve polymorphic types once everything is wired.
        for (id, input) in graph.refresh_all_types() {
            let node = graph.get(id)?.name.clone();
            tracing::warn!("Dropped incompatible connection into {}:{}", node, input);
            report.warnings.push(LoadWarning::Severed { node, input });
        }

        debug_assert_eq!(graph.check_invariants(), Ok(()));
        graph.set_auto_perform(true);
        tracing::info!("Loaded graph with {} nodes", graph.len());
        Ok((graph, report))
    }

    /// Merge a saved selection into this graph, renaming on collision.
    ///
    /// Returns the ids of the new nodes. On error nothing is added.
    pub fn paste(&mut self, saved: &SavedGraph, registry: &TypeRegistry) -> GraphResult<Vec<NodeId>> {
        let renamed = self.rename_colliding(saved);
        let (mut incoming, _) = Graph::load(&renamed, registry)?;
        incoming.set_event_sink(self.event_sink().cloned());
        let added = self.absorb(incoming);
        tracing::info!("Pasted {} nodes", added.len());

        if self.auto_perform() {
            let roots: Vec<NodeId> = added
                .iter()
                .copied()
                .filter(|&id| {
                    self.node(id)
                        .is_some_and(|n| n.inputs.iter().all(Option::is_none))
                })
                .collect();
            for root in roots {
                self.perform(root);
            }
        }
        Ok(added)
    }

    /// Copy of `saved` where every name already used here is replaced by a
    /// fresh one and connection references are rewritten to match.
    fn rename_colliding(&self, saved: &SavedGraph) -> SavedGraph {
        let mut taken: BTreeSet<String> = self.nodes().map(|n| n.name.clone()).collect();
        taken.extend(saved.0.keys().cloned());

        let mut renames: BTreeMap<&str, String> = BTreeMap::new();
        for (name, sn) in &saved.0 {
            if self.find(name).is_none() {
                continue;
            }
            let mut k = 0usize;
            let fresh = loop {
                let candidate = format!("{}{}", sn.type_name, k);
                if !taken.contains(&candidate) {
                    break candidate;
                }
                k += 1;
            };
            taken.insert(fresh.clone());
            renames.insert(name.as_str(), fresh);
        }

        let rename = |name: &str| -> String {
            renames
                .get(name)
                .cloned()
                .unwrap_or_else(|| name.to_string())
        };
        SavedGraph(
            saved
                .0
                .iter()
                .map(|(name, sn)| {
                    let mut sn = sn.clone();
                    for (src, _) in sn.ins.iter_mut().flatten() {
                        *src = rename(src);
                    }
                    (rename(name), sn)
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::builtin_registry;

    fn sample() -> (Graph, NodeId, NodeId, NodeId) {
        let reg = builtin_registry();
        let mut g = Graph::new();
        let gen = g.create(reg, "gen").unwrap();
        let crop = g.create(reg, "crop").unwrap();
        let sink = g.create(reg, "sink").unwrap();
        g.connect(crop, 0, gen, 0);
        g.connect(sink, 0, crop, 0);
        g.set_param(crop, "w", 8).unwrap();
        g.set_display_name(gen, "Left eye").unwrap();
        (g, gen, crop, sink)
    }

    #[test]
    fn test_saved_shape() {
        let (g, ..) = sample();
        let saved = g.save();
        let json: Value = serde_json::from_str(&saved.to_json_string().unwrap()).unwrap();
        let crop = &json["crop0"];
        assert_eq!(crop["type"], "crop");
        assert_eq!(crop["ins"][0][0], "gen0");
        assert_eq!(crop["ins"][0][1], 0);
        assert_eq!(crop["w"], 8);
        assert_eq!(json["gen0"]["displayName"], "Left eye");
        assert!(json["gen0"]["checksum"].as_str().unwrap().len() == 64);
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let (g, ..) = sample();
        let saved = g.save();
        let (loaded, report) = Graph::load(&saved, builtin_registry()).unwrap();
        assert!(report.is_clean());
        assert_eq!(loaded.save(), saved);
        loaded.check_invariants().unwrap();
    }

    #[test]
    fn test_missing_reference_is_corrupt() {
        let (g, ..) = sample();
        let mut saved = g.save();
        saved.0.remove("gen0");
        let err = Graph::load(&saved, builtin_registry()).unwrap_err();
        assert!(matches!(err, GraphError::CorruptDocument(_)));
    }

    #[test]
    fn test_checksum_mismatch_is_drift_not_error() {
        let (g, ..) = sample();
        let mut saved = g.save();
        if let Some(n) = saved.0.get_mut("crop0") {
            n.checksum = "0".repeat(64);
        }
        let (loaded, report) = Graph::load(&saved, builtin_registry()).unwrap();
        assert_eq!(report.version_drift().count(), 1);
        assert!(loaded.find("crop0").is_some());
    }

    #[test]
    fn test_selection_drops_outside_edges() {
        let (g, _, crop, sink) = sample();
        let saved = g.save_selection(&[crop, sink]);
        assert_eq!(saved.len(), 2);
        assert_eq!(saved.get("crop0").unwrap().ins, vec![None]);
        assert_eq!(
            saved.get("sink0").unwrap().ins,
            vec![Some(("crop0".to_string(), 0))]
        );
    }

    #[test]
    fn test_paste_renames_collisions() {
        let (mut g, gen, crop, _) = sample();
        let saved = g.save_selection(&[gen, crop]);
        let added = g.paste(&saved, builtin_registry()).unwrap();
        assert_eq!(added.len(), 2);
        let names: Vec<&str> = added.iter().map(|&id| g.get(id).unwrap().name()).collect();
        assert_eq!(names, vec!["crop1", "gen1"]);
        let pasted_crop = g.by_name("crop1").unwrap();
        let src = pasted_crop.input(0).unwrap().node;
        assert_eq!(g.get(src).unwrap().name(), "gen1");
        g.check_invariants().unwrap();
    }

    #[test]
    fn test_failed_paste_adds_nothing() {
        let (mut g, ..) = sample();
        let mut saved = g.save();
        if let Some(n) = saved.0.get_mut("sink0") {
            n.ins = vec![Some(("nowhere".to_string(), 0))];
        }
        let before = g.len();
        assert!(g.paste(&saved, builtin_registry()).is_err());
        assert_eq!(g.len(), before);
    }

    #[test]
    fn test_unknown_type_loads_as_placeholder() {
        let (g, ..) = sample();
        let mut saved = g.save();
        if let Some(n) = saved.0.get_mut("crop0") {
            n.type_name = "warp".to_string();
            n.output_types = vec![None];
        }

        let (mut loaded, report) = Graph::load(&saved, builtin_registry()).unwrap();
        assert_eq!(
            report.unknown_types().collect::<Vec<_>>(),
            vec![&LoadWarning::UnknownType {
                node: "crop0".to_string(),
                type_name: "warp".to_string(),
            }]
        );
        assert_eq!(report.version_drift().count(), 0);

        // Both edges survive: the output takes the type the sink expects.
        let crop = loaded.by_name("crop0").unwrap();
        assert_eq!(crop.output_type(0), Some(ConnType::Any));
        assert!(crop.input(0).is_some());
        assert!(loaded.by_name("sink0").unwrap().input(0).is_some());
        loaded.check_invariants().unwrap();

        let run = loaded.perform_all();
        assert_eq!((run.computed, run.failed, run.waiting), (1, 1, 1));
        let crop = loaded.by_name("crop0").unwrap();
        assert_eq!(crop.error().map(|e| e.code.as_str()), Some("UNKNOWN"));
        assert_eq!(loaded.by_name("sink0").unwrap().state(), NodeState::Waiting);

        let resaved = loaded.save();
        assert_eq!(resaved, saved);
        assert_eq!(resaved.get("crop0").unwrap().extra["w"], 8);
    }

    #[test]
    fn test_document_json_keys() {
        let (g, ..) = sample();
        let doc = SavedDocument {
            graph: g.save(),
            ..Default::default()
        };
        let json: Value = serde_json::from_str(&doc.to_json_string().unwrap()).unwrap();
        assert!(json.get("INFO").is_some());
        assert!(json.get("MACROS").is_some());
        assert!(json["GRAPH"].get("gen0").is_some());
        let back = SavedDocument::from_json_str(&doc.to_json_string().unwrap()).unwrap();
        assert_eq!(back, doc);
    }
}
