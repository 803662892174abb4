//! Macros: subgraphs exposed as node types.
//!
//! A [`MacroPrototype`] is an editable graph whose `macroin`/`macroout`
//! boundary nodes define the connectors of a generated [`NodeType`]. Each
//! instance of that type embeds its own structural copy of the prototype,
//! built by saving the prototype and loading it back.
//!
//! Whenever any prototype changes, the [`MacroLibrary`] regenerates every
//! macro type in dependency order and the owner resynchronises each instance
//! by swapping in the new type, which rebuilds the embedded graph wholesale.
//! Instances are found by walking graphs rather than tracked by the
//! prototype.

use crate::graph::conn_type::Connector;
use crate::graph::datum::Datum;
use crate::graph::document::{LoadReport, SavedGraph};
use crate::graph::error::{ComputeError, GraphError, GraphResult};
use crate::graph::graph::Graph;
use crate::graph::id::NodeId;
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeKind, NodeLogic, NodeType};
use crate::graph::nodes::boundary::boundary_type;
use crate::graph::registry::{builtin_registry, TypeRegistry};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

/// Old name -> new name, applied while a macro is being renamed.
pub type Aliases = BTreeMap<String, String>;

pub struct MacroPrototype {
    name: String,
    graph: Graph,
}

impl MacroPrototype {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }
}

impl std::fmt::Debug for MacroPrototype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroPrototype")
            .field("name", &self.name)
            .field("nodes", &self.graph.len())
            .finish()
    }
}

/// Runs an instance by driving its embedded graph.
struct MacroInstanceLogic {
    template: Arc<SavedGraph>,
    /// Types visible to the template, including nested macros.
    registry: TypeRegistry,
    input_nodes: Vec<String>,
    output_nodes: Vec<String>,
}

fn boundary_missing(name: &str) -> ComputeError {
    ComputeError::new("MACRO", format!("boundary node {} is missing", name))
}

impl NodeLogic for MacroInstanceLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        let (mut inner, _) = Graph::load(&self.template, &self.registry)?;
        inner.set_auto_perform(false);
        node.inner = Some(Box::new(inner));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let inputs = ctx.inputs();
        let inner = ctx
            .node
            .inner
            .as_deref_mut()
            .ok_or_else(|| ComputeError::new("MACRO", "instance has no embedded graph"))?;

        for (name, value) in self.input_nodes.iter().zip(inputs) {
            let id = inner.find(name).ok_or_else(|| boundary_missing(name))?;
            inner.set_external(id, value.clone());
        }
        let out_ids = self
            .output_nodes
            .iter()
            .map(|name| inner.find(name).ok_or_else(|| boundary_missing(name)))
            .collect::<Result<Vec<NodeId>, ComputeError>>()?;
        for &id in &out_ids {
            inner.set_external(id, None);
        }

        inner.perform_all();

        let results: Vec<Option<Datum>> =
            out_ids.iter().map(|&id| inner.external(id).cloned()).collect();
        let failure = inner
            .nodes()
            .find_map(|n| n.error().map(|e| format!("{}: {}", n.name(), e)));

        for (i, value) in results.into_iter().enumerate() {
            if let Some(value) = value {
                ctx.set_output(i, value);
            }
        }
        match failure {
            Some(message) => Err(ComputeError::new("MACRO", message)),
            None => Ok(()),
        }
    }
}

/// Boundary nodes of one kind in connector order: top to bottom, then left
/// to right, then by name.
fn boundary_nodes(graph: &Graph, kind: NodeKind) -> Vec<&Node> {
    let mut nodes: Vec<&Node> = graph
        .nodes()
        .filter(|n| n.node_type().kind == kind)
        .collect();
    nodes.sort_by(|a, b| {
        a.xy.1
            .total_cmp(&b.xy.1)
            .then(a.xy.0.total_cmp(&b.xy.0))
            .then_with(|| a.name().cmp(b.name()))
    });
    nodes
}

/// Generate the node type for a prototype graph.
pub fn build_macro_type(name: &str, graph: &Graph, registry: &TypeRegistry) -> GraphResult<NodeType> {
    let ins = boundary_nodes(graph, NodeKind::MacroIn);
    let outs = boundary_nodes(graph, NodeKind::MacroOut);

    let inputs = ins
        .iter()
        .map(|n| Connector::input(&n.display_name, boundary_type(n), &n.comment))
        .collect();
    let outputs = outs
        .iter()
        .map(|n| Connector::output(&n.display_name, boundary_type(n), &n.comment))
        .collect();

    let template = graph.save();
    let checksum_source = template.to_json_string()?;
    let logic = MacroInstanceLogic {
        template: Arc::new(template),
        registry: registry.clone(),
        input_nodes: ins.iter().map(|n| n.name().to_string()).collect(),
        output_nodes: outs.iter().map(|n| n.name().to_string()).collect(),
    };

    Ok(NodeType::builder(name, "macros", logic)
        .description("User-defined macro.")
        .connectors(inputs, outputs)
        .kind(NodeKind::Macro)
        .checksum_source(checksum_source)
        .build())
}

/// Order names so each comes after everything it depends on.
fn dependency_order(deps: &BTreeMap<String, BTreeSet<String>>) -> GraphResult<Vec<String>> {
    let mut remaining: BTreeMap<&str, usize> = deps
        .iter()
        .map(|(name, d)| (name.as_str(), d.iter().filter(|x| deps.contains_key(*x)).count()))
        .collect();
    let mut queue: VecDeque<&str> = remaining
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(&name, _)| name)
        .collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(name) = queue.pop_front() {
        order.push(name.to_string());
        for (dependent, d) in deps {
            if d.contains(name) {
                if let Some(n) = remaining.get_mut(dependent.as_str()) {
                    *n -= 1;
                    if *n == 0 {
                        queue.push_back(dependent.as_str());
                    }
                }
            }
        }
    }

    if order.len() != deps.len() {
        let stuck: Vec<&str> = deps
            .keys()
            .map(|k| k.as_str())
            .filter(|k| !order.iter().any(|o| o == k))
            .collect();
        return Err(GraphError::Macro(format!(
            "recursive macro definition involving {}",
            stuck.join(", ")
        )));
    }
    Ok(order)
}

fn alias<'a>(aliases: &'a Aliases, name: &'a str) -> &'a str {
    aliases.get(name).map(|s| s.as_str()).unwrap_or(name)
}

/// Names of macro types instantiated directly in `graph`.
fn macros_used(graph: &Graph, aliases: &Aliases) -> BTreeSet<String> {
    graph
        .nodes()
        .filter(|n| n.node_type().is_macro())
        .map(|n| alias(aliases, n.type_name()).to_string())
        .collect()
}

/// Every prototype plus the registry that exposes them as types.
pub struct MacroLibrary {
    prototypes: BTreeMap<String, MacroPrototype>,
    registry: TypeRegistry,
}

impl Default for MacroLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MacroLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacroLibrary")
            .field("prototypes", &self.prototypes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MacroLibrary {
    pub fn new() -> Self {
        Self {
            prototypes: BTreeMap::new(),
            registry: builtin_registry().clone(),
        }
    }

    /// Builtins plus every macro type.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn names(&self) -> Vec<&str> {
        self.prototypes.keys().map(|k| k.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&MacroPrototype> {
        self.prototypes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.prototypes.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.prototypes.is_empty()
    }

    fn missing(name: &str) -> GraphError {
        GraphError::Macro(format!("no macro named '{}'", name))
    }

    /// Add a prototype built from `prototype` and register its type.
    pub fn define(&mut self, name: &str, prototype: &SavedGraph) -> GraphResult<Arc<NodeType>> {
        if self.registry.contains(name) {
            return Err(GraphError::DuplicateType(name.to_string()));
        }
        let (mut graph, _) = Graph::load(prototype, &self.registry)?;
        graph.set_auto_perform(false);
        self.prototypes.insert(
            name.to_string(),
            MacroPrototype {
                name: name.to_string(),
                graph,
            },
        );
        if let Err(e) = self.rebuild(&Aliases::new()) {
            self.prototypes.remove(name);
            self.rebuild(&Aliases::new())?;
            return Err(e);
        }
        tracing::info!("Defined macro {}", name);
        self.registry.resolve(name)
    }

    /// Edit a prototype in place. If the edit fails, or makes a macro
    /// contain itself, the prototype is restored and the error returned.
    pub fn edit<F>(&mut self, name: &str, f: F) -> GraphResult<()>
    where
        F: FnOnce(&mut Graph, &TypeRegistry) -> GraphResult<()>,
    {
        let registry = self.registry.clone();
        let snapshot = {
            let proto = self
                .prototypes
                .get_mut(name)
                .ok_or_else(|| Self::missing(name))?;
            let snapshot = proto.graph.save();
            match f(&mut proto.graph, &registry) {
                Ok(()) => snapshot,
                Err(e) => {
                    self.restore(name, &snapshot)?;
                    return Err(e);
                }
            }
        };

        if let Err(e) = self.rebuild(&Aliases::new()) {
            tracing::warn!("Rolling back edit of macro {}: {}", name, e);
            self.restore(name, &snapshot)?;
            self.rebuild(&Aliases::new())?;
            return Err(e);
        }
        tracing::info!("Edited macro {}", name);
        Ok(())
    }

    fn restore(&mut self, name: &str, snapshot: &SavedGraph) -> GraphResult<()> {
        let (mut graph, _) = Graph::load(snapshot, &self.registry)?;
        graph.set_auto_perform(false);
        if let Some(proto) = self.prototypes.get_mut(name) {
            proto.graph = graph;
        }
        Ok(())
    }

    /// Rename a macro and its registered type.
    ///
    /// Returns the alias map the caller must pass to [`MacroLibrary::resync`]
    /// for graphs outside the library.
    pub fn rename(&mut self, old: &str, new: &str) -> GraphResult<Aliases> {
        if !self.contains(old) {
            return Err(Self::missing(old));
        }
        if self.registry.contains(new) {
            return Err(GraphError::DuplicateType(new.to_string()));
        }
        let aliases: Aliases = [(old.to_string(), new.to_string())].into_iter().collect();
        if let Some(mut proto) = self.prototypes.remove(old) {
            proto.name = new.to_string();
            self.prototypes.insert(new.to_string(), proto);
        }
        self.registry.unregister(old);
        self.rebuild(&aliases)?;
        tracing::info!("Renamed macro {} to {}", old, new);
        Ok(aliases)
    }

    /// Remove a macro. Refused while another prototype still uses it; the
    /// caller checks its own graphs first.
    pub fn remove(&mut self, name: &str) -> GraphResult<MacroPrototype> {
        if !self.contains(name) {
            return Err(Self::missing(name));
        }
        let used_by: Vec<&str> = self
            .prototypes
            .values()
            .filter(|p| p.name != name && count_instances(&p.graph, name) > 0)
            .map(|p| p.name.as_str())
            .collect();
        if !used_by.is_empty() {
            return Err(GraphError::Macro(format!(
                "macro '{}' is used by {}",
                name,
                used_by.join(", ")
            )));
        }
        let proto = self.prototypes.remove(name).ok_or_else(|| Self::missing(name))?;
        self.registry.unregister(name);
        self.rebuild(&Aliases::new())?;
        tracing::info!("Removed macro {}", name);
        Ok(proto)
    }

    /// Instances of `name` inside other prototypes.
    pub fn instances_in_prototypes(&self, name: &str) -> usize {
        self.prototypes
            .values()
            .map(|p| count_instances(&p.graph, name))
            .sum()
    }

    /// Regenerate every macro type, dependencies first.
    fn rebuild(&mut self, aliases: &Aliases) -> GraphResult<()> {
        let deps: BTreeMap<String, BTreeSet<String>> = self
            .prototypes
            .iter()
            .map(|(name, p)| (name.clone(), macros_used(&p.graph, aliases)))
            .collect();
        let order = dependency_order(&deps)?;

        let mut registry = builtin_registry().clone();
        for name in order {
            let Some(proto) = self.prototypes.get_mut(&name) else {
                continue;
            };
            resync_graph(&mut proto.graph, &registry, aliases)?;
            let node_type = build_macro_type(&name, &proto.graph, &registry)?;
            registry.replace(node_type);
        }
        self.registry = registry;
        Ok(())
    }

    /// Swap every macro instance in `graph` over to the current type,
    /// rebuilding its embedded graph. Returns how many were touched.
    pub fn resync(&self, graph: &mut Graph, aliases: &Aliases) -> GraphResult<usize> {
        resync_graph(graph, &self.registry, aliases)
    }

    pub fn to_saved(&self) -> BTreeMap<String, SavedGraph> {
        self.prototypes
            .iter()
            .map(|(name, p)| (name.clone(), p.graph.save()))
            .collect()
    }

    /// Rebuild a library from saved prototypes, nested macros first.
    pub fn from_saved(macros: &BTreeMap<String, SavedGraph>) -> GraphResult<(Self, LoadReport)> {
        let deps: BTreeMap<String, BTreeSet<String>> = macros
            .iter()
            .map(|(name, g)| {
                let used = g
                    .type_names()
                    .into_iter()
                    .filter(|t| macros.contains_key(*t))
                    .map(|t| t.to_string())
                    .collect();
                (name.clone(), used)
            })
            .collect();
        let order = dependency_order(&deps)?;

        let mut library = MacroLibrary::new();
        let mut report = LoadReport::default();
        for name in order {
            let Some(saved) = macros.get(&name) else {
                continue;
            };
            if builtin_registry().contains(&name) {
                return Err(GraphError::DuplicateType(name));
            }
            let (mut graph, r) = Graph::load(saved, &library.registry)?;
            report.merge(r);
            graph.set_auto_perform(false);
            let node_type = build_macro_type(&name, &graph, &library.registry)?;
            library.registry.replace(node_type);
            library.prototypes.insert(
                name.clone(),
                MacroPrototype {
                    name: name.clone(),
                    graph,
                },
            );
        }
        tracing::info!("Loaded {} macros", library.prototypes.len());
        Ok((library, report))
    }
}

pub(crate) fn count_instances(graph: &Graph, name: &str) -> usize {
    graph
        .nodes()
        .filter(|n| n.node_type().is_macro() && n.type_name() == name)
        .count()
}

fn resync_graph(graph: &mut Graph, registry: &TypeRegistry, aliases: &Aliases) -> GraphResult<usize> {
    let targets: Vec<(NodeId, String)> = graph
        .nodes()
        .filter(|n| n.node_type().is_macro())
        .map(|n| (n.id(), alias(aliases, n.type_name()).to_string()))
        .collect();
    for (id, type_name) in &targets {
        let node_type = registry
            .lookup(type_name)
            .cloned()
            .ok_or_else(|| GraphError::Macro(format!("no macro named '{}'", type_name)))?;
        graph.replace_node_type(*id, node_type)?;
    }
    Ok(targets.len())
}
