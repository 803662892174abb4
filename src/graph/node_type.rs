//! Node type descriptors.
//!
//! A `NodeType` is immutable and shared (`Arc`) between the registry and
//! every node created from it. Per-type behaviour lives behind the
//! [`NodeLogic`] trait; the engine only ever calls these hooks and never
//! inspects a node's type-specific state itself.

use crate::graph::conn_type::{ConnType, Connector};
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::node::{ComputeContext, Node};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// Hooks implemented by each node type.
///
/// Only `compute` is mandatory. Everything else defaults to a no-op.
pub trait NodeLogic: Send + Sync {
    /// Set up control fields on a freshly created node.
    fn init(&self, _node: &mut Node) -> GraphResult<()> {
        Ok(())
    }

    /// Produce outputs from the node's inputs and controls.
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError>;

    /// Resolve polymorphic outputs from the currently attached input types.
    ///
    /// `input_types[i]` is the resolved output type feeding input `i`, or
    /// `None` if the slot is empty. Returns one override per output; `None`
    /// keeps the declared type.
    fn generate_output_types(
        &self,
        node: &Node,
        _input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        vec![None; node.node_type().outputs.len()]
    }

    /// Called after any control change or deserialization.
    fn recalculate(&self, _node: &mut Node) {}

    /// Extra fields to persist beyond the auto-serialised parameters.
    fn serialize(&self, _node: &Node) -> Map<String, Value> {
        Map::new()
    }

    fn deserialize(&self, _node: &mut Node, _fields: &Map<String, Value>) -> GraphResult<()> {
        Ok(())
    }
}

/// What role a type plays in the macro system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Builtin,
    /// Macro input boundary node.
    MacroIn,
    /// Macro output boundary node.
    MacroOut,
    /// Instance of a user-defined macro.
    Macro,
}

pub struct NodeType {
    pub name: String,
    pub group: String,
    pub version: String,
    pub description: String,
    pub inputs: Vec<Connector>,
    pub outputs: Vec<Connector>,
    /// Parameter keys persisted verbatim as top-level node fields.
    pub autoserialise: Vec<String>,
    pub kind: NodeKind,
    logic: Arc<dyn NodeLogic>,
    checksum: String,
}

impl NodeType {
    pub fn builder(name: &str, group: &str, logic: impl NodeLogic + 'static) -> NodeTypeBuilder {
        NodeTypeBuilder {
            name: name.to_string(),
            group: group.to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            autoserialise: Vec::new(),
            kind: NodeKind::Builtin,
            logic: Arc::new(logic),
            logic_revision: String::new(),
            checksum_source: None,
            fixed_checksum: None,
        }
    }

    pub fn logic(&self) -> &Arc<dyn NodeLogic> {
        &self.logic
    }

    /// Hex SHA-256 of the type's defining content.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn is_macro(&self) -> bool {
        self.kind == NodeKind::Macro
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("name", &self.name)
            .field("group", &self.group)
            .field("version", &self.version)
            .field("kind", &self.kind)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .finish()
    }
}

pub struct NodeTypeBuilder {
    name: String,
    group: String,
    version: String,
    description: String,
    inputs: Vec<Connector>,
    outputs: Vec<Connector>,
    autoserialise: Vec<String>,
    kind: NodeKind,
    logic: Arc<dyn NodeLogic>,
    logic_revision: String,
    checksum_source: Option<String>,
    fixed_checksum: Option<String>,
}

impl NodeTypeBuilder {
    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn input(mut self, name: &str, conn_type: ConnType, desc: &str) -> Self {
        self.inputs.push(Connector::input(name, conn_type, desc));
        self
    }

    pub fn output(mut self, name: &str, conn_type: ConnType, desc: &str) -> Self {
        self.outputs.push(Connector::output(name, conn_type, desc));
        self
    }

    pub fn connectors(mut self, inputs: Vec<Connector>, outputs: Vec<Connector>) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    pub fn autoserialise(mut self, keys: &[&str]) -> Self {
        self.autoserialise = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Revision tag of the `compute` logic. Bump it when behaviour changes
    /// without a connector change, so saved documents report drift.
    pub fn logic_revision(mut self, revision: &str) -> Self {
        self.logic_revision = revision.to_string();
        self
    }

    /// Use `checksum` as is instead of hashing the descriptor.
    pub(crate) fn fixed_checksum(mut self, checksum: String) -> Self {
        self.fixed_checksum = Some(checksum);
        self
    }

    /// Extra content mixed into the checksum (macros hash their template).
    pub fn checksum_source(mut self, source: String) -> Self {
        self.checksum_source = Some(source);
        self
    }

    pub fn build(self) -> NodeType {
        let checksum = match &self.fixed_checksum {
            Some(fixed) => fixed.clone(),
            None => compute_checksum(&self),
        };
        NodeType {
            name: self.name,
            group: self.group,
            version: self.version,
            description: self.description,
            inputs: self.inputs,
            outputs: self.outputs,
            autoserialise: self.autoserialise,
            kind: self.kind,
            logic: self.logic,
            checksum,
        }
    }
}

fn compute_checksum(b: &NodeTypeBuilder) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b.name.as_bytes());
    hasher.update(b"\0");
    hasher.update(b.version.as_bytes());
    hasher.update(b"\0");
    hasher.update(b.logic_revision.as_bytes());
    for c in b.inputs.iter().chain(b.outputs.iter()) {
        hasher.update(format!("\0{:?}:{}:{}", c.direction, c.name, c.conn_type).as_bytes());
    }
    for key in &b.autoserialise {
        hasher.update(b"\0");
        hasher.update(key.as_bytes());
    }
    if let Some(src) = &b.checksum_source {
        hasher.update(b"\0");
        hasher.update(src.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}
