//! Node instances and the context handed to `compute`.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::{Datum, ImageCube, SourceSet};
use crate::graph::error::ComputeError;
use crate::graph::graph::Graph;
use crate::graph::id::{Link, NodeId};
use crate::graph::node_type::NodeType;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Per-node execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Outputs reflect current inputs and controls.
    Clean,
    /// Outputs are stale.
    Dirty,
    Running,
    /// Last compute failed; see [`Node::error`].
    Error,
    /// Skipped in the last pass because an input had no value.
    Waiting,
    Disabled,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Clean => "clean",
            NodeState::Dirty => "dirty",
            NodeState::Running => "running",
            NodeState::Error => "error",
            NodeState::Waiting => "waiting",
            NodeState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) node_type: Arc<NodeType>,
    /// Unique within the graph; the serialization key.
    pub(crate) name: String,
    pub display_name: String,
    pub xy: (f64, f64),
    pub comment: String,
    pub(crate) inputs: Vec<Option<Link>>,
    pub(crate) outputs: Vec<Option<Datum>>,
    pub(crate) last_good: Vec<Option<Datum>>,
    pub(crate) output_types: Vec<Option<ConnType>>,
    pub(crate) input_types: Vec<Option<ConnType>>,
    /// Reverse edges: child -> number of the child's inputs fed by this node.
    pub(crate) children: BTreeMap<NodeId, usize>,
    /// Type-specific control fields.
    pub params: Map<String, Value>,
    pub(crate) state: NodeState,
    pub(crate) error: Option<ComputeError>,
    /// Free-form status line set by compute (e.g. a sink's caption).
    pub status: Option<String>,
    pub(crate) enabled: bool,
    /// Embedded graph of a macro instance.
    pub(crate) inner: Option<Box<Graph>>,
    /// Value crossing a macro boundary node.
    pub(crate) external: Option<Datum>,
}

impl Node {
    pub(crate) fn new(id: NodeId, node_type: Arc<NodeType>, name: String) -> Self {
        let n_in = node_type.inputs.len();
        let n_out = node_type.outputs.len();
        Self {
            id,
            display_name: name.clone(),
            name,
            xy: (0.0, 0.0),
            comment: String::new(),
            inputs: vec![None; n_in],
            outputs: vec![None; n_out],
            last_good: vec![None; n_out],
            output_types: vec![None; n_out],
            input_types: vec![None; n_in],
            children: BTreeMap::new(),
            params: Map::new(),
            state: NodeState::Dirty,
            error: None,
            status: None,
            enabled: true,
            inner: None,
            external: None,
            node_type,
        }
    }

    /// Resize every per-connector vector to match the current type.
    pub(crate) fn fit_to_type(&mut self) {
        let n_in = self.node_type.inputs.len();
        let n_out = self.node_type.outputs.len();
        self.inputs.resize(n_in, None);
        self.input_types.resize(n_in, None);
        self.outputs.resize(n_out, None);
        self.last_good.resize(n_out, None);
        self.output_types.resize(n_out, None);
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.node_type
    }

    pub fn type_name(&self) -> &str {
        &self.node_type.name
    }

    pub fn inputs(&self) -> &[Option<Link>] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<Link> {
        self.inputs.get(index).copied().flatten()
    }

    pub fn output(&self, index: usize) -> Option<&Datum> {
        self.outputs.get(index).and_then(|d| d.as_ref())
    }

    pub fn outputs(&self) -> &[Option<Datum>] {
        &self.outputs
    }

    /// What a UI should show for an output: the live value, or in the
    /// `Error` state the last successfully computed one.
    pub fn display_output(&self, index: usize) -> Option<&Datum> {
        match self.state {
            NodeState::Error => self.last_good.get(index).and_then(|d| d.as_ref()),
            _ => self.output(index),
        }
    }

    pub fn children(&self) -> &BTreeMap<NodeId, usize> {
        &self.children
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn error(&self) -> Option<&ComputeError> {
        self.error.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Resolved type of an output: the override if set, else the declared type.
    pub fn output_type(&self, index: usize) -> Option<ConnType> {
        let declared = self.node_type.outputs.get(index)?.conn_type;
        Some(self.output_types.get(index).copied().flatten().unwrap_or(declared))
    }

    pub fn output_type_overrides(&self) -> &[Option<ConnType>] {
        &self.output_types
    }

    /// Effective type of an input slot, honouring any override.
    pub fn input_type(&self, index: usize) -> Option<ConnType> {
        let declared = self.node_type.inputs.get(index)?.conn_type;
        Some(self.input_types.get(index).copied().flatten().unwrap_or(declared))
    }

    pub fn input_type_overrides(&self) -> &[Option<ConnType>] {
        &self.input_types
    }

    pub fn inner_graph(&self) -> Option<&Graph> {
        self.inner.as_deref()
    }

    pub fn param_f64(&self, key: &str) -> Option<f64> {
        self.params.get(key).and_then(Value::as_f64)
    }

    /// Non-negative integer parameter. Whole floats such as `64.0` count.
    pub fn param_usize(&self, key: &str) -> Option<usize> {
        let value = self.params.get(key)?;
        let n = value.as_u64().or_else(|| {
            value
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        })?;
        usize::try_from(n).ok()
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Insert `value` under `key` unless already present.
    pub fn param_default(&mut self, key: &str, value: Value) {
        self.params.entry(key.to_string()).or_insert(value);
    }

    pub(crate) fn clear_outputs(&mut self) {
        for o in &mut self.outputs {
            *o = None;
        }
    }
}

/// Handed to [`NodeLogic::compute`](crate::graph::NodeLogic::compute).
///
/// Input values are prefetched so the node can be borrowed mutably while
/// reading them.
pub struct ComputeContext<'a> {
    pub node: &'a mut Node,
    inputs: &'a [Option<Datum>],
}

impl<'a> ComputeContext<'a> {
    pub fn new(node: &'a mut Node, inputs: &'a [Option<Datum>]) -> Self {
        Self { node, inputs }
    }

    pub fn input(&self, index: usize) -> Option<&'a Datum> {
        self.inputs.get(index).and_then(|d| d.as_ref())
    }

    pub fn inputs(&self) -> &'a [Option<Datum>] {
        self.inputs
    }

    /// Image on input `index`; `Ok(None)` if unconnected, `TYPE` error if
    /// the value is not an image.
    pub fn input_image(&self, index: usize) -> Result<Option<&'a ImageCube>, ComputeError> {
        match self.input(index) {
            None => Ok(None),
            Some(d) => d.as_image().map(Some).ok_or_else(|| {
                ComputeError::type_mismatch(format!(
                    "input {} expected an image, got {}",
                    index,
                    d.conn_type()
                ))
            }),
        }
    }

    /// Union of all input provenance.
    pub fn input_sources(&self) -> SourceSet {
        SourceSet::union(self.inputs.iter().flatten().map(|d| d.sources()))
    }

    /// Provenance for a node that originates data.
    pub fn own_source(&self) -> SourceSet {
        SourceSet::single(self.node.display_name.clone())
    }

    pub fn set_output(&mut self, index: usize, datum: Datum) {
        if let Some(slot) = self.node.outputs.get_mut(index) {
            *slot = Some(datum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::registry::builtin_registry;

    fn node_of(type_name: &str) -> Node {
        let t = builtin_registry().resolve(type_name).unwrap();
        Node::new(NodeId(0), t, format!("{}0", type_name))
    }

    #[test]
    fn test_new_node_shapes_slots_from_type() {
        let n = node_of("merge");
        assert_eq!(n.inputs().len(), 3);
        assert_eq!(n.outputs().len(), 1);
        assert_eq!(n.state(), NodeState::Dirty);
        assert!(n.is_enabled());
        assert_eq!(n.display_name, "merge0");
    }

    #[test]
    fn test_param_usize_accepts_whole_floats() {
        let mut n = node_of("gen");
        for (value, expected) in [
            (Value::from(64), Some(64)),
            (Value::from(64.0), Some(64)),
            (Value::from(2.5), None),
            (Value::from(-1.0), None),
            (Value::from(-3), None),
            (Value::from("8"), None),
        ] {
            n.params.insert("width".to_string(), value.clone());
            assert_eq!(n.param_usize("width"), expected, "{}", value);
        }
        assert_eq!(n.param_usize("missing"), None);
    }

    #[test]
    fn test_output_type_override() {
        let mut n = node_of("stretch");
        assert_eq!(n.output_type(0), Some(ConnType::Variant));
        n.output_types[0] = Some(ConnType::ImgRgb);
        assert_eq!(n.output_type(0), Some(ConnType::ImgRgb));
        assert_eq!(n.output_type(1), None);
    }

    #[test]
    fn test_input_type_override() {
        let mut n = node_of("sink");
        assert_eq!(n.input_type(0), Some(ConnType::Any));
        n.input_types[0] = Some(ConnType::Number);
        assert_eq!(n.input_type(0), Some(ConnType::Number));
    }

    #[test]
    fn test_display_output_falls_back_on_error() {
        let mut n = node_of("constant");
        let good = Datum::number(1.0, SourceSet::new());
        n.last_good[0] = Some(good);
        assert!(n.display_output(0).is_none());
        n.state = NodeState::Error;
        assert_eq!(n.display_output(0).and_then(|d| d.as_number()), Some(1.0));
    }

    #[test]
    fn test_context_input_image_type_check() {
        let mut n = node_of("stretch");
        let inputs = vec![Some(Datum::number(2.0, SourceSet::new()))];
        let ctx = ComputeContext::new(&mut n, &inputs);
        let err = ctx.input_image(0).unwrap_err();
        assert_eq!(err.code, "TYPE");
    }

    #[test]
    fn test_params() {
        let mut n = node_of("constant");
        n.params.insert("value".into(), Value::from(2.5));
        n.param_default("value", Value::from(9.0));
        assert_eq!(n.param_f64("value"), Some(2.5));
        assert_eq!(n.param_str("value"), None);
    }
}
