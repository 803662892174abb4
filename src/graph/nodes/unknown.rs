//! Stand-in for node types missing from the registry.
//!
//! A document naming a retired or foreign type still loads: the node keeps
//! its saved fields and connector counts so it survives another save, and
//! every compute fails with `UNKNOWN` so nothing downstream runs on it.

use crate::graph::conn_type::ConnType;
use crate::graph::document::SavedNode;
use crate::graph::error::ComputeError;
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeLogic, NodeType};
use serde_json::{Map, Value};

pub const UNKNOWN_GROUP: &str = "unknown";

pub struct UnknownLogic {
    fields: Map<String, Value>,
}

impl NodeLogic for UnknownLogic {
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        Err(ComputeError::new(
            "UNKNOWN",
            format!("node type '{}' is not registered", ctx.node.node_type().name),
        ))
    }

    fn generate_output_types(
        &self,
        node: &Node,
        _input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        node.output_type_overrides().to_vec()
    }

    fn serialize(&self, _node: &Node) -> Map<String, Value> {
        self.fields.clone()
    }
}

/// A type shaped like `saved`: `any` inputs, one output per entry of
/// `outputs`, and the saved version and checksum.
pub(crate) fn placeholder_type(saved: &SavedNode, outputs: &[ConnType]) -> NodeType {
    let logic = UnknownLogic {
        fields: saved.extra.clone(),
    };
    let mut builder = NodeType::builder(&saved.type_name, UNKNOWN_GROUP, logic)
        .version(&saved.ver)
        .description("Placeholder for an unregistered node type.")
        .fixed_checksum(saved.checksum.clone());
    for i in 0..saved.ins.len().max(saved.input_types.len()) {
        builder = builder.input(&format!("in{}", i), ConnType::Any, "");
    }
    for (i, &conn_type) in outputs.iter().enumerate() {
        builder = builder.output(&format!("out{}", i), conn_type, "");
    }
    builder.build()
}
