//! Macro boundary nodes.
//!
//! Inside a macro prototype, each `macroin` node becomes an input connector
//! of the generated type and each `macroout` node an output connector. The
//! connector type comes from the node's `conn_type` parameter. When an
//! instance runs, values cross the boundary through the node's external
//! slot.

use crate::graph::conn_type::ConnType;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeKind, NodeLogic, NodeType};
use serde_json::Value;

pub const MACRO_IN: &str = "macroin";
pub const MACRO_OUT: &str = "macroout";

/// Connector type configured on a boundary node. Defaults to `img`.
pub fn boundary_type(node: &Node) -> ConnType {
    node.param_str("conn_type")
        .and_then(|s| s.parse().ok())
        .unwrap_or(ConnType::Img)
}

pub struct MacroInLogic;

impl NodeLogic for MacroInLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        node.param_default("conn_type", Value::from(ConnType::Img.name()));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        if let Some(value) = ctx.node.external.clone() {
            ctx.set_output(0, value);
        }
        Ok(())
    }

    fn generate_output_types(
        &self,
        node: &Node,
        _input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        vec![Some(boundary_type(node))]
    }
}

pub struct MacroOutLogic;

impl NodeLogic for MacroOutLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        node.param_default("conn_type", Value::from(ConnType::Img.name()));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        ctx.node.external = ctx.input(0).cloned();
        Ok(())
    }

    /// The declared input is `any`; the configured type narrows it.
    fn recalculate(&self, node: &mut Node) {
        let ty = boundary_type(node);
        if let Some(slot) = node.input_types.get_mut(0) {
            *slot = Some(ty);
        }
    }
}

pub fn macro_in_type() -> NodeType {
    NodeType::builder(MACRO_IN, "macros", MacroInLogic)
        .description("Input connector of a macro.")
        .output("out", ConnType::Variant, "value entering the macro")
        .autoserialise(&["conn_type"])
        .kind(NodeKind::MacroIn)
        .build()
}

pub fn macro_out_type() -> NodeType {
    NodeType::builder(MACRO_OUT, "macros", MacroOutLogic)
        .description("Output connector of a macro.")
        .input("in", ConnType::Any, "value leaving the macro")
        .autoserialise(&["conn_type"])
        .kind(NodeKind::MacroOut)
        .build()
}
