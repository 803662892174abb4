//! A numeric constant.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::Datum;
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeLogic, NodeType};
use serde_json::Value;

pub struct ConstantLogic;

impl NodeLogic for ConstantLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        node.param_default("value", Value::from(0.0));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let value = ctx
            .node
            .param_f64("value")
            .ok_or_else(|| ComputeError::data("value is not a number"))?;
        let sources = ctx.own_source();
        ctx.set_output(0, Datum::number(value, sources));
        Ok(())
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("constant", "data", ConstantLogic)
        .description("A fixed number.")
        .output("out", ConnType::Number, "the value")
        .autoserialise(&["value"])
        .build()
}
