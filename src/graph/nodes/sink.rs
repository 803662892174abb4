//! Terminal node: records a caption of whatever arrives.

use crate::graph::conn_type::ConnType;
use crate::graph::error::ComputeError;
use crate::graph::node::ComputeContext;
use crate::graph::node_type::{NodeLogic, NodeType};

pub struct SinkLogic;

impl NodeLogic for SinkLogic {
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        ctx.node.status = ctx.input(0).map(|d| d.to_string());
        Ok(())
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("sink", "output", SinkLogic)
        .description("Accepts anything and shows what it received.")
        .input("in", ConnType::Any, "")
        .build()
}
