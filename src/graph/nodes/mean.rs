//! Mean of every sample in an image.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::Datum;
use crate::graph::error::ComputeError;
use crate::graph::node::ComputeContext;
use crate::graph::node_type::{NodeLogic, NodeType};

pub struct MeanLogic;

impl NodeLogic for MeanLogic {
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let Some(image) = ctx.input_image(0)? else {
            return Ok(());
        };
        let mean = image
            .mean()
            .ok_or_else(|| ComputeError::data("mean of an empty image"))?;
        let sources = ctx.input_sources();
        ctx.set_output(0, Datum::number(mean, sources));
        Ok(())
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("mean", "analysis", MeanLogic)
        .description("Mean value over all pixels and bands.")
        .input("in", ConnType::Img, "")
        .output("mean", ConnType::Number, "")
        .build()
}
