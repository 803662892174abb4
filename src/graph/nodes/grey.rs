//! Collapse any image to a single band by averaging.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::Datum;
use crate::graph::error::ComputeError;
use crate::graph::node::ComputeContext;
use crate::graph::node_type::{NodeLogic, NodeType};

pub struct GreyLogic;

impl NodeLogic for GreyLogic {
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let Some(image) = ctx.input_image(0)? else {
            return Ok(());
        };
        let grey = image.band_mean();
        let sources = ctx.input_sources();
        ctx.set_output(0, Datum::image(grey, sources));
        Ok(())
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("grey", "processing", GreyLogic)
        .description("Converts an image to greyscale by band mean.")
        .input("in", ConnType::Img, "")
        .output("out", ConnType::ImgGrey, "")
        .build()
}
