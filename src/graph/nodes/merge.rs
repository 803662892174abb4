//! Merge three greyscale images into RGB.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::{Datum, ImageCube};
use crate::graph::error::ComputeError;
use crate::graph::node::ComputeContext;
use crate::graph::node_type::{NodeLogic, NodeType};

pub struct MergeLogic;

impl NodeLogic for MergeLogic {
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let mut planes = Vec::with_capacity(3);
        for i in 0..3 {
            match ctx.input_image(i)? {
                Some(img) => planes.push(img),
                None => return Ok(()),
            }
        }
        let rgb = ImageCube::interleave(&planes).ok_or_else(|| {
            let sizes: Vec<String> = planes
                .iter()
                .map(|p| format!("{}x{}x{}", p.width(), p.height(), p.bands()))
                .collect();
            ComputeError::data(format!("cannot merge {}", sizes.join(", ")))
        })?;
        let sources = ctx.input_sources();
        ctx.set_output(0, Datum::image(rgb, sources));
        Ok(())
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("merge", "processing", MergeLogic)
        .description("Merges three single-band images into one RGB image.")
        .input("red", ConnType::ImgGrey, "")
        .input("green", ConnType::ImgGrey, "")
        .input("blue", ConnType::ImgGrey, "")
        .output("rgb", ConnType::ImgRgb, "")
        .build()
}
