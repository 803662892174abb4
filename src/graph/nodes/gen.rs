//! Synthetic image source.
//!
//! Produces a flat cube. The output type follows the `bands` parameter, so
//! changing it can retroactively invalidate downstream connections.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::{Datum, ImageCube};
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeLogic, NodeType};
use serde_json::Value;

pub struct GenLogic;

impl NodeLogic for GenLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        node.param_default("width", Value::from(64));
        node.param_default("height", Value::from(64));
        node.param_default("bands", Value::from(3));
        node.param_default("value", Value::from(0.5));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let node = &ctx.node;
        let width = node.param_usize("width").unwrap_or(0);
        let height = node.param_usize("height").unwrap_or(0);
        let bands = node.param_usize("bands").unwrap_or(0);
        let value = node.param_f64("value").unwrap_or(0.0) as f32;
        if width == 0 || height == 0 || bands == 0 {
            return Err(ComputeError::data(format!(
                "cannot generate a {}x{}x{} image",
                width, height, bands
            )));
        }
        let image = ImageCube::filled(width, height, bands, value).ok_or_else(|| {
            ComputeError::data(format!(
                "a {}x{}x{} image exceeds the {} sample limit",
                width,
                height,
                bands,
                ImageCube::MAX_SAMPLES
            ))
        })?;
        let sources = ctx.own_source();
        ctx.set_output(0, Datum::image(image, sources));
        Ok(())
    }

    fn generate_output_types(
        &self,
        node: &Node,
        _input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        let bands = node.param_usize("bands").unwrap_or(3);
        vec![Some(ConnType::image_for_bands(bands))]
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("gen", "source", GenLogic)
        .description("Generates a uniform test image.")
        .output("out", ConnType::Variant, "generated image")
        .autoserialise(&["width", "height", "bands", "value"])
        .logic_revision("2")
        .build()
}
