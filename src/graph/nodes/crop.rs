//! Rectangular crop. Output type mirrors the input's.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::{Datum, Rect};
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeLogic, NodeType};
use crate::graph::nodes::mirror_first_input;
use serde_json::Value;

pub struct CropLogic;

fn rect_of(node: &Node) -> Rect {
    Rect::new(
        node.param_usize("x").unwrap_or(0),
        node.param_usize("y").unwrap_or(0),
        node.param_usize("w").unwrap_or(0),
        node.param_usize("h").unwrap_or(0),
    )
}

impl NodeLogic for CropLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        node.param_default("x", Value::from(0));
        node.param_default("y", Value::from(0));
        node.param_default("w", Value::from(32));
        node.param_default("h", Value::from(32));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let Some(image) = ctx.input_image(0)? else {
            return Ok(());
        };
        let rect = rect_of(ctx.node);
        let cropped = image.crop(rect).ok_or_else(|| {
            ComputeError::data(format!(
                "crop ({},{} {}x{}) is outside the {}x{} image",
                rect.x,
                rect.y,
                rect.w,
                rect.h,
                image.width(),
                image.height()
            ))
        })?;
        let sources = ctx.input_sources();
        ctx.set_output(0, Datum::image(cropped, sources));
        Ok(())
    }

    fn generate_output_types(
        &self,
        _node: &Node,
        input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        mirror_first_input(input_types)
    }

    /// Negative or fractional values typed in by hand are clamped.
    fn recalculate(&self, node: &mut Node) {
        for key in ["x", "y", "w", "h"] {
            let clamped = node
                .param_f64(key)
                .map(|v| v.max(0.0).floor() as u64)
                .unwrap_or(0);
            node.params.insert(key.to_string(), Value::from(clamped));
        }
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("crop", "processing", CropLogic)
        .description("Crops an image to a rectangle.")
        .input("in", ConnType::Img, "image to crop")
        .output("out", ConnType::Variant, "cropped image")
        .autoserialise(&["x", "y", "w", "h"])
        .build()
}

#[cfg(test)]
mod tests {
    use crate::graph::graph::Graph;
    use crate::graph::registry::builtin_registry;

    #[test]
    fn test_crop_size_and_clamp() {
        let reg = builtin_registry();
        let mut g = Graph::new();
        let gen = g.create(reg, "gen").unwrap();
        let crop = g.create(reg, "crop").unwrap();
        g.connect(crop, 0, gen, 0);
        g.set_param(crop, "w", -4.5).unwrap();
        assert_eq!(g.get(crop).unwrap().param_usize("w"), Some(0));

        g.set_param(crop, "w", 10).unwrap();
        g.set_param(crop, "h", 5).unwrap();
        let img = g.get(crop).unwrap().output(0).unwrap().as_image().unwrap();
        assert_eq!((img.width(), img.height(), img.bands()), (10, 5, 3));
    }
}
