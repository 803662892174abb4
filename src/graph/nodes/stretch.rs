//! Linear contrast stretch to [0, 1].

use crate::graph::conn_type::ConnType;
use crate::graph::datum::Datum;
use crate::graph::error::ComputeError;
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeLogic, NodeType};
use crate::graph::nodes::mirror_first_input;

pub struct StretchLogic;

impl NodeLogic for StretchLogic {
    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let Some(image) = ctx.input_image(0)? else {
            return Ok(());
        };
        let Some((lo, hi)) = image.min_max() else {
            return Err(ComputeError::data("empty image"));
        };
        let range = hi - lo;
        // A flat image stays flat rather than dividing by zero.
        let stretched = if range > f32::EPSILON {
            image.map(|v| (v - lo) / range)
        } else {
            image.map(|_| 0.0)
        };
        let sources = ctx.input_sources();
        ctx.set_output(0, Datum::image(stretched, sources));
        Ok(())
    }

    fn generate_output_types(
        &self,
        _node: &Node,
        input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        mirror_first_input(input_types)
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("stretch", "processing", StretchLogic)
        .description("Linear min/max contrast stretch.")
        .input("in", ConnType::Img, "image to stretch")
        .output("out", ConnType::Variant, "stretched image")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::datum::{ImageCube, SourceSet};
    use crate::graph::id::NodeId;
    use crate::graph::registry::builtin_registry;

    #[test]
    fn test_stretch_copies_rather_than_mutates() {
        let t = builtin_registry().resolve("stretch").unwrap();
        let mut node = Node::new(NodeId(0), t, "stretch0".into());
        let src = ImageCube::from_raw(2, 1, 1, vec![2.0, 4.0]).unwrap();
        let input = Datum::image(src, SourceSet::single("a"));
        let inputs = vec![Some(input.clone())];
        let mut ctx = ComputeContext::new(&mut node, &inputs);
        StretchLogic.compute(&mut ctx).unwrap();

        let out = node.output(0).unwrap();
        assert!(!out.shares_image_with(&input));
        assert_eq!(out.as_image().unwrap().samples(), &[0.0, 1.0]);
        assert_eq!(input.as_image().unwrap().samples(), &[2.0, 4.0]);
        assert_eq!(out.sources().caption(), "a");
    }
}
