//! Binary arithmetic over numbers and images.
//!
//! Number op number gives a number. If either side is an image the result
//! is an image of that side's type; image op image works pixelwise and
//! requires identical dimensions.

use crate::graph::conn_type::ConnType;
use crate::graph::datum::{Datum, ImageCube};
use crate::graph::error::{ComputeError, GraphResult};
use crate::graph::node::{ComputeContext, Node};
use crate::graph::node_type::{NodeLogic, NodeType};
use serde_json::Value;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, ComputeError> {
        match self {
            BinOp::Add => Ok(a + b),
            BinOp::Sub => Ok(a - b),
            BinOp::Mul => Ok(a * b),
            BinOp::Div if b == 0.0 => Err(ComputeError::new("DIV0", "division by zero")),
            BinOp::Div => Ok(a / b),
        }
    }
}

impl FromStr for BinOp {
    type Err = ComputeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "+" => Ok(BinOp::Add),
            "-" => Ok(BinOp::Sub),
            "*" => Ok(BinOp::Mul),
            "/" => Ok(BinOp::Div),
            other => Err(ComputeError::data(format!("unknown operator '{}'", other))),
        }
    }
}

enum Operand<'a> {
    Number(f64),
    Image(&'a ImageCube),
}

fn operand<'a>(d: &'a Datum, index: usize) -> Result<Operand<'a>, ComputeError> {
    if let Some(n) = d.as_number() {
        Ok(Operand::Number(n))
    } else if let Some(img) = d.as_image() {
        Ok(Operand::Image(img))
    } else {
        Err(ComputeError::type_mismatch(format!(
            "input {} must be a number or an image, got {}",
            index,
            d.conn_type()
        )))
    }
}

fn map_image(img: &ImageCube, f: impl Fn(f64) -> Result<f64, ComputeError>) -> Result<ImageCube, ComputeError> {
    let mut data = Vec::with_capacity(img.samples().len());
    for &v in img.samples() {
        data.push(f(v as f64)? as f32);
    }
    ImageCube::from_raw(img.width(), img.height(), img.bands(), data)
        .ok_or_else(|| ComputeError::data("image size changed during arithmetic"))
}

pub struct BinOpLogic;

impl NodeLogic for BinOpLogic {
    fn init(&self, node: &mut Node) -> GraphResult<()> {
        node.param_default("op", Value::from("+"));
        Ok(())
    }

    fn compute(&self, ctx: &mut ComputeContext<'_>) -> Result<(), ComputeError> {
        let (Some(a), Some(b)) = (ctx.input(0), ctx.input(1)) else {
            return Ok(());
        };
        let op: BinOp = ctx.node.param_str("op").unwrap_or("+").parse()?;
        let sources = ctx.input_sources();

        let result = match (operand(a, 0)?, operand(b, 1)?) {
            (Operand::Number(x), Operand::Number(y)) => Datum::number(op.apply(x, y)?, sources),
            (Operand::Image(img), Operand::Number(y)) => {
                Datum::image(map_image(img, |x| op.apply(x, y))?, sources)
            }
            (Operand::Number(x), Operand::Image(img)) => {
                Datum::image(map_image(img, |y| op.apply(x, y))?, sources)
            }
            (Operand::Image(p), Operand::Image(q)) => {
                if (p.width(), p.height(), p.bands()) != (q.width(), q.height(), q.bands()) {
                    return Err(ComputeError::data(format!(
                        "image sizes differ: {}x{}x{} vs {}x{}x{}",
                        p.width(),
                        p.height(),
                        p.bands(),
                        q.width(),
                        q.height(),
                        q.bands()
                    )));
                }
                let mut data = Vec::with_capacity(p.samples().len());
                for (&x, &y) in p.samples().iter().zip(q.samples()) {
                    data.push(op.apply(x as f64, y as f64)? as f32);
                }
                let img = ImageCube::from_raw(p.width(), p.height(), p.bands(), data)
                    .ok_or_else(|| ComputeError::data("image size changed during arithmetic"))?;
                Datum::image(img, sources)
            }
        };
        ctx.set_output(0, result);
        Ok(())
    }

    fn generate_output_types(
        &self,
        _node: &Node,
        input_types: &[Option<ConnType>],
    ) -> Vec<Option<ConnType>> {
        let connected: Vec<ConnType> = input_types.iter().flatten().copied().collect();
        let resolved = if let Some(img) = connected.iter().find(|t| t.is_image()) {
            Some(*img)
        } else if !connected.is_empty() && connected.iter().all(|&t| t == ConnType::Number) {
            Some(ConnType::Number)
        } else {
            None
        };
        vec![resolved]
    }
}

pub fn node_type() -> NodeType {
    NodeType::builder("binop", "maths", BinOpLogic)
        .description("Adds, subtracts, multiplies or divides two values.")
        .input("a", ConnType::Any, "left operand")
        .input("b", ConnType::Any, "right operand")
        .output("out", ConnType::Variant, "result")
        .autoserialise(&["op"])
        .build()
}
