//! Builtin node types.
//!
//! Pixel logic here is deliberately small: enough to exercise typed data
//! flow, polymorphic outputs and failure paths through the engine.

pub mod binop;
pub mod boundary;
pub mod constant;
pub mod crop;
pub mod gen;
pub mod grey;
pub mod mean;
pub mod merge;
pub mod sink;
pub mod stretch;
pub mod unknown;

use crate::graph::conn_type::ConnType;
use crate::graph::node_type::NodeType;

pub use binop::BinOp;
pub use boundary::{MacroInLogic, MacroOutLogic, MACRO_IN, MACRO_OUT};

/// Every builtin type, in registration order.
pub fn builtin_types() -> Vec<NodeType> {
    vec![
        constant::node_type(),
        gen::node_type(),
        crop::node_type(),
        stretch::node_type(),
        grey::node_type(),
        merge::node_type(),
        binop::node_type(),
        mean::node_type(),
        sink::node_type(),
        boundary::macro_in_type(),
        boundary::macro_out_type(),
    ]
}

/// Output types for nodes whose single output mirrors input 0.
pub(crate) fn mirror_first_input(input_types: &[Option<ConnType>]) -> Vec<Option<ConnType>> {
    vec![input_types.first().copied().flatten()]
}
