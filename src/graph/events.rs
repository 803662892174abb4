//! Notifications from the engine to whoever is driving it.
//!
//! The engine never calls into UI code. Instead it pushes `GraphEvent`s
//! into an optional channel; a shell drains the receiver at its leisure.

use crate::graph::conn_type::ConnType;
use crate::graph::error::ComputeError;
use crate::graph::id::{Link, NodeId};
use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A node computed successfully.
    NodeChanged { node: NodeId, name: String },
    NodeErrored {
        node: NodeId,
        name: String,
        error: ComputeError,
    },
    OutputTypeChanged {
        node: NodeId,
        output: usize,
        conn_type: ConnType,
    },
    /// A loaded node's stored checksum disagreed with its registered type.
    VersionDrift {
        node: String,
        type_name: String,
        saved: String,
        current: String,
    },
    Connected { src: Link, dst: NodeId, input: usize },
    Disconnected { dst: NodeId, input: usize },
}

pub type EventSender = Sender<GraphEvent>;
pub type EventReceiver = Receiver<GraphEvent>;

/// Unbounded channel for graph events.
pub fn event_channel() -> (EventSender, EventReceiver) {
    crossbeam_channel::unbounded()
}
