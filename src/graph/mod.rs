//! Dataflow graph engine.
//!
//! Nodes are instances of registered [`NodeType`]s connected output-to-input
//! into a DAG. Changing a node re-derives connection types downstream and
//! re-executes everything it feeds; a whole graph can also be run in one
//! breadth-first sweep after loading.
//!
//! # Architecture
//!
//! ```text
//! TypeRegistry ──► Graph ──► perform / perform_all ──► GraphEvent channel
//!       ▲            │
//!       │            └──► SavedGraph (JSON, name-addressed)
//! MacroLibrary ◄── prototype graphs
//! ```

pub mod conn_type;
pub mod datum;
pub mod document;
pub mod error;
pub mod events;
#[allow(clippy::module_inception)]
pub mod graph;
pub mod id;
pub mod macros;
pub mod node;
pub mod node_type;
pub mod nodes;
pub mod perform;
pub mod registry;
pub mod undo;
pub mod workspace;

pub use conn_type::{ConnType, Connector, Direction};
pub use datum::{Datum, ImageCube, Payload, Rect, SourceSet};
pub use document::{LoadReport, LoadWarning, SavedDocument, SavedGraph, SavedNode, FORMAT_VERSION};
pub use error::{ComputeError, GraphError, GraphResult};
pub use events::{event_channel, EventReceiver, EventSender, GraphEvent};
pub use graph::{ConnectOutcome, Graph, NodeSummary, RejectReason};
pub use id::{Link, NodeId};
pub use macros::{build_macro_type, Aliases, MacroLibrary, MacroPrototype};
pub use node::{ComputeContext, Node, NodeState};
pub use node_type::{NodeKind, NodeLogic, NodeType, NodeTypeBuilder};
pub use perform::PerformReport;
pub use registry::{builtin_registry, register_all_types, TypeRegistry};
pub use undo::UndoStack;
pub use workspace::{EngineConfig, Workspace};
