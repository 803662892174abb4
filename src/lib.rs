//! # specgraph: node-graph engine for multispectral camera data
//!
//! Processing pipelines are built as directed acyclic graphs of typed nodes.
//! Each node is an instance of a registered node type; outputs feed inputs
//! over typed connections, and changing any node re-runs exactly the part of
//! the graph downstream of it.
//!
//! ## Architecture
//!
//! - **Graph core** (`graph`): type registry, nodes, connection typing,
//!   incremental and bulk execution, serialization, macros and undo
//! - **Configuration** (`config`): engine/logging settings, recent
//!   documents, document files on disk
//! - **Notifications**: `GraphEvent`s over a crossbeam channel, drained by
//!   whatever shell drives the engine
//!
//! ## Configuration
//!
//! Application data lives under `dev.specgraph` in the platform data
//! directory:
//!
//! - **Linux**: `~/.local/share/dev.specgraph/`
//! - **macOS**: `~/Library/Application Support/dev.specgraph/`
//! - **Windows**: `%APPDATA%\dev.specgraph\`
//!
//! ## Example
//!
//! ```
//! use specgraph::graph::{NodeState, Workspace};
//!
//! let mut ws = Workspace::new();
//! let gen = ws.create("gen").unwrap();
//! let mean = ws.create("mean").unwrap();
//! ws.graph_mut().connect(mean, 0, gen, 0);
//!
//! let node = ws.graph().get(mean).unwrap();
//! assert_eq!(node.state(), NodeState::Clean);
//! assert!(node.output(0).and_then(|d| d.as_number()).is_some());
//! ```

pub mod config;
pub mod error;
pub mod graph;

// Re-export commonly used types
pub use config::{AppConfig, AppState, DocumentFile};
pub use error::{Result, ResultExt, SpecGraphError};
pub use graph::{
    ConnType, ConnectOutcome, Datum, Graph, GraphError, GraphEvent, NodeId, NodeState,
    SavedDocument, TypeRegistry, Workspace,
};
