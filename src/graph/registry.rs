//! The node type registry.
//!
//! Builtin types are registered once, lazily, by [`register_all_types`].
//! A [`TypeRegistry`] is a plain value: cloning it is cheap (the types are
//! `Arc`-shared), which is how macro libraries layer their generated types
//! on top of the builtins without mutating the process-wide table.

use crate::graph::error::{GraphError, GraphResult};
use crate::graph::node_type::NodeType;
use crate::graph::nodes;
use ahash::AHashMap;
use std::sync::{Arc, OnceLock};

#[derive(Clone, Default)]
pub struct TypeRegistry {
    types: AHashMap<String, Arc<NodeType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a type. Fails if the name is taken.
    pub fn register(&mut self, node_type: NodeType) -> GraphResult<Arc<NodeType>> {
        if self.types.contains_key(&node_type.name) {
            return Err(GraphError::DuplicateType(node_type.name));
        }
        let node_type = Arc::new(node_type);
        self.types
            .insert(node_type.name.clone(), Arc::clone(&node_type));
        Ok(node_type)
    }

    /// Add or overwrite a type.
    pub fn replace(&mut self, node_type: NodeType) -> Arc<NodeType> {
        let node_type = Arc::new(node_type);
        self.types
            .insert(node_type.name.clone(), Arc::clone(&node_type));
        node_type
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<NodeType>> {
        self.types.remove(name)
    }

    pub fn lookup(&self, name: &str) -> Option<&Arc<NodeType>> {
        self.types.get(name)
    }

    pub fn resolve(&self, name: &str) -> GraphResult<Arc<NodeType>> {
        self.lookup(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.names())
            .finish()
    }
}

/// Register every builtin node type into `registry`.
pub fn register_all_types(registry: &mut TypeRegistry) -> GraphResult<()> {
    for node_type in nodes::builtin_types() {
        registry.register(node_type)?;
    }
    Ok(())
}

static BUILTINS: OnceLock<TypeRegistry> = OnceLock::new();

/// The process-wide registry of builtin types.
///
/// # Panics
///
/// If two builtin types share a name. That is a build defect, not a runtime
/// condition.
pub fn builtin_registry() -> &'static TypeRegistry {
    BUILTINS.get_or_init(|| {
        let mut registry = TypeRegistry::new();
        if let Err(e) = register_all_types(&mut registry) {
            panic!("builtin type registration failed: {}", e);
        }
        tracing::debug!("Registered {} builtin node types", registry.len());
        registry
    })
}
