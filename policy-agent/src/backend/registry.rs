//! Backend registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{Backend, StaticBackend};
use crate::error::{Error, Result};

/// Builds a fresh backend instance for one policy.
pub type BackendConstructor = Arc<dyn Fn() -> Result<Arc<dyn Backend>> + Send + Sync>;

/// Map from backend identifier to constructor.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    constructors: HashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the backends shipped with the agent.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(StaticBackend::IDENTIFIER, || {
            Ok(Arc::new(StaticBackend::new()) as Arc<dyn Backend>)
        });
        registry
    }

    /// Register a constructor, replacing any previous one for `identifier`.
    pub fn register<F>(&mut self, identifier: impl Into<String>, constructor: F)
    where
        F: Fn() -> Result<Arc<dyn Backend>> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        debug!(backend = %identifier, "backend registered");
        self.constructors.insert(identifier, Arc::new(constructor));
    }

    /// Build a backend. Unknown identifiers and failing constructors are
    /// reported as [`Error::Resolution`].
    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn Backend>> {
        let constructor = self.constructors.get(identifier).ok_or_else(|| {
            Error::resolution(identifier, "no backend registered under this identifier")
        })?;
        constructor().map_err(|e| match e {
            err @ Error::Resolution { .. } => err,
            other => Error::resolution(identifier, other.to_string()),
        })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.constructors.contains_key(identifier)
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.constructors.keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("identifiers", &self.identifiers())
            .finish()
    }
}
