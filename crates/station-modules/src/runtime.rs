//! Execution boundary for module bodies.
//!
//! The hub ships module text and hashes; what the text MEANS is up to a
//! [`ModuleRuntime`]. The loader hands the runtime a resolved dependency
//! context and stores whatever exports come back. The built-in
//! [`JsonRuntime`] treats module bodies as JSON documents, which is enough
//! for configuration and data modules; an embedding can plug in a script
//! engine behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::errors::ModuleError;

/// Exports produced by executing a module body.
pub type Exports = Arc<Value>;

/// Dependency resolver handed to a runtime during execution.
///
/// Every name a module's source declares is resolved BEFORE its body
/// runs, so lookups here are synchronous and cannot block.
pub struct ModuleContext {
    module: String,
    dependencies: HashMap<String, Exports>,
}

impl ModuleContext {
    /// Build a context for `module` over its pre-resolved dependencies.
    #[must_use]
    pub fn new(module: impl Into<String>, dependencies: HashMap<String, Exports>) -> Self {
        Self {
            module: module.into(),
            dependencies,
        }
    }

    /// Exports of a declared dependency.
    pub fn require(&self, name: &str) -> Result<Exports, ModuleError> {
        self.dependencies
            .get(name)
            .cloned()
            .ok_or_else(|| ModuleError::MissingDependency {
                name: self.module.clone(),
                dependency: name.to_string(),
            })
    }

    /// Name of the module being executed.
    #[must_use]
    pub fn module_name(&self) -> &str {
        &self.module
    }
}

/// Turns module source text into exports.
pub trait ModuleRuntime: Send + Sync {
    /// Execute `content` for the module named in `ctx`.
    fn execute(&self, content: &str, ctx: &ModuleContext) -> Result<Value, ModuleError>;
}

/// Built-in runtime: module bodies are JSON documents, exports are the
/// parsed value. Dependencies are ignored; data modules have no code.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonRuntime;

impl ModuleRuntime for JsonRuntime {
    fn execute(&self, content: &str, ctx: &ModuleContext) -> Result<Value, ModuleError> {
        serde_json::from_str(content).map_err(|err| ModuleError::Execution {
            name: ctx.module_name().to_string(),
            message: err.to_string(),
        })
    }
}
