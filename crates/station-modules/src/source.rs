//! Module source providers.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::errors::ModuleError;

/// Matches `require("name")` / `require('name')` calls in module source.
static REQUIRE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"require\(\s*["']([^"']+)["']\s*\)"#).unwrap());

/// Dependency names referenced by `source`, in order of first appearance.
#[must_use]
pub fn extract_dependencies(source: &str) -> Vec<String> {
    let mut deps: Vec<String> = Vec::new();
    for capture in REQUIRE_CALL.captures_iter(source) {
        let name = capture[1].to_string();
        if !deps.contains(&name) {
            deps.push(name);
        }
    }
    deps
}

/// Where the registry gets module bodies from.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Load the raw source text for `name`, or `NotFound`.
    async fn load(&self, name: &str) -> Result<String, ModuleError>;
}

/// Filesystem provider reading `<dir>/<name>.<ext>`.
pub struct FsModuleSource {
    dir: PathBuf,
    extension: String,
}

impl FsModuleSource {
    /// Serve modules from `dir` with the default `.js` extension.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            extension: "js".to_string(),
        }
    }

    /// Override the file extension modules are stored under.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }
}

#[async_trait]
impl ModuleSource for FsModuleSource {
    async fn load(&self, name: &str) -> Result<String, ModuleError> {
        // Names address files under the module dir only.
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(ModuleError::InvalidName {
                name: name.to_string(),
            });
        }
        let path = self.dir.join(format!("{name}.{}", self.extension));
        match tokio::fs::read_to_string(&path).await {
            Ok(source) => {
                debug!(module = name, path = %path.display(), "module source loaded");
                Ok(source)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ModuleError::NotFound {
                name: name.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn extracts_dependencies_in_order_without_duplicates() {
        let source = r#"
            const a = require("alpha");
            const b = require('beta');
            const again = require("alpha");
        "#;
        assert_eq!(extract_dependencies(source), vec!["alpha", "beta"]);
    }

    #[test]
    fn source_without_requires_has_no_dependencies() {
        assert!(extract_dependencies("const x = 1;").is_empty());
    }

    #[tokio::test]
    async fn loads_module_file_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("greeter.js"), "exports.hi = 1;").unwrap();

        let source = FsModuleSource::new(dir.path());
        assert_eq!(source.load("greeter").await.unwrap(), "exports.hi = 1;");
    }

    #[tokio::test]
    async fn missing_module_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsModuleSource::new(dir.path());
        assert_matches!(
            source.load("ghost").await.unwrap_err(),
            ModuleError::NotFound { .. }
        );
    }

    #[tokio::test]
    async fn traversal_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = FsModuleSource::new(dir.path());
        assert_matches!(
            source.load("../secrets").await.unwrap_err(),
            ModuleError::InvalidName { .. }
        );
    }

    #[tokio::test]
    async fn extension_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{\"a\":1}").unwrap();

        let source = FsModuleSource::new(dir.path()).with_extension("json");
        assert_eq!(source.load("config").await.unwrap(), "{\"a\":1}");
    }
}
