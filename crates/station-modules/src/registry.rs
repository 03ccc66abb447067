//! Server-side module cache and require answering.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use station_core::protocol::{ModulePayload, RequirePayload};

use crate::errors::ModuleError;
use crate::hash::content_hash;
use crate::source::{ModuleSource, extract_dependencies};

/// A loaded module: body, content hash, and the dependency names its
/// source declares via `require(...)` calls.
#[derive(Debug, Clone)]
pub struct ModuleBlob {
    /// Module name.
    pub name: String,
    /// Raw source text.
    pub content: String,
    /// SHA-256 of `content`, lowercase hex.
    pub hash: String,
    /// Declared dependency names, in first-appearance order.
    pub dependencies: Vec<String>,
}

/// Cache of loaded modules, answering `require` requests by hash.
pub struct ModuleRegistry {
    source: Arc<dyn ModuleSource>,
    cache: RwLock<HashMap<String, Arc<ModuleBlob>>>,
}

impl ModuleRegistry {
    /// Create a registry backed by `source`.
    pub fn new(source: Arc<dyn ModuleSource>) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Answer one `require` request.
    ///
    /// A cache miss triggers exactly one source load attempt; a failed
    /// load is returned to the requester and NOT remembered, so a module
    /// added to the source later becomes loadable without a restart.
    pub async fn handle_require(
        &self,
        request: &RequirePayload,
    ) -> Result<ModulePayload, ModuleError> {
        let blob = self.get_or_load(&request.module_name).await?;

        if request.hash.as_deref() == Some(blob.hash.as_str()) {
            counter!("station_modules_up_to_date_total").increment(1);
            debug!(module = %blob.name, "client module up to date");
            return Ok(ModulePayload::up_to_date(&blob.name));
        }

        counter!("station_modules_served_total").increment(1);
        debug!(module = %blob.name, hash = %blob.hash, "serving module content");
        Ok(ModulePayload::full(
            &blob.name,
            &blob.content,
            &blob.hash,
            blob.dependencies.clone(),
        ))
    }

    /// Fetch from cache, loading from the source on a miss.
    pub async fn get_or_load(&self, name: &str) -> Result<Arc<ModuleBlob>, ModuleError> {
        if let Some(blob) = self.cache.read().get(name) {
            return Ok(blob.clone());
        }

        let content = match self.source.load(name).await {
            Ok(content) => content,
            Err(err) => {
                counter!("station_module_load_failures_total").increment(1);
                warn!(module = name, error = %err, "module load failed");
                return Err(err);
            }
        };
        let blob = Arc::new(ModuleBlob {
            name: name.to_string(),
            hash: content_hash(&content),
            dependencies: extract_dependencies(&content),
            content,
        });
        info!(
            module = name,
            hash = %blob.hash,
            dependencies = blob.dependencies.len(),
            "module loaded into registry"
        );
        // A racing load may have beaten us; last write wins, both blobs
        // carry the same content.
        let _ = self
            .cache
            .write()
            .insert(name.to_string(), blob.clone());
        Ok(blob)
    }

    /// Number of cached modules.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }
}
