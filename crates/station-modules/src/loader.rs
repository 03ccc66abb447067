//! Client-side module loading with hash sync and require coalescing.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use station_core::protocol::{ErrorPayload, ModulePayload, RequirePayload};

use crate::errors::ModuleError;
use crate::runtime::{Exports, ModuleContext, ModuleRuntime};

/// Where the loader sends its outbound `require` envelopes.
#[async_trait]
pub trait RequireSink: Send + Sync {
    /// Queue one request toward the server.
    async fn send_require(&self, request: RequirePayload) -> Result<(), ModuleError>;
}

type Waiter = oneshot::Sender<Result<Exports, ModuleError>>;

struct CachedModule {
    exports: Exports,
    hash: String,
}

#[derive(Default)]
struct Inner {
    cache: HashMap<String, CachedModule>,
    pending: HashMap<String, Vec<Waiter>>,
}

/// Client-side loader: one in-flight request per module name, shared
/// exports for every waiter, execution through a [`ModuleRuntime`].
///
/// `handle_module` may await further requires (for dependencies), so the
/// transport's read loop must dispatch module answers on their own tasks
/// rather than awaiting them inline.
pub struct ModuleLoader {
    runtime: Arc<dyn ModuleRuntime>,
    sink: Arc<dyn RequireSink>,
    inner: Mutex<Inner>,
}

impl ModuleLoader {
    /// Create a loader executing through `runtime` and requesting
    /// through `sink`.
    pub fn new(runtime: Arc<dyn ModuleRuntime>, sink: Arc<dyn RequireSink>) -> Self {
        Self {
            runtime,
            sink,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Resolve a module's exports, requesting it from the server when
    /// needed.
    ///
    /// Concurrent calls for the same name share one outbound request and
    /// one resolution. The cached hash rides along so an unchanged module
    /// comes back as a contentless `upToDate` answer.
    pub async fn require(&self, name: &str) -> Result<Exports, ModuleError> {
        let (tx, rx) = oneshot::channel();
        let request = {
            let mut inner = self.inner.lock();
            let cached_hash = inner.cache.get(name).map(|c| c.hash.clone());
            match inner.pending.entry(name.to_string()) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().push(tx);
                    None
                }
                Entry::Vacant(entry) => {
                    let _ = entry.insert(vec![tx]);
                    Some(RequirePayload {
                        module_name: name.to_string(),
                        hash: cached_hash,
                    })
                }
            }
        };

        if let Some(request) = request {
            debug!(module = name, "requesting module");
            if let Err(err) = self.sink.send_require(request).await {
                self.reject(name, &err);
                return Err(err);
            }
        }

        rx.await.map_err(|_| ModuleError::ChannelClosed)?
    }

    /// Handle a `module` answer from the server.
    pub async fn handle_module(&self, payload: ModulePayload) {
        if payload.up_to_date {
            let resolution = {
                let inner = self.inner.lock();
                inner
                    .cache
                    .get(&payload.name)
                    .map(|cached| cached.exports.clone())
            };
            match resolution {
                Some(exports) => {
                    debug!(module = %payload.name, "module up to date, reusing cached exports");
                    self.resolve(&payload.name, exports);
                }
                None => {
                    warn!(module = %payload.name, "up-to-date answer for a module we never cached");
                    self.reject(
                        &payload.name,
                        &ModuleError::StaleUpToDate {
                            name: payload.name.clone(),
                        },
                    );
                }
            }
            return;
        }

        let (Some(content), Some(hash)) = (payload.content.as_deref(), payload.hash.clone())
        else {
            self.reject(
                &payload.name,
                &ModuleError::Execution {
                    name: payload.name.clone(),
                    message: "module answer carried neither content nor upToDate".into(),
                },
            );
            return;
        };

        // Dependencies resolve through the same hash-sync path before the
        // body runs, so the runtime sees only synchronous lookups.
        let mut dependencies = HashMap::new();
        for dep in payload.dependencies.as_deref().unwrap_or_default() {
            match self.require(dep).await {
                Ok(exports) => {
                    let _ = dependencies.insert(dep.clone(), exports);
                }
                Err(err) => {
                    warn!(module = %payload.name, dependency = %dep, error = %err, "dependency failed");
                    self.reject(&payload.name, &err);
                    return;
                }
            }
        }

        let ctx = ModuleContext::new(payload.name.clone(), dependencies);
        match self.runtime.execute(content, &ctx) {
            Ok(value) => {
                let exports: Exports = Arc::new(value);
                {
                    let mut inner = self.inner.lock();
                    let _ = inner.cache.insert(
                        payload.name.clone(),
                        CachedModule {
                            exports: exports.clone(),
                            hash,
                        },
                    );
                }
                debug!(module = %payload.name, "module executed and cached");
                self.resolve(&payload.name, exports);
            }
            Err(err) => {
                warn!(module = %payload.name, error = %err, "module execution failed");
                self.reject(&payload.name, &err);
            }
        }
    }

    /// Handle a module-scoped `error` answer: every waiter for that name
    /// fails, the cache keeps whatever it already had.
    pub fn handle_error(&self, payload: &ErrorPayload) {
        let Some(name) = payload.module_name.as_deref() else {
            return;
        };
        warn!(module = name, message = %payload.message, "server reported module error");
        self.reject(
            name,
            &ModuleError::NotFound {
                name: name.to_string(),
            },
        );
    }

    /// Reject every outstanding waiter. Called when the transport drops.
    pub fn fail_all_pending(&self) {
        let pending = std::mem::take(&mut self.inner.lock().pending);
        for (name, waiters) in pending {
            debug!(module = %name, waiters = waiters.len(), "rejecting waiters on disconnect");
            for waiter in waiters {
                let _ = waiter.send(Err(ModuleError::ChannelClosed));
            }
        }
    }

    fn resolve(&self, name: &str, exports: Exports) {
        let waiters = self.inner.lock().pending.remove(name).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(Ok(exports.clone()));
        }
    }

    fn reject(&self, name: &str, err: &ModuleError) {
        let waiters = self.inner.lock().pending.remove(name).unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(Err(err.clone()));
        }
    }
}
