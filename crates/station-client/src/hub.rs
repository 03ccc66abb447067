//! The client hub: outbound envelopes, inbound routing, module loading.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use station_bus::{EventBus, Handler, SubscriptionId};
use station_core::envelope::Envelope;
use station_core::ids::ClientId;
use station_core::protocol::{self, InitPayload};
use station_modules::{Exports, ModuleError, ModuleLoader, ModuleRuntime, RequireSink};

use crate::errors::ClientError;

/// Frames queued toward the writer task before `emit` starts failing.
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Client-side hub.
///
/// Owns the local bus and the module loader; the transport layer feeds
/// [`handle_frame`](Self::handle_frame) and drains the frame receiver
/// returned by [`channel`](Self::channel).
pub struct ClientHub {
    bus: Arc<EventBus>,
    loader: Arc<ModuleLoader>,
    outbound: mpsc::Sender<String>,
    client_id: RwLock<Option<ClientId>>,
}

/// Adapts the outbound frame channel to the loader's sink.
struct OutboundSink {
    outbound: mpsc::Sender<String>,
}

#[async_trait]
impl RequireSink for OutboundSink {
    async fn send_require(
        &self,
        request: station_core::protocol::RequirePayload,
    ) -> Result<(), ModuleError> {
        let data = serde_json::to_value(&request).map_err(|err| ModuleError::Execution {
            name: request.module_name.clone(),
            message: err.to_string(),
        })?;
        let frame = Envelope::new(protocol::REQUIRE, data)
            .to_frame()
            .map_err(|err| ModuleError::Execution {
                name: request.module_name.clone(),
                message: err.to_string(),
            })?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ModuleError::ChannelClosed)
    }
}

impl ClientHub {
    /// Build a hub plus the receiver a transport drains for outbound
    /// frames.
    pub fn channel(runtime: Arc<dyn ModuleRuntime>) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        let sink = Arc::new(OutboundSink {
            outbound: tx.clone(),
        });
        let hub = Arc::new(Self {
            bus: Arc::new(EventBus::new()),
            loader: Arc::new(ModuleLoader::new(runtime, sink)),
            outbound: tx,
            client_id: RwLock::new(None),
        });
        (hub, rx)
    }

    /// The id the server issued, once `init` has arrived.
    #[must_use]
    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id.read().clone()
    }

    /// The local event bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Send one envelope to the server.
    pub async fn emit(&self, event: &str, data: Value) -> Result<(), ClientError> {
        let frame = Envelope::new(event, data).to_frame()?;
        self.outbound
            .send(frame)
            .await
            .map_err(|_| ClientError::ConnectionClosed)
    }

    /// Subscribe to a pattern on the local bus.
    pub fn subscribe(&self, pattern: impl Into<String>, handler: Handler) -> SubscriptionId {
        self.bus.subscribe(pattern, handler)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, pattern: &str, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(pattern, id)
    }

    /// Resolve a module's exports through hash sync.
    pub async fn require(&self, name: &str) -> Result<Exports, ModuleError> {
        self.loader.require(name).await
    }

    /// Route one inbound text frame.
    ///
    /// `init` records the issued id, `module` and `error` go to the
    /// loader, everything else publishes on the local bus. Module
    /// answers run on their own task because executing a body may await
    /// further requires.
    pub fn handle_frame(self: &Arc<Self>, raw: &str) {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed frame");
                return;
            }
        };
        debug!(event = %envelope.event, "envelope received");

        match envelope.event.as_str() {
            protocol::INIT => match serde_json::from_value::<InitPayload>(envelope.data) {
                Ok(init) => {
                    debug!(client_id = %init.client_id, "connection initialized");
                    *self.client_id.write() = Some(init.client_id);
                }
                Err(err) => warn!(error = %err, "malformed init payload"),
            },
            protocol::MODULE => match serde_json::from_value(envelope.data) {
                Ok(payload) => {
                    let loader = self.loader.clone();
                    let _task = tokio::spawn(async move {
                        loader.handle_module(payload).await;
                    });
                }
                Err(err) => warn!(error = %err, "malformed module payload"),
            },
            protocol::ERROR => match serde_json::from_value(envelope.data) {
                Ok(payload) => self.loader.handle_error(&payload),
                Err(err) => warn!(error = %err, "malformed error payload"),
            },
            _ => self.bus.publish(&envelope.event, &envelope.data, None),
        }
    }

    /// Tear down after the transport closes: every outstanding require
    /// fails rather than hanging forever.
    pub fn handle_disconnect(&self) {
        self.loader.fail_all_pending();
    }
}
