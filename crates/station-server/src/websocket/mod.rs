//! WebSocket transport: connection lifecycle, dispatch, and broadcasting.
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `connection` | Per-client handle: id, outbound queue, principal |
//! | `handler` | Envelope parsing and dispatch to registry/store/bus |
//! | `broadcast` | Fan-out manager: registry, self-exclusion, slow-client eviction |
//!
//! ## Data flow
//!
//! Read loop → `handler::dispatch` (inline, per-connection order) →
//! state store / module registry → `broadcast` → other clients' writer
//! tasks.

pub mod broadcast;
pub mod connection;
pub mod handler;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use metrics::counter;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use station_core::ids::ClientId;
use station_core::protocol;

use crate::hub::StationHub;
use connection::ClientConnection;

/// Frames queued per connection before sends start dropping.
const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Build the hub's HTTP router: a single `/ws` upgrade endpoint.
pub fn router(hub: Arc<StationHub>) -> Router {
    Router::new().route("/ws", get(upgrade)).with_state(hub)
}

/// Accept connections on `listener` until the process is stopped.
pub async fn serve(listener: tokio::net::TcpListener, hub: Arc<StationHub>) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "hub listening");
    axum::serve(listener, router(hub)).await
}

async fn upgrade(State(hub): State<Arc<StationHub>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(hub, socket))
}

/// Run one connection to completion.
async fn handle_socket(hub: Arc<StationHub>, socket: WebSocket) {
    let id = ClientId::generate();
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(OUTBOUND_QUEUE_DEPTH);
    let conn = Arc::new(ClientConnection::new(id.clone(), tx));
    hub.broadcasts().add(conn.clone());
    counter!("station_connections_total").increment(1);
    info!(conn_id = %id, "client connected");

    let (mut sink, mut stream) = socket.split();

    // Writer: drain the connection queue into the socket. Ends when the
    // registry drops its sender or the socket goes away.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(Message::Text(frame.as_str().into())).await.is_err() {
                break;
            }
        }
    });

    // The hub speaks first.
    hub.broadcasts()
        .send_to(&id, protocol::INIT, &json!({ "clientId": &id }));

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handler::dispatch(&hub, &conn, text.as_str()).await,
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(conn_id = %id, error = %err, "socket error, closing");
                break;
            }
        }
    }

    hub.broadcasts().remove(&id);
    drop(conn);
    writer.abort();
    info!(conn_id = %id, "client disconnected");
}
