//! WebSocket transport wiring.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use station_modules::ModuleRuntime;

use crate::errors::ClientError;
use crate::hub::ClientHub;

/// Connect to a hub at `url` (e.g. `ws://localhost:3000/ws`).
///
/// Spawns a writer task draining the hub's outbound channel and a reader
/// task routing inbound frames. The returned handle resolves when the
/// connection closes; outstanding requires are failed at that point.
pub async fn connect(
    url: &str,
    runtime: Arc<dyn ModuleRuntime>,
) -> Result<(Arc<ClientHub>, JoinHandle<()>), ClientError> {
    let (socket, _) = connect_async(url).await?;
    info!(url, "connected to hub");
    let (mut sink, mut stream) = socket.split();
    let (hub, mut outbound) = ClientHub::channel(runtime);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(err) = sink.send(Message::Text(frame.into())).await {
                warn!(error = %err, "outbound send failed, stopping writer");
                break;
            }
        }
    });

    let reader_hub = hub.clone();
    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => reader_hub.handle_frame(text.as_str()),
                Ok(Message::Close(_)) => {
                    debug!("server closed the connection");
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "socket error, closing");
                    break;
                }
            }
        }
        reader_hub.handle_disconnect();
        writer.abort();
    });

    Ok((hub, reader))
}
