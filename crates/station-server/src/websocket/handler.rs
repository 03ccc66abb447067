//! Inbound envelope dispatch.
//!
//! One call per text frame, awaited inline by the connection's read loop
//! so a single client's envelopes are handled strictly in order. Three
//! paths: `require` goes to the module registry, `entity:action` goes to
//! the state store (an entity outside a configured allowlist answers the
//! originator with an error envelope instead), and every envelope
//! (including those two) is then published on the server bus for
//! application subscribers.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use station_core::envelope::Envelope;
use station_core::ids::ClientId;
use station_core::pattern::EventName;
use station_core::protocol::{self, ErrorPayload, RequirePayload, update_event};
use station_store::Action;

use crate::hub::StationHub;
use crate::websocket::connection::ClientConnection;

/// Handle one inbound text frame from `conn`.
pub async fn dispatch(hub: &StationHub, conn: &Arc<ClientConnection>, raw: &str) {
    let envelope = match Envelope::parse(raw) {
        Ok(envelope) => envelope,
        Err(err) => {
            counter!("station_malformed_frames_total").increment(1);
            warn!(conn_id = %conn.id, error = %err, "dropping malformed frame");
            return;
        }
    };
    counter!("station_envelopes_in_total").increment(1);
    debug!(conn_id = %conn.id, event = %envelope.event, "envelope received");

    if envelope.event == protocol::REQUIRE {
        handle_require(hub, conn, &envelope.data).await;
    } else if let EventName {
        entity,
        action: Some(action),
    } = EventName::parse(&envelope.event)
    {
        if let Some(action) = Action::parse(action) {
            if hub.is_entity(entity) {
                handle_data(hub, conn, entity, action, envelope.data.clone()).await;
            } else {
                counter!("station_mutation_failures_total").increment(1);
                warn!(conn_id = %conn.id, entity, "data event for unlisted entity");
                reply(
                    hub,
                    &conn.id,
                    protocol::ERROR,
                    &ErrorPayload {
                        module_name: None,
                        message: format!("entity '{entity}' is not served by this hub"),
                    },
                );
            }
        }
    }

    // Application layers see every inbound envelope, reserved ones
    // included, keyed by the four-pattern candidates.
    hub.bus()
        .publish(&envelope.event, &envelope.data, Some(&conn.id));
}

async fn handle_require(hub: &StationHub, conn: &Arc<ClientConnection>, data: &Value) {
    let request: RequirePayload = match serde_json::from_value(data.clone()) {
        Ok(request) => request,
        Err(err) => {
            warn!(conn_id = %conn.id, error = %err, "malformed require payload");
            reply(
                hub,
                &conn.id,
                protocol::ERROR,
                &ErrorPayload {
                    module_name: None,
                    message: format!("malformed require payload: {err}"),
                },
            );
            return;
        }
    };

    match hub.modules().handle_require(&request).await {
        Ok(module) => reply(hub, &conn.id, protocol::MODULE, &module),
        Err(err) => reply(
            hub,
            &conn.id,
            protocol::ERROR,
            &ErrorPayload {
                module_name: Some(request.module_name),
                message: err.to_string(),
            },
        ),
    }
}

async fn handle_data(
    hub: &StationHub,
    conn: &Arc<ClientConnection>,
    entity: &str,
    action: Action,
    data: Value,
) {
    match hub.state().apply(entity, action, data, &conn.id).await {
        Ok(snapshot) => {
            // Mutations fan out inside the state store; a fetch answers
            // only the requester.
            if action == Action::Fetch {
                hub.broadcasts()
                    .send_to(&conn.id, &update_event(entity), &Value::Array(snapshot));
            }
        }
        Err(err) => {
            counter!("station_mutation_failures_total").increment(1);
            warn!(conn_id = %conn.id, entity, ?action, error = %err, "data action failed");
            reply(
                hub,
                &conn.id,
                protocol::ERROR,
                &ErrorPayload {
                    module_name: None,
                    message: err.to_string(),
                },
            );
        }
    }
}

/// Serialize a payload and queue it for a single client.
fn reply(hub: &StationHub, id: &ClientId, event: &str, payload: &impl Serialize) {
    match serde_json::to_value(payload) {
        Ok(data) => hub.broadcasts().send_to(id, event, &data),
        Err(err) => warn!(event, error = %err, "failed to serialize reply payload"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn hub_with_modules(entities: &[&str]) -> (Arc<StationHub>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let hub = StationHub::builder()
            .module_source(Arc::new(station_modules::FsModuleSource::new(dir.path())))
            .entities(entities.iter().map(|e| (*e).to_string()))
            .build();
        (hub, dir)
    }

    fn attach(hub: &StationHub, id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = Arc::new(ClientConnection::new(ClientId::from(id), tx));
        hub.broadcasts().add(conn.clone());
        (conn, rx)
    }

    fn recv_envelope(rx: &mut mpsc::Receiver<Arc<String>>) -> Envelope {
        let frame = rx.try_recv().expect("expected a queued frame");
        Envelope::parse(&frame).unwrap()
    }

    #[tokio::test]
    async fn create_broadcasts_to_others_and_fetch_answers_requester() {
        let (hub, _dir) = hub_with_modules(&["task"]);
        let (c1, mut rx1) = attach(&hub, "c1");
        let (c2, mut rx2) = attach(&hub, "c2");

        dispatch(
            &hub,
            &c1,
            r#"{"event": "task:create", "data": {"title": "buy milk"}}"#,
        )
        .await;

        let update = recv_envelope(&mut rx2);
        assert_eq!(update.event, "task:update");
        assert_eq!(update.data, json!([{"id": 1, "title": "buy milk"}]));
        assert!(rx1.try_recv().is_err(), "originator must not receive");

        dispatch(&hub, &c2, r#"{"event": "task:fetch"}"#).await;
        let fetched = recv_envelope(&mut rx2);
        assert_eq!(fetched.event, "task:update");
        assert_eq!(fetched.data, json!([{"id": 1, "title": "buy milk"}]));
        assert!(rx1.try_recv().is_err(), "fetch answers only the requester");
    }

    #[tokio::test]
    async fn update_replaces_in_place_for_observers() {
        let (hub, _dir) = hub_with_modules(&["task"]);
        let (c1, _rx1) = attach(&hub, "c1");
        let (_c2, mut rx2) = attach(&hub, "c2");

        dispatch(&hub, &c1, r#"{"event": "task:create", "data": {"title": "a"}}"#).await;
        dispatch(
            &hub,
            &c1,
            r#"{"event": "task:update", "data": {"id": 1, "completed": true}}"#,
        )
        .await;

        let _first = recv_envelope(&mut rx2);
        let second = recv_envelope(&mut rx2);
        assert_eq!(
            second.data,
            json!([{"id": 1, "title": "a", "completed": true}]),
            "no duplicate appended"
        );
    }

    #[tokio::test]
    async fn failed_mutation_answers_origin_with_error() {
        let (hub, _dir) = hub_with_modules(&["task"]);
        let (c1, mut rx1) = attach(&hub, "c1");
        let (_c2, mut rx2) = attach(&hub, "c2");

        dispatch(
            &hub,
            &c1,
            r#"{"event": "task:update", "data": {"id": 42, "done": true}}"#,
        )
        .await;

        let error = recv_envelope(&mut rx1);
        assert_eq!(error.event, "error");
        assert!(error.data["message"].as_str().unwrap().contains("task"));
        assert!(rx2.try_recv().is_err(), "failed mutations broadcast nothing");
    }

    #[tokio::test]
    async fn unlisted_entity_answers_origin_with_error() {
        let (hub, _dir) = hub_with_modules(&["task"]);
        let (c1, mut rx1) = attach(&hub, "c1");
        let (_c2, mut rx2) = attach(&hub, "c2");

        dispatch(&hub, &c1, r#"{"event": "ghost:create", "data": {"x": 1}}"#).await;

        let error = recv_envelope(&mut rx1);
        assert_eq!(error.event, "error");
        assert!(error.data["message"].as_str().unwrap().contains("ghost"));
        assert!(rx2.try_recv().is_err());
        assert!(hub.state().snapshot("ghost").is_empty());
    }

    #[tokio::test]
    async fn empty_allowlist_serves_any_entity() {
        let (hub, _dir) = hub_with_modules(&[]);
        let (c1, mut rx1) = attach(&hub, "c1");
        let (_c2, mut rx2) = attach(&hub, "c2");

        dispatch(
            &hub,
            &c1,
            r#"{"event": "task:create", "data": {"title": "buy milk"}}"#,
        )
        .await;

        let update = recv_envelope(&mut rx2);
        assert_eq!(update.event, "task:update");
        assert_eq!(update.data, json!([{"id": 1, "title": "buy milk"}]));
        assert!(rx1.try_recv().is_err(), "originator must not receive");
        assert_eq!(hub.state().snapshot("task").len(), 1);
    }

    #[tokio::test]
    async fn require_round_trips_through_the_registry() {
        let (hub, dir) = hub_with_modules(&[]);
        std::fs::write(dir.path().join("greeter.js"), r#"{"hello": "world"}"#).unwrap();
        let (c1, mut rx1) = attach(&hub, "c1");

        dispatch(
            &hub,
            &c1,
            r#"{"event": "require", "data": {"moduleName": "greeter"}}"#,
        )
        .await;

        let module = recv_envelope(&mut rx1);
        assert_eq!(module.event, "module");
        assert_eq!(module.data["name"], "greeter");
        assert_eq!(module.data["content"], r#"{"hello": "world"}"#);
        let hash = module.data["hash"].as_str().unwrap().to_string();

        // Second require with the hash comes back contentless.
        dispatch(
            &hub,
            &c1,
            &format!(r#"{{"event": "require", "data": {{"moduleName": "greeter", "hash": "{hash}"}}}}"#),
        )
        .await;
        let again = recv_envelope(&mut rx1);
        assert_eq!(again.data["upToDate"], true);
        assert!(again.data.get("content").is_none());
    }

    #[tokio::test]
    async fn missing_module_errors_the_requester_only() {
        let (hub, _dir) = hub_with_modules(&[]);
        let (c1, mut rx1) = attach(&hub, "c1");
        let (_c2, mut rx2) = attach(&hub, "c2");

        dispatch(
            &hub,
            &c1,
            r#"{"event": "require", "data": {"moduleName": "ghost"}}"#,
        )
        .await;

        let error = recv_envelope(&mut rx1);
        assert_eq!(error.event, "error");
        assert_eq!(error.data["moduleName"], "ghost");
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn every_inbound_envelope_reaches_the_bus() {
        let (hub, _dir) = hub_with_modules(&["task"]);
        let (c1, _rx1) = attach(&hub, "c1");

        let seen: Arc<Mutex<Vec<(String, Option<ClientId>)>>> = Arc::default();
        let record = seen.clone();
        let _id = hub.bus().subscribe("*:*", Arc::new(move |_, origin, event| {
            record.lock().push((event.to_string(), origin.cloned()));
            Ok(())
        }));

        dispatch(&hub, &c1, r#"{"event": "task:create", "data": {"title": "a"}}"#).await;
        dispatch(&hub, &c1, r#"{"event": "chat:message", "data": {"text": "hi"}}"#).await;

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, "task:create");
        assert_eq!(seen[1].0, "chat:message");
        assert_eq!(seen[0].1, Some(ClientId::from("c1")));
    }

    #[tokio::test]
    async fn bus_subscriber_can_bind_a_principal() {
        let (hub, _dir) = hub_with_modules(&[]);
        let (c1, _rx1) = attach(&hub, "c1");

        let broadcasts = hub.broadcasts().clone();
        let _id = hub.bus().subscribe("auth:login", Arc::new(move |data, origin, _| {
            let user = data["user"].as_str().unwrap_or_default().to_string();
            if let Some(conn) = origin.and_then(|id| broadcasts.get(id)) {
                conn.bind_principal(&user);
            }
            Ok(())
        }));

        dispatch(&hub, &c1, r#"{"event": "auth:login", "data": {"user": "ada"}}"#).await;
        assert_eq!(c1.principal().as_deref(), Some("ada"));
    }

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (hub, _dir) = hub_with_modules(&["task"]);
        let (c1, mut rx1) = attach(&hub, "c1");

        dispatch(&hub, &c1, "not json at all").await;
        dispatch(&hub, &c1, r#"{"data": 1}"#).await;

        assert!(rx1.try_recv().is_err());
    }
}
