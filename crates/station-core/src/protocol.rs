//! Reserved protocol events and their payload shapes.
//!
//! Four event names are claimed by the hub itself; everything else on the
//! wire belongs to the application:
//!
//! | Event     | Direction       | Payload |
//! |-----------|-----------------|---------|
//! | `init`    | server → client | [`InitPayload`] |
//! | `require` | client → server | [`RequirePayload`] |
//! | `module`  | server → client | [`ModulePayload`] |
//! | `error`   | server → client | [`ErrorPayload`] |

use serde::{Deserialize, Serialize};

use crate::ids::ClientId;

/// Sent to a client immediately after its connection registers.
pub const INIT: &str = "init";
/// A client's request for a module, carrying its cached hash if any.
pub const REQUIRE: &str = "require";
/// The server's answer to `require`: full content or an up-to-date marker.
pub const MODULE: &str = "module";
/// A hub-level fault reported back to the requesting client.
pub const ERROR: &str = "error";

/// The broadcast event name for an entity's snapshot (`<entity>:update`).
#[must_use]
pub fn update_event(entity: &str) -> String {
    format!("{entity}:update")
}

/// Payload of [`INIT`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    /// The id the server issued for this connection.
    pub client_id: ClientId,
}

/// Payload of [`REQUIRE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirePayload {
    /// Module being requested.
    pub module_name: String,
    /// Digest of the copy the client already holds, if any. The server
    /// skips retransmission when it matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Payload of [`MODULE`].
///
/// Either a full module (`content` + `hash` + `dependencies`) or just
/// `{name, upToDate: true}`; content is never retransmitted when the
/// client's hash is current.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModulePayload {
    /// Module name.
    pub name: String,
    /// Source text; absent on the up-to-date path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Content digest; absent on the up-to-date path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Declared dependency names; absent on the up-to-date path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    /// Set when the client's cached copy is already current.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub up_to_date: bool,
}

impl ModulePayload {
    /// A full-content answer.
    #[must_use]
    pub fn full(name: &str, content: &str, hash: &str, dependencies: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            content: Some(content.to_string()),
            hash: Some(hash.to_string()),
            dependencies: Some(dependencies),
            up_to_date: false,
        }
    }

    /// The bandwidth-saving answer: name only, no content.
    #[must_use]
    pub fn up_to_date(name: &str) -> Self {
        Self {
            name: name.to_string(),
            up_to_date: true,
            ..Self::default()
        }
    }
}

/// Payload of [`ERROR`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Module the fault applies to, when the fault is module-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    /// Human-readable description.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn require_payload_wire_shape() {
        let p = RequirePayload {
            module_name: "timeFormatter".into(),
            hash: Some("abc".into()),
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"moduleName": "timeFormatter", "hash": "abc"}));
    }

    #[test]
    fn require_payload_hash_optional() {
        let p: RequirePayload =
            serde_json::from_value(json!({"moduleName": "m"})).unwrap();
        assert_eq!(p.hash, None);
    }

    #[test]
    fn module_payload_up_to_date_omits_content() {
        let p = ModulePayload {
            name: "m".into(),
            up_to_date: true,
            ..ModulePayload::default()
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"name": "m", "upToDate": true}));
    }

    #[test]
    fn module_payload_full_omits_up_to_date() {
        let p = ModulePayload {
            name: "m".into(),
            content: Some("{}".into()),
            hash: Some("h".into()),
            dependencies: Some(vec!["dep".into()]),
            up_to_date: false,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("upToDate").is_none());
        assert_eq!(v["dependencies"][0], "dep");
    }

    #[test]
    fn update_event_name() {
        assert_eq!(update_event("task"), "task:update");
    }
}
