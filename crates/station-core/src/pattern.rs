//! Event names and the wildcard pattern enumeration.
//!
//! A subscription pattern is one of four shapes: an exact event name,
//! `entity:*`, `*:action`, or `*:*`. For any concrete `entity:action`
//! event exactly those four strings are candidates for dispatch, evaluated
//! in that order. This is an explicit enumeration, not a glob engine;
//! nothing broader was ever exercised by the protocol.

/// The universal pattern that matches every event.
pub const MATCH_ALL: &str = "*:*";

/// An event name split on the `entity:action` convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EventName<'a> {
    /// Part before the first `:`, or the whole name when there is none.
    pub entity: &'a str,
    /// Part after the first `:`, if any.
    pub action: Option<&'a str>,
}

impl<'a> EventName<'a> {
    /// Split an event name on its first `:`.
    #[must_use]
    pub fn parse(event: &'a str) -> Self {
        match event.split_once(':') {
            Some((entity, action)) => Self {
                entity,
                action: Some(action),
            },
            None => Self {
                entity: event,
                action: None,
            },
        }
    }
}

/// The ordered pattern candidates for a concrete event.
///
/// `e:a` yields `[e:a, e:*, *:a, *:*]`. An event with no `:` has no
/// entity/action derivation, so only the exact name and `*:*` apply.
#[must_use]
pub fn candidates(event: &str) -> Vec<String> {
    match EventName::parse(event) {
        EventName {
            entity,
            action: Some(action),
        } => vec![
            event.to_string(),
            format!("{entity}:*"),
            format!("*:{action}"),
            MATCH_ALL.to_string(),
        ],
        EventName { .. } => vec![event.to_string(), MATCH_ALL.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_entity_action() {
        let name = EventName::parse("post:fetch");
        assert_eq!(name.entity, "post");
        assert_eq!(name.action, Some("fetch"));
    }

    #[test]
    fn parse_bare_event() {
        let name = EventName::parse("logout");
        assert_eq!(name.entity, "logout");
        assert_eq!(name.action, None);
    }

    #[test]
    fn parse_splits_on_first_colon() {
        let name = EventName::parse("a:b:c");
        assert_eq!(name.entity, "a");
        assert_eq!(name.action, Some("b:c"));
    }

    #[test]
    fn candidates_for_entity_action() {
        assert_eq!(
            candidates("post:create"),
            vec!["post:create", "post:*", "*:create", "*:*"]
        );
    }

    #[test]
    fn candidates_for_bare_event() {
        assert_eq!(candidates("logout"), vec!["logout", "*:*"]);
    }

    #[test]
    fn candidate_order_is_fixed() {
        let c = candidates("task:update");
        assert_eq!(c[0], "task:update");
        assert_eq!(c[3], MATCH_ALL);
    }
}
