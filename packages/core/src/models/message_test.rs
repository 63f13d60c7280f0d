use chrono::Utc;
use serde_json::json;

use crate::models::time::truncate_to_millis;
use crate::models::{Message, MessageState, Method};

#[test]
fn method_wire_spellings() {
    assert_eq!(Method::Create.as_str(), "create");
    assert_eq!(Method::Read.as_str(), "read");
    assert_eq!(Method::Update.as_str(), "update");
    assert_eq!(Method::Delete.as_str(), "delete");

    for method in [Method::Create, Method::Read, Method::Update, Method::Delete] {
        assert_eq!(Method::parse(method.as_str()), Some(method));
        // serde uses the same canonical spellings
        let encoded = serde_json::to_string(&method).unwrap();
        assert_eq!(encoded, format!("\"{}\"", method.as_str()));
    }
    assert_eq!(Method::parse("CREATE"), None);
    assert_eq!(Method::parse("patch"), None);
}

#[test]
fn state_wire_spellings() {
    for state in [
        MessageState::Pending,
        MessageState::Processing,
        MessageState::Acknowledged,
        MessageState::Failed,
    ] {
        assert_eq!(MessageState::parse(state.as_str()), Some(state));
        let encoded = serde_json::to_string(&state).unwrap();
        assert_eq!(encoded, format!("\"{}\"", state.as_str()));
    }
}

#[test]
fn transition_matrix() {
    use MessageState::*;

    let all = [Pending, Processing, Acknowledged, Failed];
    for from in all {
        for to in all {
            let allowed = matches!(
                (from, to),
                (Pending, Processing) | (Processing, Acknowledged) | (Processing, Failed)
            );
            assert_eq!(from.can_transition(to), allowed, "{from} -> {to}");
        }
    }
}

#[test]
fn terminal_states_reject_everything() {
    use MessageState::*;

    for terminal in [Acknowledged, Failed] {
        assert!(terminal.is_terminal());
        for to in [Pending, Processing, Acknowledged, Failed] {
            assert!(!terminal.can_transition(to));
        }
    }
    assert!(!Pending.is_terminal());
    assert!(!Processing.is_terminal());
}

#[test]
fn inbound_and_outbound_constructors() {
    let now = truncate_to_millis(Utc::now());

    let inbound = Message::inbound(
        "origin-node",
        Method::Create,
        Some(json!({"foo": "bar"})),
        None,
        Some("remote-1".into()),
        now,
    );
    assert!(inbound.is_inbound());
    assert_eq!(inbound.origin_id.as_deref(), Some("origin-node"));
    assert_eq!(inbound.destination_id, None);
    assert_eq!(inbound.state, MessageState::Pending);

    let outbound = Message::outbound(
        "dest-node",
        Some(inbound.id.clone()),
        inbound.method,
        inbound.payload.clone(),
        Some("record-1".into()),
        None,
        now,
    );
    assert!(!outbound.is_inbound());
    assert_eq!(outbound.parent_id.as_deref(), Some(inbound.id.as_str()));
    assert_eq!(outbound.destination_id.as_deref(), Some("dest-node"));
    assert_eq!(outbound.state, MessageState::Pending);
    assert_ne!(outbound.id, inbound.id);
}
