//! Wire messages and the per-client outbound queue.

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::event::Event;
use crate::filter::Filter;

/// Frames buffered per connection before the writer task drains them.
pub const OUTBOUND_BUFFER: usize = 8192;

/// Why an inbound frame was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("unsupported message type: {0}")]
    Unsupported(String),
}

/// Inbound client message, parsed and shape-checked.
#[derive(Debug)]
pub enum ClientMsg {
    Event(Event),
    Req { sub_id: String, filters: Vec<Filter> },
    Close { sub_id: String },
}

/// Parse one text frame into a client message.
pub fn parse_client_msg(raw: &str) -> Result<ClientMsg, ParseError> {
    let malformed = || ParseError::Malformed(raw.to_string());
    let val: Value = serde_json::from_str(raw).map_err(|_| malformed())?;
    let arr = val.as_array().ok_or_else(malformed)?;
    let tag = arr.first().and_then(|v| v.as_str()).ok_or_else(malformed)?;
    match tag {
        "EVENT" => {
            if arr.len() != 2 {
                return Err(malformed());
            }
            let ev: Event = serde_json::from_value(arr[1].clone()).map_err(|_| malformed())?;
            if !ev.has_valid_shape() {
                return Err(malformed());
            }
            Ok(ClientMsg::Event(ev))
        }
        "REQ" => {
            if arr.len() < 3 {
                return Err(malformed());
            }
            let sub_id = arr[1].as_str().ok_or_else(malformed)?.to_string();
            let filters = arr[2..]
                .iter()
                .map(|v| serde_json::from_value(v.clone()))
                .collect::<Result<Vec<Filter>, _>>()
                .map_err(|_| malformed())?;
            Ok(ClientMsg::Req { sub_id, filters })
        }
        "CLOSE" => {
            if arr.len() != 2 {
                return Err(malformed());
            }
            let sub_id = arr[1].as_str().ok_or_else(malformed)?.to_string();
            Ok(ClientMsg::Close { sub_id })
        }
        other => Err(ParseError::Unsupported(other.to_string())),
    }
}

/// Outbound frame toward one client.
#[derive(Debug, Clone)]
pub enum RelayMsg {
    Event { sub_id: String, event: Event },
    Ok { event_id: String, accepted: bool, message: String },
    Eose { sub_id: String },
    Closed { sub_id: String, message: String },
    Notice { message: String },
}

impl RelayMsg {
    /// Serialize to the JSON array form sent on the wire.
    pub fn to_json(&self) -> String {
        match self {
            RelayMsg::Event { sub_id, event } => json!(["EVENT", sub_id, event]).to_string(),
            RelayMsg::Ok { event_id, accepted, message } => {
                json!(["OK", event_id, accepted, message]).to_string()
            }
            RelayMsg::Eose { sub_id } => json!(["EOSE", sub_id]).to_string(),
            RelayMsg::Closed { sub_id, message } => {
                json!(["CLOSED", sub_id, message]).to_string()
            }
            RelayMsg::Notice { message } => json!(["NOTICE", message]).to_string(),
        }
    }
}

/// Queue handle for one client's outbound frames.
///
/// Sends never block. A client that cannot drain its queue loses frames
/// instead of stalling ingestion or other clients.
#[derive(Clone)]
pub struct ClientSender {
    tx: mpsc::Sender<RelayMsg>,
}

impl ClientSender {
    pub fn channel() -> (Self, mpsc::Receiver<RelayMsg>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        (Self { tx }, rx)
    }

    /// Queue a frame; silently ignores a hung-up peer.
    pub fn send(&self, msg: RelayMsg) {
        match self.tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("outbound queue full, dropping frame for slow client");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::sample_event;

    fn valid_event_json() -> serde_json::Value {
        serde_json::json!({
            "id": "a".repeat(64),
            "pubkey": "b".repeat(64),
            "kind": 1,
            "created_at": 10,
            "tags": [],
            "content": "hi",
            "sig": "0".repeat(128),
        })
    }

    #[test]
    fn parses_event_frame() {
        let raw = serde_json::json!(["EVENT", valid_event_json()]).to_string();
        match parse_client_msg(&raw).unwrap() {
            ClientMsg::Event(ev) => {
                assert_eq!(ev.kind, 1);
                assert_eq!(ev.content, "hi");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_event_with_bad_hex() {
        let mut ev = valid_event_json();
        ev["id"] = serde_json::Value::String("zz".repeat(32));
        let raw = serde_json::json!(["EVENT", ev]).to_string();
        assert!(matches!(
            parse_client_msg(&raw),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn parses_req_with_multiple_filters() {
        let raw = serde_json::json!(["REQ", "sub1", {"kinds": [1]}, {"#e": ["x"]}]).to_string();
        match parse_client_msg(&raw).unwrap() {
            ClientMsg::Req { sub_id, filters } => {
                assert_eq!(sub_id, "sub1");
                assert_eq!(filters.len(), 2);
                assert_eq!(filters[0].kinds.as_ref().unwrap(), &vec![1]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn req_requires_a_filter() {
        let raw = serde_json::json!(["REQ", "sub1"]).to_string();
        assert!(matches!(
            parse_client_msg(&raw),
            Err(ParseError::Malformed(_))
        ));
    }

    #[test]
    fn parses_close() {
        match parse_client_msg("[\"CLOSE\",\"sub1\"]").unwrap() {
            ClientMsg::Close { sub_id } => assert_eq!(sub_id, "sub1"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unsupported_types_are_named() {
        assert_eq!(
            parse_client_msg("[\"AUTH\",\"challenge\"]").unwrap_err(),
            ParseError::Unsupported("AUTH".into())
        );
        assert_eq!(
            parse_client_msg("[\"COUNT\",\"s\",{}]").unwrap_err(),
            ParseError::Unsupported("COUNT".into())
        );
    }

    #[test]
    fn garbage_is_malformed() {
        for raw in ["not json", "{}", "[]", "[1,2]", "[\"EVENT\"]", "[\"EVENT\", 5]"] {
            assert!(
                matches!(parse_client_msg(raw), Err(ParseError::Malformed(_))),
                "should be malformed: {raw}"
            );
        }
    }

    #[test]
    fn notice_text_carries_the_raw_frame() {
        let err = parse_client_msg("[1,2]").unwrap_err();
        assert_eq!(err.to_string(), "malformed message: [1,2]");
        let err = parse_client_msg("[\"AUTH\"]").unwrap_err();
        assert_eq!(err.to_string(), "unsupported message type: AUTH");
    }

    #[test]
    fn outbound_frames_have_wire_shape() {
        let ev = sample_event("aa", "p1", 1, None, 10);
        let frame: serde_json::Value = serde_json::from_str(
            &RelayMsg::Event { sub_id: "s".into(), event: ev }.to_json(),
        )
        .unwrap();
        assert_eq!(frame[0], "EVENT");
        assert_eq!(frame[1], "s");
        assert_eq!(frame[2]["id"], "aa");

        let ok = RelayMsg::Ok {
            event_id: "aa".into(),
            accepted: true,
            message: "duplicate: already have this event".into(),
        }
        .to_json();
        assert_eq!(
            ok,
            "[\"OK\",\"aa\",true,\"duplicate: already have this event\"]"
        );
        assert_eq!(RelayMsg::Eose { sub_id: "s".into() }.to_json(), "[\"EOSE\",\"s\"]");
        assert_eq!(
            RelayMsg::Closed { sub_id: "s".into(), message: "m".into() }.to_json(),
            "[\"CLOSED\",\"s\",\"m\"]"
        );
        assert_eq!(
            RelayMsg::Notice { message: "n".into() }.to_json(),
            "[\"NOTICE\",\"n\"]"
        );
    }

    #[tokio::test]
    async fn sender_queues_and_survives_closed_peer() {
        let (tx, mut rx) = ClientSender::channel();
        tx.send(RelayMsg::Notice { message: "hello".into() });
        match rx.recv().await.unwrap() {
            RelayMsg::Notice { message } => assert_eq!(message, "hello"),
            other => panic!("unexpected: {other:?}"),
        }
        drop(rx);
        // no panic once the receiving side is gone
        tx.send(RelayMsg::Notice { message: "late".into() });
    }
}
