//! Per-connection NIP-01 message processing.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};

use crate::pool::PeerId;
use crate::proto::{parse_client_msg, ClientMsg, ClientSender, RelayMsg};
use crate::relay::Relay;

/// Drive one accepted WebSocket until either side hangs up.
pub async fn process(socket: WebSocket, relay: Arc<Relay>) {
    let peer = relay.register_peer();
    let (sender, mut outbound) = ClientSender::channel();
    let (mut sink, mut stream) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sink.send(Message::Text(msg.to_json())).await.is_err() {
                break;
            }
        }
    });
    tracing::debug!(peer, "client connected");

    let mut conn = Connection {
        peer,
        relay: relay.clone(),
        sender,
        active: HashSet::new(),
    };
    while let Some(Ok(msg)) = stream.next().await {
        if let Message::Text(txt) = msg {
            conn.handle_text(&txt);
        }
    }

    relay.drop_peer(peer);
    drop(conn);
    // all senders are gone now, so the writer drains and exits
    let _ = writer.await;
    tracing::debug!(peer, live_subs = relay.subscription_count(), "client disconnected");
}

/// Per-peer state: the set of active subscription ids plus the handles
/// needed to serve one message.
struct Connection {
    peer: PeerId,
    relay: Arc<Relay>,
    sender: ClientSender,
    active: HashSet<String>,
}

impl Connection {
    fn handle_text(&mut self, raw: &str) {
        match parse_client_msg(raw) {
            Ok(ClientMsg::Event(ev)) => {
                let ack = self.relay.ingest(&ev);
                self.sender.send(RelayMsg::Ok {
                    event_id: ev.id,
                    accepted: ack.accepted,
                    message: ack.message,
                });
            }
            Ok(ClientMsg::Req { sub_id, filters }) => {
                if self
                    .relay
                    .open_subscription(self.peer, &sub_id, filters, &self.sender)
                {
                    self.active.insert(sub_id);
                } else {
                    self.active.remove(&sub_id);
                }
            }
            Ok(ClientMsg::Close { sub_id }) => {
                if self.active.remove(&sub_id) {
                    self.relay.close_subscription(self.peer, &sub_id);
                }
            }
            Err(err) => {
                tracing::debug!(peer = self.peer, %err, "refusing inbound frame");
                self.sender.send(RelayMsg::Notice {
                    message: err.to_string(),
                });
            }
        }
    }
}
