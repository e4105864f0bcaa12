use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type PeerSender = mpsc::UnboundedSender<String>;

/// Messages exchanged on the signalling socket. Offer/answer/ICE payloads
/// are routed verbatim; the broker never inspects SDP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalMessage {
    CallOffer {
        call_id: String,
        recipient_email: String,
        offer: JsonValue,
    },
    CallAnswer {
        call_id: String,
        answer: JsonValue,
    },
    CallIce {
        call_id: String,
        candidate: JsonValue,
    },
    CallEnd {
        call_id: String,
    },
    RecipientUnavailable {
        call_id: String,
    },
}

#[derive(Debug, Clone)]
struct CallSession {
    caller_email: String,
    callee_email: String,
}

#[derive(Debug)]
struct Peer {
    conn_id: u64,
    tx: PeerSender,
}

/// In-memory signalling broker: one open channel per authenticated email and
/// per-call caller/callee state. Cross-channel fan-out is a single enqueue
/// per recipient, so no ordering is lost between offer, answer and ICE.
#[derive(Clone, Default)]
pub struct CallHub {
    connections: Arc<DashMap<String, Peer>>,
    calls: Arc<DashMap<String, CallSession>>,
    conn_seq: Arc<AtomicU64>,
}

impl CallHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel for the email, replacing any previous one. The
    /// returned connection id identifies this registration to `unregister`.
    pub fn register(&self, email: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = self.conn_seq.fetch_add(1, Ordering::Relaxed);
        self.connections
            .insert(email.to_lowercase(), Peer { conn_id, tx });
        (conn_id, rx)
    }

    /// Drops the connection and any call state the email participates in,
    /// but only while the mapping still belongs to `conn_id`. A replaced
    /// socket's late teardown must not take down its successor.
    pub fn unregister(&self, email: &str, conn_id: u64) {
        let email = email.to_lowercase();
        let removed = self
            .connections
            .remove_if(&email, |_, peer| peer.conn_id == conn_id)
            .is_some();
        if removed {
            self.calls
                .retain(|_, s| s.caller_email != email && s.callee_email != email);
        }
    }

    pub fn is_online(&self, email: &str) -> bool {
        self.connections.contains_key(&email.to_lowercase())
    }

    /// Routes one raw frame from `sender_email`. Unparseable frames are
    /// dropped with a debug log; the peer keeps its connection.
    pub fn handle_message(&self, sender_email: &str, raw: &str) {
        let message: SignalMessage = match serde_json::from_str(raw) {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!("Dropping malformed signalling frame from {}: {}", sender_email, e);
                return;
            }
        };
        let sender_email = sender_email.to_lowercase();

        match message {
            SignalMessage::CallOffer {
                call_id,
                recipient_email,
                ..
            } => {
                let recipient_email = recipient_email.to_lowercase();
                if !self.send_to(&recipient_email, raw) {
                    let notice = SignalMessage::RecipientUnavailable {
                        call_id: call_id.clone(),
                    };
                    if let Ok(text) = serde_json::to_string(&notice) {
                        self.send_to(&sender_email, &text);
                    }
                    return;
                }
                self.calls.insert(
                    call_id,
                    CallSession {
                        caller_email: sender_email,
                        callee_email: recipient_email,
                    },
                );
            }
            SignalMessage::CallAnswer { ref call_id, .. }
            | SignalMessage::CallIce { ref call_id, .. } => {
                if let Some(other) = self.other_party(call_id, &sender_email) {
                    self.send_to(&other, raw);
                }
            }
            SignalMessage::CallEnd { ref call_id } => {
                if let Some(other) = self.other_party(call_id, &sender_email) {
                    self.send_to(&other, raw);
                }
                self.calls.remove(call_id);
            }
            SignalMessage::RecipientUnavailable { .. } => {
                // Broker-originated only; ignore if a client echoes it.
            }
        }
    }

    fn other_party(&self, call_id: &str, sender_email: &str) -> Option<String> {
        let session = self.calls.get(call_id)?;
        if session.caller_email == sender_email {
            Some(session.callee_email.clone())
        } else if session.callee_email == sender_email {
            Some(session.caller_email.clone())
        } else {
            None
        }
    }

    fn send_to(&self, email: &str, raw: &str) -> bool {
        let Some(peer) = self.connections.get(email) else {
            return false;
        };
        if peer.tx.send(raw.to_string()).is_ok() {
            return true;
        }
        let dead_id = peer.conn_id;
        drop(peer);
        self.connections.remove_if(email, |_, p| p.conn_id == dead_id);
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(call_id: &str, recipient: &str) -> String {
        serde_json::json!({
            "type": "call_offer",
            "call_id": call_id,
            "recipient_email": recipient,
            "offer": {"sdp": "x"},
        })
        .to_string()
    }

    #[tokio::test]
    async fn offer_reaches_recipient_verbatim() {
        let hub = CallHub::new();
        let _a = hub.register("a@ex.com");
        let (_, mut b) = hub.register("b@ex.com");

        hub.handle_message("a@ex.com", &offer("1", "b@ex.com"));

        let frame = b.try_recv().expect("recipient got the offer");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "call_offer");
        assert_eq!(parsed["call_id"], "1");
        assert_eq!(parsed["offer"]["sdp"], "x");
    }

    #[tokio::test]
    async fn answer_and_ice_route_to_the_other_party() {
        let hub = CallHub::new();
        let (_, mut a) = hub.register("a@ex.com");
        let (_, mut b) = hub.register("b@ex.com");

        hub.handle_message("a@ex.com", &offer("1", "b@ex.com"));
        b.try_recv().unwrap();

        let answer = r#"{"type":"call_answer","call_id":"1","answer":{"sdp":"y"}}"#;
        hub.handle_message("b@ex.com", answer);
        let frame = a.try_recv().expect("caller got the answer");
        assert!(frame.contains("call_answer"));

        let ice = r#"{"type":"call_ice","call_id":"1","candidate":{"c":1}}"#;
        hub.handle_message("a@ex.com", ice);
        let frame = b.try_recv().expect("callee got the candidate");
        assert!(frame.contains("call_ice"));
    }

    #[tokio::test]
    async fn offline_recipient_bounces_back_to_sender() {
        let hub = CallHub::new();
        let (_, mut a) = hub.register("a@ex.com");

        hub.handle_message("a@ex.com", &offer("7", "nobody@ex.com"));

        let frame = a.try_recv().expect("sender was notified");
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["type"], "recipient_unavailable");
        assert_eq!(parsed["call_id"], "7");
    }

    #[tokio::test]
    async fn call_end_tears_down_call_state() {
        let hub = CallHub::new();
        let _a = hub.register("a@ex.com");
        let (_, mut b) = hub.register("b@ex.com");

        hub.handle_message("a@ex.com", &offer("1", "b@ex.com"));
        b.try_recv().unwrap();

        hub.handle_message("a@ex.com", r#"{"type":"call_end","call_id":"1"}"#);
        assert!(b.try_recv().unwrap().contains("call_end"));

        // The call is gone; a late answer has nowhere to route.
        hub.handle_message("b@ex.com", r#"{"type":"call_answer","call_id":"1","answer":{}}"#);
        assert!(b.try_recv().is_err());
    }

    #[tokio::test]
    async fn disconnect_removes_mapping_and_calls() {
        let hub = CallHub::new();
        let (_, mut a) = hub.register("a@ex.com");
        let (b_id, mut b) = hub.register("b@ex.com");

        hub.handle_message("a@ex.com", &offer("1", "b@ex.com"));
        b.try_recv().unwrap();

        hub.unregister("b@ex.com", b_id);
        assert!(!hub.is_online("b@ex.com"));

        // Call state died with the channel; ICE from the caller goes nowhere.
        hub.handle_message("a@ex.com", r#"{"type":"call_ice","call_id":"1","candidate":{}}"#);
        assert!(a.try_recv().is_err());
    }

    #[tokio::test]
    async fn registration_replaces_previous_channel() {
        let hub = CallHub::new();
        let _old = hub.register("a@ex.com");
        let (_, mut new) = hub.register("a@ex.com");
        let _b = hub.register("b@ex.com");

        hub.handle_message("b@ex.com", &offer("1", "a@ex.com"));
        assert!(new.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stale_teardown_leaves_replacement_channel_alive() {
        let hub = CallHub::new();
        let (old_id, _old) = hub.register("a@ex.com");
        let (_, mut new) = hub.register("a@ex.com");
        let (_, mut b) = hub.register("b@ex.com");

        hub.handle_message("b@ex.com", &offer("1", "a@ex.com"));
        new.try_recv().unwrap();

        // The replaced socket winds down after its successor went live; its
        // teardown must not deregister the new channel or drop the call.
        hub.unregister("a@ex.com", old_id);
        assert!(hub.is_online("a@ex.com"));

        hub.handle_message("a@ex.com", r#"{"type":"call_answer","call_id":"1","answer":{}}"#);
        assert!(b.try_recv().unwrap().contains("call_answer"));
    }
}
