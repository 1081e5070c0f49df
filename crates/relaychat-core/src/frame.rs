//! Wire frames exchanged with the relay
//!
//! Every application message is one JSON object with a discriminator. Outbound
//! frames always use `type`; inbound frames may use `type` or the legacy `event`
//! key, and server-originated frames wrap their fields in a `data` envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::FrameError;
use crate::types::Peer;

/// Discriminators this client understands
pub const KNOWN_KINDS: &[&str] = &[
    "chat_message",
    "user_list",
    "user_join",
    "user_leave",
    "server_broadcast",
    "pm_invite",
    "pm_accept",
    "pm_decline",
    "pm_disconnect",
    "pubkey_request",
    "pubkey_response",
    "pm_message",
    "ping",
    "pong",
];

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One JSON frame on the relay socket
///
/// Routed frames carry `to` on the way out and `from` on the way in; the relay
/// fills in `from`, so both are optional here and checked by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    ChatMessage {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    UserList {
        users: Vec<String>,
    },
    UserJoin {
        user: String,
    },
    UserLeave {
        user: String,
    },
    ServerBroadcast {
        message: String,
    },
    PmInvite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
    },
    PmAccept {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
    },
    PmDecline {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
    },
    PmDisconnect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
    },
    PubkeyRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
    },
    PubkeyResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
        public_key: String,
    },
    PmMessage {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<Peer>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<Peer>,
        ciphertext: String,
    },
    Ping,
    Pong,
    /// Anything else: handed to the presentation layer as a system notice
    #[serde(skip)]
    Unknown {
        kind: Option<String>,
        payload: Value,
    },
}

impl Frame {
    pub fn chat(message: impl Into<String>) -> Self {
        Frame::ChatMessage {
            message: message.into(),
            user: None,
            timestamp: None,
        }
    }

    pub fn pm_invite(to: &Peer) -> Self {
        Frame::PmInvite {
            to: Some(to.clone()),
            from: None,
        }
    }

    pub fn pm_accept(to: &Peer) -> Self {
        Frame::PmAccept {
            to: Some(to.clone()),
            from: None,
        }
    }

    pub fn pm_decline(to: &Peer) -> Self {
        Frame::PmDecline {
            to: Some(to.clone()),
            from: None,
        }
    }

    pub fn pm_disconnect(to: &Peer) -> Self {
        Frame::PmDisconnect {
            to: Some(to.clone()),
            from: None,
        }
    }

    pub fn pubkey_request(to: &Peer) -> Self {
        Frame::PubkeyRequest {
            to: Some(to.clone()),
            from: None,
        }
    }

    pub fn pubkey_response(to: &Peer, public_key: String) -> Self {
        Frame::PubkeyResponse {
            to: Some(to.clone()),
            from: None,
            public_key,
        }
    }

    pub fn pm_message(to: &Peer, ciphertext: String) -> Self {
        Frame::PmMessage {
            to: Some(to.clone()),
            from: None,
            ciphertext,
        }
    }

    /// Wire discriminator of this frame
    pub fn kind(&self) -> &str {
        match self {
            Frame::ChatMessage { .. } => "chat_message",
            Frame::UserList { .. } => "user_list",
            Frame::UserJoin { .. } => "user_join",
            Frame::UserLeave { .. } => "user_leave",
            Frame::ServerBroadcast { .. } => "server_broadcast",
            Frame::PmInvite { .. } => "pm_invite",
            Frame::PmAccept { .. } => "pm_accept",
            Frame::PmDecline { .. } => "pm_decline",
            Frame::PmDisconnect { .. } => "pm_disconnect",
            Frame::PubkeyRequest { .. } => "pubkey_request",
            Frame::PubkeyResponse { .. } => "pubkey_response",
            Frame::PmMessage { .. } => "pm_message",
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::Unknown { kind, .. } => kind.as_deref().unwrap_or("unknown"),
        }
    }

    /// Serialize for the wire
    pub fn encode(&self) -> Result<String, FrameError> {
        if let Frame::Unknown { .. } = self {
            return Err(FrameError::Malformed {
                reason: "unknown frames cannot be encoded".to_string(),
            });
        }
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one inbound text message
    ///
    /// Fails only when the text is not JSON at all or when a known frame kind is
    /// missing required fields; unrecognized kinds decode to [`Frame::Unknown`].
    pub fn decode(text: &str) -> Result<Frame, FrameError> {
        let value: Value = serde_json::from_str(text)?;
        let object = match value {
            Value::Object(object) => object,
            other => {
                return Ok(Frame::Unknown {
                    kind: None,
                    payload: other,
                })
            }
        };

        let candidates = [object.get("event"), object.get("type")];
        let discriminators: Vec<&str> = candidates
            .iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .collect();

        let kind = match discriminators.iter().find(|k| KNOWN_KINDS.contains(*k)) {
            Some(kind) => kind.to_string(),
            None => {
                let kind = discriminators.first().map(|k| k.to_string());
                return Ok(Frame::Unknown {
                    kind,
                    payload: Value::Object(object),
                });
            }
        };

        let mut payload: Map<String, Value> =
            match object.get("data").and_then(Value::as_object).cloned() {
                Some(inner) => inner,
                None => object,
            };
        payload.insert("type".to_string(), Value::String(kind.clone()));

        serde_json::from_value(Value::Object(payload)).map_err(|e| FrameError::Malformed {
            reason: format!("{}: {}", kind, e),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
